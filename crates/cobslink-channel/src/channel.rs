use std::fmt;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle, ThreadId};

use bytes::Bytes;
use cobslink_frame::{FrameError, FrameWriter, Message};
use cobslink_transport::Link;
#[cfg(feature = "serial")]
use cobslink_transport::{SerialConfig, SerialLink};
use tracing::{info, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::handler::MessageHandler;
use crate::stats::StatsSnapshot;
use crate::units::{lock, run_processor, run_reader, HandlerSlot, Shared};

const READER_THREAD: &str = "cobslink-reader";
const PROCESSOR_THREAD: &str = "cobslink-processor";

/// Lifecycle state of a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    /// No execution units, no link handle.
    Closed = 0,
    /// Link held, reader and processor running.
    Open = 1,
    /// Stop raised, execution units winding down.
    Closing = 2,
}

impl ChannelState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ChannelState::Open,
            2 => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Closed => "closed",
            ChannelState::Open => "open",
            ChannelState::Closing => "closing",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message channel over one physical link.
///
/// Opening a channel starts two threads: a reader that moves link bytes into
/// the intake buffer and drives the flow-control line, and a processor that
/// cuts frames out of the intake and hands decoded messages to the registered
/// [`MessageHandler`] in arrival order. Writes run on the caller's thread and
/// are serialised by their own lock.
///
/// A link read or write failure closes the channel on its own; the next
/// write reports [`ChannelError::Link`]. A write that times out, e.g. while
/// the remote holds its flow line, fails alone and leaves the channel open.
pub struct Channel<L: Link> {
    shared: Arc<Shared<L>>,
    units: Mutex<Vec<JoinHandle<()>>>,
    unit_ids: Vec<ThreadId>,
    handler: HandlerSlot,
    config: ChannelConfig,
    link_name: String,
}

impl<L: Link> Channel<L> {
    /// Take ownership of `link` and start the channel.
    ///
    /// The read timeout is applied, pending OS buffers are discarded and the
    /// flow line is asserted before the execution units start.
    pub fn open(link: L, config: ChannelConfig) -> Result<Self> {
        Self::start(link, config, Arc::new(Mutex::new(None)))
    }

    fn start(mut link: L, config: ChannelConfig, handler: HandlerSlot) -> Result<Self> {
        config.validate()?;
        let link_name = link.describe();

        link.set_read_timeout(config.read_timeout)?;
        link.discard_buffers()?;
        let reader_link = link.try_clone()?;
        let mut control = link.flow_control()?;
        control.set_ready(true)?;

        let writer = FrameWriter::with_config(link, config.frame());
        let shared = Arc::new(Shared::new(&config, writer, control, Arc::clone(&handler)));
        let units = spawn_units(&shared, reader_link)?;
        let unit_ids = units.iter().map(|unit| unit.thread().id()).collect();

        info!(
            link = %link_name,
            capacity = config.capacity,
            high = config.high_watermark,
            low = config.low_watermark,
            "channel open"
        );

        Ok(Self {
            shared,
            units: Mutex::new(units),
            unit_ids,
            handler,
            config,
            link_name,
        })
    }

    /// Build and send one message.
    pub fn write(&self, id: u16, command: u8, payload: impl Into<Bytes>) -> Result<()> {
        let message = Message::new(id, command, payload)?;
        self.write_message(&message)
    }

    /// Send an already built message.
    pub fn write_message(&self, message: &Message) -> Result<()> {
        self.with_writer(|writer| writer.send(message))
    }

    /// Send caller-laid-out header and payload bytes. The checksum is appended here.
    pub fn write_raw(&self, layout: &[u8]) -> Result<()> {
        self.with_writer(|writer| writer.send_raw(layout))
    }

    /// Send a command given as hex text, e.g. `"00 34 03 01 02 03"`.
    ///
    /// Whitespace is ignored. The link is not touched unless the text parses.
    pub fn send_hex(&self, text: &str) -> Result<()> {
        let compact: String = text.split_whitespace().collect();
        let layout =
            hex::decode(&compact).map_err(|err| ChannelError::InvalidHex(err.to_string()))?;
        if layout.is_empty() {
            return Err(ChannelError::InvalidHex("empty command".to_string()));
        }
        self.write_raw(&layout)
    }

    fn with_writer<F>(&self, send: F) -> Result<()>
    where
        F: FnOnce(&mut FrameWriter<L>) -> cobslink_frame::Result<usize>,
    {
        self.ensure_open()?;
        let mut guard = lock(&self.shared.writer);
        let Some(writer) = guard.as_mut() else {
            return Err(self.not_open());
        };

        match send(writer) {
            Ok(written) => {
                self.shared.stats.add_sent(written);
                Ok(())
            }
            Err(FrameError::Io(err)) if err.kind() == ErrorKind::TimedOut => {
                warn!(link = %self.link_name, "link write timed out, channel stays open");
                Err(ChannelError::Io(err))
            }
            Err(FrameError::Io(err)) => {
                drop(guard);
                self.shared.fail(format!("link write failed: {err}"));
                Err(ChannelError::Io(err))
            }
            Err(FrameError::ConnectionClosed) => {
                drop(guard);
                let reason = "link closed during write".to_string();
                self.shared.fail(reason.clone());
                Err(ChannelError::Link(reason))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Register the handler for decoded messages, replacing any previous one.
    ///
    /// Must not be called from inside a handler.
    pub fn on_message<H>(&self, handler: H)
    where
        H: MessageHandler + 'static,
    {
        *lock(&self.handler) = Some(Box::new(handler));
    }

    /// Remove the handler. Later messages count as unhandled.
    pub fn clear_handler(&self) {
        lock(&self.handler).take();
    }

    /// Stop both execution units, wait for them, then release the link.
    ///
    /// Idempotent. Concurrent callers are serialised: none returns before the
    /// units have been joined and the link released. Called from inside a
    /// handler it does not wait for the processor, which exits once the
    /// handler returns.
    pub fn close(&self) {
        let current = thread::current().id();
        let Some(mut units) = self.lock_units(current) else {
            // Another caller is joining this unit; it only needs the stop flag.
            self.shared.request_stop();
            return;
        };
        if units.is_empty() && self.shared.state() == ChannelState::Closed {
            return;
        }

        self.shared.request_stop();
        for unit in units.drain(..) {
            if unit.thread().id() == current {
                continue;
            }
            let name = unit.thread().name().unwrap_or("unit").to_string();
            if unit.join().is_err() {
                warn!(unit = %name, "execution unit panicked");
            }
        }

        self.shared.release();
        drop(units);
        info!(link = %self.link_name, "channel closed");
    }

    /// Unit threads never block on the units lock, since its holder may be
    /// joining them.
    fn lock_units(&self, current: ThreadId) -> Option<MutexGuard<'_, Vec<JoinHandle<()>>>> {
        if !self.unit_ids.contains(&current) {
            return Some(lock(&self.units));
        }
        match self.units.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Close, then start again on a fresh link with the same config and handler.
    ///
    /// Counters start from zero.
    pub fn reopen(&mut self, link: L) -> Result<()> {
        self.close();
        *self = Self::start(link, self.config.clone(), Arc::clone(&self.handler))?;
        Ok(())
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Counters for the current session.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// The link failure that closed the channel, if any.
    pub fn last_error(&self) -> Option<String> {
        self.shared.fatal_error()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Link description, e.g. `serial:/dev/ttyUSB0@115200`.
    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(self.not_open())
        }
    }

    fn not_open(&self) -> ChannelError {
        match self.shared.fatal_error() {
            Some(reason) => ChannelError::Link(reason),
            None => ChannelError::ChannelNotOpen {
                state: self.state(),
            },
        }
    }
}

#[cfg(feature = "serial")]
impl Channel<SerialLink> {
    /// Open the serial port described by `serial` and start a channel on it.
    pub fn open_serial(serial: &SerialConfig, config: ChannelConfig) -> Result<Self> {
        let link = SerialLink::open(serial)?;
        Self::open(link, config)
    }
}

impl<L: Link> Drop for Channel<L> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<L: Link> fmt::Debug for Channel<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("link", &self.link_name)
            .field("state", &self.state())
            .finish()
    }
}

fn spawn_units<L: Link>(shared: &Arc<Shared<L>>, reader_link: L) -> Result<Vec<JoinHandle<()>>> {
    let reader = {
        let shared = Arc::clone(shared);
        thread::Builder::new()
            .name(READER_THREAD.to_string())
            .spawn(move || run_reader(shared, reader_link))
            .map_err(ChannelError::Spawn)?
    };

    let processor = {
        let shared = Arc::clone(shared);
        thread::Builder::new()
            .name(PROCESSOR_THREAD.to_string())
            .spawn(move || run_processor(shared))
    };

    match processor {
        Ok(processor) => Ok(vec![reader, processor]),
        Err(err) => {
            shared.request_stop();
            let _ = reader.join();
            shared.release();
            Err(ChannelError::Spawn(err))
        }
    }
}
