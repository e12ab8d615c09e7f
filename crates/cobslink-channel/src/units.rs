//! Reader and processor execution units and the state they share.
//!
//! Lock order is `flow` before `intake`. The intake lock is never held
//! across link I/O.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use cobslink_frame::{decode_frame, FlowState, FrameWriter, IntakeBuffer};
use cobslink_transport::{FlowControl, Link};
use tracing::{debug, info, trace, warn};

use crate::channel::ChannelState;
use crate::config::ChannelConfig;
use crate::handler::MessageHandler;
use crate::stats::ChannelStats;

/// Reader and processor.
const UNITS: usize = 2;

pub(crate) type HandlerSlot = Arc<Mutex<Option<Box<dyn MessageHandler>>>>;

/// Recover the guard from a poisoned lock. A panicking handler must not wedge teardown.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Host end of the flow-control line and the level last driven on it.
pub(crate) struct FlowDriver {
    control: Option<Box<dyn FlowControl>>,
    driven: FlowState,
}

/// Everything one open session of a channel shares across threads.
pub(crate) struct Shared<L: Link> {
    pub(crate) intake: Mutex<IntakeBuffer>,
    pub(crate) frames_ready: Condvar,
    pub(crate) flow: Mutex<FlowDriver>,
    pub(crate) writer: Mutex<Option<FrameWriter<L>>>,
    pub(crate) handler: HandlerSlot,
    pub(crate) stop: AtomicBool,
    pub(crate) state: AtomicU8,
    pub(crate) running: AtomicUsize,
    pub(crate) fatal: Mutex<Option<String>>,
    pub(crate) stats: ChannelStats,
    pub(crate) read_timeout: Duration,
    pub(crate) read_chunk: usize,
    pub(crate) max_payload: usize,
}

impl<L: Link> Shared<L> {
    pub(crate) fn new(
        config: &ChannelConfig,
        writer: FrameWriter<L>,
        control: Box<dyn FlowControl>,
        handler: HandlerSlot,
    ) -> Self {
        Self {
            intake: Mutex::new(IntakeBuffer::new(config.intake())),
            frames_ready: Condvar::new(),
            flow: Mutex::new(FlowDriver {
                control: Some(control),
                driven: FlowState::Flowing,
            }),
            writer: Mutex::new(Some(writer)),
            handler,
            stop: AtomicBool::new(false),
            state: AtomicU8::new(ChannelState::Open as u8),
            running: AtomicUsize::new(UNITS),
            fatal: Mutex::new(None),
            stats: ChannelStats::default(),
            read_timeout: config.read_timeout,
            read_chunk: config.read_chunk,
            max_payload: config.max_payload,
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Raise the stop signal and move `Open` to `Closing`.
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.state.compare_exchange(
            ChannelState::Open as u8,
            ChannelState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.frames_ready.notify_all();
    }

    /// Record a fatal link failure and stop both units.
    pub(crate) fn fail(&self, reason: String) {
        {
            let mut fatal = lock(&self.fatal);
            if fatal.is_none() {
                warn!(reason = %reason, "link failure, closing channel");
                *fatal = Some(reason);
            }
        }
        self.request_stop();
    }

    pub(crate) fn fatal_error(&self) -> Option<String> {
        lock(&self.fatal).clone()
    }

    /// Drop the write handle and the flow line. Idempotent.
    pub(crate) fn release(&self) {
        let writer = lock(&self.writer).take();
        lock(&self.flow).control = None;
        if writer.is_some() {
            debug!("link handle released");
        }
        self.state
            .store(ChannelState::Closed as u8, Ordering::Release);
    }

    /// The last unit out after a fatal error finishes the teardown itself.
    fn unit_exited(&self) {
        if self.running.fetch_sub(1, Ordering::AcqRel) == 1 && self.fatal_error().is_some() {
            self.release();
            info!("channel closed after link failure");
        }
    }

    /// Bring the line level in line with the intake's flow state.
    ///
    /// The intake is read under the flow lock, so concurrent callers converge
    /// on the latest state and a level is never driven twice in a row.
    fn sync_flow_line(&self) -> cobslink_transport::Result<()> {
        let mut flow = lock(&self.flow);
        let desired = lock(&self.intake).flow_state();
        if desired == flow.driven {
            return Ok(());
        }
        let Some(control) = flow.control.as_mut() else {
            return Ok(());
        };
        control.set_ready(desired.is_ready())?;
        flow.driven = desired;
        self.stats.flow_changed(desired.is_ready());
        debug!(state = ?desired, "flow line changed");
        Ok(())
    }

    fn dispatch(&self, run: &Bytes) {
        let message = match decode_frame(run, self.max_payload) {
            Ok(message) => message,
            Err(err) => {
                self.stats.record_frame_error(&err);
                warn!(error = %err, len = run.len(), "dropping frame");
                return;
            }
        };

        let mut handler = lock(&self.handler);
        match handler.as_mut() {
            Some(handler) => {
                trace!(id = message.id(), command = message.command(), "dispatching message");
                handler.handle(&message);
                self.stats.dispatched();
            }
            None => {
                self.stats.unhandled();
                debug!(
                    id = message.id(),
                    command = message.command(),
                    "no handler registered, message dropped"
                );
            }
        }
    }
}

fn is_timeout(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

/// Reader loop: link bytes into the intake, flow line after every append.
pub(crate) fn run_reader<L: Link>(shared: Arc<Shared<L>>, mut link: L) {
    debug!(link = %link.describe(), "reader started");
    let mut chunk = vec![0u8; shared.read_chunk];

    while !shared.stopping() {
        let read = match link.read(&mut chunk) {
            Ok(0) => {
                shared.fail("link closed by remote".to_string());
                break;
            }
            Ok(n) => n,
            Err(err) if is_timeout(err.kind()) => continue,
            Err(err) => {
                shared.fail(format!("link read failed: {err}"));
                break;
            }
        };

        shared.stats.add_received(read);
        let outcome = lock(&shared.intake).append(&chunk[..read]);
        if outcome.overflows > 0 {
            shared.stats.overflowed(outcome.overflows);
        }
        if outcome.discarded > 0 {
            debug!(discarded = outcome.discarded, "intake bytes discarded");
        }

        if let Err(err) = shared.sync_flow_line() {
            shared.fail(format!("flow line failed: {err}"));
            break;
        }
        shared.frames_ready.notify_one();
    }

    debug!("reader stopped");
    shared.unit_exited();
}

/// Processor loop: cut frames from the intake and dispatch them in order.
pub(crate) fn run_processor<L: Link>(shared: Arc<Shared<L>>) {
    debug!("processor started");

    while let Some(frames) = next_batch(&shared) {
        if let Err(err) = shared.sync_flow_line() {
            shared.fail(format!("flow line failed: {err}"));
        }
        for run in &frames {
            shared.dispatch(run);
        }
    }

    debug!("processor stopped");
    shared.unit_exited();
}

/// Wait for at least one complete frame. `None` once stopped with nothing left.
fn next_batch<L: Link>(shared: &Shared<L>) -> Option<Vec<Bytes>> {
    let mut intake = lock(&shared.intake);
    loop {
        if intake.has_frame() {
            return Some(intake.drain_frames().frames);
        }
        if shared.stopping() {
            return None;
        }
        let (guard, _) = shared
            .frames_ready
            .wait_timeout(intake, shared.read_timeout)
            .unwrap_or_else(PoisonError::into_inner);
        intake = guard;
    }
}
