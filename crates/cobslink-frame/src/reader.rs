use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use bytes::Bytes;

use crate::codec::{decode_frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::intake::{IntakeBuffer, IntakeConfig};
use crate::message::Message;

const READ_CHUNK_SIZE: usize = 256;

/// Reads complete messages from any `Read` stream.
///
/// Handles partial reads internally. Callers always get whole messages.
/// Per-frame errors (see [`FrameError::is_per_frame`]) leave the reader
/// positioned at the next frame, so reading can simply continue.
pub struct FrameReader<T> {
    inner: T,
    intake: IntakeBuffer,
    pending: VecDeque<Bytes>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            intake: IntakeBuffer::new(intake_config(&config)),
            pending: VecDeque::new(),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(run) = self.pending.pop_front() {
                return decode_frame(&run, self.config.max_payload_size);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            let attempted = self.intake.occupancy() + read;
            let outcome = self.intake.append(&chunk[..read]);
            self.pending.extend(self.intake.drain_frames().frames);

            if outcome.overflows > 0 {
                return Err(FrameError::BufferOverflow {
                    capacity: self.intake.capacity(),
                    attempted,
                });
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    ///
    /// Buffered bytes are discarded.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
        self.intake = IntakeBuffer::new(intake_config(&self.config));
        self.pending.clear();
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

// Room for one full frame plus a read chunk, so only a run that is already
// longer than any valid frame can overflow.
fn intake_config(config: &FrameConfig) -> IntakeConfig {
    let capacity = config.max_frame_len() + READ_CHUNK_SIZE;
    IntakeConfig {
        capacity,
        high_watermark: capacity,
        low_watermark: capacity / 4,
    }
}
