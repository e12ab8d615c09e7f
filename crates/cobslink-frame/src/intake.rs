//! Bounded intake buffer between a link reader and a frame scanner.
//!
//! Bytes are appended as they arrive and complete frames are cut at each
//! terminator. Occupancy never exceeds the configured capacity: an append
//! that would overflow drops only the frame still being assembled, and the
//! rest of that frame is skipped up to its terminator.

use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::cobs::TERMINATOR;
use crate::flow::{FlowController, FlowState};

/// Default intake capacity in bytes.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default pause threshold (75% of capacity).
pub const DEFAULT_HIGH_WATERMARK: usize = 768;

/// Default resume threshold (25% of capacity).
pub const DEFAULT_LOW_WATERMARK: usize = 256;

/// Capacity and watermarks of an [`IntakeBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeConfig {
    pub capacity: usize,
    pub high_watermark: usize,
    pub low_watermark: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            low_watermark: DEFAULT_LOW_WATERMARK,
        }
    }
}

/// What a single [`IntakeBuffer::append`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Bytes of this append that are now held in the buffer.
    pub accepted: usize,
    /// Bytes dropped with an overflowed frame or while skipping to the next terminator.
    pub discarded: usize,
    /// Overflow events raised.
    pub overflows: usize,
    /// Flow transition caused by the new occupancy, if any.
    pub flow: Option<FlowState>,
}

/// Frames cut by [`IntakeBuffer::drain_frames`].
#[derive(Debug, Default)]
pub struct Drained {
    /// Stuffed frame runs in arrival order, terminators stripped.
    pub frames: Vec<Bytes>,
    /// Flow transition caused by the freed space, if any.
    pub flow: Option<FlowState>,
}

/// FIFO byte store with a hard capacity and watermark flow control.
#[derive(Debug)]
pub struct IntakeBuffer {
    buf: BytesMut,
    config: IntakeConfig,
    flow: FlowController,
    resync: bool,
}

impl IntakeBuffer {
    pub fn new(config: IntakeConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(config.capacity),
            flow: FlowController::new(config.high_watermark, config.low_watermark),
            config,
            resync: false,
        }
    }

    /// Bytes currently buffered.
    pub fn occupancy(&self) -> usize {
        self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    pub fn flow_state(&self) -> FlowState {
        self.flow.state()
    }

    /// True while skipping the tail of an overflowed frame.
    pub fn is_resyncing(&self) -> bool {
        self.resync
    }

    /// Whether at least one terminator is buffered.
    pub fn has_frame(&self) -> bool {
        self.buf.contains(&TERMINATOR)
    }

    /// Store newly arrived bytes, then re-evaluate flow control.
    ///
    /// Data is taken one frame segment at a time. When a segment does not fit,
    /// the frame it belongs to (the buffered partial tail plus the segment) is
    /// dropped and complete frames already buffered are kept. If that frame's
    /// terminator has not arrived yet, the rest of it is skipped on later appends.
    pub fn append(&mut self, mut data: &[u8]) -> AppendOutcome {
        let mut outcome = AppendOutcome::default();

        while !data.is_empty() {
            let terminator = data.iter().position(|&b| b == TERMINATOR);

            if self.resync {
                match terminator {
                    Some(pos) => {
                        outcome.discarded += pos + 1;
                        data = &data[pos + 1..];
                        self.resync = false;
                        continue;
                    }
                    None => {
                        outcome.discarded += data.len();
                        break;
                    }
                }
            }

            let segment_len = terminator.map_or(data.len(), |pos| pos + 1);
            let (segment, rest) = data.split_at(segment_len);
            data = rest;

            let room = self.config.capacity - self.buf.len();
            if segment.len() <= room {
                self.buf.extend_from_slice(segment);
                outcome.accepted += segment.len();
                continue;
            }

            let complete = self.complete_len();
            let partial = self.buf.len() - complete;
            warn!(
                capacity = self.config.capacity,
                attempted = self.buf.len() + segment.len(),
                dropped = partial + segment.len(),
                "intake overflow, dropping partial frame"
            );
            self.buf.truncate(complete);
            outcome.overflows += 1;
            outcome.discarded += partial + segment.len();
            self.resync = terminator.is_none();
        }

        outcome.flow = self.flow.update(self.buf.len());
        outcome
    }

    /// Length of the buffered prefix that ends at the last terminator.
    fn complete_len(&self) -> usize {
        self.buf
            .iter()
            .rposition(|&b| b == TERMINATOR)
            .map_or(0, |pos| pos + 1)
    }

    /// Remove every complete frame, oldest first, then re-evaluate flow control.
    ///
    /// Empty runs between consecutive terminators are skipped. Trailing bytes
    /// without a terminator stay buffered.
    pub fn drain_frames(&mut self) -> Drained {
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == TERMINATOR) {
            let mut run = self.buf.split_to(pos + 1);
            run.truncate(pos);
            if !run.is_empty() {
                frames.push(run.freeze());
            }
        }
        let flow = self.flow.update(self.buf.len());
        Drained { frames, flow }
    }

    /// Drop all buffered bytes and return to [`FlowState::Flowing`].
    pub fn reset(&mut self) {
        self.buf.clear();
        self.resync = false;
        self.flow.reset();
    }
}

impl Default for IntakeBuffer {
    fn default() -> Self {
        Self::new(IntakeConfig::default())
    }
}
