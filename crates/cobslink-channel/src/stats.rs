use std::sync::atomic::{AtomicU64, Ordering};

use cobslink_frame::FrameError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Live counters shared by the execution units and the caller.
#[derive(Debug, Default)]
pub(crate) struct ChannelStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    frames_dispatched: AtomicU64,
    frames_unhandled: AtomicU64,
    checksum_errors: AtomicU64,
    corrupt_frames: AtomicU64,
    truncated_messages: AtomicU64,
    buffer_overflows: AtomicU64,
    oversized_payloads: AtomicU64,
    flow_pauses: AtomicU64,
    flow_resumes: AtomicU64,
}

impl ChannelStats {
    pub(crate) fn add_sent(&self, n: usize) {
        self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn dispatched(&self) {
        self.frames_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unhandled(&self) {
        self.frames_unhandled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn overflowed(&self, events: usize) {
        self.buffer_overflows
            .fetch_add(events as u64, Ordering::Relaxed);
    }

    pub(crate) fn flow_changed(&self, ready: bool) {
        let counter = if ready {
            &self.flow_resumes
        } else {
            &self.flow_pauses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a frame dropped by the decoder. Returns false for errors that
    /// have no per-frame counter.
    pub(crate) fn record_frame_error(&self, err: &FrameError) -> bool {
        let counter = match err {
            FrameError::ChecksumMismatch { .. } => &self.checksum_errors,
            FrameError::FrameCorrupt { .. } => &self.corrupt_frames,
            FrameError::TruncatedMessage { .. } => &self.truncated_messages,
            FrameError::BufferOverflow { .. } => &self.buffer_overflows,
            FrameError::PayloadTooLarge { .. } => &self.oversized_payloads,
            FrameError::InvalidIdentifier(_)
            | FrameError::InvalidCommand(_)
            | FrameError::Io(_)
            | FrameError::ConnectionClosed => {
                debug!(error = %err, "frame error has no counter");
                return false;
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            bytes_sent: get(&self.bytes_sent),
            bytes_received: get(&self.bytes_received),
            frames_dispatched: get(&self.frames_dispatched),
            frames_unhandled: get(&self.frames_unhandled),
            checksum_errors: get(&self.checksum_errors),
            corrupt_frames: get(&self.corrupt_frames),
            truncated_messages: get(&self.truncated_messages),
            buffer_overflows: get(&self.buffer_overflows),
            oversized_payloads: get(&self.oversized_payloads),
            flow_pauses: get(&self.flow_pauses),
            flow_resumes: get(&self.flow_resumes),
        }
    }
}

/// Point-in-time copy of a channel's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub frames_dispatched: u64,
    /// Decoded messages dropped because no handler was registered.
    pub frames_unhandled: u64,
    pub checksum_errors: u64,
    pub corrupt_frames: u64,
    pub truncated_messages: u64,
    pub buffer_overflows: u64,
    /// Decoded messages whose payload exceeded the configured maximum.
    pub oversized_payloads: u64,
    pub flow_pauses: u64,
    pub flow_resumes: u64,
}

impl StatsSnapshot {
    /// Frames dropped for any per-frame reason.
    pub fn frame_errors(&self) -> u64 {
        self.checksum_errors
            + self.corrupt_frames
            + self.truncated_messages
            + self.buffer_overflows
            + self.oversized_payloads
    }
}
