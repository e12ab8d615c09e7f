/// Errors that can occur while framing, decoding or buffering messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A COBS length prefix points past the end of the frame.
    #[error("corrupt frame: length prefix at offset {offset} overruns the frame")]
    FrameCorrupt { offset: usize },

    /// The trailing checksum does not match the message bytes.
    #[error("checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The declared payload length exceeds the bytes actually present.
    #[error("truncated message (declared {declared} payload bytes, {available} available)")]
    TruncatedMessage { declared: usize, available: usize },

    /// The intake buffer filled up before a terminator arrived.
    #[error("intake buffer overflow ({attempted} bytes exceed capacity {capacity})")]
    BufferOverflow { capacity: usize, attempted: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The message identifier does not fit in 11 bits.
    #[error("message id {0} out of range (max 2047)")]
    InvalidIdentifier(u16),

    /// The command does not fit in 5 bits.
    #[error("command {0} out of range (max 31)")]
    InvalidCommand(u8),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the error only affects a single frame and the stream stays usable.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            FrameError::FrameCorrupt { .. }
                | FrameError::ChecksumMismatch { .. }
                | FrameError::TruncatedMessage { .. }
                | FrameError::BufferOverflow { .. }
                | FrameError::PayloadTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
