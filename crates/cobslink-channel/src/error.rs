use crate::channel::ChannelState;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The physical link could not be acquired or prepared.
    #[error("link unavailable: {0}")]
    LinkUnavailable(#[from] cobslink_transport::TransportError),

    /// The operation needs an open channel.
    #[error("channel not open (state: {state})")]
    ChannelNotOpen { state: ChannelState },

    /// The link failed while the channel was running and the channel closed itself.
    #[error("link failed: {0}")]
    Link(String),

    /// An I/O error occurred on the link.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] cobslink_frame::FrameError),

    /// An execution unit could not be started.
    #[error("failed to spawn execution unit: {0}")]
    Spawn(#[source] std::io::Error),

    /// The channel configuration is inconsistent.
    #[error("invalid channel config: {0}")]
    InvalidConfig(String),

    /// A hex command string could not be parsed.
    #[error("invalid hex command: {0}")]
    InvalidHex(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
