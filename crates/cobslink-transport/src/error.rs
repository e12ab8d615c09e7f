/// Errors that can occur on a physical link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link could not be opened (port missing, busy, or misconfigured).
    #[error("failed to open link {port}: {source}")]
    Open {
        port: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on an open link.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested operation is not available on this platform or link type.
    #[error("unsupported link operation: {0}")]
    Unsupported(&'static str),

    /// The link has been shut down.
    #[error("link shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
