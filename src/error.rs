use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The privileged side of the relay channel is unreachable.
    #[error("relay channel closed")]
    ChannelClosed,

    /// Transport-level failure before any HTTP status was received.
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The storage service answered with a non-2xx status.
    #[error("remote rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// Failure string carried back across the relay channel.
    #[error("relay error: {0}")]
    Relay(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a retry of the same operation could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::NetworkUnreachable(_) => true,
            Error::RemoteRejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
