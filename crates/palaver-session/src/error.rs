//! Error types for palaver-session

use thiserror::Error;

/// Result type alias using palaver-session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during session operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the proxy gateway
    #[error(transparent)]
    Gateway(#[from] palaver_gateway::Error),

    /// The operation requires an active session
    #[error("No active session")]
    NotActive,

    /// The operation is not valid in the current session state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Another session operation is still in flight
    #[error("Another session operation is already in progress")]
    Busy,

    /// History storage failed
    #[error("History storage error: {0}")]
    Io(#[from] std::io::Error),

    /// History (de)serialization failed
    #[error("History format error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error is a transport failure from the proxy
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Gateway(palaver_gateway::Error::Transport { .. })
                | Error::Gateway(palaver_gateway::Error::Http(_))
        )
    }
}
