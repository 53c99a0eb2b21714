//! Error types for palaver-gateway

use thiserror::Error;

use crate::compat;

/// Result type alias using palaver-gateway Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the session proxy
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed before a status was received (connect, timeout, decode)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The proxy answered with a non-2xx status
    #[error("Transport error: HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a transport error from a status code and response body
    pub fn transport(status: u16, body: impl Into<String>) -> Self {
        Self::Transport {
            status,
            body: body.into(),
        }
    }

    /// HTTP status of a transport error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Check if this error is really the vendor telling us the chat is over.
    ///
    /// The vendor reports termination inside error bodies rather than with a
    /// dedicated status code, so the body text is what gets classified.
    pub fn is_session_ended(&self) -> bool {
        match self {
            Error::Transport { body, .. } => compat::is_ended_text(body),
            Error::UnexpectedResponse(text) => compat::is_ended_text(text),
            other => compat::is_ended_text(&other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_body_chat_already_ended() {
        let e = Error::transport(400, r#"{"detail":"Chat already ended"}"#);
        assert!(e.is_session_ended());
        assert_eq!(e.status(), Some(400));
    }

    #[test]
    fn test_transport_body_lowercase_variant() {
        let e = Error::transport(409, "the chat ended a while ago");
        assert!(e.is_session_ended());
    }

    #[test]
    fn test_transport_body_is_case_sensitive() {
        let e = Error::transport(409, "CHAT ENDED");
        assert!(!e.is_session_ended());
    }

    #[test]
    fn test_ordinary_transport_error() {
        let e = Error::transport(502, "Bad Gateway");
        assert!(!e.is_session_ended());
        assert_eq!(e.to_string(), "Transport error: HTTP 502: Bad Gateway");
    }

    #[test]
    fn test_unexpected_response_classified() {
        assert!(Error::UnexpectedResponse("Chat already ended".into()).is_session_ended());
        assert!(!Error::InvalidConfig("missing base url".into()).is_session_ended());
    }
}
