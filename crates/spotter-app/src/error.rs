//! Chat service errors.

use spotter_client::{SessionError, transport::TransportError};
use spotter_proto::ProtocolError;
use thiserror::Error;

/// Errors surfaced by [`ChatService`](crate::ChatService) and
/// [`HistoryApi`](crate::HistoryApi).
#[derive(Error, Debug)]
pub enum ChatError {
    /// Session state machine rejected the operation or the handshake
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Transport could not be opened or failed
    #[error("transport error: {0}")]
    Transport(String),

    /// REST endpoint answered with a non-success status
    #[error("http {status}: {body}")]
    Http {
        /// Status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// REST request could not be sent or its response not read
    #[error("request failed: {0}")]
    Request(String),

    /// Response or frame did not have the expected shape
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Operation did not complete in time
    #[error("operation timed out")]
    Timeout,

    /// Operation needs a connected session
    #[error("not connected")]
    NotConnected,
}

impl ChatError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Session(e) => e.is_transient(),
            Self::Transport(_) | Self::Request(_) | Self::Timeout | Self::NotConnected => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Protocol(_) => false,
        }
    }
}

impl From<TransportError> for ChatError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if err.is_decode() {
            return Self::Protocol(ProtocolError::Json(err.to_string()));
        }
        Self::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ChatError::Timeout.is_retryable());
        assert!(ChatError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(!ChatError::Http { status: 401, body: String::new() }.is_retryable());
        assert!(!ChatError::Protocol(ProtocolError::Json("x".into())).is_retryable());
        assert!(
            !ChatError::Session(SessionError::ConnectionRejected { reason: "bad".into() })
                .is_retryable()
        );
    }
}
