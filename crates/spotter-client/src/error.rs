//! Session errors.

use std::time::Duration;

use spotter_proto::ProtocolError;
use thiserror::Error;

use crate::session::SessionState;

/// Errors produced by the session state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State when the operation was attempted
        state: SessionState,
        /// Operation that was attempted
        operation: String,
    },

    /// Broker answered the handshake with an ERROR frame
    #[error("connection rejected: {reason}")]
    ConnectionRejected {
        /// `message` header or body of the ERROR frame
        reason: String,
    },

    /// No CONNECTED frame within the handshake timeout
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Transport closed before the handshake completed
    #[error("transport closed: {0}")]
    Transport(String),

    /// Malformed frame or payload
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Returns true if retrying the connection may succeed.
    ///
    /// A rejected handshake means the credentials or host are wrong, so it is
    /// not transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::HandshakeTimeout { .. } | Self::Transport(_))
    }
}
