//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while decoding frames or their payloads.
///
/// Every variant means the peer sent something we refuse to interpret. None
/// of them are transient: retrying the same bytes yields the same error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame structure is invalid (missing command line, header without
    /// colon, body not terminated, non UTF-8 header text, ...).
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Command line does not name a STOMP command.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// Header value contains an escape sequence STOMP does not define.
    #[error("invalid escape sequence \\{0} in header")]
    InvalidEscape(char),

    /// `content-length` header is not a number or exceeds the body.
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    /// JSON payload failed to (de)serialize.
    #[error("invalid JSON payload: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
