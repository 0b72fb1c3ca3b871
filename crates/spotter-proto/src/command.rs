//! STOMP commands.

use std::{fmt, str::FromStr};

use crate::errors::ProtocolError;

/// STOMP frame command.
///
/// Client frames and server frames share one enum; the direction is implied
/// by which side constructs the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client frames
    /// Open a session (1.0 spelling).
    Connect,
    /// Open a session (1.1+ spelling).
    Stomp,
    /// Publish to a destination.
    Send,
    /// Register interest in a destination.
    Subscribe,
    /// Release a subscription.
    Unsubscribe,
    /// Acknowledge a message.
    Ack,
    /// Negative acknowledgement.
    Nack,
    /// Start a transaction.
    Begin,
    /// Commit a transaction.
    Commit,
    /// Roll back a transaction.
    Abort,
    /// Close the session gracefully.
    Disconnect,

    // Server frames
    /// Session accepted.
    Connected,
    /// Message delivered on a subscription.
    Message,
    /// Receipt for a client frame that asked for one.
    Receipt,
    /// Server-side error. The session is closed after this frame.
    Error,
}

impl Command {
    /// Wire spelling of the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Whether header values of this command are written without escaping.
    ///
    /// STOMP 1.1 and 1.2 exempt the handshake frames from escaping so that
    /// 1.0 peers can still read them.
    #[must_use]
    pub const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
