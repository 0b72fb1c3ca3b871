//! Wire protocol for the Spotter chat core.
//!
//! The chat backend speaks STOMP over a WebSocket. This crate owns the two
//! layers of that contract:
//!
//! - [`Frame`]: STOMP 1.1/1.2 text framing (command, headers, body) with
//!   header escaping, `content-length` handling, and heart-beat detection.
//! - [`payloads`]: the JSON bodies carried inside frames and returned by the
//!   REST endpoints, as explicit tagged types that fail closed on bad input.
//!
//! [`destination`] names the broker destinations used for room topics and
//! publishing.
//!
//! Nothing here performs I/O.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod command;
pub mod destination;
pub mod errors;
mod frame;
pub mod payloads;

pub use command::Command;
pub use errors::{ProtocolError, Result};
pub use frame::{Decoded, Frame, bearer, header};

/// Opaque room identifier assigned by the backend.
pub type RoomId = String;
