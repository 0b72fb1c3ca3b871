//! Client
//!
//! Action-based chat session state machine. Manages the STOMP session
//! lifecycle, room subscriptions, message routing and reconnects.
//!
//! # Architecture
//!
//! The session is Sans-IO. It receives events ([`SessionEvent`]), processes
//! them through pure state machine logic, and returns actions
//! ([`SessionAction`]) for the caller to execute. Time is always an input.
//!
//! # Components
//!
//! - [`Session`]: connection lifecycle, handshake timeout and reconnect
//! - [`SubscriptionRegistry`]: at most one subscription per room
//! - [`SessionEvent`]: events fed into the session
//! - [`SessionAction`]: actions produced by the session
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::ConnectedClient`]: frame channels over a WebSocket
//! - [`transport::connect`]: open a WebSocket to the broker

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod event;
mod registry;
mod session;

#[cfg(feature = "transport")]
pub mod transport;

pub use error::SessionError;
pub use event::{SessionAction, SessionEvent};
pub use registry::{Subscription, SubscriptionRegistry};
pub use session::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_MAX_RECONNECT_DELAY,
    DEFAULT_RECONNECT_DELAY, ReconnectPolicy, Session, SessionConfig, SessionState,
};
pub use spotter_proto::RoomId;
