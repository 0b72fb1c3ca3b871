//! Application layer for the Spotter chat core
//!
//! Async service around the Sans-IO session, plus the room store, display
//! transforms and REST history client.
//!
//! # Components
//!
//! - [`ChatService`]: executes session actions against a [`Driver`], routes
//!   messages to handlers and into the store
//! - [`RoomStore`]: rooms, display order, messages, unread counts
//! - [`HistoryApi`]: room list and message history endpoints
//! - [`transform`]: wire shapes to display shapes
//! - [`Driver`]: transport abstraction, [`WebSocketDriver`] in production

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod api;
mod config;
mod driver;
mod error;
mod service;
mod store;
pub mod transform;
mod websocket;

pub use api::HistoryApi;
pub use config::{
    ChatConfig, DEFAULT_API_BASE_URL, DEFAULT_BROKER_URL, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_CONNECT_TIMEOUT,
};
pub use driver::Driver;
pub use error::ChatError;
pub use service::{ChatService, MessageHandler, POLL_INTERVAL};
pub use spotter_client::{ReconnectPolicy, SessionState};
pub use store::{Ingest, RoomStore};
pub use transform::{ChatMessage, ChatRoom, UserType};
pub use websocket::WebSocketDriver;
