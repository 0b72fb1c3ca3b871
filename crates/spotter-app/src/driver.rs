//! Frame I/O seam between the chat service and the socket.
//!
//! The [`Driver`] trait decouples [`ChatService`](crate::ChatService) from the
//! transport. Production uses [`WebSocketDriver`](crate::WebSocketDriver);
//! tests plug in an in-memory driver and feed frames by hand.

use std::{future::Future, ops::Sub, time::Duration};

use spotter_proto::Frame;

/// Moves STOMP frames to and from the broker.
///
/// `Instant` is the clock the session runs on, so tests can drive it with
/// paused tokio time.
pub trait Driver: Send {
    /// Transport error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Time instant type. Enables virtual time in tests.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Open a new transport to the broker, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be established.
    fn open(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send a frame to the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed or the send fails.
    fn send_frame(&mut self, frame: Frame) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receive the next frame from the broker.
    ///
    /// Returns `None` once the transport is closed.
    fn recv_frame(&mut self) -> impl Future<Output = Option<Frame>> + Send;

    /// Whether a transport is open.
    fn is_open(&self) -> bool;

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Close the transport and release its resources.
    fn close(&mut self);
}
