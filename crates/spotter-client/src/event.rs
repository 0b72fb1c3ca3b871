//! Session events and actions.
//!
//! Events are fed into [`Session::handle`](crate::Session::handle); the
//! session answers with actions for the driver to execute in order.

use std::time::Duration;

use spotter_proto::{Frame, RoomId, payloads::InboundMessage};

use crate::error::SessionError;

/// Input to the session state machine.
#[derive(Debug, Clone)]
pub enum SessionEvent<I, H = ()> {
    /// Open a session authenticated with `token`.
    Connect {
        /// Bearer token
        token: String,
        /// Current time
        now: I,
    },
    /// Close the session and forget every subscription.
    Disconnect,
    /// Subscribe to a room's topic.
    Subscribe {
        /// Room to subscribe to
        room_id: RoomId,
        /// Value kept with the subscription (usually a message handler)
        handler: H,
    },
    /// Release a room subscription.
    Unsubscribe {
        /// Room to release
        room_id: RoomId,
    },
    /// Publish a chat message.
    SendMessage {
        /// Target room
        room_id: RoomId,
        /// Message text
        content: String,
        /// Bearer token for the SEND frame
        token: String,
    },
    /// A frame arrived from the broker.
    FrameReceived {
        /// Decoded frame
        frame: Frame,
        /// Current time
        now: I,
    },
    /// The transport closed underneath the session.
    TransportClosed {
        /// Close reason reported by the transport
        reason: String,
        /// Current time
        now: I,
    },
    /// Periodic timer.
    Tick {
        /// Current time
        now: I,
    },
}

/// Output of the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open a new transport to the broker.
    OpenTransport,
    /// Write this frame to the transport.
    Send(Frame),
    /// Close the transport.
    CloseTransport,
    /// Handshake completed.
    Connected {
        /// STOMP version the broker selected
        version: Option<String>,
        /// Rooms re-subscribed after a reconnect
        resubscribed: Vec<RoomId>,
    },
    /// Handshake failed. The session is disconnected or retrying, as
    /// reported by a following `ReconnectScheduled` action.
    HandshakeFailed(SessionError),
    /// Hand `message` to the subscriber of `room_id`.
    Deliver {
        /// Room the message was routed to
        room_id: RoomId,
        /// Parsed message body
        message: InboundMessage,
    },
    /// Connection lost. Another attempt starts after `delay`.
    ReconnectScheduled {
        /// 1-based attempt number
        attempt: u32,
        /// Wait before the attempt
        delay: Duration,
    },
    /// The session is gone and every subscription was dropped.
    Disconnected {
        /// Why the session ended
        reason: String,
    },
}
