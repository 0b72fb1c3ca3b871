//! Chat session state machine.
//!
//! Owns the STOMP session lifecycle on top of a transport it never touches:
//! methods take time as input and return [`SessionAction`]s for the driver.
//!
//! # State Machine
//!
//! ```text
//!                connect            CONNECTED
//! ┌──────────────┐ ───> ┌────────────┐ ───> ┌───────────┐
//! │ Disconnected │      │ Connecting │      │ Connected │
//! └──────────────┘ <─── └────────────┘      └───────────┘
//!        ^  rejected / timeout /    ^             │
//!        │  disconnect              │             │
//!        │                          │ retry timer │ transport lost / ERROR
//!        │ attempts exhausted  ┌──────────────┐   │
//!        └─────────────────────│ Reconnecting │<──┘
//!                              └──────────────┘
//! ```
//!
//! Subscriptions survive a reconnect and are replayed once the new session
//! is accepted. They are dropped when the session gives up or disconnects.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use spotter_proto::{
    Command, Frame, RoomId, bearer, destination, header,
    payloads::{InboundMessage, OutgoingMessage},
};

use crate::{
    error::SessionError,
    event::{SessionAction, SessionEvent},
    registry::{Subscription, SubscriptionRegistry},
};

/// Time allowed for the broker to answer CONNECT.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reconnect attempts after a lost connection before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Wait before the first reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Upper bound for the reconnect wait.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session and no pending attempt
    Disconnected,
    /// CONNECT sent, waiting for CONNECTED
    Connecting,
    /// Session accepted by the broker
    Connected,
    /// Connection lost, waiting to retry
    Reconnecting {
        /// 1-based number of the next attempt
        attempt: u32,
    },
}

/// Bounded exponential backoff for reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts before giving up. Zero disables reconnecting.
    pub max_attempts: u32,
    /// Wait before the first attempt
    pub initial_delay: Duration,
    /// Cap for the doubled wait
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Policy that never reconnects.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { max_attempts: 0, initial_delay: Duration::ZERO, max_delay: Duration::ZERO }
    }

    /// Wait before attempt number `attempt` (1-based). `None` once the
    /// attempts are exhausted.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            initial_delay: DEFAULT_RECONNECT_DELAY,
            max_delay: DEFAULT_MAX_RECONNECT_DELAY,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Value of the CONNECT `host` header
    pub host: String,
    /// Timeout for the CONNECT/CONNECTED exchange
    pub handshake_timeout: Duration,
    /// Reconnect behaviour after a lost connection
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Chat session state machine.
///
/// Generic over `Instant` so tests can drive it with virtual time, and over
/// the per-subscription value `H` so the async layer can keep message
/// handlers next to the subscriptions they belong to.
#[derive(Debug)]
pub struct Session<I = Instant, H = ()>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: SessionState,
    config: SessionConfig,
    registry: SubscriptionRegistry<H>,
    token: String,
    /// When the current state was entered
    since: I,
    /// Attempt number of the in-flight handshake, 0 for a caller connect
    attempt: u32,
    /// Wait before the pending reconnect attempt
    retry_delay: Duration,
    version: Option<String>,
}

impl<I, H> Session<I, H>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a session in [`SessionState::Disconnected`].
    pub fn new(now: I, config: SessionConfig) -> Self {
        Self {
            state: SessionState::Disconnected,
            config,
            registry: SubscriptionRegistry::new(),
            token: String::new(),
            since: now,
            attempt: 0,
            retry_delay: Duration::ZERO,
            version: None,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the broker has accepted the session.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// STOMP version selected by the broker. `None` until connected.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Active subscriptions.
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry<H> {
        &self.registry
    }

    /// Value stored with the subscription for `room_id`.
    pub fn handler_mut(&mut self, room_id: &str) -> Option<&mut H> {
        self.registry.get_mut(room_id).map(Subscription::handler_mut)
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// See [`Session::connect`], [`Session::send_message`] and
    /// [`Session::handle_frame`].
    pub fn handle(
        &mut self,
        event: SessionEvent<I, H>,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match event {
            SessionEvent::Connect { token, now } => self.connect(token, now),
            SessionEvent::Disconnect => Ok(self.disconnect()),
            SessionEvent::Subscribe { room_id, handler } => {
                Ok(self.subscribe_to_room(room_id, handler))
            },
            SessionEvent::Unsubscribe { room_id } => Ok(self.unsubscribe_from_room(&room_id)),
            SessionEvent::SendMessage { room_id, content, token } => {
                self.send_message(&room_id, &content, &token)
            },
            SessionEvent::FrameReceived { frame, now } => self.handle_frame(&frame, now),
            SessionEvent::TransportClosed { reason, now } => {
                Ok(self.transport_closed(&reason, now))
            },
            SessionEvent::Tick { now } => Ok(self.tick(now)),
        }
    }

    /// Start a session authenticated with `token`.
    ///
    /// Returns `OpenTransport` followed by the CONNECT frame. A no-op when
    /// already connected. Connecting from `Reconnecting` cancels the pending
    /// retry and keeps the subscriptions. A reconnect handshake already in
    /// flight is adopted: no new frames, and its failure is final.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` if an initial handshake is in flight
    pub fn connect(
        &mut self,
        token: impl Into<String>,
        now: I,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match self.state {
            SessionState::Connected => Ok(Vec::new()),
            SessionState::Connecting if self.attempt > 0 => {
                tracing::debug!(attempt = self.attempt, "adopting reconnect handshake");
                self.token = token.into();
                self.attempt = 0;
                Ok(Vec::new())
            },
            SessionState::Connecting => Err(SessionError::InvalidState {
                state: self.state,
                operation: "connect".to_string(),
            }),
            SessionState::Disconnected | SessionState::Reconnecting { .. } => {
                self.token = token.into();
                self.attempt = 0;
                Ok(self.begin_handshake(now))
            },
        }
    }

    /// Close the session.
    ///
    /// When connected, every subscription is released and a DISCONNECT frame
    /// is sent before the transport is closed. A pending reconnect or a
    /// handshake in flight is abandoned along with the subscriptions. A no-op
    /// when already disconnected.
    pub fn disconnect(&mut self) -> Vec<SessionAction> {
        match self.state {
            SessionState::Connected => {
                let mut actions: Vec<SessionAction> = self
                    .registry
                    .drain()
                    .iter()
                    .map(|s| SessionAction::Send(s.unsubscribe_frame()))
                    .collect();
                actions.push(SessionAction::Send(Frame::disconnect()));
                actions.push(SessionAction::CloseTransport);

                self.reset();
                tracing::info!("session closed");
                actions
            },
            SessionState::Reconnecting { attempt } => {
                tracing::info!(attempt, "reconnect cancelled");
                self.registry.drain();
                self.reset();
                Vec::new()
            },
            SessionState::Connecting => {
                tracing::info!(attempt = self.attempt, "handshake abandoned");
                self.registry.drain();
                self.reset();
                vec![SessionAction::CloseTransport]
            },
            SessionState::Disconnected => Vec::new(),
        }
    }

    /// Subscribe to `room_id`, keeping `handler` with the subscription.
    ///
    /// No-op when not connected or when the room is already subscribed.
    pub fn subscribe_to_room(&mut self, room_id: RoomId, handler: H) -> Vec<SessionAction> {
        if !self.is_connected() {
            tracing::debug!(%room_id, state = ?self.state, "subscribe ignored, not connected");
            return Vec::new();
        }

        let authorization = bearer(&self.token);
        match self.registry.insert(room_id, handler) {
            Some(subscription) => {
                tracing::debug!(room_id = subscription.room_id(), "subscribed");
                vec![SessionAction::Send(subscription.subscribe_frame(Some(&authorization)))]
            },
            None => Vec::new(),
        }
    }

    /// Release the subscription for `room_id`. Unknown rooms are a no-op.
    pub fn unsubscribe_from_room(&mut self, room_id: &str) -> Vec<SessionAction> {
        let Some(subscription) = self.registry.remove(room_id) else {
            return Vec::new();
        };
        tracing::debug!(%room_id, "unsubscribed");

        if self.is_connected() {
            vec![SessionAction::Send(subscription.unsubscribe_frame())]
        } else {
            Vec::new()
        }
    }

    /// Publish `content` to `room_id`, authorized with `token`.
    ///
    /// Returns no actions when not connected.
    ///
    /// # Errors
    ///
    /// - `SessionError::Protocol` if the body cannot be encoded
    pub fn send_message(
        &mut self,
        room_id: &str,
        content: &str,
        token: &str,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if !self.is_connected() {
            tracing::debug!(%room_id, "message dropped, not connected");
            return Ok(Vec::new());
        }

        let body = OutgoingMessage { room_id: room_id.to_string(), content: content.to_string() }
            .to_json()?;
        let frame = Frame::send_json(&destination::room_publish(room_id), token, body);
        Ok(vec![SessionAction::Send(frame)])
    }

    /// Process a frame from the broker.
    ///
    /// # Errors
    ///
    /// - `SessionError::Protocol` if a MESSAGE body for a subscribed room is
    ///   not a chat message. The session stays connected.
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        now: I,
    ) -> Result<Vec<SessionAction>, SessionError> {
        match (self.state, frame.command) {
            (SessionState::Connecting, Command::Connected) => Ok(self.on_connected(frame)),
            (SessionState::Connecting, Command::Error) => {
                let reason = error_reason(frame);
                Ok(self.handshake_failed(SessionError::ConnectionRejected { reason }, now))
            },
            (SessionState::Connected, Command::Message) => self.on_message(frame),
            (SessionState::Connected, Command::Error) => {
                let reason = error_reason(frame);
                tracing::warn!(%reason, "broker closed the session");
                let mut actions = vec![SessionAction::CloseTransport];
                actions.extend(self.connection_lost(&reason, now));
                Ok(actions)
            },
            (state, command) => {
                tracing::debug!(?state, %command, "frame ignored");
                Ok(Vec::new())
            },
        }
    }

    /// The transport closed underneath the session.
    pub fn transport_closed(&mut self, reason: &str, now: I) -> Vec<SessionAction> {
        match self.state {
            SessionState::Connected => {
                tracing::warn!(%reason, "connection lost");
                self.connection_lost(reason, now)
            },
            SessionState::Connecting => {
                self.handshake_failed(SessionError::Transport(reason.to_string()), now)
            },
            SessionState::Disconnected | SessionState::Reconnecting { .. } => Vec::new(),
        }
    }

    /// Process timers: handshake timeout and pending reconnects.
    pub fn tick(&mut self, now: I) -> Vec<SessionAction> {
        let elapsed = now - self.since;
        match self.state {
            SessionState::Connecting if elapsed > self.config.handshake_timeout => {
                self.handshake_failed(SessionError::HandshakeTimeout { elapsed }, now)
            },
            SessionState::Reconnecting { attempt } if elapsed >= self.retry_delay => {
                tracing::info!(attempt, "reconnecting");
                self.attempt = attempt;
                self.begin_handshake(now)
            },
            _ => Vec::new(),
        }
    }

    fn begin_handshake(&mut self, now: I) -> Vec<SessionAction> {
        self.state = SessionState::Connecting;
        self.since = now;
        vec![
            SessionAction::OpenTransport,
            SessionAction::Send(Frame::connect(&self.config.host, &self.token)),
        ]
    }

    fn on_connected(&mut self, frame: &Frame) -> Vec<SessionAction> {
        self.state = SessionState::Connected;
        self.attempt = 0;
        self.version = frame.header(header::VERSION).map(str::to_string);

        let authorization = bearer(&self.token);
        let mut actions: Vec<SessionAction> = self
            .registry
            .iter()
            .map(|s| SessionAction::Send(s.subscribe_frame(Some(&authorization))))
            .collect();
        let resubscribed = self.registry.room_ids();

        tracing::info!(version = ?self.version, resubscribed = resubscribed.len(), "connected");
        actions.push(SessionAction::Connected { version: self.version.clone(), resubscribed });
        actions
    }

    fn on_message(&mut self, frame: &Frame) -> Result<Vec<SessionAction>, SessionError> {
        let Some(room_id) = self.registry.route(frame).cloned() else {
            tracing::debug!(
                subscription = frame.header(header::SUBSCRIPTION),
                destination = frame.header(header::DESTINATION),
                "message for unknown subscription"
            );
            return Ok(Vec::new());
        };

        let message = InboundMessage::from_json(frame.body_str()?)?;
        Ok(vec![SessionAction::Deliver { room_id, message }])
    }

    fn handshake_failed(&mut self, error: SessionError, now: I) -> Vec<SessionAction> {
        tracing::warn!(%error, attempt = self.attempt, "handshake failed");
        let mut actions =
            vec![SessionAction::CloseTransport, SessionAction::HandshakeFailed(error.clone())];

        if self.attempt == 0 {
            self.registry.drain();
            self.reset();
            return actions;
        }

        let next = self.attempt + 1;
        match self.config.reconnect.delay_for(next).filter(|_| error.is_transient()) {
            Some(delay) => actions.extend(self.schedule_reconnect(next, delay, now)),
            None => actions.extend(self.give_up(error.to_string())),
        }
        actions
    }

    fn connection_lost(&mut self, reason: &str, now: I) -> Vec<SessionAction> {
        self.version = None;
        match self.config.reconnect.delay_for(1) {
            Some(delay) => self.schedule_reconnect(1, delay, now),
            None => self.give_up(reason.to_string()),
        }
    }

    fn schedule_reconnect(&mut self, attempt: u32, delay: Duration, now: I) -> Vec<SessionAction> {
        self.state = SessionState::Reconnecting { attempt };
        self.since = now;
        self.retry_delay = delay;
        vec![SessionAction::ReconnectScheduled { attempt, delay }]
    }

    fn give_up(&mut self, reason: String) -> Vec<SessionAction> {
        tracing::warn!(%reason, dropped = self.registry.len(), "giving up on session");
        self.registry.drain();
        self.reset();
        vec![SessionAction::Disconnected { reason }]
    }

    fn reset(&mut self) {
        self.state = SessionState::Disconnected;
        self.attempt = 0;
        self.retry_delay = Duration::ZERO;
        self.version = None;
    }
}

/// Human-readable reason carried by an ERROR frame.
fn error_reason(frame: &Frame) -> String {
    if let Some(message) = frame.header(header::MESSAGE) {
        return message.to_string();
    }
    match frame.body_str() {
        Ok(body) if !body.trim().is_empty() => body.trim().to_string(),
        _ => "broker error".to_string(),
    }
}
