//! Async chat service.
//!
//! [`ChatService`] executes the actions of the Sans-IO [`Session`] against a
//! [`Driver`], routes delivered messages to room handlers and into the
//! [`RoomStore`], and talks to the REST endpoints through [`HistoryApi`].
//!
//! The service is a single owner taken by `&mut self`: session, registry and
//! store mutations are serialized without locks. Store changes are announced
//! on a `watch` channel carrying [`RoomStore::revision`].

use std::{collections::VecDeque, time::Duration};

use spotter_client::{Session, SessionAction, SessionError, SessionState};
use spotter_proto::{
    Frame, RoomId,
    payloads::{ApiChatRoom, InboundMessage},
};
use tokio::sync::watch;

use crate::{
    api::HistoryApi,
    config::ChatConfig,
    driver::Driver,
    error::ChatError,
    store::{Ingest, RoomStore},
    transform::{now_iso, transform_message, transform_room},
    websocket::WebSocketDriver,
};

/// How long [`ChatService::process_cycle`] waits for a frame before ticking.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Callback receiving every message delivered on a room subscription.
pub type MessageHandler = Box<dyn FnMut(&InboundMessage) + Send>;

/// Chat session, room store and history access for one user.
pub struct ChatService<D: Driver> {
    driver: D,
    session: Session<D::Instant, MessageHandler>,
    store: RoomStore,
    api: HistoryApi,
    config: ChatConfig,
    user_id: i64,
    revision: watch::Sender<u64>,
    handshake_error: Option<SessionError>,
}

impl ChatService<WebSocketDriver> {
    /// Service over the WebSocket transport described by `config`.
    pub fn websocket(config: ChatConfig, user_id: i64) -> Self {
        let driver = WebSocketDriver::new(&config);
        Self::new(driver, config, user_id)
    }
}

impl<D: Driver> ChatService<D> {
    /// Service using `driver` for the broker connection. `user_id` is the
    /// current user, used to name direct rooms.
    pub fn new(driver: D, config: ChatConfig, user_id: i64) -> Self {
        let session = Session::new(driver.now(), config.session_config());
        let api = HistoryApi::new(config.api_base_url.clone());
        let store = RoomStore::new();
        let (revision, _) = watch::channel(store.revision());
        Self { driver, session, store, api, config, user_id, revision, handshake_error: None }
    }

    /// Configuration
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// REST client
    pub fn api(&self) -> &HistoryApi {
        &self.api
    }

    /// Room store
    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    /// Session state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Whether the broker has accepted the session.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Receiver notified with the store revision after every change.
    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Mutate the store and notify watchers.
    pub fn update_store<R>(&mut self, f: impl FnOnce(&mut RoomStore) -> R) -> R {
        let result = f(&mut self.store);
        self.publish();
        result
    }

    /// Open a session authenticated with `token`.
    ///
    /// Resolves once the broker accepts the session; a no-op when already
    /// connected. A reconnect handshake in flight is awaited instead of
    /// starting a new one. No retry is attempted when this connect fails.
    /// `connect_timeout` bounds opening the transport and the handshake.
    ///
    /// # Errors
    ///
    /// - `ChatError::Transport` if the transport cannot be opened
    /// - `ChatError::Session` if the broker rejects the handshake
    /// - `ChatError::Timeout` if the open and handshake exceed `connect_timeout`
    pub async fn connect(&mut self, token: &str) -> Result<(), ChatError> {
        if self.session.is_connected() {
            return Ok(());
        }

        let deadline = tokio::time::Instant::now() + self.config.connect_timeout;
        self.handshake_error = None;
        let actions = self.session.connect(token, self.driver.now())?;
        if tokio::time::timeout_at(deadline, self.handshake(actions)).await.is_err() {
            self.transport_lost("connect timeout").await;
            return Err(ChatError::Timeout);
        }

        if self.session.is_connected() {
            return Ok(());
        }
        Err(match self.handshake_error.take() {
            Some(SessionError::Transport(reason)) => ChatError::Transport(reason),
            Some(SessionError::HandshakeTimeout { .. }) => ChatError::Timeout,
            Some(error) => ChatError::Session(error),
            None => ChatError::NotConnected,
        })
    }

    /// Close the session: every room is unsubscribed and the transport is
    /// stopped. Cancels a pending reconnect or one in flight.
    pub async fn disconnect(&mut self) {
        let actions = self.session.disconnect();
        self.execute(actions).await;
    }

    /// Subscribe to `room_id`; `handler` receives each inbound message once.
    ///
    /// Returns false without side effects when not connected or when the
    /// room is already subscribed (the first handler is kept).
    pub async fn subscribe_to_room(
        &mut self,
        room_id: impl Into<RoomId>,
        handler: impl FnMut(&InboundMessage) + Send + 'static,
    ) -> bool {
        let actions = self.session.subscribe_to_room(room_id.into(), Box::new(handler));
        let subscribed = !actions.is_empty();
        self.execute(actions).await;
        subscribed
    }

    /// Release the subscription for `room_id`. Unknown rooms are a no-op.
    pub async fn unsubscribe_from_room(&mut self, room_id: &str) {
        let actions = self.session.unsubscribe_from_room(room_id);
        self.execute(actions).await;
    }

    /// Publish `content` to `room_id`.
    ///
    /// Returns whether the frame was handed to the transport. Messages sent
    /// while disconnected are dropped.
    pub async fn send_message(&mut self, room_id: &str, content: &str, token: &str) -> bool {
        match self.session.send_message(room_id, content, token) {
            Ok(actions) if !actions.is_empty() => {
                self.execute(actions).await;
                self.session.is_connected()
            },
            Ok(_) => false,
            Err(e) => {
                tracing::warn!(error = %e, %room_id, "message not sent");
                false
            },
        }
    }

    /// Wait up to [`POLL_INTERVAL`] for one frame, process it, then run the
    /// session timers (handshake timeout, reconnect).
    pub async fn process_cycle(&mut self) {
        if self.driver.is_open() {
            match tokio::time::timeout(POLL_INTERVAL, self.driver.recv_frame()).await {
                Ok(Some(frame)) => self.handle_frame(&frame).await,
                Ok(None) => self.transport_lost("transport closed").await,
                Err(_) => {},
            }
        } else {
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        let actions = self.session.tick(self.driver.now());
        self.execute(actions).await;
    }

    /// Replace the room list with the rooms from the list endpoint.
    ///
    /// # Errors
    ///
    /// Any [`ChatError`] from [`HistoryApi::list_rooms`].
    pub async fn load_rooms(&mut self, token: &str) -> Result<usize, ChatError> {
        let rooms = self.api.list_rooms(token).await?;
        Ok(self.replace_rooms(&rooms))
    }

    /// Replace the messages of `room_id` with its history.
    ///
    /// # Errors
    ///
    /// Any [`ChatError`] from [`HistoryApi::room_messages`].
    pub async fn load_history(&mut self, token: &str, room_id: &str) -> Result<usize, ChatError> {
        let messages = self.api.room_messages(token, room_id).await?;
        Ok(self.replace_history(room_id, &messages))
    }

    /// Mark `room_id` read on the backend and reset its unread count.
    ///
    /// # Errors
    ///
    /// Any [`ChatError`] from [`HistoryApi::mark_all_read`].
    pub async fn mark_all_read(&mut self, token: &str, room_id: &str) -> Result<(), ChatError> {
        self.api.mark_all_read(token, room_id).await?;
        self.update_store(|store| store.mark_read(room_id));
        Ok(())
    }

    /// Create the direct room with `other_member_id` and add it to the store.
    /// Returns the room id.
    ///
    /// # Errors
    ///
    /// Any [`ChatError`] from [`HistoryApi::create_room`].
    pub async fn create_room(
        &mut self,
        token: &str,
        other_member_id: i64,
    ) -> Result<RoomId, ChatError> {
        let room = self.api.create_room(token, other_member_id).await?;
        self.add_room(&room);
        Ok(room.id)
    }

    /// Leave `room_id` on the backend, release its subscription and drop it
    /// from the store.
    ///
    /// # Errors
    ///
    /// Any [`ChatError`] from [`HistoryApi::leave_room`].
    pub async fn leave_room(&mut self, token: &str, room_id: &str) -> Result<(), ChatError> {
        self.api.leave_room(token, room_id).await?;
        self.unsubscribe_from_room(room_id).await;
        self.update_store(|store| store.remove_room(room_id));
        Ok(())
    }

    /// Add one room from the room endpoints. Returns false when the room is
    /// already known.
    pub fn add_room(&mut self, room: &ApiChatRoom) -> bool {
        let room = transform_room(room, self.user_id, &now_iso());
        self.update_store(|store| store.add_room(room))
    }

    /// Clear the store and add every room of `rooms`. Returns the room count.
    ///
    /// The current room and its messages survive when the room is still in
    /// `rooms`.
    pub fn replace_rooms(&mut self, rooms: &[ApiChatRoom]) -> usize {
        let now = now_iso();
        let user_id = self.user_id;
        self.update_store(|store| {
            let current = store
                .current_room()
                .map(|room_id| (room_id.to_string(), store.messages(room_id)));

            store.clear_rooms();
            for room in rooms {
                store.add_room(transform_room(room, user_id, &now));
            }

            if let Some((room_id, messages)) = current
                && store.room(&room_id).is_some()
            {
                store.replace_messages(&room_id, messages);
                store.set_current_room(Some(room_id));
            }
            store.len()
        })
    }

    /// Replace the messages of `room_id` with `messages`. Returns the number
    /// of messages kept.
    pub fn replace_history(&mut self, room_id: &str, messages: &[InboundMessage]) -> usize {
        let messages: Vec<_> = messages.iter().map(transform_message).collect();
        self.update_store(|store| {
            store.replace_messages(room_id, messages);
            store.message_count(room_id)
        })
    }

    /// Make `room_id` the current room and reset its unread count.
    pub fn open_room(&mut self, room_id: &str) {
        self.update_store(|store| {
            store.set_current_room(Some(room_id.to_string()));
            store.mark_read(room_id);
        });
    }

    /// Open the transport and wait for the broker's answer.
    async fn handshake(&mut self, actions: Vec<SessionAction>) {
        self.execute(actions).await;
        while self.session.state() == SessionState::Connecting {
            match self.driver.recv_frame().await {
                Some(frame) => self.handle_frame(&frame).await,
                None => self.transport_lost("transport closed during handshake").await,
            }
        }
    }

    async fn handle_frame(&mut self, frame: &Frame) {
        tracing::debug!(command = %frame.command, "frame received");
        let now = self.driver.now();
        match self.session.handle_frame(frame, now) {
            Ok(actions) => self.execute(actions).await,
            Err(e) => tracing::warn!(error = %e, command = %frame.command, "dropping frame"),
        }
    }

    async fn transport_lost(&mut self, reason: &str) {
        self.driver.close();
        let actions = self.session.transport_closed(reason, self.driver.now());
        self.execute(actions).await;
    }

    async fn execute(&mut self, actions: Vec<SessionAction>) {
        let mut pending: VecDeque<SessionAction> = actions.into();

        while let Some(action) = pending.pop_front() {
            match action {
                SessionAction::OpenTransport => {
                    if let Err(e) = self.driver.open().await {
                        tracing::error!(error = %e, "transport open failed");
                        let now = self.driver.now();
                        pending.extend(self.session.transport_closed(&e.to_string(), now));
                    }
                },
                SessionAction::Send(frame) => {
                    if !self.driver.is_open() {
                        tracing::debug!(command = %frame.command, "no transport, frame dropped");
                        continue;
                    }
                    tracing::debug!(command = %frame.command, "sending frame");
                    if let Err(e) = self.driver.send_frame(frame).await {
                        tracing::error!(error = %e, "transport send failed");
                        self.driver.close();
                        let now = self.driver.now();
                        pending.extend(self.session.transport_closed(&e.to_string(), now));
                    }
                },
                SessionAction::CloseTransport => self.driver.close(),
                SessionAction::Connected { version, resubscribed } => {
                    tracing::info!(?version, rooms = resubscribed.len(), "chat session connected");
                },
                SessionAction::HandshakeFailed(error) => {
                    self.handshake_error = Some(error);
                },
                SessionAction::Deliver { room_id, message } => self.deliver(&room_id, &message),
                SessionAction::ReconnectScheduled { attempt, delay } => {
                    self.driver.close();
                    tracing::info!(attempt, ?delay, "reconnect scheduled");
                },
                SessionAction::Disconnected { reason } => {
                    tracing::warn!(%reason, "chat session ended");
                },
            }
        }
    }

    fn deliver(&mut self, room_id: &str, message: &InboundMessage) {
        if let Some(handler) = self.session.handler_mut(room_id) {
            handler(message);
        }

        let outcome = self.update_store(|store| store.ingest_message(transform_message(message)));
        if outcome == Ingest::Orphaned {
            tracing::debug!(%room_id, message_id = %message.id, "message for room not in store");
        }
    }

    fn publish(&self) {
        self.revision.send_replace(self.store.revision());
    }
}
