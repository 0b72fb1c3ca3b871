//! In-memory room and message store.
//!
//! The store is the single owner of rooms, their display order and the
//! per-room messages. Every mutation bumps [`RoomStore::revision`] so that
//! readers can tell when to re-read.

use std::collections::HashMap;

use spotter_proto::RoomId;

use crate::transform::{ChatMessage, ChatRoom, display_order, sort_by_timestamp};

/// Outcome of [`RoomStore::ingest_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// New message stored and the preview set to the room's newest message.
    Updated {
        /// Unread count of the room after the update
        unread_count: u32,
    },
    /// Message stored with the same id as an earlier one; counters unchanged.
    Duplicate,
    /// Message stored for a room the store does not know.
    Orphaned,
}

/// Rooms, their order, and per-room messages.
#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: HashMap<RoomId, ChatRoom>,
    room_ids: Vec<RoomId>,
    messages: HashMap<RoomId, HashMap<String, ChatMessage>>,
    current_room: Option<RoomId>,
    revision: u64,
}

impl RoomStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a room. The first write for an id wins; returns whether the room
    /// was added.
    pub fn add_room(&mut self, room: ChatRoom) -> bool {
        if self.rooms.contains_key(&room.id) {
            return false;
        }
        self.room_ids.push(room.id.clone());
        self.rooms.insert(room.id.clone(), room);
        self.touch();
        true
    }

    /// Store a message, replacing any message with the same id in its room.
    /// Room previews are left alone.
    pub fn add_message(&mut self, message: ChatMessage) {
        self.insert_message(message);
        self.touch();
    }

    /// Store a live message and update its room's preview.
    ///
    /// The preview always shows the newest stored message of the room, so a
    /// late message older than that one leaves it alone. The unread count
    /// grows only for rooms other than the current room and only for message
    /// ids not seen before.
    pub fn ingest_message(&mut self, message: ChatMessage) -> Ingest {
        let room_id = message.room_id.clone();
        let is_new = self.insert_message(message);
        self.touch();

        let newest = self
            .messages
            .get(&room_id)
            .and_then(|messages| messages.values().max_by(|a, b| display_order(*a, *b)))
            .map(|newest| (newest.content.clone(), newest.timestamp.clone()));

        let is_current = self.current_room.as_deref() == Some(room_id.as_str());
        let Some(room) = self.rooms.get_mut(&room_id) else {
            tracing::debug!(%room_id, "message for unknown room");
            return Ingest::Orphaned;
        };
        if !is_new {
            return Ingest::Duplicate;
        }

        if let Some((content, timestamp)) = newest {
            room.last_message = content;
            room.time = timestamp;
        }
        if !is_current {
            room.unread_count = room.unread_count.saturating_add(1);
        }
        Ingest::Updated { unread_count: room.unread_count }
    }

    /// Remove every room, message and the current room.
    pub fn clear_rooms(&mut self) {
        self.rooms.clear();
        self.room_ids.clear();
        self.messages.clear();
        self.current_room = None;
        self.touch();
    }

    /// Remove `room_id` and its messages. Returns false for unknown rooms.
    pub fn remove_room(&mut self, room_id: &str) -> bool {
        if self.rooms.remove(room_id).is_none() {
            return false;
        }
        self.room_ids.retain(|id| id != room_id);
        self.messages.remove(room_id);
        if self.current_room.as_deref() == Some(room_id) {
            self.current_room = None;
        }
        self.touch();
        true
    }

    /// Set the room the user is looking at.
    pub fn set_current_room(&mut self, room_id: Option<RoomId>) {
        if self.current_room != room_id {
            self.current_room = room_id;
            self.touch();
        }
    }

    /// Room the user is looking at.
    pub fn current_room(&self) -> Option<&str> {
        self.current_room.as_deref()
    }

    /// Reset the unread count of `room_id`. Returns false for unknown rooms.
    pub fn mark_read(&mut self, room_id: &str) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        if room.unread_count != 0 {
            room.unread_count = 0;
            self.touch();
        }
        true
    }

    /// Room by id.
    pub fn room(&self, room_id: &str) -> Option<&ChatRoom> {
        self.rooms.get(room_id)
    }

    /// Rooms in insertion order.
    pub fn rooms(&self) -> impl Iterator<Item = &ChatRoom> {
        self.room_ids.iter().filter_map(|id| self.rooms.get(id))
    }

    /// Room ids in insertion order.
    pub fn room_ids(&self) -> &[RoomId] {
        &self.room_ids
    }

    /// Number of rooms.
    pub fn len(&self) -> usize {
        self.room_ids.len()
    }

    /// Whether the store has no rooms.
    pub fn is_empty(&self) -> bool {
        self.room_ids.is_empty()
    }

    /// Messages of `room_id` in display order.
    pub fn messages(&self, room_id: &str) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> =
            self.messages.get(room_id).map(|m| m.values().cloned().collect()).unwrap_or_default();
        sort_by_timestamp(&mut messages);
        messages
    }

    /// Number of messages stored for `room_id`.
    pub fn message_count(&self, room_id: &str) -> usize {
        self.messages.get(room_id).map_or(0, HashMap::len)
    }

    /// Replace the messages of `room_id` with `messages` (history load).
    ///
    /// Messages whose `room_id` differs are ignored.
    pub fn replace_messages(&mut self, room_id: &str, messages: Vec<ChatMessage>) {
        let entries = messages
            .into_iter()
            .filter(|m| m.room_id == room_id)
            .map(|m| (m.id.clone(), m))
            .collect();
        self.messages.insert(room_id.to_string(), entries);
        self.touch();
    }

    /// Change counter, bumped by every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn insert_message(&mut self, message: ChatMessage) -> bool {
        self.messages
            .entry(message.room_id.clone())
            .or_default()
            .insert(message.id.clone(), message)
            .is_none()
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use spotter_proto::payloads::MessageType;

    use super::*;
    use crate::transform::UserType;

    fn room(id: &str, name: &str) -> ChatRoom {
        ChatRoom {
            id: id.to_string(),
            name: name.to_string(),
            last_message: String::new(),
            time: String::new(),
            user_type: UserType::User,
            unread_count: 0,
        }
    }

    fn message(room_id: &str, id: &str, timestamp: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            room_id: room_id.to_string(),
            sender_id: "7".to_string(),
            receiver_id: None,
            content: format!("msg {id}"),
            timestamp: timestamp.to_string(),
            message_type: MessageType::Chat,
        }
    }

    #[test]
    fn add_room_first_write_wins() {
        let mut store = RoomStore::new();

        assert!(store.add_room(room("1", "first")));
        assert!(!store.add_room(room("1", "second")));
        store.add_room(room("2", "other"));

        assert_eq!(store.room_ids(), ["1".to_string(), "2".to_string()]);
        assert_eq!(store.room("1").map(|r| r.name.as_str()), Some("first"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn add_message_leaves_preview() {
        let mut store = RoomStore::new();
        store.add_room(room("1", "a"));

        store.add_message(message("1", "m1", "2024-01-01T00:00:00Z"));

        assert_eq!(store.room("1").map(|r| r.last_message.as_str()), Some(""));
        assert_eq!(store.message_count("1"), 1);
    }

    #[test]
    fn ingest_updates_preview_and_unread() {
        let mut store = RoomStore::new();
        store.add_room(room("1", "a"));
        store.add_room(room("2", "b"));
        store.set_current_room(Some("2".to_string()));

        let outcome = store.ingest_message(message("1", "m1", "2024-01-01T00:00:01Z"));
        assert_eq!(outcome, Ingest::Updated { unread_count: 1 });
        let room = store.room("1").unwrap();
        assert_eq!(room.last_message, "msg m1");
        assert_eq!(room.time, "2024-01-01T00:00:01Z");

        let outcome = store.ingest_message(message("2", "m2", "2024-01-01T00:00:02Z"));
        assert_eq!(outcome, Ingest::Updated { unread_count: 0 });

        assert_eq!(store.ingest_message(message("1", "m1", "2024-01-01T00:00:01Z")), Ingest::Duplicate);
        assert_eq!(store.room("1").unwrap().unread_count, 1);

        assert!(store.mark_read("1"));
        assert_eq!(store.room("1").unwrap().unread_count, 0);
        assert!(!store.mark_read("9"));
    }

    #[test]
    fn older_message_keeps_newer_preview() {
        let mut store = RoomStore::new();
        store.add_room(room("1", "a"));

        store.ingest_message(message("1", "m2", "2024-01-01T00:00:02Z"));
        let outcome = store.ingest_message(message("1", "m1", "2024-01-01T00:00:01Z"));

        assert_eq!(outcome, Ingest::Updated { unread_count: 2 });
        let room = store.room("1").unwrap();
        assert_eq!(room.last_message, "msg m2");
        assert_eq!(room.time, "2024-01-01T00:00:02Z");
        assert_eq!(store.messages("1").last().map(|m| m.content.as_str()), Some("msg m2"));
    }

    #[test]
    fn remove_room_drops_messages_and_current() {
        let mut store = RoomStore::new();
        store.add_room(room("1", "a"));
        store.add_room(room("2", "b"));
        store.ingest_message(message("1", "m1", "2024-01-01T00:00:00Z"));
        store.set_current_room(Some("1".to_string()));

        assert!(store.remove_room("1"));
        assert!(!store.remove_room("1"));

        assert_eq!(store.room_ids(), ["2".to_string()]);
        assert_eq!(store.message_count("1"), 0);
        assert_eq!(store.current_room(), None);
    }

    #[test]
    fn orphaned_messages_are_kept() {
        let mut store = RoomStore::new();

        let outcome = store.ingest_message(message("9", "m1", "2024-01-01T00:00:00Z"));

        assert_eq!(outcome, Ingest::Orphaned);
        assert_eq!(store.message_count("9"), 1);
        assert!(store.room("9").is_none());
    }

    #[test]
    fn messages_are_sorted_by_timestamp() {
        let mut store = RoomStore::new();
        store.add_message(message("1", "c", "2024-01-01T00:00:03Z"));
        store.add_message(message("1", "a", "2024-01-01T00:00:01Z"));
        store.add_message(message("1", "b", "2024-01-01T00:00:02Z"));

        let ids: Vec<_> = store.messages("1").into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn replace_messages_drops_foreign_rooms() {
        let mut store = RoomStore::new();
        store.add_message(message("1", "old", "2024-01-01T00:00:00Z"));

        store.replace_messages("1", vec![
            message("1", "h1", "2024-01-01T00:00:01Z"),
            message("2", "x", "2024-01-01T00:00:01Z"),
        ]);

        let ids: Vec<_> = store.messages("1").into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["h1"]);
        assert_eq!(store.message_count("2"), 0);
    }

    #[test]
    fn clear_rooms_resets_everything() {
        let mut store = RoomStore::new();
        store.add_room(room("1", "a"));
        store.add_message(message("1", "m1", "2024-01-01T00:00:00Z"));
        store.set_current_room(Some("1".to_string()));
        let before = store.revision();

        store.clear_rooms();

        assert!(store.room_ids().is_empty());
        assert!(store.room("1").is_none());
        assert!(store.messages("1").is_empty());
        assert_eq!(store.current_room(), None);
        assert!(store.revision() > before);
    }
}
