//! Wire shapes to display shapes.
//!
//! Pure functions: anything time-dependent takes `now` from the caller.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use spotter_proto::{
    RoomId,
    payloads::{ApiChatRoom, InboundMessage, MessageType},
};

/// Role of the counterparty, used for rendering only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    /// Regular member
    #[default]
    User,
    /// Trainer
    Trainer,
    /// Administrator
    Admin,
}

/// Room as displayed in the room list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    /// Room id
    pub id: RoomId,
    /// Display name
    pub name: String,
    /// Preview of the latest message
    pub last_message: String,
    /// Time of the latest activity
    pub time: String,
    /// Counterparty role
    pub user_type: UserType,
    /// Messages received while the room was not open
    pub unread_count: u32,
}

/// Message as displayed in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message id
    pub id: String,
    /// Owning room
    pub room_id: RoomId,
    /// Sender id
    pub sender_id: String,
    /// Receiver id, when known
    pub receiver_id: Option<String>,
    /// Message text
    pub content: String,
    /// ISO-8601 creation time
    pub timestamp: String,
    /// `System` for server-generated messages
    pub message_type: MessageType,
}

/// Display shape of a room from the room endpoints.
///
/// The name falls back from `roomName` to `otherMemberNickname` to the
/// first participant other than `current_user_id`.
pub fn transform_room(room: &ApiChatRoom, current_user_id: i64, now: &str) -> ChatRoom {
    let name = non_empty(room.room_name.as_deref())
        .or_else(|| non_empty(room.other_member_nickname.as_deref()))
        .map_or_else(
            || match room.participants.iter().find(|id| **id != current_user_id) {
                Some(other) => format!("User {other}"),
                None => "User Unknown".to_string(),
            },
            str::to_string,
        );

    ChatRoom {
        id: room.id.clone(),
        name,
        last_message: room.last_message.clone().unwrap_or_default(),
        time: room.last_message_time.clone().unwrap_or_else(|| now.to_string()),
        user_type: UserType::default(),
        unread_count: 0,
    }
}

/// Display shape of a wire message. Sender `0` marks a system message.
pub fn transform_message(message: &InboundMessage) -> ChatMessage {
    let message_type =
        if message.sender_id.is_system() { MessageType::System } else { MessageType::Chat };

    ChatMessage {
        id: message.id.clone(),
        room_id: message.room_id.clone(),
        sender_id: message.sender_id.to_string(),
        receiver_id: message.receiver_id.as_ref().map(ToString::to_string),
        content: message.content.clone(),
        timestamp: message.timestamp.clone(),
        message_type,
    }
}

/// Current time in the format the backend and the previews use.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Items ordered by creation time.
pub trait Timestamped {
    /// ISO-8601 creation time
    fn timestamp(&self) -> &str;
    /// Tie breaker
    fn id(&self) -> &str;
}

impl Timestamped for ChatMessage {
    fn timestamp(&self) -> &str {
        &self.timestamp
    }

    fn id(&self) -> &str {
        &self.id
    }
}

impl Timestamped for InboundMessage {
    fn timestamp(&self) -> &str {
        &self.timestamp
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Sort ascending by timestamp, then id.
///
/// Timestamps are compared as instants (RFC 3339, or zone-less ISO local
/// times read as UTC). Unparseable timestamps sort after parseable ones,
/// in string order.
pub fn sort_by_timestamp<T: Timestamped>(items: &mut [T]) {
    items.sort_by_cached_key(display_key);
}

/// Ordering used by [`sort_by_timestamp`].
pub fn display_order<T: Timestamped>(a: &T, b: &T) -> Ordering {
    display_key(a).cmp(&display_key(b))
}

fn display_key<T: Timestamped>(item: &T) -> (bool, Option<DateTime<Utc>>, String, String) {
    let parsed = parse_timestamp(item.timestamp());
    (parsed.is_none(), parsed, item.timestamp().to_string(), item.id().to_string())
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
