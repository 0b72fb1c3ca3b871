//! JSON payloads exchanged with the chat backend.
//!
//! Inbound message bodies and REST responses are typed here so that a shape
//! mismatch is a [`ProtocolError`] at the boundary instead of a missing field
//! deep inside the store.
//!
//! The backend is not consistent about identifier types: sender ids are JSON
//! numbers on the broker and in history, while some producers send strings.
//! [`WireId`] accepts both.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    RoomId,
    errors::{ProtocolError, Result},
};

/// Sender id reserved for server-generated messages.
pub const SYSTEM_SENDER_ID: i64 = 0;

/// Identifier that may arrive as a JSON number or a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    /// Numeric id.
    Number(i64),
    /// String id.
    Text(String),
}

impl WireId {
    /// Whether this is the reserved system sender.
    pub fn is_system(&self) -> bool {
        match self {
            Self::Number(n) => *n == SYSTEM_SENDER_ID,
            Self::Text(s) => s.trim().parse::<i64>() == Ok(SYSTEM_SENDER_ID),
        }
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for WireId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for WireId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Message classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Message written by a participant.
    Chat,
    /// Message generated by the backend.
    System,
}

/// One chat message as the backend sends it.
///
/// Used both for `MESSAGE` frame bodies on a room topic and for entries of
/// the history endpoint. The creation time is accepted as `timestamp` or as
/// the backend's `createdAt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Message id.
    pub id: String,
    /// Owning room.
    pub room_id: RoomId,
    /// Sender id. `0` marks a system message.
    pub sender_id: WireId,
    /// Receiver id, when the backend includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<WireId>,
    /// Message text.
    pub content: String,
    /// ISO-8601 creation time.
    #[serde(alias = "createdAt")]
    pub timestamp: String,
    /// Explicit classification, when the backend includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    /// Read flag, when the backend includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
    /// Members that have read the message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read_by_members: Vec<i64>,
}

impl InboundMessage {
    /// Parse a frame body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedFrame` if the body is not a message object
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|e| ProtocolError::MalformedFrame(format!("invalid message body: {e}")))
    }
}

/// Chat room as returned by the room endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiChatRoom {
    /// Room id.
    pub id: RoomId,
    /// Explicit room name, if one was set.
    #[serde(default)]
    pub room_name: Option<String>,
    /// Member ids of every participant, including the current user.
    #[serde(default)]
    pub participants: Vec<i64>,
    /// Nickname of the other participant, when the backend resolves it.
    #[serde(default)]
    pub other_member_nickname: Option<String>,
    /// Preview of the latest message.
    #[serde(default)]
    pub last_message: Option<String>,
    /// Time of the latest message.
    #[serde(default)]
    pub last_message_time: Option<String>,
}

/// Spring Data page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    pub content: Vec<T>,
    /// Zero-based page number.
    #[serde(default)]
    pub number: u32,
    /// Requested page size.
    #[serde(default)]
    pub size: u32,
    /// Items across all pages.
    #[serde(default)]
    pub total_elements: u64,
    /// Number of pages.
    #[serde(default)]
    pub total_pages: u32,
    /// First page.
    #[serde(default)]
    pub first: bool,
    /// Last page.
    #[serde(default)]
    pub last: bool,
    /// No items.
    #[serde(default)]
    pub empty: bool,
}

/// List endpoint response: either a page or a bare array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    /// Paginated response.
    Page(Page<T>),
    /// Bare JSON array.
    List(Vec<T>),
}

impl<T> ListResponse<T> {
    /// Items of the response, regardless of shape.
    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Page(page) => page.content,
            Self::List(items) => items,
        }
    }
}

/// Body of a published chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    /// Target room.
    pub room_id: RoomId,
    /// Message text.
    pub content: String,
}

impl OutgoingMessage {
    /// JSON encoding of the message.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_accepts_string_and_numeric_ids() {
        let from_broker = InboundMessage::from_json(
            r#"{"id":"m1","roomId":"42","senderId":7,"receiverId":9,"content":"hi","createdAt":"2024-01-01T00:00:00","messageType":"CHAT","isRead":false,"readByMembers":[7]}"#,
        )
        .unwrap();
        let from_string = InboundMessage::from_json(
            r#"{"id":"m1","roomId":"42","senderId":"7","content":"hi","timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        assert_eq!(from_broker.sender_id, WireId::Number(7));
        assert_eq!(from_broker.timestamp, "2024-01-01T00:00:00");
        assert_eq!(from_broker.message_type, Some(MessageType::Chat));
        assert_eq!(from_string.sender_id, WireId::Text("7".into()));
        assert_eq!(from_string.receiver_id, None);
    }

    #[test]
    fn inbound_missing_field_fails_closed() {
        let result = InboundMessage::from_json(r#"{"id":"m1","roomId":"42"}"#);
        assert!(matches!(result, Err(ProtocolError::MalformedFrame(_))));

        let result = InboundMessage::from_json("not json");
        assert!(matches!(result, Err(ProtocolError::MalformedFrame(_))));
    }

    #[test]
    fn system_sender_detection() {
        assert!(WireId::Number(0).is_system());
        assert!(WireId::from("0").is_system());
        assert!(!WireId::Number(7).is_system());
        assert!(!WireId::from("07a").is_system());
    }

    #[test]
    fn list_response_accepts_page_or_array() {
        let page: ListResponse<i32> =
            serde_json::from_str(r#"{"content":[1,2],"number":0,"size":20,"totalElements":2}"#).unwrap();
        let list: ListResponse<i32> = serde_json::from_str("[3]").unwrap();

        assert_eq!(page.into_items(), vec![1, 2]);
        assert_eq!(list.into_items(), vec![3]);
    }

    #[test]
    fn outgoing_message_uses_camel_case() {
        let json = OutgoingMessage { room_id: "42".into(), content: "hey".into() }.to_json().unwrap();
        assert_eq!(json, r#"{"roomId":"42","content":"hey"}"#);
    }
}
