//! Broker destinations.
//!
//! The backend's simple broker serves `/topic/...` and routes
//! `/app/...` to application handlers.

/// Prefix of per-room topic destinations.
pub const ROOM_TOPIC_PREFIX: &str = "/topic/chat-room/";

/// Prefix of per-room publish destinations.
pub const ROOM_PUBLISH_PREFIX: &str = "/app/chat-room/";

/// Prefix of subscription ids.
pub const SUBSCRIPTION_ID_PREFIX: &str = "room-";

/// Topic carrying inbound messages for `room_id`.
pub fn room_topic(room_id: &str) -> String {
    format!("{ROOM_TOPIC_PREFIX}{room_id}")
}

/// Destination outbound messages for `room_id` are published to.
pub fn room_publish(room_id: &str) -> String {
    format!("{ROOM_PUBLISH_PREFIX}{room_id}")
}

/// Subscription id used for `room_id`.
pub fn subscription_id(room_id: &str) -> String {
    format!("{SUBSCRIPTION_ID_PREFIX}{room_id}")
}

/// Room id from a room topic destination. `None` for other destinations.
pub fn room_from_topic(destination: &str) -> Option<&str> {
    destination.strip_prefix(ROOM_TOPIC_PREFIX).filter(|id| !id.is_empty())
}
