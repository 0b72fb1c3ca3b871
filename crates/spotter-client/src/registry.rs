//! Room subscriptions.
//!
//! At most one subscription per room. Each entry keeps the subscription id
//! sent to the broker, the topic, and a caller-supplied value `H` (the async
//! layer stores the message handler there).

use std::{collections::BTreeMap, fmt};

use spotter_proto::{Frame, RoomId, destination, header};

/// One active room subscription.
pub struct Subscription<H = ()> {
    room_id: RoomId,
    id: String,
    destination: String,
    handler: H,
}

impl<H> Subscription<H> {
    fn new(room_id: RoomId, handler: H) -> Self {
        let id = destination::subscription_id(&room_id);
        let destination = destination::room_topic(&room_id);
        Self { room_id, id, destination, handler }
    }

    /// Subscribed room.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Subscription id sent in the SUBSCRIBE frame.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Topic the subscription listens on.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Value stored with the subscription.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutable access to the stored value.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// SUBSCRIBE frame for this subscription.
    pub fn subscribe_frame(&self, authorization: Option<&str>) -> Frame {
        Frame::subscribe(&self.id, &self.destination, authorization)
    }

    /// UNSUBSCRIBE frame for this subscription.
    pub fn unsubscribe_frame(&self) -> Frame {
        Frame::unsubscribe(&self.id)
    }
}

impl<H> fmt::Debug for Subscription<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("room_id", &self.room_id)
            .field("id", &self.id)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

/// Active subscriptions keyed by room id.
pub struct SubscriptionRegistry<H = ()> {
    rooms: BTreeMap<RoomId, Subscription<H>>,
}

impl<H> SubscriptionRegistry<H> {
    /// Empty registry.
    pub fn new() -> Self {
        Self { rooms: BTreeMap::new() }
    }

    /// Add a subscription for `room_id`.
    ///
    /// Returns `None` without touching the existing entry if the room is
    /// already subscribed; `handler` is dropped in that case.
    pub fn insert(&mut self, room_id: RoomId, handler: H) -> Option<&Subscription<H>> {
        if self.rooms.contains_key(&room_id) {
            return None;
        }
        let subscription = Subscription::new(room_id.clone(), handler);
        Some(self.rooms.entry(room_id).or_insert(subscription))
    }

    /// Remove the subscription for `room_id`.
    pub fn remove(&mut self, room_id: &str) -> Option<Subscription<H>> {
        self.rooms.remove(room_id)
    }

    /// Subscription for `room_id`.
    pub fn get(&self, room_id: &str) -> Option<&Subscription<H>> {
        self.rooms.get(room_id)
    }

    /// Mutable subscription for `room_id`.
    pub fn get_mut(&mut self, room_id: &str) -> Option<&mut Subscription<H>> {
        self.rooms.get_mut(room_id)
    }

    /// Whether `room_id` is subscribed.
    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Number of subscriptions.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Subscribed room ids in ascending order.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }

    /// Subscriptions in ascending room order.
    pub fn iter(&self) -> impl Iterator<Item = &Subscription<H>> {
        self.rooms.values()
    }

    /// Remove and return every subscription.
    pub fn drain(&mut self) -> Vec<Subscription<H>> {
        std::mem::take(&mut self.rooms).into_values().collect()
    }

    /// Room a MESSAGE frame belongs to.
    ///
    /// The `subscription` header wins; frames without one are matched on
    /// their `destination`. `None` if neither names a known subscription.
    pub fn route(&self, frame: &Frame) -> Option<&RoomId> {
        if let Some(id) = frame.header(header::SUBSCRIPTION) {
            return self.rooms.values().find(|s| s.id == id).map(|s| &s.room_id);
        }
        let room_id = frame.header(header::DESTINATION).and_then(destination::room_from_topic)?;
        self.rooms.get_key_value(room_id).map(|(k, _)| k)
    }
}

impl<H> Default for SubscriptionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for SubscriptionRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rooms.values()).finish()
    }
}

#[cfg(test)]
mod tests {
    use spotter_proto::Command;

    use super::*;

    #[test]
    fn second_insert_keeps_first_handler() {
        let mut registry = SubscriptionRegistry::new();

        assert!(registry.insert("42".to_string(), "first").is_some());
        assert!(registry.insert("42".to_string(), "second").is_none());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("42").map(|s| *s.handler()), Some("first"));
    }

    #[test]
    fn entry_names_follow_room() {
        let mut registry = SubscriptionRegistry::<()>::new();
        let sub = registry.insert("7".to_string(), ()).unwrap();

        assert_eq!(sub.id(), "room-7");
        assert_eq!(sub.destination(), "/topic/chat-room/7");
        assert_eq!(sub.subscribe_frame(Some("Bearer t")).header("Authorization"), Some("Bearer t"));
        assert_eq!(sub.unsubscribe_frame().command, Command::Unsubscribe);
    }

    #[test]
    fn route_prefers_subscription_header() {
        let mut registry = SubscriptionRegistry::<()>::new();
        registry.insert("1".to_string(), ());
        registry.insert("2".to_string(), ());

        let frame = Frame::new(Command::Message)
            .with_header("subscription", "room-2")
            .with_header("destination", "/topic/chat-room/1");
        assert_eq!(registry.route(&frame).map(String::as_str), Some("2"));

        let by_destination =
            Frame::new(Command::Message).with_header("destination", "/topic/chat-room/1");
        assert_eq!(registry.route(&by_destination).map(String::as_str), Some("1"));

        let unknown = Frame::new(Command::Message).with_header("subscription", "room-9");
        assert_eq!(registry.route(&unknown), None);
    }

    #[test]
    fn drain_empties_registry() {
        let mut registry = SubscriptionRegistry::<()>::new();
        registry.insert("b".to_string(), ());
        registry.insert("a".to_string(), ());

        let drained: Vec<_> = registry.drain().into_iter().map(|s| s.room_id).collect();

        assert_eq!(drained, vec!["a".to_string(), "b".to_string()]);
        assert!(registry.is_empty());
    }
}
