//! Property-based tests for the room store.

use std::collections::HashSet;

use proptest::prelude::*;
use spotter_app::{ChatMessage, ChatRoom, Ingest, RoomStore, UserType, transform::sort_by_timestamp};
use spotter_proto::payloads::MessageType;

#[derive(Debug, Clone)]
enum Op {
    AddRoom(u8),
    Ingest { room: u8, id: u8 },
    Open(u8),
    MarkRead(u8),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..6).prop_map(Op::AddRoom),
        4 => (0u8..6, 0u8..20).prop_map(|(room, id)| Op::Ingest { room, id }),
        1 => (0u8..6).prop_map(Op::Open),
        1 => (0u8..6).prop_map(Op::MarkRead),
        1 => Just(Op::Clear),
    ]
}

fn room(id: u8) -> ChatRoom {
    ChatRoom {
        id: id.to_string(),
        name: format!("room {id}"),
        last_message: String::new(),
        time: String::new(),
        user_type: UserType::User,
        unread_count: 0,
    }
}

fn message(room: u8, id: u8, second: u8) -> ChatMessage {
    ChatMessage {
        id: format!("m{id}"),
        room_id: room.to_string(),
        sender_id: "7".to_string(),
        receiver_id: None,
        content: format!("content {id}"),
        timestamp: format!("2024-01-01T00:00:{:02}Z", second % 60),
        message_type: MessageType::Chat,
    }
}

proptest! {
    #[test]
    fn prop_store_invariants_hold(
        ops in prop::collection::vec(op_strategy(), 0..80),
        seconds in prop::collection::vec(0u8..60, 20),
    ) {
        let mut store = RoomStore::new();

        for op in ops {
            let revision = store.revision();
            match op {
                Op::AddRoom(id) => {
                    let existed = store.room(&id.to_string()).cloned();
                    let count = store.len();
                    let added = store.add_room(room(id));

                    prop_assert_eq!(added, existed.is_none());
                    if let Some(before) = existed {
                        prop_assert_eq!(store.len(), count);
                        prop_assert_eq!(store.room(&id.to_string()), Some(&before));
                    }
                },
                Op::Ingest { room, id } => {
                    // Delivery order is arbitrary; a message id always carries the same time.
                    let outcome = store.ingest_message(message(room, id, seconds[usize::from(id)]));
                    if let Ingest::Updated { unread_count } = outcome {
                        let r = store.room(&room.to_string()).unwrap();
                        let newest = store.messages(&room.to_string()).pop().unwrap();
                        prop_assert_eq!(&r.last_message, &newest.content);
                        prop_assert_eq!(&r.time, &newest.timestamp);
                        prop_assert_eq!(r.unread_count, unread_count);
                    } else {
                        prop_assert!(store.message_count(&room.to_string()) > 0);
                    }
                    prop_assert!(store.revision() > revision);
                },
                Op::Open(id) => {
                    store.set_current_room(Some(id.to_string()));
                    store.mark_read(&id.to_string());
                },
                Op::MarkRead(id) => {
                    store.mark_read(&id.to_string());
                    if let Some(r) = store.room(&id.to_string()) {
                        prop_assert_eq!(r.unread_count, 0);
                    }
                },
                Op::Clear => {
                    store.clear_rooms();
                    prop_assert!(store.room_ids().is_empty());
                    prop_assert_eq!(store.rooms().count(), 0);
                    prop_assert_eq!(store.current_room(), None);
                },
            }

            let ids = store.room_ids();
            let unique: HashSet<_> = ids.iter().collect();
            prop_assert_eq!(unique.len(), ids.len());
            for id in ids {
                prop_assert!(store.room(id).is_some());
                let messages = store.messages(id);
                let mut sorted = messages.clone();
                sort_by_timestamp(&mut sorted);
                prop_assert_eq!(messages, sorted);
            }
            if let Some(current) = store.current_room()
                && let Some(r) = store.room(current)
            {
                prop_assert_eq!(r.unread_count, 0);
            }
        }
    }

    #[test]
    fn prop_sort_orders_by_instant(seconds in prop::collection::vec(0u8..60, 0..30)) {
        let mut messages: Vec<_> =
            seconds.iter().enumerate().map(|(i, s)| message(0, i as u8, *s)).collect();
        sort_by_timestamp(&mut messages);

        for pair in messages.windows(2) {
            prop_assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }
}
