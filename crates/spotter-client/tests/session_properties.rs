//! Property-based tests for the session state machine.
//!
//! Arbitrary interleavings of caller operations, broker frames, transport
//! failures and timer ticks must never break the subscription invariants.

use std::time::{Duration, Instant};

use proptest::prelude::*;
use spotter_client::{Session, SessionAction, SessionConfig, SessionState};
use spotter_proto::{Command, Frame};

#[derive(Debug, Clone)]
enum Op {
    Subscribe(u8),
    Unsubscribe(u8),
    Inbound(u8),
    Send(u8),
    TransportClosed,
    Accept,
    Tick(u64),
    Disconnect,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..4).prop_map(Op::Subscribe),
        1 => (0u8..4).prop_map(Op::Unsubscribe),
        3 => (0u8..4).prop_map(Op::Inbound),
        1 => (0u8..4).prop_map(Op::Send),
        1 => Just(Op::TransportClosed),
        2 => Just(Op::Accept),
        2 => (0u64..90).prop_map(Op::Tick),
        1 => Just(Op::Disconnect),
    ]
}

fn message_frame(room: &str) -> Frame {
    let body = format!(
        r#"{{"id":"m","roomId":"{room}","senderId":7,"content":"x","timestamp":"2024-01-01T00:00:00Z"}}"#
    );
    Frame::new(Command::Message)
        .with_header("subscription", format!("room-{room}"))
        .with_header("destination", format!("/topic/chat-room/{room}"))
        .with_body(body.into_bytes())
}

fn subscribe_count(actions: &[SessionAction]) -> usize {
    actions
        .iter()
        .filter(|a| matches!(a, SessionAction::Send(f) if f.command == Command::Subscribe))
        .count()
}

proptest! {
    #[test]
    fn prop_subscription_invariants_hold(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let mut now = Instant::now();
        let mut session: Session<Instant> = Session::new(now, SessionConfig::default());
        session.connect("tok", now).unwrap();
        session.handle_frame(&Frame::new(Command::Connected), now).unwrap();

        for op in ops {
            let was_connected = session.is_connected();

            match op {
                Op::Subscribe(n) => {
                    let room = n.to_string();
                    let already = session.registry().contains(&room);
                    let actions = session.subscribe_to_room(room.clone(), ());

                    let expected = usize::from(was_connected && !already);
                    prop_assert_eq!(subscribe_count(&actions), expected);
                    prop_assert_eq!(actions.len(), expected);
                },
                Op::Unsubscribe(n) => {
                    session.unsubscribe_from_room(&n.to_string());
                    prop_assert!(!session.registry().contains(&n.to_string()));
                },
                Op::Inbound(n) => {
                    let room = n.to_string();
                    let routed = was_connected && session.registry().contains(&room);
                    let actions = session.handle_frame(&message_frame(&room), now).unwrap();

                    let delivered: Vec<_> = actions
                        .iter()
                        .filter_map(|a| match a {
                            SessionAction::Deliver { room_id, .. } => Some(room_id.clone()),
                            _ => None,
                        })
                        .collect();
                    if routed {
                        prop_assert_eq!(delivered, vec![room]);
                    } else {
                        prop_assert!(delivered.is_empty());
                    }
                },
                Op::Send(n) => {
                    let actions = session.send_message(&n.to_string(), "hi", "tok").unwrap();
                    prop_assert_eq!(actions.len(), usize::from(was_connected));
                },
                Op::TransportClosed => {
                    session.transport_closed("lost", now);
                    prop_assert!(!session.is_connected());
                },
                Op::Accept => {
                    let before = session.registry().len();
                    let connecting = session.state() == SessionState::Connecting;
                    let actions =
                        session.handle_frame(&Frame::new(Command::Connected), now).unwrap();
                    if connecting {
                        prop_assert_eq!(subscribe_count(&actions), before);
                        prop_assert!(session.is_connected());
                    }
                },
                Op::Tick(secs) => {
                    now += Duration::from_secs(secs);
                    session.tick(now);
                },
                Op::Disconnect => {
                    session.disconnect();
                    prop_assert_eq!(session.state(), SessionState::Disconnected);
                    prop_assert!(session.tick(now + Duration::from_secs(3600)).is_empty());
                },
            }

            if session.state() == SessionState::Disconnected {
                prop_assert!(session.registry().is_empty());
            }
        }
    }
}

#[test]
fn subscribe_handler_survives_reconnect() {
    let now = Instant::now();
    let mut session: Session<Instant, &str> = Session::new(now, SessionConfig::default());
    session.connect("tok", now).unwrap();
    session.handle_frame(&Frame::new(Command::Connected), now).unwrap();
    session.subscribe_to_room("42".into(), "handler");

    session.transport_closed("lost", now);
    let later = now + Duration::from_secs(5);
    session.tick(later);
    session.handle_frame(&Frame::new(Command::Connected), later).unwrap();

    assert_eq!(session.handler_mut("42").copied(), Some("handler"));
}
