//! Per-user event rooms for the presence socket.

use crate::conversations::MessageView;
use crate::notifications::NotificationView;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const ROOM_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RealtimeEvent {
    NewMessage(MessageView),
    NewNotification(NotificationView),
}

/// Handle shared by the HTTP layer. Rooms are keyed by user id and created on first join.
#[derive(Clone, Default)]
pub struct RealtimeHub {
    rooms: Arc<Mutex<HashMap<String, broadcast::Sender<RealtimeEvent>>>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, user_id: &str) -> broadcast::Receiver<RealtimeEvent> {
        let mut rooms = match self.rooms.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rooms
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Fire-and-forget delivery to every socket joined to `user_id`'s room.
    /// Returns how many receivers got the event.
    pub fn emit(&self, user_id: &str, event: RealtimeEvent) -> usize {
        let mut rooms = match self.rooms.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(sender) = rooms.get(user_id) else {
            return 0;
        };
        match sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                rooms.remove(user_id);
                0
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().map(|rooms| rooms.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::MessageType;

    fn message(receiver: &str) -> MessageView {
        MessageView {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "alice".into(),
            receiver_id: receiver.into(),
            content: Some("hi".into()),
            message_type: MessageType::Text,
            media_url: None,
            is_seen: false,
            delivered_at: None,
            seen_at: None,
            created_at: "now".into(),
        }
    }

    #[tokio::test]
    async fn events_reach_only_the_target_room() {
        let hub = RealtimeHub::new();
        let mut bob = hub.join("bob");
        let mut carol = hub.join("carol");

        assert_eq!(hub.emit("bob", RealtimeEvent::NewMessage(message("bob"))), 1);
        match bob.recv().await.unwrap() {
            RealtimeEvent::NewMessage(view) => assert_eq!(view.receiver_id, "bob"),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(carol.try_recv().is_err());
    }

    #[test]
    fn emitting_to_absent_or_abandoned_rooms_is_harmless() {
        let hub = RealtimeHub::new();
        assert_eq!(hub.emit("nobody", RealtimeEvent::NewMessage(message("nobody"))), 0);

        drop(hub.join("bob"));
        assert_eq!(hub.room_count(), 1);
        assert_eq!(hub.emit("bob", RealtimeEvent::NewMessage(message("bob"))), 0);
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn events_serialize_with_name_and_payload() {
        let json = serde_json::to_value(RealtimeEvent::NewMessage(message("bob"))).unwrap();
        assert_eq!(json["event"], "newMessage");
        assert_eq!(json["data"]["receiverId"], "bob");
    }
}
