use serde::{Deserialize, Serialize};

use crate::model::{ChatRoom, Message, MessageDraft, UserStatus};

/// Events the client sends to the server. Wire shape is
/// `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    #[serde(rename = "join_room")]
    JoinRoom { room_id: String },
    #[serde(rename = "get_messages")]
    GetMessages { room_id: String },
    #[serde(rename = "send_message")]
    SendMessage(MessageDraft),
    #[serde(rename = "typing")]
    Typing { room_id: String },
    #[serde(rename = "stop_typing")]
    StopTyping { room_id: String },
    #[serde(rename = "mark_messages_read")]
    MarkMessagesRead { room_id: String },
    #[serde(rename = "mark_message_read")]
    MarkMessageRead { message_id: String },
    #[serde(rename = "add_reaction")]
    AddReaction { message_id: String, emoji: String },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "chat_rooms")]
    ChatRooms(Vec<ChatRoom>),
    /// History replay for one room. Delivery order is not guaranteed to
    /// match creation order; the client sorts.
    #[serde(rename = "messages")]
    Messages(Vec<Message>),
    #[serde(rename = "new_message")]
    NewMessage(Message),
    #[serde(rename = "message_read")]
    MessageRead { message_id: String, user_id: String },
    #[serde(rename = "typing")]
    Typing {
        room_id: String,
        user_id: String,
        user_name: String,
    },
    #[serde(rename = "stop_typing")]
    StopTyping { room_id: String, user_id: String },
    /// Full presence snapshot, pushed whenever any tracked user changes.
    #[serde(rename = "user_status")]
    UserStatus(Vec<UserStatus>),
    /// Full replacement of one room's metadata.
    #[serde(rename = "room_updated")]
    RoomUpdated(ChatRoom),
    /// Reaction toggle applied server-side, fanned out to room members.
    #[serde(rename = "reaction")]
    Reaction {
        message_id: String,
        emoji: String,
        user_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_wire_shape() {
        let ev = ClientEvent::JoinRoom {
            room_id: "r1".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "join_room");
        assert_eq!(json["data"]["roomId"], "r1");
    }

    #[test]
    fn server_event_round_trips() {
        let ev = ServerEvent::MessageRead {
            message_id: "m1".into(),
            user_id: "u1".into(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        match back {
            ServerEvent::MessageRead { message_id, user_id } => {
                assert_eq!(message_id, "m1");
                assert_eq!(user_id, "u1");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
