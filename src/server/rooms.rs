use std::collections::HashMap;

use chrono::Utc;
use log::{debug, warn};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;
use warp::ws::Message as WsMessage;

use crate::auth::UserProfile;
use crate::events::{ClientEvent, ServerEvent};
use crate::model::{ChatRoom, Message, MessageDraft};
use crate::server::presence::PresenceRegistry;

#[derive(Error, Debug)]
pub enum RoomError {
    #[error("room {0} violates structural invariants")]
    InvalidRoom(String),
    #[error("room {0} already exists")]
    Duplicate(String),
}

#[derive(Debug, Default)]
struct RoomLog {
    messages: Vec<Message>,
    last_timestamp: i64,
}

type ConnectionMap = HashMap<String, mpsc::UnboundedSender<WsMessage>>;

/// The server's single source of truth: room shape, per-room ordered logs,
/// presence, and the fan-out map of live connections.
#[derive(Default)]
pub struct ServerState {
    rooms: RwLock<HashMap<String, ChatRoom>>,
    logs: RwLock<HashMap<String, RoomLog>>,
    connections: RwLock<ConnectionMap>,
    /// Which room each connected user is currently viewing.
    active: RwLock<HashMap<String, String>>,
    pub presence: PresenceRegistry,
}

impl ServerState {
    pub async fn register_connection(
        &self,
        user_id: &str,
        tx: mpsc::UnboundedSender<WsMessage>,
    ) {
        let mut connections = self.connections.write().await;
        connections.insert(user_id.to_string(), tx);
    }

    pub async fn unregister_connection(&self, user_id: &str) {
        self.connections.write().await.remove(user_id);
        self.active.write().await.remove(user_id);
    }

    /// Rooms are created out-of-band (seed file, admin surface); this is
    /// that entry point.
    pub async fn create_room(&self, room: ChatRoom) -> Result<(), RoomError> {
        if !room.is_valid() {
            return Err(RoomError::InvalidRoom(room.id));
        }
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room.id) {
            return Err(RoomError::Duplicate(room.id));
        }
        self.logs
            .write()
            .await
            .insert(room.id.clone(), RoomLog::default());
        rooms.insert(room.id.clone(), room);
        Ok(())
    }

    /// Full replacement of a room's metadata, fanned out to its members.
    pub async fn update_room(&self, room: ChatRoom) -> Result<(), RoomError> {
        if !room.is_valid() {
            return Err(RoomError::InvalidRoom(room.id));
        }
        let room_id = room.id.clone();
        {
            let mut rooms = self.rooms.write().await;
            rooms.insert(room_id.clone(), room.clone());
        }
        self.broadcast_to_members(&room_id, &ServerEvent::RoomUpdated(room))
            .await;
        Ok(())
    }

    pub async fn rooms_for(&self, user_id: &str) -> Vec<ChatRoom> {
        let rooms = self.rooms.read().await;
        let mut list: Vec<ChatRoom> = rooms
            .values()
            .filter(|r| r.has_member(user_id))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub async fn handle_event(&self, profile: &UserProfile, event: ClientEvent) {
        if self.presence.touch(&profile.id).await {
            self.push_presence().await;
        }
        match event {
            ClientEvent::JoinRoom { room_id } => self.join_room(profile, &room_id).await,
            ClientEvent::GetMessages { room_id } => self.replay_messages(profile, &room_id).await,
            ClientEvent::SendMessage(draft) => self.accept_message(profile, draft).await,
            ClientEvent::Typing { room_id } => {
                self.fan_out_typing(profile, &room_id, true).await;
            }
            ClientEvent::StopTyping { room_id } => {
                self.fan_out_typing(profile, &room_id, false).await;
            }
            ClientEvent::MarkMessagesRead { room_id } => {
                self.mark_room_read(profile, &room_id).await;
            }
            ClientEvent::MarkMessageRead { message_id } => {
                self.mark_message_read(profile, &message_id).await;
            }
            ClientEvent::AddReaction { message_id, emoji } => {
                self.toggle_reaction(profile, &message_id, &emoji).await;
            }
        }
    }

    async fn join_room(&self, profile: &UserProfile, room_id: &str) {
        if !self.is_member(&profile.id, room_id).await {
            warn!("{} joined non-member room {room_id}", profile.id);
            return;
        }
        let mut active = self.active.write().await;
        active.insert(profile.id.clone(), room_id.to_string());
    }

    async fn replay_messages(&self, profile: &UserProfile, room_id: &str) {
        if !self.is_member(&profile.id, room_id).await {
            return;
        }
        let logs = self.logs.read().await;
        let messages = logs
            .get(room_id)
            .map(|log| log.messages.clone())
            .unwrap_or_default();
        self.send_to_user(&profile.id, &ServerEvent::Messages(messages))
            .await;
    }

    /// Accepts a draft: assigns the id, stamps the sender from the
    /// authenticated profile, and overwrites the provisional timestamp with
    /// a value kept monotonic per room even across clock regressions.
    async fn accept_message(&self, profile: &UserProfile, draft: MessageDraft) {
        let room_id = draft.room_id.clone();
        if !self.is_member(&profile.id, &room_id).await {
            warn!("{} sent to non-member room {room_id}", profile.id);
            return;
        }
        let message = {
            let mut logs = self.logs.write().await;
            let log = logs.entry(room_id.clone()).or_default();
            let now = Utc::now().timestamp_millis();
            let timestamp = now.max(log.last_timestamp + 1);
            log.last_timestamp = timestamp;
            let message = Message {
                id: Uuid::new_v4().to_string(),
                room_id: room_id.clone(),
                sender_id: profile.id.clone(),
                sender_name: profile.name.clone(),
                sender_role: profile.role.clone(),
                kind: draft.kind,
                body: draft.body,
                attachments: draft.attachments,
                reply_to: draft.reply_to,
                timestamp,
                read_by: Vec::new(),
                reactions: Vec::new(),
            };
            log.messages.push(message.clone());
            message
        };
        self.broadcast_to_members(&room_id, &ServerEvent::NewMessage(message))
            .await;
    }

    /// Typing is ephemeral and only meaningful to users looking at the
    /// room, so it goes to current viewers rather than all members.
    async fn fan_out_typing(&self, profile: &UserProfile, room_id: &str, start: bool) {
        if !self.is_member(&profile.id, room_id).await {
            return;
        }
        let event = if start {
            ServerEvent::Typing {
                room_id: room_id.to_string(),
                user_id: profile.id.clone(),
                user_name: profile.name.clone(),
            }
        } else {
            ServerEvent::StopTyping {
                room_id: room_id.to_string(),
                user_id: profile.id.clone(),
            }
        };
        let viewers = self.viewers_of(room_id).await;
        let Ok(json) = serde_json::to_string(&event) else {
            return;
        };
        let connections = self.connections.read().await;
        for viewer in viewers {
            if viewer == profile.id {
                continue;
            }
            if let Some(tx) = connections.get(&viewer) {
                let _ = tx.send(WsMessage::text(json.clone()));
            }
        }
    }

    /// Users whose selected room is `room_id` right now.
    async fn viewers_of(&self, room_id: &str) -> Vec<String> {
        let active = self.active.read().await;
        active
            .iter()
            .filter(|(_, viewed)| viewed.as_str() == room_id)
            .map(|(user, _)| user.clone())
            .collect()
    }

    /// Room-level acknowledgement: covers the log as of now. Receipts are
    /// add-only; a user already present is skipped.
    async fn mark_room_read(&self, profile: &UserProfile, room_id: &str) {
        if !self.is_member(&profile.id, room_id).await {
            return;
        }
        let newly_read: Vec<String> = {
            let mut logs = self.logs.write().await;
            let Some(log) = logs.get_mut(room_id) else {
                return;
            };
            log.messages
                .iter_mut()
                .filter(|m| m.sender_id != profile.id)
                .filter_map(|m| m.mark_read_by(&profile.id).then(|| m.id.clone()))
                .collect()
        };
        for message_id in newly_read {
            self.broadcast_to_members(
                room_id,
                &ServerEvent::MessageRead {
                    message_id,
                    user_id: profile.id.clone(),
                },
            )
            .await;
        }
    }

    async fn mark_message_read(&self, profile: &UserProfile, message_id: &str) {
        let room_id = {
            let mut logs = self.logs.write().await;
            let mut found = None;
            for (room_id, log) in logs.iter_mut() {
                if let Some(message) = log.messages.iter_mut().find(|m| m.id == message_id) {
                    if message.sender_id != profile.id && message.mark_read_by(&profile.id) {
                        found = Some(room_id.clone());
                    }
                    break;
                }
            }
            found
        };
        let Some(room_id) = room_id else { return };
        if !self.is_member(&profile.id, &room_id).await {
            return;
        }
        self.broadcast_to_members(
            &room_id,
            &ServerEvent::MessageRead {
                message_id: message_id.to_string(),
                user_id: profile.id.clone(),
            },
        )
        .await;
    }

    async fn toggle_reaction(&self, profile: &UserProfile, message_id: &str, emoji: &str) {
        let room_id = {
            let mut logs = self.logs.write().await;
            let mut found = None;
            for (room_id, log) in logs.iter_mut() {
                if let Some(message) = log.messages.iter_mut().find(|m| m.id == message_id) {
                    message.toggle_reaction(emoji, &profile.id);
                    found = Some(room_id.clone());
                    break;
                }
            }
            found
        };
        let Some(room_id) = room_id else {
            debug!("reaction for unknown message {message_id}");
            return;
        };
        if !self.is_member(&profile.id, &room_id).await {
            return;
        }
        self.broadcast_to_members(
            &room_id,
            &ServerEvent::Reaction {
                message_id: message_id.to_string(),
                emoji: emoji.to_string(),
                user_id: profile.id.clone(),
            },
        )
        .await;
    }

    async fn is_member(&self, user_id: &str, room_id: &str) -> bool {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).is_some_and(|r| r.has_member(user_id))
    }

    /// Pushes the full presence snapshot to every live connection.
    pub async fn push_presence(&self) {
        let snapshot = self.presence.snapshot().await;
        let event = ServerEvent::UserStatus(snapshot);
        let Ok(json) = serde_json::to_string(&event) else {
            return;
        };
        let connections = self.connections.read().await;
        for tx in connections.values() {
            let _ = tx.send(WsMessage::text(json.clone()));
        }
    }

    pub async fn send_to_user(&self, user_id: &str, event: &ServerEvent) {
        let Ok(json) = serde_json::to_string(event) else {
            return;
        };
        let connections = self.connections.read().await;
        if let Some(tx) = connections.get(user_id) {
            let _ = tx.send(WsMessage::text(json));
        }
    }

    pub async fn broadcast_to_members(&self, room_id: &str, event: &ServerEvent) {
        let members = {
            let rooms = self.rooms.read().await;
            match rooms.get(room_id) {
                Some(room) => room.members.clone(),
                None => return,
            }
        };
        let Ok(json) = serde_json::to_string(event) else {
            return;
        };
        let connections = self.connections.read().await;
        for member in members {
            if let Some(tx) = connections.get(&member) {
                let _ = tx.send(WsMessage::text(json.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageKind, RoomKind};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn profile(id: &str) -> UserProfile {
        UserProfile {
            id: id.into(),
            name: id.into(),
            role: "member".into(),
        }
    }

    fn room(id: &str, members: &[&str]) -> ChatRoom {
        ChatRoom {
            id: id.into(),
            name: id.into(),
            description: None,
            kind: RoomKind::Public,
            members: members.iter().map(|m| (*m).to_string()).collect(),
            admins: vec![members[0].to_string()],
            active: true,
        }
    }

    fn draft(room_id: &str, body: &str) -> MessageDraft {
        MessageDraft {
            room_id: room_id.into(),
            sender_id: "ignored".into(),
            sender_name: "ignored".into(),
            sender_role: "ignored".into(),
            kind: MessageKind::Text,
            body: body.into(),
            attachments: vec![],
            reply_to: None,
            timestamp: 1,
        }
    }

    async fn connect(state: &ServerState, user: &str) -> UnboundedReceiver<WsMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        state.register_connection(user, tx).await;
        rx
    }

    fn next_event(rx: &mut UnboundedReceiver<WsMessage>) -> ServerEvent {
        let msg = rx.try_recv().expect("expected an event");
        serde_json::from_str(msg.to_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn invalid_room_is_refused() {
        let state = ServerState::default();
        let mut bad = room("r1", &["alice"]);
        bad.admins = vec!["stranger".into()];
        assert!(matches!(
            state.create_room(bad).await,
            Err(RoomError::InvalidRoom(_))
        ));
    }

    #[tokio::test]
    async fn accepted_messages_get_monotonic_timestamps() {
        let state = ServerState::default();
        state.create_room(room("r1", &["alice", "bob"])).await.unwrap();
        let mut rx = connect(&state, "bob").await;

        state
            .handle_event(&profile("alice"), ClientEvent::SendMessage(draft("r1", "one")))
            .await;
        state
            .handle_event(&profile("alice"), ClientEvent::SendMessage(draft("r1", "two")))
            .await;

        let first = match next_event(&mut rx) {
            ServerEvent::NewMessage(m) => m,
            other => panic!("unexpected: {other:?}"),
        };
        let second = match next_event(&mut rx) {
            ServerEvent::NewMessage(m) => m,
            other => panic!("unexpected: {other:?}"),
        };
        assert!(second.timestamp > first.timestamp);
        // Provisional client timestamp was discarded.
        assert!(first.timestamp > 1);
        assert_eq!(first.sender_id, "alice");
    }

    #[tokio::test]
    async fn non_members_cannot_send() {
        let state = ServerState::default();
        state.create_room(room("r1", &["alice", "bob"])).await.unwrap();
        let mut rx = connect(&state, "alice").await;
        state
            .handle_event(&profile("mallory"), ClientEvent::SendMessage(draft("r1", "hi")))
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_reaches_viewers_but_not_the_sender() {
        let state = ServerState::default();
        state
            .create_room(room("r1", &["alice", "bob", "carol"]))
            .await
            .unwrap();
        let mut alice_rx = connect(&state, "alice").await;
        let mut bob_rx = connect(&state, "bob").await;
        let mut carol_rx = connect(&state, "carol").await;

        state
            .handle_event(&profile("alice"), ClientEvent::JoinRoom { room_id: "r1".into() })
            .await;
        state
            .handle_event(&profile("bob"), ClientEvent::JoinRoom { room_id: "r1".into() })
            .await;
        // Carol is a member but is not viewing r1.

        state
            .handle_event(&profile("alice"), ClientEvent::Typing { room_id: "r1".into() })
            .await;

        match next_event(&mut bob_rx) {
            ServerEvent::Typing { user_id, .. } => assert_eq!(user_id, "alice"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(alice_rx.try_recv().is_err());
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn room_read_broadcasts_receipts_once() {
        let state = ServerState::default();
        state.create_room(room("r1", &["alice", "bob"])).await.unwrap();
        state
            .handle_event(&profile("alice"), ClientEvent::SendMessage(draft("r1", "hi")))
            .await;
        let mut rx = connect(&state, "alice").await;

        state
            .handle_event(&profile("bob"), ClientEvent::MarkMessagesRead { room_id: "r1".into() })
            .await;
        match next_event(&mut rx) {
            ServerEvent::MessageRead { user_id, .. } => assert_eq!(user_id, "bob"),
            other => panic!("unexpected: {other:?}"),
        }

        // Second ack covers nothing new.
        state
            .handle_event(&profile("bob"), ClientEvent::MarkMessagesRead { room_id: "r1".into() })
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reaction_toggle_round_trip() {
        let state = ServerState::default();
        state.create_room(room("r1", &["alice", "bob"])).await.unwrap();
        state
            .handle_event(&profile("alice"), ClientEvent::SendMessage(draft("r1", "hi")))
            .await;
        let message_id = {
            let logs = state.logs.read().await;
            logs.get("r1").unwrap().messages[0].id.clone()
        };

        state
            .handle_event(
                &profile("bob"),
                ClientEvent::AddReaction { message_id: message_id.clone(), emoji: "👍".into() },
            )
            .await;
        state
            .handle_event(
                &profile("bob"),
                ClientEvent::AddReaction { message_id: message_id.clone(), emoji: "👍".into() },
            )
            .await;

        let logs = state.logs.read().await;
        assert!(logs.get("r1").unwrap().messages[0].reactions.is_empty());
    }

    #[tokio::test]
    async fn room_update_is_a_full_replacement() {
        let state = ServerState::default();
        state.create_room(room("r1", &["alice", "bob"])).await.unwrap();
        let mut rx = connect(&state, "alice").await;

        let updated = room("r1", &["alice", "bob", "carol"]);
        state.update_room(updated).await.unwrap();

        match next_event(&mut rx) {
            ServerEvent::RoomUpdated(r) => assert_eq!(r.members.len(), 3),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
