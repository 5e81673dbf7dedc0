use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    File,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub mime_type: String,
    pub url: String,
    pub filename: String,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub user_ids: Vec<String>,
}

/// A confirmed message as the server stores and broadcasts it. The id and
/// timestamp are server-assigned; timestamps are monotonic within a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    pub kind: MessageKind,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Milliseconds since the unix epoch, server clock.
    pub timestamp: i64,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl Message {
    /// Unions `user_id` into the read set. Idempotent; read state only grows.
    pub fn mark_read_by(&mut self, user_id: &str) -> bool {
        if self.read_by.iter().any(|u| u == user_id) {
            return false;
        }
        self.read_by.push(user_id.to_string());
        true
    }

    /// Toggles `user_id` under `emoji`: absent adds, present removes. Empty
    /// reaction entries are dropped so counts reflect current state only.
    pub fn toggle_reaction(&mut self, emoji: &str, user_id: &str) {
        if let Some(reaction) = self.reactions.iter_mut().find(|r| r.emoji == emoji) {
            if let Some(pos) = reaction.user_ids.iter().position(|u| u == user_id) {
                reaction.user_ids.remove(pos);
            } else {
                reaction.user_ids.push(user_id.to_string());
            }
        } else {
            self.reactions.push(Reaction {
                emoji: emoji.to_string(),
                user_ids: vec![user_id.to_string()],
            });
        }
        self.reactions.retain(|r| !r.user_ids.is_empty());
    }

    /// A message is fully read once every member other than the sender has
    /// acknowledged it.
    pub fn is_fully_read(&self, room: &ChatRoom) -> bool {
        room.members
            .iter()
            .filter(|m| **m != self.sender_id)
            .all(|m| self.read_by.iter().any(|u| u == m))
    }
}

/// What the Composer emits: a message before the server has assigned an id.
/// The timestamp is the client's provisional value and is overwritten by the
/// server on acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    pub kind: MessageKind,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub reply_to: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    Public,
    Private,
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: RoomKind,
    pub members: Vec<String>,
    pub admins: Vec<String>,
    pub active: bool,
}

impl ChatRoom {
    /// Structural invariants: admins are a subset of members and a direct
    /// room has exactly two members.
    pub fn is_valid(&self) -> bool {
        let admins_ok = self
            .admins
            .iter()
            .all(|a| self.members.iter().any(|m| m == a));
        let direct_ok = self.kind != RoomKind::Direct || self.members.len() == 2;
        admins_ok && direct_ok
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Online,
    Away,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: String,
    pub state: PresenceState,
    /// Set when the user is not online.
    #[serde(default)]
    pub last_seen: Option<i64>,
}

/// Client-derived preview shown in the room list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePreview {
    pub body: String,
    pub sender_name: String,
    pub timestamp: i64,
}

impl MessagePreview {
    pub fn of(message: &Message) -> Self {
        MessagePreview {
            body: message.body.clone(),
            sender_name: message.sender_name.clone(),
            timestamp: message.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message {
            id: "m1".into(),
            room_id: "r1".into(),
            sender_id: "alice".into(),
            sender_name: "Alice".into(),
            sender_role: "mentor".into(),
            kind: MessageKind::Text,
            body: "hello".into(),
            attachments: vec![],
            reply_to: None,
            timestamp: 1_000,
            read_by: vec![],
            reactions: vec![],
        }
    }

    #[test]
    fn read_set_is_monotonic_and_idempotent() {
        let mut m = message();
        assert!(m.mark_read_by("bob"));
        assert!(!m.mark_read_by("bob"));
        assert_eq!(m.read_by, vec!["bob".to_string()]);
    }

    #[test]
    fn reaction_toggle_is_its_own_inverse() {
        let mut m = message();
        m.toggle_reaction("👍", "bob");
        assert_eq!(m.reactions.len(), 1);
        m.toggle_reaction("👍", "bob");
        assert!(m.reactions.is_empty());
    }

    #[test]
    fn one_user_may_hold_several_emojis() {
        let mut m = message();
        m.toggle_reaction("👍", "bob");
        m.toggle_reaction("🎉", "bob");
        assert_eq!(m.reactions.len(), 2);
    }

    #[test]
    fn fully_read_excludes_sender() {
        let mut m = message();
        let room = ChatRoom {
            id: "r1".into(),
            name: "general".into(),
            description: None,
            kind: RoomKind::Public,
            members: vec!["alice".into(), "bob".into(), "carol".into()],
            admins: vec!["alice".into()],
            active: true,
        };
        assert!(!m.is_fully_read(&room));
        m.mark_read_by("bob");
        m.mark_read_by("carol");
        assert!(m.is_fully_read(&room));
    }

    #[test]
    fn direct_room_needs_two_members() {
        let room = ChatRoom {
            id: "d1".into(),
            name: "dm".into(),
            description: None,
            kind: RoomKind::Direct,
            members: vec!["alice".into()],
            admins: vec![],
            active: true,
        };
        assert!(!room.is_valid());
    }
}
