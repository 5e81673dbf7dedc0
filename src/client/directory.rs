use std::collections::HashMap;

use crate::model::{ChatRoom, Message, MessagePreview};

#[derive(Debug, Clone)]
pub struct RoomEntry {
    pub room: ChatRoom,
    pub unread: u32,
    pub last_message: Option<MessagePreview>,
}

/// What selecting a room requires of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// New active room: history must be requested, mark-as-read emitted.
    LoadHistory,
    /// Same room reselected: no history reload, mark-as-read still emitted.
    AlreadyActive,
    /// Unknown room id, nothing to do.
    Unknown,
}

/// Authoritative list of rooms this user belongs to, with client-derived
/// unread counts and previews layered on top of server snapshots.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<String, RoomEntry>,
    active: Option<String>,
}

impl RoomDirectory {
    /// Full directory push from the server. Unread counts and previews are
    /// client-derived state and survive for rooms that remain present.
    pub fn replace_all(&mut self, rooms: Vec<ChatRoom>) {
        let mut next = HashMap::with_capacity(rooms.len());
        for room in rooms {
            let (unread, last_message) = match self.rooms.get(&room.id) {
                Some(existing) => (existing.unread, existing.last_message.clone()),
                None => (0, None),
            };
            next.insert(
                room.id.clone(),
                RoomEntry {
                    room,
                    unread,
                    last_message,
                },
            );
        }
        self.rooms = next;
        if let Some(active) = &self.active {
            if !self.rooms.contains_key(active) {
                self.active = None;
            }
        }
    }

    /// Wholesale metadata replacement; the server owns room shape.
    pub fn apply_snapshot(&mut self, room: ChatRoom) {
        match self.rooms.get_mut(&room.id) {
            Some(entry) => entry.room = room,
            None => {
                self.rooms.insert(
                    room.id.clone(),
                    RoomEntry {
                        room,
                        unread: 0,
                        last_message: None,
                    },
                );
            }
        }
    }

    pub fn select(&mut self, room_id: &str) -> SelectOutcome {
        if !self.rooms.contains_key(room_id) {
            return SelectOutcome::Unknown;
        }
        if self.active.as_deref() == Some(room_id) {
            return SelectOutcome::AlreadyActive;
        }
        self.active = Some(room_id.to_string());
        SelectOutcome::LoadHistory
    }

    pub fn active_room(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Unread accounting for a message that is not going into the visible
    /// log. Messages authored locally never count.
    pub fn note_unread(&mut self, message: &Message, local_user: &str) {
        if message.sender_id == local_user {
            return;
        }
        if let Some(entry) = self.rooms.get_mut(&message.room_id) {
            entry.unread += 1;
        }
    }

    /// Reset happens when the room's history is delivered, which is the
    /// acknowledgement of the mark-as-read intent.
    pub fn reset_unread(&mut self, room_id: &str) {
        if let Some(entry) = self.rooms.get_mut(room_id) {
            entry.unread = 0;
        }
    }

    pub fn record_preview(&mut self, message: &Message) {
        if let Some(entry) = self.rooms.get_mut(&message.room_id) {
            entry.last_message = Some(MessagePreview::of(message));
        }
    }

    pub fn get(&self, room_id: &str) -> Option<&RoomEntry> {
        self.rooms.get(room_id)
    }

    /// Rooms sorted by most recent activity, untouched rooms last by name.
    pub fn listing(&self) -> Vec<&RoomEntry> {
        let mut entries: Vec<_> = self.rooms.values().collect();
        entries.sort_by(|a, b| {
            let ats = a.last_message.as_ref().map(|p| p.timestamp);
            let bts = b.last_message.as_ref().map(|p| p.timestamp);
            bts.cmp(&ats).then_with(|| a.room.name.cmp(&b.room.name))
        });
        entries
    }
}
