use log::debug;

use crate::model::{Message, MessageDraft};

/// A locally composed message awaiting its server echo. Rendered after the
/// confirmed log, visually distinguishable as unconfirmed.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub draft: MessageDraft,
}

/// Ordered message log for the active room only. The transport does not
/// guarantee arrival order matches creation order, so ordering is enforced
/// here on every load and insert.
#[derive(Debug, Default)]
pub struct MessageStore {
    room_id: Option<String>,
    messages: Vec<Message>,
    pending: Vec<PendingMessage>,
}

impl MessageStore {
    /// Drops the previous room's contents and starts tracking `room_id`.
    pub fn reset_for(&mut self, room_id: &str) {
        self.room_id = Some(room_id.to_string());
        self.messages.clear();
        self.pending.clear();
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }

    /// Bulk history load. The server sends these unsorted.
    pub fn load_history(&mut self, mut messages: Vec<Message>) {
        messages.retain(|m| Some(m.room_id.as_str()) == self.room_id.as_deref());
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        self.messages = messages;
    }

    /// Appends a confirmed message if it belongs to the active room,
    /// keeping timestamp order. Returns false when the message is for
    /// another room and must be routed to unread accounting instead.
    pub fn append_incoming(&mut self, message: Message) -> bool {
        if Some(message.room_id.as_str()) != self.room_id.as_deref() {
            return false;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            debug!("duplicate message {} dropped", message.id);
            return true;
        }
        let at = self
            .messages
            .partition_point(|m| (m.timestamp, m.id.as_str()) <= (message.timestamp, message.id.as_str()));
        self.messages.insert(at, message);
        true
    }

    pub fn track_pending(&mut self, draft: MessageDraft) {
        self.pending.push(PendingMessage { draft });
    }

    /// Clears the oldest pending entry the server echo corresponds to. The
    /// server assigns ids, so matching is by sender and body.
    pub fn confirm_pending(&mut self, message: &Message) {
        if let Some(pos) = self
            .pending
            .iter()
            .position(|p| p.draft.sender_id == message.sender_id && p.draft.body == message.body)
        {
            self.pending.remove(pos);
        }
    }

    /// Idempotent union of `user_id` into the message's read set. Read
    /// state never shrinks.
    pub fn apply_read_receipt(&mut self, message_id: &str, user_id: &str) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
            message.mark_read_by(user_id);
        }
    }

    /// Toggle semantics: the store is the arbiter of add vs remove.
    pub fn apply_reaction(&mut self, message_id: &str, emoji: &str, user_id: &str) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
            message.toggle_reaction(emoji, user_id);
        }
    }

    pub fn get(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }
}
