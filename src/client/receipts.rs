use std::collections::HashSet;

use crate::events::ClientEvent;

/// Turns viewing activity into outbound read acknowledgements. The
/// fine-grained path is deduplicated so partial scrolls do not re-ack
/// messages the server already knows about.
#[derive(Debug, Default)]
pub struct ReceiptTracker {
    acked: HashSet<String>,
}

impl ReceiptTracker {
    /// One intent covering everything known in the room at this moment.
    /// Messages arriving afterwards need their own acknowledgement.
    pub fn room_read_intent(&mut self, room_id: &str, known_ids: &[String]) -> ClientEvent {
        for id in known_ids {
            self.acked.insert(id.clone());
        }
        ClientEvent::MarkMessagesRead {
            room_id: room_id.to_string(),
        }
    }

    /// Single-message acknowledgement, used when only part of a backlog
    /// has been viewed. Returns `None` if already acknowledged.
    pub fn message_read_intent(&mut self, message_id: &str) -> Option<ClientEvent> {
        if !self.acked.insert(message_id.to_string()) {
            return None;
        }
        Some(ClientEvent::MarkMessageRead {
            message_id: message_id.to_string(),
        })
    }
}
