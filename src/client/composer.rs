use chrono::Utc;
use thiserror::Error;

use crate::attachments::{AttachmentError, AttachmentStore};
use crate::events::ClientEvent;
use crate::model::{Attachment, MessageDraft, MessageKind};

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("message body is empty")]
    EmptyBody,
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
}

/// Identity stamped onto everything the local user sends.
#[derive(Debug, Clone)]
pub struct LocalUser {
    pub id: String,
    pub name: String,
    pub role: String,
}

/// Converts user intent into outbound drafts. Timestamps set here are
/// provisional and only preserve visual ordering until the server echo
/// carries the authoritative value.
#[derive(Debug, Clone)]
pub struct Composer {
    user: LocalUser,
}

impl Composer {
    pub fn new(user: LocalUser) -> Self {
        Composer { user }
    }

    pub fn user(&self) -> &LocalUser {
        &self.user
    }

    pub fn draft_text(
        &self,
        room_id: &str,
        body: &str,
        reply_to: Option<String>,
    ) -> Result<MessageDraft, ComposeError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ComposeError::EmptyBody);
        }
        Ok(self.draft(room_id, MessageKind::Text, body.to_string(), vec![], reply_to))
    }

    /// Uploads through the storage collaborator, then drafts a message
    /// carrying the returned URL. Content is held fully in memory; large
    /// files belong behind a streaming store.
    pub async fn draft_attachment(
        &self,
        room_id: &str,
        filename: &str,
        mime_type: &str,
        content: Vec<u8>,
        store: &dyn AttachmentStore,
    ) -> Result<MessageDraft, ComposeError> {
        let stored = store.put(filename, mime_type, content).await?;
        let kind = if mime_type.starts_with("image/") {
            MessageKind::Image
        } else {
            MessageKind::File
        };
        let attachment = Attachment {
            mime_type: mime_type.to_string(),
            url: stored.url,
            filename: filename.to_string(),
            size: stored.size,
        };
        Ok(self.draft(room_id, kind, filename.to_string(), vec![attachment], None))
    }

    /// Always a toggle; the message store decides whether it adds or
    /// removes membership once the server echo comes back.
    pub fn reaction_intent(&self, message_id: &str, emoji: &str) -> ClientEvent {
        ClientEvent::AddReaction {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        }
    }

    fn draft(
        &self,
        room_id: &str,
        kind: MessageKind,
        body: String,
        attachments: Vec<Attachment>,
        reply_to: Option<String>,
    ) -> MessageDraft {
        MessageDraft {
            room_id: room_id.to_string(),
            sender_id: self.user.id.clone(),
            sender_name: self.user.name.clone(),
            sender_role: self.user.role.clone(),
            kind,
            body,
            attachments,
            reply_to,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::StoredAttachment;
    use async_trait::async_trait;

    fn composer() -> Composer {
        Composer::new(LocalUser {
            id: "alice".into(),
            name: "Alice".into(),
            role: "mentor".into(),
        })
    }

    struct FakeStore;

    #[async_trait]
    impl AttachmentStore for FakeStore {
        async fn put(
            &self,
            _filename: &str,
            _mime_type: &str,
            content: Vec<u8>,
        ) -> Result<StoredAttachment, AttachmentError> {
            Ok(StoredAttachment {
                url: "/files/abc".into(),
                size: content.len(),
            })
        }
    }

    #[test]
    fn whitespace_only_body_is_rejected() {
        assert!(matches!(
            composer().draft_text("r1", "   \n\t", None),
            Err(ComposeError::EmptyBody)
        ));
    }

    #[test]
    fn text_draft_carries_sender_identity() {
        let draft = composer().draft_text("r1", " hello ", None).unwrap();
        assert_eq!(draft.body, "hello");
        assert_eq!(draft.sender_id, "alice");
        assert_eq!(draft.kind, MessageKind::Text);
        assert!(draft.timestamp > 0);
    }

    #[tokio::test]
    async fn image_mime_yields_image_kind() {
        let draft = composer()
            .draft_attachment("r1", "photo.png", "image/png", vec![1, 2, 3], &FakeStore)
            .await
            .unwrap();
        assert_eq!(draft.kind, MessageKind::Image);
        assert_eq!(draft.attachments[0].url, "/files/abc");
        assert_eq!(draft.attachments[0].size, 3);
    }

    #[tokio::test]
    async fn other_mime_yields_file_kind() {
        let draft = composer()
            .draft_attachment("r1", "notes.pdf", "application/pdf", vec![0; 10], &FakeStore)
            .await
            .unwrap();
        assert_eq!(draft.kind, MessageKind::File);
    }
}
