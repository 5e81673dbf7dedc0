use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

const MAX_ATTACHMENT_SIZE: usize = 25 * 1024 * 1024; // 25MB
const ATTACHMENT_EXPIRY: Duration = Duration::from_secs(60 * 60); // 1 hour

#[derive(Error, Debug)]
pub enum AttachmentError {
    #[error("attachment exceeds the {MAX_ATTACHMENT_SIZE} byte limit")]
    TooLarge,
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// What the storage collaborator hands back: enough to reference the
/// content from a message, nothing about how it is stored.
#[derive(Debug, Clone)]
pub struct StoredAttachment {
    pub url: String,
    pub size: usize,
}

/// Opaque attachment storage boundary. The composer hands over the full
/// file content and only ever sees a URL and size in return.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn put(
        &self,
        filename: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<StoredAttachment, AttachmentError>;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    mime_type: String,
    sha256: String,
    path: PathBuf,
    expires_at: SystemTime,
}

/// Disk-backed store with content-hash dedup and timed expiry. Suitable for
/// the sizes this subsystem accepts; larger content belongs behind a
/// streaming store implementing the same trait.
pub struct TempFileStore {
    entries: Arc<RwLock<HashMap<String, StoredEntry>>>,
    storage_path: PathBuf,
    expiry: Duration,
}

impl TempFileStore {
    pub async fn new(storage_path: &Path) -> std::io::Result<Self> {
        Self::with_expiry(storage_path, ATTACHMENT_EXPIRY).await
    }

    pub async fn with_expiry(storage_path: &Path, expiry: Duration) -> std::io::Result<Self> {
        fs::create_dir_all(storage_path).await?;
        Ok(TempFileStore {
            entries: Arc::new(RwLock::new(HashMap::new())),
            storage_path: storage_path.to_path_buf(),
            expiry,
        })
    }

    /// Fetches content for serving; `None` once expired or unknown.
    pub async fn get(&self, id: &str) -> Option<(String, Vec<u8>)> {
        let entries = self.entries.read().await;
        let entry = entries.get(id)?;
        if SystemTime::now() > entry.expires_at {
            return None;
        }
        match fs::read(&entry.path).await {
            Ok(content) => Some((entry.mime_type.clone(), content)),
            Err(_) => None,
        }
    }

    /// Drops entries past their expiry and their backing files; the binary
    /// runs this from a periodic task.
    pub async fn sweep_expired(&self) {
        let mut entries = self.entries.write().await;
        let now = SystemTime::now();
        entries.retain(|_, entry| {
            let expired = now > entry.expires_at;
            if expired {
                let _ = std::fs::remove_file(&entry.path);
            }
            !expired
        });
    }
}

#[async_trait]
impl AttachmentStore for TempFileStore {
    async fn put(
        &self,
        _filename: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<StoredAttachment, AttachmentError> {
        if content.len() > MAX_ATTACHMENT_SIZE {
            return Err(AttachmentError::TooLarge);
        }

        let mut hasher = Sha256::new();
        hasher.update(&content);
        let sha256 = format!("{:x}", hasher.finalize());

        // Identical content is stored once.
        {
            let entries = self.entries.read().await;
            if let Some((id, entry)) = entries.iter().find(|(_, e)| e.sha256 == sha256) {
                let size = fs::metadata(&entry.path)
                    .await
                    .map(|m| m.len() as usize)
                    .unwrap_or(content.len());
                return Ok(StoredAttachment {
                    url: format!("/files/{id}"),
                    size,
                });
            }
        }

        let id = Uuid::new_v4().to_string();
        let size = content.len();
        let path = self.storage_path.join(&id);
        fs::write(&path, content).await?;

        let entry = StoredEntry {
            mime_type: mime_type.to_string(),
            sha256,
            path,
            expires_at: SystemTime::now() + self.expiry,
        };

        let mut entries = self.entries.write().await;
        entries.insert(id.clone(), entry);

        Ok(StoredAttachment {
            url: format!("/files/{id}"),
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trip() {
        let dir = std::env::temp_dir().join(format!("campus-chat-test-{}", Uuid::new_v4()));
        let store = TempFileStore::new(&dir).await.unwrap();
        let stored = store
            .put("notes.txt", "text/plain", b"syllabus".to_vec())
            .await
            .unwrap();
        assert_eq!(stored.size, 8);
        let id = stored.url.strip_prefix("/files/").unwrap();
        let (mime, content) = store.get(id).await.unwrap();
        assert_eq!(mime, "text/plain");
        assert_eq!(content, b"syllabus");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn identical_content_dedups_to_one_url() {
        let dir = std::env::temp_dir().join(format!("campus-chat-test-{}", Uuid::new_v4()));
        let store = TempFileStore::new(&dir).await.unwrap();
        let a = store
            .put("a.txt", "text/plain", b"same".to_vec())
            .await
            .unwrap();
        let b = store
            .put("b.txt", "text/plain", b"same".to_vec())
            .await
            .unwrap();
        assert_eq!(a.url, b.url);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn sweep_drops_expired_entries_and_files() {
        let dir = std::env::temp_dir().join(format!("campus-chat-test-{}", Uuid::new_v4()));
        let store = TempFileStore::with_expiry(&dir, Duration::ZERO).await.unwrap();
        let stored = store
            .put("notes.txt", "text/plain", b"expired".to_vec())
            .await
            .unwrap();
        let id = stored.url.strip_prefix("/files/").unwrap().to_string();
        store.sweep_expired().await;
        assert!(store.get(&id).await.is_none());
        assert!(!dir.join(&id).exists());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn oversized_content_is_rejected() {
        let dir = std::env::temp_dir().join(format!("campus-chat-test-{}", Uuid::new_v4()));
        let store = TempFileStore::new(&dir).await.unwrap();
        let result = store
            .put("big.bin", "application/octet-stream", vec![0; MAX_ATTACHMENT_SIZE + 1])
            .await;
        assert!(matches!(result, Err(AttachmentError::TooLarge)));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
