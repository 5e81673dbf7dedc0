use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::model::{PresenceState, UserStatus};

#[derive(Debug)]
struct PresenceEntry {
    state: PresenceState,
    last_seen: Option<i64>,
    last_activity: Instant,
}

/// Server-owned presence. Every mutation reports whether anything changed
/// so the caller knows when to push a fresh snapshot to all clients.
#[derive(Default)]
pub struct PresenceRegistry {
    entries: RwLock<HashMap<String, PresenceEntry>>,
}

impl PresenceRegistry {
    pub async fn set_online(&self, user_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(user_id.to_string()).or_insert(PresenceEntry {
            state: PresenceState::Offline,
            last_seen: None,
            last_activity: Instant::now(),
        });
        entry.last_activity = Instant::now();
        if entry.state == PresenceState::Online {
            return false;
        }
        entry.state = PresenceState::Online;
        entry.last_seen = None;
        true
    }

    pub async fn set_offline(&self, user_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(user_id) {
            Some(entry) if entry.state != PresenceState::Offline => {
                entry.state = PresenceState::Offline;
                entry.last_seen = Some(Utc::now().timestamp_millis());
                true
            }
            _ => false,
        }
    }

    /// Any activity on the channel counts; an away user becomes online
    /// again.
    pub async fn touch(&self, user_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(user_id) {
            Some(entry) => {
                entry.last_activity = Instant::now();
                if entry.state == PresenceState::Away {
                    entry.state = PresenceState::Online;
                    entry.last_seen = None;
                    return true;
                }
                false
            }
            None => false,
        }
    }

    /// Marks online users away once idle past `away_after`. Returns true
    /// if any user changed.
    pub async fn mark_idle_away(&self, away_after: std::time::Duration) -> bool {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let mut changed = false;
        for entry in entries.values_mut() {
            if entry.state == PresenceState::Online
                && now.duration_since(entry.last_activity) >= away_after
            {
                entry.state = PresenceState::Away;
                entry.last_seen = Some(Utc::now().timestamp_millis());
                changed = true;
            }
        }
        changed
    }

    /// Full snapshot, the only shape presence ever travels in.
    pub async fn snapshot(&self) -> Vec<UserStatus> {
        let entries = self.entries.read().await;
        let mut statuses: Vec<UserStatus> = entries
            .iter()
            .map(|(user_id, entry)| UserStatus {
                user_id: user_id.clone(),
                state: entry.state,
                last_seen: entry.last_seen,
            })
            .collect();
        statuses.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn connect_disconnect_cycle() {
        let registry = PresenceRegistry::default();
        assert!(registry.set_online("bob").await);
        assert!(!registry.set_online("bob").await);
        assert!(registry.set_offline("bob").await);
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot[0].state, PresenceState::Offline);
        assert!(snapshot[0].last_seen.is_some());
    }

    #[tokio::test]
    async fn idle_user_goes_away_and_returns_on_activity() {
        let registry = PresenceRegistry::default();
        registry.set_online("bob").await;
        assert!(registry.mark_idle_away(Duration::ZERO).await);
        assert_eq!(registry.snapshot().await[0].state, PresenceState::Away);
        assert!(registry.touch("bob").await);
        assert_eq!(registry.snapshot().await[0].state, PresenceState::Online);
    }
}
