use std::collections::HashMap;

use crate::model::{PresenceState, UserStatus};

/// Client-side view of who is online. The server owns this state and pushes
/// full snapshots; nothing here is mutated locally.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    statuses: HashMap<String, UserStatus>,
}

impl PresenceTracker {
    pub fn apply_snapshot(&mut self, statuses: Vec<UserStatus>) {
        self.statuses = statuses
            .into_iter()
            .map(|s| (s.user_id.clone(), s))
            .collect();
    }

    pub fn status_of(&self, user_id: &str) -> Option<&UserStatus> {
        self.statuses.get(user_id)
    }

    /// Users not in the snapshot are treated as offline.
    pub fn state_of(&self, user_id: &str) -> PresenceState {
        self.statuses
            .get(user_id)
            .map_or(PresenceState::Offline, |s| s.state)
    }

    pub fn online_count(&self) -> usize {
        self.statuses
            .values()
            .filter(|s| s.state == PresenceState::Online)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_replaces_previous_state() {
        let mut tracker = PresenceTracker::default();
        tracker.apply_snapshot(vec![UserStatus {
            user_id: "bob".into(),
            state: PresenceState::Online,
            last_seen: None,
        }]);
        assert_eq!(tracker.state_of("bob"), PresenceState::Online);

        tracker.apply_snapshot(vec![UserStatus {
            user_id: "bob".into(),
            state: PresenceState::Away,
            last_seen: Some(1_000),
        }]);
        assert_eq!(tracker.state_of("bob"), PresenceState::Away);
        assert_eq!(tracker.status_of("bob").unwrap().last_seen, Some(1_000));
    }

    #[test]
    fn unknown_users_are_offline() {
        let tracker = PresenceTracker::default();
        assert_eq!(tracker.state_of("ghost"), PresenceState::Offline);
    }

    #[test]
    fn online_count_excludes_away_and_offline() {
        let mut tracker = PresenceTracker::default();
        tracker.apply_snapshot(vec![
            UserStatus {
                user_id: "alice".into(),
                state: PresenceState::Online,
                last_seen: None,
            },
            UserStatus {
                user_id: "bob".into(),
                state: PresenceState::Away,
                last_seen: Some(500),
            },
            UserStatus {
                user_id: "carol".into(),
                state: PresenceState::Offline,
                last_seen: Some(100),
            },
        ]);
        assert_eq!(tracker.online_count(), 1);
    }
}
