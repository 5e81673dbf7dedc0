use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long a remote typing signal stays visible without a refresh. The
/// stop event is not guaranteed to arrive, so the receiver expires entries
/// on its own.
pub const REMOTE_TYPING_EXPIRY: Duration = Duration::from_secs(3);

/// How long the local composer may sit idle before a stop signal goes out.
pub const LOCAL_TYPING_IDLE: Duration = Duration::from_secs(1);

/// Typing signal the local side should emit, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalSignal {
    Start { room_id: String },
    Stop { room_id: String },
}

#[derive(Debug, Clone)]
struct RemoteEntry {
    user_name: String,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
struct LocalCompose {
    room_id: String,
    last_input: Instant,
}

/// Two independent timers live here: the sender-side inactivity timer that
/// emits stop when the user abandons a draft, and the receiver-side expiry
/// timer that clears remote signals whose stop never arrived.
#[derive(Debug, Default)]
pub struct TypingCoordinator {
    remote: HashMap<String, HashMap<String, RemoteEntry>>,
    local: Option<LocalCompose>,
}

impl TypingCoordinator {
    /// Tracks the composer's text transitions. A start signal is emitted
    /// only on the empty-to-non-empty edge, not on every keystroke.
    pub fn local_input(&mut self, room_id: &str, text: &str, now: Instant) -> Option<LocalSignal> {
        if text.trim().is_empty() {
            // Draft cleared without sending.
            return self.local_sent();
        }
        match self.local.as_mut() {
            None => {
                self.local = Some(LocalCompose {
                    room_id: room_id.to_string(),
                    last_input: now,
                });
                Some(LocalSignal::Start {
                    room_id: room_id.to_string(),
                })
            }
            Some(state) if state.room_id != room_id => {
                // A session never spans rooms: the switch ended the old one
                // (receiver expiry covers a lost stop), so this keystroke is
                // a fresh empty-to-non-empty edge in the new room.
                state.room_id = room_id.to_string();
                state.last_input = now;
                Some(LocalSignal::Start {
                    room_id: room_id.to_string(),
                })
            }
            Some(state) => {
                state.last_input = now;
                None
            }
        }
    }

    /// Sending a message ends the compose session.
    pub fn local_sent(&mut self) -> Option<LocalSignal> {
        self.local.take().map(|state| LocalSignal::Stop {
            room_id: state.room_id,
        })
    }

    /// Inactivity timer: the user started typing and then went quiet.
    pub fn poll_local(&mut self, now: Instant) -> Option<LocalSignal> {
        let idle = self
            .local
            .as_ref()
            .is_some_and(|state| now.duration_since(state.last_input) >= LOCAL_TYPING_IDLE);
        if idle {
            return self.local_sent();
        }
        None
    }

    /// Registers or refreshes a remote signal. The local user's own echo is
    /// dropped here at the receiving boundary.
    pub fn observe_remote(
        &mut self,
        room_id: &str,
        user_id: &str,
        user_name: &str,
        local_user: &str,
        now: Instant,
    ) {
        if user_id == local_user {
            return;
        }
        self.remote.entry(room_id.to_string()).or_default().insert(
            user_id.to_string(),
            RemoteEntry {
                user_name: user_name.to_string(),
                expires_at: now + REMOTE_TYPING_EXPIRY,
            },
        );
    }

    pub fn observe_stop(&mut self, room_id: &str, user_id: &str) {
        if let Some(users) = self.remote.get_mut(room_id) {
            users.remove(user_id);
        }
    }

    /// Drops entries past their expiry window.
    pub fn sweep(&mut self, now: Instant) {
        for users in self.remote.values_mut() {
            users.retain(|_, entry| entry.expires_at > now);
        }
        self.remote.retain(|_, users| !users.is_empty());
    }

    /// Switching away from a room cancels interest in its typing signals.
    pub fn clear_room(&mut self, room_id: &str) {
        self.remote.remove(room_id);
    }

    /// Names currently composing in `room_id`. Expired entries are never
    /// rendered even if a sweep has not run yet.
    pub fn typing_users(&self, room_id: &str, now: Instant) -> Vec<String> {
        let Some(users) = self.remote.get(room_id) else {
            return Vec::new();
        };
        let mut names: Vec<String> = users
            .values()
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.user_name.clone())
            .collect();
        names.sort();
        names
    }
}
