pub mod composer;
pub mod connection;
pub mod directory;
pub mod presence;
pub mod receipts;
pub mod store;
pub mod typing;

use std::collections::VecDeque;
use std::time::Instant;

use log::{debug, warn};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::attachments::AttachmentStore;
use crate::events::{ClientEvent, ServerEvent};
use crate::model::{Message, PresenceState};

pub use composer::{ComposeError, Composer, LocalUser};
pub use connection::{run_channel, ChannelConfig, ConnectionState};
pub use directory::{RoomDirectory, RoomEntry, SelectOutcome};
pub use presence::PresenceTracker;
pub use receipts::ReceiptTracker;
pub use store::MessageStore;
pub use typing::{LocalSignal, TypingCoordinator};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no active room selected")]
    NoActiveRoom,
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

/// Single-writer state store for one client instance. Every mutation of
/// rooms, messages, typing, presence, and read state goes through these
/// methods; handlers are driven from one task and never run concurrently.
pub struct ChatClient {
    state: ConnectionState,
    composer: Composer,
    directory: RoomDirectory,
    store: MessageStore,
    typing: TypingCoordinator,
    receipts: ReceiptTracker,
    presence: PresenceTracker,
    /// Rooms with an outstanding history request, in request order. The
    /// channel delivers responses in order, so the front entry is the room
    /// the next `messages` batch answers — a batch cannot be attributed by
    /// content alone when it is empty.
    history_requests: VecDeque<String>,
    outbound: mpsc::UnboundedSender<ClientEvent>,
}

impl ChatClient {
    /// Returns the client and the outbound intent stream the connection
    /// manager drains into the channel.
    pub fn new(user: LocalUser) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let client = ChatClient {
            state: ConnectionState::Connecting,
            composer: Composer::new(user),
            directory: RoomDirectory::default(),
            store: MessageStore::default(),
            typing: TypingCoordinator::default(),
            receipts: ReceiptTracker::default(),
            presence: PresenceTracker::default(),
            history_requests: VecDeque::new(),
            outbound,
        };
        (client, rx)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("connection {:?} -> {:?}", self.state, state);
            self.state = state;
            if state == ConnectionState::Disconnected {
                // Responses to these will never arrive on this channel.
                self.history_requests.clear();
            }
        }
    }

    /// Applies one inbound event. While disconnected all derived state is
    /// frozen: events are dropped until the channel is back.
    pub fn handle_server_event(&mut self, event: ServerEvent, now: Instant) {
        if self.state != ConnectionState::Connected {
            debug!("inbound event dropped while {:?}", self.state);
            return;
        }
        match event {
            ServerEvent::ChatRooms(rooms) => self.directory.replace_all(rooms),
            ServerEvent::Messages(messages) => self.apply_history(messages),
            ServerEvent::NewMessage(message) => self.apply_new_message(message),
            ServerEvent::MessageRead {
                message_id,
                user_id,
            } => self.store.apply_read_receipt(&message_id, &user_id),
            ServerEvent::Typing {
                room_id,
                user_id,
                user_name,
            } => {
                let local = self.composer.user().id.clone();
                self.typing
                    .observe_remote(&room_id, &user_id, &user_name, &local, now);
            }
            ServerEvent::StopTyping { room_id, user_id } => {
                self.typing.observe_stop(&room_id, &user_id);
            }
            ServerEvent::UserStatus(statuses) => self.presence.apply_snapshot(statuses),
            ServerEvent::RoomUpdated(room) => {
                if !room.is_valid() {
                    warn!("room {} snapshot violates invariants", room.id);
                }
                self.directory.apply_snapshot(room);
            }
            ServerEvent::Reaction {
                message_id,
                emoji,
                user_id,
            } => self.store.apply_reaction(&message_id, &emoji, &user_id),
        }
    }

    /// Makes `room_id` the active room. Loads history for a new selection;
    /// reselecting the active room only re-emits the read acknowledgement.
    pub fn select_room(&mut self, room_id: &str) {
        let previous = self.directory.active_room().map(String::from);
        match self.directory.select(room_id) {
            SelectOutcome::Unknown => {
                warn!("select for unknown room {room_id}");
            }
            SelectOutcome::AlreadyActive => {
                self.emit_room_read(room_id);
            }
            SelectOutcome::LoadHistory => {
                if let Some(prev) = previous {
                    self.typing.clear_room(&prev);
                }
                // A compose session does not follow the user across rooms.
                if let Some(signal) = self.typing.local_sent() {
                    self.emit_typing(signal);
                }
                self.store.reset_for(room_id);
                self.emit(ClientEvent::JoinRoom {
                    room_id: room_id.to_string(),
                });
                self.emit(ClientEvent::GetMessages {
                    room_id: room_id.to_string(),
                });
                self.history_requests.push_back(room_id.to_string());
                self.emit_room_read(room_id);
            }
        }
    }

    /// Composer text changed; drives the debounced typing signals.
    pub fn input_changed(&mut self, text: &str, now: Instant) {
        let Some(room_id) = self.directory.active_room().map(String::from) else {
            return;
        };
        if let Some(signal) = self.typing.local_input(&room_id, text, now) {
            self.emit_typing(signal);
        }
    }

    pub fn send_text(&mut self, body: &str, reply_to: Option<String>) -> Result<(), ClientError> {
        let room_id = self
            .directory
            .active_room()
            .ok_or(ClientError::NoActiveRoom)?
            .to_string();
        let draft = self.composer.draft_text(&room_id, body, reply_to)?;
        self.store.track_pending(draft.clone());
        self.emit(ClientEvent::SendMessage(draft));
        if let Some(signal) = self.typing.local_sent() {
            self.emit_typing(signal);
        }
        Ok(())
    }

    pub async fn send_attachment(
        &mut self,
        filename: &str,
        mime_type: &str,
        content: Vec<u8>,
        attachment_store: &dyn AttachmentStore,
    ) -> Result<(), ClientError> {
        let room_id = self
            .directory
            .active_room()
            .ok_or(ClientError::NoActiveRoom)?
            .to_string();
        let draft = self
            .composer
            .draft_attachment(&room_id, filename, mime_type, content, attachment_store)
            .await?;
        self.store.track_pending(draft.clone());
        self.emit(ClientEvent::SendMessage(draft));
        Ok(())
    }

    /// Emits a reaction toggle; the echoed `reaction` event decides the
    /// visible outcome.
    pub fn react(&mut self, message_id: &str, emoji: &str) {
        let event = self.composer.reaction_intent(message_id, emoji);
        self.emit(event);
    }

    /// Fine-grained acknowledgement for a message scrolled into view.
    pub fn mark_message_viewed(&mut self, message_id: &str) {
        if let Some(event) = self.receipts.message_read_intent(message_id) {
            self.emit(event);
        }
    }

    /// Periodic driver hook: expires stale remote typing entries and fires
    /// the local inactivity stop.
    pub fn tick(&mut self, now: Instant) {
        self.typing.sweep(now);
        if let Some(signal) = self.typing.poll_local(now) {
            self.emit_typing(signal);
        }
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.directory
    }

    pub fn messages(&self) -> &MessageStore {
        &self.store
    }

    pub fn typing_users(&self, room_id: &str, now: Instant) -> Vec<String> {
        self.typing.typing_users(room_id, now)
    }

    pub fn presence_of(&self, user_id: &str) -> PresenceState {
        self.presence.state_of(user_id)
    }

    pub fn local_user(&self) -> &LocalUser {
        self.composer.user()
    }

    fn apply_history(&mut self, messages: Vec<Message>) {
        let Some(requested) = self.history_requests.pop_front() else {
            debug!("unsolicited history batch ignored");
            return;
        };
        // A batch answering a request for a previously selected room can
        // still be in flight after a switch; it must not clobber the new
        // room's log or reset its unread count.
        if self.directory.active_room() != Some(requested.as_str()) {
            debug!("stale history batch for {requested} ignored");
            return;
        }
        if messages.iter().any(|m| m.room_id != requested) {
            debug!("history batch does not match requested room {requested}");
            return;
        }
        self.store.load_history(messages);
        self.directory.reset_unread(&requested);
    }

    fn apply_new_message(&mut self, message: Message) {
        self.directory.record_preview(&message);
        // A message from a user supersedes their typing signal.
        self.typing
            .observe_stop(&message.room_id, &message.sender_id);
        let local = self.composer.user().id.clone();
        if self.store.append_incoming(message.clone()) {
            if message.sender_id == local {
                self.store.confirm_pending(&message);
            } else if let Some(event) = self.receipts.message_read_intent(&message.id) {
                // Rendered into the active room counts as viewed.
                self.emit(event);
            }
        } else {
            self.directory.note_unread(&message, &local);
        }
    }

    fn emit_room_read(&mut self, room_id: &str) {
        let known: Vec<String> = self
            .store
            .messages()
            .iter()
            .map(|m| m.id.clone())
            .collect();
        let event = self.receipts.room_read_intent(room_id, &known);
        self.emit(event);
    }

    fn emit_typing(&mut self, signal: LocalSignal) {
        let event = match signal {
            LocalSignal::Start { room_id } => ClientEvent::Typing { room_id },
            LocalSignal::Stop { room_id } => ClientEvent::StopTyping { room_id },
        };
        self.emit(event);
    }

    /// Outbound intents are fire-and-forget. While the channel is down
    /// they are dropped, not queued; there is no offline outbox.
    fn emit(&mut self, event: ClientEvent) {
        if self.state != ConnectionState::Connected {
            debug!("outbound intent dropped while {:?}", self.state);
            return;
        }
        if self.outbound.send(event).is_err() {
            debug!("outbound channel closed");
        }
    }
}
