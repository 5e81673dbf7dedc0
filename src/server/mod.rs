pub mod presence;
pub mod rooms;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info};
use tokio::sync::mpsc;
use warp::ws::WebSocket;

use crate::auth::Authenticator;
use crate::events::{ClientEvent, ServerEvent};

pub use presence::PresenceRegistry;
pub use rooms::{RoomError, ServerState};

/// Accepts websocket connections, authenticates them, and pumps events
/// between each channel and the shared state.
#[derive(Clone)]
pub struct ChatServer {
    pub state: Arc<ServerState>,
    auth: Arc<dyn Authenticator>,
}

impl ChatServer {
    pub fn new(state: Arc<ServerState>, auth: Arc<dyn Authenticator>) -> Self {
        ChatServer { state, auth }
    }

    /// One call per upgraded socket. Returns once the peer goes away.
    pub async fn handle_connection(&self, ws: WebSocket, credential: String, user_id: String) {
        let Some(profile) = self.auth.authenticate(&credential, &user_id).await else {
            info!("rejected connection for {user_id}");
            return;
        };
        info!("channel open: {}", profile.id);

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.state.register_connection(&profile.id, tx).await;

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_tx.send(message).await {
                    error!("write failed: {e}");
                    break;
                }
            }
        });

        // Connecting triggers the directory push and a presence change.
        if self.state.presence.set_online(&profile.id).await {
            self.state.push_presence().await;
        }
        let rooms = self.state.rooms_for(&profile.id).await;
        self.state
            .send_to_user(&profile.id, &ServerEvent::ChatRooms(rooms))
            .await;

        while let Some(result) = ws_rx.next().await {
            match result {
                Ok(msg) => {
                    let Ok(text) = msg.to_str() else { continue };
                    match serde_json::from_str::<ClientEvent>(text) {
                        Ok(event) => self.state.handle_event(&profile, event).await,
                        Err(e) => debug!("unparseable event from {}: {e}", profile.id),
                    }
                }
                Err(e) => {
                    error!("channel error for {}: {e}", profile.id);
                    break;
                }
            }
        }

        self.state.unregister_connection(&profile.id).await;
        if self.state.presence.set_offline(&profile.id).await {
            self.state.push_presence().await;
        }
        writer.abort();
        info!("channel closed: {}", profile.id);
    }
}

/// Background task that demotes idle users to away.
pub async fn run_away_sweep(state: Arc<ServerState>, away_after: Duration) {
    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        ticker.tick().await;
        if state.presence.mark_idle_away(away_after).await {
            state.push_presence().await;
        }
    }
}
