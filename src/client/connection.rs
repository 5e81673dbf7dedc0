use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::client::ChatClient;
use crate::events::{ClientEvent, ServerEvent};

/// How often the driver loop runs the client's timers.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Everything needed to open the channel. The credential is opaque: it is
/// attached to the connect request and never inspected or refreshed here.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    pub credential: String,
    pub user_id: String,
}

impl ChannelConfig {
    fn request_url(&self) -> String {
        format!(
            "{}?token={}&userId={}",
            self.url, self.credential, self.user_id
        )
    }
}

/// Opens the channel and drives the client until it drops. All client
/// handlers run from this single task, so no two ever overlap.
///
/// A failed connect or a dropped channel lands in `Disconnected` without
/// retrying; reconnection is the caller's decision, and intents emitted in
/// the meantime are discarded by the client.
pub async fn run_channel(
    client: &mut ChatClient,
    config: &ChannelConfig,
    outbound: &mut mpsc::UnboundedReceiver<ClientEvent>,
) {
    client.set_connection_state(ConnectionState::Connecting);

    let (ws, _) = match connect_async(config.request_url()).await {
        Ok(ok) => ok,
        Err(e) => {
            error!("channel connect failed: {e}");
            client.set_connection_state(ConnectionState::Disconnected);
            return;
        }
    };
    info!("channel open for {}", config.user_id);
    client.set_connection_state(ConnectionState::Connected);

    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(text.as_str()) {
                            Ok(event) => client.handle_server_event(event, Instant::now()),
                            Err(e) => debug!("unparseable server event: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("channel closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("channel error: {e}");
                        break;
                    }
                }
            }
            intent = outbound.recv() => {
                let Some(intent) = intent else { break };
                match serde_json::to_string(&intent) {
                    Ok(json) => {
                        if let Err(e) = ws_tx.send(Message::text(json)).await {
                            error!("send failed: {e}");
                            break;
                        }
                    }
                    Err(e) => debug!("unserializable intent: {e}"),
                }
            }
            _ = ticker.tick() => {
                client.tick(Instant::now());
            }
        }
    }

    client.set_connection_state(ConnectionState::Disconnected);
}
