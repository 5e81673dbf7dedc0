use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use log::warn;

/// Runtime settings, environment-driven with sensible defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub storage_path: PathBuf,
    /// Optional JSON seed file with the initial room list.
    pub rooms_file: Option<PathBuf>,
    pub away_after: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind = match std::env::var("CAMPUS_CHAT_ADDR") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("invalid CAMPUS_CHAT_ADDR {raw:?}, using default");
                default_bind()
            }),
            Err(_) => default_bind(),
        };
        let storage_path = std::env::var("CAMPUS_CHAT_STORAGE")
            .map_or_else(|_| PathBuf::from("attachments"), PathBuf::from);
        let rooms_file = std::env::var("CAMPUS_CHAT_ROOMS").ok().map(PathBuf::from);
        let away_after = std::env::var("CAMPUS_CHAT_AWAY_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .map_or(Duration::from_secs(300), Duration::from_secs);
        ServerConfig {
            bind,
            storage_path,
            rooms_file,
            away_after,
        }
    }
}

fn default_bind() -> SocketAddr {
    ([0, 0, 0, 0], 2052).into()
}
