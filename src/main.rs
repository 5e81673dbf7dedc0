use std::collections::HashMap;
use std::sync::Arc;

use log::{error, info, warn};
use warp::http::StatusCode;
use warp::Filter;

use campus_chat::attachments::TempFileStore;
use campus_chat::auth::AcceptAll;
use campus_chat::config::ServerConfig;
use campus_chat::model::ChatRoom;
use campus_chat::server::{run_away_sweep, ChatServer, ServerState};

async fn seed_rooms(state: &ServerState, config: &ServerConfig) {
    let Some(path) = &config.rooms_file else {
        return;
    };
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("cannot read rooms file {}: {e}", path.display());
            return;
        }
    };
    let rooms: Vec<ChatRoom> = match serde_json::from_str(&raw) {
        Ok(rooms) => rooms,
        Err(e) => {
            warn!("invalid rooms file {}: {e}", path.display());
            return;
        }
    };
    for room in rooms {
        let id = room.id.clone();
        if let Err(e) = state.create_room(room).await {
            warn!("skipping seed room {id}: {e}");
        } else {
            info!("seeded room {id}");
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = ServerConfig::from_env();
    let state = Arc::new(ServerState::default());
    seed_rooms(&state, &config).await;

    let store = match TempFileStore::new(&config.storage_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("cannot open attachment storage: {e}");
            std::process::exit(1);
        }
    };

    let server = ChatServer::new(Arc::clone(&state), Arc::new(AcceptAll));
    tokio::spawn(run_away_sweep(Arc::clone(&state), config.away_after));

    let sweep_store = Arc::clone(&store);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            sweep_store.sweep_expired().await;
        }
    });

    let ws_route = warp::path("ws")
        .and(warp::ws())
        .and(warp::query::<HashMap<String, String>>())
        .map(move |ws: warp::ws::Ws, query: HashMap<String, String>| {
            let server = server.clone();
            let credential = query.get("token").cloned().unwrap_or_default();
            let user_id = query.get("userId").cloned().unwrap_or_default();
            ws.on_upgrade(move |socket| async move {
                server.handle_connection(socket, credential, user_id).await;
            })
        });

    let files_store = Arc::clone(&store);
    let files_route = warp::path!("files" / String).and_then(move |id: String| {
        let store = Arc::clone(&files_store);
        async move {
            match store.get(&id).await {
                Some((mime, content)) => Ok::<_, warp::Rejection>(
                    warp::http::Response::builder()
                        .header("content-type", mime)
                        .body(content)
                        .unwrap_or_default(),
                ),
                None => Ok(warp::http::Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Vec::new())
                    .unwrap_or_default()),
            }
        }
    });

    let routes = ws_route
        .or(files_route)
        .with(warp::cors().allow_any_origin());

    info!("listening on {}", config.bind);
    warp::serve(routes).run(config.bind).await;
}
