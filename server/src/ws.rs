use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use skull_shared::config::GameConfig;
use skull_shared::protocol::{ClientMsg, ServerMsg, WelcomeMsg, PROTOCOL_VERSION};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::game_loop::{GameBroadcast, GameCommand};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub game_tx: mpsc::Sender<GameCommand>,
    pub broadcast_tx: broadcast::Sender<GameBroadcast>,
    pub game_config: GameConfig,
    pub next_conn_id: Arc<AtomicU32>,
}

impl AppState {
    pub fn new(
        game_tx: mpsc::Sender<GameCommand>,
        broadcast_tx: broadcast::Sender<GameBroadcast>,
        game_config: GameConfig,
    ) -> Self {
        Self {
            game_tx,
            broadcast_tx,
            game_config,
            next_conn_id: Arc::new(AtomicU32::new(1)),
        }
    }
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, app_state))
}

fn command_for(msg: ClientMsg) -> GameCommand {
    match msg {
        ClientMsg::Input { x, z } => GameCommand::SetInput { x, z },
        ClientMsg::Start => GameCommand::Start,
        ClientMsg::Restart => GameCommand::Restart,
        ClientMsg::ReturnToMenu => GameCommand::ReturnToMenu,
        ClientMsg::SetName { name } => GameCommand::SetPlayerName(name),
        ClientMsg::SetAutopilot { enabled } => GameCommand::SetAutopilot(enabled),
    }
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let conn_id = app_state.next_conn_id.fetch_add(1, Ordering::Relaxed);
    let (mut sink, mut stream) = socket.split();

    // Subscribe before the welcome so no broadcast falls in between
    let mut broadcast_rx = app_state.broadcast_tx.subscribe();

    let welcome = ServerMsg::Welcome(WelcomeMsg {
        protocol_version: PROTOCOL_VERSION,
        server_version: env!("CARGO_PKG_VERSION").to_string(),
        config: app_state.game_config,
    });
    let welcome_json = match serde_json::to_string(&welcome) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Failed to encode welcome: {}", e);
            return;
        }
    };
    if sink.send(Message::Text(welcome_json.into())).await.is_err() {
        return;
    }

    tracing::info!("Renderer {} connected", conn_id);

    loop {
        tokio::select! {
            // Renderer -> Host
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(client_msg) => {
                                if app_state.game_tx.send(command_for(client_msg)).await.is_err() {
                                    tracing::error!("Game loop is gone");
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::debug!("Renderer {} sent unparsable message: {}", conn_id, e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {} // Ignore ping/pong/binary
                }
            }

            // Host -> Renderer (broadcast)
            result = broadcast_rx.recv() => {
                match result {
                    Ok(broadcast) => {
                        let msg: ServerMsg = broadcast.into();
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sink.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Renderer {} lagged by {} messages", conn_id, n);
                        // Frames are full snapshots, dropping some is fine
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::info!("Renderer {} disconnected", conn_id);
}
