//! `WS /ws/updates`: pushes [`ChangeEvent`]s as they happen so operators
//! don't have to poll the read API for state transitions.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::time::{interval, Duration};
use tracing::debug;

use crate::server::AppState;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

pub async fn ws_updates(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let mut rx = app_state.change_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();
    let mut keepalive = interval(KEEPALIVE_INTERVAL);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "ws subscriber lagged behind the change stream");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let Ok(payload) = serde_json::to_string(&event) else { continue };
                if sender.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            _ = keepalive.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

