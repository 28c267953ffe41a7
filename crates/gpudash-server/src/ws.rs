use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{error, info, warn};

use crate::protocol::{ClientEvent, ServerEvent};
use crate::services;
use crate::state::AppState;

const REPLY_QUEUE: usize = 8;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// One task writes (broadcast snapshots plus replies to this client), one
/// reads. Either side finishing ends the session.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut snapshots = state.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerEvent>(REPLY_QUEUE);
    info!("Client connected");

    if reply_tx.send(ServerEvent::connected()).await.is_err() {
        return;
    }

    let mut writer = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                reply = reply_rx.recv() => {
                    let Some(event) = reply else { break };
                    match event.to_text() {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode reply: {}", e);
                            continue;
                        }
                    }
                }
                snapshot = snapshots.recv() => match snapshot {
                    Ok(text) => text,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Client lagging, skipped {} snapshot(s)", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let reply = handle_client_message(&state, text.as_str()).await;
            if reply_tx.send(reply).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    info!("Client disconnected");
}

async fn handle_client_message(state: &Arc<AppState>, text: &str) -> ServerEvent {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Invalid client message: {}", e);
            return ServerEvent::benchmark_error(format!("Invalid message: {e}"));
        }
    };

    match event {
        ClientEvent::RequestBenchmark(req) => match services::benchmark::compare(state, req).await {
            Ok(comparison) => ServerEvent::BenchmarkResult(comparison),
            Err(e) => ServerEvent::benchmark_error(e.message()),
        },
    }
}
