use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::journal::Journal;

pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending messages to the client (from both broadcast and catch-up)
    let (tx, mut rx) = mpsc::channel::<String>(256);

    let mut broadcast_rx = state.broadcast_tx.subscribe();

    let hello = serde_json::json!({
        "type": "hello",
        "version": state.painter.current().version,
    });
    if tx.send(hello.to_string()).await.is_err() {
        return;
    }

    let broadcast_tx = tx.clone();
    let broadcast_task = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(msg) => {
                    if broadcast_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    // The client can recover the gap with a catch-up request.
                    tracing::debug!("WebSocket subscriber lagged by {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let journal = state.journal.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            if let Message::Text(text) = msg {
                handle_client_message(&text, &journal, &tx).await;
            }
        }
    });

    tokio::select! {
        _ = broadcast_task => {},
        _ = send_task => {},
        _ = recv_task => {},
    }
}

async fn handle_client_message(text: &str, journal: &Journal, sender: &mpsc::Sender<String>) {
    let msg: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return,
    };

    if msg.get("type").and_then(|t| t.as_str()) != Some("catch_up") {
        return;
    }
    let Some(since) = msg.get("since_version").and_then(|v| v.as_u64()) else {
        return;
    };

    let events = journal.since(since).await;
    tracing::info!("WebSocket catch-up: {} events since version {}", events.len(), since);

    for event in events {
        let Ok(json) = serde_json::to_string(&event) else {
            continue;
        };
        if sender.send(json).await.is_err() {
            break;
        }
    }
}
