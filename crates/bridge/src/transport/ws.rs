// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber WebSocket: hydrates each connection, forwards broadcasts, and
//! routes commands to the hub.
//!
//! Commands run on a per-connection worker, in arrival order, so a slow
//! upstream call never holds back broadcasts to the same socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::{parse_command, ClientCommand, ServerEvent};
use crate::hub::{SubscriberHub, Subscription};
use crate::transport::auth;
use crate::transport::AppState;

/// Query parameters for WebSocket upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /ws`: WebSocket upgrade for a subscriber.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Err(code) = auth::validate_token(query.token.as_deref(), state.auth_token.as_deref()) {
        return code.to_http_response("unauthorized").into_response();
    }
    ws.on_upgrade(move |socket| handle_connection(state, socket)).into_response()
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let Subscription { id, initial, mut events } = state.hub.connect();

    for evt in &initial {
        if send_event(&mut ws_tx, evt).await.is_err() {
            state.hub.disconnect(id);
            return;
        }
    }

    let (command_tx, command_rx) = mpsc::channel(16);
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
    // Not aborted on close: a logout in progress runs to completion.
    tokio::spawn(run_commands(Arc::clone(&state.hub), id, command_rx, reply_tx));

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            Some(reply) = reply_rx.recv() => {
                if send_event(&mut ws_tx, &reply).await.is_err() {
                    break;
                }
            }

            event = events.recv() => {
                let event = match event {
                    Ok(e) => e,
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!(subscriber = %id, lagged = n, "subscriber lagged, skipping");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if send_event(&mut ws_tx, &event).await.is_err() {
                    break;
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Some(command) = parse_command(&text) else {
                            tracing::debug!(subscriber = %id, "ignoring unrecognized frame");
                            continue;
                        };
                        if command_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(subscriber = %id, err = %e, "subscriber socket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.hub.disconnect(id);
}

/// Dispatch one subscriber's commands in order, queueing replies for its socket.
async fn run_commands(
    hub: Arc<SubscriberHub>,
    id: Uuid,
    mut commands: mpsc::Receiver<ClientCommand>,
    replies: mpsc::UnboundedSender<ServerEvent>,
) {
    while let Some(command) = commands.recv().await {
        if let Some(reply) = hub.dispatch(id, command).await {
            if replies.send(reply).is_err() {
                break;
            }
        }
    }
}

async fn send_event(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(event)?;
    ws_tx.send(Message::Text(json.into())).await?;
    Ok(())
}
