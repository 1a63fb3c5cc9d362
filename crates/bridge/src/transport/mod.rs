// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for browser subscribers.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::hub::SubscriberHub;
use crate::state::SessionStore;

/// Shared state passed to all handlers via axum `State` extractor.
pub struct AppState {
    pub hub: Arc<SubscriberHub>,
    pub store: Arc<SessionStore>,
    /// Token required on `/ws`; `None` disables auth.
    pub auth_token: Option<String>,
    pub shutdown: CancellationToken,
}

/// Build the axum `Router` with all bridge routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Subscriber socket
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
