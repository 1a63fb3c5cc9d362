// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chatbridge: relays one messaging-gateway session to many browser clients.

pub mod config;
pub mod error;
pub mod events;
pub mod hub;
pub mod lifecycle;
pub mod state;
pub mod test_support;
pub mod transport;
pub mod upstream;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::BridgeConfig;
use crate::hub::SubscriberHub;
use crate::lifecycle::SessionController;
use crate::state::SessionStore;
use crate::transport::{build_router, AppState};
use crate::upstream::gateway::GatewayFactory;
use crate::upstream::handle::Wiring;
use crate::upstream::qr::SvgQrRenderer;

/// Run the bridge until shutdown.
pub async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let store = Arc::new(SessionStore::new(config.history_cap()));
    let factory = Arc::new(GatewayFactory::new(config.gateway(), shutdown.clone()));
    let wiring = Wiring {
        store: Arc::clone(&store),
        renderer: Arc::new(SvgQrRenderer),
        shutdown: shutdown.clone(),
    };
    let controller = SessionController::start(factory, wiring).await;
    let hub = Arc::new(SubscriberHub::new(
        Arc::clone(&store),
        Arc::clone(&controller),
        config.hub_settings(),
    ));

    let state = Arc::new(AppState {
        hub,
        store,
        auth_token: config.auth_token.clone(),
        shutdown: shutdown.clone(),
    });

    if config.auth_token.is_some() {
        tracing::info!(gateway = %config.gateway_url, "chatbridge listening on {addr} (auth enabled)");
    } else {
        tracing::info!(gateway = %config.gateway_url, "chatbridge listening on {addr}");
    }
    let listener = TcpListener::bind(&addr).await?;
    let result = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

    shutdown.cancel();
    controller.shutdown().await;
    result?;
    Ok(())
}

/// Cancel `shutdown` on SIGTERM or SIGINT.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGINT");
            }
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
}
