// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logout and reconnect: replaces the live upstream handle with a fresh one.
//!
//! The current handle sits behind an async `RwLock`. Command dispatch holds a
//! read guard for the whole upstream call; logout takes the write guard, so no
//! command can reach a handle that is being torn down. The `disconnected`
//! broadcast goes out before logout waits for that guard.

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};

use crate::upstream::handle::{SessionHandle, Wiring};
use crate::upstream::ClientFactory;

/// Result of one logout cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub previous: u64,
    pub next: u64,
    pub logout_ok: bool,
    pub destroy_ok: bool,
    pub initialize_ok: bool,
}

/// Owns the single live upstream session and its replacement cycle.
pub struct SessionController {
    current: RwLock<Arc<SessionHandle>>,
    factory: Arc<dyn ClientFactory>,
    wiring: Wiring,
}

impl SessionController {
    /// Attach and initialize the first client.
    ///
    /// An initialize failure is logged; the handle stays installed so that a
    /// later logout can replace it.
    pub async fn start(factory: Arc<dyn ClientFactory>, wiring: Wiring) -> Arc<Self> {
        let handle = SessionHandle::attach(factory.create(), &wiring);
        initialize(&handle).await;
        Arc::new(Self { current: RwLock::new(handle), factory, wiring })
    }

    /// Read access to the live handle. Logout waits until the guard drops.
    pub async fn current(&self) -> RwLockReadGuard<'_, Arc<SessionHandle>> {
        self.current.read().await
    }

    pub async fn current_generation(&self) -> u64 {
        self.current.read().await.generation()
    }

    /// Tear down the live session and replace it with a fresh one.
    ///
    /// Subscribers see `disconnected` immediately; the old session's events
    /// are dropped from then on. Always ends with a new handle installed and
    /// the store reset, whatever the upstream logout or destroy calls return.
    pub async fn logout(&self) -> LogoutOutcome {
        let store = &self.wiring.store;
        store.retire_active();

        let mut current = self.current.write().await;
        let previous = current.generation();
        tracing::info!(generation = previous, "logging out upstream session");

        let logout_ok = match current.logout().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(generation = previous, err = %e, "upstream logout failed");
                false
            }
        };
        let destroy_ok = match current.destroy().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(generation = previous, err = %e, "upstream destroy failed");
                false
            }
        };

        store.reset();

        let handle = SessionHandle::attach(self.factory.create(), &self.wiring);
        let next = handle.generation();
        *current = Arc::clone(&handle);
        let initialize_ok = initialize(&handle).await;
        tracing::info!(previous, next, "upstream session replaced, waiting for QR");

        LogoutOutcome { previous, next, logout_ok, destroy_ok, initialize_ok }
    }

    /// Destroy the live session on process exit.
    pub async fn shutdown(&self) {
        let current = self.current.write().await;
        if let Err(e) = current.destroy().await {
            tracing::warn!(generation = current.generation(), err = %e, "upstream destroy failed");
        }
    }
}

async fn initialize(handle: &SessionHandle) -> bool {
    match handle.initialize().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(generation = handle.generation(), err = %e, "upstream initialize failed");
            false
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
