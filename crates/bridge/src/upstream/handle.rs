// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session handle: one messaging client instance wired into the session store.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{UpstreamError, UpstreamOp};
use crate::events::{ChatSummary, ConnectionStatus, Message};
use crate::state::SessionStore;
use crate::upstream::qr::QrRenderer;
use crate::upstream::{ClientEvent, HistoryMessage, InboundMessage, MessagingClient};

/// Collaborators every handle is wired to, shared across replacements.
#[derive(Clone)]
pub struct Wiring {
    pub store: Arc<SessionStore>,
    pub renderer: Arc<dyn QrRenderer>,
    pub shutdown: CancellationToken,
}

/// A live messaging client tagged with the store generation it emits under.
///
/// Dropping or detaching the handle stops its event pump.
pub struct SessionHandle {
    generation: u64,
    client: Arc<dyn MessagingClient>,
    events_tx: mpsc::Sender<ClientEvent>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Activate a new store generation for `client` and start its event pump.
    ///
    /// This is the only place client events are wired, both at startup and
    /// after every logout.
    pub fn attach(client: Arc<dyn MessagingClient>, wiring: &Wiring) -> Arc<Self> {
        let generation = wiring.store.activate();
        let (events_tx, events_rx) = mpsc::channel(64);
        let cancel = wiring.shutdown.child_token();

        tokio::spawn(pump_events(
            generation,
            events_rx,
            Arc::clone(&client),
            wiring.clone(),
            cancel.clone(),
        ));
        tracing::info!(generation, "upstream session attached");

        Arc::new(Self { generation, client, events_tx, cancel })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop processing events from this client.
    pub fn detach(&self) {
        self.cancel.cancel();
    }

    pub fn is_detached(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn ensure_attached(&self) -> Result<(), UpstreamError> {
        if self.is_detached() {
            return Err(UpstreamError::Retired { generation: self.generation });
        }
        Ok(())
    }

    pub async fn initialize(&self) -> Result<(), UpstreamError> {
        self.ensure_attached()?;
        self.client
            .initialize(self.events_tx.clone())
            .await
            .map_err(|e| UpstreamError::call_failed(UpstreamOp::Initialize, &e))
    }

    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>, UpstreamError> {
        self.ensure_attached()?;
        self.client.get_chats().await.map_err(|e| UpstreamError::call_failed(UpstreamOp::ListChats, &e))
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<ChatSummary, UpstreamError> {
        self.ensure_attached()?;
        self.client
            .get_chat(chat_id)
            .await
            .map_err(|e| UpstreamError::call_failed(UpstreamOp::GetChat, &e))
    }

    /// Look up a chat and fetch its most recent `limit` messages.
    pub async fn chat_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, UpstreamError> {
        self.get_chat(chat_id).await?;
        self.client
            .fetch_messages(chat_id, limit)
            .await
            .map_err(|e| UpstreamError::call_failed(UpstreamOp::FetchMessages, &e))
    }

    /// Look up a chat and send `body` to it.
    pub async fn send_message(&self, chat_id: &str, body: &str) -> Result<(), UpstreamError> {
        self.get_chat(chat_id).await?;
        self.client
            .send_message(chat_id, body)
            .await
            .map_err(|e| UpstreamError::call_failed(UpstreamOp::SendMessage, &e))
    }

    pub async fn logout(&self) -> Result<(), UpstreamError> {
        self.client.logout().await.map_err(|e| UpstreamError::call_failed(UpstreamOp::Logout, &e))
    }

    pub async fn destroy(&self) -> Result<(), UpstreamError> {
        self.detach();
        self.client.destroy().await.map_err(|e| UpstreamError::call_failed(UpstreamOp::Destroy, &e))
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl From<InboundMessage> for Message {
    fn from(msg: InboundMessage) -> Self {
        Message {
            sender: msg.from,
            text: msg.body,
            display_name: msg.notify_name.filter(|name| !name.is_empty()),
        }
    }
}

/// Apply one client's events to the store, in emission order.
async fn pump_events(
    generation: u64,
    mut events_rx: mpsc::Receiver<ClientEvent>,
    client: Arc<dyn MessagingClient>,
    wiring: Wiring,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events_rx.recv() => match event {
                Some(e) => e,
                None => break,
            },
        };

        match event {
            ClientEvent::Qr(payload) => {
                // Skip rendering when the store would drop the result anyway.
                if !wiring.store.is_active(generation)
                    || wiring.store.status() == ConnectionStatus::Connected
                {
                    tracing::debug!(generation, "ignoring QR for inactive or connected session");
                    continue;
                }
                match wiring.renderer.render(&payload).await {
                    Ok(image) => {
                        if wiring.store.set_awaiting_qr(generation, image) {
                            tracing::info!(generation, "QR received, waiting for scan");
                        }
                    }
                    Err(e) => tracing::warn!(generation, err = %e, "failed to render QR"),
                }
            }
            ClientEvent::Ready => {
                if !wiring.store.set_connected(generation) {
                    tracing::debug!(generation, "ignoring ready from inactive session");
                    continue;
                }
                tracing::info!(generation, "upstream session connected");
                tokio::spawn(publish_chats(generation, Arc::clone(&client), Arc::clone(&wiring.store)));
            }
            ClientEvent::Message(inbound) => {
                if !wiring.store.append_message(generation, inbound.into()) {
                    tracing::debug!(generation, "dropping message from inactive session");
                }
            }
        }
    }
    tracing::debug!(generation, "upstream event pump stopped");
}

/// Fetch the chat list after readiness and broadcast it if still current.
async fn publish_chats(generation: u64, client: Arc<dyn MessagingClient>, store: Arc<SessionStore>) {
    match client.get_chats().await {
        Ok(chats) => {
            if !store.publish_chat_list(generation, chats) {
                tracing::debug!(generation, "discarding chat list from replaced session");
            }
        }
        Err(e) => tracing::warn!(generation, err = %e, "failed to load chats after ready"),
    }
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
