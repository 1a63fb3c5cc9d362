// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber hub: registers downstream consumers, hydrates them with the
//! current session snapshot, and routes their commands to the live upstream
//! handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::events::{ChatMessage, ClientCommand, ConnectionStatus, DeliveryReceipt, ServerEvent};
use crate::lifecycle::SessionController;
use crate::state::SessionStore;
use crate::upstream::HistoryMessage;

/// Per-command tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSettings {
    /// Messages fetched when a chat is selected.
    pub chat_fetch_limit: usize,
    /// Sender label for messages written by this session.
    pub self_label: String,
    /// Routing suffix appended to bare chat ids.
    pub chat_suffix: String,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self { chat_fetch_limit: 50, self_label: "Tú".to_owned(), chat_suffix: "@c.us".to_owned() }
    }
}

/// A registered subscriber: initial frames plus the broadcast feed.
pub struct Subscription {
    pub id: Uuid,
    pub initial: Vec<ServerEvent>,
    pub events: broadcast::Receiver<ServerEvent>,
}

/// Fan-out/fan-in hub between subscribers and the upstream session.
pub struct SubscriberHub {
    store: Arc<SessionStore>,
    controller: Arc<SessionController>,
    settings: HubSettings,
    subscribers: Mutex<HashMap<Uuid, Instant>>,
}

impl SubscriberHub {
    pub fn new(
        store: Arc<SessionStore>,
        controller: Arc<SessionController>,
        settings: HubSettings,
    ) -> Self {
        Self { store, controller, settings, subscribers: Mutex::new(HashMap::new()) }
    }

    /// Register a subscriber and build its status + history hydration.
    pub fn connect(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (snapshot, events) = self.store.subscribe_with_snapshot();
        self.subscribers.lock().insert(id, Instant::now());
        if snapshot.status != ConnectionStatus::Connected {
            tracing::info!(subscriber = %id, "subscriber connected, no session yet");
        } else {
            tracing::info!(subscriber = %id, "subscriber connected");
        }
        Subscription { id, initial: snapshot.into_events(), events }
    }

    pub fn disconnect(&self, id: Uuid) {
        if let Some(since) = self.subscribers.lock().remove(&id) {
            tracing::info!(subscriber = %id, secs = since.elapsed().as_secs(), "subscriber disconnected");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Run one subscriber command. Returns the reply for that subscriber only,
    /// if the command has one; broadcasts go through the store.
    pub async fn dispatch(&self, id: Uuid, command: ClientCommand) -> Option<ServerEvent> {
        tracing::debug!(subscriber = %id, ?command, "subscriber command");
        match command {
            ClientCommand::ListChats => Some(self.list_chats().await),
            ClientCommand::SelectChat { chat_id } => {
                Some(ServerEvent::ChatMessages(self.select_chat(chat_id.as_deref()).await))
            }
            ClientCommand::SendMessage { chat_id, message } => {
                Some(self.send_message(chat_id.as_deref(), message.as_deref()).await)
            }
            ClientCommand::Logout => {
                self.logout().await;
                None
            }
        }
    }

    /// Chat list for the requester, or `NOT_READY` before the session is up.
    pub async fn list_chats(&self) -> ServerEvent {
        let handle = self.controller.current().await;
        if self.store.status() != ConnectionStatus::Connected {
            return ServerEvent::Error(
                ErrorCode::NotReady.to_notice("messaging client is not ready"),
            );
        }
        match handle.list_chats().await {
            Ok(chats) => ServerEvent::ChatList(chats),
            Err(e) => {
                tracing::warn!(err = %e, "failed to list chats");
                ServerEvent::Error(e.code().to_notice("could not load chats"))
            }
        }
    }

    /// Recent messages of one chat. Empty on an empty id or any failure.
    pub async fn select_chat(&self, chat_id: Option<&str>) -> Vec<ChatMessage> {
        let Some(chat_id) = chat_id.filter(|id| !id.is_empty()) else {
            return Vec::new();
        };
        let handle = self.controller.current().await;
        match handle.chat_messages(chat_id, self.settings.chat_fetch_limit).await {
            Ok(messages) => messages
                .into_iter()
                .map(|m| to_chat_message(m, &self.settings.self_label))
                .collect(),
            Err(e) => {
                tracing::warn!(chat_id, err = %e, "failed to fetch chat messages");
                Vec::new()
            }
        }
    }

    /// Send a message on behalf of one subscriber.
    pub async fn send_message(&self, chat_id: Option<&str>, body: Option<&str>) -> ServerEvent {
        let (Some(chat_id), Some(body)) =
            (chat_id.filter(|id| !id.is_empty()), body.filter(|b| !b.is_empty()))
        else {
            tracing::warn!("send rejected: chatId or message missing");
            return ServerEvent::Error(
                ErrorCode::InvalidCommandPayload.to_notice("chatId and message are required"),
            );
        };

        let target = normalize_chat_id(chat_id, &self.settings.chat_suffix);
        let handle = self.controller.current().await;
        match handle.send_message(&target, body).await {
            Ok(()) => {
                tracing::info!(chat_id = %target, "message sent");
                ServerEvent::Delivered(DeliveryReceipt {
                    success: true,
                    chat_id: chat_id.to_owned(),
                    message: body.to_owned(),
                })
            }
            Err(e) => {
                tracing::warn!(chat_id = %target, err = %e, "failed to send message");
                ServerEvent::Error(
                    e.code().to_notice("could not send the message, check the number"),
                )
            }
        }
    }

    /// Replace the upstream session. Failures are logged, never surfaced.
    pub async fn logout(&self) {
        let outcome = self.controller.logout().await;
        if !outcome.logout_ok || !outcome.destroy_ok {
            tracing::warn!(?outcome, "logout completed with upstream errors");
        }
    }
}

/// Append the routing suffix unless the id is already fully qualified.
pub fn normalize_chat_id(chat_id: &str, suffix: &str) -> String {
    if chat_id.contains('@') {
        chat_id.to_owned()
    } else {
        format!("{chat_id}{suffix}")
    }
}

/// Label a fetched message with who wrote it.
pub fn to_chat_message(msg: HistoryMessage, self_label: &str) -> ChatMessage {
    let sender = if msg.from_me {
        self_label.to_owned()
    } else {
        msg.sender_name.filter(|name| !name.is_empty()).unwrap_or(msg.from)
    };
    ChatMessage { sender, text: msg.body, timestamp: msg.timestamp }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
