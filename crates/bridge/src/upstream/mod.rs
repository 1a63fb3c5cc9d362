// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream messaging client: the client abstraction, the gateway-backed
//! implementation, and the per-instance session handle.

pub mod gateway;
pub mod handle;
pub mod qr;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::events::ChatSummary;

/// Boxed future returned by object-safe client methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lifecycle and message events emitted by a messaging client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A QR login code (raw payload, not yet rendered).
    Qr(String),
    /// The session is authenticated and ready.
    Ready,
    /// An inbound message.
    Message(InboundMessage),
}

/// Inbound message as reported by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub from: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub notify_name: Option<String>,
}

/// A stored message of one chat, as returned by a history fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    #[serde(default)]
    pub from_me: bool,
    pub from: String,
    /// Display name of the sender, when the client knows one.
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub timestamp: i64,
}

/// Messaging-platform client.
///
/// Object-safe for use as `Arc<dyn MessagingClient>`. Events are delivered on
/// the sender passed to [`MessagingClient::initialize`], in emission order.
pub trait MessagingClient: Send + Sync + 'static {
    fn initialize(&self, events: mpsc::Sender<ClientEvent>) -> BoxFuture<'_, anyhow::Result<()>>;

    fn get_chats(&self) -> BoxFuture<'_, anyhow::Result<Vec<ChatSummary>>>;

    fn get_chat<'a>(&'a self, chat_id: &'a str) -> BoxFuture<'a, anyhow::Result<ChatSummary>>;

    fn fetch_messages<'a>(
        &'a self,
        chat_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, anyhow::Result<Vec<HistoryMessage>>>;

    fn send_message<'a>(
        &'a self,
        chat_id: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>>;

    fn logout(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    fn destroy(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Builds fresh client instances; called at startup and after every logout.
pub trait ClientFactory: Send + Sync + 'static {
    fn create(&self) -> Arc<dyn MessagingClient>;
}
