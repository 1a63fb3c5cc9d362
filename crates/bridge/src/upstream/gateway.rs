// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messaging client backed by a gateway sidecar: HTTP for commands and one
//! WebSocket event stream per client instance.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::events::ChatSummary;
use crate::upstream::{
    BoxFuture, ClientEvent, ClientFactory, HistoryMessage, InboundMessage, MessagingClient,
};

/// Where and how to reach the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub timeout: Duration,
}

/// HTTP + WS client for one gateway session.
pub struct GatewayClient {
    base_url: String,
    auth_token: Option<String>,
    client: Client,
    cancel: CancellationToken,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig, cancel: CancellationToken) -> Self {
        // reqwest is built without a bundled crypto provider.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let client = Client::builder().timeout(config.timeout).build().unwrap_or_default();
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            auth_token: config.auth_token.clone(),
            client,
            cancel,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/api/v1/chats/{id}[/{tail}]` with the id percent-encoded.
    fn chat_url(&self, chat_id: &str, tail: Option<&str>) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.url("/api/v1/chats"))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("gateway URL cannot be a base: {}", self.base_url))?;
            segments.push(chat_id);
            if let Some(tail) = tail {
                segments.push(tail);
            }
        }
        Ok(url)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> anyhow::Result<T> {
        let req = self.client.get(url);
        let resp = self.apply_auth(req).send().await?;
        let value = resp.error_for_status()?.json().await?;
        Ok(value)
    }

    /// POST JSON to a gateway endpoint, ignoring the response body.
    async fn post_json(&self, url: Url, body: &serde_json::Value) -> anyhow::Result<()> {
        let req = self.client.post(url).json(body);
        self.apply_auth(req).send().await?.error_for_status()?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        Ok(Url::parse(&self.url(path))?)
    }

    /// Read gateway events until cancelled, reconnecting with backoff.
    fn spawn_event_stream(&self, events: mpsc::Sender<ClientEvent>) -> anyhow::Result<()> {
        let url = build_events_url(&self.base_url, self.auth_token.as_deref())?;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut backoff_ms = 100u64;
            let max_backoff_ms = 5000u64;

            loop {
                if cancel.is_cancelled() {
                    break;
                }

                match tokio_tungstenite::connect_async(url.as_str()).await {
                    Ok((ws_stream, _)) => {
                        backoff_ms = 100;
                        tracing::debug!("gateway event stream connected");

                        let (_write, mut read) = ws_stream.split();

                        loop {
                            tokio::select! {
                                _ = cancel.cancelled() => return,
                                msg = read.next() => {
                                    match msg {
                                        Some(Ok(Message::Text(text))) => {
                                            let Some(event) = parse_gateway_event(text.as_str()) else {
                                                continue;
                                            };
                                            if events.send(event).await.is_err() {
                                                // Handle dropped; nobody is listening any more.
                                                return;
                                            }
                                        }
                                        Some(Ok(Message::Close(_))) | None => {
                                            tracing::debug!("gateway event stream closed");
                                            break;
                                        }
                                        Some(Err(e)) => {
                                            tracing::debug!(err = %e, "gateway event stream error");
                                            break;
                                        }
                                        _ => {}
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(err = %e, backoff_ms, "gateway event stream connect failed, retrying");
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
                }
                backoff_ms = (backoff_ms * 2).min(max_backoff_ms);
            }
        });
        Ok(())
    }
}

impl MessagingClient for GatewayClient {
    fn initialize(&self, events: mpsc::Sender<ClientEvent>) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            // Listen first so the first QR code is not missed.
            self.spawn_event_stream(events)?;
            self.post_json(self.endpoint("/api/v1/initialize")?, &serde_json::json!({})).await
        })
    }

    fn get_chats(&self) -> BoxFuture<'_, anyhow::Result<Vec<ChatSummary>>> {
        Box::pin(async move { self.get_json(self.endpoint("/api/v1/chats")?).await })
    }

    fn get_chat<'a>(&'a self, chat_id: &'a str) -> BoxFuture<'a, anyhow::Result<ChatSummary>> {
        Box::pin(async move { self.get_json(self.chat_url(chat_id, None)?).await })
    }

    fn fetch_messages<'a>(
        &'a self,
        chat_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, anyhow::Result<Vec<HistoryMessage>>> {
        Box::pin(async move {
            let mut url = self.chat_url(chat_id, Some("messages"))?;
            url.query_pairs_mut().append_pair("limit", &limit.to_string());
            self.get_json(url).await
        })
    }

    fn send_message<'a>(
        &'a self,
        chat_id: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let url = self.chat_url(chat_id, Some("messages"))?;
            self.post_json(url, &serde_json::json!({ "body": body })).await
        })
    }

    fn logout(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.post_json(self.endpoint("/api/v1/logout")?, &serde_json::json!({})).await
        })
    }

    fn destroy(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let result = match self.endpoint("/api/v1/destroy") {
                Ok(url) => self.post_json(url, &serde_json::json!({})).await,
                Err(e) => Err(e),
            };
            self.cancel.cancel();
            result
        })
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Creates one [`GatewayClient`] per session.
pub struct GatewayFactory {
    config: GatewayConfig,
    shutdown: CancellationToken,
}

impl GatewayFactory {
    pub fn new(config: GatewayConfig, shutdown: CancellationToken) -> Self {
        Self { config, shutdown }
    }
}

impl ClientFactory for GatewayFactory {
    fn create(&self) -> Arc<dyn MessagingClient> {
        Arc::new(GatewayClient::new(&self.config, self.shutdown.child_token()))
    }
}

/// Parse one gateway event frame.
///
/// Returns `None` for invalid JSON, unknown events, or events missing their
/// required fields.
pub fn parse_gateway_event(text: &str) -> Option<ClientEvent> {
    let msg: serde_json::Value = serde_json::from_str(text).ok()?;
    let event_type = msg.get("event").and_then(|e| e.as_str()).unwrap_or("");

    match event_type {
        "qr" => msg.get("qr").and_then(|v| v.as_str()).map(|qr| ClientEvent::Qr(qr.to_owned())),
        "ready" => Some(ClientEvent::Ready),
        "message" => serde_json::from_value::<InboundMessage>(msg).ok().map(ClientEvent::Message),
        _ => {
            tracing::debug!(event_type, "ignoring gateway event");
            None
        }
    }
}

/// Build the gateway event-stream URL from its HTTP base URL.
fn build_events_url(base_url: &str, auth_token: Option<&str>) -> anyhow::Result<Url> {
    let ws_base = if base_url.starts_with("https://") {
        base_url.replacen("https://", "wss://", 1)
    } else {
        base_url.replacen("http://", "ws://", 1)
    };

    let mut url = Url::parse(&format!("{ws_base}/ws/events"))?;
    if let Some(token) = auth_token {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
