// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the chatbridge relay.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "chatbridge", version, about = "Relay a messaging gateway session to browser clients")]
pub struct BridgeConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "CHATBRIDGE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 3000, env = "CHATBRIDGE_PORT")]
    pub port: u16,

    /// Token required on `/ws?token=...`. If unset, auth is disabled.
    #[arg(long, env = "CHATBRIDGE_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Base URL of the messaging gateway.
    #[arg(long, default_value = "http://127.0.0.1:8085", env = "CHATBRIDGE_GATEWAY_URL")]
    pub gateway_url: String,

    /// Bearer token for the messaging gateway.
    #[arg(long, env = "CHATBRIDGE_GATEWAY_TOKEN")]
    pub gateway_token: Option<String>,

    /// Timeout for a single gateway request in milliseconds.
    #[arg(long, default_value_t = 30000, env = "CHATBRIDGE_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Maximum number of buffered inbound messages (0 = unbounded).
    #[arg(long, default_value_t = 0, env = "CHATBRIDGE_HISTORY_LIMIT")]
    pub history_limit: usize,

    /// Number of recent messages fetched when a chat is selected.
    #[arg(long, default_value_t = 50, env = "CHATBRIDGE_CHAT_FETCH_LIMIT")]
    pub chat_fetch_limit: usize,

    /// Sender label for messages written by this session.
    #[arg(long, default_value = "Tú", env = "CHATBRIDGE_SELF_LABEL")]
    pub self_label: String,

    /// Routing suffix appended to bare chat ids.
    #[arg(long, default_value = "@c.us", env = "CHATBRIDGE_CHAT_SUFFIX")]
    pub chat_suffix: String,

    /// Log format (json or text).
    #[arg(long, default_value = "text", env = "CHATBRIDGE_LOG_FORMAT")]
    pub log_format: String,

    /// Log level filter, e.g. `info` or `chatbridge=debug`.
    #[arg(long, default_value = "info", env = "CHATBRIDGE_LOG_LEVEL")]
    pub log_level: String,
}

impl BridgeConfig {
    pub fn gateway(&self) -> crate::upstream::gateway::GatewayConfig {
        crate::upstream::gateway::GatewayConfig {
            base_url: self.gateway_url.clone(),
            auth_token: self.gateway_token.clone(),
            timeout: self.request_timeout(),
        }
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }

    /// History cap, `None` when unbounded.
    pub fn history_cap(&self) -> Option<usize> {
        (self.history_limit > 0).then_some(self.history_limit)
    }

    pub fn hub_settings(&self) -> crate::hub::HubSettings {
        crate::hub::HubSettings {
            chat_fetch_limit: self.chat_fetch_limit,
            self_label: self.self_label.clone(),
            chat_suffix: self.chat_suffix.clone(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
