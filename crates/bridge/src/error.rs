// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes surfaced to downstream subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Command issued before the upstream session is connected.
    NotReady,
    /// A call into the messaging client failed.
    UpstreamCallFailure,
    /// Command payload is missing required fields.
    InvalidCommandPayload,
    /// Missing or wrong subscriber token.
    Unauthorized,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotReady => 503,
            Self::UpstreamCallFailure => 502,
            Self::InvalidCommandPayload => 400,
            Self::Unauthorized => 401,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotReady => "NOT_READY",
            Self::UpstreamCallFailure => "UPSTREAM_ERROR",
            Self::InvalidCommandPayload => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
        }
    }

    pub fn to_notice(&self, message: impl Into<String>) -> ErrorNotice {
        ErrorNotice { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(&self, message: impl Into<String>) -> (StatusCode, Json<ErrorNotice>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_notice(message)))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub code: String,
    pub message: String,
}

/// Upstream operation names, used in logs and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamOp {
    Initialize,
    ListChats,
    GetChat,
    FetchMessages,
    SendMessage,
    Logout,
    Destroy,
}

impl UpstreamOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ListChats => "list_chats",
            Self::GetChat => "get_chat",
            Self::FetchMessages => "fetch_messages",
            Self::SendMessage => "send_message",
            Self::Logout => "logout",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for UpstreamOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a call forwarded to the messaging client.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream {op} failed: {detail}")]
    CallFailed { op: UpstreamOp, detail: String },
    #[error("upstream session {generation} was replaced")]
    Retired { generation: u64 },
}

impl UpstreamError {
    pub fn call_failed(op: UpstreamOp, err: &anyhow::Error) -> Self {
        Self::CallFailed { op, detail: format!("{err:#}") }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::CallFailed { .. } => ErrorCode::UpstreamCallFailure,
            Self::Retired { .. } => ErrorCode::NotReady,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
