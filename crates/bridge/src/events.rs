// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-format event types exchanged with downstream subscribers.
//!
//! Every frame is a JSON envelope `{"event": <name>, "data": <payload>}`.
//! Event names match the ones the browser front-end already listens for.

use serde::{Deserialize, Serialize};

use crate::error::ErrorNotice;

// -- Session model -----------------------------------------------------------

/// Connection status of the upstream session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    AwaitingQr,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::AwaitingQr => "awaiting_qr",
            Self::Connected => "connected",
        }
    }
}

/// Status word carried by the `status` event.
///
/// The front-end only distinguishes logged-in from not logged-in, so
/// `awaiting_qr` is reported as `desconectado`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    #[serde(rename = "conectado")]
    Connected,
    #[serde(rename = "desconectado")]
    Disconnected,
}

impl From<ConnectionStatus> for LinkStatus {
    fn from(status: ConnectionStatus) -> Self {
        match status {
            ConnectionStatus::Connected => Self::Connected,
            ConnectionStatus::Disconnected | ConnectionStatus::AwaitingQr => Self::Disconnected,
        }
    }
}

/// An inbound message received under the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub text: String,
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Chat list entry, passed through from the messaging client untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatSummary(pub serde_json::Value);

impl ChatSummary {
    /// Serialized chat id, whether the client reports it as a plain string or
    /// as an object with a `_serialized` field.
    pub fn id(&self) -> Option<&str> {
        let id = self.0.get("id")?;
        id.as_str().or_else(|| id.get("_serialized").and_then(|v| v.as_str()))
    }
}

/// A message of a selected chat, recomputed on every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    pub timestamp: i64,
}

/// Confirmation returned to the subscriber that sent a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub success: bool,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub message: String,
}

// -- Server -> Client --------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// QR login payload as a data URL.
    #[serde(rename = "qr")]
    Qr(String),
    #[serde(rename = "status")]
    Status(LinkStatus),
    #[serde(rename = "lista_chats")]
    ChatList(Vec<ChatSummary>),
    /// A single newly received message.
    #[serde(rename = "mensaje")]
    Message(Message),
    /// Full message history, sent once on connect.
    #[serde(rename = "all_messages")]
    History(Vec<Message>),
    #[serde(rename = "mensajes_chat")]
    ChatMessages(Vec<ChatMessage>),
    #[serde(rename = "mensaje_enviado")]
    Delivered(DeliveryReceipt),
    #[serde(rename = "error")]
    Error(ErrorNotice),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Qr(_) => "qr",
            Self::Status(_) => "status",
            Self::ChatList(_) => "lista_chats",
            Self::Message(_) => "mensaje",
            Self::History(_) => "all_messages",
            Self::ChatMessages(_) => "mensajes_chat",
            Self::Delivered(_) => "mensaje_enviado",
            Self::Error(_) => "error",
        }
    }
}

// -- Client -> Server --------------------------------------------------------

/// A command issued by one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    ListChats,
    SelectChat { chat_id: Option<String> },
    SendMessage { chat_id: Option<String>, message: Option<String> },
    Logout,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SendPayload {
    chat_id: Option<String>,
    message: Option<String>,
}

/// Parse a downstream text frame into a command.
///
/// Returns `None` for invalid JSON or unknown event names. Missing or
/// mistyped payload fields are kept as `None` so validation can report them.
pub fn parse_command(text: &str) -> Option<ClientCommand> {
    let msg: serde_json::Value = serde_json::from_str(text).ok()?;
    let event = msg.get("event").and_then(|v| v.as_str())?;
    let data = msg.get("data").cloned().unwrap_or(serde_json::Value::Null);

    match event {
        "obtener_chats" => Some(ClientCommand::ListChats),
        "seleccionar_chat" => {
            Some(ClientCommand::SelectChat { chat_id: data.as_str().map(str::to_owned) })
        }
        "enviar_mensaje" => {
            let payload: SendPayload = serde_json::from_value(data).unwrap_or_default();
            Some(ClientCommand::SendMessage { chat_id: payload.chat_id, message: payload.message })
        }
        "cerrar_sesion" => Some(ClientCommand::Logout),
        _ => None,
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
