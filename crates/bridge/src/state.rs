// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide session state: connection status, message history, and the
//! fan-out channel every subscriber listens on.
//!
//! Each upstream handle is tagged with a generation. Only events carrying the
//! currently active generation mutate state, so a handle that is being torn
//! down cannot leak QR codes, readiness, or messages into its successor.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::events::{ChatSummary, ConnectionStatus, LinkStatus, Message, ServerEvent};

/// Status plus a copy of the message log, used to hydrate new subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub status: ConnectionStatus,
    pub messages: Vec<Message>,
}

impl Snapshot {
    /// Initial frames for a freshly connected subscriber.
    pub fn into_events(self) -> Vec<ServerEvent> {
        vec![ServerEvent::Status(self.status.into()), ServerEvent::History(self.messages)]
    }
}

struct StoreInner {
    status: ConnectionStatus,
    active: Option<u64>,
    messages: VecDeque<Message>,
}

/// Session state store. Mutations and their broadcasts happen under one lock,
/// so every broadcast reflects the state after its handler completed.
pub struct SessionStore {
    inner: Mutex<StoreInner>,
    event_tx: broadcast::Sender<ServerEvent>,
    next_generation: AtomicU64,
    history_limit: Option<usize>,
}

impl SessionStore {
    pub fn new(history_limit: Option<usize>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(StoreInner {
                status: ConnectionStatus::Disconnected,
                active: None,
                messages: VecDeque::new(),
            }),
            event_tx,
            next_generation: AtomicU64::new(1),
            history_limit: history_limit.filter(|limit| *limit > 0),
        }
    }

    /// Subscribe to broadcast events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.event_tx.subscribe()
    }

    /// Take a snapshot and subscribe atomically: every message is either in
    /// the snapshot or delivered on the receiver, never both.
    pub fn subscribe_with_snapshot(&self) -> (Snapshot, broadcast::Receiver<ServerEvent>) {
        let inner = self.inner.lock();
        let rx = self.event_tx.subscribe();
        (Self::snapshot_of(&inner), rx)
    }

    pub fn snapshot(&self) -> Snapshot {
        Self::snapshot_of(&self.inner.lock())
    }

    fn snapshot_of(inner: &StoreInner) -> Snapshot {
        Snapshot { status: inner.status, messages: inner.messages.iter().cloned().collect() }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().status
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().messages.len()
    }

    /// Currently active generation, if any.
    pub fn active_generation(&self) -> Option<u64> {
        self.inner.lock().active
    }

    pub fn is_active(&self, generation: u64) -> bool {
        self.inner.lock().active == Some(generation)
    }

    /// Allocate a new generation and make it the only one accepted.
    pub fn activate(&self) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().active = Some(generation);
        generation
    }

    /// Stop accepting events from whichever generation is active and report
    /// `disconnected`.
    ///
    /// Logout calls this before waiting for in-flight commands, so the status
    /// broadcast is sent even when nothing was active.
    pub fn retire_active(&self) -> Option<u64> {
        let mut inner = self.inner.lock();
        let retired = inner.active.take();
        inner.status = ConnectionStatus::Disconnected;
        self.send(ServerEvent::Status(LinkStatus::Disconnected));
        retired
    }

    /// Record a QR login payload. Ignored once connected or when `generation`
    /// is stale. Returns whether the payload was broadcast.
    pub fn set_awaiting_qr(&self, generation: u64, qr: String) -> bool {
        let mut inner = self.inner.lock();
        if inner.active != Some(generation) || inner.status == ConnectionStatus::Connected {
            return false;
        }
        inner.status = ConnectionStatus::AwaitingQr;
        self.send(ServerEvent::Qr(qr));
        true
    }

    /// Mark the session ready. Returns whether the transition was accepted.
    pub fn set_connected(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.active != Some(generation) {
            return false;
        }
        inner.status = ConnectionStatus::Connected;
        self.send(ServerEvent::Status(LinkStatus::Connected));
        true
    }

    /// Append an inbound message and broadcast it.
    pub fn append_message(&self, generation: u64, msg: Message) -> bool {
        let mut inner = self.inner.lock();
        if inner.active != Some(generation) {
            return false;
        }
        if let Some(limit) = self.history_limit {
            while inner.messages.len() >= limit {
                inner.messages.pop_front();
            }
        }
        inner.messages.push_back(msg.clone());
        self.send(ServerEvent::Message(msg));
        true
    }

    /// Broadcast a chat list fetched on behalf of `generation`.
    pub fn publish_chat_list(&self, generation: u64, chats: Vec<ChatSummary>) -> bool {
        let inner = self.inner.lock();
        if inner.active != Some(generation) {
            return false;
        }
        self.send(ServerEvent::ChatList(chats));
        true
    }

    /// Clear history and confirm `disconnected`.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.status = ConnectionStatus::Disconnected;
        inner.messages.clear();
        self.send(ServerEvent::Status(LinkStatus::Disconnected));
    }

    // Sending with zero receivers is fine.
    fn send(&self, event: ServerEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
