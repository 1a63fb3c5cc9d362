// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::sync::broadcast::error::TryRecvError;

use super::*;

fn msg(sender: &str, text: &str) -> Message {
    Message { sender: sender.to_owned(), text: text.to_owned(), display_name: None }
}

fn drain(rx: &mut broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(e) => out.push(e),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}

#[test]
fn starts_disconnected_and_empty() {
    let store = SessionStore::new(None);
    assert_eq!(
        store.snapshot(),
        Snapshot { status: ConnectionStatus::Disconnected, messages: vec![] }
    );
    assert_eq!(store.active_generation(), None);
}

#[test]
fn qr_events_then_ready_end_connected_without_late_qr() {
    let store = SessionStore::new(None);
    let mut rx = store.subscribe();
    let generation = store.activate();

    assert!(store.set_awaiting_qr(generation, "qr-1".to_owned()));
    assert!(store.set_awaiting_qr(generation, "qr-2".to_owned()));
    assert_eq!(store.status(), ConnectionStatus::AwaitingQr);
    assert!(store.set_connected(generation));
    assert!(!store.set_awaiting_qr(generation, "qr-3".to_owned()));

    assert_eq!(store.status(), ConnectionStatus::Connected);
    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            ServerEvent::Qr("qr-1".to_owned()),
            ServerEvent::Qr("qr-2".to_owned()),
            ServerEvent::Status(LinkStatus::Connected),
        ]
    );
}

#[test]
fn snapshot_holds_messages_in_arrival_order() {
    let store = SessionStore::new(None);
    let generation = store.activate();
    for i in 0..5 {
        assert!(store.append_message(generation, msg("A", &format!("m{i}"))));
    }

    let snap = store.snapshot();
    let texts: Vec<_> = snap.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["m0", "m1", "m2", "m3", "m4"]);
}

#[test]
fn append_broadcasts_each_message_immediately() {
    let store = SessionStore::new(None);
    let mut rx = store.subscribe();
    let generation = store.activate();
    store.append_message(generation, msg("A", "hello"));
    assert_eq!(drain(&mut rx), vec![ServerEvent::Message(msg("A", "hello"))]);
}

#[test]
fn ready_then_message_snapshot_matches_scenario() {
    let store = SessionStore::new(None);
    let generation = store.activate();
    store.set_connected(generation);
    store.append_message(generation, msg("A", "hello"));

    let (snap, _rx) = store.subscribe_with_snapshot();
    assert_eq!(snap.status, ConnectionStatus::Connected);
    assert_eq!(snap.messages, vec![msg("A", "hello")]);
    assert_eq!(
        snap.into_events(),
        vec![
            ServerEvent::Status(LinkStatus::Connected),
            ServerEvent::History(vec![msg("A", "hello")]),
        ]
    );
}

#[test]
fn subscribe_with_snapshot_does_not_duplicate() {
    let store = SessionStore::new(None);
    let generation = store.activate();
    store.append_message(generation, msg("A", "before"));

    let (snap, mut rx) = store.subscribe_with_snapshot();
    store.append_message(generation, msg("A", "after"));

    assert_eq!(snap.messages, vec![msg("A", "before")]);
    assert_eq!(drain(&mut rx), vec![ServerEvent::Message(msg("A", "after"))]);
}

#[test]
fn reset_clears_history_and_reports_disconnected() {
    let store = SessionStore::new(None);
    let generation = store.activate();
    store.set_connected(generation);
    store.append_message(generation, msg("A", "hello"));
    let mut rx = store.subscribe();

    store.reset();

    assert_eq!(store.status(), ConnectionStatus::Disconnected);
    assert_eq!(store.message_count(), 0);
    assert_eq!(drain(&mut rx), vec![ServerEvent::Status(LinkStatus::Disconnected)]);
}

#[test]
fn retired_generation_is_ignored() {
    let store = SessionStore::new(None);
    let old = store.activate();
    store.set_connected(old);
    store.retire_active();
    store.reset();

    let mut rx = store.subscribe();
    assert!(!store.set_connected(old));
    assert!(!store.set_awaiting_qr(old, "stale".to_owned()));
    assert!(!store.append_message(old, msg("A", "stale")));
    assert!(!store.publish_chat_list(old, vec![]));

    assert_eq!(store.status(), ConnectionStatus::Disconnected);
    assert_eq!(store.message_count(), 0);
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn new_generation_connects_after_retire() {
    let store = SessionStore::new(None);
    let old = store.activate();
    store.set_connected(old);
    store.retire_active();
    store.reset();

    let new = store.activate();
    assert_ne!(old, new);
    assert!(!store.set_connected(old));
    assert!(store.set_connected(new));
    assert_eq!(store.status(), ConnectionStatus::Connected);
}

#[test]
fn activate_replaces_previous_generation() {
    let store = SessionStore::new(None);
    let first = store.activate();
    let second = store.activate();
    assert!(!store.is_active(first));
    assert!(store.is_active(second));
}

#[test]
fn retire_active_drops_current_generation() {
    let store = SessionStore::new(None);
    let generation = store.activate();
    store.set_connected(generation);
    let mut rx = store.subscribe();

    assert_eq!(store.retire_active(), Some(generation));

    assert_eq!(store.active_generation(), None);
    assert_eq!(store.status(), ConnectionStatus::Disconnected);
    assert_eq!(drain(&mut rx), vec![ServerEvent::Status(LinkStatus::Disconnected)]);
}

#[test]
fn retire_active_broadcasts_even_when_nothing_is_active() {
    let store = SessionStore::new(None);
    let mut rx = store.subscribe();

    assert_eq!(store.retire_active(), None);
    assert_eq!(drain(&mut rx), vec![ServerEvent::Status(LinkStatus::Disconnected)]);
}

#[test]
fn history_limit_drops_oldest() {
    let store = SessionStore::new(Some(2));
    let generation = store.activate();
    for text in ["a", "b", "c"] {
        store.append_message(generation, msg("A", text));
    }
    let texts: Vec<_> = store.snapshot().messages.into_iter().map(|m| m.text).collect();
    assert_eq!(texts, ["b", "c"]);
}

#[test]
fn zero_history_limit_is_unbounded() {
    let store = SessionStore::new(Some(0));
    let generation = store.activate();
    for text in ["a", "b", "c"] {
        store.append_message(generation, msg("A", text));
    }
    assert_eq!(store.message_count(), 3);
}
