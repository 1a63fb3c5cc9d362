// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::sync::broadcast;

use super::*;
use crate::events::{ChatSummary, LinkStatus, ServerEvent};
use crate::test_support::{wait_until, within, FakeClient};
use crate::upstream::qr::{QrRenderer, SvgQrRenderer};

fn wiring() -> Wiring {
    Wiring {
        store: Arc::new(SessionStore::new(None)),
        renderer: Arc::new(SvgQrRenderer),
        shutdown: CancellationToken::new(),
    }
}

async fn attached() -> anyhow::Result<(Wiring, Arc<FakeClient>, Arc<SessionHandle>)> {
    let wiring = wiring();
    let client = FakeClient::new();
    let handle = SessionHandle::attach(client.clone(), &wiring);
    handle.initialize().await?;
    Ok((wiring, client, handle))
}

async fn next_event(rx: &mut broadcast::Receiver<ServerEvent>) -> anyhow::Result<ServerEvent> {
    Ok(within(rx.recv()).await??)
}

#[tokio::test]
async fn attach_activates_a_new_generation() -> anyhow::Result<()> {
    let (wiring, _client, handle) = attached().await?;
    assert_eq!(wiring.store.active_generation(), Some(handle.generation()));

    let second = SessionHandle::attach(FakeClient::new(), &wiring);
    assert!(second.generation() > handle.generation());
    assert_eq!(wiring.store.active_generation(), Some(second.generation()));
    Ok(())
}

#[tokio::test]
async fn qr_event_is_rendered_and_broadcast() -> anyhow::Result<()> {
    let (wiring, client, _handle) = attached().await?;
    let mut rx = wiring.store.subscribe();

    client.emit(ClientEvent::Qr("2@abc".to_owned())).await?;

    let expected = SvgQrRenderer.render("2@abc").await?;
    assert_eq!(next_event(&mut rx).await?, ServerEvent::Qr(expected));
    assert_eq!(wiring.store.status(), ConnectionStatus::AwaitingQr);
    Ok(())
}

#[tokio::test]
async fn ready_connects_and_publishes_chats() -> anyhow::Result<()> {
    let (wiring, client, _handle) = attached().await?;
    client.set_chats(vec![ChatSummary(serde_json::json!({"id": "1@c.us"}))]);
    let mut rx = wiring.store.subscribe();

    client.emit(ClientEvent::Ready).await?;

    assert_eq!(next_event(&mut rx).await?, ServerEvent::Status(LinkStatus::Connected));
    match next_event(&mut rx).await? {
        ServerEvent::ChatList(chats) => assert_eq!(chats.len(), 1),
        other => anyhow::bail!("expected chat list, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn chat_fetch_failure_after_ready_is_not_fatal() -> anyhow::Result<()> {
    let (wiring, client, _handle) = attached().await?;
    client.fail_on(UpstreamOp::ListChats);

    client.emit(ClientEvent::Ready).await?;
    let c = Arc::clone(&client);
    wait_until(move || c.called(UpstreamOp::ListChats)).await?;

    assert_eq!(wiring.store.status(), ConnectionStatus::Connected);
    client.emit(ClientEvent::Message(InboundMessage {
        from: "A".to_owned(),
        body: "still alive".to_owned(),
        notify_name: None,
    }))
    .await?;
    let store = Arc::clone(&wiring.store);
    wait_until(move || store.message_count() == 1).await
}

#[tokio::test]
async fn qr_after_ready_is_ignored() -> anyhow::Result<()> {
    let (wiring, client, _handle) = attached().await?;
    client.emit(ClientEvent::Qr("first".to_owned())).await?;
    client.emit(ClientEvent::Ready).await?;
    client.emit(ClientEvent::Qr("late".to_owned())).await?;
    client.emit(ClientEvent::Message(InboundMessage {
        from: "A".to_owned(),
        body: "marker".to_owned(),
        notify_name: None,
    }))
    .await?;

    // The marker message proves the late QR was already processed.
    let store = Arc::clone(&wiring.store);
    wait_until(move || store.message_count() == 1).await?;
    assert_eq!(wiring.store.status(), ConnectionStatus::Connected);
    Ok(())
}

#[tokio::test]
async fn message_event_maps_sender_and_name() -> anyhow::Result<()> {
    let (wiring, client, _handle) = attached().await?;
    client
        .emit(ClientEvent::Message(InboundMessage {
            from: "5551234567@c.us".to_owned(),
            body: "hola".to_owned(),
            notify_name: Some("Ana".to_owned()),
        }))
        .await?;

    let store = Arc::clone(&wiring.store);
    wait_until(move || store.message_count() == 1).await?;
    assert_eq!(
        wiring.store.snapshot().messages,
        vec![Message {
            sender: "5551234567@c.us".to_owned(),
            text: "hola".to_owned(),
            display_name: Some("Ana".to_owned()),
        }]
    );
    Ok(())
}

#[test]
fn empty_notify_name_becomes_none() {
    let msg: Message =
        InboundMessage { from: "A".to_owned(), body: "x".to_owned(), notify_name: Some(String::new()) }
            .into();
    assert_eq!(msg.display_name, None);
}

#[tokio::test]
async fn events_after_detach_are_ignored() -> anyhow::Result<()> {
    let (wiring, client, handle) = attached().await?;
    handle.detach();
    // The pump may already be gone; a failed emit is fine.
    let _ = client.emit(ClientEvent::Ready).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(wiring.store.status(), ConnectionStatus::Disconnected);
    Ok(())
}

#[tokio::test]
async fn detached_handle_rejects_commands() -> anyhow::Result<()> {
    let (_wiring, client, handle) = attached().await?;
    handle.detach();
    let err = handle.list_chats().await.err();
    assert!(matches!(err, Some(UpstreamError::Retired { generation }) if generation == handle.generation()));
    assert!(!client.called(UpstreamOp::ListChats));
    Ok(())
}

#[tokio::test]
async fn upstream_failure_is_typed() -> anyhow::Result<()> {
    let (_wiring, client, handle) = attached().await?;
    client.fail_on(UpstreamOp::SendMessage);
    let err = handle.send_message("1@c.us", "hi").await.err();
    assert!(matches!(err, Some(UpstreamError::CallFailed { op: UpstreamOp::SendMessage, .. })));
    Ok(())
}

#[tokio::test]
async fn chat_messages_looks_up_chat_first() -> anyhow::Result<()> {
    let (_wiring, client, handle) = attached().await?;
    handle.chat_messages("1@c.us", 50).await?;
    assert_eq!(client.args_of(UpstreamOp::GetChat), ["1@c.us"]);
    assert_eq!(client.args_of(UpstreamOp::FetchMessages), ["1@c.us:50"]);
    Ok(())
}

#[tokio::test]
async fn destroy_detaches_even_on_failure() -> anyhow::Result<()> {
    let (_wiring, client, handle) = attached().await?;
    client.fail_on(UpstreamOp::Destroy);
    assert!(handle.destroy().await.is_err());
    assert!(handle.is_detached());
    Ok(())
}
