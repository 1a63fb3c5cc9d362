// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scriptable messaging client, its factory,
//! and a wired-up harness with an in-process server.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::UpstreamOp;
use crate::events::{ChatSummary, ConnectionStatus};
use crate::hub::{HubSettings, SubscriberHub};
use crate::lifecycle::SessionController;
use crate::state::SessionStore;
use crate::transport::AppState;
use crate::upstream::handle::Wiring;
use crate::upstream::qr::SvgQrRenderer;
use crate::upstream::{
    BoxFuture, ClientEvent, ClientFactory, HistoryMessage, MessagingClient,
};

/// In-memory messaging client that records every call.
#[derive(Default)]
pub struct FakeClient {
    events: Mutex<Option<mpsc::Sender<ClientEvent>>>,
    chats: Mutex<Vec<ChatSummary>>,
    history: Mutex<Vec<HistoryMessage>>,
    calls: Mutex<Vec<(UpstreamOp, String)>>,
    failing: Mutex<HashSet<UpstreamOp>>,
    logout_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_chats(&self, chats: Vec<ChatSummary>) {
        *self.chats.lock() = chats;
    }

    pub fn set_history(&self, history: Vec<HistoryMessage>) {
        *self.history.lock() = history;
    }

    /// Make every future call of `op` fail.
    pub fn fail_on(&self, op: UpstreamOp) {
        self.failing.lock().insert(op);
    }

    /// Make the next `logout` wait until the returned sender fires or drops.
    pub fn gate_logout(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.logout_gate.lock() = Some(rx);
        tx
    }

    /// Emit an event as if it came from the platform.
    pub async fn emit(&self, event: ClientEvent) -> anyhow::Result<()> {
        let tx = self.events.lock().clone();
        let tx = tx.ok_or_else(|| anyhow::anyhow!("client not initialized"))?;
        tx.send(event).await.map_err(|_| anyhow::anyhow!("event pump closed"))
    }

    pub fn calls(&self) -> Vec<(UpstreamOp, String)> {
        self.calls.lock().clone()
    }

    pub fn called(&self, op: UpstreamOp) -> bool {
        self.calls.lock().iter().any(|(o, _)| *o == op)
    }

    /// Argument strings recorded for `op`, in call order.
    pub fn args_of(&self, op: UpstreamOp) -> Vec<String> {
        self.calls.lock().iter().filter(|(o, _)| *o == op).map(|(_, a)| a.clone()).collect()
    }

    fn record(&self, op: UpstreamOp, arg: impl Into<String>) -> anyhow::Result<()> {
        self.calls.lock().push((op, arg.into()));
        if self.failing.lock().contains(&op) {
            anyhow::bail!("{op} failed");
        }
        Ok(())
    }
}

impl MessagingClient for FakeClient {
    fn initialize(&self, events: mpsc::Sender<ClientEvent>) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            *self.events.lock() = Some(events);
            self.record(UpstreamOp::Initialize, "")
        })
    }

    fn get_chats(&self) -> BoxFuture<'_, anyhow::Result<Vec<ChatSummary>>> {
        Box::pin(async move {
            self.record(UpstreamOp::ListChats, "")?;
            Ok(self.chats.lock().clone())
        })
    }

    fn get_chat<'a>(&'a self, chat_id: &'a str) -> BoxFuture<'a, anyhow::Result<ChatSummary>> {
        Box::pin(async move {
            self.record(UpstreamOp::GetChat, chat_id)?;
            Ok(ChatSummary(serde_json::json!({ "id": chat_id })))
        })
    }

    fn fetch_messages<'a>(
        &'a self,
        chat_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, anyhow::Result<Vec<HistoryMessage>>> {
        Box::pin(async move {
            self.record(UpstreamOp::FetchMessages, format!("{chat_id}:{limit}"))?;
            let history = self.history.lock().clone();
            let skip = history.len().saturating_sub(limit);
            Ok(history.into_iter().skip(skip).collect())
        })
    }

    fn send_message<'a>(
        &'a self,
        chat_id: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move { self.record(UpstreamOp::SendMessage, format!("{chat_id}:{body}")) })
    }

    fn logout(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let gate = self.logout_gate.lock().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.record(UpstreamOp::Logout, "")
        })
    }

    fn destroy(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            *self.events.lock() = None;
            self.record(UpstreamOp::Destroy, "")
        })
    }
}

/// Factory handing out [`FakeClient`]s and remembering each one.
#[derive(Default)]
pub struct FakeFactory {
    clients: Mutex<Vec<Arc<FakeClient>>>,
    fail_logout: Mutex<bool>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every client created from now on fails `logout` and `destroy`.
    pub fn fail_teardown(&self) {
        *self.fail_logout.lock() = true;
    }

    pub fn created(&self) -> Vec<Arc<FakeClient>> {
        self.clients.lock().clone()
    }

    /// Most recently created client.
    pub fn latest(&self) -> anyhow::Result<Arc<FakeClient>> {
        self.clients.lock().last().cloned().ok_or_else(|| anyhow::anyhow!("no client created"))
    }
}

impl ClientFactory for FakeFactory {
    fn create(&self) -> Arc<dyn MessagingClient> {
        let client = FakeClient::new();
        if *self.fail_logout.lock() {
            client.fail_on(UpstreamOp::Logout);
            client.fail_on(UpstreamOp::Destroy);
        }
        self.clients.lock().push(Arc::clone(&client));
        client
    }
}

/// Fully wired hub/controller/store over a [`FakeFactory`].
pub struct Harness {
    pub store: Arc<SessionStore>,
    pub factory: Arc<FakeFactory>,
    pub controller: Arc<SessionController>,
    pub hub: Arc<SubscriberHub>,
}

impl Harness {
    /// Build and start the controller; the first client is initialized.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(HubSettings::default(), None).await
    }

    pub async fn start_with(
        settings: HubSettings,
        history_limit: Option<usize>,
    ) -> anyhow::Result<Self> {
        let store = Arc::new(SessionStore::new(history_limit));
        let factory = FakeFactory::new();
        let wiring = Wiring {
            store: Arc::clone(&store),
            renderer: Arc::new(SvgQrRenderer),
            shutdown: CancellationToken::new(),
        };
        let controller = SessionController::start(factory.clone(), wiring).await;
        let hub = Arc::new(SubscriberHub::new(
            Arc::clone(&store),
            Arc::clone(&controller),
            settings,
        ));
        Ok(Self { store, factory, controller, hub })
    }

    /// Current upstream client.
    pub fn client(&self) -> anyhow::Result<Arc<FakeClient>> {
        self.factory.latest()
    }

    /// Drive the current client to `connected` and wait until the store and
    /// the ready-triggered chat fetch have both caught up.
    pub async fn connect(&self) -> anyhow::Result<()> {
        let client = self.client()?;
        client.emit(ClientEvent::Ready).await?;
        let store = Arc::clone(&self.store);
        wait_until(move || {
            store.status() == ConnectionStatus::Connected && client.called(UpstreamOp::ListChats)
        })
        .await
    }

    /// Transport state over this harness, with an optional subscriber token.
    pub fn app_state(&self, auth_token: Option<&str>) -> Arc<AppState> {
        Arc::new(AppState {
            hub: Arc::clone(&self.hub),
            store: Arc::clone(&self.store),
            auth_token: auth_token.map(str::to_owned),
            shutdown: CancellationToken::new(),
        })
    }
}

/// Spawn the HTTP/WS server on a random port for integration testing.
pub async fn spawn_http_server(
    state: Arc<AppState>,
) -> anyhow::Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    let router = crate::transport::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}

/// Poll `cond` until it holds or two seconds elapse.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("condition not met within 2s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

/// Await `fut` with a two second timeout.
pub async fn within<T>(fut: impl Future<Output = T>) -> anyhow::Result<T> {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .map_err(|_| anyhow::anyhow!("timed out after 2s"))
}
