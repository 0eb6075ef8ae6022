//! Shared harness for the integration tests: an in-process relay, a scripted
//! charger client, and a capturing fake CSMS server.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as AxMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relay_api::{create_router, AppState};
use relay_core::{Direction, MessageRecord, RelayConfig};
use relay_session::{RelayContext, SessionRegistry};
use relay_store::{LogSpool, MemoryStore, RelayStore};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

// =============================================================================
// Relay under test
// =============================================================================

pub struct Relay {
    pub http_url: String,
    pub ws_url: String,
    pub store: Arc<MemoryStore>,
    pub ctx: Arc<RelayContext>,
    pub registry: Arc<SessionRegistry>,
    pub client: reqwest::Client,
}

pub async fn start_relay(config: RelayConfig) -> Relay {
    let store = Arc::new(MemoryStore::new());
    start_relay_with_store(config, store).await
}

pub async fn start_relay_with_store(config: RelayConfig, store: Arc<MemoryStore>) -> Relay {
    let dyn_store: Arc<dyn RelayStore> = store.clone();
    let spool = LogSpool::spawn(dyn_store.clone());
    let ctx = Arc::new(RelayContext::new(dyn_store, spool, config));
    let registry = Arc::new(SessionRegistry::new());
    let app = create_router(AppState::new(registry.clone(), ctx.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Relay {
        http_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}"),
        store,
        ctx,
        registry,
        client: reqwest::Client::new(),
    }
}

impl Relay {
    /// Poll the store until at least `count` log records with the given
    /// direction exist, or time out.
    pub async fn wait_for_log(&self, direction: Direction, count: usize) -> Vec<MessageRecord> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let matching: Vec<MessageRecord> = self
                .store
                .logs()
                .into_iter()
                .filter(|r| r.direction == direction)
                .collect();
            if matching.len() >= count {
                return matching;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "timed out waiting for {count} {direction:?} records, have {}",
                    matching.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

// =============================================================================
// Scripted charger client
// =============================================================================

pub struct Charger {
    write: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>,
    read: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

pub async fn connect_charger(relay: &Relay, charge_point_id: &str) -> Charger {
    connect_charger_with_headers(relay, charge_point_id, None, Some("ocpp1.6")).await
}

pub async fn connect_charger_with_headers(
    relay: &Relay,
    charge_point_id: &str,
    authorization: Option<&str>,
    subprotocol: Option<&str>,
) -> Charger {
    let url = format!("{}/ocpp/{}", relay.ws_url, charge_point_id);
    let mut request = url.into_client_request().unwrap();
    if let Some(auth) = authorization {
        request
            .headers_mut()
            .insert(AUTHORIZATION, auth.parse().unwrap());
    }
    if let Some(proto) = subprotocol {
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, proto.parse().unwrap());
    }
    let (stream, _response) = connect_async(request).await.expect("charger connect failed");
    let (write, read) = stream.split();
    Charger { write, read }
}

impl Charger {
    pub async fn send(&mut self, raw: &str) {
        self.write
            .send(WsMessage::Text(raw.to_string()))
            .await
            .expect("charger send failed");
    }

    /// Next text frame from the relay, or panic after the timeout.
    pub async fn recv(&mut self) -> String {
        match tokio::time::timeout(RECV_TIMEOUT, self.next_text()).await {
            Ok(Some(text)) => text,
            Ok(None) => panic!("relay closed the charger socket"),
            Err(_) => panic!("timed out waiting for a frame from the relay"),
        }
    }

    /// Returns `None` if nothing arrives within `wait`.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<String> {
        tokio::time::timeout(wait, self.next_text()).await.ok().flatten()
    }

    /// Waits for the relay to close the socket.
    pub async fn expect_close(&mut self) {
        match tokio::time::timeout(RECV_TIMEOUT, self.next_text()).await {
            Ok(None) => {}
            Ok(Some(frame)) => panic!("expected close, got frame {frame}"),
            Err(_) => panic!("timed out waiting for close"),
        }
    }

    async fn next_text(&mut self) -> Option<String> {
        while let Some(msg) = self.read.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => return Some(text),
                Ok(WsMessage::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    }

    pub async fn close(mut self) {
        let _ = self.write.close().await;
    }
}

// =============================================================================
// Fake CSMS
// =============================================================================

#[derive(Clone, Default)]
struct CsmsShared {
    /// Text frames received, in arrival order across all connections.
    received: Arc<Mutex<Vec<String>>>,
    /// Writer handles, one per accepted connection, newest last.
    senders: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>>,
    /// Headers observed on the most recent upgrade.
    last_authorization: Arc<Mutex<Option<String>>>,
    last_subprotocol: Arc<Mutex<Option<String>>>,
    connections: Arc<AtomicUsize>,
}

pub struct FakeCsms {
    /// Base URL for `targetCsmsUrl`; the relay appends `/{chargePointId}`.
    pub url: String,
    shared: CsmsShared,
    kick: broadcast::Sender<()>,
}

#[derive(Clone)]
struct CsmsState {
    shared: CsmsShared,
    kick: broadcast::Sender<()>,
}

pub async fn start_fake_csms() -> FakeCsms {
    let shared = CsmsShared::default();
    let (kick, _) = broadcast::channel(8);
    let state = CsmsState {
        shared: shared.clone(),
        kick: kick.clone(),
    };

    let app = Router::new()
        .route("/:charge_point_id", get(csms_accept))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeCsms {
        url: format!("ws://{addr}"),
        shared,
        kick,
    }
}

async fn csms_accept(
    State(state): State<CsmsState>,
    Path(_charge_point_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    *state.shared.last_authorization.lock() = headers
        .get(AUTHORIZATION.as_str())
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    *state.shared.last_subprotocol.lock() = headers
        .get(SEC_WEBSOCKET_PROTOCOL.as_str())
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    ws.on_upgrade(move |socket| csms_connection(state, socket))
}

async fn csms_connection(state: CsmsState, socket: WebSocket) {
    state.shared.connections.fetch_add(1, Ordering::SeqCst);
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.shared.senders.lock().push(tx);
    let mut kick = state.kick.subscribe();

    loop {
        tokio::select! {
            // A kick drops the socket, simulating CSMS-side failure.
            _ = kick.recv() => break,
            outbound = rx.recv() => match outbound {
                Some(raw) => {
                    if sink.send(AxMessage::Text(raw)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(AxMessage::Text(text))) => state.shared.received.lock().push(text),
                Some(Ok(AxMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
}

impl FakeCsms {
    pub fn received(&self) -> Vec<String> {
        self.shared.received.lock().clone()
    }

    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.shared.last_authorization.lock().clone()
    }

    pub fn last_subprotocol(&self) -> Option<String> {
        self.shared.last_subprotocol.lock().clone()
    }

    /// Send a frame to the relay on the most recent connection.
    pub fn send(&self, raw: &str) {
        let senders = self.shared.senders.lock();
        let sender = senders.last().expect("no CSMS connection yet");
        sender.send(raw.to_string()).expect("CSMS connection gone");
    }

    /// Drop every open connection.
    pub fn kick_all(&self) {
        let _ = self.kick.send(());
    }

    /// Wait until the relay has opened `count` connections in total.
    pub async fn wait_for_connections(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        while self.connections() < count {
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "timed out waiting for {count} CSMS connections, have {}",
                    self.connections()
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Wait until a received frame contains `needle`.
    pub async fn wait_for_frame_containing(&self, needle: &str) -> String {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            if let Some(frame) = self
                .received()
                .into_iter()
                .find(|f| f.contains(needle))
            {
                return frame;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for upstream frame containing {needle}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// A config pointing at the given CSMS with fast reconnects for tests.
pub fn forwarding_config(csms_url: &str) -> RelayConfig {
    RelayConfig {
        target_csms_url: csms_url.to_string(),
        csms_forwarding_enabled: true,
        reconnect_base_delay_ms: 200,
        connect_timeout_ms: 2_000,
        ..RelayConfig::default()
    }
}

/// A standalone-mode config (no upstream connect attempted).
pub fn standalone_config(auto_charge: bool) -> RelayConfig {
    RelayConfig {
        csms_forwarding_enabled: false,
        auto_charge_enabled: auto_charge,
        ..RelayConfig::default()
    }
}
