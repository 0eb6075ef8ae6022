//! Charger-facing WebSocket acceptor
//!
//! `GET /ocpp/{chargePointId}` upgrades the connection, snapshots the
//! handshake metadata for upstream replay, registers the session, and runs
//! the charger read loop. Closing the charger socket — for any reason —
//! destroys the session, and this handler is the only place a session is
//! removed from the registry.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use relay_core::HandshakeMeta;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::AppState;

/// Subprotocols offered back to the charger.
const OFFERED_SUBPROTOCOLS: [&str; 2] = ["ocpp1.6", "ocpp2.0.1"];

pub async fn accept(
    State(state): State<AppState>,
    Path(charge_point_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let handshake = HandshakeMeta {
        authorization: header_string(&headers, header::AUTHORIZATION.as_str()),
        subprotocol: header_string(&headers, header::SEC_WEBSOCKET_PROTOCOL.as_str()),
    };

    debug!(
        charge_point_id = %charge_point_id,
        subprotocol = ?handshake.subprotocol,
        has_authorization = handshake.authorization.is_some(),
        "charger upgrade requested"
    );

    ws.protocols(OFFERED_SUBPROTOCOLS)
        .on_upgrade(move |socket| run_charger_socket(state, charge_point_id, handshake, socket))
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

async fn run_charger_socket(
    state: AppState,
    charge_point_id: String,
    handshake: HandshakeMeta,
    socket: WebSocket,
) {
    let (mut sink, mut stream) = socket.split();
    let (charger_tx, mut charger_rx) = mpsc::unbounded_channel::<String>();

    let session = match state.registry().create(
        &charge_point_id,
        charger_tx,
        handshake,
        state.ctx().clone(),
    ) {
        Ok(session) => session,
        Err(e) => {
            warn!(charge_point_id = %charge_point_id, error = %e, "rejecting charger connection");
            let _ = sink.close().await;
            return;
        }
    };
    session.start().await;

    // Writer task: sole owner of the charger sink. A write failure means the
    // charger is gone, and that is a teardown in its own right — the inbound
    // stream can stay silent long after the write side died.
    let writer_session = session.clone();
    let writer = tokio::spawn(async move {
        while let Some(raw) = charger_rx.recv().await {
            if sink.send(Message::Text(raw)).await.is_err() {
                warn!(charge_point_id = %writer_session.charge_point_id(), "charger write failed, closing session");
                writer_session.teardown().await;
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            // Torn down elsewhere (e.g. by the writer on a write failure).
            _ = session.closed() => break,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => session.on_charger_frame(&text),
                Some(Ok(Message::Close(_))) | None => {
                    debug!(charge_point_id = %charge_point_id, "charger socket closed");
                    break;
                }
                Some(Ok(_)) => {} // pings are answered by the stack; binary is ignored
                Some(Err(e)) => {
                    warn!(charge_point_id = %charge_point_id, error = %e, "charger read error");
                    break;
                }
            }
        }
    }

    state.registry().remove(&charge_point_id);
    session.teardown().await;
    writer.abort();
}
