//! Upstream CSMS link
//!
//! One connect attempt per invocation: build the upstream URL from the
//! configuration snapshot, replay the charger's handshake metadata, connect
//! with a timeout, then run the link until it drops. Reconnect scheduling
//! lives in [`Session::upstream_lost`]; this module only reports the loss.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async_tls_with_config;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::Connector;
use tracing::{debug, warn};

use crate::session::Session;

pub(crate) async fn run(session: Arc<Session>) {
    let cfg = session.ctx().config();
    let url = cfg.upstream_url(session.charge_point_id());

    let mut request = match url.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            warn!(charge_point_id = %session.charge_point_id(), url = %url, error = %e, "invalid upstream URL");
            session.upstream_lost();
            return;
        }
    };

    // Replay the charger's upgrade metadata verbatim. The subprotocol is
    // passed through without checking what the CSMS negotiates back.
    let handshake = session.handshake();
    if let Some(auth) = &handshake.authorization {
        match auth.parse() {
            Ok(value) => {
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            Err(e) => {
                warn!(charge_point_id = %session.charge_point_id(), error = %e, "unforwardable Authorization header");
            }
        }
    }
    if let Some(proto) = &handshake.subprotocol {
        match proto.parse() {
            Ok(value) => {
                request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
            }
            Err(e) => {
                warn!(charge_point_id = %session.charge_point_id(), error = %e, "unforwardable subprotocol header");
            }
        }
    }

    let connector = match lax_tls_connector() {
        Ok(connector) => connector,
        Err(e) => {
            warn!(charge_point_id = %session.charge_point_id(), error = %e, "TLS connector setup failed");
            session.upstream_lost();
            return;
        }
    };

    debug!(charge_point_id = %session.charge_point_id(), url = %url, "connecting upstream");
    let connect = connect_async_tls_with_config(request, None, false, Some(connector));
    let connected = tokio::select! {
        _ = session.cancel_token().cancelled() => return,
        result = tokio::time::timeout(Duration::from_millis(cfg.connect_timeout_ms), connect) => result,
    };

    let ws = match connected {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(e)) => {
            warn!(charge_point_id = %session.charge_point_id(), error = %e, "upstream connect failed");
            session.upstream_lost();
            return;
        }
        Err(_) => {
            warn!(
                charge_point_id = %session.charge_point_id(),
                timeout_ms = cfg.connect_timeout_ms,
                "upstream connect timed out"
            );
            session.upstream_lost();
            return;
        }
    };

    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    session.on_upstream_open(tx);

    // Writer task: sole owner of the sink. Exits once the session drops the
    // Open sender (loss or teardown), closing the socket on the way out.
    let writer_session = session.clone();
    tokio::spawn(async move {
        while let Some(raw) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(raw)).await {
                warn!(charge_point_id = %writer_session.charge_point_id(), error = %e, "upstream write failed");
                // A write failure is a loss in its own right; the read half
                // may stay quiet for a long time.
                writer_session.upstream_lost();
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = session.cancel_token().cancelled() => break,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => session.on_upstream_frame(&text),
                Some(Ok(Message::Close(_))) | None => {
                    debug!(charge_point_id = %session.charge_point_id(), "upstream closed");
                    break;
                }
                // Pings are answered by the stack; binary has no place in
                // OCPP-J and is not spliced.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(charge_point_id = %session.charge_point_id(), error = %e, "upstream read error");
                    break;
                }
            }
        }
    }

    // Transitioning out of Open drops the writer's sender, so the writer
    // drains and closes the sink on its own.
    session.upstream_lost();
}

/// TLS without hostname/certificate verification: self-signed CSMS endpoints
/// are permitted by design, and operators who need verification terminate
/// TLS at a reverse proxy.
fn lax_tls_connector() -> Result<Connector, native_tls::Error> {
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;
    Ok(Connector::NativeTls(tls))
}
