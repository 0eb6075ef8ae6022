//! The per-charger session mediator
//!
//! A [`Session`] owns everything the relay holds for one connected charger:
//! the charger-bound writer handle, the upstream link state, the
//! pending-injection and pending-auth-tag tables, the egress buffer used
//! while the upstream is away, and the reconnect bookkeeping.
//!
//! Mutable state sits behind a single short-held mutex; no I/O happens under
//! it. Socket writes are serialized through per-socket unbounded channels
//! consumed by writer tasks, and log appends go through the non-blocking
//! spool.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::{
    profile, ChargerRow, ChargerStatus, Direction, Frame, FrameKind, HandshakeMeta, ProxyError,
    ProxyResult,
};
use relay_store::RelayStore;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::RelayContext;
use crate::responder::{self, Followup};
use crate::upstream;

/// TTL for pending injections and pending auth tags.
const ENTRY_TTL: Duration = Duration::from_secs(60);
/// Cadence of the TTL sweep task.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
/// Egress buffer cap; oldest entries are dropped on overflow.
const EGRESS_CAPACITY: usize = 1024;
/// Delay before re-asserting the persistent current limit, letting the
/// BootNotification exchange settle first.
const LIMIT_REPLAY_DELAY: Duration = Duration::from_millis(500);
/// Delay before the auto-charge RemoteStartTransaction after Preparing.
const AUTO_START_DELAY: Duration = Duration::from_millis(100);

/// Upstream link sub-state.
pub(crate) enum UpstreamLink {
    /// No upstream for this session (forwarding disabled, or torn down).
    Absent,
    /// A connect attempt is in flight.
    Connecting,
    /// Live link; the sender feeds the upstream writer task.
    Open(mpsc::UnboundedSender<String>),
    /// Between failed attempts, waiting for the backoff timer.
    WaitRetry,
    /// Attempt cap exhausted; the standalone responder services all
    /// upstream-bound requests until the session ends.
    GaveUp,
}

pub(crate) struct MediatorState {
    pub(crate) upstream: UpstreamLink,
    pub(crate) pending_injections: HashMap<String, Instant>,
    pub(crate) pending_auth_tags: HashMap<String, Instant>,
    pub(crate) egress: VecDeque<String>,
    pub(crate) reconnect_attempt: u32,
}

pub struct Session {
    charge_point_id: String,
    handshake: HandshakeMeta,
    ctx: Arc<RelayContext>,
    /// Feeds the charger-socket writer task.
    charger_tx: mpsc::UnboundedSender<String>,
    state: Mutex<MediatorState>,
    cancel: CancellationToken,
    first_frame_seen: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("charge_point_id", &self.charge_point_id)
            .finish_non_exhaustive()
    }
}

enum UpstreamRoute {
    Relay(mpsc::UnboundedSender<String>),
    Buffered,
    Standalone,
    Discard,
}

impl Session {
    pub(crate) fn new(
        charge_point_id: &str,
        charger_tx: mpsc::UnboundedSender<String>,
        handshake: HandshakeMeta,
        ctx: Arc<RelayContext>,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.to_string(),
            handshake,
            ctx,
            charger_tx,
            state: Mutex::new(MediatorState {
                upstream: UpstreamLink::Absent,
                pending_injections: HashMap::new(),
                pending_auth_tags: HashMap::new(),
                egress: VecDeque::new(),
                reconnect_attempt: 0,
            }),
            cancel: CancellationToken::new(),
            first_frame_seen: AtomicBool::new(false),
        }
    }

    pub fn charge_point_id(&self) -> &str {
        &self.charge_point_id
    }

    pub(crate) fn handshake(&self) -> &HandshakeMeta {
        &self.handshake
    }

    pub(crate) fn ctx(&self) -> &Arc<RelayContext> {
        &self.ctx
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Kick off the session's background work: mark the charger row ONLINE,
    /// start the TTL sweep, schedule the persistent-limit replay, and (when
    /// forwarding is enabled) begin the upstream connect.
    pub async fn start(self: &Arc<Self>) {
        info!(charge_point_id = %self.charge_point_id, "session started");

        let store = self.ctx.store();
        if let Err(e) = store
            .upsert_charger(&ChargerRow::online(&self.charge_point_id))
            .await
        {
            warn!(charge_point_id = %self.charge_point_id, error = %e, "failed to mark charger online");
        }

        let max_power = match store.charger(&self.charge_point_id).await {
            Ok(row) => row.and_then(|r| r.max_power),
            Err(e) => {
                warn!(charge_point_id = %self.charge_point_id, error = %e, "failed to read charger row");
                None
            }
        };

        let session = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = session.cancel.cancelled() => break,
                    _ = tick.tick() => session.purge_expired(),
                }
            }
        });

        if let Some(limit) = max_power {
            let session = self.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = session.cancel.cancelled() => {}
                    _ = tokio::time::sleep(LIMIT_REPLAY_DELAY) => {
                        match session
                            .inject("SetChargingProfile", profile::charge_point_max_profile(limit))
                        {
                            Ok(id) => info!(
                                charge_point_id = %session.charge_point_id,
                                message_id = %id,
                                limit,
                                "re-applied persistent current limit"
                            ),
                            Err(e) => warn!(
                                charge_point_id = %session.charge_point_id,
                                error = %e,
                                "failed to re-apply persistent current limit"
                            ),
                        }
                    }
                }
            });
        }

        if self.ctx.config().csms_forwarding_enabled {
            self.state.lock().upstream = UpstreamLink::Connecting;
            tokio::spawn(upstream::run(self.clone()));
        } else {
            debug!(charge_point_id = %self.charge_point_id, "forwarding disabled, session runs standalone");
        }
    }

    /// Tear the session down: cancel timers and in-flight connects, drop the
    /// upstream link, and mark the charger row OFFLINE. Idempotent.
    pub async fn teardown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        // Dropping the Open sender makes the upstream writer close its sink.
        self.state.lock().upstream = UpstreamLink::Absent;

        if let Err(e) = self
            .ctx
            .store()
            .set_charger_status(&self.charge_point_id, ChargerStatus::Offline)
            .await
        {
            warn!(charge_point_id = %self.charge_point_id, error = %e, "failed to mark charger offline");
        }
        info!(charge_point_id = %self.charge_point_id, "session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the session has been torn down, from any path.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    // =========================================================================
    // Charger → upstream direction
    // =========================================================================

    /// Handle one text frame read from the charger socket.
    pub fn on_charger_frame(self: &Arc<Self>, raw: &str) {
        if !self.first_frame_seen.swap(true, Ordering::Relaxed) {
            debug!(charge_point_id = %self.charge_point_id, "first charger frame seen");
        }

        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                error!(charge_point_id = %self.charge_point_id, error = %e, "dropping malformed charger frame");
                return;
            }
        };

        // Interception comes before the UPSTREAM log append: a response to an
        // injected call must never appear in the log under an upstream-bound
        // direction, and must never reach the CSMS.
        if frame.is_response() {
            let intercepted = self
                .state
                .lock()
                .pending_injections
                .remove(frame.id())
                .is_some();
            if intercepted {
                debug!(
                    charge_point_id = %self.charge_point_id,
                    message_id = %frame.id(),
                    "swallowed injection response"
                );
                self.record(Direction::InjectionResponse, frame.encode());
                return;
            }
        }

        self.record(Direction::Upstream, frame.encode());
        self.dispatch_upstream_bound(&frame, raw);
    }

    fn dispatch_upstream_bound(self: &Arc<Self>, frame: &Frame, raw: &str) {
        // One retry: a Relay route can fail if the upstream writer died
        // between the state check and the send; the loss handler runs and the
        // frame is re-routed under the new state.
        for _ in 0..2 {
            let route = {
                let mut guard = self.state.lock();
                let st = &mut *guard;
                match (&st.upstream, frame.kind()) {
                    (UpstreamLink::Open(tx), _) => UpstreamRoute::Relay(tx.clone()),
                    (
                        UpstreamLink::Connecting | UpstreamLink::WaitRetry,
                        FrameKind::Request,
                    ) => {
                        if st.egress.len() >= EGRESS_CAPACITY {
                            st.egress.pop_front();
                            warn!(
                                charge_point_id = %self.charge_point_id,
                                "egress buffer full, dropping oldest frame"
                            );
                        }
                        st.egress.push_back(raw.to_string());
                        UpstreamRoute::Buffered
                    }
                    (_, FrameKind::Request) => UpstreamRoute::Standalone,
                    _ => UpstreamRoute::Discard,
                }
            };

            match route {
                UpstreamRoute::Relay(tx) => {
                    if tx.send(raw.to_string()).is_ok() {
                        return;
                    }
                    self.upstream_lost();
                    continue;
                }
                UpstreamRoute::Buffered => {
                    debug!(charge_point_id = %self.charge_point_id, "buffered frame while upstream is away");
                    return;
                }
                UpstreamRoute::Standalone => {
                    self.respond_standalone(frame.clone());
                    return;
                }
                UpstreamRoute::Discard => {
                    debug!(
                        charge_point_id = %self.charge_point_id,
                        message_id = %frame.id(),
                        "dropping charger response with no live upstream"
                    );
                    return;
                }
            }
        }
    }

    // =========================================================================
    // Upstream → charger direction
    // =========================================================================

    /// Handle one text frame read from the upstream socket. Malformed frames
    /// are still forwarded raw; the CSMS owns protocol semantics on its side.
    pub(crate) fn on_upstream_frame(&self, raw: &str) {
        let payload_json = match Frame::decode(raw) {
            Ok(frame) => frame.encode(),
            Err(e) => {
                error!(charge_point_id = %self.charge_point_id, error = %e, "undecodable upstream frame, forwarding raw");
                raw.to_string()
            }
        };
        self.record(Direction::Downstream, payload_json);

        if self.charger_tx.send(raw.to_string()).is_err() {
            warn!(charge_point_id = %self.charge_point_id, "charger socket gone, dropping downstream frame");
        }
    }

    // =========================================================================
    // Upstream lifecycle
    // =========================================================================

    /// Called by the upstream task once the socket is open. Resets the
    /// attempt counter and flushes the egress buffer in FIFO order before any
    /// newly arriving charger frame can see the open link.
    pub(crate) fn on_upstream_open(&self, tx: mpsc::UnboundedSender<String>) {
        let mut flushed = 0usize;
        {
            let mut st = self.state.lock();
            st.reconnect_attempt = 0;
            while let Some(raw) = st.egress.pop_front() {
                if tx.send(raw).is_err() {
                    break;
                }
                flushed += 1;
            }
            st.upstream = UpstreamLink::Open(tx);
        }
        info!(charge_point_id = %self.charge_point_id, flushed, "upstream connected");
    }

    /// Called on upstream close, error, write failure, or connect failure.
    /// Schedules a bounded-backoff reconnect, or gives up and hands the
    /// buffered frames to the standalone responder.
    pub(crate) fn upstream_lost(self: &Arc<Self>) {
        if self.cancel.is_cancelled() {
            return;
        }
        let cfg = self.ctx.config();

        enum Next {
            Retry { attempt: u32, delay: Duration },
            GiveUp(Vec<String>),
            Ignore,
        }

        let next = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            match st.upstream {
                // Already absent, already waiting, or already given up:
                // a second loss notification has nothing to do.
                UpstreamLink::Absent | UpstreamLink::WaitRetry | UpstreamLink::GaveUp => {
                    Next::Ignore
                }
                UpstreamLink::Connecting | UpstreamLink::Open(_) => {
                    if !cfg.csms_forwarding_enabled {
                        st.upstream = UpstreamLink::Absent;
                        Next::Ignore
                    } else if st.reconnect_attempt < cfg.reconnect_max_attempts {
                        st.reconnect_attempt += 1;
                        st.upstream = UpstreamLink::WaitRetry;
                        Next::Retry {
                            attempt: st.reconnect_attempt,
                            delay: Duration::from_millis(
                                cfg.reconnect_base_delay_ms << (st.reconnect_attempt - 1),
                            ),
                        }
                    } else {
                        st.upstream = UpstreamLink::GaveUp;
                        Next::GiveUp(st.egress.drain(..).collect())
                    }
                }
            }
        };

        match next {
            Next::Ignore => {}
            Next::Retry { attempt, delay } => {
                warn!(
                    charge_point_id = %self.charge_point_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "upstream lost, scheduling reconnect"
                );
                let session = self.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = session.cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            session.state.lock().upstream = UpstreamLink::Connecting;
                            upstream::run(session.clone()).await;
                        }
                    }
                });
            }
            Next::GiveUp(buffered) => {
                warn!(
                    charge_point_id = %self.charge_point_id,
                    buffered = buffered.len(),
                    "reconnect attempts exhausted, standalone responder takes over"
                );
                for raw in buffered {
                    if let Ok(frame) = Frame::decode(&raw) {
                        self.respond_standalone(frame);
                    }
                }
            }
        }
    }

    // =========================================================================
    // Standalone responder
    // =========================================================================

    fn respond_standalone(self: &Arc<Self>, frame: Frame) {
        let Frame::Call {
            id,
            action,
            payload,
        } = frame
        else {
            return;
        };

        let cfg = self.ctx.config();
        let synthesis = {
            let mut st = self.state.lock();
            responder::synthesize(&action, &payload, &cfg, &mut st.pending_auth_tags, || {
                self.ctx.next_transaction_id()
            })
        };

        let Some(synthesis) = synthesis else {
            debug!(
                charge_point_id = %self.charge_point_id,
                action = %action,
                "no standalone synthesis for action, dropping request"
            );
            return;
        };

        let reply = Frame::CallResult {
            id,
            payload: synthesis.payload,
        };
        let encoded = reply.encode();
        if self.charger_tx.send(encoded.clone()).is_err() {
            warn!(charge_point_id = %self.charge_point_id, "charger socket gone, dropping synthesized response");
            return;
        }
        self.record(Direction::ProxyResponse, encoded);

        if let Some(Followup::AutoStart { connector_id }) = synthesis.followup {
            let session = self.clone();
            let id_tag = cfg.default_id_tag.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = session.cancel.cancelled() => {}
                    _ = tokio::time::sleep(AUTO_START_DELAY) => {
                        let payload = json!({ "connectorId": connector_id, "idTag": id_tag });
                        match session.inject("RemoteStartTransaction", payload) {
                            Ok(message_id) => info!(
                                charge_point_id = %session.charge_point_id,
                                message_id = %message_id,
                                connector_id,
                                "auto-charge started transaction"
                            ),
                            Err(e) => warn!(
                                charge_point_id = %session.charge_point_id,
                                error = %e,
                                "auto-charge start failed"
                            ),
                        }
                    }
                }
            });
        }
    }

    // =========================================================================
    // Operator-facing operations
    // =========================================================================

    /// Inject an operator Call toward the charger. The generated message id
    /// is tracked so the charger's response is swallowed instead of being
    /// forwarded upstream.
    pub fn inject(&self, action: &str, payload: Value) -> ProxyResult<String> {
        if self.cancel.is_cancelled() {
            return Err(ProxyError::ChargerNotConnected(
                self.charge_point_id.clone(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let frame = Frame::Call {
            id: id.clone(),
            action: action.to_string(),
            payload: payload.clone(),
        };

        {
            let mut st = self.state.lock();
            st.pending_injections.insert(id.clone(), Instant::now());
            if action == "RemoteStartTransaction" {
                if let Some(tag) = payload.get("idTag").and_then(Value::as_str) {
                    st.pending_auth_tags.insert(tag.to_string(), Instant::now());
                }
            }
        }

        let encoded = frame.encode();
        if self.charger_tx.send(encoded.clone()).is_err() {
            self.state.lock().pending_injections.remove(&id);
            return Err(ProxyError::ChargerNotConnected(
                self.charge_point_id.clone(),
            ));
        }

        self.record(Direction::InjectionRequest, encoded);
        info!(
            charge_point_id = %self.charge_point_id,
            message_id = %id,
            action = %action,
            "injected command"
        );
        Ok(id)
    }

    /// Write (or clear) the durable per-charger current limit, then assert it
    /// on the wire. The store write failing aborts the operation before any
    /// injection is emitted.
    pub async fn set_persistent_limit(&self, amperes: Option<f64>) -> ProxyResult<String> {
        self.ctx
            .store()
            .set_max_power(&self.charge_point_id, amperes)
            .await?;

        match amperes {
            Some(limit) => self.inject(
                "SetChargingProfile",
                profile::charge_point_max_profile(limit),
            ),
            None => self.inject("ClearChargingProfile", profile::clear_persistent_profile()),
        }
    }

    /// One-shot session limit; durable state is untouched.
    pub fn apply_session_limit(
        &self,
        amperes: f64,
        transaction_id: Option<i64>,
    ) -> ProxyResult<String> {
        self.inject(
            "SetChargingProfile",
            profile::session_limit_profile(amperes, transaction_id),
        )
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    fn purge_expired(&self) {
        let now = Instant::now();
        let mut st = self.state.lock();
        let before = st.pending_injections.len() + st.pending_auth_tags.len();
        st.pending_injections
            .retain(|_, created| now.duration_since(*created) < ENTRY_TTL);
        st.pending_auth_tags
            .retain(|_, created| now.duration_since(*created) < ENTRY_TTL);
        let purged = before - st.pending_injections.len() - st.pending_auth_tags.len();
        if purged > 0 {
            debug!(charge_point_id = %self.charge_point_id, purged, "purged expired pending entries");
        }
    }

    fn record(&self, direction: Direction, payload_json: String) {
        self.ctx.spool().append(relay_core::MessageRecord::new(
            &self.charge_point_id,
            direction,
            payload_json,
        ));
    }
}
