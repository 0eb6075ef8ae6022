//! Standalone responder policy
//!
//! When an upstream-bound Request cannot be forwarded or buffered, the relay
//! answers it itself with the minimal CSMS vocabulary a charger needs to stay
//! operational. The action set is deliberately small and explicit; anything
//! else is dropped and left to the charger's own retry.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use relay_core::RelayConfig;
use serde_json::{json, Value};

/// BootNotification heartbeat interval handed to standalone chargers.
const BOOT_INTERVAL_SECONDS: u32 = 300;

/// A synthesized response plus any policy side effect it triggers.
pub(crate) struct Synthesis {
    pub payload: Value,
    pub followup: Option<Followup>,
}

pub(crate) enum Followup {
    /// Auto-charge: connector went to Preparing, start a transaction for it.
    AutoStart { connector_id: i64 },
}

impl Synthesis {
    fn reply(payload: Value) -> Option<Self> {
        Some(Self {
            payload,
            followup: None,
        })
    }
}

/// Synthesize the response for one upstream-bound Call, mutating the
/// pending-auth-tag table where the policy says so. Returns `None` for
/// actions outside the explicit set.
pub(crate) fn synthesize(
    action: &str,
    payload: &Value,
    config: &RelayConfig,
    pending_auth_tags: &mut HashMap<String, Instant>,
    next_transaction_id: impl FnOnce() -> i64,
) -> Option<Synthesis> {
    match action {
        "BootNotification" => Synthesis::reply(json!({
            "status": "Accepted",
            "currentTime": now_iso8601(),
            "interval": BOOT_INTERVAL_SECONDS,
        })),

        "Heartbeat" => Synthesis::reply(json!({ "currentTime": now_iso8601() })),

        "Authorize" => {
            let tag = payload.get("idTag").and_then(Value::as_str);
            // A matched tag is consumed even when auto-charge would accept
            // anything; the double bookkeeping keeps injections observable.
            let matched = tag
                .map(|t| pending_auth_tags.remove(t).is_some())
                .unwrap_or(false);
            let accepted = config.auto_charge_enabled || matched;
            Synthesis::reply(json!({
                "idTagInfo": { "status": if accepted { "Accepted" } else { "Invalid" } }
            }))
        }

        "StatusNotification" => {
            let followup = if config.auto_charge_enabled
                && payload.get("status").and_then(Value::as_str) == Some("Preparing")
            {
                Some(Followup::AutoStart {
                    connector_id: payload
                        .get("connectorId")
                        .and_then(Value::as_i64)
                        .unwrap_or(1),
                })
            } else {
                None
            };
            Some(Synthesis {
                payload: json!({}),
                followup,
            })
        }

        "MeterValues" => Synthesis::reply(json!({})),

        "StartTransaction" => Synthesis::reply(json!({
            "transactionId": next_transaction_id(),
            "idTagInfo": { "status": "Accepted" },
        })),

        "StopTransaction" => Synthesis::reply(json!({
            "idTagInfo": { "status": "Accepted" }
        })),

        _ => None,
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
