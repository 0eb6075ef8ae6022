//! Message-log records

use serde::{Deserialize, Serialize};

/// Where a logged frame sat in the splice.
///
/// `Upstream` and `Downstream` are ordinary relayed traffic; the remaining
/// directions mark frames the relay originated or intercepted, which is what
/// makes injections auditable without ever being visible to the CSMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Charger → CSMS traffic (or traffic that would have gone upstream).
    Upstream,
    /// CSMS → charger traffic.
    Downstream,
    /// An operator-initiated Call the relay sent to the charger.
    InjectionRequest,
    /// The charger's response to an injection, intercepted and swallowed.
    InjectionResponse,
    /// A response the relay synthesized while the CSMS was unavailable.
    ProxyResponse,
}

/// One persisted message-log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub charge_point_id: String,
    pub direction: Direction,
    /// The decoded frame re-encoded to JSON; raw text for undecodable frames.
    pub payload_json: String,
    pub unix_seconds: i64,
}

impl MessageRecord {
    pub fn new(
        charge_point_id: impl Into<String>,
        direction: Direction,
        payload_json: impl Into<String>,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            direction,
            payload_json: payload_json.into(),
            unix_seconds: chrono::Utc::now().timestamp(),
        }
    }
}
