//! Persistent charger row

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection status of a charger as recorded in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargerStatus {
    Online,
    Offline,
}

/// Durable per-charger row. `max_power` is the persistent current limit the
/// mediator re-asserts by injecting a SetChargingProfile at each session
/// start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargerRow {
    pub charge_point_id: String,
    pub status: ChargerStatus,
    pub last_seen: DateTime<Utc>,
    /// Persistent current limit in amperes, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_power: Option<f64>,
}

impl ChargerRow {
    pub fn online(charge_point_id: impl Into<String>) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            status: ChargerStatus::Online,
            last_seen: Utc::now(),
            max_power: None,
        }
    }
}
