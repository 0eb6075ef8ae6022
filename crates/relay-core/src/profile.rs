//! Charging-profile payload builders
//!
//! OCPP 1.6 SetChargingProfile / ClearChargingProfile payloads the mediator
//! injects. The persistent limit uses `ChargePointMaxProfile` on connector 0
//! so it caps the whole charge point; session limits target the running (or
//! next) transaction.

use serde_json::{json, Value};

/// Profile id used for the durable charge-point-wide cap.
pub const PERSISTENT_PROFILE_ID: i64 = 1;
/// Profile id used for one-shot session limits.
pub const SESSION_PROFILE_ID: i64 = 2;

/// SetChargingProfile payload asserting the persistent current limit.
pub fn charge_point_max_profile(limit_amperes: f64) -> Value {
    json!({
        "connectorId": 0,
        "csChargingProfiles": {
            "chargingProfileId": PERSISTENT_PROFILE_ID,
            "stackLevel": 1,
            "chargingProfilePurpose": "ChargePointMaxProfile",
            "chargingProfileKind": "Absolute",
            "chargingSchedule": schedule(limit_amperes),
        }
    })
}

/// SetChargingProfile payload for a one-shot session limit. With a
/// transaction id the profile is a `TxProfile` bound to that transaction,
/// otherwise a `TxDefaultProfile` that applies to the next one.
pub fn session_limit_profile(limit_amperes: f64, transaction_id: Option<i64>) -> Value {
    let mut profile = json!({
        "chargingProfileId": SESSION_PROFILE_ID,
        "stackLevel": 1,
        "chargingProfilePurpose": if transaction_id.is_some() {
            "TxProfile"
        } else {
            "TxDefaultProfile"
        },
        "chargingProfileKind": "Absolute",
        "chargingSchedule": schedule(limit_amperes),
    });
    if let Some(tx) = transaction_id {
        profile["transactionId"] = json!(tx);
    }
    json!({
        "connectorId": if transaction_id.is_some() { 1 } else { 0 },
        "csChargingProfiles": profile,
    })
}

/// ClearChargingProfile payload undoing the persistent cap.
pub fn clear_persistent_profile() -> Value {
    json!({ "id": PERSISTENT_PROFILE_ID })
}

fn schedule(limit_amperes: f64) -> Value {
    json!({
        "chargingRateUnit": "A",
        "chargingSchedulePeriod": [
            { "startPeriod": 0, "limit": limit_amperes }
        ]
    })
}
