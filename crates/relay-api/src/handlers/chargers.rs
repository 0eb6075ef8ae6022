//! Charger listing for the dashboard

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use relay_core::{ChargerStatus, ProxyError};
use relay_store::RelayStore;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargerView {
    pub charge_point_id: String,
    pub status: ChargerStatus,
    pub last_seen: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_power: Option<f64>,
    /// Whether a live session currently exists for this charger.
    pub connected: bool,
}

/// GET /api/chargers
pub async fn list_chargers(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChargerView>>, ApiError> {
    let rows = state
        .ctx()
        .store()
        .all_chargers()
        .await
        .map_err(ProxyError::from)?;

    let views = rows
        .into_iter()
        .map(|row| {
            let connected = state
                .registry()
                .lookup(&row.charge_point_id)
                .map(|s| !s.is_closed())
                .unwrap_or(false);
            ChargerView {
                charge_point_id: row.charge_point_id,
                status: row.status,
                last_seen: row.last_seen,
                max_power: row.max_power,
                connected,
            }
        })
        .collect();

    Ok(Json(views))
}
