//! Runtime configuration endpoints
//!
//! Updates validate against a copy of the current snapshot first, then
//! persist, then swap the snapshot — so a rejected key leaves both the store
//! and the running configuration untouched.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use relay_core::{ProxyError, RelayConfig};
use relay_store::RelayStore;
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/config
pub async fn get_config(State(state): State<AppState>) -> Json<HashMap<String, String>> {
    Json(state.ctx().config().entries().into_iter().collect())
}

/// PUT /api/config
///
/// Body is a flat object of recognized keys. Values may be JSON strings,
/// booleans, or numbers; everything is stored in string form.
pub async fn set_config(
    State(state): State<AppState>,
    Json(updates): Json<HashMap<String, Value>>,
) -> Result<Json<HashMap<String, String>>, ApiError> {
    if updates.is_empty() {
        return Err(ApiError::BadRequest("no configuration keys given".into()));
    }

    let updates: Vec<(String, String)> = updates
        .into_iter()
        .map(|(key, value)| (key, value_to_string(value)))
        .collect();

    // Validate the whole batch before touching anything.
    let mut next: RelayConfig = (*state.ctx().config()).clone();
    for (key, value) in &updates {
        next.apply(key, value)?;
    }

    for (key, value) in &updates {
        state
            .ctx()
            .store()
            .config_set(key, value)
            .await
            .map_err(ProxyError::from)?;
    }

    state.ctx().swap_config(next.clone());
    tracing::info!(keys = ?updates.iter().map(|(k, _)| k).collect::<Vec<_>>(), "configuration updated");

    Ok(Json(next.entries().into_iter().collect()))
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
