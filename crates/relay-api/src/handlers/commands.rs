//! Operator command endpoints
//!
//! Each of these resolves the target session and fails fast with 503 when
//! the charger is not connected. Injections return the generated message id
//! so callers can correlate the eventual intercepted response in the log.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InjectRequest {
    pub action: String,
    #[serde(default = "empty_object")]
    pub payload: Value,
}

fn empty_object() -> Value {
    json!({})
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectResponse {
    pub message_id: String,
}

/// POST /api/chargers/:charge_point_id/commands
pub async fn inject(
    State(state): State<AppState>,
    Path(charge_point_id): Path<String>,
    Json(request): Json<InjectRequest>,
) -> Result<Json<InjectResponse>, ApiError> {
    if request.action.trim().is_empty() {
        return Err(ApiError::BadRequest("action must not be empty".into()));
    }
    let session = state.session(&charge_point_id)?;
    let message_id = session.inject(&request.action, request.payload)?;
    Ok(Json(InjectResponse { message_id }))
}

#[derive(Debug, Deserialize)]
pub struct PersistentLimitRequest {
    /// `null` (or absent) clears the stored limit.
    pub amperes: Option<f64>,
}

/// PUT /api/chargers/:charge_point_id/limit
pub async fn set_persistent_limit(
    State(state): State<AppState>,
    Path(charge_point_id): Path<String>,
    Json(request): Json<PersistentLimitRequest>,
) -> Result<StatusCode, ApiError> {
    if let Some(amperes) = request.amperes {
        if !amperes.is_finite() || amperes <= 0.0 {
            return Err(ApiError::BadRequest(format!(
                "amperes must be a positive number, got {amperes}"
            )));
        }
    }
    let session = state.session(&charge_point_id)?;
    session.set_persistent_limit(request.amperes).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLimitRequest {
    pub amperes: f64,
    pub transaction_id: Option<i64>,
}

/// POST /api/chargers/:charge_point_id/session-limit
pub async fn apply_session_limit(
    State(state): State<AppState>,
    Path(charge_point_id): Path<String>,
    Json(request): Json<SessionLimitRequest>,
) -> Result<Json<InjectResponse>, ApiError> {
    if !request.amperes.is_finite() || request.amperes <= 0.0 {
        return Err(ApiError::BadRequest(format!(
            "amperes must be a positive number, got {}",
            request.amperes
        )));
    }
    let session = state.session(&charge_point_id)?;
    let message_id = session.apply_session_limit(request.amperes, request.transaction_id)?;
    Ok(Json(InjectResponse { message_id }))
}
