//! Application state shared across all handlers

use std::sync::Arc;

use relay_session::{RelayContext, Session, SessionRegistry};

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    registry: Arc<SessionRegistry>,
    ctx: Arc<RelayContext>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, ctx: Arc<RelayContext>) -> Self {
        Self { registry, ctx }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn ctx(&self) -> &Arc<RelayContext> {
        &self.ctx
    }

    /// The live session for a charge point, or 503 for operator calls
    /// against a charger that is not connected.
    pub fn session(&self, charge_point_id: &str) -> Result<Arc<Session>, ApiError> {
        self.registry
            .lookup(charge_point_id)
            .filter(|session| !session.is_closed())
            .ok_or_else(|| {
                ApiError::ServiceUnavailable(format!("charger not connected: {charge_point_id}"))
            })
    }
}
