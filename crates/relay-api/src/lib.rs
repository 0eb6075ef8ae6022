//! relay-api - HTTP layer for the OCPP relay
//!
//! Two surfaces share one router: the charger-facing WebSocket endpoint at
//! `/ocpp/{chargePointId}`, and the REST control surface the dashboard and
//! operators use to inject commands, manage limits, and change
//! configuration. Anything else is a 404.
//!
//! # Usage
//!
//! ```ignore
//! use relay_api::{create_router, AppState};
//!
//! let state = AppState::new(registry, ctx);
//! let router = create_router(state);
//! axum::serve(listener, router).await?;
//! ```

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the relay router with the given application state
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Charger-facing WebSocket endpoint
        .route("/ocpp/:charge_point_id", get(handlers::ocpp::accept))
        // Control surface
        .route("/api/chargers", get(handlers::chargers::list_chargers))
        .route(
            "/api/chargers/:charge_point_id/commands",
            post(handlers::commands::inject),
        )
        .route(
            "/api/chargers/:charge_point_id/limit",
            put(handlers::commands::set_persistent_limit),
        )
        .route(
            "/api/chargers/:charge_point_id/session-limit",
            post(handlers::commands::apply_session_limit),
        )
        .route(
            "/api/config",
            get(handlers::config::get_config)
                .put(handlers::config::set_config)
                .post(handlers::config::set_config),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
