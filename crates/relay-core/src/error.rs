//! Common error taxonomy for the relay
//!
//! Inside the forwarding path errors never propagate — they degrade behavior
//! (drop a frame, synthesize a response, reconnect). These types exist for
//! the seams where a caller does need an explicit failure: the control
//! surface, the registry, and the persistence interface.

use thiserror::Error;

/// Result type for relay operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// No live session exists for the target charge point.
    #[error("charger not connected: {0}")]
    ChargerNotConnected(String),

    /// A live session already exists for this charge point.
    #[error("duplicate session: {0}")]
    DuplicateSession(String),

    /// Failure from the persistence interface.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Malformed operator request (missing fields, non-ws URL, unknown key).
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status code the control surface reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::ChargerNotConnected(_) => 503,
            ProxyError::DuplicateSession(_) => 409,
            ProxyError::Persistence(_) => 500,
            ProxyError::Validation(_) => 400,
            ProxyError::Internal(_) => 500,
        }
    }
}
