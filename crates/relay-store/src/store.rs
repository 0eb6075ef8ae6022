//! The persistence contract

use std::collections::HashMap;

use async_trait::async_trait;
use relay_core::{ChargerRow, ChargerStatus, MessageRecord, ProxyError, UserRecord};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure from a persistence backend.
///
/// Inside the forwarding path these are logged and swallowed; mutating
/// control-surface operations propagate them to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected write: {0}")]
    Rejected(String),
}

impl From<StoreError> for ProxyError {
    fn from(err: StoreError) -> Self {
        ProxyError::Persistence(err.to_string())
    }
}

/// Narrow persistence contract the mediator and control surface depend on.
#[async_trait]
pub trait RelayStore: Send + Sync {
    /// All stored configuration rows.
    async fn config_all(&self) -> StoreResult<HashMap<String, String>>;

    /// Upsert one configuration row.
    async fn config_set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// The charger row, if one exists.
    async fn charger(&self, charge_point_id: &str) -> StoreResult<Option<ChargerRow>>;

    /// All charger rows, for the dashboard listing.
    async fn all_chargers(&self) -> StoreResult<Vec<ChargerRow>>;

    /// Insert or update a charger row, bumping `last_seen`.
    async fn upsert_charger(&self, row: &ChargerRow) -> StoreResult<()>;

    /// Update only the status (and `last_seen`) of an existing row.
    /// A missing row is not an error; there is nothing to mark.
    async fn set_charger_status(
        &self,
        charge_point_id: &str,
        status: ChargerStatus,
    ) -> StoreResult<()>;

    /// Write or clear the durable per-charger current limit. Creates the
    /// charger row if none exists yet.
    async fn set_max_power(
        &self,
        charge_point_id: &str,
        amperes: Option<f64>,
    ) -> StoreResult<()>;

    /// Append one message-log record.
    async fn append_log(&self, record: &MessageRecord) -> StoreResult<()>;

    /// Look up a dashboard user.
    async fn find_user(&self, username: &str) -> StoreResult<Option<UserRecord>>;
}
