//! Shared dependencies handed to every session
//!
//! The composition root builds one [`RelayContext`] and passes it into the
//! session factory; sessions hold no module-level state.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use relay_core::RelayConfig;
use relay_store::{LogSpool, RelayStore};

/// First transaction id handed out by the standalone responder.
const TRANSACTION_ID_BASE: i64 = 100_000;

pub struct RelayContext {
    store: Arc<dyn RelayStore>,
    spool: LogSpool,
    /// Configuration snapshot; rebuilt and swapped whole on update so
    /// readers always see a consistent view.
    config: RwLock<Arc<RelayConfig>>,
    next_transaction_id: AtomicI64,
}

impl RelayContext {
    pub fn new(store: Arc<dyn RelayStore>, spool: LogSpool, config: RelayConfig) -> Self {
        Self {
            store,
            spool,
            config: RwLock::new(Arc::new(config)),
            next_transaction_id: AtomicI64::new(TRANSACTION_ID_BASE),
        }
    }

    pub fn store(&self) -> &Arc<dyn RelayStore> {
        &self.store
    }

    pub fn spool(&self) -> &LogSpool {
        &self.spool
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> Arc<RelayConfig> {
        self.config.read().clone()
    }

    /// Swap in a new snapshot. Existing sessions pick it up on their next
    /// read; an in-flight forwarding decision keeps the snapshot it started
    /// with.
    pub fn swap_config(&self, config: RelayConfig) {
        *self.config.write() = Arc::new(config);
    }

    /// Next standalone transaction id. Process-wide, monotonically
    /// increasing, not persisted across restarts.
    pub fn next_transaction_id(&self) -> i64 {
        self.next_transaction_id.fetch_add(1, Ordering::SeqCst)
    }
}
