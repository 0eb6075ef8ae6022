//! Process-wide session registry
//!
//! At most one live [`Session`] per charge point id at any instant. The
//! registry is the only multi-writer shared structure in the relay; every
//! operation holds the single mutex briefly and performs no I/O under it.
//!
//! A second upgrade for an id that already has a live session is rejected
//! (`DuplicateSession`) rather than displacing the existing one. The
//! acceptor removes the entry when the charger socket closes; `remove` is
//! idempotent and the acceptor is its only caller.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::{HandshakeMeta, ProxyError, ProxyResult};
use tokio::sync::mpsc;

use crate::context::RelayContext;
use crate::session::Session;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a session for a freshly upgraded charger socket.
    /// Fails with `DuplicateSession` if a live session already exists.
    pub fn create(
        &self,
        charge_point_id: &str,
        charger_tx: mpsc::UnboundedSender<String>,
        handshake: HandshakeMeta,
        ctx: Arc<RelayContext>,
    ) -> ProxyResult<Arc<Session>> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(charge_point_id) {
            return Err(ProxyError::DuplicateSession(charge_point_id.to_string()));
        }
        let session = Arc::new(Session::new(charge_point_id, charger_tx, handshake, ctx));
        sessions.insert(charge_point_id.to_string(), session.clone());
        tracing::info!(charge_point_id, "session registered");
        Ok(session)
    }

    pub fn lookup(&self, charge_point_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(charge_point_id).cloned()
    }

    /// Remove the entry for this id. Idempotent.
    pub fn remove(&self, charge_point_id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.lock().remove(charge_point_id);
        if removed.is_some() {
            tracing::info!(charge_point_id, "session unregistered");
        }
        removed
    }

    /// Ids of all live sessions.
    pub fn live_ids(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::RelayConfig;
    use relay_store::{LogSpool, MemoryStore};

    fn test_ctx() -> Arc<RelayContext> {
        let store = Arc::new(MemoryStore::new());
        let spool = LogSpool::spawn(store.clone());
        Arc::new(RelayContext::new(store, spool, RelayConfig::default()))
    }

    #[tokio::test]
    async fn rejects_duplicate_session() {
        let registry = SessionRegistry::new();
        let ctx = test_ctx();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry
            .create("CP1", tx, HandshakeMeta::default(), ctx.clone())
            .unwrap();

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let err = registry
            .create("CP1", tx2, HandshakeMeta::default(), ctx)
            .unwrap_err();
        assert!(matches!(err, ProxyError::DuplicateSession(_)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let ctx = test_ctx();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry
            .create("CP1", tx, HandshakeMeta::default(), ctx)
            .unwrap();

        assert!(registry.remove("CP1").is_some());
        assert!(registry.remove("CP1").is_none());
        assert!(registry.lookup("CP1").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn same_id_can_reconnect_after_removal() {
        let registry = SessionRegistry::new();
        let ctx = test_ctx();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry
            .create("CP1", tx, HandshakeMeta::default(), ctx.clone())
            .unwrap();
        registry.remove("CP1");

        let (tx2, _rx2) = mpsc::unbounded_channel();
        assert!(registry
            .create("CP1", tx2, HandshakeMeta::default(), ctx)
            .is_ok());
    }
}
