//! In-memory reference backend
//!
//! Honors the [`RelayStore`] contract with process-local state. Used by the
//! daemon's default mode and by every test suite; a relational backend slots
//! in behind the same trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use relay_core::{ChargerRow, ChargerStatus, MessageRecord, UserRecord};

use crate::store::{RelayStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    config: HashMap<String, String>,
    chargers: HashMap<String, ChargerRow>,
    logs: Vec<MessageRecord>,
    users: HashMap<String, UserRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// When set, every mutating call fails. Lets tests exercise the
    /// persistence-failure paths without a real backend.
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a configuration row without going through validation.
    pub fn seed_config(&self, key: &str, value: &str) {
        self.inner
            .lock()
            .config
            .insert(key.to_string(), value.to_string());
    }

    pub fn seed_user(&self, user: UserRecord) {
        self.inner.lock().users.insert(user.username.clone(), user);
    }

    /// Snapshot of every appended log record, oldest first.
    pub fn logs(&self) -> Vec<MessageRecord> {
        self.inner.lock().logs.clone()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("writes disabled".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RelayStore for MemoryStore {
    async fn config_all(&self) -> StoreResult<HashMap<String, String>> {
        Ok(self.inner.lock().config.clone())
    }

    async fn config_set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check_writable()?;
        self.inner
            .lock()
            .config
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn charger(&self, charge_point_id: &str) -> StoreResult<Option<ChargerRow>> {
        Ok(self.inner.lock().chargers.get(charge_point_id).cloned())
    }

    async fn all_chargers(&self) -> StoreResult<Vec<ChargerRow>> {
        let mut rows: Vec<ChargerRow> = self.inner.lock().chargers.values().cloned().collect();
        rows.sort_by(|a, b| a.charge_point_id.cmp(&b.charge_point_id));
        Ok(rows)
    }

    async fn upsert_charger(&self, row: &ChargerRow) -> StoreResult<()> {
        self.check_writable()?;
        let mut inner = self.inner.lock();
        let entry = inner
            .chargers
            .entry(row.charge_point_id.clone())
            .or_insert_with(|| row.clone());
        entry.status = row.status;
        entry.last_seen = Utc::now();
        // max_power is durable policy; upserting a connection row must not
        // clobber it unless the caller set one.
        if row.max_power.is_some() {
            entry.max_power = row.max_power;
        }
        Ok(())
    }

    async fn set_charger_status(
        &self,
        charge_point_id: &str,
        status: ChargerStatus,
    ) -> StoreResult<()> {
        self.check_writable()?;
        if let Some(row) = self.inner.lock().chargers.get_mut(charge_point_id) {
            row.status = status;
            row.last_seen = Utc::now();
        }
        Ok(())
    }

    async fn set_max_power(
        &self,
        charge_point_id: &str,
        amperes: Option<f64>,
    ) -> StoreResult<()> {
        self.check_writable()?;
        let mut inner = self.inner.lock();
        let row = inner
            .chargers
            .entry(charge_point_id.to_string())
            .or_insert_with(|| ChargerRow {
                charge_point_id: charge_point_id.to_string(),
                status: ChargerStatus::Offline,
                last_seen: Utc::now(),
                max_power: None,
            });
        row.max_power = amperes;
        Ok(())
    }

    async fn append_log(&self, record: &MessageRecord) -> StoreResult<()> {
        self.check_writable()?;
        self.inner.lock().logs.push(record.clone());
        Ok(())
    }

    async fn find_user(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.inner.lock().users.get(username).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::Direction;

    #[tokio::test]
    async fn max_power_survives_connection_upsert() {
        let store = MemoryStore::new();
        store.set_max_power("CP1", Some(16.0)).await.unwrap();

        // A fresh session upserts an ONLINE row with no limit attached.
        store
            .upsert_charger(&ChargerRow::online("CP1"))
            .await
            .unwrap();

        let row = store.charger("CP1").await.unwrap().unwrap();
        assert_eq!(row.status, ChargerStatus::Online);
        assert_eq!(row.max_power, Some(16.0));
    }

    #[tokio::test]
    async fn set_max_power_is_idempotent() {
        let store = MemoryStore::new();
        store.set_max_power("CP1", Some(10.0)).await.unwrap();
        store.set_max_power("CP1", Some(10.0)).await.unwrap();
        let row = store.charger("CP1").await.unwrap().unwrap();
        assert_eq!(row.max_power, Some(10.0));

        store.set_max_power("CP1", None).await.unwrap();
        let row = store.charger("CP1").await.unwrap().unwrap();
        assert_eq!(row.max_power, None);
    }

    #[tokio::test]
    async fn failed_writes_reject() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.set_max_power("CP1", Some(6.0)).await.is_err());
        assert!(store
            .append_log(&MessageRecord::new("CP1", Direction::Upstream, "[]"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn user_lookup() {
        let store = MemoryStore::new();
        store.seed_user(UserRecord {
            username: "admin".into(),
            password_hash: "$2b$12$abcdefghijklmnopqrstuv".into(),
            role: Some("owner".into()),
        });

        let user = store.find_user("admin").await.unwrap().unwrap();
        assert_eq!(user.role.as_deref(), Some("owner"));
        assert!(store.find_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_update_on_missing_row_is_a_noop() {
        let store = MemoryStore::new();
        store
            .set_charger_status("ghost", ChargerStatus::Offline)
            .await
            .unwrap();
        assert!(store.charger("ghost").await.unwrap().is_none());
    }
}
