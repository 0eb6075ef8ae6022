//! Out-of-hot-path log writer
//!
//! The mediator must never stall on a log append, so records go through a
//! bounded in-memory queue drained by a background worker. When the queue is
//! full the oldest record is dropped and counted; logs are observational and
//! dropping beats stalling forwarding.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use relay_core::MessageRecord;
use tokio::sync::Notify;

use crate::store::RelayStore;

const DEFAULT_CAPACITY: usize = 4096;

struct SpoolInner {
    queue: Mutex<VecDeque<MessageRecord>>,
    notify: Notify,
    dropped: AtomicU64,
    capacity: usize,
}

/// Handle for enqueuing message-log records. Cheap to clone; the worker task
/// exits once every handle is gone and the queue has drained.
#[derive(Clone)]
pub struct LogSpool {
    inner: Arc<SpoolInner>,
}

impl LogSpool {
    /// Spawn the drain worker and return the enqueue handle.
    pub fn spawn(store: Arc<dyn RelayStore>) -> Self {
        Self::spawn_with_capacity(store, DEFAULT_CAPACITY)
    }

    pub fn spawn_with_capacity(store: Arc<dyn RelayStore>, capacity: usize) -> Self {
        let inner = Arc::new(SpoolInner {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            capacity,
        });
        tokio::spawn(drain_worker(Arc::downgrade(&inner), store));
        Self { inner }
    }

    /// Enqueue a record without blocking. On overflow the oldest queued
    /// record is discarded and the drop counter bumped.
    pub fn append(&self, record: MessageRecord) {
        {
            let mut queue = self.inner.queue.lock();
            if queue.len() >= self.inner.capacity {
                queue.pop_front();
                let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped, "log spool full, dropping oldest record");
            }
            queue.push_back(record);
        }
        self.inner.notify.notify_one();
    }

    /// Total records discarded due to overflow.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Number of records currently queued. Test hook.
    pub fn queued(&self) -> usize {
        self.inner.queue.lock().len()
    }
}

async fn drain_worker(weak: Weak<SpoolInner>, store: Arc<dyn RelayStore>) {
    loop {
        let record = {
            let Some(inner) = weak.upgrade() else { return };
            let record = inner.queue.lock().pop_front();
            if record.is_none() {
                // Park until a producer notifies; wake periodically so the
                // worker notices when the last handle is dropped.
                let notified = inner.notify.notified();
                tokio::select! {
                    _ = notified => {}
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                }
            }
            record
        };

        if let Some(record) = record {
            if let Err(e) = store.append_log(&record).await {
                tracing::warn!(
                    charge_point_id = %record.charge_point_id,
                    error = %e,
                    "failed to persist message-log record"
                );
            }
        }
    }
}
