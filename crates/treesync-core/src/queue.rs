//! Durable, status-tracked list of mutation records
//!
//! ## Lifecycle
//!
//! ```text
//! ┌─────────┐ begin_publish ┌────────────┐ mark_synced ┌────────┐ purge_synced
//! │ Pending │──────────────▶│ Processing │────────────▶│ Synced │────────────▶ (gone)
//! └─────────┘               └────────────┘             └────────┘
//!      ▲                          │ mark_failed
//!      │ requeue_failed           ▼
//!      │ (retry_count < max) ┌────────┐
//!      └─────────────────────│ Failed │
//!                            └────────┘
//! ```
//!
//! Only `Pending` records are written to the durable store, after every
//! transition. `discard` is the only way edits are dropped without publishing.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{TreeSyncError, TreeSyncResult};
use crate::storage::KeyValueStore;
use crate::types::{MutationRecord, RecordCounts, RecordId, RecordStatus};

/// Handle returned by [`ChangeQueue::subscribe`]
pub type ListenerId = u64;

type Listener = Box<dyn Fn(&QueueEvent) + Send + Sync>;

/// Notifications about queue transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Enqueued { count: usize },
    StatusChanged { ids: Vec<RecordId>, status: RecordStatus },
    Requeued { count: usize },
    Purged { count: usize },
    Discarded { count: usize },
    /// The durable copy could not be written; in-memory state is intact
    PersistenceFailed { error: String },
}

/// Owned queue of mutation records backed by a [`KeyValueStore`]
pub struct ChangeQueue {
    records: Vec<MutationRecord>,
    store: Arc<dyn KeyValueStore>,
    key: String,
    max_retry: u32,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: ListenerId,
}

impl ChangeQueue {
    /// Create an empty queue without reading the store
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, max_retry: u32) -> Self {
        Self {
            records: Vec::new(),
            store,
            key: key.into(),
            max_retry,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Load the pending set saved by a previous session
    ///
    /// Nothing restored is treated as in flight: a stray `Processing` record
    /// comes back as `Pending`, and any other status is dropped.
    pub fn restore(
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        max_retry: u32,
    ) -> TreeSyncResult<Self> {
        let mut queue = Self::new(store, key, max_retry);
        let Some(raw) = queue.store.get(&queue.key)? else {
            return Ok(queue);
        };

        let saved: Vec<MutationRecord> = serde_json::from_str(&raw)?;
        let total = saved.len();
        for mut record in saved {
            match record.status {
                RecordStatus::Pending => queue.records.push(record),
                RecordStatus::Processing => {
                    record.set_status(RecordStatus::Pending);
                    queue.records.push(record);
                }
                RecordStatus::Synced | RecordStatus::Failed => {
                    debug!(id = %record.id, status = %record.status, "Dropping non-pending record on restore");
                }
            }
        }
        info!(restored = queue.records.len(), saved = total, "Restored change queue");
        Ok(queue)
    }

    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    pub fn records(&self) -> &[MutationRecord] {
        &self.records
    }

    pub fn get(&self, id: &RecordId) -> Option<&MutationRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn with_status(&self, status: RecordStatus) -> impl Iterator<Item = &MutationRecord> {
        self.records.iter().filter(move |r| r.status == status)
    }

    pub fn counts(&self) -> RecordCounts {
        self.records.iter().collect()
    }

    pub fn has_pending(&self) -> bool {
        self.records.iter().any(|r| r.status == RecordStatus::Pending)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Register a callback invoked after every transition
    ///
    /// Callbacks run while the queue is borrowed and must not call back into it.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&QueueEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Append freshly produced records
    pub fn enqueue(&mut self, records: Vec<MutationRecord>) -> usize {
        let count = records.len();
        if count == 0 {
            return 0;
        }
        self.records.extend(records);
        debug!(count, total = self.records.len(), "Enqueued records");
        self.persist();
        self.emit(QueueEvent::Enqueued { count });
        count
    }

    /// Move every pending record to processing and hand back the batch
    pub fn begin_publish(&mut self) -> Vec<MutationRecord> {
        let mut batch = Vec::new();
        for record in self.records.iter_mut() {
            if record.status == RecordStatus::Pending {
                record.set_status(RecordStatus::Processing);
                batch.push(record.clone());
            }
        }
        if !batch.is_empty() {
            self.persist();
            let ids = batch.iter().map(|r| r.id).collect();
            self.emit(QueueEvent::StatusChanged {
                ids,
                status: RecordStatus::Processing,
            });
        }
        batch
    }

    /// Processing records that reached the remote store
    pub fn mark_synced(&mut self, ids: &[RecordId]) -> usize {
        let changed = self.transition(ids, |record| {
            record.last_error = None;
            record.set_status(RecordStatus::Synced);
        });
        if !changed.is_empty() {
            self.persist();
            self.emit(QueueEvent::StatusChanged {
                ids: changed.clone(),
                status: RecordStatus::Synced,
            });
        }
        changed.len()
    }

    /// Processing records the remote store did not accept
    pub fn mark_failed(&mut self, ids: &[RecordId], error: &str) -> usize {
        let changed = self.transition(ids, |record| {
            record.retry_count += 1;
            record.last_error = Some(error.to_string());
            record.set_status(RecordStatus::Failed);
        });
        if !changed.is_empty() {
            warn!(count = changed.len(), %error, "Records failed to publish");
            self.persist();
            self.emit(QueueEvent::StatusChanged {
                ids: changed.clone(),
                status: RecordStatus::Failed,
            });
        }
        changed.len()
    }

    /// Return failed records under the retry cap to pending
    ///
    /// Records at the cap keep their `Failed` status.
    pub fn requeue_failed(&mut self) -> usize {
        let max_retry = self.max_retry;
        let mut count = 0;
        for record in self.records.iter_mut() {
            if record.can_retry(max_retry) {
                record.set_status(RecordStatus::Pending);
                count += 1;
            }
        }
        if count > 0 {
            info!(count, "Requeued failed records");
            self.persist();
            self.emit(QueueEvent::Requeued { count });
        }
        count
    }

    /// Drop every synced record
    pub fn purge_synced(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.status != RecordStatus::Synced);
        let count = before - self.records.len();
        if count > 0 {
            debug!(count, "Purged synced records");
            self.emit(QueueEvent::Purged { count });
        }
        count
    }

    /// Drop all pending and failed records, in memory and on disk
    ///
    /// Records already in flight finish their publish cycle.
    pub fn discard(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|r| {
            !matches!(r.status, RecordStatus::Pending | RecordStatus::Failed)
        });
        let count = before - self.records.len();
        if let Err(e) = self.store.remove(&self.key) {
            self.report_persistence_failure(e);
        }
        info!(count, "Discarded unpublished records");
        self.emit(QueueEvent::Discarded { count });
        count
    }

    fn transition<F>(&mut self, ids: &[RecordId], mut apply: F) -> Vec<RecordId>
    where
        F: FnMut(&mut MutationRecord),
    {
        let mut changed = Vec::new();
        for record in self.records.iter_mut() {
            if record.status == RecordStatus::Processing && ids.contains(&record.id) {
                apply(record);
                changed.push(record.id);
            }
        }
        changed
    }

    /// Write the pending set to the durable store
    fn persist(&self) {
        let pending: Vec<&MutationRecord> = self.with_status(RecordStatus::Pending).collect();
        let result = serde_json::to_string(&pending)
            .map_err(TreeSyncError::from)
            .and_then(|json| self.store.set(&self.key, &json));
        if let Err(e) = result {
            self.report_persistence_failure(e);
        }
    }

    fn report_persistence_failure(&self, err: TreeSyncError) {
        warn!(key = %self.key, error = %err, "Failed to persist change queue");
        self.emit(QueueEvent::PersistenceFailed {
            error: err.to_string(),
        });
    }

    fn emit(&self, event: QueueEvent) {
        for (_, listener) in &self.listeners {
            listener(&event);
        }
    }
}

impl std::fmt::Debug for ChangeQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeQueue")
            .field("key", &self.key)
            .field("counts", &self.counts())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::{NodeKind, RecordPayload};
    use parking_lot::Mutex;

    fn record(path: &str) -> MutationRecord {
        MutationRecord::new(RecordPayload::Delete {
            path: path.into(),
            name: path.rsplit('/').next().unwrap_or(path).into(),
            node_kind: NodeKind::File,
        })
    }

    fn queue() -> (ChangeQueue, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ChangeQueue::new(store.clone(), "q", 3), store)
    }

    fn persisted(store: &MemoryStore) -> Vec<MutationRecord> {
        serde_json::from_str(&store.get("q").unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_enqueue_persists_pending() {
        let (mut q, store) = queue();
        q.enqueue(vec![record("a"), record("b")]);
        assert_eq!(q.counts().pending, 2);
        assert_eq!(persisted(&store).len(), 2);
    }

    #[test]
    fn test_processing_is_not_persisted() {
        let (mut q, store) = queue();
        q.enqueue(vec![record("a")]);
        let batch = q.begin_publish();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].status, RecordStatus::Processing);
        assert!(persisted(&store).is_empty());

        q.enqueue(vec![record("b")]);
        let saved = persisted(&store);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].payload.subject_path(), "b");
    }

    #[test]
    fn test_failed_then_requeue_until_cap() {
        let (mut q, _store) = queue();
        q.enqueue(vec![record("a")]);

        for attempt in 1..=3 {
            let ids: Vec<_> = q.begin_publish().iter().map(|r| r.id).collect();
            assert_eq!(ids.len(), 1, "attempt {}", attempt);
            q.mark_failed(&ids, "offline");
            assert_eq!(q.records()[0].retry_count, attempt);
            let requeued = q.requeue_failed();
            if attempt < 3 {
                assert_eq!(requeued, 1);
            } else {
                assert_eq!(requeued, 0);
            }
        }
        assert_eq!(q.records()[0].status, RecordStatus::Failed);
        assert_eq!(q.records()[0].last_error.as_deref(), Some("offline"));
    }

    #[test]
    fn test_mark_synced_only_touches_processing() {
        let (mut q, _store) = queue();
        let a = record("a");
        let id = a.id;
        q.enqueue(vec![a]);
        assert_eq!(q.mark_synced(&[id]), 0, "pending records cannot jump to synced");
        q.begin_publish();
        assert_eq!(q.mark_synced(&[id]), 1);
        assert_eq!(q.get(&id).unwrap().status, RecordStatus::Synced);
        assert_eq!(q.purge_synced(), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_restore_roundtrip() {
        let (mut q, store) = queue();
        q.enqueue(vec![record("a"), record("b")]);
        let expected: Vec<_> = q.records().to_vec();

        let restored = ChangeQueue::restore(store, "q", 3).unwrap();
        assert_eq!(restored.records(), expected.as_slice());
    }

    #[test]
    fn test_restore_normalises_processing() {
        let store = Arc::new(MemoryStore::new());
        let mut in_flight = record("a");
        in_flight.status = RecordStatus::Processing;
        let mut failed = record("b");
        failed.status = RecordStatus::Failed;
        store
            .set("q", &serde_json::to_string(&vec![in_flight, failed]).unwrap())
            .unwrap();

        let restored = ChangeQueue::restore(store, "q", 3).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.records()[0].status, RecordStatus::Pending);
    }

    #[test]
    fn test_restore_rejects_corrupt_state() {
        let store = Arc::new(MemoryStore::new());
        store.set("q", "{{{").unwrap();
        assert!(matches!(
            ChangeQueue::restore(store, "q", 3),
            Err(TreeSyncError::Serialization(_))
        ));
    }

    #[test]
    fn test_discard_clears_memory_and_store() {
        let (mut q, store) = queue();
        q.enqueue(vec![record("a"), record("b")]);
        assert_eq!(q.discard(), 2);
        assert!(q.is_empty());
        assert!(store.get("q").unwrap().is_none());
    }

    #[test]
    fn test_persistence_failure_is_not_fatal() {
        let (mut q, store) = queue();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        q.subscribe(move |e| sink.lock().push(e.clone()));

        store.fail_writes(true);
        q.enqueue(vec![record("a")]);

        assert_eq!(q.counts().pending, 1);
        assert!(events
            .lock()
            .iter()
            .any(|e| matches!(e, QueueEvent::PersistenceFailed { .. })));
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let (mut q, _store) = queue();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let id = q.subscribe(move |e| sink.lock().push(e.clone()));

        q.enqueue(vec![record("a")]);
        assert_eq!(events.lock().as_slice(), &[QueueEvent::Enqueued { count: 1 }]);

        assert!(q.unsubscribe(id));
        assert!(!q.unsubscribe(id));
        q.enqueue(vec![record("b")]);
        assert_eq!(events.lock().len(), 1);
    }
}
