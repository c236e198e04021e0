//! Debounced persistence, reminders and two-phase publish
//!
//! The `SyncCoordinator` turns a burst of local edits into durable, retried
//! remote writes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncCoordinator                                                │
//! │  ├── queue: Arc<Mutex<ChangeQueue>>                             │
//! │  │   └── one lock scope per transition, never held over .await  │
//! │  ├── timers: local-save debounce, publish reminder, purge       │
//! │  │   └── cancel-and-reschedule, weak handle to shared state     │
//! │  ├── publishing: AtomicBool re-entrancy guard                   │
//! │  └── event_tx: broadcast::Sender<SyncEvent>                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Publish
//!
//! 1. Content: every pending record goes to the [`RemoteStore`] as one
//!    batch. On failure the batch is marked failed and the cycle stops.
//! 2. Reprocessing: on content success the records are synced, then the
//!    [`ReprocessingService`] is asked to refresh derived views. Its failure
//!    only produces a warning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::events::{ReindexStatus, SyncEvent, SyncStatus};
use super::notify::{NotificationAction, NotificationId, NotificationKind, Notifier};
use super::remote::{RemoteStore, ReprocessingService};
use super::timer::TimerSlot;
use crate::config::SyncConfig;
use crate::queue::ChangeQueue;
use crate::types::{MutationRecord, RecordCounts, RecordId};

/// Default capacity for the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Result of a [`SyncCoordinator::publish`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The queue held no pending records
    NothingToPublish,
    /// Another publish cycle was already running; this call did nothing
    AlreadyInFlight,
    /// Content is durable remotely; `reindex` reports the secondary step
    Published { count: usize, reindex: ReindexStatus },
    /// Content write failed; records are marked failed and kept
    Failed { count: usize, error: String },
}

struct Inner {
    queue: Arc<Mutex<ChangeQueue>>,
    remote: Arc<dyn RemoteStore>,
    reprocessor: Arc<dyn ReprocessingService>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    publishing: AtomicBool,
    disposed: AtomicBool,
    local_save: TimerSlot,
    reminder: TimerSlot,
    purge: TimerSlot,
    reminder_note: Mutex<Option<NotificationId>>,
    event_tx: broadcast::Sender<SyncEvent>,
}

/// Resets the re-entrancy flag when a publish cycle ends, however it ends
struct PublishGuard<'a>(&'a AtomicBool);

impl Drop for PublishGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Coordinator for the offline-first publish pipeline
///
/// # Example
///
/// ```ignore
/// let queue = ChangeQueue::restore(store.clone(), "change_queue", 3)?;
/// let coordinator = SyncCoordinator::new(queue, remote, reindexer, notifier, SyncConfig::default());
///
/// let mut events = coordinator.subscribe();
/// coordinator.submit(mutation.records);
///
/// match coordinator.publish().await {
///     PublishOutcome::Published { reindex, .. } if reindex.is_delayed() => { /* stale index */ }
///     PublishOutcome::Failed { .. } => { coordinator.retry_failed().await; }
///     _ => {}
/// }
/// ```
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    pub fn new(
        queue: ChangeQueue,
        remote: Arc<dyn RemoteStore>,
        reprocessor: Arc<dyn ReprocessingService>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                queue: Arc::new(Mutex::new(queue)),
                remote,
                reprocessor,
                notifier,
                config,
                publishing: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                local_save: TimerSlot::new("local_save"),
                reminder: TimerSlot::new("publish_reminder"),
                purge: TimerSlot::new("synced_purge"),
                reminder_note: Mutex::new(None),
                event_tx,
            }),
        }
    }

    /// Subscribe to sync events
    ///
    /// Multiple subscribers can exist; events are broadcast to all. Dropping
    /// the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Run `f` with exclusive access to the queue
    ///
    /// Use this for listener registration and inspection; `f` must not await.
    pub fn with_queue<R>(&self, f: impl FnOnce(&mut ChangeQueue) -> R) -> R {
        f(&mut self.inner.queue.lock())
    }

    /// Snapshot of every record currently tracked
    pub fn records(&self) -> Vec<MutationRecord> {
        self.inner.queue.lock().records().to_vec()
    }

    pub fn counts(&self) -> RecordCounts {
        self.inner.queue.lock().counts()
    }

    pub fn is_publishing(&self) -> bool {
        self.inner.publishing.load(Ordering::Acquire)
    }

    pub fn status(&self) -> SyncStatus {
        let counts = self.counts();
        if self.is_publishing() {
            SyncStatus::Publishing {
                count: counts.processing,
            }
        } else if counts.failed > 0 {
            SyncStatus::Failed {
                count: counts.failed,
            }
        } else if counts.pending > 0 {
            SyncStatus::Pending {
                count: counts.pending,
            }
        } else {
            SyncStatus::Idle
        }
    }

    /// Queue the records produced by one edit and restart the edit timers
    ///
    /// Call this for every accepted edit, even one that produced no records,
    /// so the local-save signal tracks the latest change.
    pub fn submit(&self, records: Vec<MutationRecord>) -> usize {
        let (count, pending) = {
            let mut queue = self.inner.queue.lock();
            let count = queue.enqueue(records);
            (count, queue.counts().pending)
        };
        if count > 0 {
            self.inner.emit(SyncEvent::Enqueued { count, pending });
        }
        self.inner.schedule_edit_timers();
        count
    }

    /// Two-phase publish of every pending record
    ///
    /// A call made while another cycle is in flight returns
    /// [`PublishOutcome::AlreadyInFlight`] without touching the queue.
    pub async fn publish(&self) -> PublishOutcome {
        let inner = &self.inner;
        if inner
            .publishing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Publish already in flight");
            return PublishOutcome::AlreadyInFlight;
        }
        let _guard = PublishGuard(&inner.publishing);
        inner.clear_reminder();

        let batch = inner.queue.lock().begin_publish();
        if batch.is_empty() {
            debug!("Nothing to publish");
            return PublishOutcome::NothingToPublish;
        }
        let ids: Vec<RecordId> = batch.iter().map(|r| r.id).collect();
        let count = batch.len();
        info!(count, "Publishing changes");
        inner.emit(SyncEvent::PublishStarted { count });

        // Phase 1: content
        match inner.remote.publish(&batch).await {
            Ok(ack) => {
                debug!(accepted = ack.accepted, "Content write acknowledged");
                inner.queue.lock().mark_synced(&ids);
            }
            Err(e) => {
                let error = e.to_string();
                inner.queue.lock().mark_failed(&ids, &error);
                inner.notifier.notify(
                    &format!("Publish failed: {}. {} changes kept for retry", error, count),
                    NotificationKind::Error,
                );
                inner.emit(SyncEvent::PublishFailed {
                    count,
                    error: error.clone(),
                });
                return PublishOutcome::Failed { count, error };
            }
        }

        // Phase 2: reprocessing, best effort
        let reindex = match inner.reprocessor.process(&batch).await {
            Ok(ticket) => {
                inner.notifier.notify(
                    &format!("{} changes published", count),
                    NotificationKind::Success,
                );
                ReindexStatus::Completed {
                    processing_id: ticket.processing_id,
                }
            }
            Err(e) => {
                warn!(error = %e, "Reindex failed after successful publish");
                inner.notifier.notify(
                    &format!(
                        "{} changes saved, but search indexing delayed",
                        count
                    ),
                    NotificationKind::Warning,
                );
                ReindexStatus::Delayed {
                    error: e.to_string(),
                }
            }
        };

        info!(count, reindex_delayed = reindex.is_delayed(), "Publish complete");
        inner.emit(SyncEvent::PublishSucceeded {
            count,
            reindex: reindex.clone(),
        });
        inner.schedule_purge();
        PublishOutcome::Published { count, reindex }
    }

    /// Return failed records under the retry cap to pending, then publish
    pub async fn retry_failed(&self) -> PublishOutcome {
        let count = self.inner.queue.lock().requeue_failed();
        if count > 0 {
            self.inner.emit(SyncEvent::Retrying { count });
        }
        self.publish().await
    }

    /// Drop every unpublished record without publishing
    pub fn discard(&self) -> usize {
        self.inner.local_save.cancel();
        self.inner.clear_reminder();
        let count = self.inner.queue.lock().discard();
        if count > 0 {
            self.inner.notifier.notify(
                &format!("Discarded {} unpublished changes", count),
                NotificationKind::Info,
            );
        }
        self.inner.emit(SyncEvent::Discarded { count });
        count
    }

    /// Cancel every outstanding timer
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.local_save.cancel();
        self.inner.purge.cancel();
        self.inner.clear_reminder();
        debug!("Sync coordinator disposed");
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Inner {
    fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn schedule_edit_timers(self: &Arc<Self>) {
        if self.is_disposed() {
            return;
        }
        let weak = Arc::downgrade(self);
        self.local_save
            .schedule(self.config.local_save_debounce(), move || {
                with_live(&weak, Inner::on_local_save)
            });

        let weak = Arc::downgrade(self);
        self.reminder
            .schedule(self.config.publish_reminder(), move || {
                with_live(&weak, Inner::on_reminder)
            });
    }

    fn schedule_purge(self: &Arc<Self>) {
        if self.is_disposed() {
            return;
        }
        let weak = Arc::downgrade(self);
        self.purge.schedule(self.config.synced_grace(), move || {
            with_live(&weak, Inner::on_purge)
        });
    }

    fn on_local_save(&self) {
        let pending = self.queue.lock().counts().pending;
        debug!(pending, "Local save settled");
        self.notifier
            .notify("Changes saved locally", NotificationKind::Info);
        self.emit(SyncEvent::LocalSaved { pending });
    }

    fn on_reminder(&self) {
        if self.publishing.load(Ordering::Acquire) {
            return;
        }
        let pending = self.queue.lock().counts().pending;
        if pending == 0 {
            return;
        }
        let id = self.notifier.notify_with_actions(
            &format!("You have {} unpublished changes", pending),
            &[NotificationAction::Publish, NotificationAction::Dismiss],
        );
        if let Some(previous) = self.reminder_note.lock().replace(id) {
            self.notifier.dismiss(previous);
        }
        info!(pending, "Publish reminder shown");
        self.emit(SyncEvent::ReminderShown { pending });
    }

    fn on_purge(&self) {
        let count = self.queue.lock().purge_synced();
        if count > 0 {
            self.emit(SyncEvent::Purged { count });
        }
    }

    fn clear_reminder(&self) {
        self.reminder.cancel();
        let shown = self.reminder_note.lock().take();
        if let Some(id) = shown {
            self.notifier.dismiss(id);
            self.emit(SyncEvent::ReminderCleared);
        }
    }
}

/// Run a timer callback only while the coordinator is alive and not disposed
fn with_live(weak: &Weak<Inner>, fire: fn(&Inner)) {
    if let Some(inner) = weak.upgrade() {
        if !inner.is_disposed() {
            fire(&inner);
        }
    }
}
