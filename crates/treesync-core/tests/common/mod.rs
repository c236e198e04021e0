//! Shared fakes for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use treesync_core::{
    ChangeQueue, MemoryStore, MutationRecord, NodeLevel, NotificationAction, NotificationId,
    NotificationKind, Notifier, ProcessingTicket, PublishAck, RemoteStore, ReprocessingService,
    SyncConfig, SyncCoordinator, Tree, TreeNode, TreeSyncError,
};

/// Remote store whose availability is switched at runtime
#[derive(Default)]
pub struct FakeRemote {
    offline: AtomicBool,
    gated: AtomicBool,
    gate: Notify,
    calls: AtomicUsize,
    received: Mutex<Vec<MutationRecord>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Hold every publish until [`FakeRemote::release`] is called
    pub fn hold(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.notify_waiters();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<MutationRecord> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn publish(&self, records: &[MutationRecord]) -> Result<PublishAck, TreeSyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(TreeSyncError::Publish("network unreachable".into()));
        }
        self.received.lock().extend_from_slice(records);
        Ok(PublishAck {
            accepted: records.len(),
        })
    }
}

/// Reindex service that can be told to fail
#[derive(Default)]
pub struct FakeReindexer {
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeReindexer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReprocessingService for FakeReindexer {
    async fn process(&self, _records: &[MutationRecord]) -> Result<ProcessingTicket, TreeSyncError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TreeSyncError::Reindex("indexer unavailable".into()));
        }
        Ok(ProcessingTicket {
            processing_id: Some(format!("job-{}", n)),
        })
    }
}

/// Notifier that remembers everything it was asked to show
#[derive(Default)]
pub struct RecordingNotifier {
    next_id: AtomicU64,
    messages: Mutex<Vec<(String, NotificationKind)>>,
    actionable: Mutex<Vec<(NotificationId, String)>>,
    dismissed: Mutex<Vec<NotificationId>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<(String, NotificationKind)> {
        self.messages.lock().clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.messages.lock().iter().filter(|(_, k)| *k == kind).count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().iter().any(|(m, _)| m.contains(needle))
    }

    pub fn reminders(&self) -> usize {
        self.actionable.lock().len()
    }

    pub fn dismissed(&self) -> Vec<NotificationId> {
        self.dismissed.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, kind: NotificationKind) {
        self.messages.lock().push((message.to_string(), kind));
    }

    fn notify_with_actions(&self, message: &str, _actions: &[NotificationAction]) -> NotificationId {
        let id = NotificationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.actionable.lock().push((id, message.to_string()));
        id
    }

    fn dismiss(&self, id: NotificationId) {
        self.dismissed.lock().push(id);
    }
}

/// Route `tracing` output through the test harness; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Everything a coordinator test needs, with handles kept for assertions
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub remote: Arc<FakeRemote>,
    pub reindexer: Arc<FakeReindexer>,
    pub notifier: Arc<RecordingNotifier>,
    pub coordinator: SyncCoordinator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let remote = FakeRemote::new();
        let reindexer = FakeReindexer::new();
        let notifier = RecordingNotifier::new();
        let queue = ChangeQueue::new(store.clone(), config.queue_key.clone(), config.max_retry);
        let coordinator = SyncCoordinator::new(
            queue,
            remote.clone(),
            reindexer.clone(),
            notifier.clone(),
            config,
        );
        Self {
            store,
            remote,
            reindexer,
            notifier,
            coordinator,
        }
    }
}

/// ```text
/// docs/
///   intro
///   guides/
/// notes/
///   todo
/// ```
pub fn knowledge_base() -> Tree {
    Tree::new(vec![
        TreeNode::directory(
            "docs",
            NodeLevel::Collection,
            vec![
                TreeNode::file("intro", NodeLevel::Module).with_content("# Intro"),
                TreeNode::directory("guides", NodeLevel::Module, vec![]),
            ],
        ),
        TreeNode::directory(
            "notes",
            NodeLevel::Collection,
            vec![TreeNode::file("todo", NodeLevel::Module)],
        ),
    ])
}
