//! TreeSyncEngine - the primary entry point for Treesync
//!
//! TreeSyncEngine ties the pieces together for a single knowledge base:
//! - The current [`Tree`], snapshotted to durable storage after every edit
//! - The [`MutationEngine`] producing new trees and mutation records
//! - The [`SyncCoordinator`] queueing, reminding and publishing
//!
//! # Example
//!
//! ```ignore
//! use treesync_core::{NewNode, TreeSyncEngine, TracingNotifier, NoReprocessing};
//!
//! let mut engine = TreeSyncEngine::open("~/.treesync/data", remote, Arc::new(NoReprocessing), Arc::new(TracingNotifier::new()))?;
//!
//! engine.move_nodes(&["docs/intro.md"], Some("guides"), 0)?;
//! engine.rename("guides", "handbook")?;
//! engine.create(Some("handbook"), 0, NewNode::file().named("faq.md"))?;
//!
//! engine.publish().await;
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::TreeSyncConfig;
use crate::error::TreeSyncResult;
use crate::mutation::{Mutation, MutationEngine, NewNode};
use crate::queue::ChangeQueue;
use crate::storage::{KeyValueStore, Storage};
use crate::sync::{
    NotificationKind, Notifier, PublishOutcome, RemoteStore, ReprocessingService, SyncCoordinator, SyncEvent,
    SyncStatus,
};
use crate::tree::Tree;
use crate::types::{MutationRecord, RecordCounts, RecordPayload};

/// Database file created inside the data directory
pub const DATABASE_FILE_NAME: &str = "treesync.redb";

/// Storage key holding the current tree snapshot
pub const TREE_SNAPSHOT_KEY: &str = "tree_snapshot";

/// Main entry point for Treesync
pub struct TreeSyncEngine {
    store: Arc<dyn KeyValueStore>,
    config: TreeSyncConfig,
    mutations: MutationEngine,
    tree: Tree,
    notifier: Arc<dyn Notifier>,
    coordinator: SyncCoordinator,
}

impl TreeSyncEngine {
    /// Open (or create) a knowledge base in `data_dir`
    ///
    /// Reads `treesync.json` from the directory if present, restores the
    /// pending change queue and the last tree snapshot.
    ///
    /// # Errors
    ///
    /// Returns `TreeSyncError::Io` if the directory cannot be created.
    /// Returns `TreeSyncError::Database` if storage initialization fails.
    pub fn open(
        data_dir: impl AsRef<Path>,
        remote: Arc<dyn RemoteStore>,
        reprocessor: Arc<dyn ReprocessingService>,
        notifier: Arc<dyn Notifier>,
    ) -> TreeSyncResult<Self> {
        let data_dir = data_dir.as_ref();
        info!(?data_dir, "Opening TreeSyncEngine");

        std::fs::create_dir_all(data_dir)?;
        let config = TreeSyncConfig::load(data_dir)?;
        let storage = Storage::new(data_dir.join(DATABASE_FILE_NAME))?;

        Self::with_store(Arc::new(storage), config, remote, reprocessor, notifier)
    }

    /// Build an engine on top of an existing store
    pub fn with_store(
        store: Arc<dyn KeyValueStore>,
        config: TreeSyncConfig,
        remote: Arc<dyn RemoteStore>,
        reprocessor: Arc<dyn ReprocessingService>,
        notifier: Arc<dyn Notifier>,
    ) -> TreeSyncResult<Self> {
        let queue = ChangeQueue::restore(
            store.clone(),
            config.sync.queue_key.clone(),
            config.sync.max_retry,
        )?;
        let tree = match store.get(TREE_SNAPSHOT_KEY)? {
            Some(json) => Tree::from_snapshot(&json)?,
            None => Tree::default(),
        };
        debug!(nodes = tree.len(), pending = queue.counts().pending, "Engine state loaded");

        let coordinator = SyncCoordinator::new(
            queue,
            remote,
            reprocessor,
            notifier.clone(),
            config.sync.clone(),
        );

        Ok(Self {
            store,
            mutations: MutationEngine::new(config.mutation.clone()),
            config,
            tree,
            notifier,
            coordinator,
        })
    }

    pub fn config(&self) -> &TreeSyncConfig {
        &self.config
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Replace the whole tree without recording any mutation
    ///
    /// Used to seed a knowledge base from an export of the remote copy.
    /// A failed snapshot write is reported and the tree is still imported.
    pub fn import_tree(&mut self, tree: Tree) -> TreeSyncResult<&Tree> {
        let saved = self.save_snapshot(&tree);
        info!(nodes = tree.len(), saved, "Imported tree");
        self.tree = tree;
        Ok(&self.tree)
    }

    pub fn move_nodes<S: AsRef<str>>(
        &mut self,
        dragged_ids: &[S],
        dest_parent: Option<&str>,
        dest_index: usize,
    ) -> TreeSyncResult<&Tree> {
        let mutation = self
            .mutations
            .move_nodes(&self.tree, dragged_ids, dest_parent, dest_index)?;
        self.commit(mutation);
        Ok(&self.tree)
    }

    pub fn rename(&mut self, id: &str, new_name: &str) -> TreeSyncResult<&Tree> {
        let mutation = self.mutations.rename(&self.tree, id, new_name)?;
        self.commit(mutation);
        Ok(&self.tree)
    }

    pub fn delete<S: AsRef<str>>(&mut self, ids: &[S]) -> TreeSyncResult<&Tree> {
        let mutation = self.mutations.delete(&self.tree, ids)?;
        self.commit(mutation);
        Ok(&self.tree)
    }

    /// Create a node and return its id
    pub fn create(
        &mut self,
        parent: Option<&str>,
        index: usize,
        new_node: NewNode,
    ) -> TreeSyncResult<String> {
        let mutation = self.mutations.create(&self.tree, parent, index, new_node)?;
        let created = mutation
            .records
            .iter()
            .find_map(|r| match &r.payload {
                RecordPayload::Create { path, .. } => Some(path.clone()),
                _ => None,
            })
            .unwrap_or_default();
        self.commit(mutation);
        Ok(created)
    }

    pub async fn publish(&self) -> PublishOutcome {
        self.coordinator.publish().await
    }

    pub async fn retry_failed(&self) -> PublishOutcome {
        self.coordinator.retry_failed().await
    }

    /// Drop unpublished edits
    ///
    /// The local tree keeps the edits; only the queued records are dropped.
    pub fn discard(&self) -> usize {
        self.coordinator.discard()
    }

    pub fn records(&self) -> Vec<MutationRecord> {
        self.coordinator.records()
    }

    pub fn counts(&self) -> RecordCounts {
        self.coordinator.counts()
    }

    pub fn status(&self) -> SyncStatus {
        self.coordinator.status()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.coordinator.subscribe()
    }

    /// Persist the tree, then swap it in and queue the records
    ///
    /// The edit stands even when the snapshot cannot be written.
    fn commit(&mut self, mutation: Mutation) {
        self.save_snapshot(&mutation.tree);
        self.tree = mutation.tree;
        self.coordinator.submit(mutation.records);
    }

    /// Write the tree snapshot; failures are logged and narrated, never returned
    fn save_snapshot(&self, tree: &Tree) -> bool {
        let result = tree
            .to_snapshot()
            .and_then(|json| self.store.set(TREE_SNAPSHOT_KEY, &json));
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to save tree snapshot, keeping edit in memory");
                self.notifier.notify(
                    "Changes could not be saved locally; they are kept until the app closes",
                    NotificationKind::Warning,
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TreeSyncError;
    use crate::storage::MemoryStore;
    use crate::sync::{
        NoReprocessing, NotificationAction, NotificationId, PublishAck, TracingNotifier,
    };
    use crate::types::{NodeLevel, RecordKind, TreeNode};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct AcceptAll;

    #[async_trait]
    impl RemoteStore for AcceptAll {
        async fn publish(&self, records: &[MutationRecord]) -> Result<PublishAck, TreeSyncError> {
            Ok(PublishAck {
                accepted: records.len(),
            })
        }
    }

    #[derive(Default)]
    struct WarningCounter {
        warnings: parking_lot::Mutex<Vec<String>>,
    }

    impl Notifier for WarningCounter {
        fn notify(&self, message: &str, kind: NotificationKind) {
            if kind == NotificationKind::Warning {
                self.warnings.lock().push(message.to_string());
            }
        }

        fn notify_with_actions(&self, _message: &str, _actions: &[NotificationAction]) -> NotificationId {
            NotificationId(0)
        }

        fn dismiss(&self, _id: NotificationId) {}
    }

    fn sample_tree() -> Tree {
        Tree::new(vec![
            TreeNode::directory(
                "docs",
                NodeLevel::Collection,
                vec![TreeNode::file("intro.md", NodeLevel::Module)],
            ),
            TreeNode::directory("guides", NodeLevel::Collection, vec![]),
        ])
    }

    fn engine_on(store: Arc<dyn KeyValueStore>) -> TreeSyncEngine {
        TreeSyncEngine::with_store(
            store,
            TreeSyncConfig::default(),
            Arc::new(AcceptAll),
            Arc::new(NoReprocessing),
            Arc::new(TracingNotifier::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_edits_persist_tree_and_queue() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        {
            let mut engine = engine_on(store.clone());
            engine.import_tree(sample_tree()).unwrap();
            engine
                .move_nodes(&["docs/intro.md"], Some("guides"), 0)
                .unwrap();
            assert!(engine.tree().contains("guides/intro.md"));
            assert_eq!(engine.counts().pending, 1);
        }

        let engine = engine_on(store);
        assert!(engine.tree().contains("guides/intro.md"));
        assert!(!engine.tree().contains("docs/intro.md"));
        let records = engine.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind(), RecordKind::Move);
    }

    #[tokio::test]
    async fn test_rejected_edit_leaves_state() {
        let mut engine = engine_on(Arc::new(MemoryStore::new()));
        engine.import_tree(sample_tree()).unwrap();
        let before = engine.tree().clone();

        let err = engine.move_nodes(&["docs"], Some("docs"), 0).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(engine.tree(), &before);
        assert_eq!(engine.counts().total(), 0);
    }

    #[tokio::test]
    async fn test_create_returns_new_id() {
        let mut engine = engine_on(Arc::new(MemoryStore::new()));
        engine.import_tree(sample_tree()).unwrap();
        let id = engine
            .create(Some("guides"), 0, NewNode::file().named("faq.md"))
            .unwrap();
        assert_eq!(id, "guides/faq.md");
        assert_eq!(
            engine.tree().find_by_id(&id).map(|n| n.level),
            Some(NodeLevel::Module)
        );
    }

    #[tokio::test]
    async fn test_publish_clears_pending() {
        let mut engine = engine_on(Arc::new(MemoryStore::new()));
        engine.import_tree(sample_tree()).unwrap();
        engine.rename("guides", "handbook").unwrap();

        let outcome = engine.publish().await;
        assert!(matches!(outcome, PublishOutcome::Published { count: 1, .. }));
        assert_eq!(engine.counts().pending, 0);
        assert_eq!(engine.counts().synced, 1);
        assert_eq!(engine.status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = TempDir::new().unwrap();
        {
            let mut engine = TreeSyncEngine::open(
                dir.path(),
                Arc::new(AcceptAll),
                Arc::new(NoReprocessing),
                Arc::new(TracingNotifier::new()),
            )
            .unwrap();
            engine.import_tree(sample_tree()).unwrap();
            engine.delete(&["docs"]).unwrap();
        }

        let engine = TreeSyncEngine::open(
            dir.path(),
            Arc::new(AcceptAll),
            Arc::new(NoReprocessing),
            Arc::new(TracingNotifier::new()),
        )
        .unwrap();
        assert!(!engine.tree().contains("docs"));
        // docs and docs/intro.md
        assert_eq!(engine.counts().pending, 2);
    }

    #[tokio::test]
    async fn test_failed_snapshot_keeps_edit() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(WarningCounter::default());
        let mut engine = TreeSyncEngine::with_store(
            store.clone(),
            TreeSyncConfig::default(),
            Arc::new(AcceptAll),
            Arc::new(NoReprocessing),
            notifier.clone(),
        )
        .unwrap();
        engine.import_tree(sample_tree()).unwrap();

        store.fail_writes(true);
        engine.rename("docs", "top").unwrap();
        assert!(engine.tree().contains("top/intro.md"));
        assert!(!engine.tree().contains("docs"));
        assert_eq!(engine.counts().pending, 1);
        assert!(!notifier.warnings.lock().is_empty());

        engine
            .import_tree(Tree::new(vec![TreeNode::file("solo", NodeLevel::Unit)]))
            .unwrap();
        assert!(engine.tree().contains("solo"));
    }

    #[tokio::test]
    async fn test_deep_tree_survives_reopen() {
        let depth = 300;
        let mut node = TreeNode::file("leaf", NodeLevel::Other);
        for i in (0..depth).rev() {
            node = TreeNode::directory(format!("d{}", i), NodeLevel::Other, vec![node]);
        }

        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        {
            let mut engine = engine_on(store.clone());
            engine.import_tree(Tree::new(vec![node])).unwrap();
            engine.rename("d0", "top").unwrap();
            assert_eq!(engine.counts().pending, 1);
        }

        let engine = engine_on(store);
        assert_eq!(engine.tree().len(), depth + 1);
        assert!(engine.tree().roots()[0].name == "top");
        assert!(engine
            .tree()
            .flatten()
            .iter()
            .all(|n| n.path.starts_with("top")));
        assert_eq!(engine.counts().pending, 1);
    }
}
