//! Treesync Core Library
//!
//! Offline-first structural editing for hierarchical knowledge bases.
//!
//! ## Overview
//!
//! Treesync lets users reorganize a tree of files and directories (move,
//! rename, delete, create) while disconnected. Each edit produces a new tree
//! value and a set of mutation records; the records are queued durably and
//! published to a remote store only when the user asks, followed by a
//! best-effort reindex of derived views.
//!
//! ## Core Principles
//!
//! - **Local-first**: Edits apply instantly and survive restarts
//! - **Explicit publish**: Nothing leaves the machine until `publish`
//! - **Pure mutations**: The input tree is never modified
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use treesync_core::{NoReprocessing, NewNode, TracingNotifier, TreeSyncEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = TreeSyncEngine::open(
//!         "~/.treesync/data",
//!         remote,
//!         Arc::new(NoReprocessing),
//!         Arc::new(TracingNotifier::new()),
//!     )?;
//!
//!     engine.create(None, 0, NewNode::directory().named("guides"))?;
//!     engine.move_nodes(&["intro.md"], Some("guides"), 0)?;
//!
//!     println!("{}", engine.status());
//!     engine.publish().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod mutation;
pub mod queue;
pub mod storage;
pub mod sync;
pub mod tree;
pub mod types;

// Re-exports
pub use config::{MutationOptions, RenameMode, SyncConfig, TreeSyncConfig};
pub use engine::TreeSyncEngine;
pub use error::{TreeSyncError, TreeSyncResult, ValidationError};
pub use mutation::{Mutation, MutationEngine, NewNode};
pub use queue::{ChangeQueue, ListenerId, QueueEvent};
pub use storage::{KeyValueStore, MemoryStore, Storage};
pub use sync::{
    NoReprocessing, NotificationAction, NotificationId, NotificationKind, Notifier,
    ProcessingTicket, PublishAck, PublishOutcome, ReindexStatus, RemoteStore,
    ReprocessingService, SyncCoordinator, SyncEvent, SyncStatus, TracingNotifier,
};
pub use tree::{join_path, Tree};
pub use types::*;
