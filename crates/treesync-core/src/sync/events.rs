//! Sync event types and status tracking for the publish pipeline
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncStatus: aggregate state of the change queue                │
//! │  ├── Idle: nothing to publish                                   │
//! │  ├── Pending: edits waiting for publish                         │
//! │  ├── Publishing: a publish cycle is in flight                   │
//! │  └── Failed: edits rejected by the remote, awaiting retry       │
//! │                                                                 │
//! │  SyncEvent: notifications about publish activity                │
//! │  ├── LocalSaved / ReminderShown / ReminderCleared               │
//! │  ├── PublishStarted / PublishSucceeded / PublishFailed          │
//! │  └── Retrying / Discarded / Purged                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

/// Aggregate publish state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Nothing waiting to be published
    #[default]
    Idle,
    /// Edits recorded locally, not yet published
    Pending { count: usize },
    /// A publish cycle is running
    Publishing { count: usize },
    /// Some edits were rejected and are waiting for a retry or discard
    Failed { count: usize },
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "Idle"),
            SyncStatus::Pending { count } => write!(f, "Pending ({} changes)", count),
            SyncStatus::Publishing { count } => write!(f, "Publishing ({} changes)", count),
            SyncStatus::Failed { count } => write!(f, "Failed ({} changes)", count),
        }
    }
}

/// Outcome of the secondary reindex step
///
/// Tracked separately from content durability: a delayed reindex never
/// fails the records it was run for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexStatus {
    Completed { processing_id: Option<String> },
    Delayed { error: String },
}

impl ReindexStatus {
    pub fn is_delayed(&self) -> bool {
        matches!(self, ReindexStatus::Delayed { .. })
    }
}

/// Events emitted by the sync coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// New records joined the queue
    Enqueued { count: usize, pending: usize },
    /// Debounced "your edits are stored locally" signal
    LocalSaved { pending: usize },
    /// The unpublished-changes prompt was raised
    ReminderShown { pending: usize },
    /// The unpublished-changes prompt was taken down
    ReminderCleared,
    PublishStarted { count: usize },
    /// Content reached the remote store
    PublishSucceeded { count: usize, reindex: ReindexStatus },
    /// Content write failed; records were marked failed
    PublishFailed { count: usize, error: String },
    /// Failed records were returned to pending
    Retrying { count: usize },
    Discarded { count: usize },
    /// Synced records were removed after their grace period
    Purged { count: usize },
}
