//! Offline-first publish layer
//!
//! ## Overview
//!
//! Edits land in the [`ChangeQueue`](crate::queue::ChangeQueue) immediately
//! and reach the remote side only when the user publishes. The sync module
//! owns everything between those two points.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncCoordinator                                                │
//! │  ├── TimerSlot x3 (local save, reminder, purge)                 │
//! │  ├── RemoteStore (phase 1: content)                             │
//! │  ├── ReprocessingService (phase 2: derived views)               │
//! │  └── Notifier (status narration)                               │
//! │                                                                 │
//! │  SyncEvent broadcast for UI updates                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let coordinator = SyncCoordinator::new(queue, remote, reindexer, notifier, config);
//! coordinator.submit(mutation.records);
//! let outcome = coordinator.publish().await;
//! ```

mod coordinator;
mod events;
mod notify;
mod remote;
mod timer;

pub use coordinator::{PublishOutcome, SyncCoordinator};
pub use events::{ReindexStatus, SyncEvent, SyncStatus};
pub use notify::{NotificationAction, NotificationId, NotificationKind, Notifier, TracingNotifier};
pub use remote::{NoReprocessing, ProcessingTicket, PublishAck, RemoteStore, ReprocessingService};
