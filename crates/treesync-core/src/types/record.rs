//! Mutation records: durable descriptions of one structural edit each

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{now_millis, NodeKind, RecordId};

/// Which kind of edit a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Move,
    Rename,
    Delete,
    Create,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Move => write!(f, "move"),
            RecordKind::Rename => write!(f, "rename"),
            RecordKind::Delete => write!(f, "delete"),
            RecordKind::Create => write!(f, "create"),
        }
    }
}

/// Publish lifecycle of a record
///
/// `Pending -> Processing -> {Synced | Failed}`, and `Failed -> Pending`
/// through an explicit retry while under the retry cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Processing,
    Synced,
    Failed,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Pending => write!(f, "pending"),
            RecordStatus::Processing => write!(f, "processing"),
            RecordStatus::Synced => write!(f, "synced"),
            RecordStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Edit-specific data carried by a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordPayload {
    Move {
        source_path: String,
        dest_path: String,
        name: String,
        node_kind: NodeKind,
    },
    Rename {
        path: String,
        old_name: String,
        new_name: String,
        /// Set when the rename also relocated the node (strict mode)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_path: Option<String>,
    },
    Delete {
        path: String,
        name: String,
        node_kind: NodeKind,
    },
    Create {
        path: String,
        node_kind: NodeKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
}

impl RecordPayload {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordPayload::Move { .. } => RecordKind::Move,
            RecordPayload::Rename { .. } => RecordKind::Rename,
            RecordPayload::Delete { .. } => RecordKind::Delete,
            RecordPayload::Create { .. } => RecordKind::Create,
        }
    }

    /// Path the edit is about, as it was before the edit
    pub fn subject_path(&self) -> &str {
        match self {
            RecordPayload::Move { source_path, .. } => source_path,
            RecordPayload::Rename { path, .. }
            | RecordPayload::Delete { path, .. }
            | RecordPayload::Create { path, .. } => path,
        }
    }
}

/// One queued structural edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub id: RecordId,
    /// Unix millis when the edit was made
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: RecordPayload,
    pub status: RecordStatus,
    pub retry_count: u32,
    /// Unix millis of the last status change
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl MutationRecord {
    /// Create a pending record for the given edit
    pub fn new(payload: RecordPayload) -> Self {
        let now = now_millis();
        Self {
            id: RecordId::new(),
            timestamp: now,
            payload,
            status: RecordStatus::Pending,
            retry_count: 0,
            updated_at: now,
            last_error: None,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    /// Whether a failed record may go back to pending
    pub fn can_retry(&self, max_retry: u32) -> bool {
        self.status == RecordStatus::Failed && self.retry_count < max_retry
    }

    pub(crate) fn set_status(&mut self, status: RecordStatus) {
        self.status = status;
        self.updated_at = now_millis();
    }
}

impl fmt::Display for MutationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            RecordPayload::Move {
                source_path,
                dest_path,
                ..
            } => write!(f, "move {} -> {}", source_path, dest_path),
            RecordPayload::Rename {
                path,
                old_name,
                new_name,
                ..
            } => write!(f, "rename {} ({} -> {})", path, old_name, new_name),
            RecordPayload::Delete { path, .. } => write!(f, "delete {}", path),
            RecordPayload::Create {
                path, node_kind, ..
            } => write!(f, "create {} {}", node_kind, path),
        }
    }
}

/// Per-status tallies over a set of records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub pending: usize,
    pub processing: usize,
    pub synced: usize,
    pub failed: usize,
}

impl RecordCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.synced + self.failed
    }
}

impl<'a> FromIterator<&'a MutationRecord> for RecordCounts {
    fn from_iter<I: IntoIterator<Item = &'a MutationRecord>>(iter: I) -> Self {
        let mut counts = RecordCounts::default();
        for record in iter {
            match record.status {
                RecordStatus::Pending => counts.pending += 1,
                RecordStatus::Processing => counts.processing += 1,
                RecordStatus::Synced => counts.synced += 1,
                RecordStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}
