//! Error types for Treesync

use thiserror::Error;

/// Structural checks that reject an edit before any tree value is produced
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A node would become a descendant of itself
    #[error("cannot move {node} into its own subtree ({destination})")]
    CycleDetected { node: String, destination: String },

    /// Target of an insert is a file
    #[error("{0} is not a directory")]
    NotADirectory(String),

    /// Names must be non-empty and must not contain a path separator
    #[error("invalid name {0:?}")]
    InvalidName(String),

    /// Two nodes would resolve to the same path
    #[error("path already exists: {0}")]
    PathConflict(String),

    /// An operation was given no ids to act on
    #[error("no nodes selected")]
    EmptySelection,
}

/// Main error type for Treesync operations
#[derive(Error, Debug)]
pub enum TreeSyncError {
    /// Edit rejected before touching the tree
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Operation referenced an id that is not in the tree
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Remote store was unreachable or rejected the batch
    #[error("Publish error: {0}")]
    Publish(String),

    /// Secondary reindex step failed on already-durable content
    #[error("Reindex error: {0}")]
    Reindex(String),

    /// Local durable store could not be written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TreeSyncError {
    /// True for errors raised synchronously by structural checks
    pub fn is_validation(&self) -> bool {
        matches!(self, TreeSyncError::Validation(_))
    }
}

impl From<serde_json::Error> for TreeSyncError {
    fn from(err: serde_json::Error) -> Self {
        TreeSyncError::Serialization(err.to_string())
    }
}

/// Result type alias using TreeSyncError
pub type TreeSyncResult<T> = Result<T, TreeSyncError>;
