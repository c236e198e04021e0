//! Seams to the remote side of a publish
//!
//! Phase 1 writes content to a [`RemoteStore`]; phase 2 asks a
//! [`ReprocessingService`] to refresh derived views (search indexes and the
//! like). Transport and rejection failures are both reported as `Err`.

use async_trait::async_trait;

use crate::error::TreeSyncError;
use crate::types::MutationRecord;

/// Acknowledgement of a content write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishAck {
    pub accepted: usize,
}

/// Handle to a started reindex job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingTicket {
    pub processing_id: Option<String>,
}

/// Authoritative remote copy of the knowledge base
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Write one batch of records. Either the whole batch lands or none of it.
    async fn publish(&self, records: &[MutationRecord]) -> Result<PublishAck, TreeSyncError>;
}

/// Best-effort secondary step run after content is durable
#[async_trait]
pub trait ReprocessingService: Send + Sync {
    async fn process(&self, records: &[MutationRecord]) -> Result<ProcessingTicket, TreeSyncError>;
}

/// Reprocessing service for hosts without derived views
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReprocessing;

#[async_trait]
impl ReprocessingService for NoReprocessing {
    async fn process(&self, _records: &[MutationRecord]) -> Result<ProcessingTicket, TreeSyncError> {
        Ok(ProcessingTicket::default())
    }
}
