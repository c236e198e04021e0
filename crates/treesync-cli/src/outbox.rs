//! Directory-backed remote used by the CLI
//!
//! Publishing appends each record as one JSON line to `outbox.jsonl`.
//! Reprocessing folds the batch into `index.json`, a map from path to the
//! last change seen for it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use treesync_core::{
    MutationRecord, ProcessingTicket, PublishAck, RecordPayload, RemoteStore, ReprocessingService,
    TreeSyncError,
};

pub const OUTBOX_FILE_NAME: &str = "outbox.jsonl";
pub const INDEX_FILE_NAME: &str = "index.json";

/// Remote store writing to a local (or mounted) directory
pub struct DirectoryRemote {
    dir: PathBuf,
}

impl DirectoryRemote {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn append(&self, records: &[MutationRecord]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut batch = String::new();
        for record in records {
            let line = serde_json::to_string(record)?;
            batch.push_str(&line);
            batch.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(OUTBOX_FILE_NAME))
            .await?;
        file.write_all(batch.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl RemoteStore for DirectoryRemote {
    async fn publish(&self, records: &[MutationRecord]) -> Result<PublishAck, TreeSyncError> {
        self.append(records)
            .await
            .map_err(|e| TreeSyncError::Publish(format!("{}: {}", self.dir.display(), e)))?;
        debug!(count = records.len(), dir = %self.dir.display(), "Appended to outbox");
        Ok(PublishAck {
            accepted: records.len(),
        })
    }
}

/// Last known change for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub change: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub indexed_at: String,
}

/// Reprocessing step maintaining `index.json` next to the outbox
pub struct PathIndexer {
    dir: PathBuf,
}

impl PathIndexer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE_NAME)
    }

    async fn load(path: &Path) -> Result<BTreeMap<String, IndexEntry>, TreeSyncError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

fn entry(change: &str, target: Option<&str>, at: &str) -> IndexEntry {
    IndexEntry {
        change: change.to_string(),
        target: target.map(str::to_string),
        indexed_at: at.to_string(),
    }
}

#[async_trait]
impl ReprocessingService for PathIndexer {
    async fn process(&self, records: &[MutationRecord]) -> Result<ProcessingTicket, TreeSyncError> {
        let path = self.index_path();
        let mut index = Self::load(&path)
            .await
            .map_err(|e| TreeSyncError::Reindex(e.to_string()))?;

        let now = chrono::Utc::now();
        let at = now.to_rfc3339();
        for record in records {
            match &record.payload {
                RecordPayload::Move {
                    source_path,
                    dest_path,
                    ..
                } => {
                    index.insert(source_path.clone(), entry("moved", Some(dest_path), &at));
                    index.insert(dest_path.clone(), entry("arrived", Some(source_path), &at));
                }
                RecordPayload::Rename {
                    path,
                    new_name,
                    new_path,
                    ..
                } => {
                    let target = new_path.as_deref().unwrap_or(new_name);
                    index.insert(path.clone(), entry("renamed", Some(target), &at));
                }
                RecordPayload::Delete { path, .. } => {
                    index.insert(path.clone(), entry("deleted", None, &at));
                }
                RecordPayload::Create { path, .. } => {
                    index.insert(path.clone(), entry("created", None, &at));
                }
            }
        }

        let json = serde_json::to_string_pretty(&index)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| TreeSyncError::Reindex(format!("{}: {}", path.display(), e)))?;

        Ok(ProcessingTicket {
            processing_id: Some(format!("idx-{}", now.timestamp_millis())),
        })
    }
}
