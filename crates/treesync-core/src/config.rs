//! Configuration for the mutation engine and sync coordinator
//!
//! Everything has a default; a `treesync.json` in the data directory may
//! override any subset of fields.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TreeSyncResult;

/// File name looked up in the data directory
pub const CONFIG_FILE_NAME: &str = "treesync.json";

/// Failed records may be retried while `retry_count` stays below this
pub const DEFAULT_MAX_RETRY: u32 = 3;

/// How rename treats a node's structural identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenameMode {
    /// Rename recomputes `path` and `id` for the node and its descendants,
    /// exactly like a move does
    #[default]
    Strict,
    /// Rename changes only `name`; `path` and `id` keep their old values
    Loose,
}

/// Options for [`crate::MutationEngine`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationOptions {
    pub rename_mode: RenameMode,
}

/// Timing and retry settings for [`crate::SyncCoordinator`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after the last edit before "saved locally" fires
    pub local_save_debounce_ms: u64,
    /// Delay after the last edit before nagging about unpublished changes
    pub publish_reminder_ms: u64,
    /// How long synced records stay visible before being purged
    pub synced_grace_ms: u64,
    pub max_retry: u32,
    /// Key the pending set is stored under
    pub queue_key: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_save_debounce_ms: 2_000,
            publish_reminder_ms: 10_000,
            synced_grace_ms: 5_000,
            max_retry: DEFAULT_MAX_RETRY,
            queue_key: "change_queue".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn local_save_debounce(&self) -> Duration {
        Duration::from_millis(self.local_save_debounce_ms)
    }

    pub fn publish_reminder(&self) -> Duration {
        Duration::from_millis(self.publish_reminder_ms)
    }

    pub fn synced_grace(&self) -> Duration {
        Duration::from_millis(self.synced_grace_ms)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSyncConfig {
    pub sync: SyncConfig,
    pub mutation: MutationOptions,
}

impl TreeSyncConfig {
    /// Load `treesync.json` from `data_dir`, falling back to defaults when absent
    pub fn load(data_dir: impl AsRef<Path>) -> TreeSyncResult<Self> {
        let path = data_dir.as_ref().join(CONFIG_FILE_NAME);
        if !path.exists() {
            debug!(?path, "No config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        let config = serde_json::from_str(&raw)?;
        debug!(?path, "Loaded config");
        Ok(config)
    }
}
