//! Backup snapshot storage
//!
//! Provides pluggable snapshot persistence for cold-start recovery: the
//! backing store writes the replica here after every successful sync and
//! loads it once at construction, so queries can answer with
//! stale-but-non-empty data before the first live fetch completes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flagsync_core::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Backup snapshot storage trait
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Best-effort startup load.
    ///
    /// Returns `Ok(None)` when no snapshot exists (not an error) and also
    /// when a snapshot exists but is unreadable as a replica — corruption is
    /// logged as a warning and superseded by the next successful sync.
    async fn load(&self) -> Result<Option<ReplicaSet>>;

    /// Explicitly requested read. Unlike [`BackupStore::load`], a missing
    /// snapshot here surfaces as a typed backup error for diagnosability.
    async fn read(&self) -> Result<ReplicaSet>;

    /// Persist a snapshot, fully superseding the previous one
    async fn save(&self, replica: &ReplicaSet) -> Result<()>;

    /// Get store name
    fn name(&self) -> &'static str;
}

/// On-disk snapshot format
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    written_at: DateTime<Utc>,
    features: ReplicaSet,
}

// ============================================================================
// File-based Backup
// ============================================================================

/// File-based snapshot storage: one file per application identity under a
/// configured directory
pub struct FileBackup {
    path: PathBuf,
}

impl FileBackup {
    /// Create a file backup for the given application identity
    pub fn new(dir: impl AsRef<Path>, app_name: &str) -> Self {
        let file_name = format!("flagsync-backup-{}.json", sanitize(app_name));
        Self {
            path: dir.as_ref().join(file_name),
        }
    }

    /// Snapshot file location
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// App names key file names, so anything outside [A-Za-z0-9._-] is mapped
fn sanitize(app_name: &str) -> String {
    app_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[async_trait]
impl BackupStore for FileBackup {
    async fn load(&self) -> Result<Option<ReplicaSet>> {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<SnapshotFile>(&bytes) {
                Ok(snapshot) => {
                    info!(
                        path = ?self.path,
                        toggles = snapshot.features.len(),
                        written_at = %snapshot.written_at,
                        "Loaded backup snapshot"
                    );
                    Ok(Some(snapshot.features))
                }
                Err(e) => {
                    warn!(path = ?self.path, error = %e, "Backup snapshot is corrupt, starting empty");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No backup snapshot, starting empty");
                Ok(None)
            }
            Err(e) => Err(SyncError::backup_with_source(
                format!("failed to read backup snapshot {}", self.path.display()),
                e,
            )),
        }
    }

    async fn read(&self) -> Result<ReplicaSet> {
        let bytes = fs::read(&self.path).await.map_err(|e| {
            SyncError::backup_with_source(
                format!("failed to read backup snapshot {}", self.path.display()),
                e,
            )
        })?;
        let snapshot: SnapshotFile = serde_json::from_slice(&bytes).map_err(|e| {
            SyncError::backup_with_source(
                format!("backup snapshot {} is not parseable", self.path.display()),
                e,
            )
        })?;
        Ok(snapshot.features)
    }

    async fn save(&self, replica: &ReplicaSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                SyncError::backup_with_source("failed to create backup directory", e)
            })?;
        }

        let snapshot = SnapshotFile {
            written_at: Utc::now(),
            features: replica.clone(),
        };
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| SyncError::backup_with_source("failed to serialize snapshot", e))?;

        // Write atomically via temp file
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, bytes)
            .await
            .map_err(|e| SyncError::backup_with_source("failed to write snapshot", e))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| SyncError::backup_with_source("failed to rename snapshot", e))?;

        debug!(path = ?self.path, toggles = replica.len(), "Saved backup snapshot");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file_backup"
    }
}

// ============================================================================
// Memory Backup (for testing)
// ============================================================================

/// In-memory snapshot storage
pub struct MemoryBackup {
    snapshot: RwLock<Option<ReplicaSet>>,
}

impl MemoryBackup {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
        }
    }

    /// Create with an initial snapshot
    pub fn with_snapshot(replica: ReplicaSet) -> Self {
        Self {
            snapshot: RwLock::new(Some(replica)),
        }
    }
}

impl Default for MemoryBackup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackupStore for MemoryBackup {
    async fn load(&self) -> Result<Option<ReplicaSet>> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn read(&self) -> Result<ReplicaSet> {
        self.snapshot
            .read()
            .await
            .clone()
            .ok_or_else(|| SyncError::backup("no snapshot present"))
    }

    async fn save(&self, replica: &ReplicaSet) -> Result<()> {
        *self.snapshot.write().await = Some(replica.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory_backup"
    }
}
