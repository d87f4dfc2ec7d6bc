//! Backing store
//!
//! Holds the current replica and mediates durability. The replica is
//! replaced wholesale by [`ToggleStore::reset`] on each successful sync;
//! partial updates are never applied, so readers always observe one
//! complete, self-consistent remote snapshot.
//!
//! Reads are pure and synchronous: no lock is ever held across an await
//! point, so queries never block on an in-flight fetch or backup write.

use flagsync_core::prelude::*;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::backup::BackupStore;

pub struct ToggleStore {
    replica: RwLock<ReplicaSet>,
    backup: Option<Arc<dyn BackupStore>>,
    hub: EventHub,
    metrics: EngineMetrics,
}

impl ToggleStore {
    pub fn new(backup: Option<Arc<dyn BackupStore>>, hub: EventHub) -> Self {
        Self {
            replica: RwLock::new(ReplicaSet::new()),
            backup,
            hub,
            metrics: EngineMetrics::new("store"),
        }
    }

    /// Startup recovery: populate the replica from the backup snapshot so
    /// queries can answer with stale data before the first live fetch.
    ///
    /// A missing snapshot is silent; a corrupt one has already been logged by
    /// the backup store; any other read failure becomes an `error` event and
    /// never terminates startup.
    pub async fn recover(&self) {
        let Some(backup) = &self.backup else {
            return;
        };
        match backup.load().await {
            Ok(Some(snapshot)) => {
                info!(toggles = snapshot.len(), "Recovered replica from backup");
                self.metrics.set_toggle_count(snapshot.len());
                {
                    let mut replica = self.replica.write().unwrap_or_else(|e| e.into_inner());
                    *replica = snapshot;
                }
                self.hub.mark_ready();
            }
            Ok(None) => {}
            Err(e) => self.hub.error(e),
        }
    }

    /// Atomically replace the entire replica.
    ///
    /// Each call fully supersedes the prior state. Triggers an asynchronous
    /// best-effort backup write; a write failure emits an `error` event but
    /// does not roll back the in-memory replacement.
    pub fn reset(&self, new_set: ReplicaSet) {
        {
            let mut replica = self.replica.write().unwrap_or_else(|e| e.into_inner());
            *replica = new_set.clone();
        }
        self.metrics.set_toggle_count(new_set.len());
        self.hub.mark_ready();

        if let Some(backup) = &self.backup {
            let backup = Arc::clone(backup);
            let hub = self.hub.clone();
            tokio::spawn(async move {
                if let Err(e) = backup.save(&new_set).await {
                    hub.error(e);
                }
            });
        }
    }

    /// O(1) lookup. `None` for unknown names; the caller, not the store,
    /// decides the fallback.
    pub fn get(&self, name: &str) -> Option<ToggleDefinition> {
        self.replica
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// All current definitions
    pub fn get_all(&self) -> ReplicaSet {
        self.replica.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.replica.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::MemoryBackup;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Backup that always fails writes, for durability-error propagation
    struct FailingBackup;

    #[async_trait]
    impl BackupStore for FailingBackup {
        async fn load(&self) -> Result<Option<ReplicaSet>> {
            Ok(None)
        }

        async fn read(&self) -> Result<ReplicaSet> {
            Err(SyncError::backup("disk on fire"))
        }

        async fn save(&self, _replica: &ReplicaSet) -> Result<()> {
            Err(SyncError::backup("disk on fire"))
        }

        fn name(&self) -> &'static str {
            "failing_backup"
        }
    }

    fn replica_with(names: &[&str]) -> ReplicaSet {
        names
            .iter()
            .map(|name| (name.to_string(), ToggleDefinition::new(*name, true)))
            .collect()
    }

    #[tokio::test]
    async fn test_reset_replaces_wholesale() {
        let store = ToggleStore::new(None, EventHub::new());

        store.reset(replica_with(&["alpha", "beta"]));
        store.reset(replica_with(&["gamma"]));

        // No leftover entries from the prior batch
        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("gamma"));
        assert!(store.get("alpha").is_none());
    }

    #[tokio::test]
    async fn test_reset_flips_ready_once() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        let store = ToggleStore::new(None, hub);

        store.reset(replica_with(&["alpha"]));
        store.reset(replica_with(&["beta"]));

        assert!(matches!(rx.try_recv().unwrap(), EngineEvent::Ready));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_recover_populates_replica_and_emits_ready() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        let backup = Arc::new(MemoryBackup::with_snapshot(replica_with(&["stale"])));
        let store = ToggleStore::new(Some(backup), hub);

        store.recover().await;

        assert!(store.get("stale").is_some());
        assert!(matches!(rx.try_recv().unwrap(), EngineEvent::Ready));
    }

    #[tokio::test]
    async fn test_recover_without_snapshot_is_silent() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        let store = ToggleStore::new(Some(Arc::new(MemoryBackup::new())), hub.clone());

        store.recover().await;

        assert!(store.is_empty());
        assert!(!hub.is_ready());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_backup_write_failure_emits_error_without_rollback() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        let store = ToggleStore::new(Some(Arc::new(FailingBackup)), hub);

        store.reset(replica_with(&["alpha"]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // In-memory state stays authoritative
        assert!(store.get("alpha").is_some());

        let saw_backup_error = std::iter::from_fn(|| rx.try_recv().ok()).any(|event| {
            matches!(&event, EngineEvent::Error(e) if matches!(**e, SyncError::Backup { .. }))
        });
        assert!(saw_backup_error);
    }
}
