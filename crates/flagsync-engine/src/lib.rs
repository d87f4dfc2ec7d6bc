//! # flagsync engine
//!
//! Maintains a local, eventually-consistent replica of a remote
//! feature-toggle dataset and answers point-in-time boolean/variant queries
//! against it, with bounded staleness and graceful degradation when the
//! remote source is unreachable.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = EngineConfig::new("http://localhost:4242/api", "my-app");
//! let engine = Engine::connect(config).await?;
//! engine.start();
//!
//! let ctx = EvaluationContext::new().with_user_id("alice");
//! if engine.client().is_enabled("new-checkout", &ctx, None) {
//!     // ...
//! }
//!
//! engine.stop();
//! ```
//!
//! The poll loop runs in a background task; tokio offers no way to detach a
//! timer from runtime liveness, so hosts and tests stop the engine
//! explicitly via [`Engine::stop`] rather than relying on natural exit.

pub mod backup;
pub mod facade;
pub mod fetcher;
pub mod store;
pub mod sync;

pub use backup::*;
pub use facade::*;
pub use fetcher::*;
pub use store::*;
pub use sync::*;

use flagsync_core::prelude::*;
use std::sync::Arc;
use tracing::info;

/// Engine orchestrator: wires the backing store, the replica synchronizer
/// and the query facade around one event hub.
pub struct Engine {
    config: EngineConfig,
    store: Arc<ToggleStore>,
    sync: Arc<Synchronizer>,
    client: FeatureClient,
    hub: EventHub,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine around an explicit fetch client and strategy
    /// registry.
    ///
    /// Configuration is validated synchronously before anything is wired:
    /// a missing base URL or application name fails here, not via an async
    /// error event, and no synchronizer activity starts. Backup recovery
    /// runs before this returns, so a recovered replica is queryable
    /// immediately.
    pub async fn new(
        config: EngineConfig,
        fetcher: Arc<dyn FetchClient>,
        registry: StrategyRegistry,
    ) -> Result<Self> {
        config.validate()?;

        let hub = EventHub::new();
        let backup: Option<Arc<dyn BackupStore>> = config
            .backup_dir
            .as_ref()
            .map(|dir| Arc::new(FileBackup::new(dir, &config.app_name)) as Arc<dyn BackupStore>);

        let store = Arc::new(ToggleStore::new(backup, hub.clone()));
        store.recover().await;

        let sync = Arc::new(Synchronizer::new(
            fetcher,
            Arc::clone(&store),
            hub.clone(),
            config.refresh_interval,
        ));
        let client = FeatureClient::new(Arc::clone(&store), Arc::new(registry), hub.clone());

        info!(
            app = %config.app_name,
            url = %config.url,
            interval = ?config.refresh_interval,
            "Engine initialized"
        );

        Ok(Self {
            config,
            store,
            sync,
            client,
            hub,
        })
    }

    /// Build an engine with the HTTP fetch client and the built-in
    /// strategies
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        Self::new(config, fetcher, StrategyRegistry::with_defaults()).await
    }

    /// Start the poll loop in a background task
    pub fn start(&self) {
        self.sync.start();
    }

    /// Stop the poll loop; idempotent, safe mid-fetch
    pub fn stop(&self) {
        self.sync.stop();
    }

    /// Query surface
    pub fn client(&self) -> &FeatureClient {
        &self.client
    }

    /// Event/error hub
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Backing store
    pub fn store(&self) -> &Arc<ToggleStore> {
        &self.store
    }

    /// Replica synchronizer
    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.sync
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn test_construction_fails_fast_on_missing_url() {
        let fetcher: Arc<dyn FetchClient> = Arc::new(MockFetcher::new());
        let err = Engine::new(
            EngineConfig::new("", "my-app"),
            fetcher,
            StrategyRegistry::with_defaults(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_construction_fails_fast_on_missing_app_name() {
        let fetcher: Arc<dyn FetchClient> = Arc::new(MockFetcher::new());
        let result = Engine::new(
            EngineConfig::new("http://localhost:4242/api", ""),
            fetcher,
            StrategyRegistry::with_defaults(),
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_first_poll_scenario() {
        // Server returns one enabled feature on first poll, then 304, then 500
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push(FetchResponse::success(
            FeatureBatch {
                version: Some(1),
                features: vec![
                    json!({"name": "feature", "enabled": true, "strategies": ["default"]}),
                ],
            },
            Some("v1".to_string()),
        ));
        fetcher.push(FetchResponse::unchanged());
        fetcher.push(FetchResponse::error_status(500));

        let engine = Engine::new(
            EngineConfig::new("http://localhost:4242/api", "my-app"),
            fetcher.clone() as Arc<dyn FetchClient>,
            StrategyRegistry::with_defaults(),
        )
        .await
        .unwrap();

        let ctx = EvaluationContext::new();
        let mut rx = engine.hub().subscribe();

        engine.synchronizer().fetch_once().await;
        assert!(engine.hub().is_ready());
        assert!(engine.client().is_enabled("feature", &ctx, None));

        // 304 leaves the answer unchanged
        engine.synchronizer().fetch_once().await;
        assert!(engine.client().is_enabled("feature", &ctx, None));

        // 500 leaves the answer unchanged and emits one error
        engine.synchronizer().fetch_once().await;
        assert!(engine.client().is_enabled("feature", &ctx, None));

        let events = drain(&mut rx);
        let errors = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::Error(_)))
            .count();
        assert_eq!(errors, 1);
        assert_eq!(
            fetcher.etags_seen(),
            vec![None, Some("v1".to_string()), Some("v1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_backup_recovery_end_to_end() {
        let dir = tempdir().unwrap();
        let mut config = EngineConfig::new("http://localhost:4242/api", "my-app");
        config.backup_dir = Some(dir.path().to_path_buf());

        // First engine syncs once and persists the snapshot
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push(FetchResponse::success(
            FeatureBatch {
                version: Some(1),
                features: vec![json!({"name": "persisted", "enabled": true, "strategies": []})],
            },
            None,
        ));
        let first = Engine::new(
            config.clone(),
            fetcher as Arc<dyn FetchClient>,
            StrategyRegistry::with_defaults(),
        )
        .await
        .unwrap();
        first.synchronizer().fetch_once().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        first.stop();

        // Second engine answers from the snapshot before any live fetch
        let second = Engine::new(
            config,
            Arc::new(MockFetcher::new()) as Arc<dyn FetchClient>,
            StrategyRegistry::with_defaults(),
        )
        .await
        .unwrap();

        assert!(second.hub().is_ready());
        assert!(second
            .client()
            .is_enabled("persisted", &EvaluationContext::new(), None));
    }

    #[tokio::test]
    async fn test_all_component_errors_reach_one_subscriber() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_error(SyncError::transport("connection refused"));

        let engine = Engine::new(
            EngineConfig::new("http://localhost:4242/api", "my-app"),
            fetcher as Arc<dyn FetchClient>,
            StrategyRegistry::with_defaults(),
        )
        .await
        .unwrap();

        let mut rx = engine.hub().subscribe();

        // Synchronizer error
        engine.synchronizer().fetch_once().await;
        // Store/durability error
        engine.hub().error(SyncError::backup("snapshot write failed"));
        // Metrics collaborator error
        engine
            .hub()
            .error(SyncError::Internal("metrics exporter unreachable".into()));

        let kinds: Vec<&'static str> = drain(&mut rx)
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Error(err) => Some(err.kind()),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec!["transport", "backup", "internal"]);
    }

    #[tokio::test]
    async fn test_dedicated_error_handler_sees_engine_errors() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push(FetchResponse::error_status(503));

        let engine = Engine::new(
            EngineConfig::new("http://localhost:4242/api", "my-app"),
            fetcher as Arc<dyn FetchClient>,
            StrategyRegistry::with_defaults(),
        )
        .await
        .unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        engine
            .hub()
            .set_error_handler(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        engine.synchronizer().fetch_once().await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
