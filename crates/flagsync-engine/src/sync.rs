//! Replica synchronizer
//!
//! Drives the poll loop: conditional fetch, per-definition validation,
//! wholesale commit into the backing store, etag cursor upkeep, and
//! guaranteed re-scheduling of the next cycle.
//!
//! Cycle state machine:
//!
//! ```text
//! Idle -> Fetching -> {Committing | Unchanged | Failed} -> Scheduled -> Fetching ...
//! ```
//!
//! `Stopped` is terminal and reached only via [`Synchronizer::stop`]; a
//! fetch result arriving after stop is discarded without commit, backup
//! write or emissions.

use flagsync_core::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::fetcher::FetchClient;
use crate::store::ToggleStore;

/// Observable cycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Fetching,
    Committing,
    Unchanged,
    Failed,
    Scheduled,
    Stopped,
}

pub struct Synchronizer {
    fetcher: Arc<dyn FetchClient>,
    store: Arc<ToggleStore>,
    hub: EventHub,
    metrics: EngineMetrics,
    refresh_interval: Duration,
    etag: Mutex<Option<String>>,
    state: Mutex<SyncState>,
    stopped: AtomicBool,
    shutdown: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Synchronizer {
    pub fn new(
        fetcher: Arc<dyn FetchClient>,
        store: Arc<ToggleStore>,
        hub: EventHub,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            store,
            hub,
            metrics: EngineMetrics::new("synchronizer"),
            refresh_interval,
            etag: Mutex::new(None),
            state: Mutex::new(SyncState::Idle),
            stopped: AtomicBool::new(false),
            shutdown: Notify::new(),
            task: Mutex::new(None),
        }
    }

    /// Spawn the poll loop. The first fetch happens on the next scheduler
    /// tick, never inside this call, so callers can attach listeners first
    /// without missing the first transition.
    pub fn start(self: &Arc<Self>) {
        let sync = Arc::clone(self);
        let handle = tokio::spawn(async move { sync.run().await });
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        debug!(interval = ?self.refresh_interval, "Synchronizer started");
    }

    async fn run(&self) {
        tokio::task::yield_now().await;
        loop {
            if self.is_stopped() {
                break;
            }
            self.fetch_once().await;

            // A zero interval disables periodic scheduling: single fetch
            if self.refresh_interval.is_zero() || self.is_stopped() {
                break;
            }

            // Scheduling happens regardless of the cycle's outcome, so a
            // single failure never halts periodic retry
            self.set_state(SyncState::Scheduled);
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(self.refresh_interval) => {}
            }
        }
        if self.is_stopped() {
            self.set_state(SyncState::Stopped);
        }
    }

    /// Run one full cycle: fetch, validate, commit, update the cursor
    pub async fn fetch_once(&self) {
        if self.is_stopped() {
            return;
        }
        self.set_state(SyncState::Fetching);

        let etag = self.etag.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let start = Instant::now();
        let result = self.fetcher.fetch(etag.as_deref()).await;
        self.metrics.record_fetch_duration(start.elapsed());

        // A response arriving after stop is discarded, not committed
        if self.is_stopped() {
            debug!("Discarding fetch result received after stop");
            return;
        }

        match result {
            Ok(response) if response.status == 304 => {
                self.set_state(SyncState::Unchanged);
                self.metrics.record_cycle("unchanged");
                self.hub.unchanged();
            }
            Ok(response) if (200..300).contains(&response.status) => match response.batch {
                Some(batch) => self.commit(batch, response.etag),
                None => {
                    self.set_state(SyncState::Failed);
                    self.metrics.record_cycle("failed");
                    self.hub
                        .error(SyncError::transport("success response carried no body"));
                }
            },
            Ok(response) => {
                self.set_state(SyncState::Failed);
                self.metrics.record_cycle("failed");
                self.metrics.record_error("status");
                self.hub.error(SyncError::status(response.status));
            }
            Err(e) => {
                self.set_state(SyncState::Failed);
                self.metrics.record_cycle("failed");
                self.metrics.record_error(e.kind());
                self.hub.error(e);
            }
        }
    }

    /// Build a fresh replica from the batch and commit it.
    ///
    /// Validation is permissive: violations are emitted as errors but the
    /// definition is still stored. The last definition with a given name in
    /// the batch wins.
    fn commit(&self, batch: FeatureBatch, etag: Option<String>) {
        self.set_state(SyncState::Committing);

        let mut replica = ReplicaSet::with_capacity(batch.features.len());
        for raw in &batch.features {
            let (definition, issues) = ToggleDefinition::from_raw(raw);
            for issue in issues {
                self.metrics.record_error("validation");
                self.hub.error(issue);
            }
            if let Some(definition) = definition {
                replica.insert(definition.name.clone(), definition);
            }
        }

        // The reset is fully visible to readers before `changed` fires
        self.store.reset(replica.clone());
        *self.etag.lock().unwrap_or_else(|e| e.into_inner()) = etag;
        self.metrics.record_cycle("changed");

        info!(toggles = replica.len(), "Committed replica");
        self.hub.changed(replica);
    }

    /// Stop the loop. Idempotent; cancels any pending timer.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_waiters();
        self.set_state(SyncState::Stopped);
        info!("Synchronizer stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Current cycle state
    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current conditional-fetch cursor
    pub fn etag(&self) -> Option<String> {
        self.etag.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}
