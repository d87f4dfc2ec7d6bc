//! Event and error hub
//!
//! Single externally observable channel for everything the engine emits.
//! The backing store, the replica synchronizer and the metrics collaborator
//! each hold a cloned [`EventHub`] handle and push their events into it;
//! one [`EventHub::subscribe`] surface observes them all.
//!
//! Delivery is best-effort fan-out over a tokio broadcast channel: with no
//! subscribers attached, emissions are dropped silently rather than crashing
//! the process. A host that wants dedicated error routing installs a handler
//! via [`EventHub::set_error_handler`]; every error then passes through it
//! in addition to the broadcast stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::error::SyncError;
use crate::toggle::ReplicaSet;

const DEFAULT_CAPACITY: usize = 64;

/// Events observable from the hub
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The replica has usable data for the first time, from either backup
    /// recovery or the first successful live sync. Emitted exactly once.
    Ready,

    /// A sync cycle committed a fresh replica; carries the full new mapping
    Changed(ReplicaSet),

    /// The remote reported the replica is still current (conditional fetch)
    Unchanged,

    /// A recoverable engine error (transport, validation, durability)
    Error(Arc<SyncError>),

    /// Client-misuse and degradation notices, e.g. pre-readiness fallbacks
    Warn(String),
}

type ErrorHandler = Box<dyn Fn(&SyncError) + Send + Sync>;

/// Process-wide event fan-in. Cheap to clone; all clones share one channel
/// and one readiness latch.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<EngineEvent>,
    ready: Arc<AtomicBool>,
    error_handler: Arc<RwLock<Option<ErrorHandler>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            ready: Arc::new(AtomicBool::new(false)),
            error_handler: Arc::new(RwLock::new(None)),
        }
    }

    /// Subscribe to every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Install a dedicated error handler. Errors route through it in
    /// addition to broadcast subscribers.
    pub fn set_error_handler(&self, handler: impl Fn(&SyncError) + Send + Sync + 'static) {
        let mut slot = self
            .error_handler
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some(Box::new(handler));
    }

    /// Emit an error event
    pub fn error(&self, err: SyncError) {
        error!(error = %err, kind = err.kind(), "engine error");
        {
            let handler = self.error_handler.read().unwrap_or_else(|e| e.into_inner());
            if let Some(handler) = handler.as_ref() {
                handler(&err);
            }
        }
        let _ = self.tx.send(EngineEvent::Error(Arc::new(err)));
    }

    /// Emit a warning event
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(message = %message, "engine warning");
        let _ = self.tx.send(EngineEvent::Warn(message));
    }

    /// Emit a `changed` event carrying the freshly committed replica.
    /// The store reset is already visible to all readers at this point.
    pub fn changed(&self, replica: ReplicaSet) {
        let _ = self.tx.send(EngineEvent::Changed(replica));
    }

    /// Emit an `unchanged` event
    pub fn unchanged(&self) {
        let _ = self.tx.send(EngineEvent::Unchanged);
    }

    /// Flip the one-way readiness latch. Emits `Ready` on the first call
    /// only; returns whether this call did the flip.
    pub fn mark_ready(&self) -> bool {
        if self.ready.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("replica ready");
        let _ = self.tx.send(EngineEvent::Ready);
        true
    }

    /// Current readiness state
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
