//! Metrics for the flagsync engine
//!
//! Provides Prometheus-compatible metrics for observability via the
//! `metrics` facade. Exporter wiring is the host's concern.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metric names as constants for consistency
pub mod names {
    pub const SYNC_FETCH_DURATION: &str = "flagsync_fetch_duration_seconds";
    pub const SYNC_CYCLES_TOTAL: &str = "flagsync_sync_cycles_total";
    pub const SYNC_ERRORS_TOTAL: &str = "flagsync_errors_total";
    pub const STORE_TOGGLE_COUNT: &str = "flagsync_toggle_count";
    pub const QUERY_FALLBACKS_TOTAL: &str = "flagsync_query_fallbacks_total";
}

/// Labels for metrics
pub mod labels {
    pub const COMPONENT: &str = "component";
    pub const OUTCOME: &str = "outcome";
    pub const ERROR_TYPE: &str = "error_type";
}

/// Engine metrics
#[derive(Clone)]
pub struct EngineMetrics {
    component: String,
}

impl EngineMetrics {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Record the duration of one remote fetch
    pub fn record_fetch_duration(&self, duration: Duration) {
        histogram!(
            names::SYNC_FETCH_DURATION,
            labels::COMPONENT => self.component.clone(),
        )
        .record(duration.as_secs_f64());
    }

    /// Record one completed sync cycle, labeled by outcome
    /// (`changed`, `unchanged`, `failed`)
    pub fn record_cycle(&self, outcome: &str) {
        counter!(
            names::SYNC_CYCLES_TOTAL,
            labels::COMPONENT => self.component.clone(),
            labels::OUTCOME => outcome.to_string(),
        )
        .increment(1);
    }

    /// Record an error by type
    pub fn record_error(&self, error_type: &str) {
        counter!(
            names::SYNC_ERRORS_TOTAL,
            labels::COMPONENT => self.component.clone(),
            labels::ERROR_TYPE => error_type.to_string(),
        )
        .increment(1);
    }

    /// Update the replica toggle count
    pub fn set_toggle_count(&self, count: usize) {
        gauge!(
            names::STORE_TOGGLE_COUNT,
            labels::COMPONENT => self.component.clone(),
        )
        .set(count as f64);
    }

    /// Record a pre-readiness query fallback
    pub fn record_fallback(&self) {
        counter!(
            names::QUERY_FALLBACKS_TOTAL,
            labels::COMPONENT => self.component.clone(),
        )
        .increment(1);
    }
}
