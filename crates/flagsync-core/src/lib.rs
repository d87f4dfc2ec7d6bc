//! # flagsync core
//!
//! Core types, configuration, errors and events for the flagsync replica
//! synchronization engine.
//!
//! The engine crate (`flagsync-engine`) builds the moving parts on top of
//! these abstractions:
//!
//! ```text
//! ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//! │ Query Facade │─────►│ Backing Store│◄─────│ Synchronizer │
//! └──────┬───────┘      └──────┬───────┘      └──────┬───────┘
//!        │                     │                     │
//!        └───────────────► EventHub ◄────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod strategy;
pub mod toggle;

pub use config::*;
pub use error::*;
pub use events::*;
pub use metrics::*;
pub use strategy::*;
pub use toggle::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{EngineConfig, TagFilter};
    pub use crate::error::{Result, SyncError};
    pub use crate::events::{EngineEvent, EventHub};
    pub use crate::metrics::EngineMetrics;
    pub use crate::strategy::{Strategy, StrategyRegistry};
    pub use crate::toggle::{
        EvaluationContext, FeatureBatch, ReplicaSet, StrategyRef, ToggleDefinition, Variant,
    };
}
