//! Query facade
//!
//! Answers `is_enabled` / `get_variant` against whatever data currently
//! exists, with an explicit pre-readiness degradation contract.
//!
//! The asymmetry is deliberate and load-bearing: a fallback served while the
//! replica is not yet ready warns on every call, because the answer may be
//! wrong for lack of data. A missing toggle in a fully-synced replica is a
//! normal outcome and stays silent.

use flagsync_core::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::store::ToggleStore;

pub struct FeatureClient {
    store: Arc<ToggleStore>,
    registry: Arc<StrategyRegistry>,
    hub: EventHub,
    metrics: EngineMetrics,
}

impl FeatureClient {
    pub fn new(store: Arc<ToggleStore>, registry: Arc<StrategyRegistry>, hub: EventHub) -> Self {
        Self {
            store,
            registry,
            hub,
            metrics: EngineMetrics::new("facade"),
        }
    }

    /// Evaluate a toggle against a context.
    ///
    /// When the toggle exists, readiness is irrelevant: the definition is
    /// evaluated via the strategy registry. When it is absent, the answer is
    /// `fallback` (or `false`), and before readiness every such call emits
    /// one warning.
    pub fn is_enabled(
        &self,
        name: &str,
        context: &EvaluationContext,
        fallback: Option<bool>,
    ) -> bool {
        match self.store.get(name) {
            Some(definition) => self.registry.evaluate(&definition, context),
            None => self.fall_back(name, fallback.unwrap_or(false)),
        }
    }

    /// Select a variant for a toggle.
    ///
    /// Returns [`Variant::disabled`] when the toggle is absent, evaluates
    /// disabled, or defines no variants. Selection is weighted and stable
    /// for a given context identity.
    pub fn get_variant(&self, name: &str, context: &EvaluationContext) -> Variant {
        let Some(definition) = self.store.get(name) else {
            self.fall_back(name, false);
            return Variant::disabled();
        };
        if !self.registry.evaluate(&definition, context) || definition.variants.is_empty() {
            return Variant::disabled();
        }

        let total: u32 = definition.variants.iter().map(|v| v.weight).sum();
        if total == 0 {
            return Variant::disabled();
        }

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        context.identity().hash(&mut hasher);
        let mut point = (hasher.finish() % u64::from(total)) as u32;

        for variant in &definition.variants {
            if point < variant.weight {
                return variant.clone();
            }
            point -= variant.weight;
        }
        Variant::disabled()
    }

    fn fall_back(&self, name: &str, value: bool) -> bool {
        if !self.hub.is_ready() {
            self.metrics.record_fallback();
            self.hub.warn(format!(
                "toggle '{name}' queried before replica is ready, answering {value}"
            ));
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::Receiver;

    fn new_client() -> (FeatureClient, Arc<ToggleStore>, EventHub) {
        let hub = EventHub::new();
        let store = Arc::new(ToggleStore::new(None, hub.clone()));
        let client = FeatureClient::new(
            Arc::clone(&store),
            Arc::new(StrategyRegistry::with_defaults()),
            hub.clone(),
        );
        (client, store, hub)
    }

    fn warn_count(rx: &mut Receiver<EngineEvent>) -> usize {
        std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|event| matches!(event, EngineEvent::Warn(_)))
            .count()
    }

    fn replica_with(definition: ToggleDefinition) -> ReplicaSet {
        let mut replica = ReplicaSet::new();
        replica.insert(definition.name.clone(), definition);
        replica
    }

    #[tokio::test]
    async fn test_unknown_toggle_before_ready_warns_every_call() {
        let (client, _store, hub) = new_client();
        let mut rx = hub.subscribe();
        let ctx = EvaluationContext::new();

        assert!(!client.is_enabled("unknown", &ctx, None));
        assert!(!client.is_enabled("unknown", &ctx, None));

        // Not deduplicated: one warn per pre-ready fallback
        assert_eq!(warn_count(&mut rx), 2);
    }

    #[tokio::test]
    async fn test_explicit_fallback_honored_while_still_warning() {
        let (client, _store, hub) = new_client();
        let mut rx = hub.subscribe();

        assert!(client.is_enabled("unknown", &EvaluationContext::new(), Some(true)));
        assert_eq!(warn_count(&mut rx), 1);
    }

    #[tokio::test]
    async fn test_unknown_toggle_after_ready_is_silent() {
        let (client, store, hub) = new_client();
        store.reset(replica_with(ToggleDefinition::new("present", true)));
        let mut rx = hub.subscribe();

        assert!(!client.is_enabled("unknown", &EvaluationContext::new(), None));
        assert!(client.is_enabled("unknown", &EvaluationContext::new(), Some(true)));
        assert_eq!(warn_count(&mut rx), 0);
    }

    #[tokio::test]
    async fn test_existing_toggle_is_evaluated_not_defaulted() {
        let (client, store, hub) = new_client();
        store.reset(replica_with(
            ToggleDefinition::new("feature", false).with_strategy(StrategyRef::new("default")),
        ));
        let mut rx = hub.subscribe();

        // The stored definition wins over any explicit fallback, silently
        assert!(!client.is_enabled("feature", &EvaluationContext::new(), Some(true)));
        assert_eq!(warn_count(&mut rx), 0);
    }

    #[tokio::test]
    async fn test_variant_selection_is_stable_and_weighted() {
        let (client, store, _hub) = new_client();
        store.reset(replica_with(
            ToggleDefinition::new("feature", true)
                .with_variant(Variant::new("blue", 50))
                .with_variant(Variant::new("green", 50)),
        ));

        let ctx = EvaluationContext::new().with_user_id("alice");
        let first = client.get_variant("feature", &ctx);
        let second = client.get_variant("feature", &ctx);

        assert_ne!(first.name, "disabled");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_variant_disabled_cases() {
        let (client, store, _hub) = new_client();
        let ctx = EvaluationContext::new();

        // Absent toggle
        assert_eq!(client.get_variant("missing", &ctx), Variant::disabled());

        // Disabled toggle with variants
        store.reset(replica_with(
            ToggleDefinition::new("off", false).with_variant(Variant::new("blue", 100)),
        ));
        assert_eq!(client.get_variant("off", &ctx), Variant::disabled());

        // Enabled toggle without variants
        store.reset(replica_with(ToggleDefinition::new("bare", true)));
        assert_eq!(client.get_variant("bare", &ctx), Variant::disabled());
    }
}
