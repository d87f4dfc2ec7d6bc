//! Strategy evaluation seam
//!
//! The engine treats strategy evaluation as a pluggable registry: a toggle
//! definition references strategies by name, the host registers the
//! implementations. Two built-ins ship here; anything else is the host's
//! concern.

use std::collections::HashMap;
use std::sync::Arc;

use crate::toggle::{EvaluationContext, ToggleDefinition};

/// A named rule that decides enablement from a context
pub trait Strategy: Send + Sync {
    /// Decide enablement for one strategy reference
    fn enabled(&self, parameters: &HashMap<String, String>, context: &EvaluationContext) -> bool;
}

/// Always-on strategy (`default`)
pub struct DefaultStrategy;

impl Strategy for DefaultStrategy {
    fn enabled(&self, _parameters: &HashMap<String, String>, _context: &EvaluationContext) -> bool {
        true
    }
}

/// Enables for users listed in the `userIds` parameter (`userWithId`)
pub struct UserWithIdStrategy;

impl Strategy for UserWithIdStrategy {
    fn enabled(&self, parameters: &HashMap<String, String>, context: &EvaluationContext) -> bool {
        let Some(user_id) = context.user_id.as_deref() else {
            return false;
        };
        parameters
            .get("userIds")
            .map(|ids| ids.split(',').any(|id| id.trim() == user_id))
            .unwrap_or(false)
    }
}

/// Registry of strategy implementations keyed by wire name
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Registry with the built-in strategies registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("default", Arc::new(DefaultStrategy));
        registry.register("userWithId", Arc::new(UserWithIdStrategy));
        registry
    }

    /// Register (or replace) a strategy implementation
    pub fn register(&mut self, name: impl Into<String>, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(name.into(), strategy);
    }

    /// Look up a strategy by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Strategy>> {
        self.strategies.get(name)
    }

    /// Evaluate a toggle definition against a context.
    ///
    /// Disabled toggles are always off. An empty strategy list means the
    /// toggle is governed by `enabled` alone. Otherwise any passing strategy
    /// enables; references to unregistered strategies count as not passing.
    pub fn evaluate(&self, definition: &ToggleDefinition, context: &EvaluationContext) -> bool {
        if !definition.enabled {
            return false;
        }
        if definition.strategies.is_empty() {
            return true;
        }
        definition.strategies.iter().any(|reference| {
            self.strategies
                .get(&reference.name)
                .map(|strategy| strategy.enabled(&reference.parameters, context))
                .unwrap_or(false)
        })
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toggle::StrategyRef;

    #[test]
    fn test_disabled_toggle_is_off_regardless_of_strategies() {
        let registry = StrategyRegistry::with_defaults();
        let definition =
            ToggleDefinition::new("feature", false).with_strategy(StrategyRef::new("default"));

        assert!(!registry.evaluate(&definition, &EvaluationContext::new()));
    }

    #[test]
    fn test_empty_strategy_list_follows_enabled_flag() {
        let registry = StrategyRegistry::with_defaults();
        let definition = ToggleDefinition::new("feature", true);

        assert!(registry.evaluate(&definition, &EvaluationContext::new()));
    }

    #[test]
    fn test_unknown_strategy_counts_as_disabled() {
        let registry = StrategyRegistry::with_defaults();
        let definition =
            ToggleDefinition::new("feature", true).with_strategy(StrategyRef::new("gradualRollout"));

        assert!(!registry.evaluate(&definition, &EvaluationContext::new()));
    }

    #[test]
    fn test_user_with_id_strategy() {
        let registry = StrategyRegistry::with_defaults();
        let definition = ToggleDefinition::new("feature", true).with_strategy(
            StrategyRef::new("userWithId").with_parameter("userIds", "alice, bob"),
        );

        let alice = EvaluationContext::new().with_user_id("alice");
        let carol = EvaluationContext::new().with_user_id("carol");

        assert!(registry.evaluate(&definition, &alice));
        assert!(!registry.evaluate(&definition, &carol));
        assert!(!registry.evaluate(&definition, &EvaluationContext::new()));
    }

    #[test]
    fn test_any_passing_strategy_enables() {
        let registry = StrategyRegistry::with_defaults();
        let definition = ToggleDefinition::new("feature", true)
            .with_strategy(StrategyRef::new("userWithId").with_parameter("userIds", "alice"))
            .with_strategy(StrategyRef::new("default"));

        assert!(registry.evaluate(&definition, &EvaluationContext::new().with_user_id("carol")));
    }
}
