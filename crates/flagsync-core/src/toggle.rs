//! Toggle definitions and evaluation context
//!
//! Defines the canonical toggle data model that flows from the remote
//! feature endpoint into the backing store and out to queries.
//!
//! Ingestion is permissive: a structurally malformed definition is reported
//! as a validation error but still stored, with offending fields coerced to
//! their neutral value. See [`ToggleDefinition::from_raw`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::SyncError;

/// The local replica of the remote toggle dataset, keyed by toggle name.
/// Replaced wholesale on each successful sync, never merged.
pub type ReplicaSet = HashMap<String, ToggleDefinition>;

/// A named feature toggle with its activation strategies and variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleDefinition {
    /// Unique toggle name
    pub name: String,

    /// Master switch; strategies are only consulted when this is true
    pub enabled: bool,

    /// Ordered activation strategies. Empty means the toggle is governed
    /// by `enabled` alone.
    #[serde(default)]
    pub strategies: Vec<StrategyRef>,

    /// Ordered variants for weighted variant selection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Variant>,
}

impl ToggleDefinition {
    /// Create a definition with no strategies or variants
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            strategies: Vec::new(),
            variants: Vec::new(),
        }
    }

    /// Builder: add a strategy
    pub fn with_strategy(mut self, strategy: StrategyRef) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Builder: add a variant
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Lenient conversion from one raw entry of a feature batch.
    ///
    /// Returns the definition together with every structural violation found.
    /// Violations do not reject the definition: `enabled` falls back to
    /// `false` and malformed strategy/variant sequences fall back to empty,
    /// but the toggle itself is kept so it still appears in queries. Only an
    /// entry with no usable name is dropped, since it cannot be keyed.
    pub fn from_raw(raw: &Value) -> (Option<Self>, Vec<SyncError>) {
        let mut issues = Vec::new();

        let name = match raw.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                issues.push(SyncError::validation(
                    "<unnamed>",
                    "definition has no usable name and cannot be stored",
                ));
                return (None, issues);
            }
        };

        let enabled = match raw.get("enabled") {
            Some(Value::Bool(enabled)) => *enabled,
            Some(other) => {
                issues.push(SyncError::validation(
                    &name,
                    format!("enabled is not a boolean (got {other}), coerced to false"),
                ));
                false
            }
            None => {
                issues.push(SyncError::validation(
                    &name,
                    "enabled is missing, coerced to false",
                ));
                false
            }
        };

        let strategies = match raw.get("strategies") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match StrategyRef::from_raw(item) {
                    Ok(strategy) => Some(strategy),
                    Err(message) => {
                        issues.push(SyncError::validation(&name, message));
                        None
                    }
                })
                .collect(),
            Some(other) => {
                issues.push(SyncError::validation(
                    &name,
                    format!("strategies is not a sequence (got {other})"),
                ));
                Vec::new()
            }
        };

        let variants = match raw.get("variants") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => match serde_json::from_value::<Vec<Variant>>(value.clone()) {
                Ok(variants) => variants,
                Err(e) => {
                    issues.push(SyncError::validation(
                        &name,
                        format!("variants are malformed: {e}"),
                    ));
                    Vec::new()
                }
            },
        };

        (
            Some(Self {
                name,
                enabled,
                strategies,
                variants,
            }),
            issues,
        )
    }
}

/// Reference to a named activation strategy with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRef {
    /// Strategy name, resolved against the host's strategy registry
    pub name: String,

    /// Strategy parameters (string-valued, per the wire format)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, String>,
}

impl StrategyRef {
    /// Create a parameterless strategy reference
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: HashMap::new(),
        }
    }

    /// Builder: add a parameter
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Accepts both wire shapes: a bare strategy name string, or an object
    /// with `name` and optional `parameters`.
    fn from_raw(raw: &Value) -> std::result::Result<Self, String> {
        match raw {
            Value::String(name) => Ok(Self::new(name)),
            Value::Object(fields) => {
                let name = fields
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("strategy entry has no name: {raw}"))?;
                let parameters = fields
                    .get("parameters")
                    .map(|params| {
                        serde_json::from_value::<HashMap<String, String>>(params.clone())
                            .map_err(|e| format!("strategy '{name}' has malformed parameters: {e}"))
                    })
                    .transpose()?
                    .unwrap_or_default();
                Ok(Self {
                    name: name.to_string(),
                    parameters,
                })
            }
            other => Err(format!("strategy entry is not a string or object: {other}")),
        }
    }
}

/// A weighted toggle variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,

    /// Relative selection weight
    #[serde(default)]
    pub weight: u32,

    /// Optional payload delivered with the variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Variant {
    /// Create a payloadless variant
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
            payload: None,
        }
    }

    /// Sentinel returned when a toggle is absent, disabled, or has no variants
    pub fn disabled() -> Self {
        Self::new("disabled", 0)
    }
}

/// Raw batch shape of the remote `client/features` response.
///
/// `features` entries stay untyped so that per-definition validation can be
/// permissive instead of rejecting the whole batch on one bad definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,

    #[serde(default)]
    pub features: Vec<Value>,
}

/// Context a query is evaluated against
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub remote_address: Option<String>,
    pub properties: HashMap<String, String>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the user id
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Builder: set the session id
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Builder: set the remote address
    pub fn with_remote_address(mut self, addr: impl Into<String>) -> Self {
        self.remote_address = Some(addr.into());
        self
    }

    /// Builder: add a custom property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Most specific stable identity present in the context, used for
    /// deterministic variant selection
    pub fn identity(&self) -> &str {
        self.user_id
            .as_deref()
            .or(self.session_id.as_deref())
            .or(self.remote_address.as_deref())
            .unwrap_or("")
    }
}
