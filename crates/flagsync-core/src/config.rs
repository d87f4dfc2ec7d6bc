//! Configuration for the flagsync engine
//!
//! Uses the `config` crate for layered configuration from files and environment.
//!
//! Construction-time invariants (base URL, application name) are checked by
//! [`EngineConfig::validate`], which the engine calls synchronously before any
//! sync activity starts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// A tag filter forwarded to the remote feature endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    pub name: String,
    pub value: String,
}

impl TagFilter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for TagFilter {
    /// Wire rendering: `name:value`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.value)
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the remote feature endpoint
    #[serde(default)]
    pub url: String,

    /// Application identity; also keys the backup snapshot file
    #[serde(default)]
    pub app_name: String,

    /// Instance identity sent with every fetch
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    /// Optional project scope for the remote query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Optional toggle-name prefix for the remote query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,

    /// Tag filters for the remote query, rendered as repeated `tag=name:value`
    #[serde(default)]
    pub tags: Vec<TagFilter>,

    /// Poll interval; zero disables periodic scheduling (single fetch)
    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    pub refresh_interval: Duration,

    /// Directory for the backup snapshot; `None` disables durability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    /// Extra headers attached to every fetch
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,

    /// Connection timeout for the fetch client
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Request timeout for the fetch client
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_instance_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            app_name: String::new(),
            instance_id: default_instance_id(),
            project: None,
            name_prefix: None,
            tags: Vec::new(),
            refresh_interval: default_refresh_interval(),
            backup_dir: None,
            custom_headers: HashMap::new(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl EngineConfig {
    /// Minimal valid configuration
    pub fn new(url: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Enforce construction-time invariants.
    ///
    /// A missing or unparseable base URL and a missing application name are
    /// configuration errors, not runtime conditions: they fail immediately
    /// and synchronously.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(SyncError::config("base url is required"));
        }
        Url::parse(&self.url)
            .map_err(|e| SyncError::config(format!("invalid base url '{}': {e}", self.url)))?;
        if self.app_name.trim().is_empty() {
            return Err(SyncError::config("application name is required"));
        }
        Ok(())
    }

    /// Load configuration from file and environment
    pub fn load(path: Option<&str>) -> std::result::Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default values
        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        // Add config file if specified
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Add environment variables with prefix FLAGSYNC_
        builder = builder.add_source(
            config::Environment::with_prefix("FLAGSYNC")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_url() {
        let config = EngineConfig::new("", "my-app");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SyncError::Configuration { .. }));
    }

    #[test]
    fn test_validate_rejects_unparseable_url() {
        let config = EngineConfig::new("not a url", "my-app");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_app_name() {
        let config = EngineConfig::new("http://localhost:4242/api", "  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_minimal_config() {
        let config = EngineConfig::new("http://localhost:4242/api", "my-app");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tag_filter_rendering() {
        assert_eq!(TagFilter::new("team", "billing").to_string(), "team:billing");
    }
}
