//! Error types for the flagsync engine
//!
//! Uses `thiserror` for ergonomic error handling with full context preservation.
//!
//! Post-construction errors never cross component boundaries as `Err` during
//! normal operation: they are converted to events and funneled through the
//! [`EventHub`](crate::events::EventHub). Only configuration errors are
//! surfaced synchronously, at construction time.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Primary error type for all engine operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid construction-time options (missing URL, missing app name).
    /// Always raised synchronously, never through the event hub.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Network, timeout or payload-decode failures. Retried on the next
    /// scheduled cycle, never fatal.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Remote answered with a status outside 2xx/304
    #[error("Unexpected status {status} from feature endpoint")]
    UnexpectedStatus { status: u16 },

    /// Structural problem in a single toggle definition. Ingestion is
    /// permissive: the offending definition is still stored.
    #[error("Validation error in toggle '{toggle}': {message}")]
    Validation { toggle: String, message: String },

    /// Backup snapshot read/write failure. In-memory state stays
    /// authoritative and unaffected.
    #[error("Backup error: {message}")]
    Backup {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error with source
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unexpected-status error
    pub fn status(status: u16) -> Self {
        Self::UnexpectedStatus { status }
    }

    /// Create a validation error for a named toggle
    pub fn validation(toggle: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            toggle: toggle.into(),
            message: message.into(),
        }
    }

    /// Create a backup error
    pub fn backup(message: impl Into<String>) -> Self {
        Self::Backup {
            message: message.into(),
            source: None,
        }
    }

    /// Create a backup error with source
    pub fn backup_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backup {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Short stable tag for metrics labels and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Transport { .. } => "transport",
            Self::UnexpectedStatus { .. } => "status",
            Self::Validation { .. } => "validation",
            Self::Backup { .. } => "backup",
            Self::Internal(_) => "internal",
        }
    }

    /// Check if the next scheduled cycle may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::UnexpectedStatus { .. } | Self::Backup { .. }
        )
    }

    /// Check if error is transient (may resolve on its own)
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::UnexpectedStatus { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(SyncError::config("x").kind(), "configuration");
        assert_eq!(SyncError::status(500).kind(), "status");
        assert_eq!(SyncError::validation("t", "m").kind(), "validation");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::transport("timeout").is_retryable());
        assert!(SyncError::status(503).is_retryable());
        assert!(!SyncError::config("missing url").is_retryable());
        assert!(!SyncError::validation("t", "bad strategies").is_retryable());
    }
}
