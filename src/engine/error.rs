// SPDX-License-Identifier: MIT

//! Typed error handling for the state engine
//!
//! None of these errors escape `StateStore::update()`; they surface from
//! construction, persistence adapters and the outer surfaces (CLI, HTTP,
//! broker) and are otherwise contained and logged.

use thiserror::Error;

/// Top-level error type for shared-state-rs
#[derive(Debug, Error)]
pub enum StateError {
    /// Missing or unusable backing collaborator (state directory, config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Store name cannot be used as a cache key and file name
    #[error("Invalid state name '{0}': use letters, digits, '_', '-' or '.'")]
    InvalidName(String),

    /// Durable write or read of a state document failed
    #[error("Persistence error at {path}: {message}")]
    Persistence { path: String, message: String },

    /// No store registered under the requested name
    #[error("State '{0}' not found")]
    UnknownStore(String),

    /// Broker collaborator failure
    #[error("Broker error: {0}")]
    Broker(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

impl StateError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a persistence error for the given location
    pub fn persistence(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create an unknown store error
    pub fn unknown_store(name: impl Into<String>) -> Self {
        Self::UnknownStore(name.into())
    }

    /// Create a broker error
    pub fn broker(message: impl Into<String>) -> Self {
        Self::Broker(message.into())
    }
}

impl From<&str> for StateError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for StateError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

/// Convenience result alias
pub type StateResult<T> = Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_error_mentions_path() {
        let err = StateError::persistence("/tmp/state/temp", "disk full");
        let text = err.to_string();
        assert!(text.contains("/tmp/state/temp"));
        assert!(text.contains("disk full"));
    }

    #[test]
    fn test_from_string() {
        let err: StateError = "boom".into();
        assert!(matches!(err, StateError::Other(ref m) if m == "boom"));
    }
}
