//! Error types for the bridge framework.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur in a bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Initial connection to the bus failed.
    #[error("Bus connection error: {0}")]
    BusConnection(String),

    /// An established bus connection was lost.
    #[error("Bus connection lost: {0}")]
    ConnectionLost(String),

    /// Publishing error.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// Subscription error.
    #[error("Failed to subscribe to {filter}: {message}")]
    Subscribe { filter: String, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Bulk state refresh failed.
    #[error("State refresh failed: {0}")]
    Refresh(String),

    /// Entity registry construction error.
    #[error("Entity registry error: {0}")]
    Registry(String),

    /// A write accessor failed.
    #[error("Write to {entity} failed: {message}")]
    Write { entity: String, message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BridgeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a refresh error.
    pub fn refresh(msg: impl Into<String>) -> Self {
        Self::Refresh(msg.into())
    }

    /// Create a write error for an entity.
    pub fn write(entity: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Write {
            entity: entity.into(),
            message: msg.into(),
        }
    }

    /// Create a publish error.
    pub fn publish(topic: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: msg.into(),
        }
    }

    /// Wrap an error with context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error means the bridge can no longer do its job.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BusConnection(_)
                | Self::ConnectionLost(_)
                | Self::Publish { .. }
                | Self::Refresh(_)
                | Self::Registry(_)
        )
    }
}

impl From<zenoh::Error> for BridgeError {
    fn from(err: zenoh::Error) -> Self {
        Self::BusConnection(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<json5::Error> for BridgeError {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

impl From<wallbridge_common::Error> for BridgeError {
    fn from(err: wallbridge_common::Error) -> Self {
        match err {
            wallbridge_common::Error::Config(msg) => Self::Config(msg),
            wallbridge_common::Error::Zenoh(e) => Self::BusConnection(e.to_string()),
            wallbridge_common::Error::Json(e) => Self::Serialization(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BridgeError::ConnectionLost("eof".into()).is_fatal());
        assert!(BridgeError::refresh("db gone").is_fatal());
        assert!(!BridgeError::write("lock", "busy").is_fatal());
        assert!(!BridgeError::validation("bad").is_fatal());
    }

    #[test]
    fn test_display() {
        let err = BridgeError::publish("wb/lock/state", "closed");
        assert_eq!(err.to_string(), "Failed to publish to wb/lock/state: closed");
    }
}
