//! wallbridge Common Library
//!
//! This crate provides shared types and utilities for wallbridge device bridges:
//!
//! - [`value`] - Publishable entity values and their canonical string form
//! - [`topic`] - Topic builders, command-topic parsing and filter matching
//! - [`config`] - Configuration loading (JSON5 format), bus and logging settings
//! - [`session`] - Zenoh session management
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod session;
pub mod topic;
pub mod value;

// Re-export commonly used types at the crate root
pub use config::{
    BaseConfig, BusConfig, LogFormat, LoggingConfig, MqttConfig, ZenohConfig, parse_config,
};
pub use error::{Error, Result};
pub use session::connect;
pub use topic::{DEFAULT_DISCOVERY_PREFIX, TopicBuilder, discovery_topic, to_key_expr, topic_matches};
pub use value::{Value, parse_float_lenient, parse_int_lenient};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Example
///
/// ```ignore
/// use wallbridge_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
