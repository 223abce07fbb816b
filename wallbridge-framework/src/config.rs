//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};
use crate::{BusConfig, LoggingConfig};

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// loading, validation, and access to the bus and logging sections.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use wallbridge_framework::{BridgeConfig, BusConfig, LoggingConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyBridgeConfig {
///     pub bus: BusConfig,
///     pub logging: LoggingConfig,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn bus(&self) -> &BusConfig {
///         &self.bus
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the bus configuration.
    fn bus(&self) -> &BusConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation,
    /// and call [`validate_bus`] to keep the bus checks.
    fn validate(&self) -> Result<()> {
        validate_bus(self.bus())
    }

    /// Parse configuration from a JSON5 string and validate it.
    fn parse(content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

/// Checks shared by every bus section.
pub fn validate_bus(bus: &BusConfig) -> Result<()> {
    match bus {
        BusConfig::Mqtt(mqtt) => {
            if mqtt.host.trim().is_empty() {
                return Err(BridgeError::validation("bus.host must not be empty"));
            }
            if mqtt.port == 0 {
                return Err(BridgeError::validation("bus.port must not be 0"));
            }
            if mqtt.password.is_some() && mqtt.username.is_none() {
                return Err(BridgeError::validation(
                    "bus.password requires bus.username",
                ));
            }
        }
        BusConfig::Zenoh(zenoh) => {
            if !matches!(zenoh.mode.as_str(), "client" | "peer" | "router") {
                return Err(BridgeError::validation(format!(
                    "bus.mode '{}' is not one of client, peer, router",
                    zenoh.mode
                )));
            }
        }
    }
    Ok(())
}
