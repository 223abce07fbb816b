//! Configuration for the wallbox bridge.

use serde::{Deserialize, Serialize};
use wallbridge_common::DEFAULT_DISCOVERY_PREFIX;
use wallbridge_framework::{
    BridgeConfig, BridgeError, BusConfig, LoggingConfig, Result, validate_bus,
};

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallboxBridgeConfig {
    /// Bus connection settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Charger and entity settings.
    pub wallbox: WallboxConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig for WallboxBridgeConfig {
    fn bus(&self) -> &BusConfig {
        &self.bus
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        validate_bus(&self.bus)?;
        self.wallbox.validate()
    }
}

/// Charger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallboxConfig {
    /// Device name shown on the dashboard (default: "Wallbox").
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Poll interval in seconds (default: 1).
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,

    /// Expose diagnostic and telemetry-event entities.
    #[serde(default)]
    pub debug_sensors: bool,

    /// Expose Power Boost entities.
    #[serde(default)]
    pub power_boost_enabled: bool,

    /// Prefix of discovery topics (default: "homeassistant").
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,

    /// Device topic prefix (default: `wallbox_<serial>`).
    #[serde(default)]
    pub topic_prefix: Option<String>,

    /// Where charger data comes from.
    pub source: SourceConfig,
}

fn default_device_name() -> String {
    "Wallbox".to_string()
}

fn default_polling_interval() -> u64 {
    1
}

fn default_discovery_prefix() -> String {
    DEFAULT_DISCOVERY_PREFIX.to_string()
}

impl WallboxConfig {
    /// Validate charger settings.
    pub fn validate(&self) -> Result<()> {
        if self.polling_interval_secs == 0 {
            return Err(BridgeError::validation(
                "wallbox.polling_interval_secs must be greater than 0",
            ));
        }
        if self.device_name.trim().is_empty() {
            return Err(BridgeError::validation("wallbox.device_name must not be empty"));
        }
        if self.discovery_prefix.trim().is_empty() {
            return Err(BridgeError::validation(
                "wallbox.discovery_prefix must not be empty",
            ));
        }
        if let Some(prefix) = &self.topic_prefix {
            if prefix.is_empty() || prefix.contains(['+', '#', '/']) {
                return Err(BridgeError::validation(format!(
                    "wallbox.topic_prefix '{}' must be a single non-wildcard topic level",
                    prefix
                )));
            }
        }
        self.source.validate()
    }

    /// Device topic prefix for a charger serial number.
    pub fn device_prefix(&self, serial_number: &str) -> String {
        self.topic_prefix
            .clone()
            .unwrap_or_else(|| format!("wallbox_{}", serial_number))
    }
}

/// Data source selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Deterministic in-process charger.
    Simulated(SimulatedConfig),
}

impl SourceConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            SourceConfig::Simulated(sim) => sim.validate(),
        }
    }
}

/// Settings of the simulated charger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
    /// Serial number reported by the charger.
    pub serial_number: String,

    /// Charger type, the part number prefix (default: "PLP1").
    #[serde(default = "default_charger_type")]
    pub charger_type: String,

    /// Maximum available current in amperes (default: 32).
    #[serde(default = "default_max_available_current")]
    pub max_available_current: i64,

    /// Id of the most recent non-admin user (default: 2).
    #[serde(default = "default_user_id")]
    pub user_id: i64,

    /// Start with a car plugged in and charging.
    #[serde(default = "default_true")]
    pub charging: bool,

    /// Interval between telemetry events in milliseconds (default: 5000).
    #[serde(default = "default_event_interval")]
    pub event_interval_ms: u64,
}

fn default_charger_type() -> String {
    "PLP1".to_string()
}

fn default_max_available_current() -> i64 {
    32
}

fn default_user_id() -> i64 {
    2
}

fn default_true() -> bool {
    true
}

fn default_event_interval() -> u64 {
    5000
}

impl SimulatedConfig {
    /// Minimal settings for a charger with the given serial.
    pub fn new(serial_number: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            charger_type: default_charger_type(),
            max_available_current: default_max_available_current(),
            user_id: default_user_id(),
            charging: true,
            event_interval_ms: default_event_interval(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.serial_number.trim().is_empty() {
            return Err(BridgeError::validation(
                "wallbox.source.serial_number must not be empty",
            ));
        }
        if self.max_available_current < 6 {
            return Err(BridgeError::validation(
                "wallbox.source.max_available_current must be at least 6",
            ));
        }
        if self.event_interval_ms == 0 {
            return Err(BridgeError::validation(
                "wallbox.source.event_interval_ms must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let json5 = r#"
        {
            bus: { type: "mqtt", host: "broker.local", port: 1883, username: "u", password: "p" },
            wallbox: {
                device_name: "Garage",
                polling_interval_secs: 2,
                debug_sensors: true,
                power_boost_enabled: true,
                source: { type: "simulated", serial_number: "900123", charger_type: "CPB1" },
            },
            logging: { level: "debug" },
        }
        "#;

        let config = WallboxBridgeConfig::parse(json5).unwrap();
        assert_eq!(config.wallbox.device_name, "Garage");
        assert_eq!(config.wallbox.polling_interval_secs, 2);
        assert!(config.wallbox.debug_sensors);
        assert!(config.wallbox.power_boost_enabled);
        assert_eq!(config.wallbox.discovery_prefix, "homeassistant");
        assert_eq!(config.logging.level, "debug");

        let SourceConfig::Simulated(sim) = &config.wallbox.source;
        assert_eq!(sim.charger_type, "CPB1");
        assert_eq!(sim.max_available_current, 32);

        match &config.bus {
            BusConfig::Mqtt(mqtt) => assert_eq!(mqtt.host, "broker.local"),
            other => panic!("unexpected bus: {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = WallboxBridgeConfig::parse(
            r#"{ wallbox: { source: { type: "simulated", serial_number: "1" } } }"#,
        )
        .unwrap();

        assert_eq!(config.wallbox.device_name, "Wallbox");
        assert_eq!(config.wallbox.polling_interval_secs, 1);
        assert!(!config.wallbox.debug_sensors);
        assert!(!config.wallbox.power_boost_enabled);
        assert_eq!(config.wallbox.device_prefix("1"), "wallbox_1");
    }

    #[test]
    fn test_topic_prefix_override() {
        let config = WallboxBridgeConfig::parse(
            r#"{ wallbox: { topic_prefix: "garage_charger", source: { type: "simulated", serial_number: "1" } } }"#,
        )
        .unwrap();
        assert_eq!(config.wallbox.device_prefix("1"), "garage_charger");
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            r#"{ wallbox: { polling_interval_secs: 0, source: { type: "simulated", serial_number: "1" } } }"#,
            r#"{ wallbox: { device_name: "", source: { type: "simulated", serial_number: "1" } } }"#,
            r#"{ wallbox: { discovery_prefix: " ", source: { type: "simulated", serial_number: "1" } } }"#,
            r#"{ wallbox: { topic_prefix: "a/b", source: { type: "simulated", serial_number: "1" } } }"#,
            r#"{ wallbox: { source: { type: "simulated", serial_number: "" } } }"#,
            r#"{ bus: { type: "mqtt", host: "" }, wallbox: { source: { type: "simulated", serial_number: "1" } } }"#,
        ];

        for case in cases {
            let result = WallboxBridgeConfig::parse(case);
            assert!(
                matches!(result, Err(BridgeError::ConfigValidation(_))),
                "expected validation error for {}",
                case
            );
        }
    }

    #[test]
    fn test_unknown_source_type() {
        let result = WallboxBridgeConfig::parse(
            r#"{ wallbox: { source: { type: "redis", serial_number: "1" } } }"#,
        );
        assert!(matches!(result, Err(BridgeError::ConfigParse(_))));
    }
}
