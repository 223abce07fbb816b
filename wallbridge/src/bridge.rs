//! Wiring of the charger, the entity registry and the bus.

use std::sync::Arc;
use std::time::Duration;

use wallbridge_framework::{
    BridgeConfig, BridgeError, BridgeRunner, CommandDispatcher, DeviceInfo, EntityRegistry,
    PollScheduler, Result, SharedStore, StateRefresher, TopicBuilder, Transport,
    publish_discovery,
};

use crate::charger::Charger;
use crate::config::{SourceConfig, WallboxConfig};
use crate::entities::{EntityFlags, build_registry};
use crate::events::TelemetryEventPipeline;
use crate::simulated::SimulatedSource;
use crate::source::{DataSource, TELEMETRY_CHANNEL};
use crate::store::DeviceSnapshot;

/// Name used for logs and the MQTT client id.
pub const BRIDGE_NAME: &str = "wallbridge";

/// Create the configured data source.
pub fn open_source(config: &SourceConfig) -> Arc<dyn DataSource> {
    match config {
        SourceConfig::Simulated(sim) => Arc::new(SimulatedSource::new(sim.clone())),
    }
}

/// A charger ready to be bridged.
pub struct WallboxBridge {
    charger: Arc<Charger>,
    store: SharedStore<DeviceSnapshot>,
    registry: Arc<EntityRegistry<DeviceSnapshot>>,
    device: DeviceInfo,
    topics: TopicBuilder,
    polling_interval: Duration,
    telemetry_events: bool,
}

impl WallboxBridge {
    /// Connect to the charger, take the first snapshot and build the registry.
    ///
    /// Fails when the charger cannot be read.
    pub async fn prepare(config: &WallboxConfig, source: Arc<dyn DataSource>) -> Result<Self> {
        let charger = Arc::new(Charger::connect(source).await?);

        let store = SharedStore::new(DeviceSnapshot::default());
        charger
            .load_snapshot(&store)
            .await
            .map_err(|e| BridgeError::refresh(e.to_string()))?;
        if config.debug_sensors {
            charger.seed_telemetry(&store).await;
        }

        let available_current = charger.source().max_available_current().await?;
        let registry = build_registry(&charger, EntityFlags::from(config), available_current)?;

        let serial_number = charger.info().serial_number.clone();
        let topics = TopicBuilder::new(config.device_prefix(&serial_number));
        let device = DeviceInfo {
            discovery_prefix: config.discovery_prefix.clone(),
            device_id: serial_number,
            device_name: config.device_name.clone(),
        };

        Ok(Self {
            charger,
            store,
            registry: Arc::new(registry),
            device,
            topics,
            polling_interval: Duration::from_secs(config.polling_interval_secs),
            telemetry_events: config.debug_sensors,
        })
    }

    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn registry(&self) -> &Arc<EntityRegistry<DeviceSnapshot>> {
        &self.registry
    }

    pub fn store(&self) -> &SharedStore<DeviceSnapshot> {
        &self.store
    }

    pub fn charger(&self) -> &Arc<Charger> {
        &self.charger
    }

    /// Announce the entities and start the workers on `runner`.
    ///
    /// Workers: command dispatcher, telemetry event pipeline (with debug
    /// sensors) and poll scheduler.
    pub async fn start<C: BridgeConfig>(self, runner: &mut BridgeRunner<C>) -> Result<()> {
        let publisher = runner.publisher();
        publish_discovery(&publisher, &self.registry, &self.device).await?;

        let commands = runner
            .transport()
            .subscribe(&self.topics.command_filter())
            .await?;
        let dispatcher = CommandDispatcher::new(Arc::clone(&self.registry));
        let shutdown = runner.shutdown_signal();
        runner.spawn(dispatcher.run(commands, self.topics.clone(), shutdown));

        if self.telemetry_events {
            let events = self
                .charger
                .source()
                .subscribe(TELEMETRY_CHANNEL)
                .await?;
            let pipeline = TelemetryEventPipeline::new(self.store.clone());
            let shutdown = runner.shutdown_signal();
            runner.spawn(pipeline.run(events, shutdown));
        }

        let refresher: Arc<dyn StateRefresher<DeviceSnapshot>> = self.charger;
        let scheduler = PollScheduler::new(
            self.registry,
            self.store,
            refresher,
            publisher,
            self.polling_interval,
        );
        let (shutdown, fatal) = (runner.shutdown_signal(), runner.fatal_sender());
        runner.spawn(scheduler.run(shutdown, fatal));

        tracing::info!(
            prefix = %self.topics.prefix(),
            device = %self.device.device_name,
            "Wallbox bridge started"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatedConfig;

    fn config(debug_sensors: bool) -> WallboxConfig {
        WallboxConfig {
            device_name: "Garage".to_string(),
            polling_interval_secs: 1,
            debug_sensors,
            power_boost_enabled: false,
            discovery_prefix: "homeassistant".to_string(),
            topic_prefix: None,
            source: SourceConfig::Simulated(SimulatedConfig::new("900123")),
        }
    }

    #[tokio::test]
    async fn test_prepare_reads_charger() {
        let config = config(true);
        let source = open_source(&config.source);

        let bridge = WallboxBridge::prepare(&config, source).await.unwrap();

        assert_eq!(bridge.topics().prefix(), "wallbox_900123");
        assert_eq!(bridge.device().device_id, "900123");
        assert_eq!(bridge.device().unique_id("lock"), "900123_lock");
        assert!(bridge.registry().get("control_pilot").is_some());

        let snapshot = bridge.store().snapshot();
        assert_eq!(snapshot.meter.charger_status, 1);
        assert_eq!(snapshot.telemetry.internal_meter_frequency, 50.0);
    }

    #[tokio::test]
    async fn test_prepare_fails_when_charger_unreadable() {
        let config = config(false);
        let source = Arc::new(SimulatedSource::new(SimulatedConfig::new("1")));
        source.fail_fetches(Some("database locked"));

        let result = WallboxBridge::prepare(&config, source).await;
        assert!(matches!(result, Err(BridgeError::Refresh(_))));
    }
}
