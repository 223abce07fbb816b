//! Charger facade: bulk refresh and write actions.

use std::sync::Arc;

use async_trait::async_trait;
use wallbridge_common::parse_int_lenient;
use wallbridge_framework::{BridgeError, EntityWriter, SharedStore, StateRefresher};

use crate::source::{
    ChargerInfo, ConfigColumn, DataSource, LOGIN_QUEUE, STATE_MACHINE_QUEUE, SourceError,
    send_queue_event,
};
use crate::store::{
    DeviceSnapshot, METER_FIELDS, METER_HASH, STATE_FIELDS, STATE_HASH, TELEMETRY_FIELDS,
    TELEMETRY_HASH, apply_fields, field_names,
};

/// Charger type whose lock is a plain configuration column.
const COLUMN_LOCK_CHARGER: &str = "CPB1";

/// Outcome of the startup telemetry read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySeed {
    /// Fields stored.
    pub applied: usize,
    /// Fields present but unparsable.
    pub skipped: usize,
}

/// One charger and its data stores.
pub struct Charger {
    source: Arc<dyn DataSource>,
    info: ChargerInfo,
}

impl Charger {
    pub fn new(source: Arc<dyn DataSource>, info: ChargerInfo) -> Self {
        Self { source, info }
    }

    /// Read the charger identity and create the facade.
    pub async fn connect(source: Arc<dyn DataSource>) -> Result<Self, SourceError> {
        let info = source.charger_info().await?;
        tracing::info!(
            source = source.name(),
            serial = %info.serial_number,
            charger_type = %info.charger_type,
            "Connected to charger"
        );
        Ok(Self::new(source, info))
    }

    pub fn info(&self) -> &ChargerInfo {
        &self.info
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Reload the state hash, the meter hash and the configuration row.
    ///
    /// Absent hash fields keep their previous value. Any unparsable field
    /// fails the whole refresh, after the parsable ones have been stored.
    pub async fn load_snapshot(
        &self,
        store: &SharedStore<DeviceSnapshot>,
    ) -> Result<(), SourceError> {
        let state = self
            .source
            .fetch_hash(STATE_HASH, &field_names(&STATE_FIELDS))
            .await?;
        let meter = self
            .source
            .fetch_hash(METER_HASH, &field_names(&METER_FIELDS))
            .await?;
        let config = self.source.fetch_config().await?;

        let mut errors = store.update(|snapshot| {
            let mut errors = apply_fields(&STATE_FIELDS, &mut snapshot.state, &state);
            errors.extend(apply_fields(&METER_FIELDS, &mut snapshot.meter, &meter));
            snapshot.config = config;
            errors
        });

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.swap_remove(0))
        }
    }

    /// Read the whole telemetry hash once.
    ///
    /// Never fails: a failed read or an unparsable field is logged and skipped.
    pub async fn seed_telemetry(&self, store: &SharedStore<DeviceSnapshot>) -> TelemetrySeed {
        let names = field_names(&TELEMETRY_FIELDS);
        let values = match self.source.fetch_hash(TELEMETRY_HASH, &names).await {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read telemetry");
                return TelemetrySeed::default();
            }
        };

        let present = values.iter().filter(|v| v.is_some()).count();
        let errors = store.update(|snapshot| {
            apply_fields(&TELEMETRY_FIELDS, &mut snapshot.telemetry, &values)
        });
        for error in &errors {
            tracing::warn!(error = %error, "Skipping telemetry field");
        }

        let seed = TelemetrySeed {
            applied: present - errors.len(),
            skipped: errors.len(),
        };
        tracing::debug!(applied = seed.applied, skipped = seed.skipped, "Telemetry seeded");
        seed
    }

    /// Lock (1) or unlock (0) the charger.
    ///
    /// Returns false when the charger is already in the requested state.
    pub async fn set_locked(&self, lock: i64) -> Result<bool, SourceError> {
        let current = self.source.fetch_config().await?;
        if current.lock == lock {
            return Ok(false);
        }

        if self.info.charger_type == COLUMN_LOCK_CHARGER {
            self.source.update_config(ConfigColumn::Lock, lock).await?;
        } else if lock == 1 {
            send_queue_event(&*self.source, LOGIN_QUEUE, "EVENT_REQUEST_LOCK").await?;
        } else {
            let user_id = self.source.last_user_id().await?;
            let event = format!("EVENT_REQUEST_LOGIN#{}.000000", user_id);
            send_queue_event(&*self.source, LOGIN_QUEUE, &event).await?;
        }
        Ok(true)
    }

    /// Resume (1) or pause (anything else) charging.
    ///
    /// Returns false when the charger is already in the requested state.
    pub async fn set_charging_enable(&self, enable: i64) -> Result<bool, SourceError> {
        let current = self.source.fetch_config().await?;
        if current.charging_enable == enable {
            return Ok(false);
        }

        let event = match enable {
            1 => "EVENT_REQUEST_USER_ACTION#1.000000",
            _ => "EVENT_REQUEST_USER_ACTION#2.000000",
        };
        send_queue_event(&*self.source, STATE_MACHINE_QUEUE, event).await?;
        Ok(true)
    }

    pub async fn set_max_charging_current(&self, current: i64) -> Result<(), SourceError> {
        self.source
            .update_config(ConfigColumn::MaxChargingCurrent, current)
            .await
    }

    pub async fn set_halo_brightness(&self, brightness: i64) -> Result<(), SourceError> {
        self.source
            .update_config(ConfigColumn::HaloBrightness, brightness)
            .await
    }
}

#[async_trait]
impl StateRefresher<DeviceSnapshot> for Charger {
    async fn refresh(
        &self,
        store: &SharedStore<DeviceSnapshot>,
    ) -> wallbridge_framework::Result<()> {
        self.load_snapshot(store)
            .await
            .map_err(|e| BridgeError::refresh(e.to_string()))
    }
}

/// Writable attributes of the charger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Lock,
    ChargingEnable,
    MaxChargingCurrent,
    HaloBrightness,
}

impl WriteAction {
    pub fn entity_key(&self) -> &'static str {
        match self {
            WriteAction::Lock => "lock",
            WriteAction::ChargingEnable => "charging_enable",
            WriteAction::MaxChargingCurrent => "max_charging_current",
            WriteAction::HaloBrightness => "halo_brightness",
        }
    }
}

/// Write accessor forwarding a command payload to the charger.
///
/// Payloads are integers; anything else counts as 0.
pub struct ChargerCommand {
    charger: Arc<Charger>,
    action: WriteAction,
}

impl ChargerCommand {
    pub fn new(charger: Arc<Charger>, action: WriteAction) -> Self {
        Self { charger, action }
    }

    /// Shorthand for registering on an entity.
    pub fn writer(charger: &Arc<Charger>, action: WriteAction) -> Arc<dyn EntityWriter> {
        Arc::new(Self::new(Arc::clone(charger), action))
    }

    pub fn action(&self) -> WriteAction {
        self.action
    }
}

#[async_trait]
impl EntityWriter for ChargerCommand {
    async fn write(&self, payload: &str) -> wallbridge_framework::Result<()> {
        let value = parse_int_lenient(payload);
        let result = match self.action {
            WriteAction::Lock => self.charger.set_locked(value).await.map(|_| ()),
            WriteAction::ChargingEnable => {
                self.charger.set_charging_enable(value).await.map(|_| ())
            }
            WriteAction::MaxChargingCurrent => self.charger.set_max_charging_current(value).await,
            WriteAction::HaloBrightness => self.charger.set_halo_brightness(value).await,
        };
        result.map_err(|e| BridgeError::write(self.action.entity_key(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatedConfig;
    use crate::simulated::{QueueEvent, SimulatedSource};

    fn charger_with(charger_type: &str) -> (Arc<SimulatedSource>, Arc<Charger>) {
        let mut config = SimulatedConfig::new("900123");
        config.charger_type = charger_type.to_string();
        config.user_id = 7;
        let source = Arc::new(SimulatedSource::new(config));
        let info = ChargerInfo {
            serial_number: "900123".to_string(),
            charger_type: charger_type.to_string(),
        };
        let charger = Arc::new(Charger::new(source.clone(), info));
        (source, charger)
    }

    fn event(queue: &str, event: &str) -> QueueEvent {
        QueueEvent {
            queue: queue.to_string(),
            event: event.to_string(),
        }
    }

    #[tokio::test]
    async fn test_load_snapshot() {
        let (_, charger) = charger_with("PLP1");
        let store = SharedStore::new(DeviceSnapshot::default());

        charger.load_snapshot(&store).await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.meter.charger_status, 1);
        assert_eq!(snapshot.state.session_state, 0xC1);
        assert_eq!(snapshot.config.charging_enable, 1);
        assert!(snapshot.charging_power() > 0.0);
    }

    #[tokio::test]
    async fn test_bad_field_fails_refresh() {
        let (source, charger) = charger_with("PLP1");
        source.set_raw(METER_HASH, "tms.charger_status", "charging");
        let store = SharedStore::new(DeviceSnapshot::default());

        let err = charger.load_snapshot(&store).await.unwrap_err();
        assert!(matches!(err, SourceError::FieldScan { .. }));

        let err = StateRefresher::refresh(&*charger, &store).await.unwrap_err();
        assert!(matches!(err, BridgeError::Refresh(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_seed_skips_bad_fields() {
        let (source, charger) = charger_with("PLP1");
        source.set_raw(TELEMETRY_HASH, "telemetry.SENSOR_WELDING", "n/a");
        let store = SharedStore::new(DeviceSnapshot::default());

        let seed = charger.seed_telemetry(&store).await;

        assert_eq!(seed.skipped, 1);
        assert!(seed.applied > 0);
        let telemetry = store.snapshot().telemetry;
        assert_eq!(telemetry.internal_meter_voltage_l1, 229.8);
        assert_eq!(telemetry.welding, 0.0);
    }

    #[tokio::test]
    async fn test_seed_survives_read_failure() {
        let (source, charger) = charger_with("PLP1");
        source.fail_fetches(Some("down"));
        let store = SharedStore::new(DeviceSnapshot::default());

        assert_eq!(charger.seed_telemetry(&store).await, TelemetrySeed::default());
    }

    #[tokio::test]
    async fn test_lock_sends_queue_events() {
        let (source, charger) = charger_with("PLP1");

        assert!(charger.set_locked(1).await.unwrap());
        assert!(!charger.set_locked(1).await.unwrap());
        assert!(charger.set_locked(0).await.unwrap());

        assert_eq!(
            source.queue_events(),
            vec![
                event(LOGIN_QUEUE, "EVENT_REQUEST_LOCK"),
                event(LOGIN_QUEUE, "EVENT_REQUEST_LOGIN#7.000000"),
            ]
        );
        assert!(source.column_updates().is_empty());
    }

    #[tokio::test]
    async fn test_column_lock_charger() {
        let (source, charger) = charger_with("CPB1");

        assert!(charger.set_locked(1).await.unwrap());

        assert!(source.queue_events().is_empty());
        assert_eq!(source.column_updates(), vec![(ConfigColumn::Lock, 1)]);
    }

    #[tokio::test]
    async fn test_charging_enable_events() {
        let (source, charger) = charger_with("PLP1");

        // Already charging.
        assert!(!charger.set_charging_enable(1).await.unwrap());
        assert!(charger.set_charging_enable(0).await.unwrap());
        assert!(charger.set_charging_enable(1).await.unwrap());

        assert_eq!(
            source.queue_events(),
            vec![
                event(STATE_MACHINE_QUEUE, "EVENT_REQUEST_USER_ACTION#2.000000"),
                event(STATE_MACHINE_QUEUE, "EVENT_REQUEST_USER_ACTION#1.000000"),
            ]
        );
    }

    #[tokio::test]
    async fn test_command_payload_coercion() {
        let (source, charger) = charger_with("PLP1");

        let brightness = ChargerCommand::new(charger.clone(), WriteAction::HaloBrightness);
        brightness.write("75").await.unwrap();
        brightness.write("bright").await.unwrap();

        let current = ChargerCommand::writer(&charger, WriteAction::MaxChargingCurrent);
        current.write("16").await.unwrap();

        assert_eq!(
            source.column_updates(),
            vec![
                (ConfigColumn::HaloBrightness, 75),
                (ConfigColumn::HaloBrightness, 0),
                (ConfigColumn::MaxChargingCurrent, 16),
            ]
        );
    }

    #[tokio::test]
    async fn test_write_failure_names_entity() {
        let mut config = SimulatedConfig::new("1");
        config.user_id = 1;
        let source = Arc::new(SimulatedSource::new(config));
        let info = source.charger_info().await.unwrap();
        let charger = Arc::new(Charger::new(source.clone(), info));

        let lock = ChargerCommand::new(charger.clone(), WriteAction::Lock);
        lock.write("1").await.unwrap();
        // Unlocking needs a non-admin user.
        let err = lock.write("0").await.unwrap_err();
        assert!(matches!(err, BridgeError::Write { ref entity, .. } if entity == "lock"));
    }
}
