//! Simulated charger.
//!
//! Provides a deterministic, time-varying charger for demo mode and tests.
//! Readings follow smooth curves driven by a tick counter that advances on
//! every meter read. Queue events are interpreted the way the charger
//! firmware reacts to them, so write actions have visible effects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::SimulatedConfig;
use crate::source::{
    ChargerInfo, ConfigColumn, DataSource, LOGIN_QUEUE, STATE_MACHINE_QUEUE, SourceError,
    TELEMETRY_CHANNEL, decode_queue_message,
};
use crate::store::{ConfigRow, METER_HASH, STATE_HASH, TELEMETRY_FIELD_PREFIX, TELEMETRY_HASH};

const LINE_VOLTAGE: f64 = 230.0;
const ADMIN_USER_ID: i64 = 1;

// Session states used by the simulation.
const SESSION_READY: i64 = 0xA1;
const SESSION_USER_PAUSED: i64 = 0xB4;
const SESSION_CHARGING: i64 = 0xC1;
const SESSION_LOCKED: i64 = 0xD1;

/// A queue event received by the simulated charger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEvent {
    pub queue: String,
    pub event: String,
}

struct SimState {
    tick: u64,
    message_id: u64,
    row: ConfigRow,
    session_state: i64,
    control_pilot: i64,
    charger_status: i64,
    schedule_energy: f64,
    power_boost_energy: f64,
    /// Raw telemetry hash, keyed by sensor id.
    telemetry: HashMap<String, String>,
    /// Raw values forced by tests, keyed by (hash, field).
    overrides: HashMap<(String, String), String>,
    fetch_failure: Option<String>,
    queue_log: Vec<QueueEvent>,
    column_updates: Vec<(ConfigColumn, i64)>,
    subscribers: Vec<mpsc::Sender<String>>,
}

impl SimState {
    fn new(config: &SimulatedConfig) -> Self {
        let mut state = Self {
            tick: 0,
            message_id: 0,
            row: ConfigRow {
                lock: 0,
                charging_enable: i64::from(config.charging),
                max_charging_current: config.max_available_current,
                halo_brightness: 60,
                cumulative_added_energy: 0.0,
                added_range: 0.0,
            },
            session_state: SESSION_READY,
            control_pilot: 0xA1,
            charger_status: 0,
            schedule_energy: 0.0,
            power_boost_energy: 12_500.0,
            telemetry: HashMap::new(),
            overrides: HashMap::new(),
            fetch_failure: None,
            queue_log: Vec::new(),
            column_updates: Vec::new(),
            subscribers: Vec::new(),
        };
        state.settle();
        state.record_telemetry();
        state
    }

    fn charging(&self) -> bool {
        self.session_state == SESSION_CHARGING
    }

    /// Derive session, pilot and meter status from the configuration row.
    fn settle(&mut self) {
        let (session, pilot, status) = if self.row.lock == 1 {
            (SESSION_LOCKED, 0xA1, 6)
        } else if self.row.charging_enable == 1 {
            (SESSION_CHARGING, 0xC1, 1)
        } else {
            (SESSION_USER_PAUSED, 0xB1, 4)
        };
        self.session_state = session;
        self.control_pilot = pilot;
        self.charger_status = status;
    }

    /// Per-line current at the current tick.
    fn line_current(&self, line: u64) -> f64 {
        if !self.charging() {
            return 0.0;
        }
        let phase = self.tick as f64 * 0.3 + line as f64;
        let current = self.row.max_charging_current as f64 * (0.95 + 0.03 * phase.sin());
        (current * 10.0).round() / 10.0
    }

    fn line_power(&self, line: u64) -> f64 {
        (self.line_current(line) * LINE_VOLTAGE).round()
    }

    fn line_temp(&self, line: u64) -> f64 {
        let base = if self.charging() { 38.0 } else { 24.0 };
        let phase = self.tick as f64 * 0.05 + line as f64;
        ((base + 1.5 * phase.sin()) * 10.0).round() / 10.0
    }

    fn power_boost_power(&self, line: u64) -> f64 {
        let phase = self.tick as f64 * 0.1 + line as f64 * 2.0;
        (1200.0 + 400.0 * phase.sin()).round()
    }

    fn power_boost_current(&self, line: u64) -> f64 {
        (self.power_boost_power(line) / LINE_VOLTAGE * 10.0).round() / 10.0
    }

    /// Advance the simulation by one meter read.
    fn advance(&mut self) {
        self.tick += 1;
        let power: f64 = (1..=3).map(|line| self.line_power(line)).sum();
        // One tick is treated as one second of charging.
        self.schedule_energy += power / 3600.0;
        self.row.cumulative_added_energy += power / 3600.0;
        // Roughly 6 km of range per kWh.
        self.row.added_range = (self.schedule_energy / 1000.0 * 6.0 * 10.0).round() / 10.0;
        let boost: f64 = (1..=3).map(|line| self.power_boost_power(line)).sum();
        self.power_boost_energy += boost / 3600.0;
        self.record_telemetry();
    }

    /// Sensor readings that go out as telemetry events.
    fn telemetry_samples(&self) -> Vec<(&'static str, f64)> {
        let pilot_high = if self.charging() { 60.0 } else { 90.0 };
        vec![
            ("SENSOR_ICP_MAX_CURRENT", 40.0),
            ("SENSOR_INTERNAL_METER_CURRENT_L1", self.line_current(1)),
            ("SENSOR_INTERNAL_METER_CURRENT_L2", self.line_current(2)),
            ("SENSOR_INTERNAL_METER_CURRENT_L3", self.line_current(3)),
            ("SENSOR_MAX_AVAILABLE_CURRENT", self.row.max_charging_current as f64),
            ("SENSOR_USER_CURRENT_PROPOSAL", self.row.max_charging_current as f64),
            ("SENSOR_INTERNAL_METER_VOLTAGE_L1", 229.8),
            ("SENSOR_INTERNAL_METER_VOLTAGE_L2", 231.2),
            ("SENSOR_INTERNAL_METER_VOLTAGE_L3", 230.4),
            ("SENSOR_CONTROL_PILOT_HIGH_TENTHS_OF_VOLTS", pilot_high),
            ("SENSOR_CONTROL_PILOT_LOW_TENTHS_OF_VOLTS", -120.0),
            ("SENSOR_INTERNAL_METER_ENERGY", self.row.cumulative_added_energy.round()),
            ("SENSOR_INTERNAL_METER_FREQUENCY", 50.0),
            ("SENSOR_CHARGING_ENABLE", self.row.charging_enable as f64),
            ("SENSOR_TEMP_L1", self.line_temp(1)),
            ("SENSOR_TEMP_L2", self.line_temp(2)),
            ("SENSOR_TEMP_L3", self.line_temp(3)),
        ]
    }

    fn record_telemetry(&mut self) {
        for (sensor, value) in self.telemetry_samples() {
            self.telemetry.insert(sensor.to_string(), value.to_string());
        }
    }

    /// Raw value of one hash field, or `None` when absent.
    fn hash_field(&self, hash: &str, field: &str) -> Option<String> {
        if let Some(raw) = self.overrides.get(&(hash.to_string(), field.to_string())) {
            return Some(raw.clone());
        }

        match hash {
            STATE_HASH => match field {
                "session.state" => Some(self.session_state.to_string()),
                "ctrlPilot" => Some(self.control_pilot.to_string()),
                "S2open" => Some("0".to_string()),
                "scheduleEnergy" => Some(self.schedule_energy.round().to_string()),
                _ => None,
            },
            METER_HASH => self.meter_field(field).map(|v| v.to_string()),
            TELEMETRY_HASH => field
                .strip_prefix(TELEMETRY_FIELD_PREFIX)
                .and_then(|sensor| self.telemetry.get(sensor).cloned()),
            _ => None,
        }
    }

    fn meter_field(&self, field: &str) -> Option<f64> {
        let value = match field {
            "tms.charger_status" => self.charger_status as f64,
            "tms.line1.power_watt.value" => self.line_power(1),
            "tms.line2.power_watt.value" => self.line_power(2),
            "tms.line3.power_watt.value" => self.line_power(3),
            "tms.line1.current_amp.value" => self.line_current(1),
            "tms.line2.current_amp.value" => self.line_current(2),
            "tms.line3.current_amp.value" => self.line_current(3),
            "tms.line1.temp_deg.value" => self.line_temp(1),
            "tms.line2.temp_deg.value" => self.line_temp(2),
            "tms.line3.temp_deg.value" => self.line_temp(3),
            "PBO.line1.power.value" => self.power_boost_power(1),
            "PBO.line2.power.value" => self.power_boost_power(2),
            "PBO.line3.power.value" => self.power_boost_power(3),
            "PBO.line1.current.value" => self.power_boost_current(1),
            "PBO.line2.current.value" => self.power_boost_current(2),
            "PBO.line3.current.value" => self.power_boost_current(3),
            "PBO.energy_wh.value" => self.power_boost_energy.round(),
            _ => return None,
        };
        Some(value)
    }

    /// React to a queue event the way the charger firmware does.
    fn handle_event(&mut self, queue: &str, event: &str) {
        match (queue, event) {
            (LOGIN_QUEUE, "EVENT_REQUEST_LOCK") => self.row.lock = 1,
            (LOGIN_QUEUE, e) if e.starts_with("EVENT_REQUEST_LOGIN#") => self.row.lock = 0,
            (STATE_MACHINE_QUEUE, "EVENT_REQUEST_USER_ACTION#1.000000") => {
                self.row.charging_enable = 1
            }
            (STATE_MACHINE_QUEUE, "EVENT_REQUEST_USER_ACTION#2.000000") => {
                self.row.charging_enable = 0
            }
            _ => {
                tracing::warn!(queue = %queue, event = %event, "Simulated charger ignored event");
                return;
            }
        }
        self.settle();
    }

    fn next_envelope(&mut self) -> String {
        self.message_id += 1;
        let now = chrono::Utc::now().to_rfc3339();
        let sensors: Vec<_> = self
            .telemetry_samples()
            .into_iter()
            .map(|(id, value)| {
                json!({
                    "id": id,
                    "metadata": [],
                    "timestamp": now,
                    "value": value,
                })
            })
            .collect();

        json!({
            "header": {
                "message_id": self.message_id.to_string(),
                "source": "simulated",
                "timestamp": now,
            },
            "body": { "sensors": sensors },
        })
        .to_string()
    }
}

/// In-process charger implementing [`DataSource`].
pub struct SimulatedSource {
    config: SimulatedConfig,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedSource {
    pub fn new(config: SimulatedConfig) -> Self {
        let state = Arc::new(Mutex::new(SimState::new(&config)));
        Self { config, state }
    }

    /// Force the raw value of a hash field.
    pub fn set_raw(&self, hash: &str, field: &str, value: impl Into<String>) {
        self.state
            .lock()
            .overrides
            .insert((hash.to_string(), field.to_string()), value.into());
    }

    /// Make every fetch fail with `message`, or recover with `None`.
    pub fn fail_fetches(&self, message: Option<&str>) {
        self.state.lock().fetch_failure = message.map(str::to_string);
    }

    /// Queue events received so far.
    pub fn queue_events(&self) -> Vec<QueueEvent> {
        self.state.lock().queue_log.clone()
    }

    /// Column updates received so far.
    pub fn column_updates(&self) -> Vec<(ConfigColumn, i64)> {
        self.state.lock().column_updates.clone()
    }

    /// Deliver a raw payload to every telemetry subscriber.
    ///
    /// Returns the number of subscribers reached.
    pub fn publish_event(&self, payload: &str) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state
            .subscribers
            .iter()
            .filter(|tx| tx.try_send(payload.to_string()).is_ok())
            .count()
    }

    fn check_fetch(&self) -> Result<(), SourceError> {
        match &self.state.lock().fetch_failure {
            Some(message) => Err(SourceError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DataSource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn charger_info(&self) -> Result<ChargerInfo, SourceError> {
        Ok(ChargerInfo {
            serial_number: self.config.serial_number.clone(),
            charger_type: self.config.charger_type.clone(),
        })
    }

    async fn max_available_current(&self) -> Result<i64, SourceError> {
        Ok(self.config.max_available_current)
    }

    async fn last_user_id(&self) -> Result<String, SourceError> {
        if self.config.user_id == ADMIN_USER_ID {
            return Err(SourceError::query("last user", "no user besides the admin"));
        }
        Ok(self.config.user_id.to_string())
    }

    async fn fetch_config(&self) -> Result<ConfigRow, SourceError> {
        self.check_fetch()?;
        Ok(self.state.lock().row.clone())
    }

    async fn fetch_hash(
        &self,
        hash: &str,
        fields: &[&str],
    ) -> Result<Vec<Option<String>>, SourceError> {
        self.check_fetch()?;
        let mut state = self.state.lock();
        if hash == METER_HASH {
            state.advance();
        }
        Ok(fields
            .iter()
            .map(|field| state.hash_field(hash, field))
            .collect())
    }

    async fn update_config(&self, column: ConfigColumn, value: i64) -> Result<(), SourceError> {
        let mut state = self.state.lock();
        match column {
            ConfigColumn::Lock => {
                state.row.lock = value;
                state.settle();
            }
            ConfigColumn::MaxChargingCurrent => state.row.max_charging_current = value,
            ConfigColumn::HaloBrightness => state.row.halo_brightness = value,
        }
        state.column_updates.push((column, value));
        tracing::debug!(column = column.column_name(), value, "Simulated config updated");
        Ok(())
    }

    async fn send_queue_message(&self, queue: &str, message: Vec<u8>) -> Result<(), SourceError> {
        let event = decode_queue_message(&message);
        let mut state = self.state.lock();
        state.queue_log.push(QueueEvent {
            queue: queue.to_string(),
            event: event.clone(),
        });
        state.handle_event(queue, &event);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, SourceError> {
        if channel != TELEMETRY_CHANNEL {
            return Err(SourceError::Unavailable(format!(
                "no such channel: {}",
                channel
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        self.state.lock().subscribers.push(tx.clone());

        let state = Arc::clone(&self.state);
        let period = Duration::from_millis(self.config.event_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let envelope = state.lock().next_envelope();
                if tx.send(envelope).await.is_err() {
                    break;
                }
            }
            tracing::debug!("Simulated telemetry emitter stopped");
        });

        Ok(rx)
    }
}
