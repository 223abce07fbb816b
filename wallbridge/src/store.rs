//! Live charger state and the field tables used to fill it.
//!
//! Hash-backed groups (`state`, `m2w`, `telemetry`) are filled through static
//! tables mapping a hash field name to a typed setter. The telemetry table
//! doubles as the sensor id lookup of the event pipeline.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::codes::{ChargerStatus, ControlPilotState, StateMachineState, describe};
use crate::source::SourceError;

/// Hash holding the session state machine fields.
pub const STATE_HASH: &str = "state";
/// Hash holding meter readings.
pub const METER_HASH: &str = "m2w";
/// Hash holding the last telemetry sample of every sensor.
pub const TELEMETRY_HASH: &str = "telemetry";
/// Prefix of field names in the telemetry hash.
pub const TELEMETRY_FIELD_PREFIX: &str = "telemetry.";

/// Row of the relational charger configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigRow {
    pub lock: i64,
    pub charging_enable: i64,
    pub max_charging_current: i64,
    pub halo_brightness: i64,
    pub cumulative_added_energy: f64,
    pub added_range: f64,
}

/// Session state machine fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateHash {
    pub session_state: i64,
    pub control_pilot: i64,
    pub s2_open: i64,
    pub schedule_energy: f64,
}

/// Meter readings, including the Power Boost meter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterHash {
    pub charger_status: i64,
    pub line1_power: f64,
    pub line2_power: f64,
    pub line3_power: f64,
    pub line1_current: f64,
    pub line2_current: f64,
    pub line3_current: f64,
    pub power_boost_line1_power: f64,
    pub power_boost_line2_power: f64,
    pub power_boost_line3_power: f64,
    pub power_boost_line1_current: f64,
    pub power_boost_line2_current: f64,
    pub power_boost_line3_current: f64,
    pub power_boost_cumulative_energy: f64,
    pub temp_l1: f64,
    pub temp_l2: f64,
    pub temp_l3: f64,
}

/// Telemetry sensors, updated by the event stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryHash {
    pub icp_max_current: f64,
    pub internal_meter_current_l1: f64,
    pub internal_meter_current_l2: f64,
    pub internal_meter_current_l3: f64,
    pub max_available_current: f64,
    pub user_current_proposal: f64,
    pub dynamic_power_sharing_max_current: f64,
    pub internal_meter_voltage_l1: f64,
    pub internal_meter_voltage_l2: f64,
    pub internal_meter_voltage_l3: f64,
    pub internal_meter_voltage_filter_status: f64,
    pub control_pilot_high_tenths: f64,
    pub control_pilot_low_tenths: f64,
    pub internal_meter_energy: f64,
    pub ecosmart_green_energy: f64,
    pub ecosmart_energy_total: f64,
    pub ecosmart_mode: f64,
    pub ecosmart_status: f64,
    pub ecosmart_current_proposal: f64,
    pub internal_meter_frequency: f64,
    pub schedule_status: f64,
    pub schedule_current_proposal: f64,
    pub powerboost_status: f64,
    pub powerboost_proposal_current: f64,
    pub charging_enable: f64,
    pub control_pilot_duty: f64,
    pub control_pilot_status: f64,
    pub max_charging_current: f64,
    pub mid_status: f64,
    pub power_sharing_status: f64,
    pub temp_l1: f64,
    pub temp_l2: f64,
    pub temp_l3: f64,
    pub welding: f64,
    pub firmware_error: f64,
    pub power_relay_management_command: f64,
}

/// Everything the bridge knows about the charger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    pub config: ConfigRow,
    pub state: StateHash,
    pub meter: MeterHash,
    pub telemetry: TelemetryHash,
}

impl DeviceSnapshot {
    /// 1 when a cable is plugged in. Ready (0) and locked (6) mean unplugged.
    pub fn cable_connected(&self) -> i64 {
        match self.meter.charger_status {
            0 | 6 => 0,
            _ => 1,
        }
    }

    /// Total charging power over the three lines.
    pub fn charging_power(&self) -> f64 {
        self.meter.line1_power + self.meter.line2_power + self.meter.line3_power
    }

    pub fn effective_status(&self) -> ChargerStatus {
        ChargerStatus::effective(self.meter.charger_status, self.state.session_state)
    }

    pub fn control_pilot_status(&self) -> String {
        let code = self.state.control_pilot;
        describe(code, ControlPilotState::from_code(code).label())
    }

    pub fn state_machine_state(&self) -> String {
        let code = self.state.session_state;
        describe(code, StateMachineState::from_code(code).label())
    }
}

/// Typed setter of one field.
#[derive(Clone, Copy)]
pub enum Setter<T> {
    Int(fn(&mut T, i64)),
    Float(fn(&mut T, f64)),
}

/// A named hash field and how to store it.
pub struct FieldSpec<T> {
    name: &'static str,
    setter: Setter<T>,
}

impl<T> FieldSpec<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Parse `raw` and store it in `target`. On error `target` is untouched.
    pub fn apply(&self, target: &mut T, raw: &str) -> Result<(), SourceError> {
        let raw = raw.trim();
        match self.setter {
            Setter::Int(set) => {
                let value = raw
                    .parse::<i64>()
                    .map_err(|_| SourceError::field_scan(self.name, raw))?;
                set(target, value);
            }
            Setter::Float(set) => {
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| SourceError::field_scan(self.name, raw))?;
                set(target, value);
            }
        }
        Ok(())
    }
}

/// Names of the fields of a table, in table order.
pub fn field_names<T>(fields: &[FieldSpec<T>]) -> Vec<&'static str> {
    fields.iter().map(FieldSpec::name).collect()
}

/// Apply raw hash values positionally to `target`.
///
/// Missing values (`None`) leave their field unchanged. Every field that
/// parses is applied; the scan errors of the others are returned.
pub fn apply_fields<T>(
    fields: &[FieldSpec<T>],
    target: &mut T,
    values: &[Option<String>],
) -> Vec<SourceError> {
    let mut errors = Vec::new();
    for (field, raw) in fields.iter().zip(values) {
        if let Some(raw) = raw {
            if let Err(e) = field.apply(target, raw) {
                errors.push(e);
            }
        }
    }
    errors
}

macro_rules! field {
    ($target:ty, $name:literal, $field:ident: int) => {
        FieldSpec {
            name: $name,
            setter: Setter::Int(|t: &mut $target, v: i64| t.$field = v),
        }
    };
    ($target:ty, $name:literal, $field:ident: float) => {
        FieldSpec {
            name: $name,
            setter: Setter::Float(|t: &mut $target, v: f64| t.$field = v),
        }
    };
}

pub static STATE_FIELDS: Lazy<Vec<FieldSpec<StateHash>>> = Lazy::new(|| {
    vec![
        field!(StateHash, "session.state", session_state: int),
        field!(StateHash, "ctrlPilot", control_pilot: int),
        field!(StateHash, "S2open", s2_open: int),
        field!(StateHash, "scheduleEnergy", schedule_energy: float),
    ]
});

pub static METER_FIELDS: Lazy<Vec<FieldSpec<MeterHash>>> = Lazy::new(|| {
    vec![
        field!(MeterHash, "tms.charger_status", charger_status: int),
        field!(MeterHash, "tms.line1.power_watt.value", line1_power: float),
        field!(MeterHash, "tms.line2.power_watt.value", line2_power: float),
        field!(MeterHash, "tms.line3.power_watt.value", line3_power: float),
        field!(MeterHash, "tms.line1.current_amp.value", line1_current: float),
        field!(MeterHash, "tms.line2.current_amp.value", line2_current: float),
        field!(MeterHash, "tms.line3.current_amp.value", line3_current: float),
        field!(MeterHash, "PBO.line1.power.value", power_boost_line1_power: float),
        field!(MeterHash, "PBO.line2.power.value", power_boost_line2_power: float),
        field!(MeterHash, "PBO.line3.power.value", power_boost_line3_power: float),
        field!(MeterHash, "PBO.line1.current.value", power_boost_line1_current: float),
        field!(MeterHash, "PBO.line2.current.value", power_boost_line2_current: float),
        field!(MeterHash, "PBO.line3.current.value", power_boost_line3_current: float),
        field!(MeterHash, "PBO.energy_wh.value", power_boost_cumulative_energy: float),
        field!(MeterHash, "tms.line1.temp_deg.value", temp_l1: float),
        field!(MeterHash, "tms.line2.temp_deg.value", temp_l2: float),
        field!(MeterHash, "tms.line3.temp_deg.value", temp_l3: float),
    ]
});

pub static TELEMETRY_FIELDS: Lazy<Vec<FieldSpec<TelemetryHash>>> = Lazy::new(|| {
    vec![
        field!(TelemetryHash, "telemetry.SENSOR_ICP_MAX_CURRENT", icp_max_current: float),
        field!(TelemetryHash, "telemetry.SENSOR_INTERNAL_METER_CURRENT_L1", internal_meter_current_l1: float),
        field!(TelemetryHash, "telemetry.SENSOR_INTERNAL_METER_CURRENT_L2", internal_meter_current_l2: float),
        field!(TelemetryHash, "telemetry.SENSOR_INTERNAL_METER_CURRENT_L3", internal_meter_current_l3: float),
        field!(TelemetryHash, "telemetry.SENSOR_MAX_AVAILABLE_CURRENT", max_available_current: float),
        field!(TelemetryHash, "telemetry.SENSOR_USER_CURRENT_PROPOSAL", user_current_proposal: float),
        field!(TelemetryHash, "telemetry.SENSOR_DYNAMIC_POWER_SHARING_MAX_CURRENT", dynamic_power_sharing_max_current: float),
        field!(TelemetryHash, "telemetry.SENSOR_INTERNAL_METER_VOLTAGE_L1", internal_meter_voltage_l1: float),
        field!(TelemetryHash, "telemetry.SENSOR_INTERNAL_METER_VOLTAGE_L2", internal_meter_voltage_l2: float),
        field!(TelemetryHash, "telemetry.SENSOR_INTERNAL_METER_VOLTAGE_L3", internal_meter_voltage_l3: float),
        field!(TelemetryHash, "telemetry.SENSOR_INTERNAL_METER_VOLTAGE_FILTER_STATUS", internal_meter_voltage_filter_status: float),
        field!(TelemetryHash, "telemetry.SENSOR_CONTROL_PILOT_HIGH_TENTHS_OF_VOLTS", control_pilot_high_tenths: float),
        field!(TelemetryHash, "telemetry.SENSOR_CONTROL_PILOT_LOW_TENTHS_OF_VOLTS", control_pilot_low_tenths: float),
        field!(TelemetryHash, "telemetry.SENSOR_INTERNAL_METER_ENERGY", internal_meter_energy: float),
        field!(TelemetryHash, "telemetry.SENSOR_ECOSMART_GREEN_ENERGY", ecosmart_green_energy: float),
        field!(TelemetryHash, "telemetry.SENSOR_ECOSMART_ENERGY_TOTAL", ecosmart_energy_total: float),
        field!(TelemetryHash, "telemetry.SENSOR_ECOSMART_MODE", ecosmart_mode: float),
        field!(TelemetryHash, "telemetry.SENSOR_ECOSMART_STATUS", ecosmart_status: float),
        field!(TelemetryHash, "telemetry.SENSOR_ECOSMART_CURRENT_PROPOSAL", ecosmart_current_proposal: float),
        field!(TelemetryHash, "telemetry.SENSOR_INTERNAL_METER_FREQUENCY", internal_meter_frequency: float),
        field!(TelemetryHash, "telemetry.SENSOR_SCHEDULE_STATUS", schedule_status: float),
        field!(TelemetryHash, "telemetry.SENSOR_SCHEDULE_CURRENT_PROPOSAL", schedule_current_proposal: float),
        field!(TelemetryHash, "telemetry.SENSOR_DCA_POWERBOOST_STATUS", powerboost_status: float),
        field!(TelemetryHash, "telemetry.SENSOR_POWERBOOST_PROPOSAL_CURRENT", powerboost_proposal_current: float),
        field!(TelemetryHash, "telemetry.SENSOR_CHARGING_ENABLE", charging_enable: float),
        field!(TelemetryHash, "telemetry.SENSOR_CONTROL_PILOT_DUTY", control_pilot_duty: float),
        field!(TelemetryHash, "telemetry.SENSOR_CONTROL_PILOT_STATUS", control_pilot_status: float),
        field!(TelemetryHash, "telemetry.SENSOR_MAX_CHARGING_CURRENT", max_charging_current: float),
        field!(TelemetryHash, "telemetry.SENSOR_MID_STATUS", mid_status: float),
        field!(TelemetryHash, "telemetry.SENSOR_POWER_SHARING_STATUS", power_sharing_status: float),
        field!(TelemetryHash, "telemetry.SENSOR_TEMP_L1", temp_l1: float),
        field!(TelemetryHash, "telemetry.SENSOR_TEMP_L2", temp_l2: float),
        field!(TelemetryHash, "telemetry.SENSOR_TEMP_L3", temp_l3: float),
        field!(TelemetryHash, "telemetry.SENSOR_WELDING", welding: float),
        field!(TelemetryHash, "telemetry.SENSOR_FIRMWARE_ERROR", firmware_error: float),
        field!(TelemetryHash, "telemetry.SENSOR_POWER_RELAY_MANAGEMENT_COMMAND", power_relay_management_command: float),
    ]
});

/// Sensor id (`SENSOR_*`) to telemetry setter.
pub static TELEMETRY_SENSORS: Lazy<HashMap<&'static str, fn(&mut TelemetryHash, f64)>> =
    Lazy::new(|| {
        TELEMETRY_FIELDS
            .iter()
            .filter_map(|field| {
                let sensor_id = field.name.strip_prefix(TELEMETRY_FIELD_PREFIX)?;
                match field.setter {
                    Setter::Float(set) => Some((sensor_id, set)),
                    Setter::Int(_) => None,
                }
            })
            .collect()
    });

/// Store a telemetry sample by sensor id. Returns false for unknown ids.
pub fn set_telemetry(telemetry: &mut TelemetryHash, sensor_id: &str, value: f64) -> bool {
    match TELEMETRY_SENSORS.get(sensor_id) {
        Some(set) => {
            set(telemetry, value);
            true
        }
        None => false,
    }
}
