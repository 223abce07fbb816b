//! Entities exposed by the wallbox bridge.
//!
//! Entities come in feature-gated sets merged in a fixed order: base,
//! diagnostic, telemetry-event, power-boost. Metadata pairs are forwarded
//! verbatim to discovery.

use std::sync::Arc;

use wallbridge_framework::{ComponentKind, Entity, EntityRegistry, ReadFn, Result};

use crate::charger::{Charger, ChargerCommand, WriteAction};
use crate::config::WallboxConfig;
use crate::store::DeviceSnapshot;

type WallboxEntity = Entity<DeviceSnapshot>;

/// Which optional entity sets to expose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityFlags {
    /// Diagnostic and telemetry-event entities.
    pub debug_sensors: bool,
    /// Power Boost meter entities.
    pub power_boost_enabled: bool,
}

impl From<&WallboxConfig> for EntityFlags {
    fn from(config: &WallboxConfig) -> Self {
        Self {
            debug_sensors: config.debug_sensors,
            power_boost_enabled: config.power_boost_enabled,
        }
    }
}

/// Build the registry for a charger.
///
/// `available_current` caps the max charging current setting.
pub fn build_registry(
    charger: &Arc<Charger>,
    flags: EntityFlags,
    available_current: i64,
) -> Result<EntityRegistry<DeviceSnapshot>> {
    let mut sets = vec![base_entities(charger, available_current)];
    if flags.debug_sensors {
        sets.push(diagnostic_entities());
        sets.push(telemetry_event_entities());
    }
    if flags.power_boost_enabled {
        sets.push(power_boost_entities());
    }

    let registry = EntityRegistry::from_sets(sets)?;
    tracing::info!(
        entities = registry.len(),
        debug_sensors = flags.debug_sensors,
        power_boost = flags.power_boost_enabled,
        "Entity registry built"
    );
    Ok(registry)
}

fn entity(key: &str, kind: ComponentKind, read: ReadFn<DeviceSnapshot>) -> WallboxEntity {
    Entity::new(key, kind, read)
}

fn sensor(key: &str, name: &str, read: ReadFn<DeviceSnapshot>) -> WallboxEntity {
    entity(key, ComponentKind::Sensor, read).with_meta("name", name)
}

/// Add the metadata of a numeric measurement shown with one decimal.
fn measured(
    sensor: WallboxEntity,
    device_class: &str,
    unit: &str,
    state_class: &str,
) -> WallboxEntity {
    sensor
        .with_meta("device_class", device_class)
        .with_meta("unit_of_measurement", unit)
        .with_meta("state_class", state_class)
        .with_meta("suggested_display_precision", "1")
}

fn power(key: &str, name: &str, read: ReadFn<DeviceSnapshot>) -> WallboxEntity {
    measured(sensor(key, name, read), "power", "W", "measurement").rate_limited(10, 100.0)
}

fn current(key: &str, name: &str, read: ReadFn<DeviceSnapshot>) -> WallboxEntity {
    measured(sensor(key, name, read), "current", "A", "measurement")
}

fn voltage(key: &str, name: &str, read: ReadFn<DeviceSnapshot>) -> WallboxEntity {
    measured(sensor(key, name, read), "voltage", "V", "measurement")
}

fn energy(key: &str, name: &str, read: ReadFn<DeviceSnapshot>) -> WallboxEntity {
    measured(sensor(key, name, read), "energy", "Wh", "total_increasing")
}

fn temperature(key: &str, name: &str, read: ReadFn<DeviceSnapshot>) -> WallboxEntity {
    measured(sensor(key, name, read), "temperature", "°C", "measurement")
}

/// Entities every charger has.
pub fn base_entities(charger: &Arc<Charger>, available_current: i64) -> Vec<WallboxEntity> {
    vec![
        measured(
            sensor("added_energy", "Added energy", |s| s.state.schedule_energy.into()),
            "energy",
            "Wh",
            "total",
        )
        .rate_limited(10, 50.0),
        measured(
            sensor("added_range", "Added range", |s| s.config.added_range.into()),
            "distance",
            "km",
            "total",
        )
        .with_meta("icon", "mdi:map-marker-distance"),
        entity("cable_connected", ComponentKind::BinarySensor, |s| {
            s.cable_connected().into()
        })
        .with_meta("name", "Cable connected")
        .with_meta("payload_on", "1")
        .with_meta("payload_off", "0")
        .with_meta("icon", "mdi:ev-plug-type1")
        .with_meta("device_class", "plug"),
        entity("charging_enable", ComponentKind::Switch, |s| {
            s.config.charging_enable.into()
        })
        .writable(ChargerCommand::writer(charger, WriteAction::ChargingEnable))
        .with_meta("name", "Charging enable")
        .with_meta("payload_on", "1")
        .with_meta("payload_off", "0")
        .with_meta("icon", "mdi:ev-station"),
        power("charging_power", "Charging power", |s| s.charging_power().into()),
        power("charging_power_l1", "Charging power L1", |s| s.meter.line1_power.into()),
        power("charging_power_l2", "Charging power L2", |s| s.meter.line2_power.into()),
        power("charging_power_l3", "Charging power L3", |s| s.meter.line3_power.into()),
        current("charging_current_l1", "Charging current L1", |s| {
            s.meter.line1_current.into()
        })
        .rate_limited(10, 0.2),
        current("charging_current_l2", "Charging current L2", |s| {
            s.meter.line2_current.into()
        })
        .rate_limited(10, 0.2),
        current("charging_current_l3", "Charging current L3", |s| {
            s.meter.line3_current.into()
        })
        .rate_limited(10, 0.2),
        energy("cumulative_added_energy", "Cumulative added energy", |s| {
            s.config.cumulative_added_energy.into()
        }),
        entity("halo_brightness", ComponentKind::Number, |s| {
            s.config.halo_brightness.into()
        })
        .writable(ChargerCommand::writer(charger, WriteAction::HaloBrightness))
        .with_meta("name", "Halo Brightness")
        .with_meta("min", "0")
        .with_meta("max", "100")
        .with_meta("icon", "mdi:brightness-percent")
        .with_meta("unit_of_measurement", "%")
        .with_meta("entity_category", "config"),
        entity("lock", ComponentKind::Lock, |s| s.config.lock.into())
            .writable(ChargerCommand::writer(charger, WriteAction::Lock))
            .with_meta("name", "Lock")
            .with_meta("payload_lock", "1")
            .with_meta("payload_unlock", "0")
            .with_meta("state_locked", "1")
            .with_meta("state_unlocked", "0"),
        entity("max_charging_current", ComponentKind::Number, |s| {
            s.config.max_charging_current.into()
        })
        .writable(ChargerCommand::writer(charger, WriteAction::MaxChargingCurrent))
        .with_meta("name", "Max charging current")
        .with_meta("min", "6")
        .with_meta("max", available_current.to_string())
        .with_meta("unit_of_measurement", "A")
        .with_meta("device_class", "current"),
        sensor("status", "Status", |s| s.effective_status().label().into()),
        temperature("temp_l1", "Temperature Line 1", |s| s.meter.temp_l1.into()),
        temperature("temp_l2", "Temperature Line 2", |s| s.meter.temp_l2.into()),
        temperature("temp_l3", "Temperature Line 3", |s| s.meter.temp_l3.into()),
    ]
}

/// Raw state machine and meter codes.
pub fn diagnostic_entities() -> Vec<WallboxEntity> {
    vec![
        sensor("control_pilot", "Control pilot", |s| {
            s.control_pilot_status().into()
        }),
        sensor("m2w_status", "M2W Status", |s| s.meter.charger_status.into()),
        sensor("state_machine_state", "State machine", |s| {
            s.state_machine_state().into()
        }),
        sensor("s2_open", "S2 open", |s| s.state.s2_open.into()),
    ]
}

/// Sensors fed by the telemetry event stream.
pub fn telemetry_event_entities() -> Vec<WallboxEntity> {
    vec![
        current("icp_max_current", "ICP Max Current", |s| {
            s.telemetry.icp_max_current.into()
        }),
        current("internal_meter_current_l1", "Internal Meter Current L1", |s| {
            s.telemetry.internal_meter_current_l1.into()
        })
        .rate_limited(10, 0.2),
        current("internal_meter_current_l2", "Internal Meter Current L2", |s| {
            s.telemetry.internal_meter_current_l2.into()
        })
        .rate_limited(10, 0.2),
        current("internal_meter_current_l3", "Internal Meter Current L3", |s| {
            s.telemetry.internal_meter_current_l3.into()
        })
        .rate_limited(10, 0.2),
        current("user_current_proposal", "User Current Proposal", |s| {
            s.telemetry.user_current_proposal.into()
        }),
        voltage("internal_meter_voltage_l1", "Internal Meter Voltage L1", |s| {
            s.telemetry.internal_meter_voltage_l1.into()
        })
        .rate_limited(10, 2.0),
        voltage("internal_meter_voltage_l2", "Internal Meter Voltage L2", |s| {
            s.telemetry.internal_meter_voltage_l2.into()
        })
        .rate_limited(10, 2.0),
        voltage("internal_meter_voltage_l3", "Internal Meter Voltage L3", |s| {
            s.telemetry.internal_meter_voltage_l3.into()
        })
        .rate_limited(10, 2.0),
        // Reported in tenths of volts.
        voltage("control_pilot_high_voltage", "Control Pilot High Voltage", |s| {
            (s.telemetry.control_pilot_high_tenths / 10.0).into()
        }),
        voltage("control_pilot_low_voltage", "Control Pilot Low Voltage", |s| {
            (s.telemetry.control_pilot_low_tenths / 10.0).into()
        }),
        energy("internal_meter_energy", "Internal Meter Energy", |s| {
            s.telemetry.internal_meter_energy.into()
        }),
        energy("ecosmart_green_energy", "EcoSmart Green Energy", |s| {
            s.telemetry.ecosmart_green_energy.into()
        })
        .with_meta("icon", "mdi:leaf"),
        energy("ecosmart_energy_total", "EcoSmart Total Energy", |s| {
            s.telemetry.ecosmart_energy_total.into()
        }),
        sensor("ecosmart_mode", "EcoSmart Mode", |s| {
            s.telemetry.ecosmart_mode.into()
        })
        .with_meta("icon", "mdi:leaf"),
        sensor("ecosmart_status", "EcoSmart Status", |s| {
            s.telemetry.ecosmart_status.into()
        })
        .with_meta("icon", "mdi:leaf"),
        current("ecosmart_current_proposal", "EcoSmart Current Proposal", |s| {
            s.telemetry.ecosmart_current_proposal.into()
        })
        .with_meta("icon", "mdi:leaf"),
        measured(
            sensor("internal_meter_frequency", "Internal Meter Frequency", |s| {
                s.telemetry.internal_meter_frequency.into()
            }),
            "frequency",
            "Hz",
            "measurement",
        ),
        sensor("schedule_status", "Schedule Status", |s| {
            s.telemetry.schedule_status.into()
        })
        .with_meta("icon", "mdi:calendar-clock"),
        current("schedule_current_proposal", "Schedule Current Proposal", |s| {
            s.telemetry.schedule_current_proposal.into()
        })
        .with_meta("icon", "mdi:calendar-clock"),
        sensor("powerboost_status", "PowerBoost Status", |s| {
            s.telemetry.powerboost_status.into()
        }),
        current("powerboost_proposal_current", "PowerBoost Current Proposal", |s| {
            s.telemetry.powerboost_proposal_current.into()
        }),
    ]
}

/// Power Boost meter readings.
pub fn power_boost_entities() -> Vec<WallboxEntity> {
    vec![
        power("power_boost_power_l1", "Power Boost L1", |s| {
            s.meter.power_boost_line1_power.into()
        }),
        power("power_boost_power_l2", "Power Boost L2", |s| {
            s.meter.power_boost_line2_power.into()
        }),
        power("power_boost_power_l3", "Power Boost L3", |s| {
            s.meter.power_boost_line3_power.into()
        }),
        current("power_boost_current_l1", "Power Boost current L1", |s| {
            s.meter.power_boost_line1_current.into()
        })
        .rate_limited(10, 0.2),
        current("power_boost_current_l2", "Power Boost current L2", |s| {
            s.meter.power_boost_line2_current.into()
        })
        .rate_limited(10, 0.2),
        current("power_boost_current_l3", "Power Boost current L3", |s| {
            s.meter.power_boost_line3_current.into()
        })
        .rate_limited(10, 0.2),
        energy(
            "power_boost_cumulative_added_energy",
            "Power Boost Cumulative added energy",
            |s| s.meter.power_boost_cumulative_energy.into(),
        ),
    ]
}
