//! Charger status codes and their labels.
//!
//! Every mapping is exhaustive: codes the charger may add later map to an
//! `Unknown` variant whose label is `"Unknown"`.

use std::fmt;

/// Charger status reported by the meter (`tms.charger_status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChargerStatus {
    Ready,
    Charging,
    ConnectedWaitingCar,
    ConnectedWaitingSchedule,
    Paused,
    ScheduleEnd,
    Locked,
    Error,
    ConnectedWaitingCurrentAssignation,
    UnconfiguredPowerSharing,
    QueueByPowerBoost,
    Discharging,
    ConnectedWaitingAdminAuthForMid,
    ConnectedMidSafetyMarginExceeded,
    OcppUnavailable,
    OcppChargeFinishing,
    OcppReserved,
    Updating,
    QueueByEcoSmart,
    Unknown,
}

impl ChargerStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ChargerStatus::Ready,
            1 => ChargerStatus::Charging,
            2 => ChargerStatus::ConnectedWaitingCar,
            3 => ChargerStatus::ConnectedWaitingSchedule,
            4 => ChargerStatus::Paused,
            5 => ChargerStatus::ScheduleEnd,
            6 => ChargerStatus::Locked,
            7 => ChargerStatus::Error,
            8 => ChargerStatus::ConnectedWaitingCurrentAssignation,
            9 => ChargerStatus::UnconfiguredPowerSharing,
            10 => ChargerStatus::QueueByPowerBoost,
            11 => ChargerStatus::Discharging,
            12 => ChargerStatus::ConnectedWaitingAdminAuthForMid,
            13 => ChargerStatus::ConnectedMidSafetyMarginExceeded,
            14 => ChargerStatus::OcppUnavailable,
            15 => ChargerStatus::OcppChargeFinishing,
            16 => ChargerStatus::OcppReserved,
            17 => ChargerStatus::Updating,
            18 => ChargerStatus::QueueByEcoSmart,
            _ => ChargerStatus::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChargerStatus::Ready => "Ready",
            ChargerStatus::Charging => "Charging",
            ChargerStatus::ConnectedWaitingCar => "Connected waiting car",
            ChargerStatus::ConnectedWaitingSchedule => "Connected waiting schedule",
            ChargerStatus::Paused => "Paused",
            ChargerStatus::ScheduleEnd => "Schedule end",
            ChargerStatus::Locked => "Locked",
            ChargerStatus::Error => "Error",
            ChargerStatus::ConnectedWaitingCurrentAssignation => {
                "Connected waiting current assignation"
            }
            ChargerStatus::UnconfiguredPowerSharing => "Unconfigured power sharing",
            ChargerStatus::QueueByPowerBoost => "Queue by power boost",
            ChargerStatus::Discharging => "Discharging",
            ChargerStatus::ConnectedWaitingAdminAuthForMid => {
                "Connected waiting admin auth for mid"
            }
            ChargerStatus::ConnectedMidSafetyMarginExceeded => {
                "Connected mid safety margin exceeded"
            }
            ChargerStatus::OcppUnavailable => "OCPP unavailable",
            ChargerStatus::OcppChargeFinishing => "OCPP charge finishing",
            ChargerStatus::OcppReserved => "OCPP reserved",
            ChargerStatus::Updating => "Updating",
            ChargerStatus::QueueByEcoSmart => "Queue by eco smart",
            ChargerStatus::Unknown => "Unknown",
        }
    }

    /// Status implied by a session state, when the state machine knows better
    /// than the meter.
    pub fn from_session_state(session_state: i64) -> Option<Self> {
        match session_state {
            // Waiting for the car after plug-in.
            0xB1 | 0xB2 => Some(ChargerStatus::ConnectedWaitingCar),
            // Car asleep or paused by the user.
            0xB3 | 0xB4 | 0xB5 => Some(ChargerStatus::Paused),
            0xB6 => Some(ChargerStatus::ConnectedWaitingSchedule),
            0xC1 | 0xC2 => Some(ChargerStatus::Charging),
            _ => None,
        }
    }

    /// Status shown to users: the session override if any, else the meter status.
    pub fn effective(meter_status: i64, session_state: i64) -> Self {
        Self::from_session_state(session_state).unwrap_or_else(|| Self::from_code(meter_status))
    }
}

impl fmt::Display for ChargerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Control pilot signal state (`ctrlPilot`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlPilotState {
    Error,
    Failure,
    Ready1,
    Ready2,
    Connected1,
    Connected2,
    Charging1,
    Charging2,
    Unknown,
}

impl ControlPilotState {
    pub fn from_code(code: i64) -> Self {
        match code {
            0x0E => ControlPilotState::Error,
            0x0F => ControlPilotState::Failure,
            0xA1 => ControlPilotState::Ready1,
            0xA2 => ControlPilotState::Ready2,
            0xB1 => ControlPilotState::Connected1,
            0xB2 => ControlPilotState::Connected2,
            0xC1 => ControlPilotState::Charging1,
            0xC2 => ControlPilotState::Charging2,
            _ => ControlPilotState::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ControlPilotState::Error => "Error",
            ControlPilotState::Failure => "Failure",
            ControlPilotState::Ready1 => "Ready 1",
            ControlPilotState::Ready2 => "Ready 2",
            ControlPilotState::Connected1 => "Connected 1",
            ControlPilotState::Connected2 => "Connected 2",
            ControlPilotState::Charging1 => "Charging 1",
            ControlPilotState::Charging2 => "Charging 2",
            ControlPilotState::Unknown => "Unknown",
        }
    }
}

/// Charging session state machine state (`session.state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateMachineState {
    Error,
    Unviable,
    Ready,
    PluggedWaitingCar,
    Connected,
    CarSleeping,
    UserPaused,
    PausedByCar,
    WaitingSchedule,
    WaitingCurrent,
    Charging,
    ChargingLimited,
    Locked,
    Updating,
    Unknown,
}

impl StateMachineState {
    pub fn from_code(code: i64) -> Self {
        match code {
            0x0E | 0x0F => StateMachineState::Error,
            0xA6 => StateMachineState::Unviable,
            0xA1 => StateMachineState::Ready,
            0xB1 => StateMachineState::PluggedWaitingCar,
            0xB2 => StateMachineState::Connected,
            0xB3 => StateMachineState::CarSleeping,
            0xB4 => StateMachineState::UserPaused,
            0xB5 => StateMachineState::PausedByCar,
            0xB6 => StateMachineState::WaitingSchedule,
            0xB7 => StateMachineState::WaitingCurrent,
            0xC1 => StateMachineState::Charging,
            0xC2 => StateMachineState::ChargingLimited,
            0xD1 => StateMachineState::Locked,
            0xD2 => StateMachineState::Updating,
            _ => StateMachineState::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StateMachineState::Error => "Error",
            StateMachineState::Unviable => "Unviable",
            StateMachineState::Ready => "Ready",
            StateMachineState::PluggedWaitingCar => "Plugged, waiting car",
            StateMachineState::Connected => "Connected",
            StateMachineState::CarSleeping => "Car sleeping",
            StateMachineState::UserPaused => "Paused by user",
            StateMachineState::PausedByCar => "Paused by car",
            StateMachineState::WaitingSchedule => "Waiting schedule",
            StateMachineState::WaitingCurrent => "Waiting current",
            StateMachineState::Charging => "Charging",
            StateMachineState::ChargingLimited => "Charging, limited",
            StateMachineState::Locked => "Locked",
            StateMachineState::Updating => "Updating",
            StateMachineState::Unknown => "Unknown",
        }
    }
}

/// Render a code with its label, e.g. `"193: Charging 1"`.
pub fn describe(code: i64, label: &str) -> String {
    format!("{}: {}", code, label)
}
