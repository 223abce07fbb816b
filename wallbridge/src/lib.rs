//! Wallbox charger bridge.
//!
//! Reads a wallbox charger's configuration, state machine, meter and
//! telemetry, and exposes them as entities through the wallbridge framework.

pub mod bridge;
pub mod charger;
pub mod codes;
pub mod config;
pub mod entities;
pub mod events;
pub mod simulated;
pub mod source;
pub mod store;
