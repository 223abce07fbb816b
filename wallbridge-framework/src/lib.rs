//! wallbridge Bridge Framework
//!
//! Generic engine for bridging a polled device state model to a
//! publish/subscribe bus, one self-describing entity per attribute.
//!
//! # Overview
//!
//! This framework provides:
//! - [`Entity`] and [`EntityRegistry`] for describing what a device exposes
//! - [`PollScheduler`] for the refresh, diff, rate-limit and publish loop
//! - [`DeltaRateLimiter`] for suppressing noisy numeric updates
//! - [`CommandDispatcher`] for routing inbound commands to write accessors
//! - [`publish_discovery`] for dashboard auto-configuration
//! - [`Transport`] with MQTT, Zenoh and in-process backends
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (startup, shutdown, signal handling)
//! - [`BridgeArgs`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use wallbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner, PollScheduler};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse_with_default("mybridge.json5");
//!     let config = MyBridgeConfig::load(&args.config)?;
//!
//!     let mut runner = BridgeRunner::connect("mybridge", config, topics).await?;
//!
//!     let scheduler = PollScheduler::new(registry, store, refresher, runner.publisher(), interval);
//!     let (shutdown, fatal) = (runner.shutdown_signal(), runner.fatal_sender());
//!     runner.spawn(scheduler.run(shutdown, fatal));
//!
//!     // Run until Ctrl+C
//!     runner.run().await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod discovery;
mod dispatcher;
mod entity;
mod error;
mod lifecycle;
mod publisher;
mod ratelimit;
mod registry;
mod runner;
mod scheduler;
mod status;
mod store;
pub mod transport;

pub use args::BridgeArgs;
pub use config::{BridgeConfig, validate_bus};
pub use discovery::{DeviceInfo, discovery_payload, entity_discovery_topic, publish_discovery};
pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use entity::{ComponentKind, Entity, EntityWriter, ReadFn};
pub use error::{BridgeError, Result};
pub use lifecycle::{
    FatalReceiver, FatalSender, Shutdown, ShutdownTrigger, fatal_channel, shutdown_channel,
};
pub use publisher::Publisher;
pub use ratelimit::{DeltaRateLimiter, RateLimit};
pub use registry::EntityRegistry;
pub use runner::{BridgeRunner, DEFAULT_GRACE_PERIOD, init_logging};
pub use scheduler::{PollScheduler, StateRefresher, TickReport};
pub use status::{Availability, AvailabilityPublisher};
pub use store::SharedStore;
pub use transport::{InboundMessage, LastWill, LoopbackTransport, Transport};

// Re-export commonly used types from wallbridge-common
pub use wallbridge_common::{
    BusConfig, LoggingConfig, MqttConfig, TopicBuilder, Value, ZenohConfig,
};
