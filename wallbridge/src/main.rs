//! Wallbox bridge.
//!
//! Exposes a wallbox charger as self-describing entities on MQTT or Zenoh,
//! announces them for Home Assistant discovery and forwards commands back
//! to the charger.

use anyhow::{Context, Result};
use wallbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner, init_logging};

use wallbridge::bridge::{BRIDGE_NAME, WallboxBridge, open_source};
use wallbridge::config::WallboxBridgeConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = BridgeArgs::parse_with_default("wallbridge.json5");

    // Load configuration using the framework's BridgeConfig trait
    let config = WallboxBridgeConfig::load(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;
    init_logging(&config, Some(&args)).map_err(|e| anyhow::anyhow!("{}", e))?;

    // Read the charger before touching the bus
    let source = open_source(&config.wallbox.source);
    let bridge = WallboxBridge::prepare(&config.wallbox, source)
        .await
        .context("Failed to read the charger")?;

    let mut runner = BridgeRunner::connect(BRIDGE_NAME, config, bridge.topics().clone())
        .await
        .context("Failed to connect to the bus")?;

    bridge
        .start(&mut runner)
        .await
        .context("Failed to start the bridge")?;

    // Run until Ctrl+C, SIGTERM or a fatal error
    runner.run().await.context("Bridge stopped")
}
