//! Bridge runner for lifecycle management.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinHandle;

use wallbridge_common::{BusConfig, LoggingConfig, TopicBuilder, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::lifecycle::{
    FatalReceiver, FatalSender, Shutdown, ShutdownTrigger, fatal_channel, shutdown_channel,
};
use crate::publisher::Publisher;
use crate::status::AvailabilityPublisher;
use crate::transport::{MqttTransport, Transport, ZenohTransport};

/// Default time tasks get to finish after shutdown is signalled.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Initialize logging from the configuration, with an optional CLI override
/// of the level.
pub fn init_logging<C: BridgeConfig>(config: &C, args: Option<&BridgeArgs>) -> Result<()> {
    let log_config = match args.and_then(|a| a.log_level.as_ref()) {
        Some(level) => LoggingConfig {
            level: level.clone(),
            ..config.logging().clone()
        },
        None => config.logging().clone(),
    };

    init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))
}

/// Bridge runner that manages the lifecycle of a device bridge.
///
/// Handles:
/// - Bus connection with an `offline` last will
/// - Task spawning and management
/// - Availability publishing
/// - Graceful shutdown on Ctrl+C, SIGTERM or a fatal task error
///
/// # Example
///
/// ```ignore
/// use wallbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner, init_logging};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse_with_default("mybridge.json5");
///     let config = MyBridgeConfig::load(&args.config)?;
///     init_logging(&config, Some(&args))?;
///
///     let mut runner =
///         BridgeRunner::connect("mybridge", config, TopicBuilder::new("device_1")).await?;
///
///     let shutdown = runner.shutdown_signal();
///     runner.spawn(my_worker(runner.publisher(), shutdown));
///
///     runner.run().await?;
///     Ok(())
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging.
    name: String,
    /// Bridge version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Bus connection.
    transport: Arc<dyn Transport>,
    /// Publisher bound to the device topics.
    publisher: Publisher,
    /// Availability publisher.
    availability: AvailabilityPublisher,
    /// Spawned tasks.
    tasks: Vec<JoinHandle<()>>,
    shutdown: ShutdownTrigger,
    fatal_tx: FatalSender,
    fatal_rx: FatalReceiver,
    grace_period: Duration,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Connect to the configured bus and create the runner.
    ///
    /// The availability topic of `topics` is registered as last will.
    pub async fn connect(name: impl Into<String>, config: C, topics: TopicBuilder) -> Result<Self> {
        let name = name.into();
        let (fatal_tx, fatal_rx) = fatal_channel();
        let will = AvailabilityPublisher::last_will(&topics);

        tracing::info!(
            bridge = %name,
            version = env!("CARGO_PKG_VERSION"),
            prefix = %topics.prefix(),
            "Starting bridge"
        );

        let transport: Arc<dyn Transport> = match config.bus() {
            BusConfig::Mqtt(mqtt) => {
                let client_id = format!("{}-{}", name, topics.prefix());
                Arc::new(MqttTransport::connect(mqtt, &client_id, will, fatal_tx.clone()).await?)
            }
            BusConfig::Zenoh(zenoh) => {
                Arc::new(ZenohTransport::connect(zenoh, will, fatal_tx.clone()).await?)
            }
        };

        Ok(Self::assemble(
            name, config, transport, topics, fatal_tx, fatal_rx,
        ))
    }

    /// Create a runner over an existing transport.
    pub fn with_transport(
        name: impl Into<String>,
        config: C,
        transport: Arc<dyn Transport>,
        topics: TopicBuilder,
    ) -> Self {
        let (fatal_tx, fatal_rx) = fatal_channel();
        Self::assemble(name.into(), config, transport, topics, fatal_tx, fatal_rx)
    }

    fn assemble(
        name: String,
        config: C,
        transport: Arc<dyn Transport>,
        topics: TopicBuilder,
        fatal_tx: FatalSender,
        fatal_rx: FatalReceiver,
    ) -> Self {
        let publisher = Publisher::new(transport.clone(), topics);
        let availability = AvailabilityPublisher::new(publisher.clone());
        let (shutdown, _) = shutdown_channel();

        Self {
            name,
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            transport,
            publisher,
            availability,
            tasks: Vec::new(),
            shutdown,
            fatal_tx,
            fatal_rx,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Set how long tasks may take to stop before they are aborted.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Get the bridge name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Get the bus transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Get a clone of the publisher.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Topic layout of the bridged device.
    pub fn topics(&self) -> &TopicBuilder {
        self.publisher.topics()
    }

    /// A new observer of the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.subscribe()
    }

    /// A handle for reporting fatal errors.
    pub fn fatal_sender(&self) -> FatalSender {
        self.fatal_tx.clone()
    }

    /// Spawn a worker task.
    ///
    /// The task gets the grace period to stop after shutdown, then is aborted.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.push(handle);
    }

    /// Run the bridge until Ctrl+C, SIGTERM or a fatal error.
    ///
    /// This will:
    /// 1. Publish `online`
    /// 2. Wait for a stop condition
    /// 3. Signal shutdown and give tasks the grace period
    /// 4. Abort remaining tasks
    /// 5. Publish `offline`
    /// 6. Close the transport
    ///
    /// Returns the fatal error if one ended the bridge.
    pub async fn run(self) -> Result<()> {
        let Self {
            name,
            transport,
            availability,
            tasks,
            shutdown,
            fatal_tx,
            mut fatal_rx,
            grace_period,
            ..
        } = self;
        drop(fatal_tx);

        let fatal = match availability.publish_online().await {
            Ok(()) => {
                tracing::info!(
                    bridge = %name,
                    tasks = tasks.len(),
                    transport = transport.name(),
                    "Bridge running. Press Ctrl+C to stop."
                );
                wait_for_stop(&mut fatal_rx).await
            }
            Err(e) => Some(e),
        };

        tracing::info!(bridge = %name, "Shutting down");
        shutdown.trigger();
        stop_tasks(tasks, grace_period).await;

        if let Err(e) = availability.publish_offline().await {
            tracing::warn!(error = %e, "Failed to publish offline status");
        }

        if let Err(e) = transport.close().await {
            tracing::warn!(error = %e, "Error closing bus connection");
        }

        tracing::info!(bridge = %name, "Goodbye!");

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Wait for Ctrl+C, SIGTERM or a fatal error. Returns the fatal error if any.
async fn wait_for_stop(fatal_rx: &mut FatalReceiver) -> Option<BridgeError> {
    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
            tracing::info!("Received Ctrl+C");
            None
        }
        _ = terminate() => {
            tracing::info!("Received SIGTERM");
            None
        }
        err = fatal_rx.recv() => Some(err),
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Wait for tasks up to a shared deadline, then abort the rest.
async fn stop_tasks(tasks: Vec<JoinHandle<()>>, grace_period: Duration) {
    let deadline = tokio::time::Instant::now() + grace_period;
    let mut aborted = 0;

    for mut task in tasks {
        if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
            task.abort();
            aborted += 1;
        }
    }

    if aborted > 0 {
        tracing::warn!(aborted, "Tasks did not stop within the grace period");
    }
}
