//! Periodic poll, diff and publish loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior};
use wallbridge_common::Value;

use crate::error::Result;
use crate::lifecycle::{FatalSender, Shutdown};
use crate::publisher::Publisher;
use crate::ratelimit::DeltaRateLimiter;
use crate::registry::EntityRegistry;
use crate::store::SharedStore;

/// Bulk refresh of the device state before each tick.
#[async_trait]
pub trait StateRefresher<S>: Send + Sync {
    /// Reload the state from the device. Errors are fatal for the bridge.
    async fn refresh(&self, store: &SharedStore<S>) -> Result<()>;
}

/// Outcome of one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Entities whose accessor was evaluated.
    pub evaluated: usize,
    /// Entities whose value matched the last published value.
    pub unchanged: usize,
    /// Changed values held back by a rate limiter.
    pub suppressed: usize,
    /// Values published.
    pub published: usize,
}

/// Publishes entity values on a fixed interval when they change.
///
/// Owns the last-published cache and every rate limiter; nothing else
/// touches them, so no locking is involved.
pub struct PollScheduler<S> {
    registry: Arc<EntityRegistry<S>>,
    store: SharedStore<S>,
    refresher: Arc<dyn StateRefresher<S>>,
    publisher: Publisher,
    interval: Duration,
    published: HashMap<String, String>,
    limiters: Vec<Option<DeltaRateLimiter>>,
}

impl<S: Send + Sync + 'static> PollScheduler<S> {
    pub fn new(
        registry: Arc<EntityRegistry<S>>,
        store: SharedStore<S>,
        refresher: Arc<dyn StateRefresher<S>>,
        publisher: Publisher,
        interval: Duration,
    ) -> Self {
        let limiters = registry
            .iter()
            .map(|entity| entity.rate_limit().map(|limit| limit.limiter()))
            .collect();

        Self {
            registry,
            store,
            refresher,
            publisher,
            interval,
            published: HashMap::new(),
            limiters,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Last value published for an entity.
    pub fn last_published(&self, entity_key: &str) -> Option<&str> {
        self.published.get(entity_key).map(String::as_str)
    }

    /// Run one refresh, evaluate and publish cycle now.
    pub async fn tick(&mut self) -> Result<TickReport> {
        self.tick_at(Instant::now()).await
    }

    /// Run one cycle, using `now` for rate limiting decisions.
    pub async fn tick_at(&mut self, now: Instant) -> Result<TickReport> {
        self.refresher.refresh(&self.store).await?;

        let registry = Arc::clone(&self.registry);
        let values: Vec<Value> = self
            .store
            .read(|state| registry.iter().map(|entity| entity.read(state)).collect());

        let mut report = TickReport::default();
        for ((entity, value), limiter) in registry
            .iter()
            .zip(values)
            .zip(self.limiters.iter_mut())
        {
            report.evaluated += 1;
            let rendered = value.render();

            if self.published.get(entity.key()) == Some(&rendered) {
                report.unchanged += 1;
                continue;
            }

            if let Some(limiter) = limiter {
                if !limiter.allow_at(value.as_f64(), now) {
                    tracing::trace!(entity = %entity.key(), value = %rendered, "Rate limited");
                    report.suppressed += 1;
                    continue;
                }
            }

            tracing::debug!(entity = %entity.key(), value = %rendered, "Publishing state");
            self.publisher.publish_state(entity.key(), &value).await?;
            self.published.insert(entity.key().to_string(), rendered);
            report.published += 1;
        }

        Ok(report)
    }

    /// Tick on the configured interval until shutdown.
    ///
    /// The first tick fires one interval after start. A failed tick is
    /// reported on `fatal` and stops the loop.
    pub async fn run(mut self, mut shutdown: Shutdown, fatal: FatalSender) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            entities = self.registry.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Poll scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => match self.tick().await {
                    Ok(report) => tracing::debug!(
                        evaluated = report.evaluated,
                        unchanged = report.unchanged,
                        suppressed = report.suppressed,
                        published = report.published,
                        "Poll tick"
                    ),
                    Err(e) => {
                        fatal.raise(e);
                        break;
                    }
                },
            }
        }

        tracing::info!("Poll scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ComponentKind, Entity};
    use crate::error::BridgeError;
    use crate::transport::LoopbackTransport;
    use parking_lot::Mutex;
    use wallbridge_common::TopicBuilder;

    #[derive(Debug, Default)]
    struct Meter {
        power: f64,
        status: i64,
    }

    /// Replays a script of power readings, one per refresh.
    struct Script {
        readings: Mutex<Vec<f64>>,
    }

    impl Script {
        fn new(readings: &[f64]) -> Arc<Self> {
            let mut readings = readings.to_vec();
            readings.reverse();
            Arc::new(Self {
                readings: Mutex::new(readings),
            })
        }
    }

    #[async_trait]
    impl StateRefresher<Meter> for Script {
        async fn refresh(&self, store: &SharedStore<Meter>) -> Result<()> {
            let next = self.readings.lock().pop();
            match next {
                Some(power) => {
                    store.update(|m| m.power = power);
                    Ok(())
                }
                None => Err(BridgeError::refresh("script exhausted")),
            }
        }
    }

    fn power(m: &Meter) -> Value {
        Value::from(m.power)
    }

    fn status(m: &Meter) -> Value {
        Value::from(m.status)
    }

    fn scheduler(
        readings: &[f64],
        transport: Arc<LoopbackTransport>,
    ) -> PollScheduler<Meter> {
        let registry = EntityRegistry::from_sets([vec![
            Entity::new("charging_power", ComponentKind::Sensor, power).rate_limited(10, 100.0),
            Entity::new("status", ComponentKind::Sensor, status),
        ]])
        .unwrap();

        PollScheduler::new(
            Arc::new(registry),
            SharedStore::default(),
            Script::new(readings),
            Publisher::new(transport, TopicBuilder::new("wallbox_1")),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_unchanged_value_published_once() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut scheduler = scheduler(&[0.0, 0.0, 0.0], transport.clone());

        let start = Instant::now();
        for t in 0..3 {
            scheduler
                .tick_at(start + Duration::from_secs(t))
                .await
                .unwrap();
        }

        assert_eq!(transport.payloads("wallbox_1/status/state"), vec!["0"]);
        assert_eq!(transport.payloads("wallbox_1/charging_power/state"), vec!["0"]);
    }

    #[tokio::test]
    async fn test_charging_power_scenario() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut scheduler = scheduler(&[0.0, 0.0, 250.0, 260.0], transport.clone());
        let start = Instant::now();

        let first = scheduler.tick_at(start).await.unwrap();
        assert_eq!(first.published, 2);

        let second = scheduler
            .tick_at(start + Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.published, 0);

        let third = scheduler
            .tick_at(start + Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(third.published, 1);

        let fourth = scheduler
            .tick_at(start + Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(
            fourth,
            TickReport {
                evaluated: 2,
                unchanged: 1,
                suppressed: 1,
                published: 0,
            }
        );

        assert_eq!(
            transport.payloads("wallbox_1/charging_power/state"),
            vec!["0", "250"]
        );
        // The suppressed value never reaches the cache
        assert_eq!(scheduler.last_published("charging_power"), Some("250"));
    }

    #[tokio::test]
    async fn test_suppressed_value_released_after_interval() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut scheduler = scheduler(&[0.0, 30.0, 30.0], transport.clone());
        let start = Instant::now();

        scheduler.tick_at(start).await.unwrap();
        let held = scheduler
            .tick_at(start + Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(held.suppressed, 1);

        let released = scheduler
            .tick_at(start + Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(released.published, 1);
        assert_eq!(
            transport.payloads("wallbox_1/charging_power/state"),
            vec!["0", "30"]
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_propagates() {
        let transport = Arc::new(LoopbackTransport::new());
        let mut scheduler = scheduler(&[], transport.clone());

        let err = scheduler.tick().await.unwrap_err();
        assert!(matches!(err, BridgeError::Refresh(_)));
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_propagates() {
        let transport = Arc::new(LoopbackTransport::new());
        transport.fail_publishes("broker gone");
        let mut scheduler = scheduler(&[1.0], transport);

        let err = scheduler.tick().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(scheduler.last_published("charging_power"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_fatal_and_stops() {
        let transport = Arc::new(LoopbackTransport::new());
        let scheduler = scheduler(&[5.0], transport.clone());
        let (trigger, shutdown) = crate::lifecycle::shutdown_channel();
        let (fatal, mut fatal_rx) = crate::lifecycle::fatal_channel();

        let task = tokio::spawn(scheduler.run(shutdown, fatal));

        // Second tick exhausts the script
        let err = fatal_rx.recv().await;
        assert!(matches!(err, BridgeError::Refresh(_)));
        task.await.unwrap();
        drop(trigger);

        assert_eq!(transport.payloads("wallbox_1/charging_power/state"), vec!["5"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let transport = Arc::new(LoopbackTransport::new());
        let scheduler = scheduler(&[1.0, 2.0, 3.0], transport.clone());
        let (trigger, shutdown) = crate::lifecycle::shutdown_channel();
        let (fatal, _fatal_rx) = crate::lifecycle::fatal_channel();

        let task = tokio::spawn(scheduler.run(shutdown, fatal));
        trigger.trigger();

        tokio_test::assert_ok!(task.await);
        assert!(transport.published().is_empty());
    }
}
