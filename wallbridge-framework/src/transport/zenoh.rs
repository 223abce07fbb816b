//! Zenoh transport.
//!
//! Topics are used as key expressions unchanged; subscription filters are
//! converted (`+` to `*`, `#` to `**`). Zenoh has no retained messages, so
//! the `retain` flag is ignored. The last will becomes a liveliness token on
//! the will topic: it disappears from the network when the bridge does.
//!
//! In client mode the session is watched for a reachable router; losing it
//! for several checks in a row is reported as [`BridgeError::ConnectionLost`].
//! Peers have no router to lose and are not watched.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use wallbridge_common::{ZenohConfig, to_key_expr};
use zenoh::Session;
use zenoh::liveliness::LivelinessToken;

use super::{INBOUND_CHANNEL_CAPACITY, InboundMessage, LastWill, Transport};
use crate::error::{BridgeError, Result};
use crate::lifecycle::FatalSender;

/// Interval between router checks in client mode.
const ROUTER_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Consecutive checks without a router before the link counts as lost.
const ROUTER_MISSES_ALLOWED: u32 = 3;

/// Zenoh session with a liveliness token standing in for the last will.
pub struct ZenohTransport {
    session: Session,
    token: Mutex<Option<LivelinessToken>>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
}

impl ZenohTransport {
    /// Open a session and declare the liveliness token.
    pub async fn connect(config: &ZenohConfig, will: LastWill, fatal: FatalSender) -> Result<Self> {
        let session = wallbridge_common::connect(config)
            .await
            .map_err(|e| BridgeError::BusConnection(e.to_string()))?;

        let transport = Self::with_session(session, will).await?;
        if config.mode == "client" {
            let watchdog = tokio::spawn(watch_routers(transport.session.clone(), fatal));
            transport.forwarders.lock().push(watchdog);
        }
        Ok(transport)
    }

    /// Wrap an already open session.
    pub async fn with_session(session: Session, will: LastWill) -> Result<Self> {
        let token = session
            .liveliness()
            .declare_token(&will.topic)
            .await
            .map_err(|e| {
                BridgeError::BusConnection(format!("failed to declare liveliness token: {}", e))
            })?;

        tracing::info!(key = %will.topic, "Liveliness token declared");

        Ok(Self {
            session,
            token: Mutex::new(Some(token)),
            forwarders: Mutex::new(Vec::new()),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// Counts consecutive router checks that found no router.
#[derive(Debug, Default)]
struct RouterWatch {
    misses: u32,
}

impl RouterWatch {
    /// Record one check. Returns true once the link counts as lost.
    fn observe(&mut self, routers: usize) -> bool {
        if routers > 0 {
            self.misses = 0;
            return false;
        }
        self.misses += 1;
        self.misses >= ROUTER_MISSES_ALLOWED
    }
}

async fn watch_routers(session: Session, fatal: FatalSender) {
    let start = tokio::time::Instant::now() + ROUTER_CHECK_INTERVAL;
    let mut ticker = tokio::time::interval_at(start, ROUTER_CHECK_INTERVAL);
    let mut watch = RouterWatch::default();

    loop {
        ticker.tick().await;
        let routers = session.info().routers_zid().await.count();
        if watch.observe(routers) {
            tracing::error!(checks = watch.misses, "No Zenoh router reachable");
            fatal.raise(BridgeError::ConnectionLost(
                "no Zenoh router reachable".to_string(),
            ));
            break;
        }
        if routers == 0 {
            tracing::warn!(misses = watch.misses, "Zenoh router not reachable");
        }
    }
}

#[async_trait]
impl Transport for ZenohTransport {
    fn name(&self) -> &'static str {
        "zenoh"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, _retain: bool) -> Result<()> {
        self.session
            .put(topic, payload)
            .await
            .map_err(|e| BridgeError::publish(topic, e.to_string()))
    }

    async fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<InboundMessage>> {
        let key_expr = to_key_expr(filter);
        let subscriber = self
            .session
            .declare_subscriber(&key_expr)
            .await
            .map_err(|e| BridgeError::Subscribe {
                filter: filter.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(key_expr = %key_expr, "Subscribed");

        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let forwarder = tokio::spawn(async move {
            while let Ok(sample) = subscriber.recv_async().await {
                let message = InboundMessage::new(
                    sample.key_expr().as_str(),
                    sample.payload().to_bytes().into_owned(),
                );
                if tx.send(message).await.is_err() {
                    break;
                }
            }
        });
        self.forwarders.lock().push(forwarder);

        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        for forwarder in self.forwarders.lock().drain(..) {
            forwarder.abort();
        }

        let token = self.token.lock().take();
        if let Some(token) = token {
            if let Err(e) = token.undeclare().await {
                tracing::warn!(error = %e, "Failed to undeclare liveliness token");
            }
        }

        self.session
            .close()
            .await
            .map_err(|e| BridgeError::ConnectionLost(format!("failed to close session: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_loss_needs_consecutive_misses() {
        let mut watch = RouterWatch::default();
        assert!(!watch.observe(0));
        assert!(!watch.observe(0));
        assert!(!watch.observe(1));
        assert!(!watch.observe(0));
        assert!(!watch.observe(0));
        assert!(watch.observe(0));
    }

    #[test]
    fn test_reachable_router_never_lost() {
        let mut watch = RouterWatch::default();
        assert!((0..10).all(|_| !watch.observe(2)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_publish_reaches_converted_filter() {
        let session = zenoh::open(zenoh::Config::default()).await.unwrap();
        let prefix = format!(
            "wallbox_zt_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );
        let will = LastWill::new(format!("{}/availability", prefix), "offline");
        let transport = ZenohTransport::with_session(session, will).await.unwrap();

        let mut rx = transport
            .subscribe(&format!("{}/+/set", prefix))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        transport
            .publish(&format!("{}/lock/set", prefix), b"1".to_vec(), true)
            .await
            .unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout")
            .expect("message");
        assert_eq!(message.topic, format!("{}/lock/set", prefix));
        assert_eq!(message.payload, b"1");

        transport.close().await.unwrap();
    }
}
