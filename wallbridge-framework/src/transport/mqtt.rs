//! MQTT transport backed by `rumqttc`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use wallbridge_common::{MqttConfig, topic_matches};

use super::{INBOUND_CHANNEL_CAPACITY, InboundMessage, LastWill, Transport};
use crate::error::{BridgeError, Result};
use crate::lifecycle::FatalSender;

/// Capacity of the client request queue.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// How long to wait for the broker to accept the connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type Subscribers = Arc<Mutex<Vec<(String, mpsc::Sender<InboundMessage>)>>>;

/// MQTT connection with a background event loop driver.
///
/// Any event loop error after the connection was established is reported as
/// [`BridgeError::ConnectionLost`]; the transport does not reconnect.
pub struct MqttTransport {
    client: AsyncClient,
    subscribers: Subscribers,
    closing: Arc<AtomicBool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Connect to the broker and wait for its acknowledgement.
    pub async fn connect(
        config: &MqttConfig,
        default_client_id: &str,
        will: LastWill,
        fatal: FatalSender,
    ) -> Result<Self> {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| default_client_id.to_string());

        let mut options = MqttOptions::new(client_id.clone(), &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_last_will(rumqttc::LastWill::new(
            will.topic,
            will.payload.into_bytes(),
            QoS::AtLeastOnce,
            true,
        ));
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.clone().unwrap_or_default());
        }

        tracing::info!(
            host = %config.host,
            port = config.port,
            client_id = %client_id,
            "Connecting to MQTT broker"
        );

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| {
                BridgeError::BusConnection(format!(
                    "no answer from {}:{} within {:?}",
                    config.host, config.port, CONNECT_TIMEOUT
                ))
            })??;

        tracing::info!(host = %config.host, "Connected to MQTT broker");

        let subscribers: Subscribers = Arc::default();
        let closing = Arc::new(AtomicBool::new(false));
        let driver = tokio::spawn(drive(
            eventloop,
            subscribers.clone(),
            closing.clone(),
            fatal,
        ));

        Ok(Self {
            client,
            subscribers,
            closing,
            driver: Mutex::new(Some(driver)),
        })
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(BridgeError::BusConnection(format!(
                        "broker refused connection: {:?}",
                        code
                    ))),
                };
            }
            Ok(_) => {}
            Err(e) => return Err(BridgeError::BusConnection(e.to_string())),
        }
    }
}

/// Hand a received message to every matching subscriber without waiting.
///
/// The event loop must keep polling to answer keepalives, so a subscriber
/// whose channel is full loses the message. Returns the number of deliveries.
fn route(subscribers: &Subscribers, message: InboundMessage) -> usize {
    let targets: Vec<mpsc::Sender<InboundMessage>> = subscribers
        .lock()
        .iter()
        .filter(|(filter, _)| topic_matches(filter, &message.topic))
        .map(|(_, tx)| tx.clone())
        .collect();

    let mut delivered = 0;
    for tx in targets {
        match tx.try_send(message.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(topic = %message.topic, "Subscriber is behind, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(topic = %message.topic, "Subscriber dropped");
            }
        }
    }
    delivered
}

/// Poll the event loop, route publishes to subscribers, report loss of the link.
async fn drive(
    mut eventloop: EventLoop,
    subscribers: Subscribers,
    closing: Arc<AtomicBool>,
    fatal: FatalSender,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                route(&subscribers, message);
            }
            Err(_) if closing.load(Ordering::Acquire) => {
                tracing::debug!("MQTT event loop stopped");
                break;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                fatal.raise(BridgeError::ConnectionLost(
                    "broker sent disconnect".to_string(),
                ));
                break;
            }
            Ok(_) => {}
            Err(e) => {
                fatal.raise(BridgeError::ConnectionLost(e.to_string()));
                break;
            }
        }
    }
    subscribers.lock().clear();
}

#[async_trait]
impl Transport for MqttTransport {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| BridgeError::publish(topic, e.to_string()))
    }

    async fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<InboundMessage>> {
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        self.subscribers.lock().push((filter.to_string(), tx));

        self.client
            .subscribe(filter, QoS::AtLeastOnce)
            .await
            .map_err(|e| BridgeError::Subscribe {
                filter: filter.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(filter = %filter, "Subscribed");
        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        self.closing.store(true, Ordering::Release);
        let result = self
            .client
            .disconnect()
            .await
            .map_err(|e| BridgeError::ConnectionLost(format!("disconnect failed: {}", e)));

        // Give the event loop a moment to flush the disconnect packet.
        tokio::time::sleep(Duration::from_millis(250)).await;
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
        self.subscribers.lock().clear();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscribers(entries: Vec<(&str, mpsc::Sender<InboundMessage>)>) -> Subscribers {
        Arc::new(Mutex::new(
            entries
                .into_iter()
                .map(|(filter, tx)| (filter.to_string(), tx))
                .collect(),
        ))
    }

    #[tokio::test]
    async fn test_route_to_matching_filters() {
        let (commands_tx, mut commands) = mpsc::channel(4);
        let (other_tx, mut other) = mpsc::channel(4);
        let subscribers = subscribers(vec![
            ("wallbox_1/+/set", commands_tx),
            ("wallbox_2/+/set", other_tx),
        ]);

        let delivered = route(&subscribers, InboundMessage::new("wallbox_1/lock/set", "1"));

        assert_eq!(delivered, 1);
        assert_eq!(commands.recv().await.unwrap().payload, b"1");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_route_never_waits_on_full_subscriber() {
        let (slow_tx, mut slow) = mpsc::channel(1);
        let (fast_tx, mut fast) = mpsc::channel(4);
        let subscribers = subscribers(vec![("wallbox_1/#", slow_tx), ("wallbox_1/+/set", fast_tx)]);

        assert_eq!(route(&subscribers, InboundMessage::new("wallbox_1/lock/set", "1")), 2);
        // The slow subscriber has not consumed anything yet
        assert_eq!(route(&subscribers, InboundMessage::new("wallbox_1/lock/set", "0")), 1);

        assert_eq!(slow.recv().await.unwrap().payload, b"1");
        assert!(slow.try_recv().is_err());
        assert_eq!(fast.recv().await.unwrap().payload, b"1");
        assert_eq!(fast.recv().await.unwrap().payload, b"0");
    }

    #[tokio::test]
    async fn test_route_skips_closed_subscriber() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let subscribers = subscribers(vec![("#", tx)]);

        assert_eq!(route(&subscribers, InboundMessage::new("a/b", "x")), 0);
    }
}
