//! In-process transport that records publishes and routes injected messages.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use wallbridge_common::topic_matches;

use super::{INBOUND_CHANNEL_CAPACITY, InboundMessage, Transport};
use crate::error::{BridgeError, Result};

/// A publish seen by the loopback transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

/// Transport that never leaves the process.
///
/// Publishes are recorded and also delivered to matching subscribers, so a
/// bridge can be driven end to end without a broker.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    published: Mutex<Vec<PublishedMessage>>,
    subscribers: Mutex<Vec<(String, mpsc::Sender<InboundMessage>)>>,
    fail_publish: Mutex<Option<String>>,
    closed: Mutex<bool>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    /// Payloads published to one topic, oldest first.
    pub fn payloads(&self, topic: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    /// Forget recorded publishes.
    pub fn clear(&self) {
        self.published.lock().clear();
    }

    /// Make every following publish fail with `message`.
    pub fn fail_publishes(&self, message: impl Into<String>) {
        *self.fail_publish.lock() = Some(message.into());
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Deliver a message to every matching subscriber.
    ///
    /// Returns how many subscribers received it.
    pub async fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>) -> usize {
        let message = InboundMessage::new(topic, payload);
        let targets: Vec<mpsc::Sender<InboundMessage>> = self
            .subscribers
            .lock()
            .iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, tx)| tx.clone())
            .collect();

        let mut delivered = 0;
        for tx in targets {
            if tx.send(message.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn name(&self) -> &'static str {
        "loopback"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        if let Some(message) = self.fail_publish.lock().clone() {
            return Err(BridgeError::publish(topic, message));
        }

        self.published.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(&payload).into_owned(),
            retain,
        });
        self.inject(topic, payload).await;
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<InboundMessage>> {
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        self.subscribers.lock().push((filter.to_string(), tx));
        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock() = true;
        self.subscribers.lock().clear();
        Ok(())
    }
}
