//! Bus transports.
//!
//! A [`Transport`] carries state, discovery and availability messages out and
//! command messages in. Topics are MQTT-shaped (`a/b/c`, filters with `+` and
//! `#`); backends map them onto their own addressing.

mod loopback;
mod mqtt;
mod zenoh;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

pub use self::loopback::{LoopbackTransport, PublishedMessage};
pub use self::mqtt::MqttTransport;
pub use self::zenoh::ZenohTransport;

/// Capacity of per-subscription inbound channels.
pub const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// A message received on a subscribed filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Message the bus announces on the bridge's behalf when it disappears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: String,
}

impl LastWill {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// A publish/subscribe bus connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Publish a payload. `retain` asks the bus to keep it for late subscribers.
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()>;

    /// Subscribe to a filter and receive matching messages on a channel.
    ///
    /// The channel closes when the transport shuts down.
    async fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<InboundMessage>>;

    /// Release the connection.
    async fn close(&self) -> Result<()>;
}
