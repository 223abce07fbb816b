//! Entity state publisher.

use std::sync::Arc;

use wallbridge_common::{TopicBuilder, Value};

use crate::error::Result;
use crate::transport::Transport;

/// Publisher for sending entity state to the bus.
///
/// Wraps a transport and the device's topic layout.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
    topics: TopicBuilder,
}

impl Publisher {
    /// Create a new publisher.
    pub fn new(transport: Arc<dyn Transport>, topics: TopicBuilder) -> Self {
        Self { transport, topics }
    }

    /// Topic layout of the device.
    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Publish an entity value to its retained state topic.
    pub async fn publish_state(&self, entity_key: &str, value: &Value) -> Result<()> {
        let topic = self.topics.state(entity_key);
        self.transport
            .publish(&topic, value.render().into_bytes(), true)
            .await
    }

    /// Publish raw bytes to a full topic.
    pub async fn publish_raw(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        self.transport.publish(topic, payload, retain).await
    }

    /// Publish a JSON value to a full topic, retained.
    pub async fn publish_json<T: serde::Serialize>(&self, topic: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.publish_raw(topic, payload, true).await
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("transport", &self.transport.name())
            .field("prefix", &self.topics.prefix())
            .finish()
    }
}
