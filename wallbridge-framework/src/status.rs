//! Bridge availability reporting.

use std::fmt;

use crate::Result;
use crate::publisher::Publisher;
use crate::transport::LastWill;

/// Availability of the bridged device as seen by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Online,
    Offline,
}

impl Availability {
    /// Payload published on the availability topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Online => "online",
            Availability::Offline => "offline",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publishes `online` on startup and `offline` on shutdown.
#[derive(Debug, Clone)]
pub struct AvailabilityPublisher {
    publisher: Publisher,
}

impl AvailabilityPublisher {
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }

    /// The availability topic of the device.
    pub fn topic(&self) -> String {
        self.publisher.topics().availability()
    }

    /// Last will announcing the device offline.
    pub fn last_will(topics: &wallbridge_common::TopicBuilder) -> LastWill {
        LastWill::new(topics.availability(), Availability::Offline.as_str())
    }

    /// Publish an availability state, retained.
    pub async fn publish(&self, availability: Availability) -> Result<()> {
        tracing::info!(topic = %self.topic(), status = %availability, "Publishing availability");
        self.publisher
            .publish_raw(&self.topic(), availability.as_str().as_bytes().to_vec(), true)
            .await
    }

    pub async fn publish_online(&self) -> Result<()> {
        self.publish(Availability::Online).await
    }

    pub async fn publish_offline(&self) -> Result<()> {
        self.publish(Availability::Offline).await
    }
}
