//! Discovery announcements for dashboard auto-configuration.
//!
//! Every entity is announced once at startup on
//! `<discovery_prefix>/<component>/<device_id>_<key>/config` with a retained
//! JSON document describing its topics and metadata.

use serde_json::{Map, Value as Json, json};
use wallbridge_common::{TopicBuilder, discovery_topic};

use crate::entity::Entity;
use crate::error::Result;
use crate::publisher::Publisher;
use crate::registry::EntityRegistry;

/// Identity of the announced device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Prefix of discovery topics (e.g. `homeassistant`).
    pub discovery_prefix: String,
    /// Stable device identifier, used in unique ids.
    pub device_id: String,
    /// Human readable device name.
    pub device_name: String,
}

impl DeviceInfo {
    /// Unique id of one entity of this device.
    pub fn unique_id(&self, entity_key: &str) -> String {
        format!("{}_{}", self.device_id, entity_key)
    }
}

/// Discovery topic of one entity.
pub fn entity_discovery_topic<S>(info: &DeviceInfo, entity: &Entity<S>) -> String {
    discovery_topic(
        &info.discovery_prefix,
        entity.kind().as_str(),
        &info.unique_id(entity.key()),
    )
}

/// Discovery document of one entity.
///
/// Entity metadata is merged last and wins on key collisions.
pub fn discovery_payload<S>(
    info: &DeviceInfo,
    topics: &TopicBuilder,
    entity: &Entity<S>,
) -> Map<String, Json> {
    let mut payload = Map::new();
    payload.insert("~".into(), Json::String(topics.base(entity.key())));
    payload.insert(
        "availability_topic".into(),
        Json::String(topics.availability()),
    );
    payload.insert("state_topic".into(), json!("~/state"));
    payload.insert(
        "unique_id".into(),
        Json::String(info.unique_id(entity.key())),
    );
    payload.insert(
        "device".into(),
        json!({
            "identifiers": info.device_id,
            "name": info.device_name,
        }),
    );
    if entity.is_writable() {
        payload.insert("command_topic".into(), json!("~/set"));
    }

    for (key, value) in entity.metadata() {
        payload.insert(key.clone(), Json::String(value.clone()));
    }

    payload
}

/// Announce every registered entity. Returns the number of announcements.
pub async fn publish_discovery<S>(
    publisher: &Publisher,
    registry: &EntityRegistry<S>,
    info: &DeviceInfo,
) -> Result<usize> {
    let mut count = 0;
    for entity in registry.iter() {
        let topic = entity_discovery_topic(info, entity);
        let payload = discovery_payload(info, publisher.topics(), entity);
        publisher.publish_json(&topic, &payload).await?;
        tracing::debug!(entity = %entity.key(), topic = %topic, "Announced entity");
        count += 1;
    }

    tracing::info!(
        entities = count,
        prefix = %info.discovery_prefix,
        "Published discovery configuration"
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ComponentKind, EntityWriter};
    use async_trait::async_trait;
    use std::sync::Arc;
    use wallbridge_common::Value;

    struct Noop;

    #[async_trait]
    impl EntityWriter for Noop {
        async fn write(&self, _payload: &str) -> Result<()> {
            Ok(())
        }
    }

    fn zero(_: &()) -> Value {
        Value::Integer(0)
    }

    fn info() -> DeviceInfo {
        DeviceInfo {
            discovery_prefix: "homeassistant".into(),
            device_id: "900123".into(),
            device_name: "Garage".into(),
        }
    }

    #[test]
    fn test_read_only_payload() {
        let entity = Entity::new("status", ComponentKind::Sensor, zero).with_meta("name", "Status");
        let payload = discovery_payload(&info(), &TopicBuilder::new("wallbox_900123"), &entity);

        assert_eq!(payload["~"], "wallbox_900123/status");
        assert_eq!(payload["availability_topic"], "wallbox_900123/availability");
        assert_eq!(payload["state_topic"], "~/state");
        assert_eq!(payload["unique_id"], "900123_status");
        assert_eq!(payload["device"]["identifiers"], "900123");
        assert_eq!(payload["device"]["name"], "Garage");
        assert_eq!(payload["name"], "Status");
        assert!(!payload.contains_key("command_topic"));
    }

    #[test]
    fn test_writable_payload_and_metadata_wins() {
        let entity = Entity::new("lock", ComponentKind::Lock, zero)
            .writable(Arc::new(Noop))
            .with_meta("state_topic", "~/custom");
        let payload = discovery_payload(&info(), &TopicBuilder::new("wallbox_900123"), &entity);

        assert_eq!(payload["command_topic"], "~/set");
        assert_eq!(payload["state_topic"], "~/custom");
        assert_eq!(
            entity_discovery_topic(&info(), &entity),
            "homeassistant/lock/900123_lock/config"
        );
    }
}
