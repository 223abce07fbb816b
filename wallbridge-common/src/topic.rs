/// Default prefix for discovery configuration topics.
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

/// Suffix of per-entity state topics.
pub const STATE_SUFFIX: &str = "state";

/// Suffix of per-entity command topics.
pub const COMMAND_SUFFIX: &str = "set";

/// Builder for the topics owned by one bridged device.
///
/// Topics follow the pattern:
/// `<device_prefix>/<entity_key>/<suffix>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    prefix: String,
}

impl TopicBuilder {
    /// Create a builder for a device prefix (e.g. `wallbox_123456`).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The device prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Base topic of an entity, used as the `~` template in discovery payloads.
    ///
    /// # Example
    /// ```
    /// use wallbridge_common::topic::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("wallbox_123");
    /// assert_eq!(topics.base("lock"), "wallbox_123/lock");
    /// ```
    pub fn base(&self, entity_key: &str) -> String {
        format!("{}/{}", self.prefix, entity_key)
    }

    /// State topic of an entity.
    ///
    /// # Example
    /// ```
    /// use wallbridge_common::topic::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("wallbox_123");
    /// assert_eq!(topics.state("charging_power"), "wallbox_123/charging_power/state");
    /// ```
    pub fn state(&self, entity_key: &str) -> String {
        format!("{}/{}/{}", self.prefix, entity_key, STATE_SUFFIX)
    }

    /// Command topic of an entity.
    pub fn command(&self, entity_key: &str) -> String {
        format!("{}/{}/{}", self.prefix, entity_key, COMMAND_SUFFIX)
    }

    /// Filter matching the command topics of every entity of this device.
    ///
    /// # Example
    /// ```
    /// use wallbridge_common::topic::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("wallbox_123");
    /// assert_eq!(topics.command_filter(), "wallbox_123/+/set");
    /// ```
    pub fn command_filter(&self) -> String {
        format!("{}/+/{}", self.prefix, COMMAND_SUFFIX)
    }

    /// Availability topic (`online` / `offline`).
    pub fn availability(&self) -> String {
        format!("{}/availability", self.prefix)
    }

    /// Extract the entity key from a command topic of this device.
    ///
    /// Returns `None` for topics outside this device or with a different shape.
    pub fn parse_command<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let rest = topic.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?;
        let key = rest.strip_suffix(COMMAND_SUFFIX)?.strip_suffix('/')?;

        if key.is_empty() || key.contains('/') {
            return None;
        }

        Some(key)
    }
}

/// Build the discovery configuration topic of an entity.
///
/// # Example
/// ```
/// use wallbridge_common::topic::discovery_topic;
///
/// assert_eq!(
///     discovery_topic("homeassistant", "sensor", "123_status"),
///     "homeassistant/sensor/123_status/config"
/// );
/// ```
pub fn discovery_topic(discovery_prefix: &str, component: &str, unique_id: &str) -> String {
    format!("{}/{}/{}/config", discovery_prefix, component, unique_id)
}

/// Check whether a topic matches an MQTT-style filter.
///
/// `+` matches exactly one level, a trailing `#` matches any remaining levels
/// (including none).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Convert an MQTT-style filter into a Zenoh key expression.
///
/// # Example
/// ```
/// use wallbridge_common::topic::to_key_expr;
///
/// assert_eq!(to_key_expr("wallbox_1/+/set"), "wallbox_1/*/set");
/// assert_eq!(to_key_expr("homeassistant/#"), "homeassistant/**");
/// ```
pub fn to_key_expr(filter: &str) -> String {
    filter
        .split('/')
        .map(|level| match level {
            "+" => "*",
            "#" => "**",
            other => other,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_builder() {
        let topics = TopicBuilder::new("wallbox_42");

        assert_eq!(topics.base("lock"), "wallbox_42/lock");
        assert_eq!(topics.state("lock"), "wallbox_42/lock/state");
        assert_eq!(topics.command("lock"), "wallbox_42/lock/set");
        assert_eq!(topics.command_filter(), "wallbox_42/+/set");
        assert_eq!(topics.availability(), "wallbox_42/availability");
    }

    #[test]
    fn test_parse_command() {
        let topics = TopicBuilder::new("wallbox_42");

        assert_eq!(topics.parse_command("wallbox_42/lock/set"), Some("lock"));
        assert_eq!(
            topics.parse_command("wallbox_42/max_charging_current/set"),
            Some("max_charging_current")
        );
    }

    #[test]
    fn test_parse_invalid_command() {
        let topics = TopicBuilder::new("wallbox_42");

        assert!(topics.parse_command("wallbox_43/lock/set").is_none());
        assert!(topics.parse_command("wallbox_42/lock/state").is_none());
        assert!(topics.parse_command("wallbox_42//set").is_none());
        assert!(topics.parse_command("wallbox_42/a/b/set").is_none());
        assert!(topics.parse_command("wallbox_42lock/set").is_none());
    }

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("wallbox_1/+/set", "wallbox_1/lock/set"));
        assert!(!topic_matches("wallbox_1/+/set", "wallbox_1/lock/state"));
        assert!(!topic_matches("wallbox_1/+/set", "wallbox_1/a/b/set"));
        assert!(topic_matches("wallbox_1/#", "wallbox_1/lock/set"));
        assert!(topic_matches("wallbox_1/#", "wallbox_1"));
        assert!(topic_matches("a/b", "a/b"));
        assert!(!topic_matches("a/b", "a/b/c"));
        assert!(!topic_matches("a/b/c", "a/b"));
    }

    #[test]
    fn test_to_key_expr() {
        assert_eq!(to_key_expr("a/+/b/#"), "a/*/b/**");
        assert_eq!(to_key_expr("plain/topic"), "plain/topic");
    }
}
