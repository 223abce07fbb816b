//! Integration tests for wallbridge-common library.

use wallbridge_common::{
    BaseConfig, BusConfig, TopicBuilder, Value, discovery_topic, parse_config, to_key_expr,
    topic_matches,
};

#[test]
fn test_device_topic_workflow() {
    let topics = TopicBuilder::new("wallbox_900123");

    // A state publish and the command filter that the bridge subscribes to
    let state = topics.state("halo_brightness");
    assert_eq!(state, "wallbox_900123/halo_brightness/state");

    let filter = topics.command_filter();
    let command = topics.command("halo_brightness");
    assert!(topic_matches(&filter, &command));
    assert!(!topic_matches(&filter, &state));

    // The wildcard segment of an incoming command resolves back to the entity key
    assert_eq!(topics.parse_command(&command), Some("halo_brightness"));
}

#[test]
fn test_discovery_topic_per_component() {
    let components = ["sensor", "binary_sensor", "switch", "number", "lock"];

    for component in components {
        let topic = discovery_topic("homeassistant", component, "900123_lock");
        assert_eq!(topic, format!("homeassistant/{}/900123_lock/config", component));
        assert!(topic_matches("homeassistant/#", &topic));
    }
}

#[test]
fn test_command_filter_as_key_expr() {
    let topics = TopicBuilder::new("wallbox_1");
    assert_eq!(to_key_expr(&topics.command_filter()), "wallbox_1/*/set");
}

#[test]
fn test_value_payloads() {
    let values = [
        (Value::Integer(0), "0"),
        (Value::Integer(-6), "-6"),
        (Value::Float(7360.0), "7360"),
        (Value::Float(0.25), "0.25"),
        (Value::Text("Connected: waiting for car demand".into()), "Connected: waiting for car demand"),
    ];

    for (value, payload) in values {
        assert_eq!(value.render(), payload);
        assert_eq!(value.render().into_bytes(), payload.as_bytes());
    }
}

#[test]
fn test_value_json_is_untagged() {
    assert_eq!(serde_json::to_string(&Value::Integer(3)).unwrap(), "3");
    assert_eq!(serde_json::to_string(&Value::Text("on".into())).unwrap(), "\"on\"");
}

#[test]
fn test_base_config_from_json5() {
    let config: BaseConfig = parse_config(
        r#"
        // comments are allowed in JSON5
        {
            bus: { type: "zenoh", mode: "peer" },
            logging: { level: "warn", format: "json" },
        }
        "#,
    )
    .expect("config should parse");

    assert!(matches!(config.bus, BusConfig::Zenoh(_)));
    assert_eq!(config.logging.level, "warn");
}
