//! End-to-end tests with Zenoh pub/sub.
//!
//! These tests verify that device topics and command filters behave on a real
//! Zenoh session the way they do on an MQTT broker.
//!
//! Note: Zenoh requires multi-thread tokio runtime.
//! Each test uses a unique device prefix to avoid interference.

use std::time::Duration;
use wallbridge_common::{TopicBuilder, Value, to_key_expr};

/// Generate a unique device prefix to avoid test interference.
fn unique_prefix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("wallbox_test_{}", nanos)
}

/// A state payload published on a device topic arrives unchanged.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zenoh_state_publish() {
    let topics = TopicBuilder::new(unique_prefix());

    let session = zenoh::open(zenoh::Config::default())
        .await
        .expect("Failed to open Zenoh session");

    let subscriber = session
        .declare_subscriber(format!("{}/**", topics.prefix()))
        .await
        .expect("Failed to create subscriber");

    tokio::time::sleep(Duration::from_millis(100)).await;

    let value = Value::Float(7360.0);
    session
        .put(topics.state("charging_power"), value.render())
        .await
        .expect("Failed to publish");

    let received = tokio::time::timeout(Duration::from_secs(5), subscriber.recv_async())
        .await
        .expect("Timeout waiting for message")
        .expect("Failed to receive message");

    assert_eq!(
        received.key_expr().as_str(),
        topics.state("charging_power")
    );
    let payload = received.payload().to_bytes();
    assert_eq!(payload.as_ref(), b"7360");

    drop(subscriber);
    session.close().await.expect("Failed to close session");
}

/// The converted command filter only matches command topics.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zenoh_command_filter() {
    let topics = TopicBuilder::new(unique_prefix());

    let session = zenoh::open(zenoh::Config::default())
        .await
        .expect("Failed to open Zenoh session");

    let subscriber = session
        .declare_subscriber(to_key_expr(&topics.command_filter()))
        .await
        .expect("Failed to create subscriber");

    tokio::time::sleep(Duration::from_millis(100)).await;

    // A state publish must not reach the command subscriber
    session.put(topics.state("lock"), "1").await.unwrap();
    session.put(topics.command("lock"), "0").await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), subscriber.recv_async())
        .await
        .expect("Should receive command")
        .unwrap();

    let key = received.key_expr().as_str().to_string();
    assert_eq!(topics.parse_command(&key), Some("lock"));
    assert_eq!(received.payload().to_bytes().as_ref(), b"0");

    drop(subscriber);
    session.close().await.expect("Failed to close session");
}
