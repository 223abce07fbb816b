//! Access to the charger's own data stores.
//!
//! On the charger, configuration lives in a relational database, live
//! readings in key-value hashes, and commands travel over POSIX message
//! queues. [`DataSource`] hides all three behind one async interface.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use wallbridge_framework::BridgeError;

use crate::store::ConfigRow;

/// Queue accepting lock and login requests.
pub const LOGIN_QUEUE: &str = "WALLBOX_MYWALLBOX_WALLBOX_LOGIN";
/// Queue accepting state machine requests.
pub const STATE_MACHINE_QUEUE: &str = "WALLBOX_MYWALLBOX_WALLBOX_STATEMACHINE";
/// Pub/sub channel carrying telemetry event envelopes.
pub const TELEMETRY_CHANNEL: &str = "/wbx/telemetry/events";
/// Fixed size of a queue message; events are NUL padded to it.
pub const QUEUE_MESSAGE_SIZE: usize = 1024;

/// Data source errors.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Data source unavailable: {0}")]
    Unavailable(String),

    #[error("Query '{what}' failed: {message}")]
    Query { what: String, message: String },

    #[error("Cannot scan field '{field}' from '{value}'")]
    FieldScan { field: String, value: String },

    #[error("Queue '{queue}' error: {message}")]
    Queue { queue: String, message: String },

    #[error("Event subscription closed")]
    Closed,
}

impl SourceError {
    pub fn query(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            what: what.into(),
            message: message.into(),
        }
    }

    pub fn field_scan(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::FieldScan {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn queue(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Queue {
            queue: queue.into(),
            message: message.into(),
        }
    }
}

impl From<SourceError> for BridgeError {
    fn from(err: SourceError) -> Self {
        BridgeError::with_context("data source", err)
    }
}

/// Static facts about the charger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargerInfo {
    pub serial_number: String,
    /// Part number prefix, e.g. `PLP1` or `CPB1`.
    pub charger_type: String,
}

/// Writable columns of the configuration row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigColumn {
    Lock,
    MaxChargingCurrent,
    HaloBrightness,
}

impl ConfigColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            ConfigColumn::Lock => "lock",
            ConfigColumn::MaxChargingCurrent => "max_charging_current",
            ConfigColumn::HaloBrightness => "halo_brightness",
        }
    }
}

/// The charger's data stores.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &'static str;

    async fn charger_info(&self) -> Result<ChargerInfo, SourceError>;

    /// Highest current the installation allows, in amperes.
    async fn max_available_current(&self) -> Result<i64, SourceError>;

    /// Id of the most recent user that is not the admin.
    async fn last_user_id(&self) -> Result<String, SourceError>;

    async fn fetch_config(&self) -> Result<ConfigRow, SourceError>;

    /// Read `fields` of `hash`. Each value is `None` when the field is absent.
    async fn fetch_hash(
        &self,
        hash: &str,
        fields: &[&str],
    ) -> Result<Vec<Option<String>>, SourceError>;

    async fn update_config(&self, column: ConfigColumn, value: i64) -> Result<(), SourceError>;

    /// Post a raw queue message of exactly [`QUEUE_MESSAGE_SIZE`] bytes.
    async fn send_queue_message(&self, queue: &str, message: Vec<u8>) -> Result<(), SourceError>;

    /// Subscribe to a pub/sub channel. The receiver ends when the source stops.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, SourceError>;
}

/// Encode an event as a NUL padded queue message.
pub fn encode_queue_message(queue: &str, event: &str) -> Result<Vec<u8>, SourceError> {
    if event.len() > QUEUE_MESSAGE_SIZE {
        return Err(SourceError::queue(
            queue,
            format!(
                "event of {} bytes exceeds {} bytes",
                event.len(),
                QUEUE_MESSAGE_SIZE
            ),
        ));
    }

    let mut message = event.as_bytes().to_vec();
    message.resize(QUEUE_MESSAGE_SIZE, 0);
    Ok(message)
}

/// Decode a queue message back into its event text.
pub fn decode_queue_message(message: &[u8]) -> String {
    let end = message.iter().position(|&b| b == 0).unwrap_or(message.len());
    String::from_utf8_lossy(&message[..end]).into_owned()
}

/// Encode and post one event.
pub async fn send_queue_event(
    source: &dyn DataSource,
    queue: &str,
    event: &str,
) -> Result<(), SourceError> {
    let message = encode_queue_message(queue, event)?;
    tracing::debug!(queue = %queue, event = %event, "Sending queue event");
    source.send_queue_message(queue, message).await
}
