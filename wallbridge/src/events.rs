//! Telemetry event ingestion.
//!
//! The charger broadcasts sensor samples as JSON envelopes. Each sample
//! overwrites one telemetry field of the store; the poll loop picks the new
//! value up on its next tick.

use serde::Deserialize;
use tokio::sync::mpsc;
use wallbridge_framework::{SharedStore, Shutdown};

use crate::store::{DeviceSnapshot, set_telemetry};

/// Envelope of a telemetry event. Every part is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TelemetryEnvelope {
    pub header: EnvelopeHeader,
    pub body: EnvelopeBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EnvelopeHeader {
    pub message_id: String,
    pub source: String,
    pub timestamp: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EnvelopeBody {
    pub sensors: Vec<SensorSample>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SensorSample {
    pub id: String,
    pub metadata: serde_json::Value,
    pub timestamp: String,
    /// `null` and missing both read as 0.
    pub value: Option<f64>,
}

/// One sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFrame {
    pub sensor_id: String,
    pub value: f64,
    pub timestamp: String,
}

impl TelemetryEnvelope {
    /// Frames carried by the envelope, in order.
    pub fn into_frames(self) -> Vec<TelemetryFrame> {
        self.body
            .sensors
            .into_iter()
            .map(|sample| TelemetryFrame {
                sensor_id: sample.id,
                value: sample.value.unwrap_or(0.0),
                timestamp: sample.timestamp,
            })
            .collect()
    }
}

/// Outcome of one envelope.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub frames: usize,
    pub applied: usize,
    pub unknown: usize,
}

/// Applies telemetry events to the shared store.
#[derive(Clone)]
pub struct TelemetryEventPipeline {
    store: SharedStore<DeviceSnapshot>,
}

impl TelemetryEventPipeline {
    pub fn new(store: SharedStore<DeviceSnapshot>) -> Self {
        Self { store }
    }

    pub fn decode(payload: &str) -> Result<Vec<TelemetryFrame>, serde_json::Error> {
        let envelope: TelemetryEnvelope = serde_json::from_str(payload)?;
        Ok(envelope.into_frames())
    }

    /// Store every frame with a known sensor id.
    pub fn apply(&self, frames: &[TelemetryFrame]) -> IngestReport {
        let mut report = IngestReport {
            frames: frames.len(),
            ..Default::default()
        };

        self.store.update(|snapshot| {
            for frame in frames {
                if set_telemetry(&mut snapshot.telemetry, &frame.sensor_id, frame.value) {
                    report.applied += 1;
                } else {
                    report.unknown += 1;
                    tracing::debug!(sensor = %frame.sensor_id, "No field for telemetry sensor");
                }
            }
        });

        report
    }

    /// Decode and apply one payload. Malformed payloads are logged and yield `None`.
    pub fn ingest(&self, payload: &str) -> Option<IngestReport> {
        match Self::decode(payload) {
            Ok(frames) => {
                let report = self.apply(&frames);
                tracing::trace!(
                    frames = report.frames,
                    applied = report.applied,
                    unknown = report.unknown,
                    "Telemetry event applied"
                );
                Some(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed telemetry event");
                None
            }
        }
    }

    /// Consume events until the stream ends or shutdown.
    pub async fn run(self, mut events: mpsc::Receiver<String>, mut shutdown: Shutdown) {
        tracing::info!("Telemetry event pipeline started");
        let mut received: u64 = 0;

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                event = events.recv() => match event {
                    Some(payload) => {
                        received += 1;
                        self.ingest(&payload);
                    }
                    None => {
                        tracing::warn!("Telemetry event stream closed");
                        break;
                    }
                },
            }
        }

        tracing::info!(received, "Telemetry event pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallbridge_framework::shutdown_channel;

    const ENVELOPE: &str = r#"{
        "header": {"message_id": "42", "source": "telemetry", "timestamp": "2024-05-01T10:00:00Z"},
        "body": {"sensors": [
            {"id": "SENSOR_INTERNAL_METER_VOLTAGE_L1", "metadata": [], "timestamp": "2024-05-01T10:00:00Z", "value": 231.5},
            {"id": "UNKNOWN_X", "value": 7},
            {"id": "SENSOR_ECOSMART_MODE", "value": null}
        ]}
    }"#;

    fn pipeline() -> (SharedStore<DeviceSnapshot>, TelemetryEventPipeline) {
        let store = SharedStore::new(DeviceSnapshot::default());
        (store.clone(), TelemetryEventPipeline::new(store))
    }

    #[test]
    fn test_decode_frames() {
        let frames = TelemetryEventPipeline::decode(ENVELOPE).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].sensor_id, "SENSOR_INTERNAL_METER_VOLTAGE_L1");
        assert_eq!(frames[0].value, 231.5);
        assert_eq!(frames[0].timestamp, "2024-05-01T10:00:00Z");
        assert_eq!(frames[2].value, 0.0);
    }

    #[test]
    fn test_lenient_envelope() {
        assert!(TelemetryEventPipeline::decode("{}").unwrap().is_empty());
        assert!(
            TelemetryEventPipeline::decode(r#"{"body": {}}"#)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_ingest_applies_known_sensors() {
        let (store, pipeline) = pipeline();
        store.update(|s| s.telemetry.ecosmart_mode = 3.0);

        let report = pipeline.ingest(ENVELOPE).unwrap();

        assert_eq!(
            report,
            IngestReport {
                frames: 3,
                applied: 2,
                unknown: 1,
            }
        );
        let telemetry = store.snapshot().telemetry;
        assert_eq!(telemetry.internal_meter_voltage_l1, 231.5);
        assert_eq!(telemetry.ecosmart_mode, 0.0);
    }

    #[test]
    fn test_unknown_sensor_leaves_store_unchanged() {
        let (store, pipeline) = pipeline();
        let before = store.snapshot();

        let report = pipeline
            .ingest(r#"{"body": {"sensors": [{"id": "UNKNOWN_X", "value": 1.0}]}}"#)
            .unwrap();

        assert_eq!(report.unknown, 1);
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_malformed_payload_discarded() {
        let (store, pipeline) = pipeline();
        assert!(pipeline.ingest("not json").is_none());
        assert!(
            pipeline
                .ingest(r#"{"body": {"sensors": [{"id": "SENSOR_WELDING", "value": "hot"}]}}"#)
                .is_none()
        );
        assert_eq!(store.snapshot(), DeviceSnapshot::default());
    }

    #[tokio::test]
    async fn test_run_survives_bad_messages() {
        let (store, pipeline) = pipeline();
        let (tx, rx) = mpsc::channel(8);
        let (_trigger, shutdown) = shutdown_channel();

        tx.send("garbage".to_string()).await.unwrap();
        tx.send(r#"{"body": {"sensors": [{"id": "SENSOR_TEMP_L2", "value": 41.5}]}}"#.to_string())
            .await
            .unwrap();
        drop(tx);

        pipeline.run(rx, shutdown).await;
        assert_eq!(store.snapshot().telemetry.temp_l2, 41.5);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_store, pipeline) = pipeline();
        let (_tx, rx) = mpsc::channel::<String>(1);
        let (trigger, shutdown) = shutdown_channel();

        let handle = tokio::spawn(pipeline.run(rx, shutdown));
        trigger.trigger();
        tokio_test::assert_ok!(handle.await);
    }
}
