//! Bridged entities: one addressable attribute of a device.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use wallbridge_common::Value;

use crate::error::Result;
use crate::ratelimit::RateLimit;

/// Kind of dashboard component an entity is announced as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Sensor,
    BinarySensor,
    Switch,
    Number,
    Lock,
}

impl ComponentKind {
    /// Name used in discovery topics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Sensor => "sensor",
            ComponentKind::BinarySensor => "binary_sensor",
            ComponentKind::Switch => "switch",
            ComponentKind::Number => "number",
            ComponentKind::Lock => "lock",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write accessor of an entity.
///
/// Receives the raw command payload. Implementations act on the device
/// directly; the new value shows up in the store on the next refresh.
#[async_trait]
pub trait EntityWriter: Send + Sync {
    async fn write(&self, payload: &str) -> Result<()>;
}

/// Read accessor of an entity over the device state `S`.
pub type ReadFn<S> = fn(&S) -> Value;

/// A named, self-describing attribute of a bridged device.
pub struct Entity<S> {
    key: String,
    kind: ComponentKind,
    read: ReadFn<S>,
    writer: Option<Arc<dyn EntityWriter>>,
    rate_limit: Option<RateLimit>,
    metadata: Vec<(String, String)>,
}

impl<S> Entity<S> {
    /// Create a read-only entity without metadata.
    pub fn new(key: impl Into<String>, kind: ComponentKind, read: ReadFn<S>) -> Self {
        Self {
            key: key.into(),
            kind,
            read,
            writer: None,
            rate_limit: None,
            metadata: Vec::new(),
        }
    }

    /// Attach a delta rate limit.
    pub fn rate_limited(mut self, min_interval_secs: u64, min_delta: f64) -> Self {
        self.rate_limit = Some(RateLimit::new(
            Duration::from_secs(min_interval_secs),
            min_delta,
        ));
        self
    }

    /// Make the entity writable.
    pub fn writable(mut self, writer: Arc<dyn EntityWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Add a metadata pair. An existing key keeps its position and takes the new value.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.metadata.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.metadata.push((key, value)),
        }
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    /// Evaluate the read accessor.
    pub fn read(&self, state: &S) -> Value {
        (self.read)(state)
    }

    pub fn writer(&self) -> Option<&Arc<dyn EntityWriter>> {
        self.writer.as_ref()
    }

    pub fn is_writable(&self) -> bool {
        self.writer.is_some()
    }

    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }

    /// Metadata pairs in insertion order.
    pub fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }

    /// Look up one metadata value.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl<S> Clone for Entity<S> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            kind: self.kind,
            read: self.read,
            writer: self.writer.clone(),
            rate_limit: self.rate_limit,
            metadata: self.metadata.clone(),
        }
    }
}

impl<S> fmt::Debug for Entity<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("writable", &self.is_writable())
            .field("rate_limit", &self.rate_limit)
            .field("metadata", &self.metadata)
            .finish()
    }
}
