use serde::{Deserialize, Serialize};
use std::fmt;

/// A publishable entity value.
///
/// Every value has a canonical string form (its [`Display`](fmt::Display) output) which is
/// both the payload sent on the bus and the basis for change detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// Whole number (codes, flags, configuration values).
    Integer(i64),

    /// Measurement.
    Float(f64),

    /// Text value (status labels).
    Text(String),
}

impl Value {
    /// Render the canonical string form.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Numeric form used by rate limiting.
    ///
    /// Text is parsed leniently: anything that is not a number counts as `0.0`.
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Integer(v) => *v as f64,
            Value::Float(v) => *v,
            Value::Text(s) => parse_float_lenient(s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            // f64's Display is already the shortest round-trip form and drops a zero fraction.
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

/// Parse a float, treating malformed input as `0.0`.
pub fn parse_float_lenient(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

/// Parse an integer, treating malformed input as `0`.
///
/// Command payloads go through this: `"abc"` or `"1.5"` both become `0`.
pub fn parse_int_lenient(s: &str) -> i64 {
    s.parse().unwrap_or(0)
}
