//! Structured event types produced by the line parsers and consumed by
//! the aggregator and the telemetry exporter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Log severity of a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "err" => Ok(Self::Error),
            _ => Err(format!("unknown level: {}", s)),
        }
    }
}

/// Typed value of an extracted event field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// One parsed log line, immutable once produced. Ownership flows from
/// the parsing workers through the aggregator to the exporter.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    /// Identifier of the source the line came from.
    pub source: String,
    pub message: String,
    /// Hostname of the agent that captured the line.
    pub host: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl LogEvent {
    /// Integer field accessor, used for status and latency lookups.
    pub fn int_field(&self, name: &str) -> Option<i64> {
        match self.fields.get(name) {
            Some(FieldValue::Int(v)) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_from_str() {
        assert_eq!("info".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!("warning".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!("error".parse::<Level>().unwrap(), Level::Error);
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn level_ordering_and_display() {
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert_eq!(format!("{}", Level::Warn), "warn");
    }

    #[test]
    fn field_value_serializes_untagged() {
        let mut fields = BTreeMap::new();
        fields.insert("status".to_string(), FieldValue::Int(200));
        fields.insert("url".to_string(), FieldValue::from("/api/x"));

        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(json, r#"{"status":200,"url":"/api/x"}"#);
    }

    #[test]
    fn int_field_lookup() {
        let mut fields = BTreeMap::new();
        fields.insert("status".to_string(), FieldValue::Int(404));
        fields.insert("user".to_string(), FieldValue::from("alice"));

        let event = LogEvent {
            timestamp: Utc::now(),
            level: Level::Info,
            source: "web".to_string(),
            message: "GET / 404 3ms".to_string(),
            host: "test-host".to_string(),
            fields,
        };

        assert_eq!(event.int_field("status"), Some(404));
        assert_eq!(event.int_field("user"), None);
        assert_eq!(event.int_field("missing"), None);
    }
}
