// OpenWhisk event envelope
// Immutable wrapper around one decoded JSON event, with the event kind
// classified once at the decode boundary and typed accessors for fields
//
// openwhisk-stats-exporter 2026 Oct

use crate::errors::ExporterError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

pub const EVENT_TYPE: &str = "eventType";
pub const BODY: &str = "body";

/// Declared `eventType` of an OpenWhisk event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Activation,
    Metric,
    /// A string `eventType` this exporter does not know about
    Unrecognized(String),
    /// `eventType` is absent or not a string
    Untyped,
}

impl EventKind {
    fn classify(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("Activation") => EventKind::Activation,
            Some("Metric") => EventKind::Metric,
            Some(other) => EventKind::Unrecognized(other.to_string()),
            None => EventKind::Untyped,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Activation => f.write_str("Activation"),
            EventKind::Metric => f.write_str("Metric"),
            EventKind::Unrecognized(other) => f.write_str(other),
            EventKind::Untyped => f.write_str("<untyped>"),
        }
    }
}

/// Identity fields every event carries at the top level.
#[derive(Debug, Clone, Copy)]
pub struct EventOrigin<'a> {
    pub source: &'a str,
    pub namespace: &'a str,
    pub user_id: &'a str,
}

/// `body` of an `Activation` event.
#[derive(Debug, Deserialize)]
pub struct ActivationBody<'a> {
    #[serde(rename = "statusCode")]
    pub status_code: i64,
    pub name: &'a str,
    pub kind: &'a str,
    /// Milliseconds
    pub duration: u64,
}

/// One decoded event. Observers only ever see it by shared reference.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    record: Map<String, Value>,
    kind: EventKind,
}

impl EventEnvelope {
    /// Decode a UTF-8 JSON payload. Anything other than a JSON object is rejected.
    pub fn decode(payload: &[u8]) -> Result<Self, ExporterError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| ExporterError::MalformedEvent(format!("invalid json: {e}")))?;
        match value {
            Value::Object(record) => Ok(Self::from_record(record)),
            other => Err(ExporterError::MalformedEvent(format!(
                "expected a json object, got {}",
                json_type(&other)
            ))),
        }
    }

    pub fn from_record(record: Map<String, Value>) -> Self {
        let kind = EventKind::classify(record.get(EVENT_TYPE));
        Self { record, kind }
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.record.get(key)
    }

    pub fn origin(&self) -> Result<EventOrigin<'_>, ExporterError> {
        let origin = EventOrigin {
            source: self.str_field("source")?,
            namespace: self.str_field("namespace")?,
            user_id: self.str_field("userId")?,
        };
        Ok(origin)
    }

    pub fn activation_body(&self) -> Result<ActivationBody<'_>, ExporterError> {
        let body = self
            .get(BODY)
            .ok_or_else(|| ExporterError::MalformedEvent("missing field `body`".into()))?;
        if !body.is_object() {
            return Err(ExporterError::MalformedEvent(format!(
                "field `body` must be an object, got {}",
                json_type(body)
            )));
        }
        ActivationBody::deserialize(body)
            .map_err(|e| ExporterError::MalformedEvent(format!("activation body: {e}")))
    }

    pub fn str_field(&self, key: &str) -> Result<&str, ExporterError> {
        match self.record.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(ExporterError::MalformedEvent(format!(
                "field `{key}` must be a string, got {}",
                json_type(other)
            ))),
            None => Err(ExporterError::MalformedEvent(format!(
                "missing field `{key}`"
            ))),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
