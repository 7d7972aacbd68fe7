//! The record data model
//!
//! A [`Record`] is one decoded structured event flowing through the system:
//! an arbitrarily nested key/value mapping with a `timestamp` field. Records
//! are immutable once produced — downstream stages only read them or build
//! new ones.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{RecordError, Result};

/// Field every record carries; stamped at ingestion when absent.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Key marking the error sentinel records produced for undecodable frames
/// and failed polls.
pub const ERROR_FIELD: &str = "error";

/// Key carrying the offending frame on decode-error sentinels.
const RAW_FIELD: &str = "raw";

/// One decoded structured event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Builds a record from a JSON object map as-is, without stamping.
    pub fn from_object(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Builds a stamped record from any JSON value.
    ///
    /// Fails unless the value is an object; a `timestamp` field is added
    /// with the current time when absent.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }.stamped()),
            other => Err(RecordError::NotAnObject {
                kind: json_kind(&other),
            }),
        }
    }

    /// Decodes a JSON document into a stamped record.
    pub fn parse(input: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(input)?)
    }

    /// Decodes a JSON document from raw bytes into a stamped record.
    pub fn parse_slice(input: &[u8]) -> Result<Self> {
        Self::from_value(serde_json::from_slice(input)?)
    }

    /// Error sentinel for a frame that could not be decoded: `{error, raw}`.
    pub fn from_error_raw(error: impl std::fmt::Display, raw: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(ERROR_FIELD.to_string(), Value::String(error.to_string()));
        fields.insert(RAW_FIELD.to_string(), Value::String(raw.into()));
        Self { fields }.stamped()
    }

    /// Error sentinel without the offending frame: `{error}`.
    pub fn from_error(error: impl std::fmt::Display) -> Self {
        let mut fields = Map::new();
        fields.insert(ERROR_FIELD.to_string(), Value::String(error.to_string()));
        Self { fields }.stamped()
    }

    fn stamped(mut self) -> Self {
        self.fields
            .entry(TIMESTAMP_FIELD.to_string())
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        self
    }

    /// Whether this record is an error sentinel.
    pub fn is_error(&self) -> bool {
        self.fields.contains_key(ERROR_FIELD)
    }

    /// The value of a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Whether a top-level field exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// The value at a dotted path (`"a.b.c"`) through nested objects.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Dotted-path extraction with a caller-supplied default.
    pub fn get_path_or(&self, path: &str, default: Value) -> Value {
        self.get_path(path).cloned().unwrap_or(default)
    }

    /// The named field as a float, accepting any JSON number.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key)?.as_f64()
    }

    /// The parsed `timestamp` field.
    ///
    /// Accepts RFC 3339 strings, integer epoch seconds, and float epoch
    /// seconds — the formats producers actually emit.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.fields.get(TIMESTAMP_FIELD)?)
    }

    /// Flattens nested objects into a single-level record, joining keys with
    /// `separator`. Arrays and scalars are carried unchanged.
    pub fn flatten(&self, separator: &str) -> Record {
        let mut flat = Map::new();
        flatten_into(&self.fields, "", separator, &mut flat);
        Record { fields: flat }
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over top-level fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Borrows the underlying object map.
    pub fn as_object(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the record into its object map.
    pub fn into_inner(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.fields)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|stamp| stamp.with_timezone(&Utc)),
        Value::Number(number) => {
            if let Some(seconds) = number.as_i64() {
                Utc.timestamp_opt(seconds, 0).single()
            } else {
                let seconds = number.as_f64()?;
                Utc.timestamp_millis_opt((seconds * 1000.0) as i64).single()
            }
        }
        _ => None,
    }
}

fn flatten_into(
    fields: &Map<String, Value>,
    prefix: &str,
    separator: &str,
    out: &mut Map<String, Value>,
) {
    for (key, value) in fields {
        let flat_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{separator}{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(nested, &flat_key, separator, out),
            other => {
                out.insert(flat_key, other.clone());
            }
        }
    }
}
