//! Telemetry message models.
//!
//! A queue message body decodes into a [`TelemetryRecord`]: any well-formed JSON
//! object. Field-level checks happen later, when the batch writer turns the
//! record into a [`SystemSnapshot`]. Keeping the two steps apart means a body
//! with a missing or mistyped field is still buffered and reported as a
//! validation failure of that one record, while a body that is not an object
//! at all never reaches the buffer.

use serde_json::{Map, Value};

use crate::error_handling::{DecodeError, ValidationError, ValidationIssue};

/// One decoded telemetry message. Immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    fields: Map<String, Value>,
}

impl TelemetryRecord {
    /// Decodes a message body.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Malformed` for invalid JSON and
    /// `DecodeError::NotAnObject` for valid JSON that is not an object.
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        match serde_json::from_slice::<Value>(body)? {
            Value::Object(fields) => Ok(TelemetryRecord { fields }),
            other => Err(DecodeError::NotAnObject(json_type_name(&other))),
        }
    }

    /// Wraps an already parsed JSON object.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        TelemetryRecord { fields }
    }

    /// Raw value of a top-level field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Checks every column field and returns the typed snapshot.
    ///
    /// Unknown extra fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` naming the first field that is absent or has
    /// the wrong JSON type.
    pub fn validate(&self) -> Result<SystemSnapshot, ValidationError> {
        let info = self.string_field("info")?;
        let cpu_usage = self.number_field("cpu_usage")?;
        let memory_usage = self.number_field("memory_usage")?;
        let disk_usage = match self.required("disk_usage")? {
            Value::Object(map) => map.clone(),
            other => return Err(wrong_type("disk_usage", "object", other)),
        };
        let processes = self.string_list_field("processes")?;
        let connections = self.string_list_field("connections")?;

        Ok(SystemSnapshot {
            info,
            cpu_usage,
            memory_usage,
            disk_usage,
            processes,
            connections,
        })
    }

    fn required(&self, field: &'static str) -> Result<&Value, ValidationError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Err(ValidationError {
                field,
                issue: ValidationIssue::Missing,
            }),
            Some(value) => Ok(value),
        }
    }

    fn string_field(&self, field: &'static str) -> Result<String, ValidationError> {
        match self.required(field)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(wrong_type(field, "string", other)),
        }
    }

    fn number_field(&self, field: &'static str) -> Result<f64, ValidationError> {
        let value = self.required(field)?;
        value
            .as_f64()
            .ok_or_else(|| wrong_type(field, "number", value))
    }

    fn string_list_field(&self, field: &'static str) -> Result<Vec<String>, ValidationError> {
        let items = match self.required(field)? {
            Value::Array(items) => items,
            other => return Err(wrong_type(field, "array of strings", other)),
        };
        items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(wrong_type(field, "array of strings", other)),
            })
            .collect()
    }
}

/// A validated host snapshot, ready to become a store row.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemSnapshot {
    /// Free-form host description (e.g. `uname -a` output)
    pub info: String,
    /// CPU usage in percent
    pub cpu_usage: f64,
    /// Memory usage in percent
    pub memory_usage: f64,
    /// Mount path to disk usage statistics, kept verbatim
    pub disk_usage: Map<String, Value>,
    /// Process names in probe order
    pub processes: Vec<String>,
    /// Connection descriptors (`local remote STATUS`) in probe order
    pub connections: Vec<String>,
}

fn wrong_type(field: &'static str, expected: &'static str, found: &Value) -> ValidationError {
    ValidationError {
        field,
        issue: ValidationIssue::WrongType {
            expected,
            found: json_type_name(found),
        },
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
