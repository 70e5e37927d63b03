//! Diagnostic payload - untrusted snapshot of an OpenClaw installation
//!
//! The collection script produces a JSON document with these top-level groups:
//! - `system`    host facts (required, its absence invalidates the payload)
//! - `config`    the parsed `openclaw.json`
//! - `logs`      raw error/stderr blobs
//! - `workspace` derived workspace facts (personality file, memory file count)
//! - `openclaw`  gateway process status
//!
//! Nothing below the top-level groups is guaranteed. Accessors never panic:
//! a missing branch is `Ok(None)`, a branch of the wrong type is a `FieldError`.

use crate::error::{DoctorError, FieldError};
use serde_json::Value;

/// Validated diagnostic payload
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    root: Value,
}

impl Payload {
    /// Minimal shape validation: an object with a non-null `system` field
    pub fn from_value(root: Value) -> Result<Self, DoctorError> {
        let obj = root
            .as_object()
            .ok_or_else(|| DoctorError::invalid_payload("payload must be a JSON object"))?;

        match obj.get("system") {
            None | Some(Value::Null) => Err(DoctorError::invalid_payload(
                "missing required 'system' section",
            )),
            Some(_) => Ok(Self { root }),
        }
    }

    /// Raw JSON document, as received
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Walk a dot-separated path.
    ///
    /// Returns `Ok(None)` when any segment is absent or null and a
    /// `FieldError` when an intermediate node is not an object.
    pub fn value_at(&self, path: &str) -> Result<Option<&Value>, FieldError> {
        let mut current = &self.root;
        let mut walked = String::new();

        for segment in path.split('.') {
            match current {
                Value::Object(map) => match map.get(segment) {
                    Some(Value::Null) | None => return Ok(None),
                    Some(next) => current = next,
                },
                other => {
                    return Err(FieldError {
                        path: walked,
                        expected: "object",
                        found: kind(other),
                    })
                }
            }
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(segment);
        }

        Ok(Some(current))
    }

    pub fn bool_at(&self, path: &str) -> Result<Option<bool>, FieldError> {
        match self.value_at(path)? {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(mismatch(path, "boolean", other)),
        }
    }

    pub fn str_at(&self, path: &str) -> Result<Option<&str>, FieldError> {
        match self.value_at(path)? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(mismatch(path, "string", other)),
        }
    }

    /// Non-negative integer; fractional values are truncated
    pub fn u64_at(&self, path: &str) -> Result<Option<u64>, FieldError> {
        match self.value_at(path)? {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .map(Some)
                .ok_or_else(|| FieldError {
                    path: path.to_string(),
                    expected: "non-negative number",
                    found: "negative number",
                }),
            Some(other) => Err(mismatch(path, "number", other)),
        }
    }

    /// Text blob at `path`; arrays of strings are joined line by line.
    /// A missing blob is the empty string.
    pub fn text_at(&self, path: &str) -> Result<String, FieldError> {
        match self.value_at(path)? {
            None => Ok(String::new()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Array(items)) => {
                let mut lines = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => lines.push(s.as_str()),
                        Value::Null => {}
                        other => return Err(mismatch(path, "array of strings", other)),
                    }
                }
                Ok(lines.join("\n"))
            }
            Some(other) => Err(mismatch(path, "string", other)),
        }
    }
}

fn mismatch(path: &str, expected: &'static str, found: &Value) -> FieldError {
    FieldError {
        path: path.to_string(),
        expected,
        found: kind(found),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
