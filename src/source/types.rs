//! Observation batches and their JSON line format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// One tick worth of detection counts, keyed by class name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Time the batch was read
    pub received_at: DateTime<Utc>,
    /// Detected count per key; absent keys count as zero
    pub counts: HashMap<String, i64>,
}

impl Observation {
    pub fn new(counts: HashMap<String, i64>) -> Self {
        Self {
            received_at: Utc::now(),
            counts,
        }
    }

    /// Parse a single JSON object line such as `{"person": 2, "dog": 0}`.
    pub fn parse_line(line: &str) -> Result<Self, SourceError> {
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| SourceError::Malformed(e.to_string()))?;
        Ok(Self::new(parse_counts(&value)?))
    }
}

/// Convert a JSON object into per-key counts.
///
/// Numbers are truncated toward zero; `null` counts as zero. Values outside
/// the `i64` range are rejected.
pub fn parse_counts(value: &serde_json::Value) -> Result<HashMap<String, i64>, SourceError> {
    let object = value.as_object().ok_or(SourceError::NotAnObject)?;

    let mut counts = HashMap::with_capacity(object.len());
    for (key, raw) in object {
        let count = match raw {
            serde_json::Value::Null => 0,
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => i,
                None => n
                    .as_f64()
                    .map(f64::trunc)
                    .filter(|f| (i64::MIN as f64..i64::MAX as f64).contains(f))
                    .map(|f| f as i64)
                    .ok_or_else(|| SourceError::InvalidValue { key: key.clone() })?,
            },
            _ => return Err(SourceError::InvalidValue { key: key.clone() }),
        };
        counts.insert(key.clone(), count);
    }
    Ok(counts)
}

/// Errors raised while reading observations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source has already been started")]
    AlreadyStarted,
    #[error("malformed observation: {0}")]
    Malformed(String),
    #[error("observation must be a JSON object")]
    NotAnObject,
    #[error("value for '{key}' is not a count in the i64 range")]
    InvalidValue { key: String },
}
