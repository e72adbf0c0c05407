//! Payload rendering.

use crate::core::Delta;
use crate::publish::PublishError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt::Display;

/// Render one change as `{name}_{key}={value}`.
pub fn format_delta<V: Display>(name: &str, delta: &Delta<V>) -> String {
    format!("{}_{}={}", name, delta.key, delta.value)
}

/// Render the full reported state as a JSON object, keys in the given order.
pub fn format_snapshot<V: Serialize>(entries: &[Delta<V>]) -> Result<String, PublishError> {
    serde_json::to_string(&OrderedSnapshot(entries))
        .map_err(|e| PublishError::Serialization(e.to_string()))
}

struct OrderedSnapshot<'a, V>(&'a [Delta<V>]);

impl<V: Serialize> Serialize for OrderedSnapshot<'_, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for delta in self.0 {
            map.serialize_entry(&delta.key, &delta.value)?;
        }
        map.end()
    }
}
