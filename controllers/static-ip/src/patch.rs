//! Snapshot and merge patch.
//!
//! Reconcilers capture a [`Snapshot`] before touching a resource, mutate a
//! working copy, then send only the difference as an RFC 7396 merge patch.
//! The patch carries the snapshot's resourceVersion so a concurrent edit
//! makes the API server reject it.

use crate::error::StoreError;
use kube::Resource;
use serde::Serialize;
use serde_json::{Map, Value};

/// JSON baseline of a resource taken before mutation
#[derive(Debug, Clone)]
pub struct Snapshot {
    baseline: Value,
    resource_version: Option<String>,
}

impl Snapshot {
    pub fn capture<K>(resource: &K) -> Result<Self, StoreError>
    where
        K: Resource + Serialize,
    {
        Ok(Self {
            baseline: serde_json::to_value(resource)?,
            resource_version: resource.meta().resource_version.clone(),
        })
    }

    /// Merge patch turning the baseline into `working`, `None` when nothing changed
    pub fn merge_patch<K: Serialize>(&self, working: &K) -> Result<Option<Value>, StoreError> {
        let modified = serde_json::to_value(working)?;
        let mut patch = create_merge_patch(&self.baseline, &modified);
        if patch.as_object().is_none_or(Map::is_empty) {
            return Ok(None);
        }

        if let (Some(rv), Some(fields)) = (&self.resource_version, patch.as_object_mut()) {
            let metadata = fields
                .entry("metadata")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(metadata) = metadata.as_object_mut() {
                metadata.insert("resourceVersion".to_string(), Value::String(rv.clone()));
            }
        }
        Ok(Some(patch))
    }
}

/// RFC 7396 merge patch from `original` to `modified`.
///
/// Objects are diffed key by key; removed keys become `null`. Any other
/// value, arrays included, is replaced wholesale.
pub fn create_merge_patch(original: &Value, modified: &Value) -> Value {
    match (original, modified) {
        (Value::Object(original), Value::Object(modified)) => {
            let mut patch = Map::new();
            for (key, value) in modified {
                match original.get(key) {
                    Some(old) if old == value => {}
                    Some(old @ Value::Object(_)) if value.is_object() => {
                        patch.insert(key.clone(), create_merge_patch(old, value));
                    }
                    _ => {
                        patch.insert(key.clone(), value.clone());
                    }
                }
            }
            for key in original.keys() {
                if !modified.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        (_, modified) => modified.clone(),
    }
}
