//! Per-node configuration storage.
//!
//! Entries are keyed by node id and live independently of node instances:
//! import restores entries before any node exists, duplication copies an
//! entry to a new id, and deletion of a node deletes its entry explicitly.
//!
//! Reads and writes never fail the caller. A broken or unavailable store
//! degrades to "no saved properties" and is logged.

use crate::catalog::NodeTypeDefinition;
use crate::node::NodeId;
use crate::store::{KeyValueStore, StoreError};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

const KEY_PREFIX: &str = "properties:";

/// Durable node configuration keyed by node id.
#[derive(Clone)]
pub struct PropertyStore {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyStore").finish_non_exhaustive()
    }
}

fn key(node_id: &NodeId) -> String {
    format!("{KEY_PREFIX}{node_id}")
}

impl PropertyStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Reads the saved properties, surfacing store failures.
    ///
    /// An absent entry is an empty map.
    ///
    /// # Errors
    ///
    /// Returns the store error, or `Corrupt` if the entry is not a JSON object.
    pub fn try_get(&self, node_id: &NodeId) -> Result<Map<String, JsonValue>, StoreError> {
        let key = key(node_id);
        let Some(raw) = self.store.get(&key)? else {
            return Ok(Map::new());
        };
        match serde_json::from_str::<JsonValue>(&raw) {
            Ok(JsonValue::Object(map)) => Ok(map),
            Ok(other) => Err(StoreError::Corrupt {
                key,
                message: format!("expected an object, found {other}"),
            }),
            Err(e) => Err(StoreError::Corrupt {
                key,
                message: e.to_string(),
            }),
        }
    }

    /// Reads the saved properties. Failures degrade to an empty map.
    #[must_use]
    pub fn get(&self, node_id: &NodeId) -> Map<String, JsonValue> {
        self.try_get(node_id).unwrap_or_else(|e| {
            tracing::warn!(error = %e, node_id = %node_id, "Failed to read node properties");
            Map::new()
        })
    }

    /// Returns true if an entry exists for this node.
    #[must_use]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        matches!(self.store.get(&key(node_id)), Ok(Some(_)))
    }

    /// Replaces the saved properties, surfacing store failures.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub fn try_set(
        &self,
        node_id: &NodeId,
        properties: &Map<String, JsonValue>,
    ) -> Result<(), StoreError> {
        let raw = JsonValue::Object(properties.clone()).to_string();
        self.store.set(&key(node_id), &raw)
    }

    /// Replaces the saved properties. Last write wins; no merging.
    pub fn set(&self, node_id: &NodeId, properties: &Map<String, JsonValue>) {
        if let Err(e) = self.try_set(node_id, properties) {
            tracing::warn!(error = %e, node_id = %node_id, "Failed to save node properties");
        }
    }

    /// Copies the entry of `from` to `to`. Does nothing if `from` has none.
    pub fn clone_entry(&self, from: &NodeId, to: &NodeId) {
        let properties = self.get(from);
        if !properties.is_empty() {
            self.set(to, &properties);
        }
    }

    /// Removes the entry for this node.
    pub fn delete(&self, node_id: &NodeId) {
        if let Err(e) = self.store.delete(&key(node_id)) {
            tracing::warn!(error = %e, node_id = %node_id, "Failed to delete node properties");
        }
    }

    /// Type defaults overlaid with saved properties; saved values win.
    #[must_use]
    pub fn effective(
        &self,
        definition: Option<&NodeTypeDefinition>,
        node_id: &NodeId,
    ) -> Map<String, JsonValue> {
        let mut properties = definition.map(NodeTypeDefinition::defaults).unwrap_or_default();
        properties.extend(self.get(node_id));
        properties
    }
}
