//! Bounded execution history.
//!
//! Newest entries first, at most [`HISTORY_CAPACITY`] kept. The log is
//! mirrored to the key-value store on every change; a failed write is
//! logged and otherwise ignored.

use crate::node::NodeStatus;
use crate::store::KeyValueStore;
use canvasflow_core::HistoryEntryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::Arc;

/// Maximum number of entries retained.
pub const HISTORY_CAPACITY: usize = 50;

const STORE_KEY: &str = "execution-history";

/// What caused an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    /// A single node tested in isolation.
    Test,
    /// A run started by a chat message.
    Chat,
    /// A manual or custom run of the whole workflow.
    Workflow,
}

/// A record of one node execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub node_type: String,
    pub node_name: String,
    pub status: NodeStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub source: HistorySource,
    pub output: String,
    /// Milliseconds between start and end.
    pub duration: i64,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(
        node_type: impl Into<String>,
        node_name: impl Into<String>,
        status: NodeStatus,
        source: HistorySource,
        output: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryEntryId::new(),
            node_type: node_type.into(),
            node_name: node_name.into(),
            status,
            start_time,
            end_time,
            source,
            output: output.into(),
            duration: (end_time - start_time).num_milliseconds(),
        }
    }
}

/// Renders a node output for the history: strings verbatim, anything
/// else as pretty-printed JSON.
#[must_use]
pub fn render_output(output: Option<&JsonValue>) -> String {
    match output {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Newest-first ring buffer of executions.
pub struct ExecutionHistoryLog {
    entries: VecDeque<HistoryEntry>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl std::fmt::Debug for ExecutionHistoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHistoryLog")
            .field("entries", &self.entries.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl Default for ExecutionHistoryLog {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ExecutionHistoryLog {
    /// A log that is never persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
            store: None,
        }
    }

    /// Opens a persisted log, restoring any saved entries.
    ///
    /// An unreadable saved copy starts an empty log.
    #[must_use]
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let mut entries: VecDeque<HistoryEntry> = match store.get(STORE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
                Ok(saved) => saved.into(),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding unreadable execution history");
                    VecDeque::new()
                }
            },
            Ok(None) => VecDeque::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load execution history");
                VecDeque::new()
            }
        };
        entries.truncate(HISTORY_CAPACITY);
        Self {
            entries,
            store: Some(store),
        }
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let result = serde_json::to_string(&self.entries)
            .map_err(|e| e.to_string())
            .and_then(|raw| store.set(STORE_KEY, &raw).map_err(|e| e.to_string()));
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist execution history");
        }
    }

    /// Prepends an entry, evicting the oldest beyond capacity.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(HISTORY_CAPACITY);
        self.persist();
    }

    /// Empties the log and deletes the saved copy.
    pub fn clear(&mut self) {
        self.entries.clear();
        if let Some(store) = &self.store
            && let Err(e) = store.delete(STORE_KEY)
        {
            tracing::warn!(error = %e, "Failed to delete execution history");
        }
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
