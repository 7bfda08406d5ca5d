//! Node instances placed on a workflow canvas.
//!
//! A node instance references a node type by id and carries its position,
//! label, a (possibly stale) mirror of its configuration and the visual
//! execution state applied during replay. The property store, not the
//! mirror, is authoritative at execution time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use ulid::Ulid;

/// A unique identifier for a node within a workflow.
///
/// Imported documents and the remote engine use arbitrary strings, so
/// this wraps a string rather than a ULID. Locally created nodes get a
/// `node_`-prefixed ULID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new random node ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("node_{}", Ulid::new()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns this position shifted by `(dx, dy)`.
    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// The visual execution status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
    Skipped,
    /// A status reported by the engine that this client does not know.
    #[serde(other)]
    Unknown,
}

impl NodeStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Skipped)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Visual execution state applied to a node during replay.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStateView {
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Timestamp reported by the engine, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<JsonValue>,
}

impl ExecutionStateView {
    /// The placeholder shown while a node is being replayed.
    #[must_use]
    pub fn running(started_at: DateTime<Utc>) -> Self {
        Self {
            status: NodeStatus::Running,
            output: Some(JsonValue::String("Executing...".to_string())),
            started_at: Some(started_at),
            ..Self::default()
        }
    }
}

/// A placed, configured occurrence of a node type.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInstance {
    pub id: NodeId,
    pub type_id: String,
    pub position: Position,
    pub label: String,
    /// Mirror of the stored configuration. May be stale.
    pub properties: Map<String, JsonValue>,
    pub execution_state: Option<ExecutionStateView>,
}

impl NodeInstance {
    /// Creates a node with a fresh id and no configuration.
    #[must_use]
    pub fn new(type_id: impl Into<String>, label: impl Into<String>, position: Position) -> Self {
        Self {
            id: NodeId::new(),
            type_id: type_id.into(),
            position,
            label: label.into(),
            properties: Map::new(),
            execution_state: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Map<String, JsonValue>) -> Self {
        self.properties = properties;
        self
    }

    /// Returns the status shown on the node, `Idle` if never run.
    #[must_use]
    pub fn status(&self) -> NodeStatus {
        self.execution_state
            .as_ref()
            .map_or(NodeStatus::Idle, |s| s.status)
    }
}

/// The `data` block of a serialized node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    #[serde(rename = "type")]
    pub type_id: String,
    pub label: String,
    #[serde(default)]
    pub properties: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_state: Option<ExecutionStateView>,
}

/// Serialized node shape shared by export documents and engine submissions:
/// `{id, type, data: {type, label, properties}, position: {x, y}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub type_id: String,
    pub data: NodeData,
    #[serde(default)]
    pub position: Position,
}

impl NodePayload {
    /// Builds the payload for `node` with the given properties.
    ///
    /// The execution state is never carried in payloads.
    #[must_use]
    pub fn new(node: &NodeInstance, properties: Map<String, JsonValue>) -> Self {
        Self {
            id: node.id.clone(),
            type_id: node.type_id.clone(),
            data: NodeData {
                type_id: node.type_id.clone(),
                label: node.label.clone(),
                properties,
                execution_state: None,
            },
            position: node.position,
        }
    }

    /// Converts the payload back into a node instance.
    #[must_use]
    pub fn into_instance(self) -> NodeInstance {
        NodeInstance {
            id: self.id,
            type_id: self.data.type_id,
            position: self.position,
            label: self.data.label,
            properties: self.data.properties,
            execution_state: None,
        }
    }
}
