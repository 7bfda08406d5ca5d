//! Contract with the remote execution engine.
//!
//! The engine owns node execution semantics. This client only creates,
//! updates and deletes workflow resources, asks for an execution, and
//! reads back the per-node results to replay.

use crate::edge::EdgeInstance;
use crate::node::{NodeId, NodePayload, NodeStatus};
use async_trait::async_trait;
use canvasflow_core::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a workflow resource on the engine.
///
/// Engines return either JSON strings or numbers; both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RemoteWorkflowId(String);

impl RemoteWorkflowId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteWorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RemoteWorkflowId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

/// Body of create and update requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSubmission {
    pub name: String,
    pub description: String,
    pub nodes: Vec<NodePayload>,
    pub edges: Vec<EdgeInstance>,
}

/// Response of create and update requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowCreated {
    pub id: RemoteWorkflowId,
}

/// Body of an execute request.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ExecutionRequest {
    pub trigger_data: Map<String, JsonValue>,
    pub credentials: Map<String, JsonValue>,
}

/// Top-level outcome reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteRunStatus {
    Completed,
    Error,
    #[serde(other)]
    Other,
}

/// Result of a single node as reported by the engine.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct NodeResult {
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub output: Option<JsonValue>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub timestamp: Option<JsonValue>,
}

/// Per-node results of an execution.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ExecutionReport {
    /// Results keyed by node id. Iterates in sorted id order.
    #[serde(default)]
    pub node_states: BTreeMap<NodeId, NodeResult>,
    /// The order the engine ran nodes in, when it reports one.
    #[serde(default)]
    pub execution_order: Option<Vec<NodeId>>,
}

/// Response of an execute request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecuteResponse {
    #[serde(default)]
    pub execution_id: Option<String>,
    pub status: RemoteRunStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution: ExecutionReport,
}

/// Structural validation performed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Errors talking to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The request could not be sent or the connection failed.
    Request { message: String },
    /// The engine did not answer in time.
    Timeout,
    /// The engine answered with a non-success status.
    Status { status: u16, message: String },
    /// The response body was not what we expected.
    Decode { message: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request { message } => write!(f, "engine request failed: {message}"),
            Self::Timeout => write!(f, "engine request timed out"),
            Self::Status { status, message } => {
                write!(f, "engine returned HTTP {status}: {message}")
            }
            Self::Decode { message } => write!(f, "unexpected engine response: {message}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Trait for the remote execution engine.
///
/// Allows the orchestrator to be tested without a running engine.
#[async_trait]
pub trait RemoteEngine: Send + Sync {
    /// Creates a workflow resource.
    async fn create_workflow(
        &self,
        submission: &WorkflowSubmission,
    ) -> Result<RemoteWorkflowId, EngineError>;

    /// Replaces a workflow resource.
    async fn update_workflow(
        &self,
        id: &RemoteWorkflowId,
        submission: &WorkflowSubmission,
    ) -> Result<RemoteWorkflowId, EngineError>;

    /// Deletes a workflow resource.
    async fn delete_workflow(&self, id: &RemoteWorkflowId) -> Result<(), EngineError>;

    /// Runs a workflow resource to completion.
    async fn execute_workflow(
        &self,
        id: &RemoteWorkflowId,
        request: &ExecutionRequest,
    ) -> Result<ExecuteResponse, EngineError>;

    /// Checks a graph's structure without storing it.
    async fn validate_workflow(
        &self,
        nodes: &[NodePayload],
        edges: &[EdgeInstance],
    ) -> Result<ValidationReport, EngineError>;
}
