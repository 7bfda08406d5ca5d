//! Error types for the workflow crate.
//!
//! - `GraphError`: structural edits on the graph store
//! - `DocumentError`: importing a workflow document
//!
//! Store, engine and run errors live next to the traits that produce them
//! (`store`, `engine`, `orchestrator`).

use crate::connection::ConnectionRejected;
use crate::node::NodeId;
use std::fmt;

/// Errors from graph operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The node type is not in the catalog.
    UnknownNodeType { type_id: String },
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// A trigger of this type already exists in the workflow.
    DuplicateTrigger { type_id: String },
    /// The connection validator refused an edge.
    Connection(ConnectionRejected),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNodeType { type_id } => write!(f, "unknown node type: {type_id}"),
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::DuplicateTrigger { type_id } => {
                write!(f, "workflow already contains a '{type_id}' trigger")
            }
            Self::Connection(rejected) => write!(f, "{rejected}"),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<ConnectionRejected> for GraphError {
    fn from(e: ConnectionRejected) -> Self {
        Self::Connection(e)
    }
}

/// Errors from importing a workflow document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The document is not valid JSON.
    Json { message: String },
    /// The document is JSON but not a workflow.
    InvalidFormat { reason: String },
    /// The nodes violate a graph invariant.
    Graph(GraphError),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json { message } => write!(f, "invalid JSON: {message}"),
            Self::InvalidFormat { reason } => write!(f, "invalid workflow format: {reason}"),
            Self::Graph(e) => write!(f, "invalid workflow: {e}"),
        }
    }
}

impl std::error::Error for DocumentError {}

impl From<GraphError> for DocumentError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}
