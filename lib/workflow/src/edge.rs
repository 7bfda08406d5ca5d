//! Edge types for workflow graphs.
//!
//! An edge connects an output port (source handle) on one node to an input
//! port (target handle) on another. Handles default to `"main"` and the
//! edge id is derived from the full connection tuple, so two edges with the
//! same endpoints and handles always share an id.

use crate::node::NodeId;
use crate::port::DEFAULT_PORT;
use serde::{Deserialize, Serialize};

/// Rendering hint derived from the connected ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Workflow data between `main` ports.
    #[default]
    Data,
    /// At least one endpoint is an `ai` port.
    Capability,
}

/// Derives the deterministic edge id for a connection tuple.
#[must_use]
pub fn edge_id(
    source: &NodeId,
    target: &NodeId,
    source_handle: &str,
    target_handle: &str,
) -> String {
    format!("e{source}-{target}-{source_handle}-{target_handle}")
}

fn normalize(handle: Option<String>) -> String {
    handle
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| DEFAULT_PORT.to_string())
}

/// A requested connection, before admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeProposal {
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: String,
    pub target_handle: String,
}

impl EdgeProposal {
    /// Creates a proposal between the `main` ports of two nodes.
    #[must_use]
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: DEFAULT_PORT.to_string(),
            target_handle: DEFAULT_PORT.to_string(),
        }
    }

    /// Sets the output port. `None` or empty selects `"main"`.
    #[must_use]
    pub fn with_source_handle(mut self, handle: Option<impl Into<String>>) -> Self {
        self.source_handle = normalize(handle.map(Into::into));
        self
    }

    /// Sets the input port. `None` or empty selects `"main"`.
    #[must_use]
    pub fn with_target_handle(mut self, handle: Option<impl Into<String>>) -> Self {
        self.target_handle = normalize(handle.map(Into::into));
        self
    }

    /// The id the admitted edge will carry.
    #[must_use]
    pub fn edge_id(&self) -> String {
        edge_id(&self.source, &self.target, &self.source_handle, &self.target_handle)
    }
}

/// An admitted edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "EdgeRecord")]
pub struct EdgeInstance {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: String,
    pub target_handle: String,
    #[serde(default)]
    pub kind: EdgeKind,
}

impl EdgeInstance {
    /// Builds the edge for an admitted proposal.
    #[must_use]
    pub fn from_proposal(proposal: &EdgeProposal, kind: EdgeKind) -> Self {
        Self {
            id: proposal.edge_id(),
            source: proposal.source.clone(),
            target: proposal.target.clone(),
            source_handle: proposal.source_handle.clone(),
            target_handle: proposal.target_handle.clone(),
            kind,
        }
    }

    /// The proposal that would recreate this edge.
    #[must_use]
    pub fn proposal(&self) -> EdgeProposal {
        EdgeProposal {
            source: self.source.clone(),
            target: self.target.clone(),
            source_handle: self.source_handle.clone(),
            target_handle: self.target_handle.clone(),
        }
    }

    /// Value equality on the connection tuple, ignoring id and kind.
    #[must_use]
    pub fn connects(&self, proposal: &EdgeProposal) -> bool {
        self.source == proposal.source
            && self.target == proposal.target
            && self.source_handle == proposal.source_handle
            && self.target_handle == proposal.target_handle
    }

    /// Returns true if `node_id` is either endpoint.
    #[must_use]
    pub fn touches(&self, node_id: &NodeId) -> bool {
        &self.source == node_id || &self.target == node_id
    }
}

/// Lenient edge shape accepted from documents: id and handles optional.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EdgeRecord {
    #[serde(default)]
    id: Option<String>,
    source: NodeId,
    target: NodeId,
    #[serde(default)]
    source_handle: Option<String>,
    #[serde(default)]
    target_handle: Option<String>,
    #[serde(default)]
    kind: EdgeKind,
}

impl From<EdgeRecord> for EdgeInstance {
    fn from(record: EdgeRecord) -> Self {
        let source_handle = normalize(record.source_handle);
        let target_handle = normalize(record.target_handle);
        let id = record
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| {
                edge_id(&record.source, &record.target, &source_handle, &target_handle)
            });
        Self {
            id,
            source: record.source,
            target: record.target,
            source_handle,
            target_handle,
            kind: record.kind,
        }
    }
}
