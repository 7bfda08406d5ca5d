//! Edge admission.
//!
//! The validator is a pure function of the catalog, the endpoint node types
//! and the existing edges. It never mutates the graph; callers apply the
//! edge only when admission succeeds.
//!
//! Checks, in order:
//! 1. both endpoint nodes exist
//! 2. port compatibility (when both ports resolve in the catalog)
//! 3. the target input's connection limit
//! 4. value-based duplicate detection

use crate::catalog::NodeTypeCatalog;
use crate::edge::{EdgeInstance, EdgeKind, EdgeProposal};
use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionReason {
    TypeMismatch,
    LimitReached,
    Duplicate,
    MissingNode,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TypeMismatch => "type-mismatch",
            Self::LimitReached => "limit-reached",
            Self::Duplicate => "duplicate",
            Self::MissingNode => "missing-node",
        };
        f.write_str(s)
    }
}

/// A refused connection with a structured reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRejected {
    pub reason: RejectionReason,
    pub source_handle: String,
    pub target_handle: String,
    /// Human-readable detail for display.
    pub detail: String,
}

impl ConnectionRejected {
    fn new(reason: RejectionReason, proposal: &EdgeProposal, detail: String) -> Self {
        Self {
            reason,
            source_handle: proposal.source_handle.clone(),
            target_handle: proposal.target_handle.clone(),
            detail,
        }
    }

    pub(crate) fn missing_node(proposal: &EdgeProposal, node_id: &NodeId) -> Self {
        Self::new(
            RejectionReason::MissingNode,
            proposal,
            format!("node {node_id} does not exist"),
        )
    }
}

impl fmt::Display for ConnectionRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection rejected ({}): {}", self.reason, self.detail)
    }
}

impl std::error::Error for ConnectionRejected {}

/// Decides whether proposed edges may be created.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionValidator<'a> {
    catalog: &'a NodeTypeCatalog,
}

impl<'a> ConnectionValidator<'a> {
    #[must_use]
    pub fn new(catalog: &'a NodeTypeCatalog) -> Self {
        Self { catalog }
    }

    /// Checks `proposal` against the existing edges.
    ///
    /// `source_type` and `target_type` are the type ids of the endpoint
    /// nodes, or `None` when the node does not exist. A node whose type is
    /// unknown to the catalog has no resolvable ports, so only the
    /// duplicate check applies to it.
    ///
    /// On success returns the edge kind to tag the new edge with.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a [`ConnectionRejected`].
    pub fn admit<'e>(
        &self,
        proposal: &EdgeProposal,
        source_type: Option<&str>,
        target_type: Option<&str>,
        existing: impl IntoIterator<Item = &'e EdgeInstance> + Clone,
    ) -> Result<EdgeKind, ConnectionRejected> {
        let (Some(source_type), Some(target_type)) = (source_type, target_type) else {
            let missing = if source_type.is_none() {
                &proposal.source
            } else {
                &proposal.target
            };
            return Err(ConnectionRejected::missing_node(proposal, missing));
        };

        let source_output = self
            .catalog
            .get(source_type)
            .and_then(|d| d.output(&proposal.source_handle));
        let target_input = self
            .catalog
            .get(target_type)
            .and_then(|d| d.input(&proposal.target_handle));

        if let (Some(output), Some(input)) = (source_output, target_input)
            && !input.accepts(output)
        {
            return Err(ConnectionRejected::new(
                RejectionReason::TypeMismatch,
                proposal,
                format!(
                    "cannot connect {:?} output '{}' to {:?} input '{}'",
                    output.semantic_type, output.name, input.semantic_type, input.name
                ),
            ));
        }

        if let Some(limit) = target_input.and_then(|input| input.connection_limit()) {
            let count = existing
                .clone()
                .into_iter()
                .filter(|e| {
                    e.target == proposal.target && e.target_handle == proposal.target_handle
                })
                .count();
            if count >= limit {
                return Err(ConnectionRejected::new(
                    RejectionReason::LimitReached,
                    proposal,
                    format!(
                        "input '{}' accepts at most {limit} connection(s)",
                        proposal.target_handle
                    ),
                ));
            }
        }

        if existing.into_iter().any(|e| e.connects(proposal)) {
            return Err(ConnectionRejected::new(
                RejectionReason::Duplicate,
                proposal,
                format!("edge {} already exists", proposal.edge_id()),
            ));
        }

        let capability = source_output.is_some_and(|p| p.semantic_type.is_capability())
            || target_input.is_some_and(|p| p.semantic_type.is_capability());
        Ok(if capability {
            EdgeKind::Capability
        } else {
            EdgeKind::Data
        })
    }
}
