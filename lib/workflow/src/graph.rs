//! The authoritative workflow graph.
//!
//! Nodes and edges live in a petgraph `StableDiGraph` so indices survive
//! removals, with a side map from `NodeId` to index for O(1) lookup. Every
//! edit keeps these invariants:
//!
//! - every edge's endpoints exist
//! - no input exceeds its connection limit
//! - at most one node per trigger type
//! - no two edges share a `(source, target, sourceHandle, targetHandle)` tuple
//!
//! Interactive callbacks are not stored on nodes. The presentation layer
//! registers a [`NodeHandlers`] implementation which is re-attached to every
//! node produced by an edit.

use crate::catalog::NodeTypeCatalog;
use crate::connection::{ConnectionRejected, ConnectionValidator};
use crate::edge::{EdgeInstance, EdgeProposal};
use crate::error::GraphError;
use crate::node::{ExecutionStateView, NodeId, NodeInstance, Position};
use crate::property::PropertyStore;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Offset applied to a duplicated node's position.
pub const DUPLICATE_OFFSET: f64 = 50.0;

/// Capability interface implemented by the presentation layer.
///
/// All methods default to no-ops.
pub trait NodeHandlers: Send + Sync {
    /// Called for every node produced by an edit, and for every node when
    /// handlers are installed.
    fn attach(&self, _node: &NodeInstance) {}

    /// Called after a node leaves the graph.
    fn detach(&self, _node_id: &NodeId) {}

    /// Called after a node's execution state changes.
    fn execution_state_changed(&self, _node: &NodeInstance) {}
}

/// An incremental node edit.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    Move { id: NodeId, position: Position },
    Remove { id: NodeId },
}

/// An incremental edge edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeChange {
    Remove { id: String },
}

/// An edge that was refused while loading a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEdge {
    pub edge: EdgeInstance,
    pub reason: ConnectionRejected,
}

/// Owns the nodes and edges of the current workflow.
pub struct GraphStore {
    catalog: Arc<NodeTypeCatalog>,
    properties: PropertyStore,
    graph: StableDiGraph<NodeInstance, EdgeInstance>,
    node_index_map: HashMap<NodeId, NodeIndex>,
    handlers: Option<Arc<dyn NodeHandlers>>,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish_non_exhaustive()
    }
}

impl GraphStore {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(catalog: Arc<NodeTypeCatalog>, properties: PropertyStore) -> Self {
        Self {
            catalog,
            properties,
            graph: StableDiGraph::new(),
            node_index_map: HashMap::new(),
            handlers: None,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &NodeTypeCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    /// Installs the presentation handlers and attaches them to every node.
    pub fn set_handlers(&mut self, handlers: Arc<dyn NodeHandlers>) {
        for node in self.graph.node_weights() {
            handlers.attach(node);
        }
        self.handlers = Some(handlers);
    }

    fn attach(&self, node: &NodeInstance) {
        if let Some(handlers) = &self.handlers {
            handlers.attach(node);
        }
    }

    fn detach(&self, node_id: &NodeId) {
        if let Some(handlers) = &self.handlers {
            handlers.detach(node_id);
        }
    }

    /// Returns a node by its ID.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&NodeInstance> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    fn node_mut(&mut self, node_id: &NodeId) -> Option<&mut NodeInstance> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight_mut(*index)
    }

    #[must_use]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.node_index_map.contains_key(node_id)
    }

    /// Returns all nodes in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeInstance> {
        self.graph.node_weights()
    }

    /// Returns all edges in the graph.
    pub fn edges(&self) -> impl Iterator<Item = &EdgeInstance> {
        self.graph.edge_weights()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the first node of the given type.
    #[must_use]
    pub fn find_by_type(&self, type_id: &str) -> Option<&NodeInstance> {
        self.nodes().find(|n| n.type_id == type_id)
    }

    /// Returns true if a trigger node of this type already exists.
    ///
    /// Always false for non-trigger types.
    #[must_use]
    pub fn has_trigger(&self, type_id: &str) -> bool {
        self.catalog.is_trigger(type_id) && self.find_by_type(type_id).is_some()
    }

    /// Returns the edges incident to a node.
    pub fn edges_touching<'a>(
        &'a self,
        node_id: &'a NodeId,
    ) -> impl Iterator<Item = &'a EdgeInstance> {
        self.edges().filter(move |e| e.touches(node_id))
    }

    fn insert(&mut self, node: NodeInstance) -> NodeIndex {
        let node_id = node.id.clone();
        let index = self.graph.add_node(node);
        self.node_index_map.insert(node_id, index);
        index
    }

    /// Places a new node of `type_id` at `position`.
    ///
    /// The label defaults to the type's display name and the property
    /// mirror to the type's defaults.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNodeType` for types missing from the catalog and
    /// `DuplicateTrigger` if a trigger of this type already exists.
    pub fn add_node(
        &mut self,
        type_id: &str,
        position: Position,
    ) -> Result<NodeInstance, GraphError> {
        let definition = self
            .catalog
            .get(type_id)
            .ok_or_else(|| GraphError::UnknownNodeType {
                type_id: type_id.to_string(),
            })?;
        if self.has_trigger(type_id) {
            return Err(GraphError::DuplicateTrigger {
                type_id: type_id.to_string(),
            });
        }

        let node = NodeInstance::new(type_id, definition.display_name.clone(), position)
            .with_properties(definition.defaults());
        tracing::debug!(node_id = %node.id, type_id, "Adding node");
        self.insert(node.clone());
        self.attach(&node);
        Ok(node)
    }

    /// Removes a node, its incident edges and its stored properties.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if the node does not exist.
    pub fn remove_node(&mut self, node_id: &NodeId) -> Result<NodeInstance, GraphError> {
        let index = self
            .node_index_map
            .remove(node_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.clone(),
            })?;
        // StableGraph drops incident edges with the node.
        let node = self
            .graph
            .remove_node(index)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.clone(),
            })?;
        self.properties.delete(node_id);
        self.detach(node_id);
        tracing::debug!(node_id = %node_id, "Removed node");
        Ok(node)
    }

    /// Copies a node under a fresh id.
    ///
    /// The copy is offset by [`DUPLICATE_OFFSET`] in both axes, labelled
    /// `"<label> (Copy)"` and receives a copy of the stored properties.
    /// Edges are not copied.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if the node does not exist, and
    /// `DuplicateTrigger` for trigger nodes.
    pub fn duplicate_node(&mut self, node_id: &NodeId) -> Result<NodeInstance, GraphError> {
        let source = self
            .node(node_id)
            .ok_or_else(|| GraphError::NodeNotFound {
                node_id: node_id.clone(),
            })?;
        if self.catalog.is_trigger(&source.type_id) {
            return Err(GraphError::DuplicateTrigger {
                type_id: source.type_id.clone(),
            });
        }

        let copy = NodeInstance::new(
            source.type_id.clone(),
            format!("{} (Copy)", source.label),
            source.position.offset(DUPLICATE_OFFSET, DUPLICATE_OFFSET),
        )
        .with_properties(source.properties.clone());
        self.properties.clone_entry(node_id, &copy.id);
        tracing::debug!(source = %node_id, node_id = %copy.id, "Duplicated node");
        self.insert(copy.clone());
        self.attach(&copy);
        Ok(copy)
    }

    fn node_type(&self, node_id: &NodeId) -> Option<&str> {
        self.node(node_id).map(|n| n.type_id.as_str())
    }

    /// Admits and adds an edge.
    ///
    /// # Errors
    ///
    /// Returns the validator's verdict when the edge is refused. The graph
    /// is unchanged in that case.
    pub fn apply_edge(
        &mut self,
        proposal: &EdgeProposal,
    ) -> Result<EdgeInstance, ConnectionRejected> {
        let existing: Vec<&EdgeInstance> = self.graph.edge_weights().collect();
        let kind = ConnectionValidator::new(&self.catalog).admit(
            proposal,
            self.node_type(&proposal.source),
            self.node_type(&proposal.target),
            existing.iter().copied(),
        )?;

        let edge = EdgeInstance::from_proposal(proposal, kind);
        let (Some(&source), Some(&target)) = (
            self.node_index_map.get(&proposal.source),
            self.node_index_map.get(&proposal.target),
        ) else {
            return Err(ConnectionRejected::missing_node(proposal, &proposal.target));
        };
        self.graph.add_edge(source, target, edge.clone());
        tracing::debug!(edge_id = %edge.id, kind = ?edge.kind, "Connected nodes");
        Ok(edge)
    }

    fn edge_index(&self, edge_id: &str) -> Option<EdgeIndex> {
        self.graph
            .edge_references()
            .find(|e| e.weight().id == edge_id)
            .map(|e| e.id())
    }

    /// Removes an edge by id.
    pub fn remove_edge(&mut self, edge_id: &str) -> Option<EdgeInstance> {
        let index = self.edge_index(edge_id)?;
        self.graph.remove_edge(index)
    }

    /// Removes every edge touching a node, returning the removed edges.
    pub fn remove_edges_touching(&mut self, node_id: &NodeId) -> Vec<EdgeInstance> {
        let indices: Vec<EdgeIndex> = self
            .graph
            .edge_references()
            .filter(|e| e.weight().touches(node_id))
            .map(|e| e.id())
            .collect();
        indices
            .into_iter()
            .filter_map(|index| self.graph.remove_edge(index))
            .collect()
    }

    /// Applies a batch of node edits. Edits naming missing nodes are skipped.
    pub fn apply_node_changes(&mut self, changes: impl IntoIterator<Item = NodeChange>) {
        for change in changes {
            match change {
                NodeChange::Move { id, position } => match self.node_mut(&id) {
                    Some(node) => node.position = position,
                    None => tracing::debug!(node_id = %id, "Ignoring move of missing node"),
                },
                NodeChange::Remove { id } => {
                    if let Err(e) = self.remove_node(&id) {
                        tracing::debug!(error = %e, "Ignoring node removal");
                    }
                }
            }
        }
    }

    /// Applies a batch of edge edits.
    pub fn apply_edge_changes(&mut self, changes: impl IntoIterator<Item = EdgeChange>) {
        for change in changes {
            match change {
                EdgeChange::Remove { id } => {
                    if self.remove_edge(&id).is_none() {
                        tracing::debug!(edge_id = %id, "Ignoring removal of missing edge");
                    }
                }
            }
        }
    }

    /// Renames a node.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if the node does not exist.
    pub fn set_label(
        &mut self,
        node_id: &NodeId,
        label: impl Into<String>,
    ) -> Result<(), GraphError> {
        let node = self.node_mut(node_id).ok_or_else(|| GraphError::NodeNotFound {
            node_id: node_id.clone(),
        })?;
        node.label = label.into();
        Ok(())
    }

    /// Merges `changes` into the node's stored properties and saves them.
    ///
    /// Returns the new effective properties, which also refresh the node's
    /// property mirror.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` if the node does not exist.
    pub fn update_properties(
        &mut self,
        node_id: &NodeId,
        changes: Map<String, JsonValue>,
    ) -> Result<Map<String, JsonValue>, GraphError> {
        if !self.contains(node_id) {
            return Err(GraphError::NodeNotFound {
                node_id: node_id.clone(),
            });
        }
        let mut stored = self.properties.get(node_id);
        stored.extend(changes);
        self.properties.set(node_id, &stored);

        let effective = self.effective_properties(node_id).unwrap_or_default();
        if let Some(node) = self.node_mut(node_id) {
            node.properties = effective.clone();
        }
        Ok(effective)
    }

    /// Type defaults overlaid with stored properties.
    #[must_use]
    pub fn effective_properties(&self, node_id: &NodeId) -> Option<Map<String, JsonValue>> {
        let node = self.node(node_id)?;
        Some(
            self.properties
                .effective(self.catalog.get(&node.type_id), node_id),
        )
    }

    /// Sets a node's visual execution state.
    ///
    /// Returns false if the node no longer exists.
    pub fn set_execution_state(
        &mut self,
        node_id: &NodeId,
        state: Option<ExecutionStateView>,
    ) -> bool {
        let Some(node) = self.node_mut(node_id) else {
            return false;
        };
        node.execution_state = state;
        let node = node.clone();
        if let Some(handlers) = &self.handlers {
            handlers.execution_state_changed(&node);
        }
        true
    }

    /// Resets every node to idle.
    pub fn clear_execution_states(&mut self) {
        let ids: Vec<NodeId> = self.node_index_map.keys().cloned().collect();
        for id in ids {
            self.set_execution_state(&id, None);
        }
    }

    /// Empties the workspace, deleting every node's stored properties.
    pub fn clear(&mut self) {
        let ids: Vec<NodeId> = self.node_index_map.keys().cloned().collect();
        for id in &ids {
            self.properties.delete(id);
            self.detach(id);
        }
        self.graph.clear();
        self.node_index_map.clear();
        tracing::info!(nodes = ids.len(), "Cleared workspace");
    }

    /// Checks that `nodes` hold at most one node per trigger type.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTrigger` naming the first repeated trigger type.
    pub fn check_triggers(&self, nodes: &[NodeInstance]) -> Result<(), GraphError> {
        let mut triggers = HashSet::new();
        for node in nodes {
            if self.catalog.is_trigger(&node.type_id) && !triggers.insert(node.type_id.as_str()) {
                return Err(GraphError::DuplicateTrigger {
                    type_id: node.type_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Replaces the graph with loaded nodes and edges.
    ///
    /// Stored properties must already be in place: each node's property
    /// mirror is refreshed from the store before handlers are attached.
    /// Edges are admitted one by one through the connection validator;
    /// refused edges are returned rather than failing the load.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTrigger` if two nodes share a trigger type. The
    /// current graph is unchanged in that case.
    pub fn load(
        &mut self,
        nodes: Vec<NodeInstance>,
        edges: Vec<EdgeInstance>,
    ) -> Result<Vec<DroppedEdge>, GraphError> {
        self.check_triggers(&nodes)?;

        for id in self.node_index_map.keys() {
            self.detach(id);
        }
        self.graph.clear();
        self.node_index_map.clear();

        for mut node in nodes {
            if self.node_index_map.contains_key(&node.id) {
                tracing::warn!(node_id = %node.id, "Skipping node with duplicate id");
                continue;
            }
            node.properties = self
                .properties
                .effective(self.catalog.get(&node.type_id), &node.id);
            node.execution_state = None;
            self.insert(node);
        }

        let mut dropped = Vec::new();
        for edge in edges {
            if let Err(reason) = self.apply_edge(&edge.proposal()) {
                tracing::warn!(edge_id = %edge.id, reason = %reason.reason, "Dropping edge");
                dropped.push(DroppedEdge { edge, reason });
            }
        }

        if let Some(handlers) = &self.handlers {
            for node in self.graph.node_weights() {
                handlers.attach(node);
            }
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::RejectionReason;
    use crate::edge::EdgeKind;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandlers {
        attached: Mutex<Vec<NodeId>>,
        detached: Mutex<Vec<NodeId>>,
        state_changes: Mutex<Vec<NodeId>>,
    }

    impl NodeHandlers for RecordingHandlers {
        fn attach(&self, node: &NodeInstance) {
            self.attached.lock().unwrap().push(node.id.clone());
        }

        fn detach(&self, node_id: &NodeId) {
            self.detached.lock().unwrap().push(node_id.clone());
        }

        fn execution_state_changed(&self, node: &NodeInstance) {
            self.state_changes.lock().unwrap().push(node.id.clone());
        }
    }

    fn store() -> GraphStore {
        GraphStore::new(
            Arc::new(NodeTypeCatalog::builtin()),
            PropertyStore::new(Arc::new(MemoryStore::new())),
        )
    }

    fn props(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn add_node_uses_display_name_and_defaults() {
        let mut graph = store();
        let node = graph.add_node("http-request", Position::new(0.0, 0.0)).unwrap();
        assert_eq!(node.label, "HTTP Request");
        assert_eq!(node.properties.get("method"), Some(&json!("GET")));
        assert!(graph.contains(&node.id));
    }

    #[test]
    fn add_node_rejects_unknown_type() {
        let mut graph = store();
        let err = graph.add_node("teleporter", Position::default()).unwrap_err();
        assert!(matches!(err, GraphError::UnknownNodeType { .. }));
    }

    #[test]
    fn second_trigger_of_same_type_rejected() {
        let mut graph = store();
        graph.add_node("manual-trigger", Position::default()).unwrap();
        graph.add_node("when-chat-received", Position::default()).unwrap();
        let err = graph.add_node("manual-trigger", Position::default()).unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateTrigger {
                type_id: "manual-trigger".to_string()
            }
        );
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn non_triggers_may_repeat() {
        let mut graph = store();
        graph.add_node("http-request", Position::default()).unwrap();
        graph.add_node("http-request", Position::default()).unwrap();
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn remove_node_drops_edges_and_properties() {
        let mut graph = store();
        let trigger = graph.add_node("manual-trigger", Position::default()).unwrap();
        let http = graph.add_node("http-request", Position::default()).unwrap();
        graph.apply_edge(&EdgeProposal::new(trigger.id.clone(), http.id.clone())).unwrap();
        graph.update_properties(&http.id, props(json!({"url": "https://x"}))).unwrap();

        graph.remove_node(&http.id).unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.properties().contains(&http.id));
    }

    #[test]
    fn duplicate_copies_properties_and_offsets() {
        let mut graph = store();
        let original = graph.add_node("http-request", Position::new(100.0, 200.0)).unwrap();
        graph.set_label(&original.id, "Fetch").unwrap();
        graph.update_properties(&original.id, props(json!({"a": 1}))).unwrap();

        let copy = graph.duplicate_node(&original.id).unwrap();
        assert_ne!(copy.id, original.id);
        assert_eq!(copy.label, "Fetch (Copy)");
        assert_eq!(copy.position, Position::new(150.0, 250.0));
        assert_eq!(graph.properties().get(&copy.id), props(json!({"a": 1})));

        graph.update_properties(&copy.id, props(json!({"a": 2}))).unwrap();
        assert_eq!(graph.properties().get(&original.id), props(json!({"a": 1})));
    }

    #[test]
    fn triggers_cannot_be_duplicated() {
        let mut graph = store();
        let trigger = graph.add_node("manual-trigger", Position::default()).unwrap();
        let err = graph.duplicate_node(&trigger.id).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateTrigger { .. }));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn apply_edge_rejects_duplicates_by_value() {
        let mut graph = store();
        let trigger = graph.add_node("manual-trigger", Position::default()).unwrap();
        let http = graph.add_node("http-request", Position::default()).unwrap();
        let proposal = EdgeProposal::new(trigger.id.clone(), http.id.clone());
        let edge = graph.apply_edge(&proposal).unwrap();
        assert_eq!(edge.kind, EdgeKind::Data);

        let err = graph.apply_edge(&proposal).unwrap_err();
        assert_eq!(err.reason, RejectionReason::Duplicate);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn apply_edge_enforces_limit() {
        let mut graph = store();
        let agent = graph.add_node("ai-agent", Position::default()).unwrap();
        let groq = graph.add_node("groq-llama", Position::default()).unwrap();
        let gpt = graph.add_node("gpt-4-turbo", Position::default()).unwrap();
        let to_agent = |id: &NodeId| {
            EdgeProposal::new(id.clone(), agent.id.clone())
                .with_source_handle(Some("model"))
                .with_target_handle(Some("chat_model"))
        };
        graph.apply_edge(&to_agent(&groq.id)).unwrap();
        let err = graph.apply_edge(&to_agent(&gpt.id)).unwrap_err();
        assert_eq!(err.reason, RejectionReason::LimitReached);
    }

    #[test]
    fn apply_edge_to_missing_node() {
        let mut graph = store();
        let trigger = graph.add_node("manual-trigger", Position::default()).unwrap();
        let err = graph
            .apply_edge(&EdgeProposal::new(trigger.id, "ghost"))
            .unwrap_err();
        assert_eq!(err.reason, RejectionReason::MissingNode);
    }

    #[test]
    fn remove_edges_touching_only_touches_that_node() {
        let mut graph = store();
        let trigger = graph.add_node("manual-trigger", Position::default()).unwrap();
        let a = graph.add_node("http-request", Position::default()).unwrap();
        let b = graph.add_node("http-request", Position::default()).unwrap();
        graph.apply_edge(&EdgeProposal::new(trigger.id.clone(), a.id.clone())).unwrap();
        graph.apply_edge(&EdgeProposal::new(a.id.clone(), b.id.clone())).unwrap();
        graph.apply_edge(&EdgeProposal::new(trigger.id.clone(), b.id.clone())).unwrap();

        let removed = graph.remove_edges_touching(&a.id);
        assert_eq!(removed.len(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.contains(&a.id));
    }

    #[test]
    fn node_changes_move_and_remove() {
        let mut graph = store();
        let a = graph.add_node("http-request", Position::default()).unwrap();
        let b = graph.add_node("http-request", Position::default()).unwrap();
        graph.apply_node_changes(vec![
            NodeChange::Move {
                id: a.id.clone(),
                position: Position::new(5.0, 6.0),
            },
            NodeChange::Remove { id: b.id.clone() },
            NodeChange::Remove { id: NodeId::from("ghost") },
        ]);
        assert_eq!(graph.node(&a.id).unwrap().position, Position::new(5.0, 6.0));
        assert!(!graph.contains(&b.id));
    }

    #[test]
    fn edge_changes_remove_by_id() {
        let mut graph = store();
        let trigger = graph.add_node("manual-trigger", Position::default()).unwrap();
        let http = graph.add_node("http-request", Position::default()).unwrap();
        let edge = graph.apply_edge(&EdgeProposal::new(trigger.id, http.id)).unwrap();
        graph.apply_edge_changes(vec![EdgeChange::Remove { id: edge.id }]);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn handlers_attached_after_every_producing_edit() {
        let handlers = Arc::new(RecordingHandlers::default());
        let mut graph = store();
        let first = graph.add_node("http-request", Position::default()).unwrap();
        graph.set_handlers(handlers.clone());
        assert_eq!(*handlers.attached.lock().unwrap(), vec![first.id.clone()]);

        let copy = graph.duplicate_node(&first.id).unwrap();
        assert_eq!(handlers.attached.lock().unwrap().last(), Some(&copy.id));

        graph.remove_node(&copy.id).unwrap();
        assert_eq!(*handlers.detached.lock().unwrap(), vec![copy.id]);
    }

    #[test]
    fn execution_state_notifies_handlers() {
        let handlers = Arc::new(RecordingHandlers::default());
        let mut graph = store();
        graph.set_handlers(handlers.clone());
        let node = graph.add_node("http-request", Position::default()).unwrap();
        assert!(graph.set_execution_state(&node.id, Some(ExecutionStateView::default())));
        assert!(!graph.set_execution_state(&NodeId::from("ghost"), None));
        assert_eq!(*handlers.state_changes.lock().unwrap(), vec![node.id]);
    }

    #[test]
    fn clear_deletes_properties() {
        let mut graph = store();
        let node = graph.add_node("http-request", Position::default()).unwrap();
        graph.update_properties(&node.id, props(json!({"url": "x"}))).unwrap();
        graph.clear();
        assert!(graph.is_empty());
        assert!(!graph.properties().contains(&node.id));
    }

    #[test]
    fn load_refreshes_mirror_from_store_and_drops_bad_edges() {
        let mut graph = store();
        let trigger =
            NodeInstance::new("manual-trigger", "Start", Position::default()).with_id("t");
        let agent = NodeInstance::new("ai-agent", "Agent", Position::default()).with_id("a");
        graph
            .properties()
            .set(&NodeId::from("a"), &props(json!({"system_prompt": "be brief"})));

        let good = EdgeInstance::from_proposal(&EdgeProposal::new("t", "a"), EdgeKind::Data);
        let bad = EdgeInstance::from_proposal(
            &EdgeProposal::new("t", "a").with_target_handle(Some("memory")),
            EdgeKind::Data,
        );
        let dangling = EdgeInstance::from_proposal(&EdgeProposal::new("t", "zzz"), EdgeKind::Data);

        let dropped = graph
            .load(vec![trigger, agent], vec![good, bad, dangling])
            .unwrap();
        assert_eq!(graph.edge_count(), 1);
        let reasons: Vec<_> = dropped.iter().map(|d| d.reason.reason).collect();
        assert_eq!(reasons, vec![RejectionReason::TypeMismatch, RejectionReason::MissingNode]);
        assert_eq!(
            graph.node(&NodeId::from("a")).unwrap().properties.get("system_prompt"),
            Some(&json!("be brief"))
        );
    }

    #[test]
    fn load_rejects_duplicate_triggers_without_mutating() {
        let mut graph = store();
        let existing = graph.add_node("http-request", Position::default()).unwrap();
        let err = graph
            .load(
                vec![
                    NodeInstance::new("manual-trigger", "A", Position::default()),
                    NodeInstance::new("manual-trigger", "B", Position::default()),
                ],
                vec![],
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateTrigger { .. }));
        assert!(graph.contains(&existing.id));
    }
}
