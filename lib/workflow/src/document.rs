//! Workflow export and import.
//!
//! Exported documents look like
//! `{"nodes": [...], "edges": [...], "version": "1.0.0", "savedAt": "..."}`.
//! Import also accepts the shape wrapped as `{"workflow": {"nodes", "edges"}}`.

use crate::edge::EdgeInstance;
use crate::error::DocumentError;
use crate::graph::{DroppedEdge, GraphStore};
use crate::node::{NodeData, NodeId, NodeInstance, NodePayload, Position};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Version written into exported documents.
pub const DOCUMENT_VERSION: &str = "1.0.0";

/// Decides which property keys are stripped from a sanitized export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveKeyFilter {
    markers: Vec<String>,
}

impl Default for SensitiveKeyFilter {
    fn default() -> Self {
        Self::new(["api_key", "apikey", "secret", "password", "token"])
    }
}

impl SensitiveKeyFilter {
    /// Keys containing any marker, ignoring case, are sensitive.
    #[must_use]
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.into().to_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.markers.iter().any(|marker| key.contains(marker.as_str()))
    }

    /// Returns `properties` without sensitive keys.
    #[must_use]
    pub fn strip(&self, properties: Map<String, JsonValue>) -> Map<String, JsonValue> {
        properties
            .into_iter()
            .filter(|(key, _)| !self.is_sensitive(key))
            .collect()
    }
}

/// An exported workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    pub nodes: Vec<NodePayload>,
    pub edges: Vec<EdgeInstance>,
    pub version: String,
    pub saved_at: DateTime<Utc>,
}

impl WorkflowDocument {
    /// Captures the graph with each node's effective properties.
    ///
    /// With a filter, sensitive keys are left out.
    #[must_use]
    pub fn capture(graph: &GraphStore, filter: Option<&SensitiveKeyFilter>) -> Self {
        let nodes = graph
            .nodes()
            .map(|node| {
                let properties = graph.effective_properties(&node.id).unwrap_or_default();
                let properties = match filter {
                    Some(filter) => filter.strip(properties),
                    None => properties,
                };
                NodePayload::new(node, properties)
            })
            .collect();
        Self {
            nodes,
            edges: graph.edges().cloned().collect(),
            version: DOCUMENT_VERSION.to_string(),
            saved_at: Utc::now(),
        }
    }

    /// Serializes the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `Json` if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        serde_json::to_string_pretty(self).map_err(|e| DocumentError::Json {
            message: e.to_string(),
        })
    }
}

/// What an import did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub nodes: usize,
    pub edges: usize,
    /// Edges refused by the connection validator.
    pub dropped_edges: Vec<DroppedEdge>,
    /// Edge entries that could not be read at all.
    pub malformed_edges: usize,
}

#[derive(Deserialize)]
struct NodeRecord {
    #[serde(default)]
    id: Option<NodeId>,
    #[serde(default, rename = "type")]
    type_id: Option<String>,
    #[serde(default)]
    data: Option<NodeDataRecord>,
    #[serde(default)]
    position: Position,
}

#[derive(Deserialize)]
struct NodeDataRecord {
    #[serde(default, rename = "type")]
    type_id: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    properties: Map<String, JsonValue>,
}

impl NodeRecord {
    fn into_payload(self) -> NodePayload {
        let data = match self.data {
            Some(data) => NodeData {
                type_id: data
                    .type_id
                    .or_else(|| self.type_id.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
                label: data.label.unwrap_or_else(|| "Unknown Node".to_string()),
                properties: data.properties,
                execution_state: None,
            },
            None => NodeData {
                type_id: "unknown".to_string(),
                label: "Unknown Node".to_string(),
                properties: Map::new(),
                execution_state: None,
            },
        };
        NodePayload {
            id: self.id.unwrap_or_default(),
            type_id: data.type_id.clone(),
            data,
            position: self.position,
        }
    }
}

/// Nodes and edges read from a document, before they touch the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub nodes: Vec<NodePayload>,
    pub edges: Vec<EdgeInstance>,
    pub malformed_edges: usize,
}

/// Reads a document in either accepted shape.
///
/// # Errors
///
/// Returns `Json` for unparseable input and `InvalidFormat` when `nodes`
/// is missing or not an array.
pub fn parse(raw: &str) -> Result<ParsedDocument, DocumentError> {
    let value: JsonValue = serde_json::from_str(raw).map_err(|e| DocumentError::Json {
        message: e.to_string(),
    })?;
    let root = value
        .get("workflow")
        .filter(|w| w.is_object())
        .unwrap_or(&value);

    let Some(JsonValue::Array(raw_nodes)) = root.get("nodes") else {
        return Err(DocumentError::InvalidFormat {
            reason: "nodes must be an array".to_string(),
        });
    };
    let raw_edges = match root.get("edges") {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Array(edges)) => edges.clone(),
        Some(_) => {
            return Err(DocumentError::InvalidFormat {
                reason: "edges must be an array".to_string(),
            });
        }
    };

    let nodes = raw_nodes
        .iter()
        .map(|raw| {
            serde_json::from_value::<NodeRecord>(raw.clone())
                .map(NodeRecord::into_payload)
                .map_err(|e| DocumentError::InvalidFormat {
                    reason: format!("invalid node: {e}"),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut edges = Vec::with_capacity(raw_edges.len());
    let mut malformed_edges = 0;
    for raw in raw_edges {
        match serde_json::from_value::<EdgeInstance>(raw) {
            Ok(edge) => edges.push(edge),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed edge");
                malformed_edges += 1;
            }
        }
    }

    Ok(ParsedDocument {
        nodes,
        edges,
        malformed_edges,
    })
}

/// Replaces the graph with the document's contents.
///
/// Stored properties are restored for every node that carries any before
/// the graph is rebuilt. Entries of nodes no longer present are left in
/// the store.
///
/// # Errors
///
/// Returns the parse error, or `Graph` when the document holds two nodes
/// of the same trigger type. The graph and store are unchanged on error.
pub fn import(graph: &mut GraphStore, raw: &str) -> Result<ImportSummary, DocumentError> {
    let parsed = parse(raw)?;
    let nodes: Vec<NodeInstance> = parsed
        .nodes
        .into_iter()
        .map(NodePayload::into_instance)
        .collect();
    graph.check_triggers(&nodes)?;

    for node in &nodes {
        if !node.properties.is_empty() {
            graph.properties().set(&node.id, &node.properties);
        }
    }

    let node_count = nodes.len();
    let edge_count = parsed.edges.len();
    let dropped_edges = graph.load(nodes, parsed.edges)?;
    tracing::info!(
        nodes = node_count,
        edges = edge_count - dropped_edges.len(),
        dropped = dropped_edges.len(),
        "Imported workflow"
    );

    Ok(ImportSummary {
        nodes: node_count,
        edges: edge_count - dropped_edges.len(),
        dropped_edges,
        malformed_edges: parsed.malformed_edges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NodeTypeCatalog;
    use crate::connection::RejectionReason;
    use crate::edge::EdgeProposal;
    use crate::property::PropertyStore;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn graph() -> GraphStore {
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
    fn filter_matches_case_insensitive_substrings() {
        let filter = SensitiveKeyFilter::default();
        assert!(filter.is_sensitive("api_key"));
        assert!(filter.is_sensitive("OpenAI_ApiKey"));
        assert!(filter.is_sensitive("refresh_token"));
        assert!(!filter.is_sensitive("model"));

        let custom = SensitiveKeyFilter::new(["url"]);
        assert!(custom.is_sensitive("webhook_URL"));
        assert!(!custom.is_sensitive("api_key"));
    }

    #[test]
    fn sanitized_export_drops_credentials() {
        let mut graph = graph();
        let model = graph.add_node("groq-llama", Position::default()).unwrap();
        graph
            .update_properties(&model.id, props(json!({"api_key": "gsk_0123456789"})))
            .unwrap();

        let full = WorkflowDocument::capture(&graph, None);
        assert_eq!(full.nodes[0].data.properties["api_key"], json!("gsk_0123456789"));
        assert_eq!(full.version, "1.0.0");

        let sanitized = WorkflowDocument::capture(&graph, Some(&SensitiveKeyFilter::default()));
        let properties = &sanitized.nodes[0].data.properties;
        assert!(!properties.contains_key("api_key"));
        assert_eq!(properties["model"], json!("llama-3.1-8b-instant"));
    }

    #[test]
    fn exported_json_uses_saved_at() {
        let doc = WorkflowDocument::capture(&graph(), None);
        let json: JsonValue = serde_json::from_str(&doc.to_json_pretty().unwrap()).unwrap();
        assert!(json.get("savedAt").is_some());
        assert_eq!(json["version"], json!("1.0.0"));
    }

    #[test]
    fn export_then_import_restores_graph_and_properties() {
        let mut source = graph();
        let trigger = source.add_node("manual-trigger", Position::default()).unwrap();
        let http = source.add_node("http-request", Position::new(200.0, 0.0)).unwrap();
        source
            .update_properties(&http.id, props(json!({"url": "https://example.com"})))
            .unwrap();
        source.apply_edge(&EdgeProposal::new(trigger.id.clone(), http.id.clone())).unwrap();
        let raw = WorkflowDocument::capture(&source, None).to_json_pretty().unwrap();

        let mut target = graph();
        let summary = import(&mut target, &raw).unwrap();
        assert_eq!(summary.nodes, 2);
        assert_eq!(summary.edges, 1);
        assert!(summary.dropped_edges.is_empty());
        assert_eq!(
            target.properties().get(&http.id)["url"],
            json!("https://example.com")
        );
        assert_eq!(target.node(&http.id).unwrap().properties["url"], json!("https://example.com"));
    }

    #[test]
    fn accepts_wrapped_shape_and_defaults_missing_data() {
        let mut graph = graph();
        let raw = r#"{"workflow": {"nodes": [{"id": "n1"}], "edges": []}}"#;
        import(&mut graph, raw).unwrap();
        let node = graph.node(&NodeId::from("n1")).unwrap();
        assert_eq!(node.type_id, "unknown");
        assert_eq!(node.label, "Unknown Node");
    }

    #[test]
    fn rejects_non_array_nodes() {
        let mut graph = graph();
        let err = import(&mut graph, r#"{"nodes": {}}"#).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidFormat { .. }));
        assert!(matches!(import(&mut graph, "not json").unwrap_err(), DocumentError::Json { .. }));
    }

    #[test]
    fn edges_are_defaulted_and_validated() {
        let mut graph = graph();
        let raw = r#"{
            "nodes": [
                {"id": "t", "type": "manual-trigger", "data": {"type": "manual-trigger", "label": "Start"}},
                {"id": "agent", "type": "ai-agent", "data": {"type": "ai-agent", "label": "Agent"}},
                {"id": "m1", "type": "groq-llama", "data": {"type": "groq-llama", "label": "M1"}},
                {"id": "m2", "type": "gpt-4-turbo", "data": {"type": "gpt-4-turbo", "label": "M2"}}
            ],
            "edges": [
                {"source": "t", "target": "agent"},
                {"source": "m1", "target": "agent", "sourceHandle": "model", "targetHandle": "chat_model"},
                {"source": "m2", "target": "agent", "sourceHandle": "model", "targetHandle": "chat_model"},
                {"source": "t", "target": "ghost"},
                {"target": "agent"}
            ]
        }"#;
        let summary = import(&mut graph, raw).unwrap();
        assert_eq!(summary.edges, 2);
        assert_eq!(summary.malformed_edges, 1);
        let reasons: Vec<_> = summary.dropped_edges.iter().map(|d| d.reason.reason).collect();
        assert_eq!(reasons, vec![RejectionReason::LimitReached, RejectionReason::MissingNode]);
        assert!(graph.edges().any(|e| e.id == "et-agent-main-main"));
    }

    #[test]
    fn duplicate_triggers_leave_graph_untouched() {
        let mut graph = graph();
        let existing = graph.add_node("notes", Position::default()).unwrap();
        let raw = r#"{"nodes": [
            {"id": "a", "data": {"type": "manual-trigger", "label": "A", "properties": {"message": "x"}}},
            {"id": "b", "data": {"type": "manual-trigger", "label": "B"}}
        ]}"#;
        let err = import(&mut graph, raw).unwrap_err();
        assert!(matches!(err, DocumentError::Graph(_)));
        assert!(graph.contains(&existing.id));
        assert!(!graph.properties().contains(&NodeId::from("a")));
    }
}
