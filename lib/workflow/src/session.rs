//! Editor session.
//!
//! Wires one key-value store, graph, history log, notification bus and
//! orchestrator together and exposes the workspace-level flows: clear,
//! import, export, run and node test.

use crate::catalog::NodeTypeCatalog;
use crate::document::{self, ImportSummary, SensitiveKeyFilter, WorkflowDocument};
use crate::engine::RemoteEngine;
use crate::error::DocumentError;
use crate::graph::{GraphStore, NodeHandlers};
use crate::history::ExecutionHistoryLog;
use crate::node::NodeId;
use crate::notify::NotificationBus;
use crate::orchestrator::{
    ExecutionOrchestrator, OrchestratorSettings, RunError, RunOutcome, RunTrigger, TestOutcome,
    lock,
};
use crate::property::PropertyStore;
use crate::replay::Pacer;
use crate::store::KeyValueStore;
use std::sync::{Arc, Mutex, MutexGuard};

/// One open workflow editor.
pub struct EditorSession<E: RemoteEngine> {
    graph: Arc<Mutex<GraphStore>>,
    history: Arc<Mutex<ExecutionHistoryLog>>,
    bus: NotificationBus,
    orchestrator: ExecutionOrchestrator<E>,
    sensitive_keys: SensitiveKeyFilter,
}

impl<E: RemoteEngine> EditorSession<E> {
    /// Opens a session backed by `store`, restoring its execution history.
    #[must_use]
    pub fn new(
        engine: E,
        store: Arc<dyn KeyValueStore>,
        catalog: Arc<NodeTypeCatalog>,
        pacer: Arc<dyn Pacer>,
        settings: OrchestratorSettings,
    ) -> Self {
        let graph = Arc::new(Mutex::new(GraphStore::new(
            catalog,
            PropertyStore::new(store.clone()),
        )));
        let history = Arc::new(Mutex::new(ExecutionHistoryLog::load(store)));
        let bus = NotificationBus::new();
        let orchestrator = ExecutionOrchestrator::new(
            engine,
            graph.clone(),
            history.clone(),
            bus.clone(),
            pacer,
            settings,
        );
        Self {
            graph,
            history,
            bus,
            orchestrator,
            sensitive_keys: SensitiveKeyFilter::default(),
        }
    }

    /// Replaces the keys stripped from sanitized exports.
    #[must_use]
    pub fn with_sensitive_keys(mut self, filter: SensitiveKeyFilter) -> Self {
        self.sensitive_keys = filter;
        self
    }

    /// Locks the graph for reading or editing.
    ///
    /// Do not hold the guard across an await.
    pub fn graph(&self) -> MutexGuard<'_, GraphStore> {
        lock(&self.graph)
    }

    pub fn history(&self) -> MutexGuard<'_, ExecutionHistoryLog> {
        lock(&self.history)
    }

    #[must_use]
    pub fn notifications(&self) -> &NotificationBus {
        &self.bus
    }

    #[must_use]
    pub fn orchestrator(&self) -> &ExecutionOrchestrator<E> {
        &self.orchestrator
    }

    /// Installs the presentation layer's node handlers.
    pub fn set_handlers(&self, handlers: Arc<dyn NodeHandlers>) {
        self.graph().set_handlers(handlers);
    }

    /// Removes every node and edge and their stored properties.
    ///
    /// The next run creates a fresh remote workflow.
    pub fn clear_workspace(&self) {
        self.graph().clear();
        self.orchestrator.forget_remote_workflow();
        self.bus.info("Workspace cleared");
    }

    /// Replaces the workspace with a document.
    ///
    /// # Errors
    ///
    /// Returns the document error; the workspace is unchanged in that case.
    pub fn import(&self, raw: &str) -> Result<ImportSummary, DocumentError> {
        let summary = match document::import(&mut self.graph(), raw) {
            Ok(summary) => summary,
            Err(e) => {
                self.bus.error(format!("Import failed: {e}"));
                return Err(e);
            }
        };
        self.orchestrator.forget_remote_workflow();

        let skipped = summary.dropped_edges.len() + summary.malformed_edges;
        if skipped > 0 {
            self.bus.warning(format!(
                "Imported {} nodes; {skipped} connection(s) could not be restored",
                summary.nodes
            ));
        } else {
            self.bus.success(format!(
                "Imported {} nodes and {} connections",
                summary.nodes, summary.edges
            ));
        }
        Ok(summary)
    }

    /// Exports the workspace as JSON, optionally without credentials.
    ///
    /// # Errors
    ///
    /// Returns `Json` if serialization fails.
    pub fn export(&self, sanitized: bool) -> Result<String, DocumentError> {
        let filter = sanitized.then_some(&self.sensitive_keys);
        WorkflowDocument::capture(&self.graph(), filter).to_json_pretty()
    }

    /// Runs the workflow from its manual trigger.
    ///
    /// # Errors
    ///
    /// See [`ExecutionOrchestrator::run`].
    pub async fn run_manual(&self) -> Result<RunOutcome, RunError> {
        self.orchestrator.run(RunTrigger::Manual).await
    }

    /// Runs the workflow from its chat trigger with `message`.
    ///
    /// # Errors
    ///
    /// See [`ExecutionOrchestrator::run`].
    pub async fn run_chat(&self, message: impl Into<String>) -> Result<RunOutcome, RunError> {
        self.orchestrator
            .run(RunTrigger::Chat {
                message: message.into(),
            })
            .await
    }

    /// Tests one node in isolation.
    ///
    /// # Errors
    ///
    /// See [`ExecutionOrchestrator::test_node`].
    pub async fn test_node(&self, node_id: &NodeId) -> Result<TestOutcome, RunError> {
        self.orchestrator.test_node(node_id).await
    }

    /// Resets every node's execution state to idle.
    pub fn reset_execution_states(&self) {
        self.graph().clear_execution_states();
    }

    pub fn clear_history(&self) {
        self.history().clear();
        self.bus.info("Execution history cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeInstance;
    use crate::engine::{
        EngineError, ExecuteResponse, ExecutionReport, ExecutionRequest, NodeResult,
        RemoteRunStatus, RemoteWorkflowId, ValidationReport, WorkflowSubmission,
    };
    use crate::node::{NodePayload, NodeStatus, Position};
    use crate::notify::NotificationLevel;
    use crate::replay::NoDelay;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use canvasflow_core::Result as EngineResult;
    use serde_json::json;

    /// Echoes every submitted node back as completed.
    #[derive(Default)]
    struct EchoEngine {
        created: Mutex<usize>,
        last: Mutex<Option<WorkflowSubmission>>,
    }

    #[async_trait]
    impl RemoteEngine for EchoEngine {
        async fn create_workflow(
            &self,
            submission: &WorkflowSubmission,
        ) -> EngineResult<RemoteWorkflowId, EngineError> {
            let mut created = self.created.lock().unwrap();
            *created += 1;
            *self.last.lock().unwrap() = Some(submission.clone());
            Ok(RemoteWorkflowId::new(created.to_string()))
        }

        async fn update_workflow(
            &self,
            id: &RemoteWorkflowId,
            submission: &WorkflowSubmission,
        ) -> EngineResult<RemoteWorkflowId, EngineError> {
            *self.last.lock().unwrap() = Some(submission.clone());
            Ok(id.clone())
        }

        async fn delete_workflow(&self, _id: &RemoteWorkflowId) -> EngineResult<(), EngineError> {
            Ok(())
        }

        async fn execute_workflow(
            &self,
            _id: &RemoteWorkflowId,
            _request: &ExecutionRequest,
        ) -> EngineResult<ExecuteResponse, EngineError> {
            let submission = self.last.lock().unwrap().clone().unwrap();
            let node_states = submission
                .nodes
                .iter()
                .map(|n| {
                    (
                        n.id.clone(),
                        NodeResult {
                            status: NodeStatus::Completed,
                            output: Some(json!({"text": format!("{} done", n.data.label)})),
                            ..NodeResult::default()
                        },
                    )
                })
                .collect();
            Ok(ExecuteResponse {
                execution_id: None,
                status: RemoteRunStatus::Completed,
                error: None,
                execution: ExecutionReport {
                    node_states,
                    execution_order: None,
                },
            })
        }

        async fn validate_workflow(
            &self,
            _nodes: &[NodePayload],
            _edges: &[EdgeInstance],
        ) -> EngineResult<ValidationReport, EngineError> {
            Ok(ValidationReport {
                valid: true,
                errors: Vec::new(),
                warnings: Vec::new(),
            })
        }
    }

    fn session_with(store: Arc<dyn KeyValueStore>) -> EditorSession<EchoEngine> {
        EditorSession::new(
            EchoEngine::default(),
            store,
            Arc::new(NodeTypeCatalog::builtin()),
            Arc::new(NoDelay),
            OrchestratorSettings::default(),
        )
    }

    fn session() -> EditorSession<EchoEngine> {
        session_with(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn chat_run_replies_through_sink() {
        let session = session();
        {
            let mut graph = session.graph();
            let chat = graph.add_node("when-chat-received", Position::default()).unwrap();
            let reply = graph.add_node("respond-to-chat", Position::new(300.0, 0.0)).unwrap();
            graph
                .apply_edge(&crate::edge::EdgeProposal::new(chat.id, reply.id))
                .unwrap();
        }

        let outcome = session.run_chat("hello").await.unwrap();
        assert_eq!(
            outcome.reply,
            crate::orchestrator::Reply::Text("Respond to Chat done".to_string())
        );
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn clear_forgets_remote_workflow() {
        let session = session();
        session
            .graph()
            .add_node("manual-trigger", Position::default())
            .unwrap();
        session.run_manual().await.unwrap();
        assert!(session.orchestrator().remote_workflow_id().is_some());

        session.clear_workspace();
        assert!(session.graph().is_empty());
        assert!(session.orchestrator().remote_workflow_id().is_none());
    }

    #[tokio::test]
    async fn import_resets_remote_workflow_and_notifies() {
        let session = session();
        session
            .graph()
            .add_node("manual-trigger", Position::default())
            .unwrap();
        session.run_manual().await.unwrap();
        let exported = session.export(false).unwrap();

        let mut notifications = session.notifications().subscribe();
        let summary = session.import(&exported).unwrap();
        assert_eq!(summary.nodes, 1);
        assert!(session.orchestrator().remote_workflow_id().is_none());
        let notification = notifications.recv().await.unwrap();
        assert_eq!(notification.level, NotificationLevel::Success);
    }

    #[test]
    fn failed_import_reports_error() {
        let session = session();
        let mut notifications = session.notifications().subscribe();
        assert!(session.import(r#"{"nodes": 3}"#).is_err());
        let notification = notifications.try_recv().unwrap();
        assert_eq!(notification.level, NotificationLevel::Error);
    }

    #[test]
    fn sanitized_export_uses_custom_filter() {
        let session = session().with_sensitive_keys(SensitiveKeyFilter::new(["url"]));
        let id = {
            let mut graph = session.graph();
            let node = graph.add_node("http-request", Position::default()).unwrap();
            let mut changes = serde_json::Map::new();
            changes.insert("url".to_string(), json!("https://internal.example"));
            graph.update_properties(&node.id, changes).unwrap();
            node.id
        };

        let exported = session.export(true).unwrap();
        assert!(!exported.contains("internal.example"));
        assert!(exported.contains(id.as_str()));
    }

    #[tokio::test]
    async fn history_survives_reopening() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let first = session_with(store.clone());
        first
            .graph()
            .add_node("manual-trigger", Position::default())
            .unwrap();
        first.run_manual().await.unwrap();

        let second = session_with(store);
        assert_eq!(second.history().len(), 1);
        second.clear_history();
        assert!(second.history().is_empty());
    }
}
