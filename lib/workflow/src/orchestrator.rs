//! Execution orchestrator.
//!
//! A run moves through
//! `idle -> validating -> submitting -> replaying -> completed | error | aborted`:
//!
//! 1. Validate the current graph locally (trigger present, required
//!    properties set, credentials plausible)
//! 2. Snapshot the graph and submit it to the engine, creating the remote
//!    workflow once and updating it on later runs
//! 3. Execute it and replay the per-node results in engine order
//! 4. Extract the user-facing reply from the respond sink
//!
//! Only one run or node test may be active at a time. Locks on the graph
//! and history are never held across an await.

use crate::catalog::NodeTypeCatalog;
use crate::edge::{EdgeInstance, EdgeKind, EdgeProposal};
use crate::engine::{
    EngineError, ExecuteResponse, ExecutionRequest, RemoteEngine, RemoteRunStatus,
    RemoteWorkflowId, ValidationReport, WorkflowSubmission,
};
use crate::graph::GraphStore;
use crate::history::{ExecutionHistoryLog, HistoryEntry, HistorySource, render_output};
use crate::node::{ExecutionStateView, NodeId, NodeInstance, NodePayload, NodeStatus, Position};
use crate::notify::NotificationBus;
use crate::replay::{Pacer, ReplayCursor, ReplayStep, extract_reply, output_of};
use canvasflow_core::WorkflowRunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const MANUAL_TRIGGER: &str = "manual-trigger";
const CHAT_TRIGGER: &str = "when-chat-received";
const TEST_TRIGGER_ID: &str = "test-trigger";
const TEST_EDGE_ID: &str = "test-edge";
const TEST_MESSAGE: &str = "test api key from agent flow";

/// Locks a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Validating,
    Submitting,
    Replaying,
    Completed,
    Error,
    Aborted,
}

impl RunPhase {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Aborted)
    }
}

/// What started a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunTrigger {
    /// The user pressed "execute". Needs a manual trigger node.
    Manual,
    /// A chat message arrived. Needs a chat trigger node.
    Chat { message: String },
    /// Caller-supplied trigger data. No particular trigger node required.
    Custom { trigger_data: Map<String, JsonValue> },
}

impl RunTrigger {
    fn required_trigger(&self) -> Option<&'static str> {
        match self {
            Self::Manual => Some(MANUAL_TRIGGER),
            Self::Chat { .. } => Some(CHAT_TRIGGER),
            Self::Custom { .. } => None,
        }
    }

    fn trigger_data(&self) -> Map<String, JsonValue> {
        let value = match self {
            Self::Manual => json!({ "text": "Manual trigger execution" }),
            Self::Chat { message } => json!({ "message": message, "text": message }),
            Self::Custom { trigger_data } => return trigger_data.clone(),
        };
        match value {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn source(&self) -> HistorySource {
        match self {
            Self::Chat { .. } => HistorySource::Chat,
            Self::Manual | Self::Custom { .. } => HistorySource::Workflow,
        }
    }
}

/// Which node types carry an API key, and what counts as one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPolicy {
    /// A type id containing any of these (case-insensitive) needs a key.
    #[serde(default = "default_provider_tokens")]
    pub provider_tokens: Vec<String>,
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default = "default_min_length")]
    pub min_length: usize,
}

fn default_provider_tokens() -> Vec<String> {
    ["groq", "gpt", "claude", "openai", "anthropic"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_key() -> String {
    "api_key".to_string()
}

fn default_min_length() -> usize {
    10
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            provider_tokens: default_provider_tokens(),
            key: default_key(),
            min_length: default_min_length(),
        }
    }
}

impl CredentialPolicy {
    /// Returns true if nodes of this type need a credential.
    #[must_use]
    pub fn applies_to(&self, type_id: &str) -> bool {
        let type_id = type_id.to_lowercase();
        self.provider_tokens
            .iter()
            .any(|token| type_id.contains(&token.to_lowercase()))
    }

    /// Returns true if `properties` carry a plausible credential.
    #[must_use]
    pub fn is_satisfied_by(&self, properties: &Map<String, JsonValue>) -> bool {
        properties
            .get(&self.key)
            .and_then(JsonValue::as_str)
            .is_some_and(|key| key.trim().chars().count() >= self.min_length)
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Name of the remote workflow used for manual runs.
    #[serde(default = "default_workflow_name")]
    pub workflow_name: String,

    /// Bound on every engine call, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub credential_policy: CredentialPolicy,

    /// Sent with every execute request.
    #[serde(default)]
    pub credentials: Map<String, JsonValue>,
}

fn default_workflow_name() -> String {
    "Current Workflow".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            workflow_name: default_workflow_name(),
            request_timeout_secs: default_request_timeout_secs(),
            credential_policy: CredentialPolicy::default(),
            credentials: Map::new(),
        }
    }
}

/// A node that failed local validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    pub node_id: NodeId,
    pub node_label: String,
    pub reason: String,
}

/// Errors that stop a run before or during submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// There is nothing to run.
    EmptyWorkflow,
    /// The trigger node this kind of run needs is absent.
    MissingTrigger { type_id: String },
    /// One or more nodes are misconfigured.
    ValidationFailed { failures: Vec<ValidationFailure> },
    /// The engine could not be reached or refused the request.
    Transport { message: String },
    /// The engine did not answer in time.
    Timeout,
    /// Another run or node test is active.
    AlreadyRunning,
    /// The node to test does not exist.
    NodeNotFound { node_id: NodeId },
    /// The node type cannot be tested in isolation.
    NotTestable { type_id: String },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyWorkflow => write!(f, "workflow has no nodes"),
            Self::MissingTrigger { type_id } => write!(f, "workflow needs a {type_id} node"),
            Self::ValidationFailed { failures } => {
                write!(f, "{} node(s) failed validation", failures.len())
            }
            Self::Transport { message } => write!(f, "engine call failed: {message}"),
            Self::Timeout => write!(f, "engine call timed out"),
            Self::AlreadyRunning => write!(f, "a run is already in progress"),
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::NotTestable { type_id } => {
                write!(f, "nodes of type {type_id} cannot be tested in isolation")
            }
        }
    }
}

impl std::error::Error for RunError {}

impl From<&EngineError> for RunError {
    fn from(e: &EngineError) -> Self {
        match e {
            EngineError::Timeout => Self::Timeout,
            EngineError::Status { message, .. } => Self::Transport {
                message: message.clone(),
            },
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

/// The user-facing reply of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// The workflow has no node whose output is a reply.
    NoRespondSink,
    /// The respond sink produced nothing.
    Empty,
}

/// Result of a run that reached the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: WorkflowRunId,
    pub phase: RunPhase,
    pub status: RemoteRunStatus,
    /// Top-level engine error, if any.
    pub error: Option<String>,
    pub reply: Reply,
    /// Nodes whose results were applied, in order.
    pub replayed: Vec<NodeId>,
}

/// Result of testing a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub node_id: NodeId,
    pub status: NodeStatus,
    pub output: String,
    pub error: Option<String>,
}

/// Requests that an active replay stop at the next node boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Holds the run slot for as long as it lives.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, RunError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RunError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
struct SnapshotNode {
    type_id: String,
    label: String,
}

/// Everything captured from the graph before the first await.
struct Prepared {
    submission: WorkflowSubmission,
    snapshot: HashMap<NodeId, SnapshotNode>,
    respond_sink: Option<NodeId>,
    reply_fallbacks: Vec<NodeId>,
}

/// Checks one node: the first missing required property, then the credential.
fn check_node(
    catalog: &NodeTypeCatalog,
    policy: &CredentialPolicy,
    node: &NodeInstance,
    properties: &Map<String, JsonValue>,
) -> Vec<ValidationFailure> {
    let failure = |reason: String| ValidationFailure {
        node_id: node.id.clone(),
        node_label: node.label.clone(),
        reason,
    };

    let mut failures = Vec::new();
    if let Some(missing) = catalog
        .get(&node.type_id)
        .and_then(|d| d.required_properties().find(|p| p.is_unset_in(properties)))
    {
        failures.push(failure(format!("Missing: {}", missing.label)));
    }
    if policy.applies_to(&node.type_id) && !policy.is_satisfied_by(properties) {
        failures.push(failure("API key required".to_string()));
    }
    failures
}

/// Drives runs of the current graph against a remote engine.
pub struct ExecutionOrchestrator<E: RemoteEngine> {
    engine: E,
    graph: Arc<Mutex<GraphStore>>,
    history: Arc<Mutex<ExecutionHistoryLog>>,
    bus: NotificationBus,
    pacer: Arc<dyn Pacer>,
    settings: OrchestratorSettings,
    request_timeout: Duration,
    remote_id: Mutex<Option<RemoteWorkflowId>>,
    phase: Mutex<RunPhase>,
    running: AtomicBool,
    stop: StopHandle,
}

impl<E: RemoteEngine> ExecutionOrchestrator<E> {
    /// Creates an orchestrator over shared graph and history.
    #[must_use]
    pub fn new(
        engine: E,
        graph: Arc<Mutex<GraphStore>>,
        history: Arc<Mutex<ExecutionHistoryLog>>,
        bus: NotificationBus,
        pacer: Arc<dyn Pacer>,
        settings: OrchestratorSettings,
    ) -> Self {
        let request_timeout = Duration::from_secs(settings.request_timeout_secs);
        Self {
            engine,
            graph,
            history,
            bus,
            pacer,
            settings,
            request_timeout,
            remote_id: Mutex::new(None),
            phase: Mutex::new(RunPhase::Idle),
            running: AtomicBool::new(false),
            stop: StopHandle::default(),
        }
    }

    /// Overrides the engine call timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[must_use]
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// The phase of the current or last run.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        *lock(&self.phase)
    }

    fn set_phase(&self, phase: RunPhase) {
        tracing::debug!(phase = ?phase, "Run phase changed");
        *lock(&self.phase) = phase;
    }

    /// Returns true while a run or node test is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// A handle that can stop the active replay from another task.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stops the active replay at the next node boundary.
    pub fn request_stop(&self) {
        if self.is_running() {
            self.stop.request_stop();
        }
    }

    /// The engine-side id of the workflow, once created.
    #[must_use]
    pub fn remote_workflow_id(&self) -> Option<RemoteWorkflowId> {
        lock(&self.remote_id).clone()
    }

    /// Forgets the engine-side workflow so the next run creates a new one.
    pub fn forget_remote_workflow(&self) {
        lock(&self.remote_id).take();
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = canvasflow_core::Result<T, EngineError>>,
    ) -> Result<T, RunError> {
        match tokio::time::timeout(self.request_timeout, request).await {
            Err(_) => {
                tracing::warn!(timeout = ?self.request_timeout, "Engine call timed out");
                Err(RunError::Timeout)
            }
            Ok(Err(report)) => Err(RunError::from(report.current_context())),
            Ok(Ok(value)) => Ok(value),
        }
    }

    fn collect_failures(&self, graph: &GraphStore) -> Vec<ValidationFailure> {
        graph
            .nodes()
            .flat_map(|node| {
                let properties = graph.effective_properties(&node.id).unwrap_or_default();
                check_node(
                    graph.catalog(),
                    &self.settings.credential_policy,
                    node,
                    &properties,
                )
            })
            .collect()
    }

    /// Validates the current graph without running it.
    ///
    /// # Errors
    ///
    /// Returns `EmptyWorkflow` or `ValidationFailed`.
    pub fn validate(&self) -> Result<(), RunError> {
        let graph = lock(&self.graph);
        if graph.is_empty() {
            return Err(RunError::EmptyWorkflow);
        }
        let failures = self.collect_failures(&graph);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RunError::ValidationFailed { failures })
        }
    }

    fn prepare(&self, trigger: &RunTrigger) -> Result<Prepared, RunError> {
        let graph = lock(&self.graph);
        if graph.is_empty() {
            return Err(RunError::EmptyWorkflow);
        }
        if let Some(type_id) = trigger.required_trigger()
            && graph.find_by_type(type_id).is_none()
        {
            return Err(RunError::MissingTrigger {
                type_id: type_id.to_string(),
            });
        }
        let failures = self.collect_failures(&graph);
        if !failures.is_empty() {
            return Err(RunError::ValidationFailed { failures });
        }

        let (name, description) = match trigger {
            RunTrigger::Chat { .. } => (
                "Chat Workflow".to_string(),
                "Workflow triggered by chat messages".to_string(),
            ),
            RunTrigger::Manual | RunTrigger::Custom { .. } => (
                self.settings.workflow_name.clone(),
                "Workflow execution".to_string(),
            ),
        };

        let mut snapshot = HashMap::new();
        let mut nodes = Vec::with_capacity(graph.node_count());
        let mut respond_sink = None;
        let mut reply_fallbacks = Vec::new();
        for node in graph.nodes() {
            let properties = graph.effective_properties(&node.id).unwrap_or_default();
            nodes.push(NodePayload::new(node, properties));
            snapshot.insert(
                node.id.clone(),
                SnapshotNode {
                    type_id: node.type_id.clone(),
                    label: node.label.clone(),
                },
            );
            if let Some(definition) = graph.catalog().get(&node.type_id) {
                if definition.respond_sink && respond_sink.is_none() {
                    respond_sink = Some(node.id.clone());
                }
                if definition.reply_fallback {
                    reply_fallbacks.push(node.id.clone());
                }
            }
        }
        reply_fallbacks.sort();

        Ok(Prepared {
            submission: WorkflowSubmission {
                name,
                description,
                nodes,
                edges: graph.edges().cloned().collect(),
            },
            snapshot,
            respond_sink,
            reply_fallbacks,
        })
    }

    async fn submit(&self, submission: &WorkflowSubmission) -> Result<RemoteWorkflowId, RunError> {
        let existing = self.remote_workflow_id();
        let id = match existing {
            Some(id) => self.call(self.engine.update_workflow(&id, submission)).await?,
            None => {
                let id = self.call(self.engine.create_workflow(submission)).await?;
                tracing::info!(workflow_id = %id, "Created remote workflow");
                id
            }
        };
        *lock(&self.remote_id) = Some(id.clone());
        Ok(id)
    }

    fn fail(&self, error: RunError) -> RunError {
        self.set_phase(RunPhase::Error);
        match &error {
            RunError::ValidationFailed { failures } => {
                let lines: Vec<String> = failures
                    .iter()
                    .map(|f| format!("• {}: {}", f.node_label, f.reason))
                    .collect();
                self.bus
                    .error(format!("Validation failed:\n{}", lines.join("\n")));
            }
            other => self.bus.error(other.to_string()),
        }
        tracing::warn!(error = %error, "Run failed");
        error
    }

    /// Validates, submits and replays the current graph.
    ///
    /// Per-node failures reported by the engine are part of the outcome,
    /// not errors.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning` if another run is active, and the local
    /// validation or transport error that stopped the run otherwise. Once
    /// local validation passes, execution states from earlier runs are reset
    /// to idle; a transport error applies no new state.
    pub async fn run(&self, trigger: RunTrigger) -> Result<RunOutcome, RunError> {
        let _guard = RunGuard::acquire(&self.running)?;
        self.stop.reset();
        let run_id = WorkflowRunId::new();
        tracing::info!(run_id = %run_id, trigger = ?trigger, "Starting run");

        self.set_phase(RunPhase::Validating);
        let prepared = self.prepare(&trigger).map_err(|e| self.fail(e))?;
        lock(&self.graph).clear_execution_states();

        self.set_phase(RunPhase::Submitting);
        let workflow_id = self
            .submit(&prepared.submission)
            .await
            .map_err(|e| self.fail(e))?;
        let request = ExecutionRequest {
            trigger_data: trigger.trigger_data(),
            credentials: self.settings.credentials.clone(),
        };
        let response = self
            .call(self.engine.execute_workflow(&workflow_id, &request))
            .await
            .map_err(|e| self.fail(e))?;

        self.set_phase(RunPhase::Replaying);
        Ok(self
            .replay(run_id, response, &prepared, trigger.source())
            .await)
    }

    async fn replay(
        &self,
        run_id: WorkflowRunId,
        response: ExecuteResponse,
        prepared: &Prepared,
        source: HistorySource,
    ) -> RunOutcome {
        let ExecuteResponse {
            status,
            error,
            execution,
            ..
        } = response;
        let results = execution.node_states.clone();
        let known: HashSet<NodeId> = prepared.snapshot.keys().cloned().collect();
        let mut cursor = ReplayCursor::new(execution, &known);

        let mut replayed = Vec::new();
        let mut aborted = false;
        let mut started_at = Utc::now();
        while let Some(step) = cursor.next_step() {
            match step {
                ReplayStep::Started { node_id } => {
                    if self.stop.is_requested() {
                        aborted = true;
                        break;
                    }
                    started_at = Utc::now();
                    lock(&self.graph).set_execution_state(
                        &node_id,
                        Some(ExecutionStateView::running(started_at)),
                    );
                    self.pacer.pause().await;
                }
                ReplayStep::Finished { node_id, result } => {
                    let finished_at = Utc::now();
                    let Some(node) = prepared.snapshot.get(&node_id) else {
                        continue;
                    };
                    let view = ExecutionStateView {
                        status: result.status,
                        output: result.output.clone(),
                        error: result.error.clone(),
                        started_at: Some(started_at),
                        finished_at: Some(finished_at),
                        timestamp: result.timestamp.clone(),
                    };
                    if !lock(&self.graph).set_execution_state(&node_id, Some(view)) {
                        tracing::debug!(node_id = %node_id, "Node removed during replay");
                    }

                    let output = match (&result.status, &result.error) {
                        (NodeStatus::Error, Some(message)) => message.clone(),
                        _ => render_output(result.output.as_ref()),
                    };
                    self.record(node, result.status, source, output, started_at, finished_at);
                    match result.status {
                        NodeStatus::Error => self.bus.error(format!(
                            "{} failed: {}",
                            node.label,
                            result.error.as_deref().unwrap_or("unknown error")
                        )),
                        NodeStatus::Completed => {
                            self.bus.success(format!("{} completed", node.label));
                        }
                        _ => {}
                    }
                    replayed.push(node_id);
                }
            }
        }

        let reply = match &prepared.respond_sink {
            None => {
                if source == HistorySource::Chat {
                    self.bus.info("No response node in workflow");
                }
                Reply::NoRespondSink
            }
            Some(sink) => std::iter::once(sink)
                .chain(prepared.reply_fallbacks.iter())
                .find_map(|id| output_of(&results, id))
                .map_or(Reply::Empty, |output| Reply::Text(extract_reply(output))),
        };

        let phase = if aborted {
            self.bus.warning("Execution stopped");
            RunPhase::Aborted
        } else if status == RemoteRunStatus::Completed {
            self.bus.success("Workflow executed successfully");
            RunPhase::Completed
        } else {
            self.bus.error(format!(
                "Workflow failed: {}",
                error.as_deref().unwrap_or("unknown error")
            ));
            RunPhase::Error
        };
        self.set_phase(phase);
        tracing::info!(
            run_id = %run_id,
            phase = ?phase,
            replayed = replayed.len(),
            "Run finished"
        );

        RunOutcome {
            run_id,
            phase,
            status,
            error,
            reply,
            replayed,
        }
    }

    fn record(
        &self,
        node: &SnapshotNode,
        status: NodeStatus,
        source: HistorySource,
        output: String,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) {
        lock(&self.history).push(HistoryEntry::new(
            node.type_id.clone(),
            node.label.clone(),
            status,
            source,
            output,
            started_at,
            finished_at,
        ));
    }

    /// Runs one credential-bearing node in isolation.
    ///
    /// The node is wired behind a synthetic manual trigger in a temporary
    /// remote workflow, which is deleted afterwards whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRunning`, `NodeNotFound`, `NotTestable`,
    /// `ValidationFailed` for a misconfigured node, or the transport error.
    pub async fn test_node(&self, node_id: &NodeId) -> Result<TestOutcome, RunError> {
        let _guard = RunGuard::acquire(&self.running)?;

        let (submission, snapshot) = {
            let graph = lock(&self.graph);
            let node = graph.node(node_id).ok_or_else(|| RunError::NodeNotFound {
                node_id: node_id.clone(),
            })?;
            if !self.settings.credential_policy.applies_to(&node.type_id) {
                return Err(RunError::NotTestable {
                    type_id: node.type_id.clone(),
                });
            }
            let properties = graph.effective_properties(node_id).unwrap_or_default();
            let failures = check_node(
                graph.catalog(),
                &self.settings.credential_policy,
                node,
                &properties,
            );
            if !failures.is_empty() {
                return Err(self.fail(RunError::ValidationFailed { failures }));
            }

            let mut trigger_properties = Map::new();
            trigger_properties.insert("message".to_string(), json!(TEST_MESSAGE));
            let trigger = NodeInstance::new(
                MANUAL_TRIGGER,
                "Test Trigger",
                Position::new(100.0, 100.0),
            )
            .with_id(TEST_TRIGGER_ID)
            .with_properties(trigger_properties.clone());
            let mut edge = EdgeInstance::from_proposal(
                &EdgeProposal::new(TEST_TRIGGER_ID, node_id.clone()),
                EdgeKind::Data,
            );
            edge.id = TEST_EDGE_ID.to_string();

            let submission = WorkflowSubmission {
                name: "Test Workflow".to_string(),
                description: "Test workflow for node execution".to_string(),
                nodes: vec![
                    NodePayload::new(&trigger, trigger_properties),
                    NodePayload::new(node, properties),
                ],
                edges: vec![edge],
            };
            let snapshot = SnapshotNode {
                type_id: node.type_id.clone(),
                label: node.label.clone(),
            };
            (submission, snapshot)
        };

        let started_at = Utc::now();
        lock(&self.graph)
            .set_execution_state(node_id, Some(ExecutionStateView::running(started_at)));
        tracing::info!(node_id = %node_id, type_id = %snapshot.type_id, "Testing node");

        let executed = self.execute_temporary(&submission).await;
        let finished_at = Utc::now();
        let response = match executed {
            Ok(response) => response,
            Err(e) => {
                let view = ExecutionStateView {
                    status: NodeStatus::Error,
                    error: Some(e.to_string()),
                    started_at: Some(started_at),
                    finished_at: Some(finished_at),
                    ..ExecutionStateView::default()
                };
                lock(&self.graph).set_execution_state(node_id, Some(view));
                return Err(self.fail(e));
            }
        };

        let result = response.execution.node_states.get(node_id).cloned().unwrap_or_default();
        let failed =
            response.status != RemoteRunStatus::Completed || result.status == NodeStatus::Error;
        let (status, output, error) = if failed {
            let message = response
                .error
                .clone()
                .or_else(|| result.error.clone())
                .unwrap_or_else(|| "Execution failed".to_string());
            (NodeStatus::Error, message.clone(), Some(message))
        } else {
            let output = result
                .output
                .as_ref()
                .filter(|v| !v.is_null())
                .map_or_else(|| "Execution completed".to_string(), extract_reply);
            (NodeStatus::Completed, output, None)
        };

        let view = ExecutionStateView {
            status,
            output: result.output.clone(),
            error: error.clone(),
            started_at: Some(started_at),
            finished_at: Some(finished_at),
            timestamp: result.timestamp.clone(),
        };
        lock(&self.graph).set_execution_state(node_id, Some(view));
        self.record(
            &snapshot,
            status,
            HistorySource::Test,
            output.clone(),
            started_at,
            finished_at,
        );
        match &error {
            Some(message) => self.bus.error(format!("{} failed: {message}", snapshot.label)),
            None => self.bus.success(format!("{} test completed", snapshot.label)),
        }

        Ok(TestOutcome {
            node_id: node_id.clone(),
            status,
            output,
            error,
        })
    }

    async fn execute_temporary(
        &self,
        submission: &WorkflowSubmission,
    ) -> Result<ExecuteResponse, RunError> {
        let workflow_id = self.call(self.engine.create_workflow(submission)).await?;
        let mut trigger_data = Map::new();
        trigger_data.insert("message".to_string(), json!(TEST_MESSAGE));
        let request = ExecutionRequest {
            trigger_data,
            credentials: self.settings.credentials.clone(),
        };
        let executed = self
            .call(self.engine.execute_workflow(&workflow_id, &request))
            .await;

        if let Err(e) = self.call(self.engine.delete_workflow(&workflow_id)).await {
            tracing::warn!(
                workflow_id = %workflow_id,
                error = %e,
                "Failed to delete test workflow"
            );
        }
        executed
    }

    /// Asks the engine to check the current graph's structure.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the engine cannot be reached.
    pub async fn validate_remotely(&self) -> Result<ValidationReport, RunError> {
        let (nodes, edges) = {
            let graph = lock(&self.graph);
            let nodes: Vec<NodePayload> = graph
                .nodes()
                .map(|n| NodePayload::new(n, graph.effective_properties(&n.id).unwrap_or_default()))
                .collect();
            let edges: Vec<EdgeInstance> = graph.edges().cloned().collect();
            (nodes, edges)
        };
        self.call(self.engine.validate_workflow(&nodes, &edges)).await
    }
}
