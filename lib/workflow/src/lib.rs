//! Workflow graph model and execution replay for canvasflow.
//!
//! This crate provides the client side of a visual workflow editor:
//!
//! - **Catalog**: Node types with typed input/output ports and declared properties
//! - **Graph**: Nodes and edges kept valid under connection and cardinality rules
//! - **Properties**: Per-node configuration persisted through an injected key-value store
//! - **Execution**: Validation, submission to a remote engine and paced replay of its results
//! - **History**: Bounded, persisted log of node executions
//! - **Documents**: Export and import of whole workflows

pub mod catalog;
pub mod connection;
pub mod document;
pub mod edge;
pub mod engine;
pub mod error;
pub mod graph;
pub mod history;
pub mod http;
pub mod node;
pub mod notify;
pub mod orchestrator;
pub mod port;
pub mod property;
pub mod replay;
pub mod session;
pub mod store;

pub use catalog::{
    NodeCategory, NodeTypeCatalog, NodeTypeDefinition, PropertyDefinition, PropertyKind,
};
pub use connection::{ConnectionRejected, ConnectionValidator, RejectionReason};
pub use document::{ImportSummary, SensitiveKeyFilter, WorkflowDocument};
pub use edge::{EdgeInstance, EdgeKind, EdgeProposal};
pub use engine::{EngineError, RemoteEngine, RemoteWorkflowId};
pub use error::{DocumentError, GraphError};
pub use graph::{GraphStore, NodeHandlers};
pub use history::{ExecutionHistoryLog, HistoryEntry, HistorySource};
pub use http::{EngineConfig, HttpEngine};
pub use node::{ExecutionStateView, NodeId, NodeInstance, NodeStatus, Position};
pub use notify::{Notification, NotificationBus, NotificationLevel};
pub use orchestrator::{
    ExecutionOrchestrator, OrchestratorSettings, Reply, RunError, RunOutcome, RunPhase, RunTrigger,
};
pub use port::{InputPort, OutputPort, SemanticType};
pub use property::PropertyStore;
pub use replay::{FixedDelay, NoDelay, Pacer};
pub use session::EditorSession;
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
