//! Port system for workflow nodes.
//!
//! Ports are named connection points on nodes. Each port carries a
//! semantic type that decides which outputs may feed which inputs:
//!
//! - `main`: workflow data flowing from triggers through actions
//! - `ai`: capability wiring (chat model, memory, tools) into an AI agent
//!
//! The semantic type says nothing about the runtime shape of the data.

use serde::{Deserialize, Serialize};

/// The name used for a port when a connection leaves the handle unset.
pub const DEFAULT_PORT: &str = "main";

/// Compatibility category of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    /// Workflow data.
    Main,
    /// AI capability (chat model, memory, tool).
    Ai,
    /// Any category this client does not understand. Never compatible.
    #[serde(other)]
    Other,
}

impl SemanticType {
    /// Returns true for `ai` ports, which tag their edges as capability edges.
    #[must_use]
    pub fn is_capability(&self) -> bool {
        matches!(self, Self::Ai)
    }
}

/// An input port on a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputPort {
    /// The name of this port (used as the edge's target handle).
    pub name: String,
    /// The compatibility category.
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    /// Upper bound on incoming edges. `None` or zero means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
    /// Human-readable name shown next to the handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl InputPort {
    /// Creates the default `main` data input.
    #[must_use]
    pub fn main() -> Self {
        Self::new(DEFAULT_PORT, SemanticType::Main)
    }

    /// Creates a named AI capability input.
    #[must_use]
    pub fn ai(name: impl Into<String>) -> Self {
        Self::new(name, SemanticType::Ai)
    }

    /// Creates an input port of the given category.
    #[must_use]
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            max_connections: None,
            display_name: None,
        }
    }

    /// Caps the number of incoming edges.
    #[must_use]
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Returns the effective connection limit, if one applies.
    #[must_use]
    pub fn connection_limit(&self) -> Option<usize> {
        self.max_connections
            .filter(|max| *max > 0)
            .map(|max| max as usize)
    }

    /// Checks whether an output may feed this input.
    ///
    /// Same-category wiring is always allowed. Crossing between `main`
    /// and `ai` is allowed only into an input named `main`, which is how
    /// an agent's generic input accepts either kind.
    #[must_use]
    pub fn accepts(&self, source: &OutputPort) -> bool {
        match (source.semantic_type, self.semantic_type) {
            (SemanticType::Main, SemanticType::Main) | (SemanticType::Ai, SemanticType::Ai) => true,
            (SemanticType::Main, SemanticType::Ai) | (SemanticType::Ai, SemanticType::Main) => {
                self.name == DEFAULT_PORT
            }
            _ => false,
        }
    }
}

/// An output port on a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPort {
    /// The name of this port (used as the edge's source handle).
    pub name: String,
    /// The compatibility category.
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
}

impl OutputPort {
    /// Creates the default `main` data output.
    #[must_use]
    pub fn main() -> Self {
        Self::new(DEFAULT_PORT, SemanticType::Main)
    }

    /// Creates an AI capability output.
    #[must_use]
    pub fn ai(name: impl Into<String>) -> Self {
        Self::new(name, SemanticType::Ai)
    }

    /// Creates an output port of the given category.
    #[must_use]
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
        }
    }
}
