//! Node type catalog.
//!
//! A read-only registry mapping a node type id (e.g. `"ai-agent"`) to its
//! declared ports and configurable properties. The catalog is built once
//! and shared behind an `Arc`; nothing mutates it at runtime.

use crate::port::{InputPort, OutputPort};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;

/// The category of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Entry points. At most one instance per trigger type in a workflow.
    Trigger,
    /// Steps that act on workflow data.
    Action,
    /// AI agents and the capabilities wired into them.
    Ai,
    /// Terminal steps that produce a reply.
    Output,
    /// Notes and other helpers.
    Utility,
}

/// The editor widget used for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Text,
    Textarea,
    Password,
    Number,
    Select,
    Toggle,
}

/// Shows a property only while another property holds a given value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleWhen {
    /// The controlling property key.
    pub key: String,
    /// The value that makes the property visible.
    pub equals: JsonValue,
}

/// A configurable property declared by a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub key: String,
    pub label: String,
    pub kind: PropertyKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_when: Option<VisibleWhen>,
}

impl PropertyDefinition {
    /// Creates an optional property with no default.
    #[must_use]
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
            required: false,
            default: None,
            visible_when: None,
        }
    }

    /// Marks the property as required for execution.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: JsonValue) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn visible_when(mut self, key: impl Into<String>, equals: JsonValue) -> Self {
        self.visible_when = Some(VisibleWhen {
            key: key.into(),
            equals,
        });
        self
    }

    /// Returns true when `properties` leave this property unset.
    ///
    /// Absent keys, JSON null and the empty string count as unset.
    #[must_use]
    pub fn is_unset_in(&self, properties: &Map<String, JsonValue>) -> bool {
        match properties.get(&self.key) {
            None | Some(JsonValue::Null) => true,
            Some(JsonValue::String(s)) => s.is_empty(),
            Some(_) => false,
        }
    }
}

/// The static definition of a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeDefinition {
    pub type_id: String,
    pub display_name: String,
    pub category: NodeCategory,
    #[serde(default)]
    pub inputs: Vec<InputPort>,
    #[serde(default)]
    pub outputs: Vec<OutputPort>,
    /// Declared properties, in display order.
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
    /// This node's output is the user-facing reply of a run.
    #[serde(default)]
    pub respond_sink: bool,
    /// Consulted for a reply when the respond sink produced nothing.
    #[serde(default)]
    pub reply_fallback: bool,
}

impl NodeTypeDefinition {
    /// Creates a definition with no ports and no properties.
    #[must_use]
    pub fn new(
        type_id: impl Into<String>,
        display_name: impl Into<String>,
        category: NodeCategory,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            display_name: display_name.into(),
            category,
            inputs: Vec::new(),
            outputs: Vec::new(),
            properties: Vec::new(),
            respond_sink: false,
            reply_fallback: false,
        }
    }

    #[must_use]
    pub fn with_input(mut self, port: InputPort) -> Self {
        self.inputs.push(port);
        self
    }

    #[must_use]
    pub fn with_output(mut self, port: OutputPort) -> Self {
        self.outputs.push(port);
        self
    }

    #[must_use]
    pub fn with_property(mut self, property: PropertyDefinition) -> Self {
        self.properties.push(property);
        self
    }

    #[must_use]
    pub fn responds(mut self) -> Self {
        self.respond_sink = true;
        self
    }

    #[must_use]
    pub fn reply_fallback(mut self) -> Self {
        self.reply_fallback = true;
        self
    }

    /// Returns true if this is a trigger type.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.category == NodeCategory::Trigger
    }

    /// Gets an input port by name.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&InputPort> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Gets an output port by name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&OutputPort> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Returns the declared default of every property that has one.
    #[must_use]
    pub fn defaults(&self) -> Map<String, JsonValue> {
        self.properties
            .iter()
            .filter_map(|p| p.default.clone().map(|v| (p.key.clone(), v)))
            .collect()
    }

    /// Returns the required properties in declaration order.
    pub fn required_properties(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties.iter().filter(|p| p.required)
    }
}

/// Read-only registry of node types.
#[derive(Debug, Clone, Default)]
pub struct NodeTypeCatalog {
    types: BTreeMap<String, NodeTypeDefinition>,
}

impl NodeTypeCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition, replacing any previous one with the same id.
    #[must_use]
    pub fn with_type(mut self, definition: NodeTypeDefinition) -> Self {
        self.types.insert(definition.type_id.clone(), definition);
        self
    }

    /// Looks up a node type.
    #[must_use]
    pub fn get(&self, type_id: &str) -> Option<&NodeTypeDefinition> {
        self.types.get(type_id)
    }

    #[must_use]
    pub fn contains(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    /// Returns true if `type_id` is a known trigger type.
    #[must_use]
    pub fn is_trigger(&self, type_id: &str) -> bool {
        self.get(type_id).is_some_and(NodeTypeDefinition::is_trigger)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeTypeDefinition> {
        self.types.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The node types shipped with the editor.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with_type(
                NodeTypeDefinition::new("manual-trigger", "Manual Trigger", NodeCategory::Trigger)
                    .with_output(OutputPort::main())
                    .with_property(PropertyDefinition::new(
                        "message",
                        "Message",
                        PropertyKind::Text,
                    )),
            )
            .with_type(
                NodeTypeDefinition::new(
                    "when-chat-received",
                    "When Chat Message Received",
                    NodeCategory::Trigger,
                )
                .with_output(OutputPort::main()),
            )
            .with_type(
                NodeTypeDefinition::new("ai-agent", "AI Agent", NodeCategory::Ai)
                    .with_input(InputPort::main().with_display_name("Input"))
                    .with_input(
                        InputPort::ai("chat_model")
                            .with_max_connections(1)
                            .with_display_name("Chat Model"),
                    )
                    .with_input(
                        InputPort::ai("memory")
                            .with_max_connections(1)
                            .with_display_name("Memory"),
                    )
                    .with_input(InputPort::ai("tools").with_display_name("Tools"))
                    .with_output(OutputPort::main())
                    .with_property(
                        PropertyDefinition::new(
                            "system_prompt",
                            "System Prompt",
                            PropertyKind::Textarea,
                        )
                        .with_default(json!("You are a helpful assistant.")),
                    )
                    .reply_fallback(),
            )
            .with_type(chat_model("groq-llama", "Groq Llama", "llama-3.1-8b-instant"))
            .with_type(chat_model("gpt-4-turbo", "GPT-4 Turbo", "gpt-4-turbo"))
            .with_type(chat_model("claude-3-sonnet", "Claude 3 Sonnet", "claude-3-sonnet-20240229"))
            .with_type(
                NodeTypeDefinition::new("simple-memory", "Simple Memory", NodeCategory::Ai)
                    .with_output(OutputPort::ai("memory"))
                    .with_property(
                        PropertyDefinition::new(
                            "window_size",
                            "Context Window",
                            PropertyKind::Number,
                        )
                        .with_default(json!(10)),
                    ),
            )
            .with_type(
                NodeTypeDefinition::new("http-request", "HTTP Request", NodeCategory::Action)
                    .with_input(InputPort::main())
                    .with_output(OutputPort::main())
                    .with_property(
                        PropertyDefinition::new("url", "URL", PropertyKind::Text).required(),
                    )
                    .with_property(
                        PropertyDefinition::new("method", "Method", PropertyKind::Select)
                            .with_default(json!("GET")),
                    )
                    .with_property(
                        PropertyDefinition::new("body", "Body", PropertyKind::Textarea)
                            .visible_when("method", json!("POST")),
                    ),
            )
            .with_type(
                NodeTypeDefinition::new("respond-to-chat", "Respond to Chat", NodeCategory::Output)
                    .with_input(InputPort::main())
                    .responds(),
            )
            .with_type(
                NodeTypeDefinition::new("notes", "Notes", NodeCategory::Utility).with_property(
                    PropertyDefinition::new("content", "Content", PropertyKind::Textarea),
                ),
            )
    }
}

fn chat_model(type_id: &str, display_name: &str, model: &str) -> NodeTypeDefinition {
    NodeTypeDefinition::new(type_id, display_name, NodeCategory::Ai)
        .with_output(OutputPort::ai("model"))
        .with_property(PropertyDefinition::new("api_key", "API Key", PropertyKind::Password))
        .with_property(
            PropertyDefinition::new("model", "Model", PropertyKind::Select)
                .required()
                .with_default(json!(model)),
        )
        .with_property(
            PropertyDefinition::new("temperature", "Temperature", PropertyKind::Number)
                .with_default(json!(0.7)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_contains_triggers() {
        let catalog = NodeTypeCatalog::builtin();
        assert!(catalog.is_trigger("manual-trigger"));
        assert!(catalog.is_trigger("when-chat-received"));
        assert!(!catalog.is_trigger("ai-agent"));
        assert!(!catalog.is_trigger("no-such-type"));
    }

    #[test]
    fn agent_capability_inputs_are_capped() {
        let catalog = NodeTypeCatalog::builtin();
        let agent = catalog.get("ai-agent").expect("agent");
        assert_eq!(agent.input("chat_model").and_then(InputPort::connection_limit), Some(1));
        assert_eq!(agent.input("tools").and_then(InputPort::connection_limit), None);
        assert!(agent.reply_fallback);
    }

    #[test]
    fn defaults_skip_properties_without_default() {
        let catalog = NodeTypeCatalog::builtin();
        let defaults = catalog.get("http-request").expect("http").defaults();
        assert_eq!(defaults.get("method"), Some(&json!("GET")));
        assert!(!defaults.contains_key("url"));
        assert!(!defaults.contains_key("body"));
    }

    #[test]
    fn unset_detection() {
        let prop = PropertyDefinition::new("url", "URL", PropertyKind::Text).required();
        let mut props = Map::new();
        assert!(prop.is_unset_in(&props));
        props.insert("url".into(), json!(""));
        assert!(prop.is_unset_in(&props));
        props.insert("url".into(), JsonValue::Null);
        assert!(prop.is_unset_in(&props));
        props.insert("url".into(), json!("https://example.com"));
        assert!(!prop.is_unset_in(&props));
        props.insert("url".into(), json!(0));
        assert!(!prop.is_unset_in(&props));
    }

    #[test]
    fn only_respond_to_chat_is_a_sink() {
        let catalog = NodeTypeCatalog::builtin();
        let sinks: Vec<_> = catalog
            .iter()
            .filter(|d| d.respond_sink)
            .map(|d| d.type_id.as_str())
            .collect();
        assert_eq!(sinks, vec!["respond-to-chat"]);
    }
}
