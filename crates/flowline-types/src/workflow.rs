//! Workflow definition types for Flowline.
//!
//! A `Workflow` is an already-parsed definition: the triggers that may start
//! it, the gating conditions evaluated before any action runs, and the action
//! nodes the engine walks. YAML files, JSON documents and the fluent builder
//! all produce this struct.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// The canonical workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned when the definition is first loaded.
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Inactive workflows are rejected before any execution record exists.
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Trigger bindings (manual, event, webhook, ...).
    #[serde(default)]
    pub triggers: Vec<TriggerDefinition>,
    /// Gating conditions evaluated before the walk starts.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Action nodes, walked by ascending `order`.
    #[serde(default)]
    pub actions: Vec<ActionNode>,
    /// Free-form settings carried with the definition.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub settings: Map<String, Value>,
}

fn default_active() -> bool {
    true
}

impl Workflow {
    /// Action nodes sorted by ascending `order`, ties kept in definition order.
    pub fn ordered_actions(&self) -> Vec<&ActionNode> {
        let mut nodes: Vec<&ActionNode> = self.actions.iter().collect();
        nodes.sort_by_key(|n| n.order);
        nodes
    }

    /// Whether any trigger binding uses the given trigger type.
    pub fn has_trigger(&self, trigger_type: &str) -> bool {
        self.triggers.iter().any(|t| t.trigger_type == trigger_type)
    }
}

// ---------------------------------------------------------------------------
// Action nodes
// ---------------------------------------------------------------------------

/// One action instance in a workflow.
///
/// `node_id` is the only stable routing target; nodes without one are reached
/// through default sequential order only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionNode {
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Registry identifier of the action handler (e.g. "set_variable").
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub order: i32,
    /// Raw handler configuration, interpolated against the context before dispatch.
    #[serde(default = "empty_object")]
    pub config: Value,
    /// Seconds to defer this node; zero runs it inline.
    #[serde(default)]
    pub delay: u64,
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl ActionNode {
    /// Create a node with an empty configuration object.
    pub fn new(action_type: impl Into<String>, order: i32) -> Self {
        Self {
            id: Uuid::now_v7(),
            node_id: None,
            action_type: action_type.into(),
            order,
            config: empty_object(),
            delay: 0,
            continue_on_failure: false,
        }
    }

    pub fn has_delay(&self) -> bool {
        self.delay > 0
    }

    /// `node_id` when present, otherwise the action type. Used in logs.
    pub fn label(&self) -> &str {
        self.node_id.as_deref().unwrap_or(&self.action_type)
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// How a condition combines with the running result of its group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    #[default]
    And,
    Or,
}

/// A single gating predicate.
///
/// Groups are ANDed together; within a group, conditions fold left to right
/// using each item's own `logic` against the accumulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Condition handler identifier ("field", "date", "custom", ...).
    #[serde(rename = "type", default = "default_condition_type")]
    pub condition_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub logic: Logic,
    #[serde(default)]
    pub group: u32,
    #[serde(default)]
    pub order: i32,
    /// Extra handler-specific settings (e.g. the `handler` of a custom condition).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
}

fn default_condition_type() -> String {
    "field".to_string()
}

fn default_operator() -> String {
    "equals".to_string()
}

impl Condition {
    /// A field condition joined with AND in group 0.
    pub fn field(field: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            condition_type: default_condition_type(),
            field: Some(field.into()),
            operator: operator.into(),
            value,
            logic: Logic::And,
            group: 0,
            order: 0,
            config: Map::new(),
        }
    }

    pub fn with_logic(mut self, logic: Logic) -> Self {
        self.logic = logic;
        self
    }

    pub fn in_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    pub fn is_or(&self) -> bool {
        self.logic == Logic::Or
    }

    /// Flatten into the config object handed to a condition handler.
    pub fn to_handler_config(&self) -> Value {
        let mut config = self.config.clone();
        if let Some(field) = &self.field {
            config.insert("field".to_string(), Value::String(field.clone()));
        }
        config.insert("operator".to_string(), Value::String(self.operator.clone()));
        config.insert("value".to_string(), self.value.clone());
        Value::Object(config)
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// Binds a workflow to a trigger type with handler-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDefinition {
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default = "empty_object")]
    pub config: Value,
}

impl TriggerDefinition {
    pub fn new(trigger_type: impl Into<String>, config: Value) -> Self {
        Self {
            trigger_type: trigger_type.into(),
            config,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
