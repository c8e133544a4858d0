//! Fluent construction of workflow definitions in code.

use flowline_types::config::EngineConfig;
use flowline_types::workflow::{ActionNode, Condition, Logic, TriggerDefinition, Workflow};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::definition::{DefinitionError, validate_workflow};

/// Builds a [`Workflow`] step by step.
///
/// Conditions land in the current group until [`condition_group`] starts the
/// next one. Actions are ordered by insertion.
///
/// [`condition_group`]: WorkflowBuilder::condition_group
#[derive(Debug, Clone, Default)]
pub struct WorkflowBuilder {
    name: String,
    description: Option<String>,
    active: bool,
    settings: Map<String, Value>,
    triggers: Vec<TriggerDefinition>,
    conditions: Vec<Condition>,
    actions: Vec<ActionNode>,
    group: u32,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn settings(mut self, settings: Map<String, Value>) -> Self {
        self.settings = settings;
        self
    }

    pub fn trigger(mut self, trigger_type: impl Into<String>, config: Value) -> Self {
        self.triggers.push(TriggerDefinition::new(trigger_type, config));
        self
    }

    // -----------------------------------------------------------------------
    // Conditions
    // -----------------------------------------------------------------------

    /// AND a field condition into the current group.
    pub fn when(self, field: &str, operator: &str, value: Value) -> Self {
        self.push_condition(Condition::field(field, operator, value), Logic::And)
    }

    /// OR a field condition into the current group.
    pub fn or_when(self, field: &str, operator: &str, value: Value) -> Self {
        self.push_condition(Condition::field(field, operator, value), Logic::Or)
    }

    /// AND a condition of any registered type. `field`, `operator` and
    /// `value` are lifted out of `config`; the rest stays handler config.
    pub fn condition(self, condition_type: &str, config: Value) -> Self {
        self.push_condition(typed_condition(condition_type, config), Logic::And)
    }

    pub fn or_condition(self, condition_type: &str, config: Value) -> Self {
        self.push_condition(typed_condition(condition_type, config), Logic::Or)
    }

    /// Start a new condition group. Groups are ANDed together.
    pub fn condition_group(mut self) -> Self {
        if self.conditions.iter().any(|c| c.group == self.group) {
            self.group += 1;
        }
        self
    }

    fn push_condition(mut self, condition: Condition, logic: Logic) -> Self {
        let mut condition = condition.with_logic(logic).in_group(self.group);
        condition.order = i32::try_from(self.conditions.len()).unwrap_or(i32::MAX);
        self.conditions.push(condition);
        self
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Append an action without a routing target.
    pub fn action(mut self, action_type: &str, config: Value) -> Self {
        let node = self.new_node(action_type, config);
        self.actions.push(node);
        self
    }

    /// Append an action addressable as `node_id`.
    pub fn node(mut self, node_id: &str, action_type: &str, config: Value) -> Self {
        let mut node = self.new_node(action_type, config);
        node.node_id = Some(node_id.to_string());
        self.actions.push(node);
        self
    }

    /// Append a `delay` action.
    pub fn delay(self, duration: u64, unit: &str) -> Self {
        self.action("delay", json!({ "duration": duration, "unit": unit }))
    }

    /// Defer the most recently added action by `seconds`.
    pub fn deferred(mut self, seconds: u64) -> Self {
        if let Some(node) = self.actions.last_mut() {
            node.delay = seconds;
        }
        self
    }

    /// Let the walk continue past a failure of the most recent action.
    pub fn continue_on_failure(mut self) -> Self {
        if let Some(node) = self.actions.last_mut() {
            node.continue_on_failure = true;
        }
        self
    }

    fn new_node(&self, action_type: &str, config: Value) -> ActionNode {
        let order = i32::try_from(self.actions.len()).unwrap_or(i32::MAX);
        let mut node = ActionNode::new(action_type, order);
        node.config = config;
        node
    }

    // -----------------------------------------------------------------------
    // Finish
    // -----------------------------------------------------------------------

    pub fn build(self) -> Workflow {
        Workflow {
            id: Uuid::now_v7(),
            name: self.name,
            description: self.description,
            is_active: self.active,
            triggers: self.triggers,
            conditions: self.conditions,
            actions: self.actions,
            settings: self.settings,
        }
    }

    /// Build and run structural validation.
    pub fn build_validated(self, config: &EngineConfig) -> Result<Workflow, DefinitionError> {
        let workflow = self.build();
        validate_workflow(&workflow, config)?;
        Ok(workflow)
    }
}

fn typed_condition(condition_type: &str, config: Value) -> Condition {
    let mut config = match config {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let field = config
        .remove("field")
        .and_then(|v| v.as_str().map(str::to_string));
    let operator = config
        .remove("operator")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "equals".to_string());
    let value = config.remove("value").unwrap_or(Value::Null);

    Condition {
        condition_type: condition_type.to_string(),
        field,
        operator,
        value,
        logic: Logic::And,
        group: 0,
        order: 0,
        config,
    }
}
