//! Control-flow actions: `goto`, `if_else`, and `split`.
//!
//! These never touch the context themselves; they only return routing
//! signals for the engine to act on.

use std::collections::BTreeMap;

use flowline_types::action::{ActionResult, Routing};
use serde_json::{Map, Value, json};

use crate::workflow::action::{Action, ActionError, required_str};
use crate::workflow::context::WorkflowContext;
use crate::workflow::operator::evaluate_operator;

/// Evaluate an inline `{field, operator, value}` test against the context.
fn inline_test(ctx: &WorkflowContext, spec: &Value) -> Result<bool, ActionError> {
    let field = required_str(spec, "field")?;
    let operator = spec.get("operator").and_then(Value::as_str).unwrap_or("equals");
    let actual = ctx.get(field).unwrap_or(&Value::Null);
    let expected = spec.get("value").unwrap_or(&Value::Null);
    evaluate_operator(operator, actual, expected)
        .map_err(|e| ActionError::InvalidConfig(e.to_string()))
}

fn max_loops(config: &Value) -> Option<u32> {
    config
        .get("max_loops")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

// ---------------------------------------------------------------------------
// goto
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct GotoAction;

impl Action for GotoAction {
    fn identifier(&self) -> &str {
        "goto"
    }

    fn name(&self) -> &str {
        "Go To"
    }

    fn description(&self) -> &str {
        "Jump to another node"
    }

    fn config_schema(&self) -> Value {
        json!({
            "node_id": { "type": "string", "required": true },
            "max_loops": { "type": "integer", "description": "Visit limit for the target" }
        })
    }

    fn supports_async(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        _ctx: &WorkflowContext,
        config: &Value,
    ) -> Result<ActionResult, ActionError> {
        let target = required_str(config, "node_id")?;
        Ok(ActionResult::jump_to(target, max_loops(config)))
    }
}

// ---------------------------------------------------------------------------
// if_else
// ---------------------------------------------------------------------------

/// Tests one field, or a `conditions` list joined by `logic` (`and` by
/// default, or `or`), and jumps to `true_node_id` or `false_node_id`. When
/// the chosen branch names no target the walk simply continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct IfElseAction;

impl Action for IfElseAction {
    fn identifier(&self) -> &str {
        "if_else"
    }

    fn name(&self) -> &str {
        "If / Else"
    }

    fn description(&self) -> &str {
        "Branch on a field comparison"
    }

    fn config_schema(&self) -> Value {
        json!({
            "field": { "type": "string" },
            "operator": { "type": "string", "default": "equals" },
            "value": {},
            "conditions": { "type": "array", "items": "{field, operator, value}" },
            "logic": { "type": "string", "enum": ["and", "or"], "default": "and" },
            "true_node_id": { "type": "string" },
            "false_node_id": { "type": "string" }
        })
    }

    fn supports_async(&self) -> bool {
        false
    }

    fn output_keys(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            ("condition_result", "Outcome of the comparison"),
            ("branch", "\"true\" or \"false\""),
            ("condition_results", "Outcome of each listed condition"),
        ])
    }

    async fn execute(
        &self,
        ctx: &WorkflowContext,
        config: &Value,
    ) -> Result<ActionResult, ActionError> {
        let results = match config.get("conditions") {
            Some(Value::Array(list)) if list.is_empty() => {
                return Ok(ActionResult::failure("no conditions specified"));
            }
            Some(Value::Array(list)) => list
                .iter()
                .map(|test| inline_test(ctx, test))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ActionError::InvalidConfig("'conditions' must be a list".into()));
            }
            None => vec![inline_test(ctx, config)?],
        };
        let passed = match config.get("logic").and_then(Value::as_str).unwrap_or("and") {
            "and" => results.iter().all(|r| *r),
            "or" => results.iter().any(|r| *r),
            other => {
                return Err(ActionError::InvalidConfig(format!("unknown logic '{other}'")));
            }
        };
        let (key, branch) = if passed {
            ("true_node_id", "true")
        } else {
            ("false_node_id", "false")
        };

        let mut output = Map::new();
        output.insert("condition_result".into(), Value::Bool(passed));
        output.insert("branch".into(), json!(branch));
        output.insert("condition_results".into(), json!(results));
        let result = ActionResult::success(output);

        Ok(match config.get(key).and_then(Value::as_str) {
            Some(target) if !target.is_empty() => result.with_routing(Routing::JumpTo {
                node_id: target.to_string(),
                max_loops: max_loops(config),
            }),
            _ => result,
        })
    }
}

// ---------------------------------------------------------------------------
// split
// ---------------------------------------------------------------------------

/// Fans out to every branch whose optional condition passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitAction;

impl SplitAction {
    fn selected(ctx: &WorkflowContext, branches: &[Value]) -> Result<Vec<String>, ActionError> {
        let mut ids = Vec::new();
        for branch in branches {
            let (node_id, condition) = match branch {
                Value::String(id) => (id.as_str(), None),
                Value::Object(_) => (required_str(branch, "node_id")?, branch.get("condition")),
                _ => {
                    return Err(ActionError::InvalidConfig(
                        "each branch must be a node id or an object".into(),
                    ));
                }
            };
            let take = match condition {
                Some(test) if !test.is_null() => inline_test(ctx, test)?,
                _ => true,
            };
            if take {
                ids.push(node_id.to_string());
            }
        }
        Ok(ids)
    }
}

impl Action for SplitAction {
    fn identifier(&self) -> &str {
        "split"
    }

    fn name(&self) -> &str {
        "Split"
    }

    fn description(&self) -> &str {
        "Run several branches independently"
    }

    fn config_schema(&self) -> Value {
        json!({
            "branches": {
                "type": "array",
                "required": true,
                "items": { "node_id": "string", "condition": "{field, operator, value}" }
            }
        })
    }

    fn supports_async(&self) -> bool {
        false
    }

    fn output_keys(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            ("branches", "Node ids that were dispatched"),
            ("branch_count", "How many branches were dispatched"),
        ])
    }

    async fn execute(
        &self,
        ctx: &WorkflowContext,
        config: &Value,
    ) -> Result<ActionResult, ActionError> {
        let branches = config
            .get("branches")
            .and_then(Value::as_array)
            .ok_or_else(|| ActionError::InvalidConfig("missing 'branches'".into()))?;
        if branches.is_empty() {
            return Ok(ActionResult::failure("no branches specified"));
        }

        let ids = Self::selected(ctx, branches)?;
        let mut result = if ids.is_empty() {
            ActionResult::success(Map::new())
        } else {
            ActionResult::fork(ids.clone())
        };
        result.output.insert("branch_count".into(), json!(ids.len()));
        result.output.insert("branches".into(), json!(ids));
        Ok(result)
    }
}
