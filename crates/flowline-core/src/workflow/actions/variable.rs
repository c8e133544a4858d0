//! `set_variable`: write values into the context.

use std::collections::BTreeMap;

use flowline_types::action::ActionResult;
use serde_json::{Value, json};

use crate::workflow::action::{Action, ActionError, required_str};
use crate::workflow::context::WorkflowContext;

/// Sets one (`{name, value}`) or many (`{variables: {path: value}}`)
/// context paths.
///
/// The new values are returned as nested output, so the executor's merge
/// is what writes them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetVariableAction;

impl Action for SetVariableAction {
    fn identifier(&self) -> &str {
        "set_variable"
    }

    fn name(&self) -> &str {
        "Set Variable"
    }

    fn description(&self) -> &str {
        "Set one or more context variables"
    }

    fn config_schema(&self) -> Value {
        json!({
            "name": { "type": "string", "description": "Dot-path to set" },
            "value": { "description": "Value to store" },
            "variables": { "type": "object", "description": "Map of dot-path to value" }
        })
    }

    fn supports_async(&self) -> bool {
        false
    }

    fn output_keys(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([("*", "Each variable that was set")])
    }

    async fn execute(
        &self,
        _ctx: &WorkflowContext,
        config: &Value,
    ) -> Result<ActionResult, ActionError> {
        let mut entries: Vec<(String, Value)> = Vec::new();
        match config.get("variables").and_then(Value::as_object) {
            Some(vars) => {
                entries.extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            None => {
                let name = required_str(config, "name")?;
                let value = config.get("value").cloned().unwrap_or(Value::Null);
                entries.push((name.to_string(), value));
            }
        }

        let mut scratch = WorkflowContext::new();
        for (path, value) in entries {
            scratch
                .set(&path, value)
                .map_err(|e| ActionError::InvalidConfig(e.to_string()))?;
        }

        Ok(ActionResult::success(scratch.data().clone()))
    }
}
