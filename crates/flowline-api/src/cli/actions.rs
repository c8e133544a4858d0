//! Actions only the CLI registers.

use std::collections::BTreeMap;

use flowline_core::workflow::action::{Action, ActionError};
use flowline_core::workflow::context::WorkflowContext;
use flowline_types::action::ActionResult;
use serde_json::{Map, Value, json};

/// `log`: write `message` to the tracing output at `level` (default `info`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAction;

impl Action for LogAction {
    fn identifier(&self) -> &str {
        "log"
    }

    fn name(&self) -> &str {
        "Log"
    }

    fn description(&self) -> &str {
        "Write a message to the log"
    }

    fn config_schema(&self) -> Value {
        json!({
            "message": { "type": "string", "description": "Text to log (interpolated)" },
            "level": {
                "type": "string",
                "enum": ["trace", "debug", "info", "warn", "error"],
                "default": "info"
            }
        })
    }

    fn supports_async(&self) -> bool {
        false
    }

    fn output_keys(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([("logged", "The message as written")])
    }

    async fn execute(
        &self,
        _ctx: &WorkflowContext,
        config: &Value,
    ) -> Result<ActionResult, ActionError> {
        let message = match config.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                return Err(ActionError::InvalidConfig("missing 'message'".into()));
            }
            Some(other) => other.to_string(),
        };
        let level = config.get("level").and_then(Value::as_str).unwrap_or("info");

        match level {
            "trace" => tracing::trace!(target: "flowline::workflow", "{message}"),
            "debug" => tracing::debug!(target: "flowline::workflow", "{message}"),
            "info" => tracing::info!(target: "flowline::workflow", "{message}"),
            "warn" | "warning" => tracing::warn!(target: "flowline::workflow", "{message}"),
            "error" => tracing::error!(target: "flowline::workflow", "{message}"),
            other => {
                return Err(ActionError::InvalidConfig(format!("unknown level '{other}'")));
            }
        }

        let mut output = Map::new();
        output.insert("logged".into(), Value::String(message));
        Ok(ActionResult::success(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logs_message_into_output() {
        let result = LogAction
            .execute(&WorkflowContext::new(), &json!({ "message": "hello", "level": "debug" }))
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.output["logged"], "hello");
    }

    #[tokio::test]
    async fn non_string_messages_are_rendered() {
        let result = LogAction
            .execute(&WorkflowContext::new(), &json!({ "message": 42 }))
            .await
            .unwrap();
        assert_eq!(result.output["logged"], "42");
    }

    #[tokio::test]
    async fn rejects_missing_message_and_bad_level() {
        let ctx = WorkflowContext::new();
        assert!(matches!(
            LogAction.execute(&ctx, &json!({})).await,
            Err(ActionError::InvalidConfig(_))
        ));
        assert!(matches!(
            LogAction.execute(&ctx, &json!({ "message": "x", "level": "loud" })).await,
            Err(ActionError::InvalidConfig(_))
        ));
    }
}
