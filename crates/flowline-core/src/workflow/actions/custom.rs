//! `custom`: run an application-registered closure by name.

use std::collections::HashMap;
use std::sync::Arc;

use flowline_types::action::ActionResult;
use serde_json::{Map, Value, json};

use crate::workflow::action::{Action, ActionError, required_str};
use crate::workflow::context::WorkflowContext;

/// Signature of a custom action body. `params` is the interpolated
/// `params` config entry (null when absent).
pub type ActionFn = dyn Fn(&WorkflowContext, &Value) -> Result<Value, String> + Send + Sync;

/// Named closures callable from `custom` nodes.
#[derive(Clone, Default)]
pub struct CustomActionRegistry {
    handlers: HashMap<String, Arc<ActionFn>>,
}

impl CustomActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&WorkflowContext, &Value) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.handlers.insert(name.into(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ActionFn>> {
        self.handlers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for CustomActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomActionRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

/// Turn whatever a closure returned into an `ActionResult`.
///
/// Booleans map to success or failure, objects become the output, and any
/// other value is wrapped as `{result: value}`.
pub fn normalize_result(value: Value) -> ActionResult {
    match value {
        Value::Bool(true) => ActionResult::success(Map::new()),
        Value::Bool(false) => ActionResult::failure("custom handler returned false"),
        Value::Object(output) => ActionResult::success(output),
        other => {
            let mut output = Map::new();
            output.insert("result".into(), other);
            ActionResult::success(output)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CustomAction {
    registry: CustomActionRegistry,
}

impl CustomAction {
    pub fn new(registry: CustomActionRegistry) -> Self {
        Self { registry }
    }
}

impl Action for CustomAction {
    fn identifier(&self) -> &str {
        "custom"
    }

    fn name(&self) -> &str {
        "Custom"
    }

    fn description(&self) -> &str {
        "Call a registered handler"
    }

    fn config_schema(&self) -> Value {
        json!({
            "handler": { "type": "string", "required": true, "enum": self.registry.names() },
            "params": { "type": "object" }
        })
    }

    async fn execute(
        &self,
        ctx: &WorkflowContext,
        config: &Value,
    ) -> Result<ActionResult, ActionError> {
        let name = required_str(config, "handler")?;
        let handler = self
            .registry
            .get(name)
            .ok_or_else(|| ActionError::InvalidConfig(format!("no custom action named '{name}'")))?;

        let params = config.get("params").unwrap_or(&Value::Null);
        match handler(ctx, params) {
            Ok(value) => Ok(normalize_result(value)),
            Err(message) => Ok(ActionResult::failure(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action() -> CustomAction {
        let mut registry = CustomActionRegistry::new();
        registry.register("double", |_ctx, params| {
            let n = params.get("n").and_then(Value::as_i64).ok_or("n is required")?;
            Ok(json!(n * 2))
        });
        registry.register("greet", |ctx, _params| {
            let name = ctx.get("name").and_then(Value::as_str).unwrap_or("there");
            Ok(json!({ "greeting": format!("hello {name}") }))
        });
        registry.register("gate", |ctx, _params| Ok(json!(ctx.has("open"))));
        CustomAction::new(registry)
    }

    #[tokio::test]
    async fn normalizes_closure_results() {
        let a = action();
        let ctx = WorkflowContext::from_value(json!({ "name": "Ann" }));

        let r = a
            .execute(&ctx, &json!({ "handler": "double", "params": { "n": 21 } }))
            .await
            .unwrap();
        assert_eq!(r.output.get("result"), Some(&json!(42)));

        let r = a.execute(&ctx, &json!({ "handler": "greet" })).await.unwrap();
        assert_eq!(r.output.get("greeting"), Some(&json!("hello Ann")));

        let r = a.execute(&ctx, &json!({ "handler": "gate" })).await.unwrap();
        assert!(r.is_failure());
    }

    #[tokio::test]
    async fn closure_errors_fail_the_step() {
        let r = action()
            .execute(&WorkflowContext::new(), &json!({ "handler": "double" }))
            .await
            .unwrap();
        assert!(r.is_failure());
        assert_eq!(r.message.as_deref(), Some("n is required"));
    }

    #[tokio::test]
    async fn unknown_handler_is_config_error() {
        let err = action()
            .execute(&WorkflowContext::new(), &json!({ "handler": "nope" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidConfig(_)));
    }
}
