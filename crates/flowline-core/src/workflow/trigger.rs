//! Trigger handlers and matching.
//!
//! The engine only asks a trigger one question: given this context, should
//! the workflow start? Source integrations (HTTP routing, signature checks,
//! schedulers) sit outside and populate the context metadata.

use std::collections::HashMap;
use std::sync::Arc;

use flowline_types::workflow::Workflow;
use serde_json::Value;

use super::context::WorkflowContext;
use super::value::loose_eq;

pub trait TriggerHandler: Send + Sync {
    fn identifier(&self) -> &str;

    fn name(&self) -> &str;

    fn should_trigger(&self, ctx: &WorkflowContext, config: &Value) -> bool;
}

/// Always fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualTrigger;

impl TriggerHandler for ManualTrigger {
    fn identifier(&self) -> &str {
        "manual"
    }

    fn name(&self) -> &str {
        "Manual"
    }

    fn should_trigger(&self, _ctx: &WorkflowContext, _config: &Value) -> bool {
        true
    }
}

/// Fires when metadata `event` names the configured event and every entry
/// of the optional `filter` map matches the context data.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventTrigger;

impl TriggerHandler for EventTrigger {
    fn identifier(&self) -> &str {
        "event"
    }

    fn name(&self) -> &str {
        "Event"
    }

    fn should_trigger(&self, ctx: &WorkflowContext, config: &Value) -> bool {
        let Some(wanted) = config.get("event").and_then(Value::as_str) else {
            return false;
        };
        if ctx.get_meta("event").and_then(Value::as_str) != Some(wanted) {
            return false;
        }
        match config.get("filter").and_then(Value::as_object) {
            Some(filter) => filter.iter().all(|(path, expected)| {
                ctx.get(path).is_some_and(|actual| loose_eq(actual, expected))
            }),
            None => true,
        }
    }
}

/// Fires when metadata `path` equals the configured webhook path.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebhookTrigger;

impl WebhookTrigger {
    fn normalize(path: &str) -> &str {
        path.trim_matches('/')
    }
}

impl TriggerHandler for WebhookTrigger {
    fn identifier(&self) -> &str {
        "webhook"
    }

    fn name(&self) -> &str {
        "Webhook"
    }

    fn should_trigger(&self, ctx: &WorkflowContext, config: &Value) -> bool {
        match (
            config.get("path").and_then(Value::as_str),
            ctx.get_meta("path").and_then(Value::as_str),
        ) {
            (Some(wanted), Some(actual)) => Self::normalize(wanted) == Self::normalize(actual),
            _ => false,
        }
    }
}

/// Registry of trigger handlers keyed by trigger type.
#[derive(Clone, Default)]
pub struct TriggerManager {
    handlers: HashMap<String, Arc<dyn TriggerHandler>>,
}

impl TriggerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager with `manual`, `event` and `webhook` registered.
    pub fn with_builtins() -> Self {
        let mut manager = Self::new();
        manager.register(ManualTrigger);
        manager.register(EventTrigger);
        manager.register(WebhookTrigger);
        manager
    }

    pub fn register(&mut self, handler: impl TriggerHandler + 'static) {
        self.handlers
            .insert(handler.identifier().to_string(), Arc::new(handler));
    }

    pub fn get(&self, trigger_type: &str) -> Option<&Arc<dyn TriggerHandler>> {
        self.handlers.get(trigger_type)
    }

    /// Registered handlers sorted by identifier.
    pub fn handlers(&self) -> Vec<&Arc<dyn TriggerHandler>> {
        let mut all: Vec<_> = self.handlers.values().collect();
        all.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        all
    }

    /// Active workflows with a `trigger_type` trigger whose handler agrees.
    pub fn matching_workflows<'a>(
        &self,
        workflows: &'a [Workflow],
        trigger_type: &str,
        ctx: &WorkflowContext,
    ) -> Vec<&'a Workflow> {
        let Some(handler) = self.get(trigger_type) else {
            tracing::debug!(trigger_type, "no trigger handler registered");
            return Vec::new();
        };

        workflows
            .iter()
            .filter(|wf| wf.is_active)
            .filter(|wf| {
                wf.triggers
                    .iter()
                    .filter(|t| t.trigger_type == trigger_type)
                    .any(|t| handler.should_trigger(ctx, &t.config))
            })
            .collect()
    }
}

impl std::fmt::Debug for TriggerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.handlers.keys().collect();
        ids.sort();
        f.debug_struct("TriggerManager").field("handlers", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_types::workflow::TriggerDefinition;
    use serde_json::json;

    fn workflow(name: &str, triggers: Vec<TriggerDefinition>) -> Workflow {
        let mut wf: Workflow = serde_json::from_value(json!({ "name": name })).unwrap();
        wf.triggers = triggers;
        wf
    }

    fn event_ctx(event: &str, data: Value) -> WorkflowContext {
        let mut ctx = WorkflowContext::from_value(data);
        ctx.set_meta("event", json!(event));
        ctx
    }

    #[test]
    fn event_trigger_matches_name_and_filter() {
        let config = json!({ "event": "order.created", "filter": { "order.status": "paid" } });
        let paid = event_ctx("order.created", json!({ "order": { "status": "paid" } }));
        let open = event_ctx("order.created", json!({ "order": { "status": "open" } }));
        let other = event_ctx("order.deleted", json!({ "order": { "status": "paid" } }));

        assert!(EventTrigger.should_trigger(&paid, &config));
        assert!(!EventTrigger.should_trigger(&open, &config));
        assert!(!EventTrigger.should_trigger(&other, &config));
        assert!(!EventTrigger.should_trigger(&paid, &json!({})));
    }

    #[test]
    fn webhook_trigger_matches_path() {
        let mut ctx = WorkflowContext::new();
        ctx.set_meta("path", json!("/hooks/stripe"));
        assert!(WebhookTrigger.should_trigger(&ctx, &json!({ "path": "hooks/stripe" })));
        assert!(!WebhookTrigger.should_trigger(&ctx, &json!({ "path": "hooks/github" })));
        assert!(!WebhookTrigger.should_trigger(&WorkflowContext::new(), &json!({ "path": "x" })));
    }

    #[test]
    fn matching_skips_inactive_and_other_types() {
        let manager = TriggerManager::with_builtins();
        let on_created = TriggerDefinition::new("event", json!({ "event": "user.created" }));

        let mut inactive = workflow("inactive", vec![on_created.clone()]);
        inactive.is_active = false;
        let workflows = vec![
            workflow("welcome", vec![on_created.clone()]),
            workflow("manual-only", vec![TriggerDefinition::new("manual", json!({}))]),
            inactive,
        ];

        let ctx = event_ctx("user.created", json!({}));
        let names: Vec<&str> = manager
            .matching_workflows(&workflows, "event", &ctx)
            .iter()
            .map(|wf| wf.name.as_str())
            .collect();
        assert_eq!(names, ["welcome"]);

        assert!(manager.matching_workflows(&workflows, "cron", &ctx).is_empty());
    }
}
