//! `delay` and `wait_for_event`.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use flowline_types::action::{ActionResult, Routing, WaitDescriptor};
use serde_json::{Map, Value, json};

use crate::workflow::action::{Action, ActionError, required_str};
use crate::workflow::context::WorkflowContext;
use crate::workflow::value::{as_number, is_truthy, to_integer};

/// Seconds per unit name accepted by `delay`.
fn unit_seconds(unit: &str) -> Option<u64> {
    match unit {
        "second" | "seconds" | "s" => Some(1),
        "minute" | "minutes" | "m" => Some(60),
        "hour" | "hours" | "h" => Some(3_600),
        "day" | "days" | "d" => Some(86_400),
        "week" | "weeks" | "w" => Some(604_800),
        _ => None,
    }
}

/// Convert `{duration, unit}` into seconds, bounded by `max_delay`.
pub fn delay_seconds(config: &Value, max_delay: u64) -> Result<u64, ActionError> {
    let duration = config
        .get("duration")
        .filter(|v| as_number(v).is_some())
        .map(to_integer)
        .ok_or_else(|| ActionError::InvalidConfig("'duration' must be a number".into()))?;
    let duration = u64::try_from(duration)
        .map_err(|_| ActionError::InvalidConfig("'duration' must not be negative".into()))?;

    let unit = config.get("unit").and_then(Value::as_str).unwrap_or("seconds");
    let per_unit = unit_seconds(unit)
        .ok_or_else(|| ActionError::InvalidConfig(format!("unknown delay unit '{unit}'")))?;

    let seconds = duration.saturating_mul(per_unit);
    if seconds > max_delay {
        return Err(ActionError::InvalidConfig(format!(
            "delay of {seconds}s exceeds the maximum of {max_delay}s"
        )));
    }
    Ok(seconds)
}

// ---------------------------------------------------------------------------
// delay
// ---------------------------------------------------------------------------

/// Reports the computed delay. The engine does the actual scheduling from
/// the node's `delay` field.
#[derive(Debug, Clone, Copy)]
pub struct DelayAction {
    max_delay: u64,
}

impl DelayAction {
    pub fn new(max_delay: u64) -> Self {
        Self { max_delay }
    }
}

impl Action for DelayAction {
    fn identifier(&self) -> &str {
        "delay"
    }

    fn name(&self) -> &str {
        "Delay"
    }

    fn description(&self) -> &str {
        "Compute a delay in seconds"
    }

    fn config_schema(&self) -> Value {
        json!({
            "duration": { "type": "integer", "required": true },
            "unit": { "type": "string", "enum": ["seconds", "minutes", "hours", "days", "weeks"] }
        })
    }

    fn output_keys(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            ("delay_seconds", "Delay in seconds"),
            ("resume_at", "When the delay elapses (RFC 3339)"),
        ])
    }

    async fn execute(
        &self,
        _ctx: &WorkflowContext,
        config: &Value,
    ) -> Result<ActionResult, ActionError> {
        let seconds = delay_seconds(config, self.max_delay)?;
        let resume_at = Utc::now() + Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX));

        let mut output = Map::new();
        output.insert("delay_seconds".into(), json!(seconds));
        output.insert("resume_at".into(), json!(resume_at.to_rfc3339()));
        Ok(ActionResult::success(output))
    }
}

// ---------------------------------------------------------------------------
// wait_for_event
// ---------------------------------------------------------------------------

/// Suspends the run until `resume` is called for the named event.
///
/// When `_goal_met.<event>` is already truthy in the context the wait is
/// skipped, jumping to `continue_node_id` if one is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitForEventAction;

impl Action for WaitForEventAction {
    fn identifier(&self) -> &str {
        "wait_for_event"
    }

    fn name(&self) -> &str {
        "Wait For Event"
    }

    fn description(&self) -> &str {
        "Pause the run until an external event arrives"
    }

    fn config_schema(&self) -> Value {
        json!({
            "event": { "type": "string", "required": true },
            "timeout": { "type": "integer", "description": "Seconds before the wait expires" },
            "correlation": { "description": "Value used to match the resuming event" },
            "continue_node_id": { "type": "string", "description": "Node to resume at" },
            "timeout_action": { "type": "string", "enum": ["continue", "fail", "goto"] },
            "timeout_node_id": { "type": "string", "description": "Target when timeout_action is goto" }
        })
    }

    fn output_keys(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            ("event_name", "Event the node waited for"),
            ("already_met", "Set when the event had fired before the wait"),
        ])
    }

    fn supports_async(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        ctx: &WorkflowContext,
        config: &Value,
    ) -> Result<ActionResult, ActionError> {
        let event = required_str(config, "event")?;
        let node = |key: &str| {
            config
                .get(key)
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        };
        let continue_node_id = node("continue_node_id");

        if ctx.get(&format!("_goal_met.{event}")).is_some_and(is_truthy) {
            let mut output = Map::new();
            output.insert("event_name".into(), json!(event));
            output.insert("already_met".into(), Value::Bool(true));
            let result = ActionResult::success(output);
            return Ok(match continue_node_id {
                Some(node_id) => result.with_routing(Routing::JumpTo { node_id, max_loops: None }),
                None => result,
            });
        }

        let timeout_action = config
            .get("timeout_action")
            .and_then(Value::as_str)
            .map(str::to_string);
        let timeout_node_id = node("timeout_node_id");
        match timeout_action.as_deref() {
            None | Some("continue" | "fail") => {}
            Some("goto") if timeout_node_id.is_some() => {}
            Some("goto") => {
                return Err(ActionError::InvalidConfig(
                    "timeout_action 'goto' needs 'timeout_node_id'".into(),
                ));
            }
            Some(other) => {
                return Err(ActionError::InvalidConfig(format!(
                    "unknown timeout_action '{other}'"
                )));
            }
        }

        let descriptor = WaitDescriptor {
            event: event.to_string(),
            timeout_secs: config.get("timeout").and_then(Value::as_u64),
            correlation: config.get("correlation").filter(|v| !v.is_null()).cloned(),
            continue_node_id,
            timeout_action,
            timeout_node_id,
        };
        Ok(ActionResult::suspend(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_units() {
        assert_eq!(delay_seconds(&json!({ "duration": 90 }), 1_000).unwrap(), 90);
        assert_eq!(
            delay_seconds(&json!({ "duration": 2, "unit": "hours" }), 86_400).unwrap(),
            7_200
        );
        assert_eq!(
            delay_seconds(&json!({ "duration": "1", "unit": "weeks" }), 2_592_000).unwrap(),
            604_800
        );
    }

    #[test]
    fn delay_rejects_bad_input() {
        assert!(delay_seconds(&json!({}), 100).is_err());
        assert!(delay_seconds(&json!({ "duration": -5 }), 100).is_err());
        assert!(delay_seconds(&json!({ "duration": 1, "unit": "fortnights" }), 100).is_err());
        assert!(delay_seconds(&json!({ "duration": 31, "unit": "days" }), 2_592_000).is_err());
    }

    #[tokio::test]
    async fn delay_action_reports_seconds() {
        let result = DelayAction::new(3_600)
            .execute(&WorkflowContext::new(), &json!({ "duration": 5, "unit": "minutes" }))
            .await
            .unwrap();
        assert_eq!(result.output.get("delay_seconds"), Some(&json!(300)));
        assert!(result.output.contains_key("resume_at"));
    }

    #[tokio::test]
    async fn wait_for_event_suspends() {
        let config = json!({ "event": "payment.received", "timeout": 3600, "correlation": "order-7" });
        let result = WaitForEventAction
            .execute(&WorkflowContext::new(), &config)
            .await
            .unwrap();
        assert_eq!(
            result.routing,
            Routing::Suspend(WaitDescriptor {
                event: "payment.received".into(),
                timeout_secs: Some(3600),
                correlation: Some(json!("order-7")),
                ..WaitDescriptor::default()
            })
        );
    }

    #[tokio::test]
    async fn wait_for_event_keeps_resume_and_timeout_targets() {
        let config = json!({
            "event": "approved",
            "continue_node_id": "ship",
            "timeout_action": "goto",
            "timeout_node_id": "escalate"
        });
        let result = WaitForEventAction
            .execute(&WorkflowContext::new(), &config)
            .await
            .unwrap();
        let Routing::Suspend(wait) = result.routing else {
            panic!("expected suspend, got {:?}", result.routing);
        };
        assert_eq!(wait.continue_node_id.as_deref(), Some("ship"));
        assert_eq!(wait.timeout_action.as_deref(), Some("goto"));
        assert_eq!(wait.timeout_node_id.as_deref(), Some("escalate"));

        let missing_target = json!({ "event": "approved", "timeout_action": "goto" });
        assert!(WaitForEventAction
            .execute(&WorkflowContext::new(), &missing_target)
            .await
            .is_err());
        let unknown = json!({ "event": "approved", "timeout_action": "retry" });
        assert!(WaitForEventAction
            .execute(&WorkflowContext::new(), &unknown)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn wait_for_event_skips_goal_already_met() {
        let ctx = WorkflowContext::from_value(json!({ "_goal_met": { "approved": true } }));

        let result = WaitForEventAction
            .execute(&ctx, &json!({ "event": "approved" }))
            .await
            .unwrap();
        assert!(result.is_success());
        assert!(result.routing.is_continue());
        assert_eq!(result.output.get("already_met"), Some(&json!(true)));

        let result = WaitForEventAction
            .execute(&ctx, &json!({ "event": "approved", "continue_node_id": "ship" }))
            .await
            .unwrap();
        assert_eq!(result.routing, Routing::JumpTo { node_id: "ship".into(), max_loops: None });

        let other = WaitForEventAction
            .execute(&ctx, &json!({ "event": "shipped" }))
            .await
            .unwrap();
        assert!(matches!(other.routing, Routing::Suspend(_)));
    }
}
