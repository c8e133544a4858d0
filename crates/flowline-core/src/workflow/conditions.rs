//! Built-in condition handlers: `field`, `date`, and `custom`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde_json::Value;

use super::condition::{ConditionError, ConditionEvaluator, ConditionHandler};
use super::context::WorkflowContext;
use super::operator::Operator;
use super::value::{parse_datetime, to_integer};

fn config_str<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// Compares a context value against `value` with one of the operators.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldCondition;

impl ConditionHandler for FieldCondition {
    fn identifier(&self) -> &str {
        "field"
    }

    fn name(&self) -> &str {
        "Field Condition"
    }

    fn operators(&self) -> Vec<&'static str> {
        Operator::ALL.iter().map(Operator::name).collect()
    }

    fn evaluate(&self, ctx: &WorkflowContext, config: &Value) -> Result<bool, ConditionError> {
        let field = config_str(config, "field")
            .ok_or_else(|| ConditionError::InvalidConfig("field condition needs a 'field'".into()))?;
        let operator: Operator = config_str(config, "operator").unwrap_or("equals").parse()?;
        let actual = ctx.get(field).unwrap_or(&Value::Null);
        let expected = config.get("value").unwrap_or(&Value::Null);
        Ok(operator.apply(actual, expected))
    }
}

// ---------------------------------------------------------------------------
// Date
// ---------------------------------------------------------------------------

const DATE_OPERATORS: [&str; 14] = [
    "equals",
    "before",
    "after",
    "on_or_before",
    "on_or_after",
    "between",
    "days_ago",
    "days_from_now",
    "is_today",
    "is_past",
    "is_future",
    "same_week",
    "same_month",
    "same_year",
];

/// Compares a date-valued field. Missing or unparseable dates are false.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateCondition;

impl DateCondition {
    fn compare_to(value: Option<&Value>) -> Option<DateTime<Utc>> {
        match value {
            None | Some(Value::Null) => Some(Utc::now()),
            Some(v) => parse_datetime(v),
        }
    }
}

impl ConditionHandler for DateCondition {
    fn identifier(&self) -> &str {
        "date"
    }

    fn name(&self) -> &str {
        "Date Condition"
    }

    fn operators(&self) -> Vec<&'static str> {
        DATE_OPERATORS.to_vec()
    }

    fn evaluate(&self, ctx: &WorkflowContext, config: &Value) -> Result<bool, ConditionError> {
        let operator = config_str(config, "operator").unwrap_or("equals");
        if !DATE_OPERATORS.contains(&operator) {
            return Err(ConditionError::UnknownOperator(operator.to_string()));
        }

        let Some(date) = config_str(config, "field")
            .and_then(|field| ctx.get(field))
            .and_then(parse_datetime)
        else {
            return Ok(false);
        };

        let value = config.get("value");
        let now = Utc::now();
        let same_day = |a: DateTime<Utc>, b: DateTime<Utc>| a.date_naive() == b.date_naive();
        let with_other = |f: &dyn Fn(DateTime<Utc>) -> bool| Self::compare_to(value).is_some_and(f);
        let day_offset = |sign: i64| match value.filter(|v| super::value::is_numeric(v)) {
            Some(days) => same_day(date, now + Duration::days(sign * to_integer(days))),
            None => false,
        };

        let result = match operator {
            "equals" => with_other(&|other| same_day(date, other)),
            "before" => with_other(&|other| date < other),
            "after" => with_other(&|other| date > other),
            "on_or_before" => with_other(&|other| date <= other),
            "on_or_after" => with_other(&|other| date >= other),
            "between" => match value.and_then(Value::as_array).filter(|r| r.len() == 2) {
                Some(range) => match (parse_datetime(&range[0]), parse_datetime(&range[1])) {
                    (Some(start), Some(end)) => date >= start && date <= end,
                    _ => false,
                },
                None => false,
            },
            "days_ago" => day_offset(-1),
            "days_from_now" => day_offset(1),
            "is_today" => same_day(date, now),
            "is_past" => date < now,
            "is_future" => date > now,
            "same_week" => with_other(&|other| date.iso_week() == other.iso_week()),
            "same_month" => {
                with_other(&|other| date.year() == other.year() && date.month() == other.month())
            }
            "same_year" => with_other(&|other| date.year() == other.year()),
            _ => false,
        };
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Custom
// ---------------------------------------------------------------------------

/// Signature of an application-supplied condition.
pub type ConditionFn = dyn Fn(&WorkflowContext, &Value) -> bool + Send + Sync;

/// Named closures available to `custom` conditions, populated at wiring time.
#[derive(Clone, Default)]
pub struct CustomConditionRegistry {
    handlers: HashMap<String, Arc<ConditionFn>>,
}

impl CustomConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&WorkflowContext, &Value) -> bool + Send + Sync + 'static,
    ) {
        self.handlers.insert(name.into(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ConditionFn>> {
        self.handlers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for CustomConditionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomConditionRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

/// Dispatches to a registered closure named by the `handler` setting.
#[derive(Debug, Clone, Default)]
pub struct CustomCondition {
    registry: CustomConditionRegistry,
}

impl CustomCondition {
    pub fn new(registry: CustomConditionRegistry) -> Self {
        Self { registry }
    }
}

impl ConditionHandler for CustomCondition {
    fn identifier(&self) -> &str {
        "custom"
    }

    fn name(&self) -> &str {
        "Custom Condition"
    }

    fn operators(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn evaluate(&self, ctx: &WorkflowContext, config: &Value) -> Result<bool, ConditionError> {
        let name = config_str(config, "handler").ok_or_else(|| {
            ConditionError::InvalidConfig("custom condition needs a 'handler'".into())
        })?;
        let handler = self.registry.get(name).ok_or_else(|| {
            ConditionError::InvalidConfig(format!("no custom condition named '{name}'"))
        })?;
        Ok(handler(ctx, config))
    }
}

/// Register `field`, `date` and `custom` (backed by `custom_conditions`).
pub fn register_builtins(
    evaluator: &mut ConditionEvaluator,
    custom_conditions: CustomConditionRegistry,
) {
    evaluator.register(FieldCondition);
    evaluator.register(DateCondition);
    evaluator.register(CustomCondition::new(custom_conditions));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
