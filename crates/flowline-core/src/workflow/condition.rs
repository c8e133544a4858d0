//! Grouped condition evaluation.
//!
//! Conditions are partitioned by `group`. Every group must pass (AND across
//! groups). Inside a group the conditions fold left to right: the first
//! result seeds the accumulator and each later condition combines with it
//! using its own `logic`. This is a left fold, not an expression tree, so
//! `[A, or B, and C]` in one group means `(A or B) and C`.
//!
//! An empty condition set passes. Evaluation errors always propagate.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use flowline_types::workflow::{Condition, Logic};
use serde_json::Value;
use thiserror::Error;

use super::context::WorkflowContext;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("no condition handler registered for type '{0}'")]
    UnknownCondition(String),

    #[error("invalid condition config: {0}")]
    InvalidConfig(String),
}

// ---------------------------------------------------------------------------
// ConditionHandler trait
// ---------------------------------------------------------------------------

/// A condition type that can be referenced by identifier from a definition.
///
/// Evaluation is synchronous: conditions read the context, they do not
/// perform I/O.
pub trait ConditionHandler: Send + Sync {
    fn identifier(&self) -> &str;

    fn name(&self) -> &str;

    /// Operator names this handler understands.
    fn operators(&self) -> Vec<&'static str>;

    fn evaluate(&self, ctx: &WorkflowContext, config: &Value) -> Result<bool, ConditionError>;
}

// ---------------------------------------------------------------------------
// ConditionEvaluator
// ---------------------------------------------------------------------------

/// Registry of condition handlers plus the grouped fold.
#[derive(Clone, Default)]
pub struct ConditionEvaluator {
    handlers: HashMap<String, Arc<dyn ConditionHandler>>,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its identifier, replacing any previous one.
    pub fn register(&mut self, handler: impl ConditionHandler + 'static) {
        self.handlers
            .insert(handler.identifier().to_string(), Arc::new(handler));
    }

    pub fn get(&self, identifier: &str) -> Option<&Arc<dyn ConditionHandler>> {
        self.handlers.get(identifier)
    }

    /// Registered handlers sorted by identifier.
    pub fn handlers(&self) -> Vec<&Arc<dyn ConditionHandler>> {
        let mut all: Vec<_> = self.handlers.values().collect();
        all.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        all
    }

    /// Evaluate a full condition set.
    pub fn evaluate(
        &self,
        conditions: &[Condition],
        ctx: &WorkflowContext,
    ) -> Result<bool, ConditionError> {
        let mut groups: BTreeMap<u32, Vec<&Condition>> = BTreeMap::new();
        for condition in conditions {
            groups.entry(condition.group).or_default().push(condition);
        }

        for (group, mut members) in groups {
            members.sort_by_key(|c| c.order);
            if !self.evaluate_group(&members, ctx)? {
                tracing::debug!(group, "condition group failed");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Left-fold one group using each member's own logic flag.
    pub fn evaluate_group(
        &self,
        conditions: &[&Condition],
        ctx: &WorkflowContext,
    ) -> Result<bool, ConditionError> {
        let mut acc: Option<bool> = None;
        for condition in conditions {
            let result = self.evaluate_single(condition, ctx)?;
            acc = Some(match (acc, condition.logic) {
                (None, _) => result,
                (Some(prev), Logic::Or) => prev || result,
                (Some(prev), Logic::And) => prev && result,
            });
        }
        Ok(acc.unwrap_or(true))
    }

    /// Dispatch one condition to its handler.
    pub fn evaluate_single(
        &self,
        condition: &Condition,
        ctx: &WorkflowContext,
    ) -> Result<bool, ConditionError> {
        let handler = self
            .get(&condition.condition_type)
            .ok_or_else(|| ConditionError::UnknownCondition(condition.condition_type.clone()))?;
        handler.evaluate(ctx, &condition.to_handler_config())
    }
}

impl std::fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.handlers.keys().collect();
        ids.sort();
        f.debug_struct("ConditionEvaluator")
            .field("handlers", &ids)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::conditions::FieldCondition;
    use serde_json::json;

    fn evaluator() -> ConditionEvaluator {
        let mut e = ConditionEvaluator::new();
        e.register(FieldCondition);
        e
    }

    /// A field condition that is true iff the boolean at `key` is true.
    fn flag(key: &str, logic: Logic, group: u32, order: i32) -> Condition {
        let mut c = Condition::field(key, "is_true", Value::Null)
            .with_logic(logic)
            .in_group(group);
        c.order = order;
        c
    }

    #[test]
    fn empty_set_passes() {
        let ctx = WorkflowContext::new();
        assert!(evaluator().evaluate(&[], &ctx).unwrap());
    }

    #[test]
    fn grouped_fold_matches_a_or_b_and_c() {
        let e = evaluator();
        let conditions = vec![
            flag("a", Logic::And, 0, 0),
            flag("b", Logic::Or, 0, 1),
            flag("c", Logic::And, 1, 0),
        ];

        for a in [false, true] {
            for b in [false, true] {
                for c in [false, true] {
                    let ctx = WorkflowContext::from_value(json!({ "a": a, "b": b, "c": c }));
                    let expected = (a || b) && c;
                    assert_eq!(
                        e.evaluate(&conditions, &ctx).unwrap(),
                        expected,
                        "a={a} b={b} c={c}"
                    );
                }
            }
        }
    }

    #[test]
    fn within_group_fold_is_left_to_right() {
        // [A, or B, and C] in one group is (A or B) and C, not A or (B and C).
        let e = evaluator();
        let conditions = vec![
            flag("a", Logic::And, 0, 0),
            flag("b", Logic::Or, 0, 1),
            flag("c", Logic::And, 0, 2),
        ];
        let ctx = WorkflowContext::from_value(json!({ "a": true, "b": false, "c": false }));
        assert!(!e.evaluate(&conditions, &ctx).unwrap());
    }

    #[test]
    fn members_are_folded_in_order() {
        let e = evaluator();
        // Declared out of order; sorted by `order`, this is (a and b) or c.
        let conditions = vec![
            flag("c", Logic::Or, 0, 2),
            flag("a", Logic::And, 0, 0),
            flag("b", Logic::And, 0, 1),
        ];
        let ctx = WorkflowContext::from_value(json!({ "a": false, "b": true, "c": true }));
        assert!(e.evaluate(&conditions, &ctx).unwrap());
    }

    #[test]
    fn first_logic_flag_only_seeds() {
        let e = evaluator();
        let conditions = vec![flag("a", Logic::Or, 0, 0)];
        let ctx = WorkflowContext::from_value(json!({ "a": false }));
        assert!(!e.evaluate(&conditions, &ctx).unwrap());
    }

    #[test]
    fn unknown_operator_propagates() {
        let e = evaluator();
        let conditions = vec![Condition::field("amount", "approx", json!(1))];
        let ctx = WorkflowContext::from_value(json!({ "amount": 1 }));
        assert!(matches!(
            e.evaluate(&conditions, &ctx),
            Err(ConditionError::UnknownOperator(_))
        ));
    }

    #[test]
    fn unknown_condition_type_propagates() {
        let e = evaluator();
        let mut condition = Condition::field("x", "equals", json!(1));
        condition.condition_type = "relation".into();
        let ctx = WorkflowContext::new();
        assert!(matches!(
            e.evaluate(&[condition], &ctx),
            Err(ConditionError::UnknownCondition(t)) if t == "relation"
        ));
    }

    #[test]
    fn error_in_later_member_still_propagates() {
        let e = evaluator();
        let conditions = vec![
            flag("a", Logic::And, 0, 0),
            Condition::field("a", "bogus", Value::Null).with_logic(Logic::Or),
        ];
        let ctx = WorkflowContext::from_value(json!({ "a": true }));
        assert!(e.evaluate(&conditions, &ctx).is_err());
    }
}
