//! Workflow engine core: context, interpolation, conditions, actions, and the
//! control-flow router.
//!
//! - `context` -- Execution context with dot-path access and loop counters
//! - `value` -- Loose comparisons and coercions shared by operators and filters
//! - `interpolate` / `filters` -- `{{ path | filter }}` template resolution
//! - `operator` / `condition` / `conditions` -- Gating predicates
//! - `action` / `executor` / `actions` -- Action registry, dispatch, built-ins
//! - `trigger` -- Trigger handlers and workflow matching
//! - `engine` -- Lifecycle state machine and router
//! - `definition` / `builder` -- YAML/JSON loading, validation, fluent builder

pub mod action;
pub mod actions;
pub mod builder;
pub mod condition;
pub mod conditions;
pub mod context;
pub mod definition;
pub mod engine;
pub mod executor;
pub mod filters;
pub mod interpolate;
pub mod operator;
pub mod trigger;
pub mod value;

pub use builder::WorkflowBuilder;
pub use context::WorkflowContext;
pub use engine::{EngineError, ExecutionResult, Processed, StepResult, TriggerOutcome, WorkflowEngine};
