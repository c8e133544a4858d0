//! Action registry and dispatch.
//!
//! The executor owns the registered actions and the interpolator. Before a
//! handler runs its raw config is interpolated against the current context;
//! after a successful run its output is merged back into the context. That
//! merge is the only way data flows between steps.
//!
//! Handler errors and panics are caught here and turned into failed
//! `ActionResult`s. Callers that want the error instead use
//! [`ActionExecutor::execute_fatal`].

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use flowline_types::action::ActionResult;
use futures_util::FutureExt;
use serde_json::Value;

use super::action::{Action, ActionError, BoxAction};
use super::context::WorkflowContext;
use super::interpolate::Interpolator;

/// Result of one dispatch, with what the engine needs for the trace.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub result: ActionResult,
    /// The interpolated config the handler actually received.
    pub input: Value,
    pub duration_ms: u64,
}

/// Registry of actions keyed by identifier.
#[derive(Debug, Default)]
pub struct ActionExecutor {
    actions: HashMap<String, BoxAction>,
    interpolator: Interpolator,
}

impl ActionExecutor {
    pub fn new(interpolator: Interpolator) -> Self {
        Self {
            actions: HashMap::new(),
            interpolator,
        }
    }

    /// Register an action under its identifier, replacing any previous one.
    pub fn register<A: Action + 'static>(&mut self, action: A) {
        let action = BoxAction::new(action);
        self.actions.insert(action.identifier().to_string(), action);
    }

    pub fn get(&self, identifier: &str) -> Option<&BoxAction> {
        self.actions.get(identifier)
    }

    pub fn has(&self, identifier: &str) -> bool {
        self.actions.contains_key(identifier)
    }

    /// Registered actions sorted by identifier.
    pub fn actions(&self) -> Vec<&BoxAction> {
        let mut all: Vec<&BoxAction> = self.actions.values().collect();
        all.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        all
    }

    pub fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    /// Whether the action may be run from a queue worker. Unknown types
    /// report false.
    pub fn supports_async(&self, identifier: &str) -> bool {
        self.get(identifier).is_some_and(BoxAction::supports_async)
    }

    pub fn timeout_secs(&self, identifier: &str) -> Option<u64> {
        self.get(identifier).map(BoxAction::timeout_secs)
    }

    /// Interpolate, dispatch, and merge. Never fails: unknown actions,
    /// handler errors and panics all come back as failed results.
    pub async fn execute(
        &self,
        identifier: &str,
        raw_config: &Value,
        ctx: &mut WorkflowContext,
    ) -> Dispatch {
        let started = Instant::now();
        let (input, outcome) = match self.prepare(raw_config, ctx) {
            Ok(input) => {
                let outcome = self.run(identifier, &input, ctx).await;
                (input, outcome)
            }
            Err(err) => (raw_config.clone(), Err(err)),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(ActionError::NotFound(id)) => {
                ActionResult::failure(format!("no action registered for type '{id}'"))
            }
            Err(err) => {
                tracing::warn!(action = identifier, error = %err, "action fault");
                ActionResult::fault(format!("action '{identifier}' failed"), err.to_string())
            }
        };

        if result.is_success() {
            ctx.merge(result.output.clone());
        }

        Dispatch {
            result,
            input,
            duration_ms: elapsed_ms(started),
        }
    }

    /// Like [`execute`](Self::execute) but returns handler errors (and
    /// panics, as `ActionError::Fault`) instead of downgrading them.
    pub async fn execute_fatal(
        &self,
        identifier: &str,
        raw_config: &Value,
        ctx: &mut WorkflowContext,
    ) -> Result<ActionResult, ActionError> {
        let input = self.prepare(raw_config, ctx)?;
        let result = self.run(identifier, &input, ctx).await?;
        if result.is_success() {
            ctx.merge(result.output.clone());
        }
        Ok(result)
    }

    /// Interpolate a raw config. A panic while resolving templates is a
    /// fault of this step, like a panic inside the handler.
    fn prepare(&self, raw_config: &Value, ctx: &WorkflowContext) -> Result<Value, ActionError> {
        guarded(|| self.interpolator.interpolate(raw_config, ctx))
    }

    async fn run(
        &self,
        identifier: &str,
        config: &Value,
        ctx: &WorkflowContext,
    ) -> Result<ActionResult, ActionError> {
        let action = self
            .get(identifier)
            .ok_or_else(|| ActionError::NotFound(identifier.to_string()))?;

        match AssertUnwindSafe(action.execute(ctx, config))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(ActionError::Fault(panic_message(panic.as_ref()))),
        }
    }
}

fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, ActionError> {
    std::panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|panic| ActionError::Fault(panic_message(panic.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "action panicked".to_string()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
