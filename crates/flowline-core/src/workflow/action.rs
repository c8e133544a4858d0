//! Action trait and its type-erased wrapper.
//!
//! `Action` uses RPITIT for `execute`, so it cannot be a trait object.
//! `BoxAction` follows the usual blanket-impl pattern:
//! 1. An object-safe `ActionDyn` trait with a boxed future
//! 2. A blanket impl of `ActionDyn` for every `T: Action`
//! 3. `BoxAction` wraps `Box<dyn ActionDyn>` and delegates

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use flowline_types::action::ActionResult;
use serde_json::Value;
use thiserror::Error;

use super::context::WorkflowContext;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("no action registered for type '{0}'")]
    NotFound(String),

    #[error("invalid action config: {0}")]
    InvalidConfig(String),

    #[error("action fault: {0}")]
    Fault(String),
}

// ---------------------------------------------------------------------------
// Action trait
// ---------------------------------------------------------------------------

/// A unit of work a workflow node can invoke by identifier.
///
/// Handlers receive the context read-only. Data flows back to the context
/// through `ActionResult::output`, which the executor merges on success.
pub trait Action: Send + Sync {
    /// Stable identifier used in definitions (e.g. `"set_variable"`).
    fn identifier(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// JSON description of the accepted configuration keys.
    fn config_schema(&self) -> Value {
        Value::Object(Default::default())
    }

    /// Run the action with an already-interpolated config.
    fn execute(
        &self,
        ctx: &WorkflowContext,
        config: &Value,
    ) -> impl Future<Output = Result<ActionResult, ActionError>> + Send;

    fn supports_async(&self) -> bool {
        true
    }

    /// Advisory timeout surfaced to queue workers. Not enforced here.
    fn timeout_secs(&self) -> u64 {
        60
    }

    /// Output keys this action writes, mapped to a short description.
    fn output_keys(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::new()
    }
}

// ---------------------------------------------------------------------------
// Dynamic dispatch
// ---------------------------------------------------------------------------

/// Object-safe version of [`Action`] with a boxed future.
pub trait ActionDyn: Send + Sync {
    fn identifier(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn config_schema(&self) -> Value;

    fn execute_boxed<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
        config: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<ActionResult, ActionError>> + Send + 'a>>;

    fn supports_async(&self) -> bool;

    fn timeout_secs(&self) -> u64;

    fn output_keys(&self) -> BTreeMap<&'static str, &'static str>;
}

impl<T: Action> ActionDyn for T {
    fn identifier(&self) -> &str {
        Action::identifier(self)
    }

    fn name(&self) -> &str {
        Action::name(self)
    }

    fn description(&self) -> &str {
        Action::description(self)
    }

    fn config_schema(&self) -> Value {
        Action::config_schema(self)
    }

    fn execute_boxed<'a>(
        &'a self,
        ctx: &'a WorkflowContext,
        config: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<ActionResult, ActionError>> + Send + 'a>> {
        Box::pin(self.execute(ctx, config))
    }

    fn supports_async(&self) -> bool {
        Action::supports_async(self)
    }

    fn timeout_secs(&self) -> u64 {
        Action::timeout_secs(self)
    }

    fn output_keys(&self) -> BTreeMap<&'static str, &'static str> {
        Action::output_keys(self)
    }
}

/// Type-erased action for the executor registry.
pub struct BoxAction {
    inner: Box<dyn ActionDyn>,
}

impl BoxAction {
    pub fn new<T: Action + 'static>(action: T) -> Self {
        Self {
            inner: Box::new(action),
        }
    }

    pub fn identifier(&self) -> &str {
        self.inner.identifier()
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn description(&self) -> &str {
        self.inner.description()
    }

    pub fn config_schema(&self) -> Value {
        self.inner.config_schema()
    }

    pub async fn execute(
        &self,
        ctx: &WorkflowContext,
        config: &Value,
    ) -> Result<ActionResult, ActionError> {
        self.inner.execute_boxed(ctx, config).await
    }

    pub fn supports_async(&self) -> bool {
        self.inner.supports_async()
    }

    pub fn timeout_secs(&self) -> u64 {
        self.inner.timeout_secs()
    }

    pub fn output_keys(&self) -> BTreeMap<&'static str, &'static str> {
        self.inner.output_keys()
    }
}

impl std::fmt::Debug for BoxAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxAction")
            .field("identifier", &self.identifier())
            .finish()
    }
}

/// Read a required string key from an action config.
pub(crate) fn required_str<'a>(config: &'a Value, key: &str) -> Result<&'a str, ActionError> {
    config
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ActionError::InvalidConfig(format!("missing '{key}'")))
}
