//! Built-in actions.
//!
//! Only control flow and context mutation live here. Delivery actions
//! (mail, HTTP, chat, ...) are supplied by the embedding application.

pub mod custom;
pub mod flow;
pub mod timing;
pub mod variable;

pub use custom::{CustomAction, CustomActionRegistry};
pub use flow::{GotoAction, IfElseAction, SplitAction};
pub use timing::{DelayAction, WaitForEventAction};
pub use variable::SetVariableAction;

use flowline_types::config::EngineConfig;

use super::executor::ActionExecutor;

/// Register every built-in action, with `custom` backed by `custom_actions`.
pub fn register_builtins(
    executor: &mut ActionExecutor,
    config: &EngineConfig,
    custom_actions: CustomActionRegistry,
) {
    executor.register(SetVariableAction);
    executor.register(GotoAction);
    executor.register(IfElseAction);
    executor.register(SplitAction);
    executor.register(DelayAction::new(config.actions.delay.max_delay));
    executor.register(WaitForEventAction);
    executor.register(CustomAction::new(custom_actions));
}
