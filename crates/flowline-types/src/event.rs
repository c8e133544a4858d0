//! Lifecycle events for the Flowline event bus.
//!
//! `WorkflowEvent` is broadcast at every execution transition and after each
//! action. All variants are Clone + Send + Sync for use with tokio broadcast
//! channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted while a workflow executes.
///
/// Every run emits exactly one `Started` and at most one terminal event
/// (`Completed`, `Failed` or `Skipped`). `Suspended` ends a run's in-memory
/// execution without terminating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Started {
        execution_id: Uuid,
        workflow_id: Uuid,
        workflow_name: String,
        trigger_type: String,
    },

    /// An action finished successfully.
    ActionExecuted {
        execution_id: Uuid,
        action_id: Uuid,
        action_type: String,
        node_id: Option<String>,
        duration_ms: u64,
    },

    /// An action failed or faulted.
    ActionFailed {
        execution_id: Uuid,
        action_id: Uuid,
        action_type: String,
        node_id: Option<String>,
        error: String,
    },

    Completed {
        execution_id: Uuid,
        workflow_id: Uuid,
        duration_ms: u64,
    },

    Failed {
        execution_id: Uuid,
        workflow_id: Uuid,
        error: String,
    },

    /// Gating conditions did not pass.
    Skipped {
        execution_id: Uuid,
        workflow_id: Uuid,
        reason: String,
    },

    /// The run is waiting for an external event.
    Suspended {
        execution_id: Uuid,
        workflow_id: Uuid,
        event: String,
    },

    /// A waiting run was resumed.
    Resumed {
        execution_id: Uuid,
        workflow_id: Uuid,
    },
}

impl WorkflowEvent {
    pub fn execution_id(&self) -> Uuid {
        match self {
            WorkflowEvent::Started { execution_id, .. }
            | WorkflowEvent::ActionExecuted { execution_id, .. }
            | WorkflowEvent::ActionFailed { execution_id, .. }
            | WorkflowEvent::Completed { execution_id, .. }
            | WorkflowEvent::Failed { execution_id, .. }
            | WorkflowEvent::Skipped { execution_id, .. }
            | WorkflowEvent::Suspended { execution_id, .. }
            | WorkflowEvent::Resumed { execution_id, .. } => *execution_id,
        }
    }

    /// Whether this event ends a run (completed, failed or skipped).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::Completed { .. }
                | WorkflowEvent::Failed { .. }
                | WorkflowEvent::Skipped { .. }
        )
    }
}
