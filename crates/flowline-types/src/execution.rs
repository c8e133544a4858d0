//! Execution tracking types: run records, trace entries, and queued work units.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::action::WaitDescriptor;
use crate::workflow::{ActionNode, Workflow};

// ---------------------------------------------------------------------------
// Execution status
// ---------------------------------------------------------------------------

/// Lifecycle status of one run.
///
/// `Pending -> Running -> {Skipped | Failed | Completed | Waiting}`. Waiting is
/// a suspension: a resume moves it back to Running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Waiting,
}

impl ExecutionStatus {
    /// Completed, failed and skipped runs are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Skipped
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Waiting => "waiting",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Where a suspended run paused and what it needs to continue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitState {
    /// The action node that returned the suspend signal.
    pub action_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub descriptor: WaitDescriptor,
    /// Context snapshot (data + metadata) taken at suspension.
    pub snapshot: Value,
    pub since: DateTime<Utc>,
}

/// One run instance of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Denormalized for display.
    pub workflow_name: String,
    pub status: ExecutionStatus,
    /// How the run was started ("manual", "event", "webhook", ...).
    pub trigger_type: String,
    /// Context data captured when the run was created.
    pub trigger_data: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<WaitState>,
}

impl Execution {
    /// A new pending execution for `workflow`.
    pub fn new(workflow: &Workflow, trigger_type: impl Into<String>, trigger_data: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            status: ExecutionStatus::Pending,
            trigger_type: trigger_type.into(),
            trigger_data,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            wait: None,
        }
    }

    /// Wall time between start and completion, when both are known.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Execution log
// ---------------------------------------------------------------------------

/// What kind of step a trace entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    Trigger,
    Condition,
    Action,
}

/// Outcome recorded on a trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Failed,
    Skipped,
    Delayed,
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogStatus::Success => "success",
            LogStatus::Failed => "failed",
            LogStatus::Skipped => "skipped",
            LogStatus::Delayed => "delayed",
        };
        write!(f, "{s}")
    }
}

/// Append-only trace entry, one per evaluated step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub entry_type: LogEntryType,
    pub status: LogStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl ExecutionLog {
    pub fn new(execution_id: Uuid, entry_type: LogEntryType, status: LogStatus) -> Self {
        Self {
            id: Uuid::now_v7(),
            execution_id,
            entry_type,
            status,
            action_id: None,
            node_id: None,
            action_type: None,
            input: None,
            output: None,
            error: None,
            duration_ms: 0,
            created_at: Utc::now(),
        }
    }

    /// An action entry pre-filled with the node's identity and raw config.
    pub fn for_action(execution_id: Uuid, node: &ActionNode, status: LogStatus) -> Self {
        Self {
            action_id: Some(node.id),
            node_id: node.node_id.clone(),
            action_type: Some(node.action_type.clone()),
            input: Some(node.config.clone()),
            ..Self::new(execution_id, LogEntryType::Action, status)
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

// ---------------------------------------------------------------------------
// Work units
// ---------------------------------------------------------------------------

/// A unit of work handed to the queue collaborator.
///
/// Context snapshots travel as JSON so units can cross process boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkUnit {
    /// A whole run, enqueued by asynchronous execution.
    Run {
        workflow_id: Uuid,
        trigger_type: String,
        context: Value,
    },
    /// A single delayed node of an existing execution.
    Node {
        execution_id: Uuid,
        workflow_id: Uuid,
        action_id: Uuid,
        context: Value,
    },
    /// A fan-out continuation starting at `node_id`. It ends before any of
    /// `siblings`, the other targets of the same fork.
    Branch {
        execution_id: Uuid,
        workflow_id: Uuid,
        node_id: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        siblings: Vec<String>,
        context: Value,
    },
}

impl WorkUnit {
    pub fn workflow_id(&self) -> Uuid {
        match self {
            WorkUnit::Run { workflow_id, .. }
            | WorkUnit::Node { workflow_id, .. }
            | WorkUnit::Branch { workflow_id, .. } => *workflow_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkUnit::Run { .. } => "run",
            WorkUnit::Node { .. } => "node",
            WorkUnit::Branch { .. } => "branch",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
