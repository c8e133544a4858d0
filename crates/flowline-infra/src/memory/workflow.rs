//! In-memory workflow repository.
//!
//! Implements `WorkflowRepository` from `flowline-core` on `DashMap`s.
//! Definitions, executions and trace logs live for the lifetime of the
//! process. Terminal executions reject further transitions with
//! `RepositoryError::Conflict`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flowline_core::repository::WorkflowRepository;
use flowline_types::error::RepositoryError;
use flowline_types::execution::{Execution, ExecutionLog, ExecutionStatus, WaitState};
use flowline_types::workflow::Workflow;
use serde_json::Value;
use uuid::Uuid;

/// DashMap-backed implementation of `WorkflowRepository`.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: DashMap<Uuid, Workflow>,
    executions: DashMap<Uuid, Execution>,
    logs: DashMap<Uuid, Vec<ExecutionLog>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executions of one workflow, oldest first.
    pub fn executions_for(&self, workflow_id: &Uuid) -> Vec<Execution> {
        let mut found: Vec<Execution> = self
            .executions
            .iter()
            .filter(|e| e.workflow_id == *workflow_id)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|e| e.created_at);
        found
    }

    /// Drop trace entries created before `cutoff`. Returns how many went.
    pub fn prune_logs(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for mut entry in self.logs.iter_mut() {
            let before = entry.len();
            entry.retain(|log| log.created_at >= cutoff);
            removed += before - entry.len();
        }
        self.logs.retain(|_, logs| !logs.is_empty());
        removed
    }

    /// Apply a status transition unless the execution already finished.
    fn transition(
        &self,
        id: &Uuid,
        apply: impl FnOnce(&mut Execution),
    ) -> Result<(), RepositoryError> {
        let mut execution = self.executions.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if execution.status.is_terminal() {
            return Err(RepositoryError::Conflict(format!(
                "execution {id} is already {:?}",
                execution.status
            )));
        }
        apply(execution.value_mut());
        tracing::trace!(execution_id = %id, status = ?execution.status, "execution transition");
        Ok(())
    }
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.get(id).map(|w| w.value().clone()))
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let mut all: Vec<Workflow> = self.workflows.iter().map(|w| w.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn create_execution(&self, execution: &Execution) -> Result<(), RepositoryError> {
        if self.executions.contains_key(&execution.id) {
            return Err(RepositoryError::Conflict(format!(
                "execution {} already exists",
                execution.id
            )));
        }
        self.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<Execution>, RepositoryError> {
        Ok(self.executions.get(id).map(|e| e.value().clone()))
    }

    async fn mark_started(&self, id: &Uuid) -> Result<(), RepositoryError> {
        self.transition(id, |e| {
            e.status = ExecutionStatus::Running;
            e.started_at.get_or_insert_with(Utc::now);
            e.wait = None;
        })
    }

    async fn mark_completed(&self, id: &Uuid, result: Value) -> Result<(), RepositoryError> {
        self.transition(id, |e| {
            e.status = ExecutionStatus::Completed;
            e.completed_at = Some(Utc::now());
            e.result = Some(result);
        })
    }

    async fn mark_failed(
        &self,
        id: &Uuid,
        error: &str,
        result: Option<Value>,
    ) -> Result<(), RepositoryError> {
        self.transition(id, |e| {
            e.status = ExecutionStatus::Failed;
            e.completed_at = Some(Utc::now());
            e.error = Some(error.to_string());
            if result.is_some() {
                e.result = result;
            }
        })
    }

    async fn mark_skipped(&self, id: &Uuid, reason: &str) -> Result<(), RepositoryError> {
        self.transition(id, |e| {
            e.status = ExecutionStatus::Skipped;
            e.completed_at = Some(Utc::now());
            e.error = Some(reason.to_string());
        })
    }

    async fn mark_waiting(&self, id: &Uuid, wait: &WaitState) -> Result<(), RepositoryError> {
        self.transition(id, |e| {
            e.status = ExecutionStatus::Waiting;
            e.wait = Some(wait.clone());
        })
    }

    async fn append_log(&self, log: &ExecutionLog) -> Result<(), RepositoryError> {
        self.logs
            .entry(log.execution_id)
            .or_default()
            .push(log.clone());
        Ok(())
    }

    async fn list_logs(&self, execution_id: &Uuid) -> Result<Vec<ExecutionLog>, RepositoryError> {
        Ok(self
            .logs
            .get(execution_id)
            .map(|logs| logs.value().clone())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
