//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow definitions, execution records,
//! and the append-only execution trace.

use flowline_types::error::RepositoryError;
use flowline_types::execution::{Execution, ExecutionLog, WaitState};
use flowline_types::workflow::Workflow;
use serde_json::Value;
use uuid::Uuid;

/// Repository trait for workflow persistence.
///
/// Covers three entity families:
/// - **Definitions:** store and look up parsed workflows.
/// - **Executions:** create a run and apply its lifecycle transitions.
/// - **Logs:** append and list trace entries for a run.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Upsert a workflow definition (insert or replace by ID).
    fn save_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow definition by its UUID.
    fn get_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// List every stored workflow definition.
    fn list_workflows(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Persist a new (pending) execution record.
    fn create_execution(
        &self,
        execution: &Execution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an execution by its UUID.
    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Execution>, RepositoryError>> + Send;

    /// Transition to running and stamp `started_at` if unset.
    fn mark_started(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Transition to completed with the run's result payload.
    fn mark_completed(
        &self,
        id: &Uuid,
        result: Value,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Transition to failed with an error message and optional result payload.
    fn mark_failed(
        &self,
        id: &Uuid,
        error: &str,
        result: Option<Value>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Transition to skipped (gating conditions did not pass).
    fn mark_skipped(
        &self,
        id: &Uuid,
        reason: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Transition to waiting and persist the suspension point.
    fn mark_waiting(
        &self,
        id: &Uuid,
        wait: &WaitState,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Logs
    // -----------------------------------------------------------------------

    /// Append a trace entry.
    fn append_log(
        &self,
        log: &ExecutionLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List trace entries for an execution in append order.
    fn list_logs(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionLog>, RepositoryError>> + Send;
}
