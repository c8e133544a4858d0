//! Queue worker: drains the channel into `WorkflowEngine::process`.
//!
//! Retry and timeout policy lives here, read from `[execution]` in the
//! engine config. A unit that errors or times out is redelivered after
//! `retry_delay` seconds until `max_retries` attempts have been made.
//! Errors that another attempt cannot fix (inactive or missing workflows,
//! resumes of non-waiting executions) are dropped at once.

use std::sync::Arc;
use std::time::Duration;

use flowline_core::repository::WorkflowRepository;
use flowline_core::workflow::engine::{EngineError, Processed, WorkflowEngine};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::channel::{ChannelWorkQueue, QueuedUnit};

pub struct QueueWorker<R: WorkflowRepository + 'static> {
    engine: Arc<WorkflowEngine<R, ChannelWorkQueue>>,
    queue: Arc<ChannelWorkQueue>,
    receiver: mpsc::Receiver<QueuedUnit>,
    shutdown: CancellationToken,
}

impl<R: WorkflowRepository + 'static> QueueWorker<R> {
    pub fn new(
        engine: Arc<WorkflowEngine<R, ChannelWorkQueue>>,
        queue: Arc<ChannelWorkQueue>,
        receiver: mpsc::Receiver<QueuedUnit>,
    ) -> Self {
        Self {
            engine,
            queue,
            receiver,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Process units until shutdown or until every sender is gone.
    pub async fn run(mut self) {
        tracing::info!("queue worker started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = self.receiver.recv() => match next {
                    Some(queued) => self.handle(queued).await,
                    None => break,
                },
            }
        }
        tracing::info!("queue worker stopped");
    }

    /// Process everything already delivered, then return. Units still
    /// sleeping on a delay are not waited for.
    pub async fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(queued) = self.receiver.try_recv() {
            self.handle(queued).await;
            handled += 1;
        }
        handled
    }

    async fn handle(&self, queued: QueuedUnit) {
        if !self.queue.begin(&queued.id) {
            tracing::debug!(unit_id = %queued.id, "skipping withdrawn unit");
            return;
        }

        let execution = &self.engine.config().execution;
        let kind = queued.unit.kind();
        let outcome = tokio::time::timeout(
            Duration::from_secs(execution.timeout),
            self.engine.process(queued.unit.clone()),
        )
        .await;

        let error = match outcome {
            Ok(Ok(processed)) => {
                match processed {
                    Processed::Run(result) => tracing::debug!(
                        unit_id = %queued.id,
                        execution_id = %result.execution.id,
                        status = ?result.status,
                        "queued run finished"
                    ),
                    Processed::Continuation { execution_id, steps } => tracing::debug!(
                        unit_id = %queued.id,
                        execution_id = %execution_id,
                        kind,
                        steps = steps.len(),
                        "continuation finished"
                    ),
                }
                return;
            }
            Ok(Err(e)) if !is_retryable(&e) => {
                tracing::warn!(unit_id = %queued.id, kind, error = %e, "dropping unit");
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}s", execution.timeout),
        };

        if queued.attempt < execution.max_retries {
            tracing::warn!(
                unit_id = %queued.id,
                kind,
                attempt = queued.attempt,
                error = error.as_str(),
                "unit failed, retrying"
            );
            self.queue
                .redeliver(queued, Duration::from_secs(execution.retry_delay));
        } else {
            tracing::error!(
                unit_id = %queued.id,
                kind,
                attempts = queued.attempt,
                error = error.as_str(),
                "unit failed permanently"
            );
        }
    }
}

fn is_retryable(error: &EngineError) -> bool {
    !matches!(
        error,
        EngineError::Inactive { .. } | EngineError::NotFound(_) | EngineError::NotWaiting(_)
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryWorkflowRepository;
    use flowline_core::repository::WorkQueue;
    use flowline_core::workflow::WorkflowBuilder;
    use flowline_core::workflow::context::WorkflowContext;
    use flowline_types::config::EngineConfig;
    use flowline_types::execution::{ExecutionStatus, LogEntryType, LogStatus, WorkUnit};
    use serde_json::json;
    use uuid::Uuid;

    type Engine = WorkflowEngine<InMemoryWorkflowRepository, ChannelWorkQueue>;

    fn setup(config: EngineConfig) -> (Arc<Engine>, Arc<InMemoryWorkflowRepository>, QueueWorker<InMemoryWorkflowRepository>) {
        let repo = Arc::new(InMemoryWorkflowRepository::new());
        let (queue, rx) = ChannelWorkQueue::new(64);
        let queue = Arc::new(queue);
        let engine = Arc::new(WorkflowEngine::new(Arc::clone(&repo), Arc::clone(&queue), config));
        let worker = QueueWorker::new(Arc::clone(&engine), queue, rx);
        (engine, repo, worker)
    }

    #[tokio::test]
    async fn async_run_executes_through_worker() {
        let (engine, repo, mut worker) = setup(EngineConfig::default());
        let wf = WorkflowBuilder::new("async")
            .action("set_variable", json!({ "name": "done", "value": true }))
            .build();
        repo.save_workflow(&wf).await.unwrap();

        engine.execute_async(&wf, WorkflowContext::new()).await.unwrap();
        assert!(repo.executions_for(&wf.id).is_empty());

        assert_eq!(worker.drain().await, 1);
        let runs = repo.executions_for(&wf.id);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn fork_branches_append_to_the_same_execution() {
        let (engine, repo, mut worker) = setup(EngineConfig::default());
        let wf = WorkflowBuilder::new("fan-out")
            .node("fan", "split", json!({ "branches": ["left", "right"] }))
            .node("left", "set_variable", json!({ "name": "side", "value": "left" }))
            .node("right", "set_variable", json!({ "name": "side", "value": "right" }))
            .build();
        repo.save_workflow(&wf).await.unwrap();

        let result = engine.execute(&wf, WorkflowContext::new()).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(worker.drain().await, 2);

        let logs = repo.list_logs(&result.execution.id).await.unwrap();
        let actions: Vec<&str> = logs
            .iter()
            .filter(|l| l.entry_type == LogEntryType::Action)
            .filter_map(|l| l.node_id.as_deref())
            .collect();
        assert_eq!(actions, ["fan", "left", "right"]);
        let stored = repo.get_execution(&result.execution.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn delayed_node_runs_when_due() {
        let (engine, repo, worker) = setup(EngineConfig::default());
        let wf = WorkflowBuilder::new("later")
            .node("soon", "set_variable", json!({ "name": "a", "value": 1 }))
            .deferred(1)
            .build();
        repo.save_workflow(&wf).await.unwrap();

        let shutdown = worker.shutdown_token();
        let handle = tokio::spawn(worker.run());

        let result = engine.execute(&wf, WorkflowContext::new()).await.unwrap();
        assert_eq!(result.action_results[0].status, LogStatus::Delayed);

        let mut ran = false;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let logs = repo.list_logs(&result.execution.id).await.unwrap();
            if logs.iter().any(|l| l.status == LogStatus::Success && l.entry_type == LogEntryType::Action) {
                ran = true;
                break;
            }
        }
        shutdown.cancel();
        handle.await.unwrap();
        assert!(ran, "delayed node never ran");
    }

    #[tokio::test]
    async fn missing_workflow_is_dropped_without_retry() {
        let mut config = EngineConfig::default();
        config.execution.retry_delay = 0;
        let (_engine, _repo, mut worker) = setup(config);

        let unit = WorkUnit::Run {
            workflow_id: Uuid::now_v7(),
            trigger_type: "manual".into(),
            context: json!({}),
        };
        worker.queue.enqueue(unit, "workflows", None).await.unwrap();
        assert_eq!(worker.drain().await, 1);
        assert_eq!(worker.queue.pending(), 0);
    }

    #[test]
    fn retry_classification() {
        assert!(!is_retryable(&EngineError::NotFound("workflow".into())));
        assert!(!is_retryable(&EngineError::NotWaiting(Uuid::now_v7())));
        assert!(is_retryable(&EngineError::Queue(
            flowline_types::error::QueueError::Closed("workflows".into())
        )));
    }
}
