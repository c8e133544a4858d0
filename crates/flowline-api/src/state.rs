//! Application state wiring the engine to the in-memory infrastructure.
//!
//! The engine is generic over its repository and queue; `AppState` pins it
//! to `InMemoryWorkflowRepository` and `ChannelWorkQueue` and keeps the
//! worker that drains the queue in-process.

use std::sync::Arc;

use flowline_core::workflow::WorkflowEngine;
use flowline_infra::memory::InMemoryWorkflowRepository;
use flowline_infra::queue::{ChannelWorkQueue, DEFAULT_CAPACITY, QueueWorker};
use flowline_types::config::EngineConfig;

use crate::cli::actions::LogAction;

/// Engine pinned to the concrete infra implementations.
pub type Engine = WorkflowEngine<InMemoryWorkflowRepository, ChannelWorkQueue>;

pub struct AppState {
    pub engine: Arc<Engine>,
    pub repo: Arc<InMemoryWorkflowRepository>,
    pub queue: Arc<ChannelWorkQueue>,
    pub worker: QueueWorker<InMemoryWorkflowRepository>,
}

impl AppState {
    pub fn init(config: EngineConfig) -> Self {
        let repo = Arc::new(InMemoryWorkflowRepository::new());
        let (queue, receiver) = ChannelWorkQueue::new(DEFAULT_CAPACITY);
        let queue = Arc::new(queue);

        let mut engine = WorkflowEngine::new(Arc::clone(&repo), Arc::clone(&queue), config);
        engine.executor_mut().register(LogAction);
        let engine = Arc::new(engine);

        let worker = QueueWorker::new(Arc::clone(&engine), Arc::clone(&queue), receiver);
        tracing::debug!(
            actions = engine.executor().actions().len(),
            "application state initialized"
        );

        Self {
            engine,
            repo,
            queue,
            worker,
        }
    }

    /// Run queued work until nothing deliverable remains. Units still
    /// waiting on a delay are left pending.
    pub async fn drain_queue(&mut self) -> usize {
        let mut total = 0;
        loop {
            let handled = self.worker.drain().await;
            if handled == 0 {
                break;
            }
            total += handled;
        }
        if self.queue.pending() > 0 {
            tracing::info!(pending = self.queue.pending(), "delayed units not yet due");
        }
        total
    }
}
