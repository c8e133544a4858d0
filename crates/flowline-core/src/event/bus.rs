//! Lifecycle notifications for workflow runs.
//!
//! The engine publishes a `WorkflowEvent` at each run transition (started,
//! action executed or failed, suspended, resumed, and the terminal
//! completed/failed/skipped) and for every trace entry appended by delayed
//! nodes and fork branches. Listeners such as the CLI or a test subscribe and
//! filter by execution id.
//!
//! Delivery is best effort: a run never waits on its listeners, and a
//! listener that falls more than the channel capacity behind sees
//! `RecvError::Lagged` and skips ahead.

use flowline_types::event::WorkflowEvent;
use tokio::sync::broadcast;

/// Capacity used when the engine builds its own bus.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out channel for run lifecycle events. Clones publish into the same
/// channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event published from now on. Earlier events are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Notify current listeners. With none attached the event is dropped and
    /// the run carries on.
    pub fn publish(&self, event: WorkflowEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("workflow event published with no listeners");
        }
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
