//! Work queue trait definition.
//!
//! The engine hands whole runs, delayed nodes, and fan-out branches to a
//! queue. Retry, backoff and timeout policy belong to the queue worker.

use std::time::Duration;

use flowline_types::error::QueueError;
use flowline_types::execution::WorkUnit;
use uuid::Uuid;

/// Queue collaborator used for asynchronous runs, delays, and fan-out.
pub trait WorkQueue: Send + Sync {
    /// Enqueue a unit on the named queue, optionally not before `delay`.
    ///
    /// Returns an identifier that can later be passed to `withdraw`.
    fn enqueue(
        &self,
        unit: WorkUnit,
        queue: &str,
        delay: Option<Duration>,
    ) -> impl std::future::Future<Output = Result<Uuid, QueueError>> + Send;

    /// Withdraw a unit that has not started yet. Returns `true` if it was
    /// still pending.
    fn withdraw(
        &self,
        unit_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, QueueError>> + Send;
}
