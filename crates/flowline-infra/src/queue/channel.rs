//! Tokio mpsc work queue with delayed delivery and withdrawal.
//!
//! Every named queue shares one channel; the queue name travels with the
//! unit. Delayed units wait in a spawned sleeper task until their delay
//! elapses. Each pending unit holds a `CancellationToken` so `withdraw` can
//! stop it before a worker picks it up.

use std::time::Duration;

use dashmap::DashMap;
use flowline_core::repository::WorkQueue;
use flowline_types::error::QueueError;
use flowline_types::execution::WorkUnit;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A unit as delivered to the worker.
#[derive(Debug, Clone)]
pub struct QueuedUnit {
    pub id: Uuid,
    pub queue: String,
    pub unit: WorkUnit,
    /// Deliveries so far, including this one.
    pub attempt: u32,
}

/// Channel-backed implementation of `WorkQueue`.
#[derive(Debug)]
pub struct ChannelWorkQueue {
    sender: mpsc::Sender<QueuedUnit>,
    /// Units not yet started (unit_id -> withdrawal token).
    pending: DashMap<Uuid, CancellationToken>,
}

impl ChannelWorkQueue {
    /// Create a queue and the receiver a `QueueWorker` drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueuedUnit>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let queue = Self {
            sender,
            pending: DashMap::new(),
        };
        (queue, receiver)
    }

    /// Number of units enqueued but not yet started.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Claim a delivered unit for execution.
    ///
    /// Returns `false` when the unit was withdrawn after it entered the
    /// channel; the worker must then drop it.
    pub fn begin(&self, unit_id: &Uuid) -> bool {
        self.pending.remove(unit_id).is_some()
    }

    /// Put a unit back on the channel for another attempt after `delay`.
    pub fn redeliver(&self, mut queued: QueuedUnit, delay: Duration) {
        queued.attempt += 1;
        let token = CancellationToken::new();
        self.pending.insert(queued.id, token.clone());
        self.schedule(queued, delay, token);
    }

    fn schedule(&self, queued: QueuedUnit, delay: Duration, token: CancellationToken) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(unit_id = %queued.id, "delayed unit withdrawn");
                }
                _ = tokio::time::sleep(delay) => {
                    let unit_id = queued.id;
                    if sender.send(queued).await.is_err() {
                        tracing::warn!(unit_id = %unit_id, "queue closed before delayed unit was delivered");
                    }
                }
            }
        });
    }
}

impl WorkQueue for ChannelWorkQueue {
    async fn enqueue(
        &self,
        unit: WorkUnit,
        queue: &str,
        delay: Option<Duration>,
    ) -> Result<Uuid, QueueError> {
        if self.sender.is_closed() {
            return Err(QueueError::Closed(queue.to_string()));
        }

        let queued = QueuedUnit {
            id: Uuid::now_v7(),
            queue: queue.to_string(),
            unit,
            attempt: 1,
        };
        let unit_id = queued.id;
        let token = CancellationToken::new();
        self.pending.insert(unit_id, token.clone());

        match delay.filter(|d| !d.is_zero()) {
            Some(delay) => {
                tracing::debug!(unit_id = %unit_id, queue, delay_ms = delay.as_millis() as u64, "unit scheduled");
                self.schedule(queued, delay, token);
            }
            None => {
                if let Err(e) = self.sender.try_send(queued) {
                    self.pending.remove(&unit_id);
                    return Err(match e {
                        mpsc::error::TrySendError::Full(_) => {
                            QueueError::Rejected(format!("queue '{queue}' is full"))
                        }
                        mpsc::error::TrySendError::Closed(_) => QueueError::Closed(queue.to_string()),
                    });
                }
                tracing::debug!(unit_id = %unit_id, queue, "unit enqueued");
            }
        }
        Ok(unit_id)
    }

    async fn withdraw(&self, unit_id: &Uuid) -> Result<bool, QueueError> {
        match self.pending.remove(unit_id) {
            Some((_, token)) => {
                token.cancel();
                tracing::debug!(unit_id = %unit_id, "unit withdrawn");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unit() -> WorkUnit {
        WorkUnit::Run {
            workflow_id: Uuid::now_v7(),
            trigger_type: "manual".into(),
            context: json!({}),
        }
    }

    #[tokio::test]
    async fn immediate_units_arrive_in_order() {
        let (queue, mut rx) = ChannelWorkQueue::new(8);
        let first = queue.enqueue(unit(), "workflows", None).await.unwrap();
        let second = queue.enqueue(unit(), "reports", None).await.unwrap();

        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        assert_eq!((a.id, a.queue.as_str(), a.attempt), (first, "workflows", 1));
        assert_eq!(b.id, second);
        assert_eq!(queue.pending(), 2);
        assert!(queue.begin(&first));
        assert!(!queue.begin(&first));
    }

    #[tokio::test]
    async fn delayed_units_wait() {
        let (queue, mut rx) = ChannelWorkQueue::new(8);
        let id = queue
            .enqueue(unit(), "workflows", Some(Duration::from_millis(50)))
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
        let delivered = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.id, id);
    }

    #[tokio::test]
    async fn withdrawn_delayed_unit_never_arrives() {
        let (queue, mut rx) = ChannelWorkQueue::new(8);
        let id = queue
            .enqueue(unit(), "workflows", Some(Duration::from_millis(30)))
            .await
            .unwrap();

        assert!(queue.withdraw(&id).await.unwrap());
        assert!(!queue.withdraw(&id).await.unwrap());
        let waited = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn withdrawn_immediate_unit_is_not_claimable() {
        let (queue, mut rx) = ChannelWorkQueue::new(8);
        let id = queue.enqueue(unit(), "workflows", None).await.unwrap();
        assert!(queue.withdraw(&id).await.unwrap());

        let delivered = rx.recv().await.unwrap();
        assert!(!queue.begin(&delivered.id));
    }

    #[tokio::test]
    async fn full_and_closed_queues_reject() {
        let (queue, rx) = ChannelWorkQueue::new(1);
        queue.enqueue(unit(), "workflows", None).await.unwrap();
        let err = queue.enqueue(unit(), "workflows", None).await.unwrap_err();
        assert!(matches!(err, QueueError::Rejected(_)));

        drop(rx);
        let err = queue.enqueue(unit(), "workflows", None).await.unwrap_err();
        assert!(matches!(err, QueueError::Closed(_)));
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn redelivery_bumps_attempt() {
        let (queue, mut rx) = ChannelWorkQueue::new(8);
        queue.enqueue(unit(), "workflows", None).await.unwrap();
        let first = rx.recv().await.unwrap();
        assert!(queue.begin(&first.id));

        queue.redeliver(first.clone(), Duration::from_millis(10));
        let again = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.attempt, 2);
        assert!(queue.begin(&again.id));
    }
}
