//! Tokio channel work queue and its worker.

pub mod channel;
pub mod worker;

pub use channel::{ChannelWorkQueue, DEFAULT_CAPACITY, QueuedUnit};
pub use worker::QueueWorker;
