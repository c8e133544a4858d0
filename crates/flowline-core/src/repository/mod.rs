//! Port trait definitions.
//!
//! These traits define the storage and queue interfaces that the
//! infrastructure layer (flowline-infra) implements. The core crate never
//! depends on any specific storage or queue technology.

pub mod queue;
pub mod workflow;

pub use queue::WorkQueue;
pub use workflow::WorkflowRepository;
