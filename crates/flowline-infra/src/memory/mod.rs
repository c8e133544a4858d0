//! In-memory storage adapters.

pub mod workflow;

pub use workflow::InMemoryWorkflowRepository;
