use thiserror::Error;

/// Errors from repository operations (used by trait definitions in flowline-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the work queue collaborator.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue '{0}' is closed")]
    Closed(String),

    #[error("work unit rejected: {0}")]
    Rejected(String),
}
