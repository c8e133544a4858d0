//! Observability setup for Flowline binaries.

pub mod tracing_setup;
