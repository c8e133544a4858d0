//! Infrastructure layer for Flowline.
//!
//! Contains implementations of the port traits defined in `flowline-core`:
//! a DashMap-backed in-memory repository and a tokio channel work queue with
//! delayed delivery, withdrawal, and a worker that feeds the engine. Also
//! loads `flowline.toml`.

pub mod config;
pub mod memory;
pub mod queue;
