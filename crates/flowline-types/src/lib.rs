//! Shared domain types for Flowline.
//!
//! This crate contains the types exchanged between the engine, its storage
//! and queue adapters, and the CLI: workflow definitions, action results and
//! routing signals, execution records, lifecycle events, configuration, and
//! the error types used by the port traits.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod action;
pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod workflow;
