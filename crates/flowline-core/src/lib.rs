//! Workflow engine logic and port trait definitions for Flowline.
//!
//! This crate defines the "ports" (repository and queue traits) that the
//! infrastructure layer implements, plus the engine itself: context,
//! interpolation, condition evaluation, action dispatch, and the control-flow
//! router. It depends only on `flowline-types` -- never on `flowline-infra`
//! or any storage/IO crate.

pub mod event;
pub mod repository;
pub mod workflow;
