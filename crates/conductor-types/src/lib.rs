//! Shared domain types for Conductor.
//!
//! This crate contains the core domain types used across the Conductor
//! workflow engine: workflow definitions, run state, checkpoints, templates,
//! events, configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod template;
pub mod workflow;
