//! Business logic and port definitions for Conductor.
//!
//! This crate defines the "ports" (the `StateStore` trait and the
//! collaborator traits used by built-in nodes) that the infrastructure layer
//! implements, plus the workflow engine itself. It depends only on
//! `conductor-types` -- never on `conductor-infra` or any database/IO crate.

pub mod event;
pub mod repository;
pub mod service;
pub mod workflow;
