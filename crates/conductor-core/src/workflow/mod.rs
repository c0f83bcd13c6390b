//! Workflow engine core: definitions, DAG planning, nodes, and execution.
//!
//! - `definition` -- step-id assignment, validation, YAML/JSON definition files
//! - `dag` -- DAG builder, cycle detection, parallel wave computation
//! - `placeholder` -- `{{ name }}` substitution for templates and step references
//! - `node` / `registry` -- node handler trait and name-indexed registry
//! - `collaborators` -- chat and project-scanner ports used by built-in nodes
//! - `nodes` -- the built-in node handlers
//! - `retry` -- per-step retry policy
//! - `engine` -- ready-set scheduler with write-through persistence
//! - `templates` -- built-in template catalog

pub mod collaborators;
pub mod dag;
pub mod definition;
pub mod engine;
pub mod node;
pub mod nodes;
pub mod placeholder;
pub mod registry;
pub mod retry;
pub mod templates;

pub use definition::{DefinitionError, WorkflowError};
pub use engine::{EngineConfig, RunReservation, WorkflowEngine};
pub use registry::NodeRegistry;
pub use templates::TemplateCatalog;
