//! Business logic services (use cases).
//!
//! Services orchestrate the engine, template catalog, and store. They depend
//! on traits (ports) -- never on concrete infrastructure implementations.

pub mod workflow;

pub use workflow::WorkflowService;
