//! Repository trait definitions (ports) and the in-memory implementation.
//!
//! The infrastructure layer (conductor-infra) implements `StateStore` with
//! SQLite and JSON files. The core crate never depends on any specific
//! storage technology.

pub mod memory;
pub mod state;

pub use memory::InMemoryStateStore;
pub use state::StateStore;
