//! Infrastructure layer for Conductor.
//!
//! Contains implementations of the traits defined in `conductor-core`:
//! SQLite and JSON-file `StateStore`s, a filesystem project scanner, and the
//! `config.toml` loader.

pub mod config;
pub mod filesystem;
pub mod scanner;
pub mod sqlite;
