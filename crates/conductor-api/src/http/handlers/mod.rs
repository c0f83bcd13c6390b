//! HTTP request handlers for the REST API.

pub mod template;
pub mod workflow;
