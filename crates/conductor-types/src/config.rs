//! Global configuration types for Conductor.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls
//! engine concurrency, timeouts, retry pacing, and the storage backend.

use serde::{Deserialize, Serialize};

/// Which `StateStore` implementation backs persistent runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Json,
}

/// Top-level configuration for the Conductor engine.
///
/// Loaded from `~/.conductor/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Upper bound on steps executing at once across a run.
    #[serde(default = "default_max_concurrent_steps")]
    pub max_concurrent_steps: usize,

    /// Per-step timeout applied when a step does not set its own.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Fixed delay between attempts of a retried step.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub storage: StorageBackend,

    /// Broadcast channel capacity for workflow events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_concurrent_steps() -> usize {
    4
}

fn default_step_timeout_secs() -> u64 {
    300
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_event_capacity() -> usize {
    256
}

impl GlobalConfig {
    /// Clamp values that would stall the engine.
    pub fn normalized(mut self) -> Self {
        self.max_concurrent_steps = self.max_concurrent_steps.max(1);
        self.event_capacity = self.event_capacity.max(1);
        self
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_concurrent_steps: default_max_concurrent_steps(),
            step_timeout_secs: default_step_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
            storage: StorageBackend::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.max_concurrent_steps, 4);
        assert_eq!(config.step_timeout_secs, 300);
        assert_eq!(config.retry_delay_ms, 500);
        assert_eq!(config.storage, StorageBackend::Sqlite);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_concurrent_steps, 4);
        assert_eq!(config.storage, StorageBackend::Sqlite);
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
max_concurrent_steps = 8
step_timeout_secs = 30
retry_delay_ms = 0
storage = "json"
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_concurrent_steps, 8);
        assert_eq!(config.step_timeout_secs, 30);
        assert_eq!(config.retry_delay_ms, 0);
        assert_eq!(config.storage, StorageBackend::Json);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_normalized_clamps_zero_concurrency() {
        let config: GlobalConfig = toml::from_str("max_concurrent_steps = 0").unwrap();
        assert_eq!(config.normalized().max_concurrent_steps, 1);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(toml::from_str::<GlobalConfig>("storage = \"redis\"").is_err());
    }
}
