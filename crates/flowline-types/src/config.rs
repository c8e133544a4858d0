//! Engine configuration types for Flowline.
//!
//! `EngineConfig` is the top-level `flowline.toml`. Every field has a default,
//! so an empty file (or no file) yields a working configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level configuration for the workflow engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub actions: ActionsConfig,

    /// Free-form values resolved by `{{ config.* }}` template paths.
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl EngineConfig {
    /// Look up a dot-separated path inside `values`.
    pub fn value(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.values.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

/// Whether `trigger` runs workflows inline or through the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sync,
    Async,
}

/// Queue and retry settings.
///
/// Retry, backoff and timeout are read by queue workers; the engine only
/// surfaces them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub default_mode: ExecutionMode,

    #[serde(default = "default_queue")]
    pub queue: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds between retries.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Seconds a queued unit may run.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Default per-target jump limit for loop fencing.
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,
}

fn default_queue() -> String {
    "workflows".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    60
}

fn default_timeout() -> u64 {
    300
}

fn default_max_loops() -> u32 {
    100
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_mode: ExecutionMode::default(),
            queue: default_queue(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            timeout: default_timeout(),
            max_loops: default_max_loops(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_actions")]
    pub max_actions_per_workflow: usize,
}

fn default_max_actions() -> usize {
    50
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_actions_per_workflow: default_max_actions(),
        }
    }
}

/// Per-action settings for built-in actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionsConfig {
    #[serde(default)]
    pub delay: DelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    /// Longest allowed delay in seconds (30 days).
    #[serde(default = "default_max_delay")]
    pub max_delay: u64,
}

fn default_max_delay() -> u64 {
    86_400 * 30
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            max_delay: default_max_delay(),
        }
    }
}
