//! Engine configuration types for Campflow.
//!
//! `EngineConfig` represents the top-level `config.toml` that controls retry
//! budgets, fan-out width, call timeouts, and the router's route table.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::workflow::{Decision, Phase};

/// Top-level configuration for the Campflow engine.
///
/// Loaded from `~/.campflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Backoff policy for external calls and concurrency-guard conflicts.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Maximum parallel lookups a step may fan out.
    #[serde(default = "default_fan_out_workers")]
    pub fan_out_workers: usize,

    /// Per-call timeout in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Upper bound on steps executed in one run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Use the store's server-side append for shared collections when available.
    #[serde(default = "default_true")]
    pub atomic_append: bool,

    #[serde(default)]
    pub generator: GeneratorSettings,

    #[serde(default)]
    pub publisher: PublisherSettings,

    /// Overrides the built-in router table.
    #[serde(default)]
    pub routes: Option<RouteConfig>,
}

fn default_fan_out_workers() -> usize {
    2
}

fn default_call_timeout_secs() -> u64 {
    120
}

fn default_max_steps() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            fan_out_workers: default_fan_out_workers(),
            call_timeout_secs: default_call_timeout_secs(),
            max_steps: default_max_steps(),
            atomic_append: default_true(),
            generator: GeneratorSettings::default(),
            publisher: PublisherSettings::default(),
            routes: None,
        }
    }
}

impl EngineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// HTTP generator endpoint. The API key is read from the environment, never from this file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorSettings {
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

/// Ads-platform endpoint. Campaign configs are only published when set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublisherSettings {
    pub endpoint: Option<String>,
}

/// Router table: decision labels and, for `continue`, project phases mapped to step names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub decisions: BTreeMap<Decision, String>,
    #[serde(default)]
    pub phases: BTreeMap<Phase, String>,
}
