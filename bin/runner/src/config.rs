//! Runner configuration.
//!
//! Loaded via the `config` crate from environment variables prefixed with
//! `CANVASFLOW`, nested keys separated by `__`, e.g.
//! `CANVASFLOW__ENGINE__BASE_URL`.

use canvasflow_workflow::{EngineConfig, OrchestratorSettings};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Remote engine connection.
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub replay: ReplayConfig,

    /// Directory holding saved properties and execution history.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Name of the remote workflow created for manual runs.
    #[serde(default = "default_workflow_name")]
    pub workflow_name: String,
}

/// Replay pacing.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayConfig {
    /// Pause between a node's running and final state, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".canvasflow")
}

fn default_workflow_name() -> String {
    "Current Workflow".to_string()
}

fn default_delay_ms() -> u64 {
    200
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            replay: ReplayConfig::default(),
            store_dir: default_store_dir(),
            workflow_name: default_workflow_name(),
        }
    }
}

impl RunnerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("CANVASFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Orchestrator settings derived from this configuration.
    #[must_use]
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            workflow_name: self.workflow_name.clone(),
            request_timeout_secs: self.engine.timeout_secs,
            ..OrchestratorSettings::default()
        }
    }
}
