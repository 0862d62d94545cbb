//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::workflow::parser::DocumentFormat;

/// Engine configuration. Every field has a default, so an empty document is
/// a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of concurrently running steps in Parallel mode
    /// (unset = no limit).
    #[serde(default)]
    pub max_parallel_steps: Option<usize>,

    /// Wrap each agent call in a deadline of the step's `timeout_seconds`.
    #[serde(default = "default_enforce_step_timeouts")]
    pub enforce_step_timeouts: bool,

    /// Directory of the file-backed store (unset = in-memory).
    #[serde(default)]
    pub store_dir: Option<PathBuf>,

    /// Working directory for the shell agent.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Polling interval used while waiting for an execution to finish.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_enforce_step_timeouts() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_steps: None,
            enforce_step_timeouts: default_enforce_step_timeouts(),
            store_dir: None,
            working_dir: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a YAML or JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = match DocumentFormat::from_path(path) {
            DocumentFormat::Json => serde_json::from_str(&content)?,
            DocumentFormat::Yaml => serde_yaml::from_str(&content)?,
        };
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
