//! Engine configuration
//!
//! Resolution order, later sources win:
//! 1. built-in defaults
//! 2. `livecode.toml` in the working directory, or an explicit file
//! 3. `LIVECODE_*` environment variables (`__` separates nested keys,
//!    e.g. `LIVECODE_SCRIPT__MAX_STEPS`)
//!
//! A `.env` file is loaded into the process environment first.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineResult;

const DEFAULT_FILE: &str = "livecode";
const ENV_PREFIX: &str = "LIVECODE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Source identity used when a request does not name one
    pub default_source_id: String,
    /// Tracing filter used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Also append fault diagnostics to the standard output buffer
    pub merge_output_streams: bool,
    /// Collaborators request execution after every clean check
    pub auto_execute: bool,
    /// Debounce between an edit and the check it triggers
    pub check_delay_ms: u64,
    pub script: ScriptConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_source_id: "<unknown>".to_string(),
            log_filter: "info".to_string(),
            merge_output_streams: true,
            auto_execute: true,
            check_delay_ms: 1000,
            script: ScriptConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Evaluation steps one statement may take before it is aborted
    pub max_steps: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            max_steps: 10_000_000,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load from the default locations
    pub fn load() -> EngineResult<Self> {
        Self::builder().build()
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> EngineResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

pub struct EngineConfigBuilder {
    config_path: Option<PathBuf>,
    use_env: bool,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self {
            config_path: None,
            use_env: true,
        }
    }
}

impl EngineConfigBuilder {
    /// Explicit config file; it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Skip `.env` and `LIVECODE_*` variables
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn build(self) -> EngineResult<EngineConfig> {
        let mut builder = config::Config::builder();

        builder = match &self.config_path {
            Some(path) => builder.add_source(config::File::from(path.as_path()).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_FILE).required(false)),
        };

        if self.use_env {
            // A missing .env file is fine
            if let Ok(path) = dotenvy::dotenv() {
                debug!(path = %path.display(), "loaded .env");
            }
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }
}
