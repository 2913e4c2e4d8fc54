//! Configuration management for the QA harness.
//!
//! Settings are read once at process start and never mutated afterwards.
//! Sources, lowest priority first:
//! 1. Default values (hardcoded)
//! 2. `config/qa.toml` in the working directory, if present
//! 3. Explicit config file passed by the caller
//! 4. File named by `CONFIG_PATH`
//! 5. Environment variables prefixed `QA__` (highest priority)

mod cluster;
mod retry;
mod workload;
pub use cluster::*;
pub use retry::*;
pub use workload::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Cluster under test
    #[serde(default)]
    pub cluster: ClusterSpec,
    /// Sysbench sizing and credentials
    #[serde(default)]
    pub workload: WorkloadConfig,
    /// Secondary tool paths
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Readiness polling bounds
    #[serde(default)]
    pub readiness: ReadinessPolicy,
    /// Fixed settle delays
    #[serde(default)]
    pub settle: SettleConfig,
}

impl Settings {
    /// Load settings from every source in priority order.
    ///
    /// # Arguments
    /// * `config_path` - Optional explicit settings file (required if given)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder().add_source(File::with_name("config/qa").required(false));

        if let Some(path) = config_path {
            config = config.add_source(File::with_name(path).required(true));
        }

        if let Ok(path) = env::var("CONFIG_PATH") {
            config = config.add_source(File::with_name(&path).required(true));
        }

        config = config.add_source(
            Environment::with_prefix("QA")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply the command line switches on top of the loaded settings
    pub fn with_flags(
        mut self,
        encryption: bool,
        debug: bool,
    ) -> Self {
        self.cluster.encryption = encryption;
        self.cluster.debug = debug;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.cluster.validate()?;

        if self.readiness.max_attempts == 0 {
            return Err(Error::InvalidConfig("readiness.max_attempts must be positive".into()));
        }
        if self.workload.table_count == 0 || self.workload.threads == 0 {
            return Err(Error::InvalidConfig(
                "workload.table_count and workload.threads must be positive".into(),
            ));
        }

        Ok(())
    }
}
