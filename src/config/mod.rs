//! Configuration
//!
//! Layered configuration for the CLI and the watch daemon. Sources, lowest first:
//! built-in defaults, the global `config.toml` in the platform config directory, the
//! workspace `.fmu-sync.toml`, then `FMU_SYNC__*` environment variables.

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

use crate::logging::LoggingConfig;
use crate::watch::WatchConfig;
use serde::{Deserialize, Serialize};

/// Workspace config file name, relative to the shared directory.
pub const WORKSPACE_CONFIG_FILE: &str = ".fmu-sync.toml";

/// Environment variable prefix; nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "FMU_SYNC";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FmuConfig {
    /// Default user for commands that act on a private copy
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}
