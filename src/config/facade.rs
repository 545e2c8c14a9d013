//! ConfigLoader facade delegating to the merge service.

use super::merge::MergeService;
use super::FmuConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the shared directory at `root`.
    pub fn load(root: &Path) -> Result<FmuConfig, ConfigError> {
        MergeService::load(root)
    }

    /// Load configuration from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<FmuConfig, ConfigError> {
        MergeService::load_from_file(path)
    }

    pub fn default() -> FmuConfig {
        FmuConfig::default()
    }
}
