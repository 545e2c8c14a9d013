//! MergeService: stacks the sources over the defaults and deserializes to FmuConfig.

use super::sources;
use super::FmuConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File};
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(Config::builder().add_source(Config::try_from(&FmuConfig::default())?))
}

impl MergeService {
    /// Precedence: defaults (lowest) -> global file -> workspace file -> environment (highest).
    pub fn load(root: &Path) -> Result<FmuConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = sources::add_global_file(builder)?;
        let builder = sources::add_workspace_file(builder, root)?;
        let builder = sources::add_environment(builder)?;
        builder.build()?.try_deserialize()
    }

    pub fn load_from_file(path: &Path) -> Result<FmuConfig, ConfigError> {
        let builder = builder_with_defaults()?.add_source(File::from(path).required(true));
        let builder = sources::add_environment(builder)?;
        builder.build()?.try_deserialize()
    }
}
