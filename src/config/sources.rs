//! Config sources: global file, workspace file, environment.

use super::{ENV_PREFIX, WORKSPACE_CONFIG_FILE};
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

type Builder = ConfigBuilder<DefaultState>;

/// `<platform config dir>/config.toml`, if the platform has one.
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "fmu-sync", "fmu-sync")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn add_global_file(builder: Builder) -> Result<Builder, ConfigError> {
    Ok(match global_config_path() {
        Some(path) => builder.add_source(File::from(path).format(FileFormat::Toml).required(false)),
        None => builder,
    })
}

pub fn add_workspace_file(builder: Builder, root: &Path) -> Result<Builder, ConfigError> {
    let path = root.join(WORKSPACE_CONFIG_FILE);
    Ok(builder.add_source(File::from(path).format(FileFormat::Toml).required(false)))
}

/// `FMU_SYNC__WATCH__POLL_INTERVAL_MS=500` sets `watch.poll_interval_ms`.
pub fn add_environment(builder: Builder) -> Result<Builder, ConfigError> {
    Ok(builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    ))
}
