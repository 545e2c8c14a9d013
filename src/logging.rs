//! Logging
//!
//! Structured logging on top of `tracing`. The level, format and destination come from
//! `LoggingConfig`, with `FMU_SYNC_LOG*` environment variables taking precedence.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const ENV_FILTER: &str = "FMU_SYNC_LOG";
pub const ENV_FORMAT: &str = "FMU_SYNC_LOG_FORMAT";
pub const ENV_OUTPUT: &str = "FMU_SYNC_LOG_OUTPUT";
pub const ENV_FILE: &str = "FMU_SYNC_LOG_FILE";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ApiError::ConfigError(format!(
                "Invalid log format: {} (must be 'json' or 'text')",
                other
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether logging is enabled (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Output destination: stdout, stderr, file, file+stderr
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path when output includes file; None means the platform state directory
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Colored output (text format on a terminal stream only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Per-target levels, e.g. `fmu_sync::watch = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_log_level(),
            format: LogFormat::default(),
            output: default_output(),
            file: None,
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

/// Log file path: `FMU_SYNC_LOG_FILE`, then the configured file, then the default.
pub fn resolve_log_file_path(config_file: Option<PathBuf>) -> Result<PathBuf, ApiError> {
    if let Ok(env_path) = std::env::var(ENV_FILE) {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }
    match config_file {
        Some(p) if !p.as_os_str().is_empty() => Ok(p),
        _ => default_log_file_path(),
    }
}

fn default_log_file_path() -> Result<PathBuf, ApiError> {
    let dirs = directories::ProjectDirs::from("", "fmu-sync", "fmu-sync").ok_or_else(|| {
        ApiError::ConfigError("Could not determine platform directories for log file".to_string())
    })?;
    // macOS and Windows have no state dir
    let base = dirs.state_dir().unwrap_or_else(|| dirs.data_local_dir());
    Ok(base.join("fmu-sync.log"))
}

/// Install the global subscriber.
///
/// Precedence, highest first: environment variables, `config`, defaults.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);

    if !config.enabled {
        return Registry::default()
            .with(EnvFilter::new("off"))
            .try_init()
            .map_err(|e| ApiError::ConfigError(format!("Failed to install logger: {}", e)));
    }

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;
    let ansi = config.color && !output.file && format == LogFormat::Text;
    let writer = build_writer(&output, config)?;

    let registry = Registry::default().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .try_init(),
    };
    installed.map_err(|e| ApiError::ConfigError(format!("Failed to install logger: {}", e)))
}

fn build_writer(output: &OutputDestinations, config: &LoggingConfig) -> Result<BoxMakeWriter, ApiError> {
    if !output.file {
        return Ok(if output.stdout {
            BoxMakeWriter::new(std::io::stdout)
        } else {
            BoxMakeWriter::new(std::io::stderr)
        });
    }

    let log_file = resolve_log_file_path(config.file.clone())?;
    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ApiError::ConfigError(format!("Failed to create log directory: {}", e)))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .map_err(|e| {
            ApiError::ConfigError(format!("Failed to open log file {}: {}", log_file.display(), e))
        })?;
    let file = Mutex::new(file);

    Ok(if output.stderr {
        BoxMakeWriter::new(file.and(std::io::stderr))
    } else {
        BoxMakeWriter::new(file)
    })
}

fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, ApiError> {
    if let Ok(filter) = EnvFilter::try_from_env(ENV_FILTER) {
        return Ok(filter);
    }

    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(&config.level);
    for (module, level) in &config.modules {
        let directive = format!("{}={}", module, level)
            .parse()
            .map_err(|e| ApiError::ConfigError(format!("Invalid log directive: {}", e)))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

fn determine_format(config: &LoggingConfig) -> Result<LogFormat, ApiError> {
    match std::env::var(ENV_FORMAT) {
        Ok(format) => format.parse(),
        Err(_) => Ok(config.format),
    }
}

#[derive(Debug, PartialEq, Eq)]
struct OutputDestinations {
    stdout: bool,
    stderr: bool,
    file: bool,
}

fn determine_output(config: &LoggingConfig) -> Result<OutputDestinations, ApiError> {
    match std::env::var(ENV_OUTPUT) {
        Ok(output) => parse_output_destinations(&output),
        Err(_) => parse_output_destinations(&config.output),
    }
}

fn parse_output_destinations(output: &str) -> Result<OutputDestinations, ApiError> {
    let (stdout, stderr, file) = match output {
        "stdout" => (true, false, false),
        "stderr" => (false, true, false),
        "file" => (false, false, true),
        "file+stderr" => (false, true, true),
        _ => {
            return Err(ApiError::ConfigError(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr', 'file' or 'file+stderr')",
                output
            )))
        }
    };
    Ok(OutputDestinations {
        stdout,
        stderr,
        file,
    })
}
