//! CLI Tooling
//!
//! Command-line interface over a shared directory. Every command loads the layered
//! configuration, acts on `--root`, and renders either text or JSON.

use super::format::{
    format_changes_text, format_commit_text, format_log_text, format_snapshots_text,
    format_tree_text,
};
use crate::changelog::Changelog;
use crate::commit::{commit_user_changes, CommitRequest};
use crate::config::{ConfigLoader, FmuConfig};
use crate::detector::FileChangeDetector;
use crate::error::ApiError;
use crate::files::{validate_username, FileManager};
use crate::logging::{LogFormat, LoggingConfig};
use crate::tree::{hash_path, scan, HashMode};
use crate::watch::{Notification, Request, Response, WatchDaemon};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// FMU Sync CLI - private working copies and changelogs for shared FMU directories
#[derive(Parser)]
#[command(name = "fmu-sync")]
#[command(about = "Multi-user working copies with change detection and snapshot-backed changelogs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Shared directory
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// User whose private copy to act on (overrides `user` in config)
    #[arg(long)]
    pub user: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the shared directory (or the user copy with --user) into a tree
    Scan,
    /// Print the tree hash
    Hash {
        /// Hash file contents instead of mtime and size
        #[arg(long)]
        contents: bool,
    },
    /// Populate an empty user copy from the shared directory
    Init,
    /// List detected changes
    Changes {
        /// Report changes for every user instead of only --user
        #[arg(long)]
        all: bool,
    },
    /// Publish the user's changes to the shared directory
    Commit {
        #[arg(short, long)]
        message: String,
        /// Only commit these relative paths
        files: Vec<String>,
        /// Overwrite conflicting shared changes
        #[arg(long)]
        force: bool,
    },
    /// Show the changelog, newest first
    Log {
        /// Only commits touching this path
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Freeze the shared directory into a snapshot, or list snapshots
    Snapshot {
        #[arg(long)]
        list: bool,
    },
    /// Run the watchers and print notifications as JSON lines
    Watch {
        /// Poll interval in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,
        /// Stop after this many seconds (default: run until interrupted)
        #[arg(long)]
        duration_secs: Option<u64>,
    },
}

/// Everything a command needs: resolved root, user, and merged config.
pub struct CliContext {
    root: PathBuf,
    user: Option<String>,
    format: OutputFormat,
    config: FmuConfig,
}

impl CliContext {
    pub fn new(cli: &Cli) -> Result<Self, ApiError> {
        let config = match &cli.config {
            Some(path) => ConfigLoader::load_from_file(path).map_err(|e| {
                ApiError::ConfigError(format!(
                    "Failed to load config from {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => ConfigLoader::load(&cli.root)
                .map_err(|e| ApiError::ConfigError(format!("Failed to load config: {}", e)))?,
        };
        let user = cli.user.clone().or_else(|| config.user.clone());
        if let Some(user) = &user {
            validate_username(user)?;
        }
        Ok(Self {
            root: cli.root.clone(),
            user,
            format: cli.format,
            config,
        })
    }

    /// Logging config with command-line overrides applied.
    pub fn logging_config(&self, cli: &Cli) -> Result<LoggingConfig, ApiError> {
        let mut logging = self.config.logging.clone();
        if let Some(level) = &cli.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            logging.format = format.parse::<LogFormat>()?;
        }
        if let Some(output) = &cli.log_output {
            logging.output = output.clone();
        }
        if let Some(file) = &cli.log_file {
            logging.file = Some(file.clone());
        }
        Ok(logging)
    }

    pub fn config(&self) -> &FmuConfig {
        &self.config
    }

    fn user(&self) -> Result<&str, ApiError> {
        self.user.as_deref().ok_or(ApiError::UserNotSet)
    }

    fn changelog(&self) -> Result<Changelog, ApiError> {
        let mut changelog = Changelog::new();
        changelog.set_directory(&self.root)?;
        Ok(changelog)
    }

    fn render<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) -> Result<String, ApiError> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value)
                .map_err(|e| ApiError::StorageError(e.into())),
            OutputFormat::Text => Ok(text(value)),
        }
    }

    /// Run `command` and return what to print.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Scan => {
                let target = match &self.user {
                    Some(user) => crate::tree::path::user_dir(&self.root, user),
                    None => self.root.clone(),
                };
                let tree = scan(&target)?;
                self.render(&tree, format_tree_text)
            }
            Commands::Hash { contents } => {
                let target = match &self.user {
                    Some(user) => crate::tree::path::user_dir(&self.root, user),
                    None => self.root.clone(),
                };
                let mode = HashMode::from_include_contents(*contents);
                let hash = hash_path(&target, mode)?;
                self.render(
                    &json!({ "path": target, "mode": mode, "hash": hash }),
                    |_| hash.to_hex(),
                )
            }
            Commands::Init => {
                let mut files = FileManager::new();
                files.set_current_directory(&self.root)?;
                files.set_user(self.user()?)?;
                let initialized = files.initialize_user_copy()?;
                let baseline = files.sync_state()?.and_then(|s| s.baseline_snapshot);
                self.render(
                    &json!({ "initialized": initialized, "baselineSnapshot": baseline }),
                    |_| {
                        if initialized {
                            format!(
                                "Initialized user copy (baseline {})",
                                baseline.as_deref().unwrap_or("-")
                            )
                        } else {
                            "User copy already populated; nothing to do".to_string()
                        }
                    },
                )
            }
            Commands::Changes { all } => {
                let detector = self.detector();
                let root = crate::tree::path::absolutize(&self.root)?;
                let changes = if *all {
                    detector.detect_all_users(&root)?
                } else {
                    detector.detect_for_user(&root, self.user()?)?
                };
                self.render(&changes, |c| format_changes_text(c))
            }
            Commands::Commit {
                message,
                files,
                force,
            } => {
                let mut changelog = self.changelog()?;
                let request = CommitRequest {
                    user: self.user()?.to_string(),
                    message: message.clone(),
                    files: if files.is_empty() {
                        None
                    } else {
                        Some(files.clone())
                    },
                    force: *force,
                };
                let outcome = commit_user_changes(&mut changelog, &self.detector(), &request)?;
                self.render(&outcome, format_commit_text)
            }
            Commands::Log { file } => {
                let changelog = self.changelog()?;
                let bundles = match file {
                    Some(path) => changelog.get_changes_for_file(path)?,
                    None => changelog.get_all_changes()?,
                };
                self.render(&bundles, |b| format_log_text(b))
            }
            Commands::Snapshot { list } => {
                let mut changelog = self.changelog()?;
                if *list {
                    let snapshots = changelog.snapshots()?;
                    return self.render(&snapshots, |s| format_snapshots_text(s));
                }
                let snapshot = changelog.create_snapshot(self.user()?)?;
                self.render(&snapshot, |s| format!("Created snapshot {}", s.id))
            }
            Commands::Watch {
                poll_ms,
                duration_secs,
            } => {
                let mut watch_config = self.config.watch.clone();
                if let Some(ms) = poll_ms {
                    watch_config.poll_interval_ms = *ms;
                }
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(self.run_watch(watch_config, duration_secs.map(Duration::from_secs)))?;
                Ok("Watchers stopped".to_string())
            }
        }
    }

    fn detector(&self) -> FileChangeDetector {
        FileChangeDetector::new(self.config.watch.detect_hash_mode)
    }

    async fn run_watch(
        &self,
        config: crate::watch::WatchConfig,
        duration: Option<Duration>,
    ) -> Result<(), ApiError> {
        let (mut daemon, mut channels) = WatchDaemon::start(config);

        let directory = crate::tree::path::absolutize(&self.root)?;
        if let Response::Error { error } = daemon.request(Request::SetDirectory { directory }).await {
            daemon.stop().await;
            return Err(ApiError::WatcherError(error));
        }
        if let Some(username) = &self.user {
            daemon
                .request(Request::SetUser {
                    username: username.clone(),
                })
                .await;
        }
        info!(root = %self.root.display(), "Watching");

        let deadline = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            let notification = tokio::select! {
                _ = &mut deadline => break,
                Some(n) = channels.filesystem.recv() => n,
                Some(n) = channels.file_changes.recv() => n,
                Some(n) = channels.changelog.recv() => n,
                else => break,
            };
            print_notification(&notification);
        }

        daemon.stop().await;
        Ok(())
    }
}

fn print_notification(notification: &Notification) {
    match serde_json::to_string(notification) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize notification"),
    }
}
