//! Watch daemon and polling loops.
//!
//! Three independent tokio tasks share nothing but channels:
//!
//! - filesystem: hashes the watched tree and emits `FilesystemChanged`
//! - file changes: runs the detector over every user copy and emits `FileChanges`
//! - changelog: owns the `Changelog`, serves requests and emits `Modified`
//!
//! Each loop notifies only when its value differs from the last one it saw. A
//! failed poll is logged and the loop carries on with the next tick.

use super::events::{EdgeTrigger, WatchConfig, WatchParams};
use super::messages::{handle_request, Notification, Request, Response};
use crate::cache::HashCache;
use crate::changelog::Changelog;
use crate::detector::FileChangeDetector;
use crate::error::ApiError;
use crate::files::validate_username;
use crate::tree::hash_path;
use crate::types::Timestamp;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

type Envelope = (Request, oneshot::Sender<Response>);

/// Notification receivers, one per watcher.
pub struct WatchChannels {
    pub filesystem: mpsc::Receiver<Notification>,
    pub file_changes: mpsc::Receiver<Notification>,
    pub changelog: mpsc::Receiver<Notification>,
}

/// Watch mode daemon
pub struct WatchDaemon {
    config: WatchConfig,
    params: watch::Sender<WatchParams>,
    requests: mpsc::Sender<Envelope>,
    running: Arc<RwLock<bool>>,
    handles: Vec<JoinHandle<()>>,
}

impl WatchDaemon {
    /// Spawn the three watchers on the current tokio runtime.
    pub fn start(config: WatchConfig) -> (Self, WatchChannels) {
        let capacity = config.channel_capacity.max(1);
        let (params_tx, params_rx) = watch::channel(WatchParams::default());
        let (requests_tx, requests_rx) = mpsc::channel(capacity);
        let (fs_tx, fs_rx) = mpsc::channel(capacity);
        let (changes_tx, changes_rx) = mpsc::channel(capacity);
        let (changelog_tx, changelog_rx) = mpsc::channel(capacity);
        let running = Arc::new(RwLock::new(true));
        let cache = Arc::new(HashCache::new(config.hash_cache_ttl()));

        let handles = vec![
            tokio::spawn(filesystem_loop(
                config.clone(),
                params_rx.clone(),
                fs_tx,
                Arc::clone(&running),
            )),
            tokio::spawn(file_change_loop(
                config.clone(),
                params_rx,
                changes_tx,
                cache,
                Arc::clone(&running),
            )),
            tokio::spawn(changelog_loop(
                config.clone(),
                requests_rx,
                changelog_tx,
                Arc::clone(&running),
            )),
        ];

        info!(
            poll_interval_ms = config.poll_interval_ms,
            "Started watchers"
        );

        let daemon = Self {
            config,
            params: params_tx,
            requests: requests_tx,
            running,
            handles,
        };
        let channels = WatchChannels {
            filesystem: fs_rx,
            file_changes: changes_rx,
            changelog: changelog_rx,
        };
        (daemon, channels)
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn params(&self) -> WatchParams {
        self.params.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Send a request and wait for its response.
    ///
    /// `SetUser` is answered here; `SetDirectory` re-targets every watcher once the
    /// changelog accepts the directory; everything else goes to the changelog watcher.
    pub async fn request(&self, request: Request) -> Response {
        match request {
            Request::SetUser { username } => match validate_username(&username) {
                Ok(()) => {
                    self.params.send_modify(|p| p.user = Some(username.clone()));
                    debug!(user = %username, "Watch user set");
                    Response::UserSet { username }
                }
                Err(e) => e.into(),
            },
            request @ Request::SetDirectory { .. } => {
                let response = self.forward(request).await;
                if let Response::DirectorySet { directory } = &response {
                    let directory = directory.clone();
                    self.params.send_modify(|p| p.directory = Some(directory));
                }
                response
            }
            other => self.forward(other).await,
        }
    }

    async fn forward(&self, request: Request) -> Response {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.requests.send((request, reply_tx)).await.is_err() {
            return ApiError::WatcherError("changelog watcher stopped".to_string()).into();
        }
        reply_rx.await.unwrap_or_else(|_| {
            ApiError::WatcherError("changelog watcher dropped the request".to_string()).into()
        })
    }

    /// Stop all timers. In-flight scans are not interrupted; their results are discarded.
    pub async fn stop(&mut self) {
        *self.running.write() = false;
        for handle in self.handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
        info!("Stopped watchers");
    }
}

impl Drop for WatchDaemon {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

fn ticker(config: &WatchConfig) -> Interval {
    let mut ticker = interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn filesystem_loop(
    config: WatchConfig,
    params: watch::Receiver<WatchParams>,
    tx: mpsc::Sender<Notification>,
    running: Arc<RwLock<bool>>,
) {
    let mut ticker = ticker(&config);
    let mut edge = EdgeTrigger::new();
    let mut target: Option<PathBuf> = None;

    loop {
        ticker.tick().await;
        if !*running.read() {
            break;
        }
        let Some(root) = params.borrow().watched_root() else {
            continue;
        };
        if target.as_ref() != Some(&root) {
            edge.reset();
            target = Some(root.clone());
        }

        let mode = config.fs_hash_mode;
        match tokio::task::spawn_blocking(move || hash_path(&root, mode)).await {
            Ok(Ok(hash)) => {
                debug!(hash = %hash, "Filesystem poll");
                if edge.update(hash) && tx.send(Notification::FilesystemChanged { hash }).await.is_err() {
                    debug!("Filesystem notification receiver closed");
                    break;
                }
            }
            Ok(Err(e)) => warn!(error = %e, "Filesystem hash failed"),
            Err(e) => warn!(error = %e, "Filesystem poll task failed"),
        }
    }
}

async fn file_change_loop(
    config: WatchConfig,
    params: watch::Receiver<WatchParams>,
    tx: mpsc::Sender<Notification>,
    cache: Arc<HashCache>,
    running: Arc<RwLock<bool>>,
) {
    let mut ticker = ticker(&config);
    let mut edge = EdgeTrigger::new();
    let mut target: Option<PathBuf> = None;
    let detector = FileChangeDetector::new(config.detect_hash_mode).with_cache(Arc::clone(&cache));

    loop {
        ticker.tick().await;
        if !*running.read() {
            break;
        }
        let Some(directory) = params.borrow().directory.clone() else {
            continue;
        };
        if target.as_ref() != Some(&directory) {
            edge.reset();
            cache.clear();
            target = Some(directory.clone());
        }

        let evicted = cache.evict_expired();
        if evicted > 0 {
            debug!(evicted, "Evicted expired hash cache entries");
        }

        let detector = detector.clone();
        match tokio::task::spawn_blocking(move || detector.detect_all_users(&directory)).await {
            Ok(Ok(file_changes)) => {
                debug!(changes = file_changes.len(), "File change poll");
                if edge.update(file_changes.clone())
                    && tx
                        .send(Notification::FileChanges { file_changes })
                        .await
                        .is_err()
                {
                    debug!("File change notification receiver closed");
                    break;
                }
            }
            Ok(Err(e)) => warn!(error = %e, "File change detection failed"),
            Err(e) => warn!(error = %e, "File change poll task failed"),
        }
    }
}

/// What the changelog watcher compares between polls.
type ChangelogState = (Timestamp, usize, usize);

fn changelog_state(changelog: &Changelog) -> Result<ChangelogState, ApiError> {
    let bundles = changelog.get_all_changes()?;
    let commits = bundles.iter().map(|b| b.commits.len()).sum();
    Ok((changelog.modified_timestamp()?, bundles.len(), commits))
}

/// Run `f` against the changelog on the blocking pool.
async fn run_blocking<T, F>(changelog: &Arc<Mutex<Changelog>>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut Changelog) -> T + Send + 'static,
    T: Send + 'static,
{
    let changelog = Arc::clone(changelog);
    tokio::task::spawn_blocking(move || f(&mut *changelog.lock()))
        .await
        .map_err(|e| ApiError::WatcherError(e.to_string()))
}

async fn changelog_loop(
    config: WatchConfig,
    mut requests: mpsc::Receiver<Envelope>,
    tx: mpsc::Sender<Notification>,
    running: Arc<RwLock<bool>>,
) {
    let changelog = Arc::new(Mutex::new(Changelog::new()));
    let mut ticker = ticker(&config);
    let mut edge: EdgeTrigger<ChangelogState> = EdgeTrigger::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !*running.read() {
                    break;
                }
                let polled = run_blocking(&changelog, |changelog| {
                    if !changelog.is_initialized() {
                        return Ok(None);
                    }
                    changelog.refresh()?;
                    changelog_state(changelog).map(Some)
                })
                .await
                .and_then(|state| state);

                match polled {
                    Ok(Some(state)) => {
                        if edge.update(state) && tx.send(Notification::Modified {}).await.is_err() {
                            debug!("Changelog notification receiver closed");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Changelog poll failed"),
                }
            }
            envelope = requests.recv() => {
                let Some((request, reply)) = envelope else {
                    debug!("Changelog request channel closed");
                    break;
                };
                if matches!(request, Request::SetDirectory { .. }) {
                    edge.reset();
                }
                let response = run_blocking(&changelog, move |changelog| {
                    handle_request(changelog, request)
                })
                .await
                .unwrap_or_else(Response::from);
                let _ = reply.send(response);
            }
        }
    }
}
