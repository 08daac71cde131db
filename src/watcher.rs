//! Directory watching.
//!
//! A [`DirectoryWatcher`] observes the two directories of one profile
//! (non-recursively) and turns bursts of create/remove events on script files
//! into a single [`RescanTrigger`]. The watcher never touches the
//! directories itself; it only tells the owner that a rescan is due.
//!
//! # Lifecycle
//!
//! `Stopped → Starting → Watching → Stopped`. Starting tolerates missing
//! directories: whatever exists is watched, the rest is remembered and can be
//! armed later with [`DirectoryWatcher::rearm`] once it has been created.
//!
//! # Debouncing
//!
//! The first relevant event opens a window of `debounce`; every further
//! relevant event restarts it. When the window closes quietly one trigger is
//! sent.

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::profiles::{ProfileConfig, ProfileKind, same_dir};
use crate::scripts::is_script;

/// Quiet period after the last event before a rescan is requested
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// How long [`DirectoryWatcher::stop`] waits for the watcher thread
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(2);

/// Why a rescan was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanReason {
    Startup,
    Toggle,
    FsEvent,
    ProfileSwitch,
    FolderReselected,
}

/// "Directory contents may have changed; recompute state"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescanTrigger {
    pub profile: ProfileKind,
    pub reason: RescanReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchState {
    #[default]
    Stopped,
    Starting,
    Watching,
}

#[derive(Debug, Default)]
struct WatchStatus {
    state: WatchState,
    watched: Vec<PathBuf>,
    missing: Vec<PathBuf>,
}

enum Control {
    Fs(notify::Result<Event>),
    Rearm,
    Shutdown,
}

/// Background watcher bound to one profile's directories
pub struct DirectoryWatcher {
    profile: ProfileKind,
    control: mpsc::Sender<Control>,
    status: Arc<Mutex<WatchStatus>>,
    done: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl DirectoryWatcher {
    /// Start watching `config`'s directories, sending triggers to `triggers`.
    ///
    /// Directories that do not exist (or cannot be watched) are skipped with a
    /// warning and reported by [`DirectoryWatcher::missing_dirs`].
    ///
    /// # Errors
    ///
    /// - [`EngineError::WatchUnavailable`] if no notification backend could
    ///   be created at all.
    pub fn start(
        config: &ProfileConfig,
        triggers: mpsc::Sender<RescanTrigger>,
        debounce: Duration,
    ) -> Result<Self> {
        let profile = config.kind();
        let status = Arc::new(Mutex::new(WatchStatus {
            state: WatchState::Starting,
            ..WatchStatus::default()
        }));

        let (control_tx, control_rx) = mpsc::channel();
        let fs_tx = control_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = fs_tx.send(Control::Fs(res));
        })
        .map_err(|source| EngineError::WatchUnavailable {
            path: config.active_dir().to_path_buf(),
            source,
        })?;

        {
            let mut status = lock(&status);
            for dir in config.dirs() {
                match arm(&mut watcher, dir) {
                    Ok(()) => status.watched.push(dir.to_path_buf()),
                    Err(e) => {
                        warn!(profile = %profile, "{e}; watching the remaining directories");
                        status.missing.push(dir.to_path_buf());
                    }
                }
            }
            status.state = WatchState::Watching;
        }

        let (done_tx, done_rx) = mpsc::channel();
        let worker = Worker {
            profile,
            dirs: config.dirs().map(Path::to_path_buf).to_vec(),
            watcher,
            control: control_rx,
            triggers,
            debounce,
            status: Arc::clone(&status),
        };
        let handle = thread::Builder::new()
            .name(format!("watch-{}", profile.display_name().to_lowercase()))
            .spawn(move || {
                worker.run();
                let _ = done_tx.send(());
            })
            .map_err(|e| EngineError::io("spawn watcher for", config.active_dir(), e))?;

        info!(profile = %profile, "directory watcher started");

        Ok(Self {
            profile,
            control: control_tx,
            status,
            done: done_rx,
            handle: Some(handle),
        })
    }

    pub fn profile(&self) -> ProfileKind {
        self.profile
    }

    pub fn state(&self) -> WatchState {
        lock(&self.status).state
    }

    /// Directories currently under watch
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        lock(&self.status).watched.clone()
    }

    /// Directories that could not be watched yet
    pub fn missing_dirs(&self) -> Vec<PathBuf> {
        lock(&self.status).missing.clone()
    }

    /// Whether any missing directory has since appeared on disk
    pub fn needs_rearm(&self) -> bool {
        lock(&self.status).missing.iter().any(|d| d.is_dir())
    }

    /// Ask the watcher thread to retry missing directories
    pub fn rearm(&self) {
        let _ = self.control.send(Control::Rearm);
    }

    /// Stop watching and wait (bounded) for the handles to be released.
    ///
    /// Returns `false` if the thread did not confirm within [`SHUTDOWN_WAIT`];
    /// it is then detached and will exit on its own.
    pub fn stop(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let _ = self.control.send(Control::Shutdown);
        match self.done.recv_timeout(SHUTDOWN_WAIT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                info!(profile = %self.profile, "directory watcher stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(profile = %self.profile, "watcher did not stop in time, detaching");
                false
            }
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    profile: ProfileKind,
    dirs: Vec<PathBuf>,
    watcher: RecommendedWatcher,
    control: mpsc::Receiver<Control>,
    triggers: mpsc::Sender<RescanTrigger>,
    debounce: Duration,
    status: Arc<Mutex<WatchStatus>>,
}

impl Worker {
    fn run(mut self) {
        let mut deadline: Option<Instant> = None;

        loop {
            let next = match deadline {
                None => self
                    .control
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
                Some(at) => self
                    .control
                    .recv_timeout(at.saturating_duration_since(Instant::now())),
            };

            match next {
                Ok(Control::Fs(Ok(event))) => {
                    if is_relevant(&event, &self.dirs) {
                        debug!(profile = %self.profile, kind = ?event.kind, paths = ?event.paths, "script change");
                        deadline = Some(Instant::now() + self.debounce);
                    }
                }
                Ok(Control::Fs(Err(e))) => {
                    warn!(profile = %self.profile, "watch error: {e}");
                }
                Ok(Control::Rearm) => self.rearm(),
                Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    deadline = None;
                    let trigger = RescanTrigger {
                        profile: self.profile,
                        reason: RescanReason::FsEvent,
                    };
                    if self.triggers.send(trigger).is_err() {
                        debug!(profile = %self.profile, "trigger receiver gone");
                        break;
                    }
                }
            }
        }

        let mut status = lock(&self.status);
        for dir in status.watched.drain(..) {
            let _ = self.watcher.unwatch(&dir);
        }
        status.missing.clear();
        status.state = WatchState::Stopped;
    }

    fn rearm(&mut self) {
        let mut status = lock(&self.status);
        let pending = std::mem::take(&mut status.missing);
        for dir in pending {
            match arm(&mut self.watcher, &dir) {
                Ok(()) => {
                    info!(profile = %self.profile, dir = %dir.display(), "now watching");
                    status.watched.push(dir);
                }
                Err(e) => {
                    debug!(profile = %self.profile, "{e}");
                    status.missing.push(dir);
                }
            }
        }
    }
}

fn arm(watcher: &mut RecommendedWatcher, dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(EngineError::WatchUnavailable {
            path: dir.to_path_buf(),
            source: notify::Error::path_not_found().add_path(dir.to_path_buf()),
        });
    }
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|source| EngineError::WatchUnavailable {
            path: dir.to_path_buf(),
            source,
        })
}

/// Create/remove (or rename) of a script file directly inside a watched dir
fn is_relevant(event: &Event, dirs: &[PathBuf]) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    kind_matches
        && event.paths.iter().any(|path| {
            let is_script_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_script);
            let in_watched_dir = path
                .parent()
                .is_some_and(|parent| dirs.iter().any(|d| parent == d || same_dir(parent, d)));
            is_script_file && in_watched_dir
        })
}

fn lock(status: &Mutex<WatchStatus>) -> MutexGuard<'_, WatchStatus> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
