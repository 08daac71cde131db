//! Profile lifecycle and the rescan loop.
//!
//! [`ProfileManager`] owns everything tied to the selected profile: its
//! resolved [`ProfileConfig`], the [`ActivationEngine`] for toggles, the
//! [`DirectoryWatcher`] and the last derived script entries. Switching
//! profiles tears all of that down and rebuilds it; files on disk are never
//! touched by a switch.
//!
//! Every path that may have changed the directories (startup, toggles,
//! watcher triggers, switches, folder reselection) ends in a rescan, so the
//! entries always come from disk rather than from assumptions.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::activation::{Activation, ActivationEngine, Deactivation};
use crate::activity::ActivityLog;
use crate::error::{EngineError, Result};
use crate::paths::Paths;
use crate::profiles::{
    CURRENT_PROFILE_KEY, ProfileConfig, ProfileKind, library_override, select_profile,
    stored_profile,
};
use crate::scripts::{ScriptEntry, list_scripts, scan};
use crate::settings::{ConfigStore, JsonSettings};
use crate::watcher::{DEFAULT_DEBOUNCE, DirectoryWatcher, RescanReason, RescanTrigger, WatchState};

/// Knobs for a [`ProfileManager`]
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Quiet period before watcher events turn into a rescan
    pub debounce: Duration,
    /// Run a directory watcher for the selected profile
    pub watch: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            watch: true,
        }
    }
}

/// Result of a single toggle request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Activated(Activation),
    Deactivated(Deactivation),
}

/// Owns the selected profile and everything derived from it
pub struct ProfileManager<S: ConfigStore = JsonSettings> {
    paths: Paths,
    store: S,
    options: ManagerOptions,
    engine: ActivationEngine,
    watcher: Option<DirectoryWatcher>,
    entries: Vec<ScriptEntry>,
    triggers_tx: Sender<RescanTrigger>,
    triggers_rx: Receiver<RescanTrigger>,
    activity: ActivityLog,
}

impl<S: ConfigStore> ProfileManager<S> {
    /// Select the stored profile, start watching it and run the first rescan.
    ///
    /// A stored library override that is no longer valid, or that can no
    /// longer be listed, is ignored in favor of the profile's default library
    /// directory. Unreadable directories do not stop startup: the failure is
    /// recorded in the activity log and the entries stay empty.
    pub fn start(paths: Paths, store: S, options: ManagerOptions) -> Result<Self> {
        let kind = stored_profile(&store);
        let mut activity = ActivityLog::default();

        let config = match select_profile(kind, &paths, library_override(&store, kind)) {
            Ok(config) => config,
            Err(e) => {
                warn!(profile = %kind, "{e}; using default library directory");
                activity.error(format!("Ignoring stored {} scripts folder: {}", kind, e));
                select_profile(kind, &paths, None)?
            }
        };

        let overridden = config.library_dir() != kind.default_library_dir(&paths);
        let (triggers_tx, triggers_rx) = mpsc::channel();
        let mut manager = Self {
            paths,
            store,
            options,
            engine: ActivationEngine::new(config.clone()),
            watcher: None,
            entries: Vec::new(),
            triggers_tx,
            triggers_rx,
            activity,
        };

        info!(profile = %kind, "starting");
        if let Err(e) = manager.install(config, RescanReason::Startup) {
            if overridden && list_scripts(manager.config().library_dir()).is_err() {
                warn!(profile = %kind, "{e}; using default library directory");
                manager
                    .activity
                    .error(format!("Ignoring stored {} scripts folder: {}", kind, e));
                let fallback = select_profile(kind, &manager.paths, None)?;
                if let Err(e) = manager.install(fallback, RescanReason::Startup) {
                    warn!(profile = %kind, "starting without a listing: {e}");
                }
            } else {
                warn!(profile = %kind, "starting without a listing: {e}");
            }
        }
        Ok(manager)
    }

    pub fn config(&self) -> &ProfileConfig {
        self.engine.config()
    }

    pub fn current_profile(&self) -> ProfileKind {
        self.config().kind()
    }

    /// Script entries from the latest rescan, sorted by filename
    pub fn entries(&self) -> &[ScriptEntry] {
        &self.entries
    }

    pub fn entry(&self, filename: &str) -> Option<&ScriptEntry> {
        self.entries.iter().find(|e| e.filename() == filename)
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn activity_mut(&mut self) -> &mut ActivityLog {
        &mut self.activity
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn watch_state(&self) -> WatchState {
        self.watcher
            .as_ref()
            .map(DirectoryWatcher::state)
            .unwrap_or(WatchState::Stopped)
    }

    /// Directories of the current profile the watcher could not arm yet
    pub fn unwatched_dirs(&self) -> Vec<PathBuf> {
        match &self.watcher {
            Some(watcher) => watcher.missing_dirs(),
            None if self.options.watch => self
                .config()
                .dirs()
                .iter()
                .map(|d| d.to_path_buf())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Replace the current profile with `config`.
    ///
    /// Stops the old watcher, discards derived state, starts watching the new
    /// directories, rescans, and persists the choice. Persisting is best
    /// effort and never blocks the switch. A directory that cannot be listed
    /// does not block it either; the switch completes with empty entries and
    /// the failure in the activity log.
    pub fn switch_to(&mut self, config: ProfileConfig) -> Result<&[ScriptEntry]> {
        let kind = config.kind();
        if let Err(e) = self.install(config, RescanReason::ProfileSwitch) {
            warn!(profile = %kind, "switched without a listing: {e}");
        }
        self.persist();
        self.activity.info(format!("Switched to {} mode", kind));
        Ok(&self.entries)
    }

    /// Resolve `kind` with its stored library override and switch to it
    pub fn switch_profile(&mut self, kind: ProfileKind) -> Result<&[ScriptEntry]> {
        let config = select_profile(kind, &self.paths, library_override(&self.store, kind))?;
        self.switch_to(config)
    }

    /// Switch to the profile after the current one
    pub fn cycle_profile(&mut self) -> Result<&[ScriptEntry]> {
        self.switch_profile(self.current_profile().next())
    }

    /// Point the current profile at a different library directory.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ConfigInvalid`] if `dir` is the active directory (or
    ///   otherwise unusable).
    /// - [`EngineError::Io`] if `dir` exists but cannot be listed.
    ///
    /// Nothing changes when an error is returned.
    pub fn set_library_dir(&mut self, dir: impl Into<PathBuf>) -> Result<&[ScriptEntry]> {
        let current = self.config().clone();
        let config = ProfileConfig::new(current.kind(), dir, current.active_dir())?
            .with_preserve_orphans(current.preserve_orphans());
        list_scripts(config.library_dir())?;

        let kind = config.kind();
        let shown = config.library_dir().display().to_string();
        if let Err(e) = self.install(config, RescanReason::FolderReselected) {
            warn!(profile = %kind, "library set without a listing: {e}");
        }
        self.persist();
        self.activity
            .info(format!("Set {} scripts folder: {}", kind, shown));
        Ok(&self.entries)
    }

    /// Re-list both directories and replace the entries
    pub fn rescan(&mut self, reason: RescanReason) -> Result<&[ScriptEntry]> {
        let config = self.engine.config();
        debug!(profile = %config.kind(), ?reason, "rescan");

        match scan(config.library_dir(), config.active_dir()) {
            Ok(entries) => self.entries = entries,
            Err(e) => {
                error!(profile = %config.kind(), "rescan failed: {e}");
                self.activity.error(format!("Rescan failed: {}", e));
                return Err(e);
            }
        }

        self.refresh_watcher();
        Ok(&self.entries)
    }

    /// Copy a library script into the active directory
    pub fn activate(&mut self, filename: &str) -> Result<Activation> {
        let result = self.engine.activate(filename);
        let active_dir = self.config().active_dir().display().to_string();
        match &result {
            Ok(Activation::Copied) => {
                self.activity
                    .info(format!("Copied '{}' to {}", filename, active_dir));
            }
            Ok(Activation::AlreadyActive) => {}
            Err(e) => self.record_failure("activate", filename, e),
        }
        self.after_toggle();
        result
    }

    /// Remove a script from the active directory, keeping a library copy
    pub fn deactivate(&mut self, filename: &str) -> Result<Deactivation> {
        let result = self.engine.deactivate(filename);
        let kind = self.current_profile();
        let active_dir = self.config().active_dir().display().to_string();
        match &result {
            Ok(outcome) => {
                if *outcome == Deactivation::RestoredThenRemoved {
                    self.activity
                        .info(format!("Moved '{}' back to {} scripts folder", filename, kind));
                }
                self.activity
                    .info(format!("Removed '{}' from {}", filename, active_dir));
            }
            Err(e) => self.record_failure("deactivate", filename, e),
        }
        self.after_toggle();
        result
    }

    /// Bring `filename` into the requested state
    pub fn set_active(&mut self, filename: &str, active: bool) -> Result<ToggleOutcome> {
        if active {
            self.activate(filename).map(ToggleOutcome::Activated)
        } else {
            self.deactivate(filename).map(ToggleOutcome::Deactivated)
        }
    }

    /// Flip `filename` relative to the latest rescan
    pub fn toggle(&mut self, filename: &str) -> Result<ToggleOutcome> {
        let currently_active = self
            .entry(filename)
            .map(|e| e.classification().is_active())
            .unwrap_or(false);
        self.set_active(filename, !currently_active)
    }

    /// Wait up to `timeout` for a watcher trigger and rescan on it.
    ///
    /// Triggers left over from a previous profile are discarded. Several
    /// queued triggers are handled with one rescan. Returns `None` on timeout.
    pub fn wait_for_trigger(&mut self, timeout: Duration) -> Result<Option<RescanTrigger>> {
        let trigger = match self.triggers_rx.recv_timeout(timeout) {
            Ok(trigger) => trigger,
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            // We hold a sender ourselves, so this cannot happen
            Err(RecvTimeoutError::Disconnected) => return Ok(None),
        };

        let current = self.current_profile();
        let mut latest = (trigger.profile == current).then_some(trigger);
        while let Ok(next) = self.triggers_rx.try_recv() {
            if next.profile == current {
                latest = Some(next);
            }
        }

        match latest {
            Some(trigger) => {
                self.rescan(trigger.reason)?;
                Ok(Some(trigger))
            }
            None => {
                debug!("dropped stale triggers");
                Ok(None)
            }
        }
    }

    /// Stop watching and persist settings
    pub fn shutdown(&mut self) {
        self.stop_watcher();
        self.entries.clear();
        if let Err(e) = self.store.flush() {
            warn!("failed to save settings on shutdown: {e:#}");
        }
        info!(profile = %self.current_profile(), "shut down");
    }

    /// Make `config` current and rescan it. The profile is installed even
    /// when the rescan fails; its error is returned for the caller to report.
    fn install(&mut self, config: ProfileConfig, reason: RescanReason) -> Result<()> {
        self.stop_watcher();
        self.entries.clear();
        // Stale triggers would rescan the wrong directories
        while self.triggers_rx.try_recv().is_ok() {}

        info!(
            profile = %config.kind(),
            library = %config.library_dir().display(),
            active = %config.active_dir().display(),
            "profile selected"
        );
        self.engine = ActivationEngine::new(config);
        self.start_watcher();
        self.rescan(reason).map(|_| ())
    }

    fn start_watcher(&mut self) {
        if !self.options.watch {
            return;
        }
        match DirectoryWatcher::start(
            self.engine.config(),
            self.triggers_tx.clone(),
            self.options.debounce,
        ) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => {
                warn!("{e}; will retry on next rescan");
                self.watcher = None;
            }
        }
    }

    fn stop_watcher(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
    }

    /// Re-arm directories that appeared, or retry a watcher that never started
    fn refresh_watcher(&mut self) {
        match &self.watcher {
            Some(watcher) if watcher.needs_rearm() => watcher.rearm(),
            Some(_) => {}
            None => self.start_watcher(),
        }
    }

    fn after_toggle(&mut self) {
        if let Err(e) = self.rescan(RescanReason::Toggle) {
            debug!("rescan after toggle failed: {e}");
        }
    }

    fn record_failure(&mut self, op: &str, filename: &str, e: &EngineError) {
        if e.is_stale_view() {
            warn!(script = filename, "{op}: {e}");
        } else {
            error!(script = filename, "{op} failed: {e}");
        }
        self.activity
            .error(format!("Failed to {} '{}': {}", op, filename, e));
    }

    fn persist(&mut self) {
        let config = self.engine.config().clone();
        let kind = config.kind();
        self.store.set(CURRENT_PROFILE_KEY, kind.display_name());
        if config.library_dir() != kind.default_library_dir(&self.paths) {
            self.store.set(
                kind.library_key(),
                &config.library_dir().to_string_lossy(),
            );
        }
        if let Err(e) = self.store.flush() {
            warn!(profile = %kind, "failed to save settings: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityLevel;
    use crate::scripts::Classification;
    use crate::settings::ConfigStore;
    use crate::test_utils::{MemorySettings, setup_test_paths, touch};
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(3);

    fn quiet() -> ManagerOptions {
        ManagerOptions {
            watch: false,
            ..ManagerOptions::default()
        }
    }

    fn summary(manager: &ProfileManager<MemorySettings>) -> Vec<(String, Classification)> {
        manager
            .entries()
            .iter()
            .map(|e| (e.filename().to_string(), e.classification()))
            .collect()
    }

    fn state(pairs: &[(&str, Classification)]) -> Vec<(String, Classification)> {
        pairs.iter().map(|(n, c)| (n.to_string(), *c)).collect()
    }

    #[test]
    fn test_start_uses_stored_profile_and_override() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let library = temp_dir.path().join("zenith-lib");
        fs::create_dir_all(&library).unwrap();
        touch(&library, "fly.luau");

        let mut store = MemorySettings::default();
        store.set(CURRENT_PROFILE_KEY, "Zenith");
        store.set("zenith_script_folder", &library.to_string_lossy());

        let manager = ProfileManager::start(paths.clone(), store, quiet()).unwrap();
        assert_eq!(manager.current_profile(), ProfileKind::Zenith);
        assert_eq!(manager.config().library_dir(), library);
        assert_eq!(
            manager.config().active_dir(),
            ProfileKind::Zenith.active_dir(&paths)
        );
        assert_eq!(summary(&manager), state(&[("fly.luau", Classification::LibraryOnly)]));
    }

    #[test]
    fn test_start_ignores_invalid_stored_override() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let mut store = MemorySettings::default();
        store.set(
            "wave_script_folder",
            &ProfileKind::Wave.active_dir(&paths).to_string_lossy(),
        );

        let manager = ProfileManager::start(paths.clone(), store, quiet()).unwrap();
        assert_eq!(
            manager.config().library_dir(),
            ProfileKind::Wave.default_library_dir(&paths)
        );
        assert_eq!(manager.activity().len(), 1);
    }

    #[test]
    fn test_toggle_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let library = ProfileKind::Wave.default_library_dir(&paths);
        fs::create_dir_all(&library).unwrap();
        touch(&library, "a.luau");
        touch(&library, "b.luau");

        let mut manager =
            ProfileManager::start(paths, MemorySettings::default(), quiet()).unwrap();
        let original = state(&[
            ("a.luau", Classification::LibraryOnly),
            ("b.luau", Classification::LibraryOnly),
        ]);
        assert_eq!(summary(&manager), original);

        assert_eq!(
            manager.toggle("a.luau").unwrap(),
            ToggleOutcome::Activated(Activation::Copied)
        );
        assert_eq!(
            summary(&manager),
            state(&[
                ("a.luau", Classification::Both),
                ("b.luau", Classification::LibraryOnly),
            ])
        );

        assert_eq!(
            manager.toggle("a.luau").unwrap(),
            ToggleOutcome::Deactivated(Deactivation::Removed)
        );
        assert_eq!(summary(&manager), original);

        let lines: Vec<_> = manager.activity().lines().map(|l| l.message.clone()).collect();
        assert!(lines[0].starts_with("Copied 'a.luau' to "));
        assert!(lines[1].starts_with("Removed 'a.luau' from "));
    }

    #[test]
    fn test_failed_toggle_is_logged_and_rescanned() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let mut manager =
            ProfileManager::start(paths, MemorySettings::default(), quiet()).unwrap();

        // Appears behind our back, vanishes before the toggle
        let active = manager.config().active_dir().to_path_buf();
        fs::create_dir_all(&active).unwrap();
        touch(&active, "ghost.luau");
        manager.rescan(RescanReason::Startup).unwrap();
        fs::remove_file(active.join("ghost.luau")).unwrap();

        let err = manager.deactivate("ghost.luau").unwrap_err();
        assert!(matches!(err, EngineError::SourceMissing { .. }));
        assert!(manager.entries().is_empty());

        let err = manager.activate("missing.luau").unwrap_err();
        assert!(matches!(err, EngineError::SourceMissing { .. }));
        assert!(crate::fs_utils::read_file_names(&active).unwrap().is_empty());
        assert!(
            manager
                .activity()
                .lines()
                .all(|l| l.message.starts_with("Failed to "))
        );
    }

    #[test]
    fn test_orphan_deactivation_through_manager() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let active = ProfileKind::Wave.active_dir(&paths);
        fs::create_dir_all(&active).unwrap();
        touch(&active, "c.luau");

        let mut manager =
            ProfileManager::start(paths, MemorySettings::default(), quiet()).unwrap();
        assert_eq!(summary(&manager), state(&[("c.luau", Classification::ActiveOnly)]));

        manager.set_active("c.luau", false).unwrap();
        assert_eq!(summary(&manager), state(&[("c.luau", Classification::LibraryOnly)]));
        assert!(
            manager
                .activity()
                .lines()
                .any(|l| l.message == "Moved 'c.luau' back to Wave scripts folder")
        );
    }

    #[test]
    fn test_switch_profile_persists_and_keeps_files() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let wave_active = ProfileKind::Wave.active_dir(&paths);
        fs::create_dir_all(&wave_active).unwrap();
        touch(&wave_active, "wave.luau");
        let zenith_library = ProfileKind::Zenith.default_library_dir(&paths);
        fs::create_dir_all(&zenith_library).unwrap();
        touch(&zenith_library, "zen.luau");

        let mut manager =
            ProfileManager::start(paths, MemorySettings::default(), quiet()).unwrap();
        assert_eq!(manager.current_profile(), ProfileKind::Wave);

        manager.cycle_profile().unwrap();
        assert_eq!(manager.current_profile(), ProfileKind::Zenith);
        assert_eq!(summary(&manager), state(&[("zen.luau", Classification::LibraryOnly)]));
        assert!(wave_active.join("wave.luau").is_file());

        assert_eq!(manager.store().get(CURRENT_PROFILE_KEY, ""), "Zenith");
        assert_eq!(manager.store().get("zenith_script_folder", "unset"), "unset");
        assert!(manager.store().flushes() >= 1);

        manager.cycle_profile().unwrap();
        manager.cycle_profile().unwrap();
        assert_eq!(manager.current_profile(), ProfileKind::Wave);
        assert_eq!(summary(&manager), state(&[("wave.luau", Classification::ActiveOnly)]));
    }

    #[test]
    fn test_switch_survives_failed_persist() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let store = MemorySettings::failing();

        let mut manager = ProfileManager::start(paths, store, quiet()).unwrap();
        manager.switch_profile(ProfileKind::Awp).unwrap();
        assert_eq!(manager.current_profile(), ProfileKind::Awp);
    }

    #[test]
    fn test_set_library_dir_rejects_active_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let mut manager =
            ProfileManager::start(paths, MemorySettings::default(), quiet()).unwrap();
        let before = manager.config().clone();

        let active = before.active_dir().to_path_buf();
        let err = manager.set_library_dir(active).unwrap_err();
        assert!(matches!(err, EngineError::ConfigInvalid(_)));
        assert_eq!(manager.config(), &before);
        assert_eq!(manager.store().get("wave_script_folder", "unset"), "unset");
    }

    #[test]
    fn test_set_library_dir_rejects_unlistable_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let not_a_dir = touch(temp_dir.path(), "not-a-dir");
        let mut manager =
            ProfileManager::start(paths, MemorySettings::default(), quiet()).unwrap();
        let before = manager.config().clone();

        let err = manager.set_library_dir(&not_a_dir).unwrap_err();
        assert!(matches!(err, EngineError::Io { op: "list", .. }));
        assert_eq!(manager.config(), &before);
        assert_eq!(manager.store().get("wave_script_folder", "unset"), "unset");
    }

    #[test]
    fn test_start_falls_back_when_stored_override_cannot_be_listed() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let library = ProfileKind::Wave.default_library_dir(&paths);
        fs::create_dir_all(&library).unwrap();
        touch(&library, "a.luau");
        let not_a_dir = touch(temp_dir.path(), "not-a-dir");

        let mut store = MemorySettings::default();
        store.set("wave_script_folder", &not_a_dir.to_string_lossy());

        let manager = ProfileManager::start(paths, store, quiet()).unwrap();
        assert_eq!(manager.config().library_dir(), library);
        assert_eq!(summary(&manager), state(&[("a.luau", Classification::LibraryOnly)]));
        assert!(
            manager
                .activity()
                .lines()
                .any(|l| l.level == ActivityLevel::Error
                    && l.message.starts_with("Ignoring stored Wave scripts folder"))
        );
    }

    #[test]
    fn test_start_survives_unlistable_active_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let active = ProfileKind::Wave.active_dir(&paths);
        fs::create_dir_all(active.parent().unwrap()).unwrap();
        fs::write(&active, "").unwrap();

        let manager = ProfileManager::start(paths, MemorySettings::default(), quiet()).unwrap();
        assert_eq!(manager.current_profile(), ProfileKind::Wave);
        assert!(manager.entries().is_empty());
        assert!(
            manager
                .activity()
                .lines()
                .any(|l| l.level == ActivityLevel::Error && l.message.starts_with("Rescan failed"))
        );
    }

    #[test]
    fn test_switch_completes_when_new_profile_cannot_be_listed() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let zenith_active = ProfileKind::Zenith.active_dir(&paths);
        fs::create_dir_all(zenith_active.parent().unwrap()).unwrap();
        fs::write(&zenith_active, "").unwrap();

        let mut manager =
            ProfileManager::start(paths, MemorySettings::default(), quiet()).unwrap();
        assert!(manager.switch_profile(ProfileKind::Zenith).unwrap().is_empty());

        assert_eq!(manager.current_profile(), ProfileKind::Zenith);
        assert_eq!(manager.store().get(CURRENT_PROFILE_KEY, ""), "Zenith");
        let messages: Vec<&str> = manager.activity().lines().map(|l| l.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.starts_with("Rescan failed")));
        assert_eq!(messages.last(), Some(&"Switched to Zenith mode"));
    }

    #[test]
    fn test_set_library_dir_persists_and_rescans() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let custom = temp_dir.path().join("my-scripts");
        fs::create_dir_all(&custom).unwrap();
        touch(&custom, "x.luau");

        let mut manager =
            ProfileManager::start(paths, MemorySettings::default(), quiet()).unwrap();
        manager.set_library_dir(&custom).unwrap();

        assert_eq!(manager.config().library_dir(), custom);
        assert_eq!(summary(&manager), state(&[("x.luau", Classification::LibraryOnly)]));
        assert_eq!(
            manager.store().get("wave_script_folder", ""),
            custom.to_string_lossy()
        );
    }

    #[test]
    #[serial]
    fn test_external_file_becomes_active_only() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let library = ProfileKind::Wave.default_library_dir(&paths);
        let active = ProfileKind::Wave.active_dir(&paths);
        fs::create_dir_all(&library).unwrap();
        fs::create_dir_all(&active).unwrap();

        let mut manager =
            ProfileManager::start(paths, MemorySettings::default(), ManagerOptions::default())
                .unwrap();
        assert_eq!(manager.watch_state(), WatchState::Watching);
        assert!(manager.entries().is_empty());

        touch(&active, "c.luau");

        let started = Instant::now();
        while manager.entries().is_empty() {
            assert!(started.elapsed() < WAIT, "watcher never triggered a rescan");
            manager.wait_for_trigger(Duration::from_millis(200)).unwrap();
        }
        assert_eq!(summary(&manager), state(&[("c.luau", Classification::ActiveOnly)]));

        manager.shutdown();
        assert_eq!(manager.watch_state(), WatchState::Stopped);
    }

    #[test]
    #[serial]
    fn test_activation_creates_and_rearms_active_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let library = ProfileKind::Awp.default_library_dir(&paths);
        fs::create_dir_all(&library).unwrap();
        touch(&library, "a.luau");

        let mut store = MemorySettings::default();
        store.set(CURRENT_PROFILE_KEY, "AWP");
        let mut manager =
            ProfileManager::start(paths, store, ManagerOptions::default()).unwrap();
        let active = manager.config().active_dir().to_path_buf();
        assert_eq!(manager.unwatched_dirs(), vec![active.clone()]);

        manager.activate("a.luau").unwrap();
        assert!(active.join("a.luau").is_file());

        let started = Instant::now();
        while !manager.unwatched_dirs().is_empty() {
            assert!(started.elapsed() < WAIT, "active directory was never watched");
            std::thread::sleep(Duration::from_millis(10));
        }

        touch(&active, "dropped.luau");
        let started = Instant::now();
        while manager.entry("dropped.luau").is_none() {
            assert!(started.elapsed() < WAIT, "new active directory not watched");
            manager.wait_for_trigger(Duration::from_millis(200)).unwrap();
        }
        assert_eq!(
            manager.entry("dropped.luau").unwrap().classification(),
            Classification::ActiveOnly
        );
    }

    #[test]
    fn test_stale_triggers_are_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let mut manager =
            ProfileManager::start(paths, MemorySettings::default(), quiet()).unwrap();

        manager
            .triggers_tx
            .send(RescanTrigger {
                profile: ProfileKind::Zenith,
                reason: RescanReason::FsEvent,
            })
            .unwrap();
        assert_eq!(manager.wait_for_trigger(Duration::from_millis(50)).unwrap(), None);

        manager
            .triggers_tx
            .send(RescanTrigger {
                profile: ProfileKind::Wave,
                reason: RescanReason::FsEvent,
            })
            .unwrap();
        let trigger = manager.wait_for_trigger(Duration::from_millis(50)).unwrap();
        assert_eq!(trigger.map(|t| t.profile), Some(ProfileKind::Wave));
    }

    #[test]
    fn test_switch_discards_pending_triggers() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let mut manager =
            ProfileManager::start(paths, MemorySettings::default(), quiet()).unwrap();

        manager
            .triggers_tx
            .send(RescanTrigger {
                profile: ProfileKind::Zenith,
                reason: RescanReason::FsEvent,
            })
            .unwrap();
        manager.switch_profile(ProfileKind::Zenith).unwrap();
        assert_eq!(manager.wait_for_trigger(Duration::from_millis(50)).unwrap(), None);
    }
}
