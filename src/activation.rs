//! Script activation logic.
//!
//! This module implements the only code that mutates a profile's directories:
//! - Activation copies a library script into the active directory, never
//!   overwriting what is already there.
//! - Deactivation removes a script from the active directory, first copying
//!   it back to the library when that would otherwise lose the file.
//!
//! Copy-then-remove is not transactional. When a step fails the operation
//! stops where the filesystem got to, and the next rescan reports the truth.

use std::fs;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use tracing::{debug, info, instrument, warn};

use crate::error::{EngineError, Result};
use crate::fs_utils::{CopyOutcome, copy_no_clobber, is_regular_file};
use crate::profiles::ProfileConfig;
use crate::scripts::validate_script_name;

/// What [`ActivationEngine::activate`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Copied from the library into the active directory
    Copied,
    /// A file of that name was already active; nothing changed
    AlreadyActive,
}

/// What [`ActivationEngine::deactivate`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deactivation {
    /// Removed from the active directory; a library copy already existed
    Removed,
    /// Copied back into the library, then removed from the active directory
    RestoredThenRemoved,
}

/// Performs toggles for one profile
///
/// Clones share the same in-flight guard, so at most one toggle runs against
/// a profile's directories at a time; a concurrent request is rejected with
/// [`EngineError::ToggleInFlight`].
#[derive(Debug, Clone)]
pub struct ActivationEngine {
    config: Arc<ProfileConfig>,
    in_flight: Arc<Mutex<()>>,
}

impl ActivationEngine {
    pub fn new(config: ProfileConfig) -> Self {
        Self {
            config: Arc::new(config),
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        match self.in_flight.try_lock() {
            Ok(guard) => Ok(guard),
            // A toggle that panicked left no in-memory state worth protecting
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(EngineError::ToggleInFlight(
                self.config.name().to_string(),
            )),
        }
    }

    /// Copy `filename` from the library into the active directory.
    ///
    /// Creates the active directory if needed. Idempotent: an existing active
    /// file is left untouched.
    ///
    /// # Errors
    ///
    /// - [`EngineError::SourceMissing`] if the library has no such file.
    /// - [`EngineError::Io`] if the copy fails.
    #[instrument(skip(self), fields(profile = %self.config.kind()), level = "debug")]
    pub fn activate(&self, filename: &str) -> Result<Activation> {
        validate_script_name(filename)?;
        let _guard = self.guard()?;

        let library_dir = self.config.library_dir();
        let active_dir = self.config.active_dir();
        let source = library_dir.join(filename);

        if !is_regular_file(&source) {
            return Err(self.missing(filename, library_dir));
        }

        match copy_no_clobber(&source, active_dir, filename) {
            Ok(CopyOutcome::Copied) => {
                info!(script = filename, dir = %active_dir.display(), "activated script");
                Ok(Activation::Copied)
            }
            Ok(CopyOutcome::AlreadyPresent) => {
                debug!(script = filename, "already active");
                Ok(Activation::AlreadyActive)
            }
            Err(e) if e.kind() == ErrorKind::NotFound && !is_regular_file(&source) => {
                Err(self.missing(filename, library_dir))
            }
            Err(e) => Err(EngineError::io("copy", source, e)),
        }
    }

    /// Remove `filename` from the active directory without losing it.
    ///
    /// When the profile preserves orphans and the library lacks the script,
    /// the active file is copied into the library (created if needed) before
    /// it is removed.
    ///
    /// # Errors
    ///
    /// - [`EngineError::SourceMissing`] if the active directory has no such file.
    /// - [`EngineError::Io`] if the copy-back or the removal fails. A failed
    ///   copy-back leaves the active file in place.
    #[instrument(skip(self), fields(profile = %self.config.kind()), level = "debug")]
    pub fn deactivate(&self, filename: &str) -> Result<Deactivation> {
        validate_script_name(filename)?;
        let _guard = self.guard()?;

        let library_dir = self.config.library_dir();
        let active_dir = self.config.active_dir();
        let target = active_dir.join(filename);

        if !is_regular_file(&target) {
            return Err(self.missing(filename, active_dir));
        }

        let mut restored = false;
        if self.config.preserve_orphans() && !is_regular_file(&library_dir.join(filename)) {
            match copy_no_clobber(&target, library_dir, filename) {
                Ok(CopyOutcome::Copied) => {
                    info!(script = filename, dir = %library_dir.display(), "restored orphan to library");
                    restored = true;
                }
                // Someone put a library copy there in the meantime; that is all we need
                Ok(CopyOutcome::AlreadyPresent) => {}
                Err(e) if e.kind() == ErrorKind::NotFound && !is_regular_file(&target) => {
                    return Err(self.missing(filename, active_dir));
                }
                Err(e) => return Err(EngineError::io("copy", target, e)),
            }
        }

        match fs::remove_file(&target) {
            Ok(()) => {
                info!(script = filename, dir = %active_dir.display(), "deactivated script");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(script = filename, "active file vanished before removal");
                return Err(self.missing(filename, active_dir));
            }
            Err(e) => return Err(EngineError::io("remove", target, e)),
        }

        Ok(if restored {
            Deactivation::RestoredThenRemoved
        } else {
            Deactivation::Removed
        })
    }

    fn missing(&self, filename: &str, dir: &std::path::Path) -> EngineError {
        EngineError::SourceMissing {
            script: filename.to_string(),
            dir: dir.to_path_buf(),
        }
    }
}
