//! Error kinds shared by the reconciliation engine.
//!
//! None of these are fatal to the process. Every failure path ends in a
//! rescan, so the filesystem stays the single source of truth.

use std::io;
use std::path::PathBuf;

/// Errors surfaced by profile resolution, activation and watching.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The file a toggle was asked to move does not exist (anymore).
    #[error("script '{script}' not found in {}", .dir.display())]
    SourceMissing { script: String, dir: PathBuf },

    /// A copy, remove or listing failed at the filesystem level.
    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A directory could not be watched; watching degrades to the rest.
    #[error("cannot watch {}: {source}", .path.display())]
    WatchUnavailable {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// Profile directories are unusable as configured.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The requested name is not a flat script filename.
    #[error("'{0}' is not a valid script name")]
    InvalidName(String),

    /// Another toggle is still mutating this profile's directories.
    #[error("another toggle is in progress for profile {0}")]
    ToggleInFlight(String),
}

impl EngineError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Whether the error only means "reality differs from what the caller saw".
    pub fn is_stale_view(&self) -> bool {
        matches!(self, Self::SourceMissing { .. })
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
