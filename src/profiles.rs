//! Profile definitions and resolution.
//!
//! A profile names one host application layout: a fixed active directory the
//! host executes scripts from, and a library directory the user may point
//! anywhere. Profiles are mutually exclusive; exactly one is selected at a
//! time and its [`ProfileConfig`] is replaced wholesale on every switch.

use std::fmt;
use std::path::{Component as PathComponent, Path, PathBuf};
use std::str::FromStr;

use crate::error::{EngineError, Result};
use crate::paths::Paths;
use crate::settings::ConfigStore;

/// Settings key holding the last selected profile
pub const CURRENT_PROFILE_KEY: &str = "current_mode";

/// Built-in host application profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ProfileKind {
    #[default]
    Wave,
    Zenith,
    Awp,
}

impl ProfileKind {
    /// All profiles, in cycling order
    pub fn all() -> [ProfileKind; 3] {
        [ProfileKind::Wave, ProfileKind::Zenith, ProfileKind::Awp]
    }

    /// The profile selected after this one when cycling
    pub fn next(self) -> ProfileKind {
        match self {
            ProfileKind::Wave => ProfileKind::Zenith,
            ProfileKind::Zenith => ProfileKind::Awp,
            ProfileKind::Awp => ProfileKind::Wave,
        }
    }

    /// Human-readable name, also the value persisted under [`CURRENT_PROFILE_KEY`]
    pub fn display_name(&self) -> &'static str {
        match self {
            ProfileKind::Wave => "Wave",
            ProfileKind::Zenith => "Zenith",
            ProfileKind::Awp => "AWP",
        }
    }

    /// Settings key storing this profile's library directory override
    pub fn library_key(&self) -> &'static str {
        match self {
            ProfileKind::Wave => "wave_script_folder",
            ProfileKind::Zenith => "zenith_script_folder",
            ProfileKind::Awp => "awp_script_folder",
        }
    }

    /// Directory the host application executes scripts from
    pub fn active_dir(&self, paths: &Paths) -> PathBuf {
        match self {
            ProfileKind::Wave => paths.local_data_dir.join("Wave").join("autoexec"),
            ProfileKind::Zenith => paths.roaming_data_dir.join("Zenith").join("AutoExec"),
            ProfileKind::Awp => paths.local_data_dir.join("ui").join("autoexec"),
        }
    }

    /// Library directory used when the user has not chosen one
    pub fn default_library_dir(&self, paths: &Paths) -> PathBuf {
        match self {
            ProfileKind::Wave => paths.local_data_dir.join("Wave").join("scripts"),
            ProfileKind::Zenith => paths.roaming_data_dir.join("Zenith").join("Scripts"),
            ProfileKind::Awp => paths.local_data_dir.join("ui").join("scripts"),
        }
    }

    /// Whether deactivating an active-only script copies it back to the library first
    pub fn preserves_orphans(&self) -> bool {
        true
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProfileKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wave" => Ok(ProfileKind::Wave),
            "zenith" => Ok(ProfileKind::Zenith),
            "awp" => Ok(ProfileKind::Awp),
            _ => Err(format!("Unknown profile: {}", s)),
        }
    }
}

/// Fully resolved, immutable description of one profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    kind: ProfileKind,
    library_dir: PathBuf,
    active_dir: PathBuf,
    preserve_orphans: bool,
}

impl ProfileConfig {
    /// Build a config, rejecting directory pairs the engine cannot work with.
    pub fn new(
        kind: ProfileKind,
        library_dir: impl Into<PathBuf>,
        active_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let library_dir = library_dir.into();
        let active_dir = active_dir.into();

        for (label, dir) in [("library", &library_dir), ("active", &active_dir)] {
            if dir.as_os_str().is_empty() {
                return Err(EngineError::ConfigInvalid(format!(
                    "{} directory for {} is empty",
                    label, kind
                )));
            }
            if !dir.is_absolute() {
                return Err(EngineError::ConfigInvalid(format!(
                    "{} directory for {} must be absolute: {}",
                    label,
                    kind,
                    dir.display()
                )));
            }
        }

        if same_dir(&library_dir, &active_dir) {
            return Err(EngineError::ConfigInvalid(format!(
                "library directory for {} cannot be its active directory: {}",
                kind,
                active_dir.display()
            )));
        }

        Ok(Self {
            kind,
            library_dir,
            active_dir,
            preserve_orphans: kind.preserves_orphans(),
        })
    }

    /// Same config with the orphan copy-back policy replaced
    pub fn with_preserve_orphans(self, preserve_orphans: bool) -> Self {
        Self {
            preserve_orphans,
            ..self
        }
    }

    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.display_name()
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    pub fn active_dir(&self) -> &Path {
        &self.active_dir
    }

    pub fn preserve_orphans(&self) -> bool {
        self.preserve_orphans
    }

    /// Both directories, library first
    pub fn dirs(&self) -> [&Path; 2] {
        [&self.library_dir, &self.active_dir]
    }
}

/// Resolve the config for `kind`, applying a user-chosen library directory.
///
/// The active directory is always the profile's fixed location.
pub fn select_profile(
    kind: ProfileKind,
    paths: &Paths,
    library_override: Option<PathBuf>,
) -> Result<ProfileConfig> {
    let library_dir = library_override.unwrap_or_else(|| kind.default_library_dir(paths));
    ProfileConfig::new(kind, library_dir, kind.active_dir(paths))
}

/// Read the stored library directory override for `kind`, if any
pub fn library_override(store: &dyn ConfigStore, kind: ProfileKind) -> Option<PathBuf> {
    let value = store.get(kind.library_key(), "");
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

/// Read the last selected profile, falling back to the default one
pub fn stored_profile(store: &dyn ConfigStore) -> ProfileKind {
    let value = store.get(CURRENT_PROFILE_KEY, ProfileKind::default().display_name());
    value.parse().unwrap_or_else(|_| {
        tracing::warn!(value = %value, "unknown stored profile, using default");
        ProfileKind::default()
    })
}

/// Compare two directories, resolving symlinks when both exist
pub fn same_dir(a: &Path, b: &Path) -> bool {
    if let (Ok(a), Ok(b)) = (a.canonicalize(), b.canonicalize()) {
        return a == b;
    }
    normalize(a) == normalize(b)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            PathComponent::CurDir => {}
            PathComponent::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
