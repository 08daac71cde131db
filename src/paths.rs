use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::{Path, PathBuf};

/// All computed paths used by autoexec
#[derive(Debug, Clone)]
pub struct Paths {
    /// <config>/autoexec
    pub base_dir: PathBuf,
    /// <config>/autoexec/settings.json
    pub settings_file: PathBuf,
    /// %LOCALAPPDATA% on Windows, XDG data home elsewhere
    pub local_data_dir: PathBuf,
    /// %APPDATA% on Windows, XDG data home elsewhere
    pub roaming_data_dir: PathBuf,
}

impl Paths {
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;

        let base_dir = base_dirs.config_dir().join("autoexec");
        let settings_file = base_dir.join("settings.json");

        Ok(Self {
            base_dir,
            settings_file,
            local_data_dir: base_dirs.data_local_dir().to_path_buf(),
            roaming_data_dir: base_dirs.data_dir().to_path_buf(),
        })
    }

    /// Same as [`Paths::new`] but with the settings file relocated
    pub fn with_settings_file(mut self, settings_file: impl Into<PathBuf>) -> Self {
        self.settings_file = settings_file.into();
        if let Some(parent) = self.settings_file.parent() {
            self.base_dir = parent.to_path_buf();
        }
        self
    }

    /// Ensure the settings directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir).with_context(|| {
            format!("Failed to create settings directory: {:?}", self.base_dir)
        })?;
        Ok(())
    }
}

/// Lock file guarding writes to `file`, kept next to it
pub(crate) fn lock_path_for(file: &Path) -> PathBuf {
    let mut name = file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "settings".into());
    name.push(".lock");
    file.with_file_name(name)
}
