//! Persisted user preferences.
//!
//! The engine only ever sees the [`ConfigStore`] trait: string keys mapping to
//! string values, read once at startup and written after every profile switch
//! or library reselection. [`JsonSettings`] stores them as a flat JSON object.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::paths::lock_path_for;

/// Opaque key/value preference storage
pub trait ConfigStore: Send {
    /// Value for `key`, or `default` when unset
    fn get(&self, key: &str, default: &str) -> String;

    /// Set `key` in memory; call [`ConfigStore::flush`] to persist
    fn set(&mut self, key: &str, value: &str);

    /// Persist all values
    fn flush(&self) -> Result<()>;
}

/// Settings stored in <config>/autoexec/settings.json
#[derive(Debug, Clone, Default)]
pub struct JsonSettings {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonSettings {
    /// Read settings from file, returning empty settings if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = Self {
            path: path.to_path_buf(),
            values: BTreeMap::new(),
        };

        if !path.exists() {
            return Ok(settings);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        if content.trim().is_empty() {
            return Ok(settings);
        }

        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))?;

        // Older files may hold non-string values; keep them as their JSON text
        settings.values = raw
            .into_iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => (key, s),
                other => (key, other.to_string()),
            })
            .collect();

        Ok(settings)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored values, sorted by key
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

impl ConfigStore for JsonSettings {
    fn get(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Write settings atomically under an exclusive lock
    ///
    /// Uses atomic write pattern: write to temp file, then rename.
    /// The settings file is never left half-written even if the process crashes.
    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
        }

        let _lock = SettingsLock::acquire(&lock_path_for(&self.path))?;

        let content =
            serde_json::to_string_pretty(&self.values).context("Failed to serialize settings")?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("Failed to write temp settings file: {:?}", temp_path))?;

        std::fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename settings file: {:?} -> {:?}",
                temp_path, self.path
            )
        })
    }
}

/// Exclusive advisory lock held for the duration of a settings write
struct SettingsLock {
    file: File,
}

impl SettingsLock {
    fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open settings lock: {:?}", path))?;

        // Blocks until another writer releases it
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock settings: {:?}", path))?;

        Ok(Self { file })
    }
}

impl Drop for SettingsLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
