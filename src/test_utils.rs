//! Test utilities shared across test modules
//!
//! This module provides common helper functions for testing, avoiding duplication
//! across multiple test suites.

use anyhow::{Result, bail};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::paths::Paths;
use crate::settings::ConfigStore;

/// Create a Paths struct for testing using a temporary directory
///
/// Host application data directories and the settings file all live inside
/// the temp directory, mimicking the real %LOCALAPPDATA% / %APPDATA% layout.
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    Paths {
        base_dir: temp_dir.path().join("config/autoexec"),
        settings_file: temp_dir.path().join("config/autoexec/settings.json"),
        local_data_dir: temp_dir.path().join("Local"),
        roaming_data_dir: temp_dir.path().join("Roaming"),
    }
}

/// Write a small script named `name` into `dir` and return its path
pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("-- {name}")).unwrap();
    path
}

/// In-memory settings that count flushes
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: HashMap<String, String>,
    flushes: Cell<usize>,
    fail: bool,
}

impl MemorySettings {
    /// Settings whose every flush fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn flushes(&self) -> usize {
        self.flushes.get()
    }
}

impl ConfigStore for MemorySettings {
    fn get(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn flush(&self) -> Result<()> {
        self.flushes.set(self.flushes.get() + 1);
        if self.fail {
            bail!("disk full");
        }
        Ok(())
    }
}
