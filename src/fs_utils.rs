//! Filesystem utility functions
//!
//! This module provides the few filesystem primitives the engine builds on.
//! Presence of a regular file is the only signal consumed; contents are never
//! read except to copy them.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;

/// Result of copying a file into a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The destination did not exist and now holds a copy
    Copied,
    /// A file was already present at the destination; nothing was written
    AlreadyPresent,
}

/// Whether `path` is a regular file (symlinks to files count)
pub fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Names of the regular files directly inside `dir`
///
/// A missing directory lists as empty. Subdirectories and names that are not
/// valid UTF-8 are skipped.
pub fn read_file_names(dir: &Path) -> io::Result<BTreeSet<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e),
    };

    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        // file_type() does not follow symlinks; fall back to metadata for those
        let is_file = match entry.file_type() {
            Ok(ft) if ft.is_symlink() => is_regular_file(&entry.path()),
            Ok(ft) => ft.is_file(),
            // Vanished between read_dir and stat
            Err(_) => false,
        };
        if is_file {
            names.insert(name);
        }
    }
    Ok(names)
}

/// Copy `src` to `dst_dir/name` without ever overwriting
///
/// Creates `dst_dir` if missing. The destination is created with
/// `create_new`, so a file appearing concurrently is never clobbered. A
/// partially written destination is removed before the error is returned.
/// A non-file already occupying the destination name is an error.
pub fn copy_no_clobber(src: &Path, dst_dir: &Path, name: &str) -> io::Result<CopyOutcome> {
    let mut reader = File::open(src)?;
    let permissions = reader.metadata()?.permissions();

    fs::create_dir_all(dst_dir)?;
    let dst = dst_dir.join(name);

    let mut writer = match OpenOptions::new().write(true).create_new(true).open(&dst) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            // Only a file counts as a copy; a directory squatting on the name does not
            if is_regular_file(&dst) {
                return Ok(CopyOutcome::AlreadyPresent);
            }
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} exists and is not a regular file", dst.display()),
            ));
        }
        Err(e) => return Err(e),
    };

    let written = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all());
    if let Err(e) = written {
        drop(writer);
        let _ = fs::remove_file(&dst);
        return Err(e);
    }

    // Best effort: a file that copied fine but kept default permissions is still usable
    let _ = fs::set_permissions(&dst, permissions);

    Ok(CopyOutcome::Copied)
}
