//! Script classification.
//!
//! Every rescan lists both directories of the selected profile and feeds the
//! two name sets through [`derive`]. The resulting sorted entries are the only
//! state shown to the user; nothing is cached between rescans.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::fs_utils::read_file_names;

/// Extension of files treated as scripts
pub const SCRIPT_EXTENSION: &str = "luau";

/// Where a script currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Only in the library directory (inactive)
    LibraryOnly,
    /// Only in the active directory (active, no library copy)
    ActiveOnly,
    /// In both directories (active)
    Both,
}

impl Classification {
    /// Whether the host application will execute the script
    pub fn is_active(&self) -> bool {
        !matches!(self, Classification::LibraryOnly)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::LibraryOnly => "inactive",
            Classification::ActiveOnly => "active (no library copy)",
            Classification::Both => "active",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One script and its presence in each directory
///
/// Only [`derive`] builds entries, so at least one flag is always set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptEntry {
    filename: String,
    in_library: bool,
    in_active: bool,
}

impl ScriptEntry {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn in_library(&self) -> bool {
        self.in_library
    }

    pub fn in_active(&self) -> bool {
        self.in_active
    }

    /// Always recomputed from the two presence flags
    pub fn classification(&self) -> Classification {
        match (self.in_library, self.in_active) {
            (true, true) => Classification::Both,
            (false, true) => Classification::ActiveOnly,
            _ => Classification::LibraryOnly,
        }
    }
}

/// Whether `name` is a flat script filename with the recognized extension
pub fn is_script(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext == SCRIPT_EXTENSION)
        && !name.contains(['/', '\\'])
        && Path::new(name).file_stem().is_some_and(|s| !s.is_empty())
}

/// Reject anything that is not a flat script filename
pub fn validate_script_name(name: &str) -> Result<()> {
    if is_script(name) {
        Ok(())
    } else {
        Err(EngineError::InvalidName(name.to_string()))
    }
}

/// Classify every script present in either listing, sorted by filename
pub fn derive<L, A>(library: L, active: A) -> Vec<ScriptEntry>
where
    L: IntoIterator,
    L::Item: AsRef<str>,
    A: IntoIterator,
    A::Item: AsRef<str>,
{
    let library: BTreeSet<String> = only_scripts(library);
    let active: BTreeSet<String> = only_scripts(active);

    library
        .union(&active)
        .map(|name| ScriptEntry {
            in_library: library.contains(name),
            in_active: active.contains(name),
            filename: name.clone(),
        })
        .collect()
}

fn only_scripts<I>(names: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    names
        .into_iter()
        .filter(|n| is_script(n.as_ref()))
        .map(|n| n.as_ref().to_string())
        .collect()
}

/// Script filenames directly inside `dir` (missing directory lists as empty)
pub fn list_scripts(dir: &Path) -> Result<BTreeSet<String>> {
    let names = read_file_names(dir).map_err(|e| EngineError::io("list", dir, e))?;
    Ok(names.into_iter().filter(|n| is_script(n)).collect())
}

/// List both directories and classify their scripts
pub fn scan(library_dir: &Path, active_dir: &Path) -> Result<Vec<ScriptEntry>> {
    let library = list_scripts(library_dir)?;
    let active = list_scripts(active_dir)?;
    tracing::debug!(
        library = library.len(),
        active = active.len(),
        "listed script directories"
    );
    Ok(derive(&library, &active))
}
