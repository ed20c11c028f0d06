//! Index of the program names runnable from the search path.

use log::{debug, trace};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;

pub fn is_exec_owner(mode: u32) -> bool {
    mode & 0o100 != 0
}

pub fn is_exec_group(mode: u32) -> bool {
    mode & 0o010 != 0
}

pub fn is_exec_other(mode: u32) -> bool {
    mode & 0o001 != 0
}

/// Executable by anyone of owner, group or other.
pub fn is_exec_any(mode: u32) -> bool {
    mode & 0o111 != 0
}

/// Executable by owner, group and other alike.
pub fn is_exec_all(mode: u32) -> bool {
    mode & 0o111 == 0o111
}

#[cfg(unix)]
pub(crate) fn mode_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
pub(crate) fn mode_of(metadata: &fs::Metadata) -> u32 {
    if metadata.is_file() { 0o755 } else { 0o644 }
}

/// Snapshot of the search path: the directories that could be listed, in
/// order, and the executable names found in them.
///
/// Built once when the session starts and never refreshed.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
    names: HashSet<String>,
}

impl SearchPath {
    /// Scan the directories named by the `PATH` environment variable.
    pub fn from_env() -> Self {
        Self::build(std::env::var_os("PATH").unwrap_or_default())
    }

    /// Scan the directories of a `PATH`-style list.
    ///
    /// Empty entries mean the current directory. Directories that cannot be
    /// listed are skipped; that is routine and never an error.
    pub fn build(path_var: impl AsRef<OsStr>) -> Self {
        let path_var = path_var.as_ref();
        let mut index = Self::default();
        if path_var.is_empty() {
            return index;
        }

        for dir in std::env::split_paths(path_var) {
            let dir = if dir.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                dir
            };
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    trace!("skipping {}: {}", dir.display(), err);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let Ok(metadata) = entry.metadata() else {
                    continue;
                };
                if is_exec_any(mode_of(&metadata)) {
                    index
                        .names
                        .insert(entry.file_name().to_string_lossy().into_owned());
                }
            }
            index.dirs.push(dir);
        }

        debug!(
            "indexed {} executables in {} directories",
            index.names.len(),
            index.dirs.len()
        );
        index
    }

    /// Directories that were readable, in search order.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn names(&self) -> &HashSet<String> {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Sorted executable names starting with `prefix`.
    pub fn complete(&self, prefix: &str) -> Vec<&str> {
        let mut found: Vec<&str> = self
            .names
            .iter()
            .map(String::as_str)
            .filter(|name| name.starts_with(prefix))
            .collect();
        found.sort_unstable();
        found
    }
}
