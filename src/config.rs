//! Startup configuration: line editor settings read from an inputrc-style
//! file, and the paths of the files a session touches.

use log::{debug, info, warn};
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// `set <name> <value>`, optionally followed by a comment.
static SET_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^set\s+([A-Za-z][A-Za-z0-9-]*)\s+(\S+)\s*(?:#.*)?$").ok()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown option `{0}'")]
    UnknownOption(String),
    #[error("invalid value `{value}' for {name}")]
    InvalidValue { name: String, value: String },
    #[error("cannot parse `{0}'")]
    Syntax(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditingMode {
    Vi,
    Emacs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BellStyle {
    None,
    Audible,
    Visible,
}

/// Line editor options a user can change from the inputrc file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSettings {
    pub editing_mode: EditingMode,
    /// Show the rest of the first completion as a hint while typing.
    pub autocomplete: bool,
    /// How long to wait for the rest of a key sequence, e.g. after Escape in vi mode.
    pub keyseq_timeout_ms: u16,
    pub history_size: usize,
    pub bell_style: BellStyle,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            editing_mode: EditingMode::Vi,
            autocomplete: true,
            keyseq_timeout_ms: 100,
            history_size: 1000,
            bell_style: BellStyle::None,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "1" => Some(true),
        "off" | "0" => Some(false),
        _ => None,
    }
}

impl EditorSettings {
    /// Read settings from `path`. A missing or unreadable file leaves the
    /// defaults in place.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => {
                info!("reading editor settings from {}", path.display());
                Self::parse(&text)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("no {}, using default editor settings", path.display());
                Self::default()
            }
            Err(err) => {
                warn!("cannot read {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    /// Settings from the text of an inputrc file. Problems are logged and the
    /// offending line is skipped.
    pub fn parse(text: &str) -> Self {
        let mut settings = Self::default();
        for (number, problem) in settings.apply(text) {
            match problem {
                ConfigError::UnknownOption(_) => debug!("inputrc line {number}: {problem}"),
                _ => warn!("inputrc line {number}: {problem}"),
            }
        }
        settings
    }

    /// Apply every `set` line of `text`, returning the problems found with
    /// their 1-based line numbers.
    ///
    /// Conditionals (`$if`) and key bindings are recognised but not supported;
    /// they are skipped silently.
    pub fn apply(&mut self, text: &str) -> Vec<(usize, ConfigError)> {
        let mut problems = Vec::new();
        let Some(set_line) = SET_LINE.as_ref() else {
            return problems;
        };

        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('$') || (!line.starts_with("set") && line.contains(':')) {
                debug!("inputrc line {}: skipping {line:?}", i + 1);
                continue;
            }
            let result = match set_line.captures(line) {
                Some(caps) => self.set(&caps[1], &caps[2]),
                None => Err(ConfigError::Syntax(line.to_string())),
            };
            if let Err(err) = result {
                problems.push((i + 1, err));
            }
        }
        problems
    }

    /// Set one option by its inputrc name.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        };

        match name {
            "editing-mode" => {
                self.editing_mode = match value {
                    "vi" => EditingMode::Vi,
                    "emacs" => EditingMode::Emacs,
                    _ => return Err(invalid()),
                }
            }
            "autocomplete" => self.autocomplete = parse_bool(value).ok_or_else(invalid)?,
            "keyseq-timeout" => self.keyseq_timeout_ms = value.parse().map_err(|_| invalid())?,
            "history-size" => self.history_size = value.parse().map_err(|_| invalid())?,
            "bell-style" => {
                self.bell_style = match value {
                    "none" => BellStyle::None,
                    "audible" => BellStyle::Audible,
                    "visible" => BellStyle::Visible,
                    _ => return Err(invalid()),
                }
            }
            _ => return Err(ConfigError::UnknownOption(name.to_string())),
        }
        Ok(())
    }
}

/// Files used by a session, relative to the directory the shell starts in
/// unless given as absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub history: PathBuf,
    pub inputrc: PathBuf,
    /// Script run before the first prompt.
    pub init: PathBuf,
    pub log: PathBuf,
}

impl Default for SessionPaths {
    fn default() -> Self {
        Self {
            history: PathBuf::from(".ash_history"),
            inputrc: PathBuf::from("inputrc"),
            init: PathBuf::from("shinit"),
            log: PathBuf::from("ash.log"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = EditorSettings::default();
        assert_eq!(settings.editing_mode, EditingMode::Vi);
        assert!(settings.autocomplete);
        assert_eq!(settings.keyseq_timeout_ms, 100);
        assert_eq!(settings.bell_style, BellStyle::None);
    }

    #[test]
    fn set_lines_override_defaults() {
        let settings = EditorSettings::parse(
            "# my settings\n\
             set editing-mode emacs\n\
             set autocomplete off\n\
             set keyseq-timeout 250 # slower terminal\n\
             set history-size 50\n\
             set bell-style visible\n",
        );
        assert_eq!(
            settings,
            EditorSettings {
                editing_mode: EditingMode::Emacs,
                autocomplete: false,
                keyseq_timeout_ms: 250,
                history_size: 50,
                bell_style: BellStyle::Visible,
            }
        );
    }

    #[test]
    fn problems_are_reported_and_defaults_kept() {
        let mut settings = EditorSettings::default();
        let problems = settings.apply(
            "set editing-mode nano\n\
             set keyseq-timeout -5\n\
             set colored-stats on\n\
             what is this\n\
             set autocomplete OFF\n",
        );

        assert_eq!(settings.editing_mode, EditingMode::Vi);
        assert_eq!(settings.keyseq_timeout_ms, 100);
        assert!(!settings.autocomplete);
        assert_eq!(
            problems,
            vec![
                (
                    1,
                    ConfigError::InvalidValue {
                        name: "editing-mode".to_string(),
                        value: "nano".to_string()
                    }
                ),
                (
                    2,
                    ConfigError::InvalidValue {
                        name: "keyseq-timeout".to_string(),
                        value: "-5".to_string()
                    }
                ),
                (3, ConfigError::UnknownOption("colored-stats".to_string())),
                (4, ConfigError::Syntax("what is this".to_string())),
            ]
        );
    }

    #[test]
    fn bindings_and_conditionals_are_skipped() {
        let mut settings = EditorSettings::default();
        let problems = settings.apply(
            "$if mode=vi\n\
             \"\\C-p\": history-search-backward\n\
             Control-n: history-search-forward\n\
             $endif\n",
        );
        assert!(problems.is_empty());
        assert_eq!(settings, EditorSettings::default());
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = EditorSettings::load(&dir.path().join("inputrc"));
        assert_eq!(settings, EditorSettings::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("inputrc");
        fs::write(&path, "set editing-mode emacs\n").unwrap();
        assert_eq!(EditorSettings::load(&path).editing_mode, EditingMode::Emacs);
    }

    #[test]
    fn default_paths() {
        let paths = SessionPaths::default();
        assert_eq!(paths.history, PathBuf::from(".ash_history"));
        assert_eq!(paths.init, PathBuf::from("shinit"));
    }
}
