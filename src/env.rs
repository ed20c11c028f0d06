use crate::command::ExitCode;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::{Path, PathBuf};

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: a map of environment variables that will be visible to executed commands.
/// - `current_dir`: the working directory for command execution.
/// - `last_status`: the status of the most recent command, exposed as `$?`.
/// - `should_exit`: set by the `exit` builtin; the session stops once it is true.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// Status of the last command that ran.
    pub last_status: ExitCode,
    /// When set to true, indicates that the interactive session should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()` and initializes `current_dir`
    /// from `std::env::current_dir()`.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_vars(stdenv::vars().collect(), current_dir)
    }

    /// An environment with exactly the given variables and working directory.
    pub fn with_vars(vars: HashMap<String, String>, current_dir: PathBuf) -> Self {
        Self {
            vars,
            current_dir,
            last_status: 0,
            should_exit: false,
        }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Home directory of the current user.
    ///
    /// `$HOME` wins when set (trailing slashes trimmed); otherwise the platform
    /// lookup is used.
    pub fn home_dir(&self) -> Option<PathBuf> {
        match self.get_var("HOME") {
            Some(home) if !home.is_empty() => {
                let trimmed = home.trim_end_matches('/');
                Some(PathBuf::from(if trimmed.is_empty() { "/" } else { trimmed }))
            }
            _ => dirs::home_dir(),
        }
    }

    /// Abbreviate the home directory prefix of `path` to `~`.
    ///
    /// A home of `/` is never abbreviated: it would only make paths longer.
    pub fn tilde_abbr(&self, path: &Path) -> String {
        let shown = path.to_string_lossy().into_owned();
        let Some(home) = self.home_dir() else {
            return shown;
        };
        let home = home.to_string_lossy();
        if home.is_empty() || home == "/" {
            return shown;
        }
        if shown == home {
            return "~".to_string();
        }
        match shown.strip_prefix(&format!("{home}/")) {
            Some(rest) => format!("~/{rest}"),
            None => shown,
        }
    }

    /// Expand a leading `~` or `~/` to the home directory.
    pub fn expand_tilde(&self, word: &str) -> String {
        let Some(rest) = word.strip_prefix('~') else {
            return word.to_string();
        };
        if !rest.is_empty() && !rest.starts_with('/') {
            return word.to_string();
        }
        match self.home_dir() {
            Some(home) => format!("{}{rest}", home.to_string_lossy()),
            None => word.to_string(),
        }
    }

    /// Working directory in the form shown by the prompt.
    pub fn prompt_cwd(&self) -> String {
        self.tilde_abbr(&self.current_dir)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_home(home: &str) -> Environment {
        let mut env = Environment::with_vars(HashMap::new(), PathBuf::from("/"));
        env.set_var("HOME", home);
        env
    }

    #[test]
    fn env_set_and_get_var() {
        let mut env = Environment::with_vars(HashMap::new(), stdenv::current_dir().unwrap());

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn home_trailing_slash_is_trimmed() {
        let env = env_with_home("/home/alice/");
        assert_eq!(env.home_dir(), Some(PathBuf::from("/home/alice")));
    }

    #[test]
    fn tilde_abbr_replaces_home_prefix() {
        let env = env_with_home("/home/alice");
        assert_eq!(env.tilde_abbr(Path::new("/home/alice")), "~");
        assert_eq!(env.tilde_abbr(Path::new("/home/alice/src/ash")), "~/src/ash");
        assert_eq!(env.tilde_abbr(Path::new("/home/alicette")), "/home/alicette");
        assert_eq!(env.tilde_abbr(Path::new("/etc")), "/etc");
    }

    #[test]
    fn root_home_is_never_abbreviated() {
        let env = env_with_home("/");
        assert_eq!(env.tilde_abbr(Path::new("/usr/bin")), "/usr/bin");
    }

    #[test]
    fn expand_tilde_only_touches_leading_tilde() {
        let env = env_with_home("/home/alice");
        assert_eq!(env.expand_tilde("~"), "/home/alice");
        assert_eq!(env.expand_tilde("~/notes.txt"), "/home/alice/notes.txt");
        assert_eq!(env.expand_tilde("~bob"), "~bob");
        assert_eq!(env.expand_tilde("a~b"), "a~b");
    }

    #[test]
    fn prompt_cwd_uses_abbreviation() {
        let mut env = env_with_home("/home/alice");
        env.current_dir = PathBuf::from("/home/alice/work");
        assert_eq!(env.prompt_cwd(), "~/work");
    }
}
