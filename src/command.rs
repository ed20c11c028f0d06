use crate::cancel::Cancellation;
use crate::env::Environment;
use std::fs::File;
use std::io::{self, Read, Write};
use std::process::Stdio;
use thiserror::Error;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Errors produced while running a statement.
///
/// A non-zero status is reported as [`RunError::ExitStatus`] so the session can
/// tell an ordinary failing command from a broken one.
#[derive(Debug, Error)]
pub enum RunError {
    /// The statement finished with a non-zero status.
    #[error("exit status {0}")]
    ExitStatus(ExitCode),
    /// The statement was interrupted before it finished.
    #[error("interrupted")]
    Cancelled,
    /// An external program could not be started.
    #[error("{name}: {source}")]
    Spawn { name: String, source: io::Error },
    /// The statement uses a construct this interpreter does not run.
    #[error("{0} is not supported")]
    Unsupported(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RunError {
    /// Extract the exit status carried by a terminal error, if any.
    pub fn exit_status(&self) -> Option<ExitCode> {
        match self {
            RunError::ExitStatus(code) => Some(*code),
            _ => None,
        }
    }
}

/// Abstraction over a readable input stream that may be handed to a child process.
///
/// Real file descriptors return `Some` from [`Stdin::stdio`]; memory-backed
/// streams return `None` and are fed to the child through a pipe instead.
pub trait Stdin: Read {
    /// A [`Stdio`] handle for `std::process::Command`, if this stream has one.
    fn stdio(&mut self) -> Option<Stdio>;
}

/// Abstraction over a writable output stream that may be handed to a child process.
///
/// See [`Stdin`] for the meaning of `None`.
pub trait Stdout: Write {
    /// A [`Stdio`] handle for `std::process::Command`, if this stream has one.
    fn stdio(&mut self) -> Option<Stdio>;
}

impl Stdin for File {
    fn stdio(&mut self) -> Option<Stdio> {
        self.try_clone().ok().map(Stdio::from)
    }
}

impl Stdout for File {
    fn stdio(&mut self) -> Option<Stdio> {
        self.try_clone().ok().map(Stdio::from)
    }
}

impl Stdout for io::Stdout {
    fn stdio(&mut self) -> Option<Stdio> {
        Some(Stdio::inherit())
    }
}

/// Object-safe trait for any command that can be executed by the shell.
///
/// This is implemented by built-ins via a blanket impl and by external commands.
pub trait ExecutableCommand {
    /// Executes the command, observing `cancel` while it runs.
    fn execute(
        self: Box<Self>,
        stdin: Box<dyn Stdin>,
        stdout: Box<dyn Stdout>,
        env: &mut Environment,
        cancel: &Cancellation,
    ) -> Result<ExitCode, RunError>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
/// Implementations can use the environment to resolve executables (e.g., using PATH).
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;
}
