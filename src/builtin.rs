use crate::cancel::Cancellation;
use crate::command::{CommandFactory, ExecutableCommand, ExitCode, RunError, Stdin, Stdout};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

/// Names of all builtins, for completion.
pub(crate) const BUILTIN_NAMES: &[&str] = &["cd", "echo", "exit", "false", "pwd", "true"];

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        mut stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
        env: &mut Environment,
        _cancel: &Cancellation,
    ) -> Result<ExitCode, RunError> {
        let code = match <T as BuiltinCommand>::execute(*self, &mut stdin, &mut stdout, env) {
            Ok(x) => x,
            Err(e) => {
                eprintln!("{}: {:#}", T::name(), e);
                1
            }
        };
        stdout.flush()?;
        Ok(code)
    }
}

/// Stands in for a builtin whose arguments did not parse, or that was asked
/// for `--help`.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
        _env: &mut Environment,
        _cancel: &Cancellation,
    ) -> Result<ExitCode, RunError> {
        if self.is_error {
            eprintln!("{}", self.output.trim_end());
            Ok(2)
        } else {
            stdout.write_all(self.output.as_bytes())?;
            stdout.flush()?;
            Ok(0)
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the home directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute, relative to the current directory, or starting with `~`.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(env.expand_tilde(t)),
            _ => match env.home_dir() {
                Some(home) => home,
                None => bail!("no target and no home directory"),
            },
        };

        let new_dir = env.current_dir.join(target);
        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("{}", new_dir.display()))?;
        if !canonical.is_dir() {
            bail!("{}: not a directory", new_dir.display());
        }

        env::set_current_dir(&canonical)
            .with_context(|| format!("can't chdir to {}", canonical.display()))?;
        env.set_var("PWD", canonical.to_string_lossy());
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Leave the shell with the given status, or the status of the last command.
pub struct Exit {
    #[argh(positional)]
    /// exit status; only the low 8 bits are kept.
    pub code: Option<i32>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(self.code.unwrap_or(env.last_status) & 0xff)
    }
}

#[derive(FromArgs)]
/// write the arguments to standard output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Do nothing, successfully.
pub struct True {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl BuiltinCommand for True {
    fn name() -> &'static str {
        "true"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Do nothing, unsuccessfully.
pub struct False {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl BuiltinCommand for False {
    fn name() -> &'static str {
        "false"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        Ok(1)
    }
}
