use crate::cancel::Cancellation;
use crate::command::{CommandFactory, ExecutableCommand, ExitCode, RunError, Stdin, Stdout};
use crate::env::Environment;
use crate::exe::{is_exec_any, mode_of};
use crate::interpreter::Factory;
use log::debug;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often a running child is checked for exit or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Command that is not a builtin.
pub struct ExternalCommand {
    name: String,
    path: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(name: impl Into<String>, path: PathBuf, args: Vec<OsString>) -> Self {
        Self {
            name: name.into(),
            path,
            args,
        }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let executable = find_command_path(
            OsStr::new(&search_paths),
            &env.current_dir,
            Path::new(name),
        )?;
        Some(Box::new(ExternalCommand::new(
            name,
            executable,
            args.iter().map(OsString::from).collect(),
        )))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        mut stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
        env: &mut Environment,
        cancel: &Cancellation,
    ) -> Result<ExitCode, RunError> {
        // Memory-backed input is read up front and fed through a pipe.
        let (stdin_stdio, input) = match stdin.stdio() {
            Some(stdio) => (stdio, None),
            None => {
                let mut input = Vec::new();
                stdin.read_to_end(&mut input)?;
                (Stdio::piped(), Some(input))
            }
        };
        let (stdout_stdio, capture) = match stdout.stdio() {
            Some(stdio) => (stdio, false),
            None => (Stdio::piped(), true),
        };

        let mut child = std::process::Command::new(&self.path)
            .args(&self.args)
            .stdin(stdin_stdio)
            .stdout(stdout_stdio)
            .env_clear()
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir)
            .spawn()
            .map_err(|source| RunError::Spawn {
                name: self.name.clone(),
                source,
            })?;
        debug!("spawned {} as pid {}", self.path.display(), child.id());

        let feeder = match (input, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => Some(thread::spawn(move || {
                // The child may exit without reading everything.
                let _ = pipe.write_all(&input);
            })),
            _ => None,
        };
        let collector: Option<JoinHandle<io::Result<Vec<u8>>>> = match child.stdout.take() {
            Some(mut pipe) if capture => Some(thread::spawn(move || {
                let mut out = Vec::new();
                pipe.read_to_end(&mut out)?;
                Ok(out)
            })),
            _ => None,
        };

        let status = wait_or_kill(&mut child, cancel, &self.name)?;

        if let Some(feeder) = feeder {
            let _ = feeder.join();
        }
        if let Some(collector) = collector {
            let output = collector
                .join()
                .map_err(|_| io::Error::other("output collector panicked"))??;
            stdout.write_all(&output)?;
        }
        stdout.flush()?;

        Ok(match status.code() {
            Some(code) => code,
            None => terminated_by_signal(status),
        })
    }
}

/// Wait for `child`, killing it if `cancel` trips first.
fn wait_or_kill(
    child: &mut Child,
    cancel: &Cancellation,
    name: &str,
) -> Result<ExitStatus, RunError> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if cancel.is_cancelled() {
            debug!("killing {name} (pid {})", child.id());
            // Fails only if the child already exited, which the wait reaps.
            let _ = child.kill();
            let _ = child.wait();
            return Err(RunError::Cancelled);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is an executable file.
/// - Any path with a separator (`bin/sh`, `./foo`): resolved against `cwd`.
/// - Single path component: search each directory in `search_paths` (PATH)
///   and return the first executable match. Empty entries mean `cwd`.
/// - Empty path: returns `None`.
pub fn find_command_path(search_paths: &OsStr, cwd: &Path, path: &Path) -> Option<PathBuf> {
    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(single), None) if !path.is_absolute() => {
            find_in_path(search_paths, cwd, single.as_os_str())
        }
        _ => find_by_path(&cwd.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cwd: &Path, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| cwd.join(dir).join(cmd))
        .find_map(|candidate| find_by_path(&candidate))
}

fn find_by_path(path: &Path) -> Option<PathBuf> {
    let metadata = fs::metadata(path).ok()?;
    if metadata.is_file() && is_exec_any(mode_of(&metadata)) {
        Some(path.to_path_buf())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::{MemReader, MemWriter};
    use std::collections::HashMap;
    use std::fs::File;
    use std::time::Instant;

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    fn sh_env(cwd: &Path) -> Environment {
        let mut vars = HashMap::new();
        vars.insert("PATH".to_string(), "/bin:/usr/bin".to_string());
        Environment::with_vars(vars, cwd.to_path_buf())
    }

    fn sh(script: &str) -> Box<ExternalCommand> {
        Box::new(ExternalCommand::new(
            "sh",
            PathBuf::from("/bin/sh"),
            vec!["-c".into(), script.into()],
        ))
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/bin"), Path::new("/"), path);
        assert_eq!(found.as_deref(), Some(path));
    }

    #[test]
    #[cfg(unix)]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        assert!(find_command_path(osstr("/bin"), Path::new("/"), path).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nowhere:/bin"), Path::new("/"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found, PathBuf::from("/bin/sh"));
    }

    #[test]
    #[cfg(unix)]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("/"), Path::new("nonexisting"));
        assert!(res.is_none(), "Expected not to find 'nonexisting' in PATH");
    }

    #[test]
    #[cfg(unix)]
    fn relative_paths_resolve_against_the_shell_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("bin")).expect("create bin dir");
        let tool = tmp.path().join("bin").join("tool");
        File::create(&tool).expect("touch bin/tool");
        make_executable(&tool);

        let found = find_command_path(osstr("/does/not/matter"), tmp.path(), Path::new("bin/tool"));
        assert_eq!(found, Some(tool.clone()));

        let dotted = find_command_path(osstr(""), &tmp.path().join("bin"), Path::new("./tool"));
        assert!(dotted.is_some_and(|p| p.ends_with("tool")));
    }

    #[test]
    #[cfg(unix)]
    fn empty_path_entry_means_current_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let tool = tmp.path().join("tool");
        File::create(&tool).expect("touch tool");
        make_executable(&tool);

        let found = find_command_path(osstr(":/bin"), tmp.path(), Path::new("tool"));
        assert_eq!(found, Some(tool));
    }

    #[test]
    #[cfg(unix)]
    fn non_executable_files_are_not_commands() {
        let tmp = tempfile::tempdir().expect("tempdir");
        File::create(tmp.path().join("notes")).expect("touch notes");
        let res = find_command_path(osstr(""), tmp.path(), Path::new("notes"));
        assert!(res.is_none());
    }

    #[test]
    fn empty_path_is_none() {
        let res = find_command_path(osstr("/bin"), Path::new("/"), Path::new(""));
        assert!(res.is_none(), "Empty path should not resolve to anything");
    }

    #[test]
    #[cfg(unix)]
    fn memory_streams_are_piped_through_the_child() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut env = sh_env(tmp.path());
        let (out, handle) = MemWriter::with_handle();
        let code = sh("tr a-z A-Z")
            .execute(
                Box::new(MemReader::new(b"hello".to_vec())),
                Box::new(out),
                &mut env,
                &Cancellation::new(),
            )
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(handle.borrow().as_slice(), b"HELLO");
    }

    #[test]
    #[cfg(unix)]
    fn exit_code_and_signal_death() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut env = sh_env(tmp.path());
        let run = |cmd: Box<ExternalCommand>, env: &mut Environment| {
            cmd.execute(
                Box::new(MemReader::empty()),
                Box::new(MemWriter::new()),
                env,
                &Cancellation::new(),
            )
            .unwrap()
        };
        assert_eq!(run(sh("exit 3"), &mut env), 3);
        assert_eq!(run(sh("kill -9 $$"), &mut env), 128 + 9);
    }

    #[test]
    #[cfg(unix)]
    fn cancellation_kills_the_child() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut env = sh_env(tmp.path());
        let cancel = Cancellation::new();
        let remote = cancel.clone();
        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            remote.cancel();
        });

        let started = Instant::now();
        let result = sh("sleep 10").execute(
            Box::new(MemReader::empty()),
            Box::new(MemWriter::new()),
            &mut env,
            &cancel,
        );
        trigger.join().unwrap();

        assert!(matches!(result, Err(RunError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn spawn_failure_names_the_command() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut env = sh_env(tmp.path());
        let cmd = Box::new(ExternalCommand::new(
            "ghost",
            tmp.path().join("ghost"),
            Vec::new(),
        ));
        let err = cmd
            .execute(
                Box::new(MemReader::empty()),
                Box::new(MemWriter::new()),
                &mut env,
                &Cancellation::new(),
            )
            .unwrap_err();
        assert!(matches!(err, RunError::Spawn { ref name, .. } if name == "ghost"));
    }
}
