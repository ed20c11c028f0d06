use crate::cancel::Cancellation;
use crate::command::{CommandFactory, ExitCode, RunError, Stdin, Stdout};
use crate::env::Environment;
use crate::io_adapters::{InheritedStdin, MemReader, MemWriter};
use crate::lexer::WordPart;
use crate::parser::{self, AstNode, Connector, Parsed, ParsingError, RedirectKind, SimpleCommand, Word};
use crate::session::Engine;
use log::debug;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::rc::Rc;

/// Status reported for a command that could not be found.
const NOT_FOUND: ExitCode = 127;
/// Status recorded for a statement stopped by an interrupt.
const INTERRUPTED: ExitCode = 130;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only support commands defined in this crate: BuiltinCommand and ExternalCommand.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// A minimal shell-like interpreter that runs parsed statements.
///
/// The interpreter maintains an [`Environment`] and a list of [`CommandFactory`] objects
/// that are queried, in order, to create commands by name. See [`Default`] for the
/// factories included out of the box.
///
/// Example
/// ```
/// use ash::{Cancellation, Engine, Interpreter, Parsed};
/// let mut sh = Interpreter::default();
/// let output = sh.capture_output();
/// let Ok(Parsed::Complete(statements)) = sh.parse("echo hello world") else {
///     panic!("echo should parse");
/// };
/// for statement in statements {
///     sh.run(&Cancellation::new(), statement).unwrap();
/// }
/// assert_eq!(output.borrow().as_slice(), b"hello world\n");
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
    /// When set, standard output goes here and standard input is empty.
    capture: Option<Rc<RefCell<Vec<u8>>>>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            commands,
            capture: None,
        }
    }

    /// An interpreter with the default commands running in `env`.
    pub fn with_env(env: Environment) -> Self {
        Self {
            env,
            ..Self::default()
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Send all further standard output into the returned buffer instead of
    /// the terminal. Standard input becomes empty.
    pub fn capture_output(&mut self) -> Rc<RefCell<Vec<u8>>> {
        let buf = Rc::new(RefCell::new(Vec::new()));
        self.capture = Some(buf.clone());
        buf
    }

    fn stdin(&self) -> Box<dyn Stdin> {
        match self.capture {
            Some(_) => Box::new(MemReader::empty()),
            None => Box::new(InheritedStdin),
        }
    }

    fn stdout(&self) -> Box<dyn Stdout> {
        match &self.capture {
            Some(buf) => Box::new(MemWriter::from_handle(buf.clone())),
            None => Box::new(std::io::stdout()),
        }
    }

    fn execute_list(&mut self, nodes: &[AstNode], cancel: &Cancellation) -> Result<ExitCode, RunError> {
        let mut status = 0;
        for node in nodes {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            status = self.execute_node(node, cancel)?;
            self.env.last_status = status;
            if self.env.should_exit {
                break;
            }
        }
        Ok(status)
    }

    fn execute_node(&mut self, node: &AstNode, cancel: &Cancellation) -> Result<ExitCode, RunError> {
        match node {
            AstNode::Command(command) => {
                let (stdin, stdout) = (self.stdin(), self.stdout());
                self.execute_simple(command, stdin, stdout, cancel)
            }

            AstNode::Pipeline(stages) => self.execute_pipeline(stages, cancel),

            AstNode::AndOr { first, rest } => {
                let mut status = self.execute_node(first, cancel)?;
                for (connector, node) in rest {
                    if self.env.should_exit {
                        break;
                    }
                    self.env.last_status = status;
                    let wanted = match connector {
                        Connector::And => status == 0,
                        Connector::Or => status != 0,
                    };
                    if wanted {
                        if cancel.is_cancelled() {
                            return Err(RunError::Cancelled);
                        }
                        status = self.execute_node(node, cancel)?;
                    }
                }
                Ok(status)
            }

            AstNode::If {
                branches,
                else_branch,
            } => {
                for (condition, body) in branches {
                    let status = self.execute_list(condition, cancel)?;
                    if self.env.should_exit {
                        return Ok(status);
                    }
                    if status == 0 {
                        return self.execute_list(body, cancel);
                    }
                }
                match else_branch {
                    Some(body) => self.execute_list(body, cancel),
                    None => Ok(0),
                }
            }

            AstNode::Loop {
                until,
                condition,
                body,
            } => {
                let mut status = 0;
                loop {
                    if cancel.is_cancelled() {
                        return Err(RunError::Cancelled);
                    }
                    let tested = self.execute_list(condition, cancel)?;
                    if self.env.should_exit {
                        return Ok(tested);
                    }
                    if (tested == 0) == *until {
                        break;
                    }
                    status = self.execute_list(body, cancel)?;
                    if self.env.should_exit {
                        break;
                    }
                }
                Ok(status)
            }

            AstNode::For { var, items, body } => {
                let values = match items {
                    Some(words) => words
                        .iter()
                        .map(|word| self.expand_word(word))
                        .collect::<Result<Vec<_>, _>>()?,
                    None => Vec::new(),
                };
                let mut status = 0;
                for value in values {
                    if cancel.is_cancelled() {
                        return Err(RunError::Cancelled);
                    }
                    self.env.set_var(var.clone(), value);
                    status = self.execute_list(body, cancel)?;
                    if self.env.should_exit {
                        break;
                    }
                }
                Ok(status)
            }
        }
    }

    /// Stages are connected through in-memory buffers: each stage runs to
    /// completion before the next one starts.
    fn execute_pipeline(&mut self, stages: &[AstNode], cancel: &Cancellation) -> Result<ExitCode, RunError> {
        let mut input: Option<Vec<u8>> = None;
        let mut status = 0;

        for (i, stage) in stages.iter().enumerate() {
            let AstNode::Command(command) = stage else {
                return Err(RunError::Unsupported("compound command inside a pipeline"));
            };
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            let stdin: Box<dyn Stdin> = match input.take() {
                Some(buf) => Box::new(MemReader::new(buf)),
                None => self.stdin(),
            };
            if i + 1 == stages.len() {
                let stdout = self.stdout();
                status = self.execute_simple(command, stdin, stdout, cancel)?;
            } else {
                let (writer, handle) = MemWriter::with_handle();
                status = self.execute_simple(command, stdin, Box::new(writer), cancel)?;
                input = Some(handle.take());
            }
        }

        Ok(status)
    }

    fn execute_simple(
        &mut self,
        command: &SimpleCommand,
        mut stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
        cancel: &Cancellation,
    ) -> Result<ExitCode, RunError> {
        let argv = command
            .argv
            .iter()
            .map(|word| self.expand_word(word))
            .collect::<Result<Vec<_>, _>>()?;

        for redirect in &command.redirects {
            let target = self.expand_word(&redirect.target)?;
            let path = self.env.current_dir.join(&target);
            let opened = match redirect.kind {
                RedirectKind::Input => File::open(&path).map(|file| stdin = Box::new(file)),
                RedirectKind::Output => File::create(&path).map(|file| stdout = Box::new(file)),
                RedirectKind::Append => OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map(|file| stdout = Box::new(file)),
            };
            if let Err(err) = opened {
                eprintln!("ash: {target}: {err}");
                return Ok(1);
            }
        }

        let mut assigned = Vec::with_capacity(command.assignments.len());
        for assignment in &command.assignments {
            assigned.push((assignment.name.clone(), self.expand_word(&assignment.value)?));
        }

        let Some((name, args)) = argv.split_first() else {
            for (name, value) in assigned {
                self.env.set_var(name, value);
            }
            return Ok(0);
        };

        // Prefix assignments only last for this command.
        let saved: Vec<(String, Option<String>)> = assigned
            .into_iter()
            .map(|(key, value)| {
                let old = self.env.vars.insert(key.clone(), value);
                (key, old)
            })
            .collect();

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let found = self
            .commands
            .iter()
            .find_map(|factory| factory.try_create(&self.env, name, &args));
        let result = match found {
            Some(cmd) => {
                debug!("executing {name} {args:?}");
                cmd.execute(stdin, stdout, &mut self.env, cancel)
            }
            None => {
                eprintln!("ash: {name}: command not found");
                Ok(NOT_FOUND)
            }
        };

        for (key, old) in saved.into_iter().rev() {
            match old {
                Some(value) => self.env.vars.insert(key, value),
                None => self.env.vars.remove(&key),
            };
        }

        let status = result?;
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        Ok(status)
    }

    /// Expand parameters and a leading `~` in `word`. No field splitting or
    /// globbing happens: one word always yields one argument.
    fn expand_word(&self, word: &Word) -> Result<String, RunError> {
        let mut result = String::new();
        for (i, part) in word.0.iter().enumerate() {
            match part {
                WordPart::Literal(text) if i == 0 => result.push_str(&self.env.expand_tilde(text)),
                WordPart::Literal(text) | WordPart::Quoted(text) => result.push_str(text),
                WordPart::ParamSubst(name) if name == "?" => {
                    result.push_str(&self.env.last_status.to_string())
                }
                WordPart::ParamSubst(name) => {
                    // Unset variables expand to nothing.
                    if let Some(value) = self.env.get_var(name) {
                        result.push_str(&value);
                    }
                }
                WordPart::CmdSubst(_) => return Err(RunError::Unsupported("command substitution")),
            }
        }
        Ok(result)
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default set of commands:
    /// - built-ins: `pwd`, `cd`, `echo`, `exit`, `true`, `false`
    /// - external command launcher, consulted last
    fn default() -> Self {
        use crate::builtin::*;
        use crate::external::ExternalCommand;
        Self::new(vec![
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<True>::default()),
            Box::new(Factory::<False>::default()),
            Box::new(Factory::<ExternalCommand>::default()),
        ])
    }
}

impl Engine for Interpreter {
    type Statement = AstNode;

    fn parse(&mut self, source: &str) -> Result<Parsed, ParsingError> {
        parser::parse(source)
    }

    fn run(&mut self, cancel: &Cancellation, statement: AstNode) -> Result<(), RunError> {
        let result = if cancel.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            self.execute_node(&statement, cancel)
        };

        match result {
            Ok(0) => {
                self.env.last_status = 0;
                Ok(())
            }
            Ok(code) => {
                self.env.last_status = code;
                Err(RunError::ExitStatus(code))
            }
            Err(RunError::Cancelled) => {
                self.env.last_status = INTERRUPTED;
                Err(RunError::Cancelled)
            }
            Err(err) => {
                self.env.last_status = 1;
                Err(err)
            }
        }
    }

    fn exited(&self) -> bool {
        self.env.should_exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::thread;
    use std::time::Duration;

    struct Fixture {
        sh: Interpreter,
        out: Rc<RefCell<Vec<u8>>>,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut vars = HashMap::new();
        vars.insert("PATH".to_string(), "/bin:/usr/bin".to_string());
        vars.insert("HOME".to_string(), "/home/tester".to_string());
        let mut sh = Interpreter::with_env(Environment::with_vars(vars, dir.path().to_path_buf()));
        let out = sh.capture_output();
        Fixture { sh, out, dir }
    }

    impl Fixture {
        /// Run every statement of `source`, returning the result of the last one.
        fn run(&mut self, source: &str) -> Result<(), RunError> {
            self.run_with(source, &Cancellation::new())
        }

        fn run_with(&mut self, source: &str, cancel: &Cancellation) -> Result<(), RunError> {
            let Ok(Parsed::Complete(statements)) = self.sh.parse(source) else {
                panic!("{source:?} should parse");
            };
            let mut last = Ok(());
            for statement in statements {
                last = self.sh.run(cancel, statement);
                if self.sh.exited() {
                    break;
                }
            }
            last
        }

        fn output(&self) -> String {
            String::from_utf8(self.out.borrow().clone()).expect("utf-8 output")
        }

        fn path(&self, name: &str) -> std::path::PathBuf {
            self.dir.path().join(name)
        }
    }

    #[test]
    fn echo_expands_variables_and_status() {
        let mut f = fixture();
        f.run("greeting=hello").unwrap();
        f.run("echo $greeting \"${greeting} there\" '$greeting' ~ ~/x").unwrap();
        assert!(f.run("false").is_err());
        f.run("echo $?").unwrap();
        assert_eq!(
            f.output(),
            "hello hello there $greeting /home/tester /home/tester/x\n1\n"
        );
    }

    #[test]
    fn status_is_reported_as_error() {
        let mut f = fixture();
        assert!(f.run("true").is_ok());
        assert!(matches!(f.run("false"), Err(RunError::ExitStatus(1))));
        assert_eq!(f.sh.env().last_status, 1);
    }

    #[test]
    fn unknown_command_is_127() {
        let mut f = fixture();
        let result = f.run("definitely-not-a-command-4711");
        assert!(matches!(result, Err(RunError::ExitStatus(127))));
    }

    #[test]
    fn and_or_short_circuit() {
        let mut f = fixture();
        f.run("true && echo one || echo two").unwrap();
        f.run("false && echo three || echo four").unwrap();
        assert_eq!(f.output(), "one\nfour\n");
    }

    #[test]
    fn if_elif_else_branches() {
        let mut f = fixture();
        f.run("if false; then echo a; elif true; then echo b; else echo c; fi")
            .unwrap();
        f.run("if false; then echo a; else echo c; fi").unwrap();
        assert_eq!(f.output(), "b\nc\n");
    }

    #[test]
    fn for_and_while_loops() {
        let mut f = fixture();
        f.run("for x in 1 2 3; do echo -n $x; done").unwrap();
        f.run("while false; do echo never; done").unwrap();
        f.run("until true; do echo never; done").unwrap();
        assert_eq!(f.output(), "123");
    }

    #[test]
    fn prefix_assignments_are_temporary() {
        let mut f = fixture();
        f.run("ASH_PREFIX_ONLY=1 true").unwrap();
        f.run("echo \"[$ASH_PREFIX_ONLY]\"").unwrap();
        assert_eq!(f.output(), "[]\n");
    }

    #[test]
    fn output_redirection_truncates_and_appends() {
        let mut f = fixture();
        f.run("echo first > out.txt").unwrap();
        f.run("echo second >> out.txt").unwrap();
        assert_eq!(fs::read_to_string(f.path("out.txt")).unwrap(), "first\nsecond\n");
        f.run("echo third > out.txt").unwrap();
        assert_eq!(fs::read_to_string(f.path("out.txt")).unwrap(), "third\n");
        assert_eq!(f.output(), "");
    }

    #[test]
    fn missing_input_file_fails_the_command() {
        let mut f = fixture();
        assert!(matches!(
            f.run("echo hi < missing.txt"),
            Err(RunError::ExitStatus(1))
        ));
        assert_eq!(f.output(), "");
    }

    #[test]
    #[cfg(unix)]
    fn pipelines_connect_builtins_and_programs() {
        let mut f = fixture();
        f.run("echo hello | tr a-z A-Z").unwrap();
        fs::write(f.path("in.txt"), "abc\n").unwrap();
        f.run("tr a-z A-Z < in.txt | tr A-C x-z").unwrap();
        assert_eq!(f.output(), "HELLO\nxyz\n");
    }

    #[test]
    fn command_substitution_is_rejected() {
        let mut f = fixture();
        assert!(matches!(
            f.run("echo $(date)"),
            Err(RunError::Unsupported(_))
        ));
    }

    #[test]
    fn exit_stops_the_list_and_marks_the_engine() {
        let mut f = fixture();
        let result = f.run("echo before; exit 4; echo after");
        assert!(matches!(result, Err(RunError::ExitStatus(4))));
        assert!(f.sh.exited());
        assert_eq!(f.output(), "before\n");
    }

    #[test]
    fn cancelled_token_stops_before_running() {
        let mut f = fixture();
        let cancel = Cancellation::new();
        cancel.cancel();
        assert!(matches!(
            f.run_with("echo nope", &cancel),
            Err(RunError::Cancelled)
        ));
        assert_eq!(f.sh.env().last_status, 130);
        assert_eq!(f.output(), "");
    }

    #[test]
    fn infinite_loop_is_interruptible() {
        let mut f = fixture();
        let cancel = Cancellation::new();
        let remote = cancel.clone();
        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        let result = f.run_with("while true; do true; done", &cancel);
        trigger.join().unwrap();
        assert!(matches!(result, Err(RunError::Cancelled)));
    }

    #[test]
    fn cd_changes_the_directory_used_for_redirects() {
        let _lock = crate::env::test_support::lock_current_dir();
        let orig = std::env::current_dir().unwrap();
        let mut f = fixture();
        fs::create_dir(f.path("sub")).unwrap();
        f.run("cd sub").unwrap();
        f.run("echo inside > note.txt").unwrap();
        std::env::set_current_dir(orig).unwrap();

        let note = fs::canonicalize(f.path("sub")).unwrap().join("note.txt");
        assert!(Path::new(&note).exists());
    }
}
