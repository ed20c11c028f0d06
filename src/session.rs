//! The read, accumulate, dispatch loop of an interactive session.
//!
//! [`Session`] is generic over the line editor and the statement engine so
//! it can be driven by a terminal ([`crate::editor::ReadlineEditor`]) and the
//! [`crate::Interpreter`], or by scripted stand-ins in tests.

use crate::cancel::Cancellation;
use crate::command::{ExitCode, RunError};
use crate::continuation::{self, Continuation};
use crate::parser::{Parsed, ParsingError};
use log::{debug, info, warn};
use rustyline::error::ReadlineError;
use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Which prompt the editor should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Nothing is pending.
    Primary,
    /// Earlier lines are waiting for the rest of a statement.
    Continuation,
}

/// Result of one read from the line editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// The user pressed Ctrl-C while editing.
    Interrupted,
    /// The input is exhausted (Ctrl-D on an empty line).
    Eof,
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error(transparent)]
    Readline(#[from] ReadlineError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Source of input lines.
pub trait LineEditor {
    /// Block until the user submits a line.
    fn read_line(&mut self, kind: PromptKind) -> Result<ReadOutcome, EditorError>;

    /// Called once when the session ends, e.g. to persist history.
    fn finish(&mut self) {}
}

/// Parses and runs statements on behalf of a session.
pub trait Engine {
    type Statement: Debug;

    /// Parse `source`, or report that it needs more lines.
    fn parse(&mut self, source: &str) -> Result<Parsed<Self::Statement>, ParsingError>;

    /// Run one statement. A non-zero status comes back as
    /// [`RunError::ExitStatus`]; the statement must stop early once `cancel`
    /// trips.
    fn run(&mut self, cancel: &Cancellation, statement: Self::Statement) -> Result<(), RunError>;

    /// Whether a statement asked to end the session.
    fn exited(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    /// An interrupt arrived and the running statement has not stopped yet.
    Cancelling,
    Exited(ExitCode),
}

/// An interactive session: owns the editor, the engine and the pending input.
///
/// Pending lines are kept until they form complete statements. The
/// cancellation token is shared with the interrupt listener and re-armed
/// before every statement.
pub struct Session<E, G> {
    editor: E,
    engine: G,
    cancel: Cancellation,
    buffer: Vec<String>,
    dispatching: bool,
    exit: Option<ExitCode>,
}

impl<E: LineEditor, G: Engine> Session<E, G> {
    pub fn new(editor: E, engine: G, cancel: Cancellation) -> Self {
        Self {
            editor,
            engine,
            cancel,
            buffer: Vec::new(),
            dispatching: false,
            exit: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self.exit {
            Some(code) => SessionStatus::Exited(code),
            None if self.dispatching && self.cancel.is_cancelled() => SessionStatus::Cancelling,
            None => SessionStatus::Running,
        }
    }

    /// Lines read so far that do not yet form complete statements.
    pub fn buffer(&self) -> &[String] {
        &self.buffer
    }

    pub fn engine(&self) -> &G {
        &self.engine
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    /// Read one line and act on it. Returns the exit code once the session
    /// is over.
    pub fn step(&mut self) -> Result<Option<ExitCode>, EditorError> {
        if let Some(code) = self.exit {
            return Ok(Some(code));
        }

        let kind = if self.buffer.is_empty() {
            PromptKind::Primary
        } else {
            PromptKind::Continuation
        };

        let line = match self.editor.read_line(kind)? {
            ReadOutcome::Line(line) => line,
            ReadOutcome::Interrupted => {
                debug!("interrupt at the prompt, {} pending lines kept", self.buffer.len());
                return Ok(None);
            }
            ReadOutcome::Eof => {
                info!("end of input");
                self.exit = Some(0);
                return Ok(self.exit);
            }
        };

        self.buffer.push(line);
        let source = self.buffer.join("\n");

        let waiting_for = continuation::scan(&source);
        if waiting_for != Continuation::Complete {
            debug!("waiting for more input: {waiting_for:?}");
            return Ok(None);
        }

        match self.engine.parse(&source) {
            Ok(Parsed::Incomplete) => {
                debug!("waiting for more input: unfinished statement");
                return Ok(None);
            }
            Ok(Parsed::Complete(statements)) => {
                self.buffer.clear();
                self.dispatch(statements);
            }
            Err(err) => {
                self.buffer.clear();
                warn!("parse error: {err}");
                eprintln!("ash: {err}");
            }
        }

        Ok(self.exit)
    }

    /// Run until end of input or until a statement ends the session.
    pub fn run(&mut self) -> Result<ExitCode, EditorError> {
        info!("session started");
        let result = loop {
            match self.step() {
                Ok(Some(code)) => break Ok(code),
                Ok(None) => {}
                Err(err) => break Err(err),
            }
        };
        self.finish();
        info!("session ended: {result:?}");
        result
    }

    /// Let the editor persist its state. [`Session::run`] does this itself.
    pub fn finish(&mut self) {
        self.editor.finish();
    }

    /// Parse and run `source` as a whole, outside the prompt loop.
    ///
    /// Returns the exit code if the script ended the session.
    pub fn run_script(&mut self, source: &str) -> Option<ExitCode> {
        match self.engine.parse(source) {
            Ok(Parsed::Complete(statements)) => self.dispatch(statements),
            Ok(Parsed::Incomplete) => {
                warn!("script ends inside an unfinished statement");
                eprintln!("ash: unexpected end of script");
            }
            Err(err) => {
                warn!("script parse error: {err}");
                eprintln!("ash: {err}");
            }
        }
        self.exit
    }

    /// Run the script at `path`. A missing file is not an error.
    pub fn source_file(&mut self, path: &Path) -> Option<ExitCode> {
        match fs::read_to_string(path) {
            Ok(source) => {
                info!("running {}", path.display());
                self.run_script(&source)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("no {}, skipping", path.display());
                None
            }
            Err(err) => {
                warn!("cannot read {}: {}", path.display(), err);
                None
            }
        }
    }

    fn dispatch(&mut self, statements: Vec<G::Statement>) {
        self.dispatching = true;
        for statement in statements {
            self.cancel.rearm();
            debug!("dispatching {statement:?}");
            let result = self.engine.run(&self.cancel, statement);

            match &result {
                Ok(()) => {}
                Err(RunError::ExitStatus(code)) => debug!("exit status {code}"),
                Err(RunError::Cancelled) => info!("statement interrupted"),
                Err(err) => {
                    warn!("statement failed: {err}");
                    eprintln!("ash: {err}");
                }
            }

            if self.engine.exited() {
                let code = result.err().and_then(|err| err.exit_status()).unwrap_or(0);
                info!("exit requested with status {code}");
                self.exit = Some(code);
                break;
            }
            if self.cancel.is_cancelled() {
                debug!("dropping the rest of the input after an interrupt");
                break;
            }
        }
        self.dispatching = false;
    }
}
