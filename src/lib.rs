//! `ash`, a small interactive shell.
//!
//! The crate is split along the path a line takes through the shell:
//!
//! - [`editor`] reads it from the terminal, highlighting it with
//!   [`highlight`] and completing names from the [`exe`] index;
//! - [`session`] collects lines until [`continuation`] and the [`parser`]
//!   agree the text is complete, then hands statements to an [`Engine`];
//! - [`Interpreter`] is the engine: it runs builtins and external programs
//!   and stops early when the shared [`Cancellation`] trips on Ctrl-C.
//!
//! The public modules [`command`] and [`env`] expose traits and types for
//! implementing your own commands and for interacting with the shell's
//! variables.

mod builtin;
pub mod cancel;
pub mod command;
pub mod config;
pub mod continuation;
pub mod editor;
pub mod env;
pub mod exe;
mod external;
pub mod highlight;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod parser;
pub mod session;

/// The statement engine used by the `ash` binary.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;

pub use cancel::{Cancellation, listen_for_interrupts};
pub use config::{EditorSettings, SessionPaths};
pub use editor::ReadlineEditor;
pub use exe::SearchPath;
pub use highlight::{StyledLine, render};
pub use parser::Parsed;
pub use session::{Engine, LineEditor, Session, SessionStatus};
