//! Terminal line editing on top of `rustyline`.
//!
//! [`AshHelper`] plugs the highlighter, the continuation detector and
//! command-name completion into the editor; [`ReadlineEditor`] adapts the
//! editor to [`LineEditor`] and owns the history file.

use crate::builtin::BUILTIN_NAMES;
use crate::config::{self, EditingMode, EditorSettings};
use crate::continuation;
use crate::env::Environment;
use crate::exe::SearchPath;
use crate::highlight::render;
use crate::session::{EditorError, LineEditor, PromptKind, ReadOutcome};
use log::{debug, info, warn};
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{CompletionType, Config, Context, EditMode, Editor, Helper};
use std::borrow::Cow;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

const CONTINUATION_PROMPT: &str = "> ";

/// Words after which the next word names a command again.
const COMMAND_KEYWORDS: &[&str] = &["if", "then", "elif", "else", "while", "until", "do"];

/// Editor hooks: highlighting, validation, completion and hints.
pub struct AshHelper {
    index: Arc<SearchPath>,
    files: FilenameCompleter,
    autocomplete: bool,
}

impl AshHelper {
    pub fn new(index: Arc<SearchPath>, autocomplete: bool) -> Self {
        Self {
            index,
            files: FilenameCompleter::new(),
            autocomplete,
        }
    }

    /// Builtins and indexed programs starting with `prefix`, sorted and
    /// without duplicates.
    pub fn command_candidates(&self, prefix: &str) -> Vec<String> {
        let mut found: Vec<String> = self
            .index
            .complete(prefix)
            .into_iter()
            .chain(BUILTIN_NAMES.iter().copied().filter(|b| b.starts_with(prefix)))
            .map(str::to_string)
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Dim suggestion for the rest of the command name being typed at the
    /// end of the line.
    pub fn command_hint(&self, line: &str, pos: usize) -> Option<String> {
        if !self.autocomplete || pos != line.len() {
            return None;
        }
        let (start, word) = current_word(line, pos);
        if word.is_empty() || !is_command_position(&line[..start]) {
            return None;
        }
        self.command_candidates(word)
            .into_iter()
            .find(|name| name.len() > word.len())
            .map(|name| name[word.len()..].to_string())
    }
}

/// Start offset and text of the word under the cursor.
fn current_word(line: &str, pos: usize) -> (usize, &str) {
    let before = &line[..pos];
    let start = before
        .rfind(|c: char| c.is_whitespace() || matches!(c, '|' | ';' | '&' | '('))
        .map(|i| i + 1)
        .unwrap_or(0);
    (start, &before[start..])
}

/// Whether a word following `before` is in command position.
fn is_command_position(before: &str) -> bool {
    let before = before.trim_end();
    if before.is_empty() || before.ends_with(['|', ';', '&', '(']) {
        return true;
    }
    let last = before
        .rsplit(|c: char| c.is_whitespace())
        .next()
        .unwrap_or_default();
    COMMAND_KEYWORDS.contains(&last)
}

impl Completer for AshHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, word) = current_word(line, pos);
        if !is_command_position(&line[..start]) || word.contains('/') {
            return self.files.complete_path(line, pos);
        }
        let candidates = self
            .command_candidates(word)
            .into_iter()
            .map(|name| Pair {
                display: name.clone(),
                replacement: name,
            })
            .collect();
        Ok((start, candidates))
    }
}

impl Hinter for AshHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        self.command_hint(line, pos)
    }
}

impl Highlighter for AshHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let styled = render(line, &self.index);
        if styled.is_plain() {
            Cow::Borrowed(line)
        } else {
            Cow::Owned(styled.to_ansi())
        }
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{hint}\x1b[0m"))
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

impl Validator for AshHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        if continuation::is_complete(ctx.input()) {
            Ok(ValidationResult::Valid(None))
        } else {
            Ok(ValidationResult::Incomplete)
        }
    }
}

impl Helper for AshHelper {}

type PromptFn = Box<dyn Fn() -> String>;

/// Prompt callbacks, evaluated before every primary read.
pub struct Prompt {
    pub left: PromptFn,
    pub right: Option<PromptFn>,
}

impl Default for Prompt {
    fn default() -> Self {
        Self {
            left: Box::new(default_left_prompt),
            right: Some(Box::new(|| chrono::Local::now().format("%H:%M").to_string())),
        }
    }
}

fn default_left_prompt() -> String {
    left_prompt(&Environment::new())
}

/// `user@host dir $ ` with the directory abbreviated against `$HOME`.
fn left_prompt(env: &Environment) -> String {
    let user = env
        .get_var("USER")
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "user".to_string());
    let host = env
        .get_var("HOSTNAME")
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
        })
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    format!("\x1b[32m{user}@{host} \x1b[34m{} $\x1b[0m ", env.prompt_cwd())
}

/// Escape sequence drawing `text` against the right edge of the current
/// row, leaving the cursor where it was.
fn right_aligned(text: &str) -> String {
    format!("\x1b7\x1b[999C\x1b[{}D{text}\x1b8", text.chars().count().saturating_sub(1))
}

fn rustyline_config(settings: &EditorSettings) -> Result<Config, EditorError> {
    let edit_mode = match settings.editing_mode {
        EditingMode::Vi => EditMode::Vi,
        EditingMode::Emacs => EditMode::Emacs,
    };
    let bell_style = match settings.bell_style {
        config::BellStyle::None => rustyline::config::BellStyle::None,
        config::BellStyle::Audible => rustyline::config::BellStyle::Audible,
        config::BellStyle::Visible => rustyline::config::BellStyle::Visible,
    };
    Ok(Config::builder()
        .edit_mode(edit_mode)
        .completion_type(CompletionType::List)
        .keyseq_timeout(Some(settings.keyseq_timeout_ms))
        .max_history_size(settings.history_size)?
        .bell_style(bell_style)
        .auto_add_history(false)
        .build())
}

/// [`LineEditor`] reading from the terminal.
pub struct ReadlineEditor {
    editor: Editor<AshHelper, DefaultHistory>,
    prompt: Prompt,
    history: PathBuf,
}

impl ReadlineEditor {
    /// Set up the terminal editor and load the history file. A missing
    /// history file is fine.
    pub fn new(
        settings: &EditorSettings,
        index: Arc<SearchPath>,
        history: PathBuf,
    ) -> Result<Self, EditorError> {
        let mut editor = Editor::with_config(rustyline_config(settings)?)?;
        editor.set_helper(Some(AshHelper::new(index, settings.autocomplete)));

        match editor.load_history(&history) {
            Ok(()) => info!("loaded history from {}", history.display()),
            Err(ReadlineError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                info!("no history at {}", history.display())
            }
            Err(err) => warn!("cannot load history from {}: {}", history.display(), err),
        }

        Ok(Self {
            editor,
            prompt: Prompt::default(),
            history,
        })
    }
}

impl LineEditor for ReadlineEditor {
    fn read_line(&mut self, kind: PromptKind) -> Result<ReadOutcome, EditorError> {
        let prompt = match kind {
            PromptKind::Primary => {
                if let Some(right) = &self.prompt.right {
                    let mut stdout = io::stdout();
                    write!(stdout, "{}", right_aligned(&right()))?;
                    stdout.flush()?;
                }
                (self.prompt.left)()
            }
            PromptKind::Continuation => CONTINUATION_PROMPT.to_string(),
        };

        match self.editor.readline(&prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.editor.add_history_entry(line.as_str())?;
                }
                Ok(ReadOutcome::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(err) => Err(err.into()),
        }
    }

    fn finish(&mut self) {
        match self.editor.save_history(&self.history) {
            Ok(()) => debug!("saved history to {}", self.history.display()),
            Err(err) => warn!("cannot save history to {}: {}", self.history.display(), err),
        }
    }
}
