//! Decides whether typed text is ready to run or needs another line.
//!
//! Only quotes and escapes are tracked here. Block structure (`if ... fi`)
//! is left to the parser, which the session consults afterwards.

/// Outcome of scanning the text typed so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Ready to execute.
    Complete,
    /// A single or double quote is still open.
    Quote,
    /// The text ends in an unescaped backslash.
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    InSingleQuote,
    InDoubleQuote,
    /// The next character is taken literally. `in_double` records the quote
    /// context to return to.
    EscapePending { in_double: bool },
}

/// Scan `text` from scratch and classify it.
pub fn scan(text: &str) -> Continuation {
    let mut state = ScanState::Normal;

    for ch in text.chars() {
        state = match (state, ch) {
            (ScanState::EscapePending { in_double: true }, _) => ScanState::InDoubleQuote,
            (ScanState::EscapePending { in_double: false }, _) => ScanState::Normal,
            (ScanState::Normal, '\\') => ScanState::EscapePending { in_double: false },
            (ScanState::Normal, '\'') => ScanState::InSingleQuote,
            (ScanState::Normal, '"') => ScanState::InDoubleQuote,
            (ScanState::InSingleQuote, '\'') => ScanState::Normal,
            (ScanState::InDoubleQuote, '\\') => ScanState::EscapePending { in_double: true },
            (ScanState::InDoubleQuote, '"') => ScanState::Normal,
            (state, _) => state,
        };
    }

    match state {
        ScanState::Normal => Continuation::Complete,
        ScanState::InSingleQuote
        | ScanState::InDoubleQuote
        | ScanState::EscapePending { in_double: true } => Continuation::Quote,
        // Only a backslash that is literally the last character asks for more.
        ScanState::EscapePending { in_double: false } if text.ends_with('\\') => {
            Continuation::Escape
        }
        ScanState::EscapePending { in_double: false } => Continuation::Complete,
    }
}

/// Whether `text` can be executed as typed.
pub fn is_complete(text: &str) -> bool {
    scan(text) == Continuation::Complete
}
