//! A module implementing lexical analysis (tokenization) for a simple shell-like language.
//!
//! Two passes live here: [`split_into_tokens`] feeds the parser, and
//! [`classify`] produces the coarse spans the input highlighter starts from.

use std::fmt;
use thiserror::Error;

/// A part of a word, which can be literal text, quoted text, a command substitution,
/// or a parameter substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordPart {
    /// Unquoted literal text. Only this kind can form a reserved word or a `~` prefix.
    Literal(String),
    /// Text that came from quotes or a backslash escape.
    Quoted(String),
    /// Command substitution in the format `$(...)`. Contains the text inside the parentheses.
    CmdSubst(String),
    /// Parameter substitution `$name` or `${name}`. Contains the parameter name.
    ParamSubst(String),
}

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word token, which may be composed of multiple parts (`WordPart`).
    Word(Vec<WordPart>),
    /// The pipe operator, `|`.
    Pipe,
    /// `&&`
    AndIf,
    /// `||`
    OrIf,
    /// `;`
    Semi,
    /// A line break separating commands.
    Newline,
    /// Input redirection symbol, `<`.
    RedirectIn,
    /// Output redirection symbol, `>`.
    RedirectOut,
    /// Appending output redirection, `>>`.
    RedirectAppend,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(parts) => {
                for part in parts {
                    match part {
                        WordPart::Literal(s) | WordPart::Quoted(s) => f.write_str(s)?,
                        WordPart::CmdSubst(s) => write!(f, "$({s})")?,
                        WordPart::ParamSubst(s) => write!(f, "${{{s}}}")?,
                    }
                }
                Ok(())
            }
            Token::Pipe => f.write_str("|"),
            Token::AndIf => f.write_str("&&"),
            Token::OrIf => f.write_str("||"),
            Token::Semi => f.write_str(";"),
            Token::Newline => f.write_str("newline"),
            Token::RedirectIn => f.write_str("<"),
            Token::RedirectOut => f.write_str(">"),
            Token::RedirectAppend => f.write_str(">>"),
        }
    }
}

/// Errors that can occur during the lexical analysis process.
///
/// Every variant describes input that more typing could still complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexingError {
    /// A closing quote (single or double) was not found.
    #[error("unterminated quote")]
    UnfinishedQuote,
    /// A closing parenthesis for command substitution `$(...)` was not found.
    #[error("unterminated command substitution")]
    UnfinishedCmdSubst,
    /// A closing brace for parameter substitution `${...}` was not found.
    #[error("unterminated parameter substitution")]
    UnfinishedParamSubst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
    Comment,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    current_word: Vec<WordPart>,
    buffer: String,
    /// Set once anything, even an empty `''`, belongs to the current word.
    word_started: bool,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            current_word: Vec::new(),
            buffer: String::new(),
            word_started: false,
        }
    }

    /// Performs lexical analysis on the input string and returns a vector of tokens.
    fn make_tokens(&mut self) -> Result<Vec<Token>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out)?,
                LexingState::ReadingWord => self.handle_word(ch, &mut out)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
                LexingState::Comment => {
                    if ch == '\n' {
                        out.push(Token::Newline);
                        self.state = LexingState::Start;
                    }
                }
            }
        }

        if matches!(
            self.state,
            LexingState::ReadingSingleQuote | LexingState::ReadingDoubleQuote
        ) {
            return Err(LexingError::UnfinishedQuote);
        }

        self.finish_word(&mut out);
        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), LexingError> {
        match ch {
            ' ' | '\t' => Ok(()),
            '#' => {
                self.state = LexingState::Comment;
                Ok(())
            }
            c => {
                self.state = LexingState::ReadingWord;
                self.handle_word(c, out)
            }
        }
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) -> Result<(), LexingError> {
        match ch {
            ' ' | '\t' => {
                self.finish_word(out);
                self.state = LexingState::Start;
            }
            '\n' => self.operator(Token::Newline, out),
            ';' => self.operator(Token::Semi, out),
            '<' => self.operator(Token::RedirectIn, out),
            '|' if self.peek_char() == Some('|') => {
                self.read_char();
                self.operator(Token::OrIf, out);
            }
            '|' => self.operator(Token::Pipe, out),
            '&' if self.peek_char() == Some('&') => {
                self.read_char();
                self.operator(Token::AndIf, out);
            }
            '>' if self.peek_char() == Some('>') => {
                self.read_char();
                self.operator(Token::RedirectAppend, out);
            }
            '>' => self.operator(Token::RedirectOut, out),
            '\'' => {
                self.flush(false);
                self.word_started = true;
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.flush(false);
                self.word_started = true;
                self.state = LexingState::ReadingDoubleQuote;
            }
            '\\' => match self.read_char() {
                // Line continuation.
                Some('\n') => {}
                Some(c) => {
                    self.flush(false);
                    self.current_word.push(WordPart::Quoted(c.to_string()));
                    self.word_started = true;
                }
                None => {}
            },
            '$' => {
                self.word_started = true;
                self.lex_dollar(false)?;
            }
            c => {
                self.word_started = true;
                self.buffer.push(c);
            }
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => {
                self.flush(true);
                self.state = LexingState::ReadingWord;
            }
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), LexingError> {
        match ch {
            '"' => {
                self.flush(true);
                self.state = LexingState::ReadingWord;
            }
            '\\' => match self.peek_char() {
                Some(c @ ('"' | '\\' | '$' | '`')) => {
                    self.read_char();
                    self.buffer.push(c);
                }
                Some('\n') => {
                    self.read_char();
                }
                _ => self.buffer.push('\\'),
            },
            '$' => self.lex_dollar(true)?,
            c => self.buffer.push(c),
        }
        Ok(())
    }

    /// Handles `$(...)`, `${...}`, `$name` and `$?`. A `$` that starts none of
    /// these is kept as literal text.
    fn lex_dollar(&mut self, quoted: bool) -> Result<(), LexingError> {
        match self.peek_char() {
            Some('(') => {
                self.read_char();
                self.flush(quoted);
                let nested = self.collect_nested('(', ')', LexingError::UnfinishedCmdSubst)?;
                self.current_word.push(WordPart::CmdSubst(nested));
            }
            Some('{') => {
                self.read_char();
                self.flush(quoted);
                let nested = self.collect_nested('{', '}', LexingError::UnfinishedParamSubst)?;
                self.current_word.push(WordPart::ParamSubst(nested));
            }
            Some('?') => {
                self.read_char();
                self.flush(quoted);
                self.current_word.push(WordPart::ParamSubst("?".to_string()));
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                self.flush(quoted);
                let mut name = String::new();
                while let Some(c) = self.peek_char() {
                    if !(c.is_alphanumeric() || c == '_') {
                        break;
                    }
                    name.push(c);
                    self.read_char();
                }
                self.current_word.push(WordPart::ParamSubst(name));
            }
            _ => self.buffer.push('$'),
        }
        Ok(())
    }

    /// Collects characters up to the `close` matching an already consumed `open`.
    /// Handles nesting by tracking depth.
    fn collect_nested(
        &mut self,
        open: char,
        close: char,
        unfinished: LexingError,
    ) -> Result<String, LexingError> {
        let mut depth = 1usize;
        let mut s = String::new();
        while let Some(ch) = self.read_char() {
            if ch == open {
                depth += 1;
            } else if ch == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(s);
                }
            }
            s.push(ch);
        }
        Err(unfinished)
    }

    fn operator(&mut self, token: Token, out: &mut Vec<Token>) {
        self.finish_word(out);
        out.push(token);
        self.state = LexingState::Start;
    }

    fn flush(&mut self, quoted: bool) {
        if self.buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.buffer);
        self.current_word.push(if quoted {
            WordPart::Quoted(text)
        } else {
            WordPart::Literal(text)
        });
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        self.flush(false);
        if self.word_started || !self.current_word.is_empty() {
            out.push(Token::Word(std::mem::take(&mut self.current_word)));
        }
        self.word_started = false;
    }
}

/// The main entry point function to perform lexical analysis.
///
/// # Returns
/// A vector of tokens on success, or a `LexingError` if an unterminated quote
/// or substitution is encountered.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexingError> {
    LexingFSM::new(line).make_tokens()
}

/// Reserved words of the command grammar.
pub const KEYWORDS: &[&str] = &[
    "if", "then", "elif", "else", "fi", "while", "until", "for", "in", "do", "done",
];

/// Coarse lexical class of a span, used for base highlighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Word,
    Keyword,
    Operator,
    String,
    Variable,
    Comment,
    Whitespace,
}

/// A run of input text sharing one [`TokenClass`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub class: TokenClass,
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '|' | '&' | ';' | '<' | '>' | '(' | ')')
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !is_operator_char(c) && !matches!(c, '\'' | '"' | '$' | '\\')
}

fn run_while(chars: &[char], start: usize, pred: impl Fn(char) -> bool) -> usize {
    chars[start..]
        .iter()
        .position(|&c| !pred(c))
        .map_or(chars.len(), |offset| start + offset)
}

/// Index just past the quote closing the one at `start`, or the end of input.
fn quote_end(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if quote == '"' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Extent of the `$` expression at `start`.
fn dollar_end(chars: &[char], start: usize) -> Result<(TokenClass, usize), LexingError> {
    let nested_end = |open: char, close: char, unfinished: LexingError| {
        let mut depth = 0usize;
        for (i, &c) in chars.iter().enumerate().skip(start + 1) {
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    return Ok((TokenClass::Variable, i + 1));
                }
            }
        }
        Err(unfinished)
    };

    match chars.get(start + 1) {
        Some('(') => nested_end('(', ')', LexingError::UnfinishedCmdSubst),
        Some('{') => nested_end('{', '}', LexingError::UnfinishedParamSubst),
        Some(c) if c.is_alphabetic() || *c == '_' => Ok((
            TokenClass::Variable,
            run_while(chars, start + 1, |c| c.is_alphanumeric() || c == '_'),
        )),
        Some('?' | '$' | '#' | '@' | '*' | '!') => Ok((TokenClass::Variable, start + 2)),
        Some(c) if c.is_ascii_digit() => Ok((TokenClass::Variable, start + 2)),
        _ => Ok((TokenClass::Word, start + 1)),
    }
}

/// Split `line` into classified spans for highlighting.
///
/// The spans cover the input exactly, so concatenating their text gives
/// `line` back. Unterminated quotes are tolerated (the string runs to the end);
/// an unterminated `$(` or `${` is an error.
pub fn classify(line: &str) -> Result<Vec<Span>, LexingError> {
    let chars: Vec<char> = line.chars().collect();
    let mut spans: Vec<Span> = Vec::new();
    let mut at_word_start = true;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let (class, end) = match c {
            c if c.is_whitespace() => (
                TokenClass::Whitespace,
                run_while(&chars, i, char::is_whitespace),
            ),
            '#' if at_word_start => (TokenClass::Comment, run_while(&chars, i, |c| c != '\n')),
            c if is_operator_char(c) => (TokenClass::Operator, i + 1),
            '\'' | '"' => (TokenClass::String, quote_end(&chars, i)),
            '$' => dollar_end(&chars, i)?,
            '\\' => (TokenClass::Word, (i + 2).min(chars.len())),
            _ => {
                let end = run_while(&chars, i, is_word_char);
                let standalone = chars
                    .get(end)
                    .is_none_or(|&next| next.is_whitespace() || is_operator_char(next));
                let text: String = chars[i..end].iter().collect();
                if at_word_start && standalone && KEYWORDS.contains(&text.as_str()) {
                    (TokenClass::Keyword, end)
                } else {
                    (TokenClass::Word, end)
                }
            }
        };

        let text: String = chars[i..end].iter().collect();
        match spans.last_mut() {
            Some(last) if last.class == class && class != TokenClass::Keyword => {
                last.text.push_str(&text)
            }
            _ => spans.push(Span { text, class }),
        }
        at_word_start = matches!(class, TokenClass::Whitespace | TokenClass::Operator);
        i = end;
    }

    Ok(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> WordPart {
        WordPart::Literal(s.to_string())
    }

    fn quoted(s: &str) -> WordPart {
        WordPart::Quoted(s.to_string())
    }

    fn word(parts: Vec<WordPart>) -> Token {
        Token::Word(parts)
    }

    #[test]
    fn splits_words_and_operators() {
        let tokens = split_into_tokens("ls -l|wc -l && echo ok; true || false").unwrap();
        assert_eq!(
            tokens,
            vec![
                word(vec![lit("ls")]),
                word(vec![lit("-l")]),
                Token::Pipe,
                word(vec![lit("wc")]),
                word(vec![lit("-l")]),
                Token::AndIf,
                word(vec![lit("echo")]),
                word(vec![lit("ok")]),
                Token::Semi,
                word(vec![lit("true")]),
                Token::OrIf,
                word(vec![lit("false")]),
            ]
        );
    }

    #[test]
    fn redirections() {
        let tokens = split_into_tokens("cat <in >out >>log").unwrap();
        assert_eq!(
            tokens,
            vec![
                word(vec![lit("cat")]),
                Token::RedirectIn,
                word(vec![lit("in")]),
                Token::RedirectOut,
                word(vec![lit("out")]),
                Token::RedirectAppend,
                word(vec![lit("log")]),
            ]
        );
    }

    #[test]
    fn quotes_produce_quoted_parts() {
        let tokens = split_into_tokens(r#"echo 'a b' "c $HOME" ''"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                word(vec![lit("echo")]),
                word(vec![quoted("a b")]),
                word(vec![quoted("c "), WordPart::ParamSubst("HOME".to_string())]),
                word(vec![]),
            ]
        );
    }

    #[test]
    fn backslash_escapes_next_character() {
        let tokens = split_into_tokens(r"echo a\ b \$x").unwrap();
        assert_eq!(
            tokens,
            vec![
                word(vec![lit("echo")]),
                word(vec![lit("a"), quoted(" "), lit("b")]),
                word(vec![quoted("$"), lit("x")]),
            ]
        );
    }

    #[test]
    fn parameters_and_substitutions() {
        let tokens = split_into_tokens("echo $a${b}$(date)$?").unwrap();
        assert_eq!(
            tokens[1],
            word(vec![
                WordPart::ParamSubst("a".to_string()),
                WordPart::ParamSubst("b".to_string()),
                WordPart::CmdSubst("date".to_string()),
                WordPart::ParamSubst("?".to_string()),
            ])
        );
    }

    #[test]
    fn newlines_and_comments() {
        let tokens = split_into_tokens("echo a # note\necho b").unwrap();
        assert_eq!(
            tokens,
            vec![
                word(vec![lit("echo")]),
                word(vec![lit("a")]),
                Token::Newline,
                word(vec![lit("echo")]),
                word(vec![lit("b")]),
            ]
        );
    }

    #[test]
    fn unfinished_constructs_are_errors() {
        assert_eq!(split_into_tokens("echo 'a"), Err(LexingError::UnfinishedQuote));
        assert_eq!(split_into_tokens("echo \"a"), Err(LexingError::UnfinishedQuote));
        assert_eq!(split_into_tokens("echo $(date"), Err(LexingError::UnfinishedCmdSubst));
        assert_eq!(split_into_tokens("echo ${x"), Err(LexingError::UnfinishedParamSubst));
    }

    #[test]
    fn classify_covers_the_input_exactly() {
        let line = "if [ -f x ]; then echo \"$HOME\" $USER | wc; fi # done";
        let spans = classify(line).unwrap();
        let joined: String = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(joined, line);
    }

    #[test]
    fn classify_marks_keywords_only_as_whole_words() {
        let spans = classify("if iffy; then fi").unwrap();
        let classes: Vec<(&str, TokenClass)> =
            spans.iter().map(|s| (s.text.as_str(), s.class)).collect();
        assert_eq!(
            classes,
            vec![
                ("if", TokenClass::Keyword),
                (" ", TokenClass::Whitespace),
                ("iffy", TokenClass::Word),
                (";", TokenClass::Operator),
                (" ", TokenClass::Whitespace),
                ("then", TokenClass::Keyword),
                (" ", TokenClass::Whitespace),
                ("fi", TokenClass::Keyword),
            ]
        );
    }

    #[test]
    fn classify_strings_variables_and_comments() {
        let spans = classify("echo 'x' $y #c").unwrap();
        let classes: Vec<TokenClass> = spans.iter().map(|s| s.class).collect();
        assert_eq!(
            classes,
            vec![
                TokenClass::Word,
                TokenClass::Whitespace,
                TokenClass::String,
                TokenClass::Whitespace,
                TokenClass::Variable,
                TokenClass::Whitespace,
                TokenClass::Comment,
            ]
        );
    }

    #[test]
    fn classify_tolerates_open_quotes_but_not_open_substitutions() {
        assert!(classify("echo 'unterminated").is_ok());
        assert_eq!(classify("echo $(date"), Err(LexingError::UnfinishedCmdSubst));
    }
}
