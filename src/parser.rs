use crate::lexer::{KEYWORDS, Token, WordPart, split_into_tokens};
use log::trace;
use thiserror::Error;

/// A shell word: the parts of one lexer word token, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word(pub Vec<WordPart>);

impl Word {
    /// A word made of one unquoted literal.
    pub fn literal(text: impl Into<String>) -> Self {
        Word(vec![WordPart::Literal(text.into())])
    }
}

/// A variable assignment `name=value`, either standalone or as a command prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub value: Word,
}

/// Kind of redirection
///
/// Defines the specific operation mode for an I/O redirection (`<`, `>`, `>>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Input redirection (`<`): Reads standard input from a specified file.
    Input,
    /// Output redirection (`>`): Writes standard output to a file, **overwriting** the file if it exists.
    Output,
    /// Output redirection with append (`>>`): Writes standard output to a file, **appending** to the file if it exists.
    Append,
}

/// An I/O redirection specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: Word,
}

/// A **simple command** unit: prefix assignments, the command name and its
/// arguments, and I/O redirections.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimpleCommand {
    /// Assignments preceding the command name. Without a command name they
    /// set shell variables; otherwise they only apply while it runs.
    pub assignments: Vec<Assignment>,
    /// The command name and its arguments (`argv[0]`, `argv[1]`, etc.).
    pub argv: Vec<Word>,
    pub redirects: Vec<Redirect>,
}

/// How an element of an and-or list is joined to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// `&&`: run only if the previous element succeeded.
    And,
    /// `||`: run only if the previous element failed.
    Or,
}

/// AST node for the shell
///
/// Represents a single element in the Abstract Syntax Tree (AST) constructed
/// from the parsed shell commands. A parsed source text is a list of these,
/// one per statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
    Command(SimpleCommand),

    /// A **pipeline** of commands connected by the pipe operator (`|`).
    /// The inner `Vec<AstNode>` contains the individual commands in execution order.
    Pipeline(Vec<AstNode>),

    /// Pipelines joined by `&&` and `||`, evaluated left to right.
    AndOr {
        first: Box<AstNode>,
        rest: Vec<(Connector, AstNode)>,
    },

    /// `if` with its `elif` arms. Each branch is a (condition, body) pair.
    If {
        branches: Vec<(Vec<AstNode>, Vec<AstNode>)>,
        else_branch: Option<Vec<AstNode>>,
    },

    /// `while` loop, or `until` loop when `until` is set.
    Loop {
        until: bool,
        condition: Vec<AstNode>,
        body: Vec<AstNode>,
    },

    /// `for var [in items]; do body; done`. Without `in`, nothing is iterated.
    For {
        var: String,
        items: Option<Vec<Word>>,
        body: Vec<AstNode>,
    },
}

/// Errors that can occur during the AST construction (parsing) phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParsingError {
    /// Encountered a token that was not expected at the current position according to the grammar.
    #[error("syntax error near unexpected token `{0}'")]
    UnexpectedToken(Token),
    /// Reached the end of the token stream inside an unfinished construct.
    #[error("syntax error: unexpected end of input")]
    UnexpectedEnd,
    /// Expected a `Word` (a filename or a loop variable) but found something else.
    #[error("syntax error: expected a word")]
    ExpectedWord,
    /// A loop variable that is not a valid name.
    #[error("`{0}': not a valid identifier")]
    InvalidName(String),
}

/// Result of parsing a source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<S = AstNode> {
    /// Statements ready to run, in source order.
    Complete(Vec<S>),
    /// The text stops inside a construct that more input can finish.
    Incomplete,
}

/// Reserved words that close or continue a compound command and so can never
/// start one.
const CLOSING_WORDS: &[&str] = &["then", "elif", "else", "fi", "do", "done"];

pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The reserved word `token` spells. Only a single unquoted literal can be
/// one, so `'if'` is not.
fn keyword_of(token: &Token) -> Option<&str> {
    match token {
        Token::Word(parts) => match parts.as_slice() {
            [WordPart::Literal(text)] if KEYWORDS.contains(&text.as_str()) => Some(text),
            _ => None,
        },
        _ => None,
    }
}

fn variable_name(token: &Token) -> Option<String> {
    match token {
        Token::Word(parts) => match parts.as_slice() {
            [WordPart::Literal(name)] if is_valid_name(name) => Some(name.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// `name=value` when the word starts with an unquoted valid name and `=`.
fn split_assignment(parts: &[WordPart]) -> Option<Assignment> {
    let (WordPart::Literal(head), rest) = parts.split_first()? else {
        return None;
    };
    let (name, value) = head.split_once('=')?;
    if !is_valid_name(name) {
        return None;
    }
    let mut value_parts = Vec::new();
    if !value.is_empty() {
        value_parts.push(WordPart::Literal(value.to_string()));
    }
    value_parts.extend(rest.iter().cloned());
    Some(Assignment {
        name: name.to_string(),
        value: Word(value_parts),
    })
}

struct AstBuilder {
    tokens: Vec<Token>,
    pos: usize,
}

impl AstBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        AstBuilder { tokens, pos: 0 }
    }

    fn build_ast(mut self) -> Result<Vec<AstNode>, ParsingError> {
        self.parse_list(&[])
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self) -> Option<&str> {
        self.peek().and_then(keyword_of)
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParsingError> {
        match self.consume() {
            Some(token) if keyword_of(&token) == Some(keyword) => Ok(()),
            Some(token) => Err(ParsingError::UnexpectedToken(token)),
            None => Err(ParsingError::UnexpectedEnd),
        }
    }

    fn skip_newlines(&mut self) {
        while let Some(Token::Newline) = self.peek() {
            self.consume();
        }
    }

    /// Parse a list: and_or ((';' | '\n') and_or)*
    ///
    /// With `terminators`, the list ends before the first of those reserved
    /// words and running out of tokens first is `UnexpectedEnd`. An empty
    /// list before its terminator is an error.
    fn parse_list(&mut self, terminators: &[&str]) -> Result<Vec<AstNode>, ParsingError> {
        let mut items = Vec::new();

        loop {
            while let Some(Token::Newline | Token::Semi) = self.peek() {
                if items.is_empty() && self.peek() == Some(&Token::Semi) {
                    return Err(ParsingError::UnexpectedToken(Token::Semi));
                }
                self.consume();
            }

            let Some(token) = self.peek() else {
                if terminators.is_empty() {
                    return Ok(items);
                }
                return Err(ParsingError::UnexpectedEnd);
            };
            if keyword_of(token).is_some_and(|kw| terminators.contains(&kw)) {
                if items.is_empty() {
                    return Err(ParsingError::UnexpectedToken(token.clone()));
                }
                return Ok(items);
            }

            items.push(self.parse_and_or()?);

            match self.peek() {
                None | Some(Token::Semi | Token::Newline) => {}
                Some(token) if keyword_of(token).is_some_and(|kw| terminators.contains(&kw)) => {}
                Some(token) => return Err(ParsingError::UnexpectedToken(token.clone())),
            }
        }
    }

    /// Parse an and-or list: pipeline (('&&' | '||') newline* pipeline)*
    fn parse_and_or(&mut self) -> Result<AstNode, ParsingError> {
        let first = self.parse_pipeline()?;
        let mut rest = Vec::new();

        loop {
            let connector = match self.peek() {
                Some(Token::AndIf) => Connector::And,
                Some(Token::OrIf) => Connector::Or,
                _ => break,
            };
            self.consume();
            self.skip_newlines();
            rest.push((connector, self.parse_pipeline()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(AstNode::AndOr {
                first: Box::new(first),
                rest,
            })
        }
    }

    /// Parse a pipeline: command ('|' newline* command)*
    fn parse_pipeline(&mut self) -> Result<AstNode, ParsingError> {
        let mut commands = Vec::new();

        commands.push(self.parse_command()?);

        while let Some(Token::Pipe) = self.peek() {
            self.consume();
            self.skip_newlines();
            commands.push(self.parse_command()?);
        }

        if commands.len() == 1 {
            Ok(commands.remove(0))
        } else {
            Ok(AstNode::Pipeline(commands))
        }
    }

    fn parse_command(&mut self) -> Result<AstNode, ParsingError> {
        match self.peek_keyword() {
            Some("if") => self.parse_if(),
            Some(kw @ ("while" | "until")) => {
                let until = kw == "until";
                self.parse_loop(until)
            }
            Some("for") => self.parse_for(),
            _ => self.parse_simple(),
        }
    }

    /// Parse a simple command: (assignment* word* redirect*)
    fn parse_simple(&mut self) -> Result<AstNode, ParsingError> {
        let mut command = SimpleCommand::default();

        while let Some(token) = self.peek() {
            match token {
                Token::Word(parts) => {
                    if command.argv.is_empty() {
                        if let Some(assignment) = split_assignment(parts) {
                            command.assignments.push(assignment);
                            self.consume();
                            continue;
                        }
                        if keyword_of(token).is_some_and(|kw| CLOSING_WORDS.contains(&kw)) {
                            return Err(ParsingError::UnexpectedToken(token.clone()));
                        }
                    }
                    command.argv.push(Word(parts.clone()));
                    self.consume();
                }
                Token::RedirectIn | Token::RedirectOut | Token::RedirectAppend => {
                    let redirect = self.parse_redirect()?;
                    command.redirects.push(redirect);
                }
                _ => break,
            }
        }

        if command.assignments.is_empty() && command.argv.is_empty() && command.redirects.is_empty()
        {
            return match self.peek() {
                Some(token) => Err(ParsingError::UnexpectedToken(token.clone())),
                None => Err(ParsingError::UnexpectedEnd),
            };
        }

        Ok(AstNode::Command(command))
    }

    /// Parse a redirect: ('<' | '>' | '>>') word
    ///
    /// A missing target is a plain syntax error: no further line can supply it.
    fn parse_redirect(&mut self) -> Result<Redirect, ParsingError> {
        let kind = match self.consume() {
            Some(Token::RedirectIn) => RedirectKind::Input,
            Some(Token::RedirectOut) => RedirectKind::Output,
            Some(Token::RedirectAppend) => RedirectKind::Append,
            Some(token) => return Err(ParsingError::UnexpectedToken(token)),
            None => return Err(ParsingError::UnexpectedEnd),
        };

        match self.consume() {
            Some(Token::Word(parts)) => Ok(Redirect {
                kind,
                target: Word(parts),
            }),
            _ => Err(ParsingError::ExpectedWord),
        }
    }

    /// if list then list (elif list then list)* [else list] fi
    fn parse_if(&mut self) -> Result<AstNode, ParsingError> {
        self.expect_keyword("if")?;
        let mut branches = Vec::new();
        let mut else_branch = None;

        loop {
            let condition = self.parse_list(&["then"])?;
            self.expect_keyword("then")?;
            let body = self.parse_list(&["elif", "else", "fi"])?;
            branches.push((condition, body));

            let Some(token) = self.consume() else {
                return Err(ParsingError::UnexpectedEnd);
            };
            match keyword_of(&token) {
                Some("elif") => {}
                Some("else") => {
                    else_branch = Some(self.parse_list(&["fi"])?);
                    self.expect_keyword("fi")?;
                    break;
                }
                Some("fi") => break,
                _ => return Err(ParsingError::UnexpectedToken(token.clone())),
            }
        }

        Ok(AstNode::If {
            branches,
            else_branch,
        })
    }

    /// (while | until) list do list done
    fn parse_loop(&mut self, until: bool) -> Result<AstNode, ParsingError> {
        self.consume();
        let condition = self.parse_list(&["do"])?;
        self.expect_keyword("do")?;
        let body = self.parse_list(&["done"])?;
        self.expect_keyword("done")?;
        Ok(AstNode::Loop {
            until,
            condition,
            body,
        })
    }

    /// for name [in word*] (';' | '\n')* do list done
    fn parse_for(&mut self) -> Result<AstNode, ParsingError> {
        self.expect_keyword("for")?;
        let var = match self.consume() {
            Some(token @ Token::Word(_)) => match variable_name(&token) {
                Some(name) => name,
                None => return Err(ParsingError::InvalidName(token.to_string())),
            },
            Some(_) => return Err(ParsingError::ExpectedWord),
            None => return Err(ParsingError::UnexpectedEnd),
        };

        self.skip_newlines();
        let mut items = None;
        if self.peek_keyword() == Some("in") {
            self.consume();
            let mut words = Vec::new();
            while let Some(Token::Word(parts)) = self.peek() {
                words.push(Word(parts.clone()));
                self.consume();
            }
            items = Some(words);
        }

        while let Some(Token::Semi | Token::Newline) = self.peek() {
            self.consume();
        }
        self.expect_keyword("do")?;
        let body = self.parse_list(&["done"])?;
        self.expect_keyword("done")?;

        Ok(AstNode::For { var, items, body })
    }
}

/// Constructs the statements of a program from a vector of tokens.
///
/// Running out of tokens inside a construct is reported as
/// [`ParsingError::UnexpectedEnd`]; [`parse`] turns that into
/// [`Parsed::Incomplete`].
pub fn construct_ast(tokens: Vec<Token>) -> Result<Vec<AstNode>, ParsingError> {
    let builder = AstBuilder::from(tokens);
    builder.build_ast()
}

/// Lex and parse `text`.
///
/// Input that more lines could finish (an open quote or substitution, a
/// trailing `|` or `&&`, an unclosed `if`/`while`/`for`) is `Incomplete`.
pub fn parse(text: &str) -> Result<Parsed, ParsingError> {
    let tokens = match split_into_tokens(text) {
        Ok(tokens) => tokens,
        Err(err) => {
            trace!("lexer wants more input: {err}");
            return Ok(Parsed::Incomplete);
        }
    };

    match construct_ast(tokens) {
        Ok(statements) => Ok(Parsed::Complete(statements)),
        Err(ParsingError::UnexpectedEnd) => Ok(Parsed::Incomplete),
        Err(err) => Err(err),
    }
}
