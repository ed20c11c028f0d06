//! Styling of the line being typed.
//!
//! A base pass colors keywords, operators, strings, variables and comments.
//! A second pass looks at each space-separated word: program names found in
//! the [`SearchPath`] turn green, words that prefix an existing path are
//! underlined.

use crate::exe::SearchPath;
use crate::lexer::{TokenClass, classify};
use log::trace;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    Gray,
}

impl Color {
    fn sgr(self) -> &'static str {
        match self {
            Color::Green => "32",
            Color::Yellow => "33",
            Color::Blue => "34",
            Color::Magenta => "35",
            Color::Cyan => "36",
            Color::Gray => "90",
        }
    }
}

/// Terminal style of one run of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub color: Option<Color>,
    pub bold: bool,
    pub underline: bool,
}

impl Style {
    pub const PLAIN: Style = Style {
        color: None,
        bold: false,
        underline: false,
    };

    /// Style of a word naming a known program.
    pub const EXECUTABLE: Style = Style {
        color: Some(Color::Green),
        bold: false,
        underline: false,
    };

    pub fn underlined(self) -> Style {
        Style {
            underline: true,
            ..self
        }
    }

    /// Base style for a lexical class.
    pub fn for_class(class: TokenClass) -> Style {
        let color = match class {
            TokenClass::Keyword => {
                return Style {
                    color: Some(Color::Blue),
                    bold: true,
                    underline: false,
                };
            }
            TokenClass::Operator => Color::Cyan,
            TokenClass::String => Color::Yellow,
            TokenClass::Variable => Color::Magenta,
            TokenClass::Comment => Color::Gray,
            TokenClass::Word | TokenClass::Whitespace => return Style::PLAIN,
        };
        Style {
            color: Some(color),
            ..Style::PLAIN
        }
    }

    /// SGR parameters for this style, e.g. `1;34`. Empty for plain text.
    fn sgr(self) -> String {
        let mut codes = Vec::new();
        if self.bold {
            codes.push("1");
        }
        if self.underline {
            codes.push("4");
        }
        if let Some(color) = self.color {
            codes.push(color.sgr());
        }
        codes.join(";")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub style: Style,
}

/// A line split into styled runs. Adjacent runs always differ in style.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyledLine {
    segments: Vec<Segment>,
}

impl StyledLine {
    /// The whole line as a single unstyled run.
    pub fn plain(text: &str) -> Self {
        let mut line = Self::default();
        line.push(text, Style::PLAIN);
        line
    }

    pub fn push(&mut self, text: &str, style: Style) {
        if text.is_empty() {
            return;
        }
        match self.segments.last_mut() {
            Some(last) if last.style == style => last.text.push_str(text),
            _ => self.segments.push(Segment {
                text: text.to_string(),
                style,
            }),
        }
    }

    pub fn push_char(&mut self, c: char, style: Style) {
        let mut buf = [0u8; 4];
        self.push(c.encode_utf8(&mut buf), style);
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The text with all styling removed.
    pub fn plain_text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn is_plain(&self) -> bool {
        self.segments.iter().all(|s| s.style == Style::PLAIN)
    }

    /// Render with ANSI escape sequences. Every styled run is reset after itself.
    pub fn to_ansi(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            let sgr = segment.style.sgr();
            if sgr.is_empty() {
                out.push_str(&segment.text);
            } else {
                out.push_str(&format!("\x1b[{sgr}m{}\x1b[0m", segment.text));
            }
        }
        out
    }
}

impl fmt::Display for StyledLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ansi())
    }
}

/// Whether anything on disk starts with `word`, relative to the current directory.
///
/// `word` is matched literally: typed `*`, `?` and `[` are not wildcards.
fn path_prefix_exists(word: &str) -> bool {
    match glob::glob(&format!("{}*", glob::Pattern::escape(word))) {
        Ok(mut paths) => paths.any(|entry| entry.is_ok()),
        Err(_) => false,
    }
}

fn push_word(out: &mut StyledLine, word: &[(char, Style)], index: &SearchPath) {
    let text: String = word.iter().map(|(c, _)| *c).collect();
    let trimmed = text.trim();

    if !trimmed.is_empty() && index.contains(trimmed) {
        out.push(&text, Style::EXECUTABLE);
        return;
    }
    let underline = !trimmed.is_empty() && path_prefix_exists(trimmed);
    for &(c, style) in word {
        out.push_char(c, if underline { style.underlined() } else { style });
    }
}

/// Style `line` for display. Never fails: if the base pass cannot make sense
/// of the line, it comes back unstyled.
///
/// Stripping the styles from the result always gives `line` back.
pub fn render(line: &str, index: &SearchPath) -> StyledLine {
    let spans = match classify(line) {
        Ok(spans) => spans,
        Err(err) => {
            trace!("not highlighting {line:?}: {err}");
            return StyledLine::plain(line);
        }
    };

    let styled: Vec<(char, Style)> = spans
        .iter()
        .flat_map(|span| {
            let style = Style::for_class(span.class);
            span.text.chars().map(move |c| (c, style))
        })
        .collect();

    let mut out = StyledLine::default();
    let mut start = 0;
    for (i, &(c, style)) in styled.iter().enumerate() {
        if c == ' ' {
            push_word(&mut out, &styled[start..i], index);
            out.push_char(c, style);
            start = i + 1;
        }
    }
    push_word(&mut out, &styled[start..], index);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::test_support::lock_current_dir;
    use std::fs::{self, File};

    #[cfg(unix)]
    fn index_with(names: &[&str]) -> (tempfile::TempDir, SearchPath) {
        use std::os::unix::fs::PermissionsExt;
        let bin = tempfile::tempdir().expect("tempdir");
        for name in names {
            let path = bin.path().join(name);
            File::create(&path).expect("create");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        }
        let index = SearchPath::build(bin.path());
        (bin, index)
    }

    fn style_of(line: &StyledLine, text: &str) -> Style {
        line.segments()
            .iter()
            .find(|s| s.text == text)
            .unwrap_or_else(|| panic!("no segment {text:?} in {line:?}"))
            .style
    }

    #[test]
    fn styles_never_change_the_text() {
        let index = SearchPath::default();
        for line in [
            "",
            "ls -la | wc -l",
            "echo 'a  b' \"$HOME\" # comment",
            "if true; then echo $(date); fi",
            "echo $(unterminated",
            "  leading and trailing  ",
            "tab\tand\nnewline",
        ] {
            assert_eq!(render(line, &index).plain_text(), line);
        }
    }

    #[test]
    fn lexer_failure_falls_back_to_plain() {
        let line = render("echo ${open", &SearchPath::default());
        assert!(line.is_plain());
        assert_eq!(line.to_ansi(), "echo ${open");
    }

    #[test]
    fn base_classes_are_styled() {
        let line = render("if x; then echo $v; fi", &SearchPath::default());
        assert_eq!(style_of(&line, "if"), Style::for_class(TokenClass::Keyword));
        assert_eq!(style_of(&line, ";"), Style::for_class(TokenClass::Operator));
        assert_eq!(style_of(&line, "$v"), Style::for_class(TokenClass::Variable));
    }

    #[test]
    #[cfg(unix)]
    fn executables_are_green() {
        let (_bin, index) = index_with(&["tool"]);
        let line = render("tool arg-that-matches-nothing-4711", &index);
        assert_eq!(style_of(&line, "tool"), Style::EXECUTABLE);
        assert!(line.to_ansi().starts_with("\x1b[32mtool\x1b[0m"));
    }

    #[test]
    fn existing_path_prefixes_are_underlined() {
        let dir = tempfile::tempdir().expect("tempdir");
        File::create(dir.path().join("notes.txt")).expect("create");
        let prefix = dir.path().join("not").to_string_lossy().into_owned();

        let line = render(&format!("cat {prefix}"), &SearchPath::default());
        assert_eq!(style_of(&line, &prefix), Style::PLAIN.underlined());
        assert_eq!(style_of(&line, "cat "), Style::PLAIN);
    }

    #[test]
    #[cfg(unix)]
    fn executable_wins_over_existing_path() {
        let _lock = lock_current_dir();
        let (bin, index) = index_with(&["tool"]);
        let orig = std::env::current_dir().unwrap();
        std::env::set_current_dir(bin.path()).unwrap();
        let line = render("tool", &index);
        std::env::set_current_dir(orig).unwrap();

        assert_eq!(line.segments().len(), 1);
        assert_eq!(style_of(&line, "tool"), Style::EXECUTABLE);
    }

    #[test]
    fn wildcards_in_words_are_literal() {
        let dir = tempfile::tempdir().expect("tempdir");
        File::create(dir.path().join("data.txt")).expect("create");
        let pattern = dir.path().join("d*").to_string_lossy().into_owned();

        let line = render(&format!("cat {pattern}"), &SearchPath::default());
        assert_eq!(style_of(&line, &pattern), Style::PLAIN);
    }

    #[test]
    fn recursive_wildcards_do_not_walk_the_tree() {
        let started = std::time::Instant::now();
        let line = render("ls /usr/**/zz-no-such-4711", &SearchPath::default());
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(line.plain_text(), "ls /usr/**/zz-no-such-4711");
    }

    #[test]
    fn spaces_keep_their_base_style() {
        let line = render("echo 'a b'", &SearchPath::default());
        assert_eq!(style_of(&line, "'a b'"), Style::for_class(TokenClass::String));
    }
}
