//! URL pattern compilation for the two matching strategies.
//!
//! # Pattern Syntax
//! Patterns are literal text with `<...>` delimited segments. Literal text
//! is escaped; delimited segments are passed through in the syntax of the
//! active strategy:
//! - `regexp`: each segment becomes a capture group, whole pattern anchored
//! - `glob`: segments are glob syntax (`*`, `**`, `?`, `[...]`, `{a,b}`).
//!   Both `.` and `/` are separators: `*` and `?` never match them, `**`
//!   matches anything
//!
//! # Design Decisions
//! - Compilation happens once per rule and strategy (see `PatternCache`)
//! - Unbalanced delimiters are rejected rather than treated as literals
//! - Globs are translated into anchored regular expressions, so both
//!   strategies share one matcher type

use std::iter::Peekable;
use std::str::Chars;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DELIMITER_START: u8 = b'<';
const DELIMITER_END: u8 = b'>';

/// `*` in a glob: any run of characters except the separators.
const GLOB_STAR: &str = "[^./]*";
/// `?` in a glob: one character except the separators.
const GLOB_ANY: &str = "[^./]";

/// Process-wide pattern flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    #[default]
    #[serde(alias = "regex")]
    Regexp,
    Glob,
}

impl std::fmt::Display for MatchingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchingStrategy::Regexp => f.write_str("regexp"),
            MatchingStrategy::Glob => f.write_str("glob"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PatternError {
    #[error("unbalanced pattern")]
    Unbalanced,
    #[error("invalid regular expression: {0}")]
    Regex(String),
    #[error("invalid glob: {0}")]
    Glob(String),
}

/// A pattern compiled under one strategy.
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    Regexp(Regex),
    Glob(Regex),
}

impl CompiledPattern {
    pub fn compile(strategy: MatchingStrategy, pattern: &str) -> Result<Self, PatternError> {
        match strategy {
            MatchingStrategy::Regexp => compile_regex(pattern).map(CompiledPattern::Regexp),
            MatchingStrategy::Glob => compile_glob(pattern).map(CompiledPattern::Glob),
        }
    }

    pub fn is_match(&self, input: &str) -> bool {
        match self {
            CompiledPattern::Regexp(re) => re.is_match(input),
            CompiledPattern::Glob(re) => re.is_match(input),
        }
    }

    /// Capture groups of the first match, or `None` if `input` does not match.
    /// Groups that did not participate in the match are empty strings.
    pub fn captures(&self, input: &str) -> Option<Vec<String>> {
        match self {
            CompiledPattern::Regexp(re) => re.captures(input).map(|caps| {
                caps.iter()
                    .skip(1)
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect()
            }),
            CompiledPattern::Glob(glob) => glob.is_match(input).then(Vec::new),
        }
    }
}

/// Byte ranges `(start, end)` of every top-level delimited segment, `end` exclusive.
fn delimiter_indices(pattern: &str) -> Result<Vec<(usize, usize)>, PatternError> {
    let mut level: i32 = 0;
    let mut start = 0;
    let mut ranges = Vec::new();

    for (idx, byte) in pattern.bytes().enumerate() {
        match byte {
            DELIMITER_START => {
                level += 1;
                if level == 1 {
                    start = idx;
                }
            }
            DELIMITER_END => {
                level -= 1;
                if level == 0 {
                    ranges.push((start, idx + 1));
                } else if level < 0 {
                    return Err(PatternError::Unbalanced);
                }
            }
            _ => {}
        }
    }

    if level != 0 {
        return Err(PatternError::Unbalanced);
    }
    Ok(ranges)
}

/// Rebuild `pattern` as a regex body: literal text escaped, each delimited
/// segment transformed by `segment`.
fn translate(
    pattern: &str,
    segment: impl Fn(&str) -> Result<String, PatternError>,
) -> Result<String, PatternError> {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut end = 0;
    for (start, stop) in delimiter_indices(pattern)? {
        out.push_str(&regex::escape(&pattern[end..start]));
        out.push_str(&segment(&pattern[start + 1..stop - 1])?);
        end = stop;
    }
    out.push_str(&regex::escape(&pattern[end..]));
    Ok(out)
}

pub fn compile_regex(pattern: &str) -> Result<Regex, PatternError> {
    let body = translate(pattern, |s| Ok(format!("({})", s)))?;
    Regex::new(&format!("^{}$", body)).map_err(|e| PatternError::Regex(e.to_string()))
}

pub fn compile_glob(pattern: &str) -> Result<Regex, PatternError> {
    let body = translate(pattern, glob_to_regex)?;
    Regex::new(&format!("^{}$", body)).map_err(|e| PatternError::Glob(e.to_string()))
}

/// Translate one glob segment into a regex fragment without capture groups.
fn glob_to_regex(glob: &str) -> Result<String, PatternError> {
    let mut out = String::with_capacity(glob.len() * 2);
    let mut chars = glob.chars().peekable();
    let mut alternations = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str(GLOB_STAR),
            '?' => out.push_str(GLOB_ANY),
            '[' => char_class(&mut chars, &mut out)?,
            '{' => {
                alternations += 1;
                out.push_str("(?:");
            }
            '}' if alternations > 0 => {
                alternations -= 1;
                out.push(')');
            }
            ',' if alternations > 0 => out.push('|'),
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| PatternError::Glob(format!("trailing escape in \"{}\"", glob)))?;
                out.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4])));
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    if alternations > 0 {
        return Err(PatternError::Glob(format!("unclosed alternation in \"{}\"", glob)));
    }
    Ok(out)
}

/// `[abc]`, `[a-z]` or `[!abc]`; the opening bracket is already consumed.
fn char_class(chars: &mut Peekable<Chars<'_>>, out: &mut String) -> Result<(), PatternError> {
    out.push('[');
    if chars.peek() == Some(&'!') {
        chars.next();
        out.push('^');
    }

    let mut empty = true;
    loop {
        match chars.next() {
            None => return Err(PatternError::Glob("unclosed character class".to_string())),
            Some(']') if !empty => break,
            Some(']') => return Err(PatternError::Glob("empty character class".to_string())),
            Some('-') if !empty && chars.peek().is_some_and(|c| *c != ']') => out.push('-'),
            Some(c) => {
                if matches!(c, '\\' | '[' | ']' | '^' | '-' | '&' | '~') {
                    out.push('\\');
                }
                out.push(c);
            }
        }
        empty = false;
    }
    out.push(']');
    Ok(())
}
