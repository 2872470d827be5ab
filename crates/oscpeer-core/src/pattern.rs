//! OSC address pattern compilation and matching
//!
//! OSC 1.0 address patterns support four wildcard forms:
//!
//! - `?` matches any single character except `/`
//! - `*` matches any run (including empty) of characters except `/`
//! - `[abc]` / `[a-z]` are character classes; a leading `!` negates
//! - `{foo,bar}` matches either literal alternative
//!
//! Everything else is matched literally. Matching is applied to the whole
//! address string and must consume it entirely; `/a/*` does not match
//! `/a/b/c` because `*` stops at segment boundaries.

use std::fmt;

use regex_lite::Regex;

use crate::{Error, Result};

/// A compiled OSC address pattern.
///
/// The original pattern string is kept verbatim: it is the registration key
/// for handler tables, where equality is exact string equality. Compile once
/// and reuse; translation to the backing regex is the expensive part.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Option<Regex>,
}

impl Pattern {
    /// Compile an address pattern.
    ///
    /// Fails closed: unbalanced `[` or `{`, stray `]` or `}`, and empty
    /// character classes are compile errors, not silent literals.
    pub fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::InvalidAddress("empty pattern".to_string()));
        }
        if !pattern.starts_with('/') {
            return Err(Error::InvalidAddress(format!(
                "pattern must start with '/': {pattern}"
            )));
        }

        let regex = if pattern
            .chars()
            .any(|c| matches!(c, '?' | '*' | '[' | ']' | '{' | '}'))
        {
            let translated = translate(pattern)?;
            Some(Regex::new(&translated).map_err(|e| Error::InvalidPattern(e.to_string()))?)
        } else {
            // Literal pattern: plain string comparison, no regex needed.
            None
        };

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The exact pattern string this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern contains any wildcard.
    pub fn is_literal(&self) -> bool {
        self.regex.is_none()
    }

    /// Match a concrete address against this pattern.
    pub fn matches(&self, address: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(address),
            None => address == self.source,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Translate an OSC pattern into an anchored regex.
fn translate(pattern: &str) -> Result<String> {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '?' => regex.push_str("[^/]"),
            '*' => regex.push_str("[^/]*"),
            '[' => {
                let negated = if chars.peek() == Some(&'!') {
                    chars.next();
                    true
                } else {
                    false
                };

                let mut class = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    // '-' is kept as-is so ranges like a-z work.
                    if matches!(c, '\\' | '^' | '[') {
                        class.push('\\');
                    }
                    class.push(c);
                }
                if !closed {
                    return Err(Error::InvalidPattern(format!(
                        "unbalanced '[' in {pattern}"
                    )));
                }
                if class.is_empty() {
                    return Err(Error::InvalidPattern(format!(
                        "empty character class in {pattern}"
                    )));
                }

                regex.push('[');
                if negated {
                    regex.push('^');
                }
                regex.push_str(&class);
                if negated {
                    // A negated class still must not cross a segment boundary.
                    regex.push('/');
                }
                regex.push(']');
            }
            '{' => {
                let mut body = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => {
                            return Err(Error::InvalidPattern(format!(
                                "nested '{{' in {pattern}"
                            )))
                        }
                        _ => body.push(c),
                    }
                }
                if !closed {
                    return Err(Error::InvalidPattern(format!(
                        "unbalanced '{{' in {pattern}"
                    )));
                }

                regex.push_str("(?:");
                for (i, member) in body.split(',').enumerate() {
                    if i > 0 {
                        regex.push('|');
                    }
                    for c in member.chars() {
                        push_literal(c, &mut regex);
                    }
                }
                regex.push(')');
            }
            ']' => {
                return Err(Error::InvalidPattern(format!("unmatched ']' in {pattern}")));
            }
            '}' => {
                return Err(Error::InvalidPattern(format!("unmatched '}}' in {pattern}")));
            }
            c => push_literal(c, &mut regex),
        }
    }

    regex.push('$');
    Ok(regex)
}

fn push_literal(c: char, out: &mut String) {
    if matches!(
        c,
        '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
    ) {
        out.push('\\');
    }
    out.push(c);
}
