//! OSC address pattern matching
//!
//! OSC addresses are slash-rooted paths:
//! ```text
//! /mixer/channel/3/gain
//! /synth/osc1/detune
//! ```
//!
//! Handler registrations may use OSC 1.0 wildcards:
//! - `?` matches any single character except `/`
//! - `*` matches any run (including empty) of characters except `/`
//! - `[abc]` / `[a-z]` character classes, `[!...]` negated
//! - `{foo,bar}` alternation over literal members
//!
//! Matching is applied to the full address string; the entire address must
//! be consumed.

use crate::{Error, Result};

/// A compiled OSC address pattern
///
/// The original registration string is kept verbatim (pattern equality is
/// exact string equality) alongside a compiled matcher. Patterns without
/// wildcard characters skip the regex and compare by string equality.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    regex: Option<regex_lite::Regex>,
}

impl Pattern {
    /// Compile a pattern from an address string
    pub fn compile(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidAddress("empty address".to_string()));
        }
        if !s.starts_with('/') {
            return Err(Error::InvalidAddress(format!(
                "address must start with '/': {}",
                s
            )));
        }

        let regex = if is_pattern(s) {
            let regex_str = format!("^{}$", translate(s)?);
            Some(
                regex_lite::Regex::new(&regex_str)
                    .map_err(|e| Error::InvalidPattern(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(Self {
            raw: s.to_string(),
            regex,
        })
    }

    /// Check if an address matches this pattern
    pub fn matches(&self, addr: &str) -> bool {
        if let Some(regex) = &self.regex {
            regex.is_match(addr)
        } else {
            addr == self.raw
        }
    }

    /// Get the original pattern string
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Check whether an address string contains OSC wildcard characters
pub fn is_pattern(s: &str) -> bool {
    s.contains(['?', '*', '[', '{'])
}

/// Translate an OSC pattern into regex source
fn translate(pattern: &str) -> Result<String> {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '?' => out.push_str("[^/]"),
            '*' => out.push_str("[^/]*"),
            '[' => {
                out.push('[');
                let negated = chars.peek() == Some(&'!');
                if negated {
                    chars.next();
                    // wildcards never cross a segment boundary
                    out.push_str("^/");
                }
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '-' => out.push('-'),
                        other => push_class_literal(&mut out, other),
                    }
                }
                if !closed {
                    return Err(Error::InvalidPattern(format!(
                        "unbalanced '[' in pattern: {}",
                        pattern
                    )));
                }
                out.push(']');
            }
            '{' => {
                out.push_str("(?:");
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        '}' => {
                            closed = true;
                            break;
                        }
                        ',' => out.push('|'),
                        other => push_literal(&mut out, other),
                    }
                }
                if !closed {
                    return Err(Error::InvalidPattern(format!(
                        "unbalanced '{{' in pattern: {}",
                        pattern
                    )));
                }
                out.push(')');
            }
            other => push_literal(&mut out, other),
        }
    }

    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    if matches!(
        c,
        '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '-' | '&' | '~' | '#'
    ) {
        out.push('\\');
    }
    out.push(c);
}

fn push_class_literal(out: &mut String, c: char) {
    if matches!(c, '\\' | ']' | '^') {
        out.push('\\');
    }
    out.push(c);
}
