//! Allow-list check for caller-supplied SQL.
//!
//! This is not a parser. It rejects anything that is not a single SELECT and
//! anything mentioning connection-level keywords. Connections are opened
//! read-only against immutable files without extension loading, so this gate
//! is one layer of several rather than the sandbox itself.

use super::error::{Error, Result};

const FORBIDDEN_KEYWORDS: &[&str] = &["pragma", "attach", "detach", "vacuum"];

/// Accept only a single read-only SELECT statement
pub fn validate_select(sql: &str) -> Result<()> {
    let code = mask_literals(sql).to_lowercase();
    let code = code.trim();

    let first = words(code).next();
    if first != Some("select") || !code.starts_with("select") {
        return Err(Error::UnsafeQuery("Statement must be a SELECT".to_string()));
    }
    if code.contains(';') {
        return Err(Error::UnsafeQuery(
            "Statement may not contain multiple statements".to_string(),
        ));
    }
    for word in words(code) {
        if FORBIDDEN_KEYWORDS.contains(&word) || word.starts_with("pragma_") {
            return Err(Error::UnsafeQuery(format!(
                "Statement may not contain {}",
                word.to_uppercase()
            )));
        }
    }
    Ok(())
}

/// Names of `:named` parameters in first-appearance order, without duplicates.
/// Text inside string literals, quoted identifiers and comments is ignored.
pub fn named_parameters(sql: &str) -> Vec<String> {
    let code = mask_literals(sql);
    let mut names: Vec<String> = Vec::new();
    let mut chars = code.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != ':' {
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while let Some(&(j, next)) = chars.peek() {
            if !is_word_char(next) {
                break;
            }
            end = j + next.len_utf8();
            chars.next();
        }
        if end > start {
            let name = &code[start..end];
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn words(code: &str) -> impl Iterator<Item = &str> {
    code.split(|c: char| !is_word_char(c)).filter(|w| !w.is_empty())
}

/// Replace the contents of string literals, quoted identifiers and comments
/// with spaces, keeping every other byte where it was.
fn mask_literals(sql: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Quoted(char),
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(sql.len());
    let mut state = State::Code;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '\'' | '"' | '`' => {
                    state = State::Quoted(c);
                    out.push(c);
                }
                '[' => {
                    state = State::Quoted(']');
                    out.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = State::LineComment;
                    out.push_str("  ");
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                    out.push_str("  ");
                }
                _ => out.push(c),
            },
            State::Quoted(close) => {
                if c == close {
                    // A doubled quote is an escaped quote, not the end
                    if close != ']' && chars.peek() == Some(&close) {
                        chars.next();
                        out.push_str("  ");
                    } else {
                        state = State::Code;
                        out.push(c);
                    }
                } else {
                    push_blank(&mut out, c);
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                    out.push(c);
                } else {
                    push_blank(&mut out, c);
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                    out.push_str("  ");
                } else {
                    push_blank(&mut out, c);
                }
            }
        }
    }
    out
}

fn push_blank(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}
