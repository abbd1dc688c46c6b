//! Parser Types and Constants
//!
//! Shared types, character classes, and limits used across parser modules.

use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

// Parser limits to prevent hangs and resource exhaustion
pub const MAX_INPUT_SIZE: usize = 10_000_000; // 10MB max input
pub const MAX_PARSER_DEPTH: usize = 100; // Max recursion depth for nested constructs
pub const PARSER_STACK_SIZE: usize = 64 * 1024 * 1024; // Stack of the parsing thread

lazy_static::lazy_static! {
    /// Words with a grammatical meaning at command start
    pub static ref RESERVED_WORDS: HashSet<&'static str> = [
        "!", "{", "}", "[[", "]]", "case", "do", "done", "elif", "else", "esac", "fi", "for",
        "function", "if", "in", "select", "then", "time", "until", "while",
    ]
    .into_iter()
    .collect();

    /// Builtins whose operands are variable declarations
    pub static ref CMDVAR_BUILTINS: HashSet<&'static str> =
        ["export", "readonly", "local", "declare", "typeset"].into_iter().collect();
}

/// Blank inside a line
#[inline]
pub fn is_blank(c: u8) -> bool {
    c == b' ' || c == b'\t'
}

/// Character ending an unquoted word
#[inline]
pub fn is_word_end(c: u8) -> bool {
    matches!(
        c,
        b' ' | b'\t' | b'\n' | b';' | b'&' | b'|' | b'(' | b')' | b'<' | b'>'
    )
}

#[inline]
pub fn is_name_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

#[inline]
pub fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Single-character special parameters: $@ $* $# $? $- $$ $!
#[inline]
pub fn is_special_var(c: u8) -> bool {
    matches!(c, b'@' | b'*' | b'#' | b'?' | b'-' | b'$' | b'!')
}

/// Whether a string is a valid variable name
pub fn is_valid_name(s: &str) -> bool {
    let b = s.as_bytes();
    !b.is_empty() && is_name_start(b[0]) && b.iter().all(|c| is_name_char(*c))
}

/// Whether a shebang line selects bash
pub fn is_bash_shebang(shebang: &str) -> bool {
    shebang
        .split(|c: char| c == '/' || c.is_whitespace())
        .any(|w| w == "bash")
}

/// Options for parsing a unit
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Name reported in diagnostics
    pub filename: String,
    /// Force bash or sh mode; None reads it from the shebang
    pub bash: Option<bool>,
}

/// Position-tagged parse failure.
///
/// The origin chain lists the outer contexts the failing unit was nested in,
/// innermost first (backtick substitution, here-document, included file).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ParseError {
    pub message: String,
    /// Byte offset in the parsed unit
    pub position: usize,
    /// 1-indexed line
    pub line: usize,
    /// 1-indexed column
    pub column: usize,
    /// Source line holding the error, without newline
    pub line_text: String,
    pub origin: Vec<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin.last() {
            Some(file) if !file.is_empty() => write!(f, "{}:", file)?,
            _ => {}
        }
        write!(f, "{}:{}: {}", self.line, self.column, self.message)?;
        if self.origin.len() > 1 {
            for ctx in self.origin[..self.origin.len() - 1].iter().rev() {
                write!(f, ", in {}", ctx)?;
            }
        }
        Ok(())
    }
}

impl ParseError {
    /// Build an error at byte `position` of `source`
    pub fn at(source: &str, position: usize, message: impl Into<String>) -> Self {
        let position = position.min(source.len());
        let before = &source.as_bytes()[..position];
        let line = before.iter().filter(|c| **c == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|c| *c == b'\n')
            .map(|p| p + 1)
            .unwrap_or(0);
        let line_end = source[line_start..]
            .find('\n')
            .map(|p| line_start + p)
            .unwrap_or(source.len());
        let column = source
            .get(line_start..position)
            .map(|s| s.chars().count())
            .unwrap_or(position - line_start)
            + 1;
        ParseError {
            message: message.into(),
            position,
            line,
            column,
            line_text: source.get(line_start..line_end).unwrap_or("").to_string(),
            origin: Vec::new(),
        }
    }

    /// Record an enclosing context
    pub fn within(mut self, context: impl Into<String>) -> Self {
        self.origin.push(context.into());
        self
    }

    /// Message, offending line and a caret under the failing column
    pub fn diagnostic(&self) -> String {
        let pad: String = self
            .line_text
            .chars()
            .take(self.column.saturating_sub(1))
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();
        format!("{}\n{}\n{}^", self, self.line_text, pad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_position() {
        let err = ParseError::at("echo a\necho (b", 12, "unexpected '('");
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 6);
        assert_eq!(err.line_text, "echo (b");
        assert_eq!(err.to_string(), "2:6: unexpected '('");
    }

    #[test]
    fn test_error_origin_chain() {
        let err = ParseError::at("x", 0, "bad")
            .within("backtick substitution at line 3")
            .within("a.sh");
        assert_eq!(err.to_string(), "a.sh:1:1: bad, in backtick substitution at line 3");
    }

    #[test]
    fn test_diagnostic_caret() {
        let err = ParseError::at("echo (b", 5, "unexpected '('");
        assert_eq!(err.diagnostic(), "1:6: unexpected '('\necho (b\n     ^");
    }

    #[test]
    fn test_bash_shebang() {
        assert!(is_bash_shebang("#!/bin/bash"));
        assert!(is_bash_shebang("#!/usr/bin/env bash"));
        assert!(!is_bash_shebang("#!/bin/sh"));
        assert!(!is_bash_shebang("#!/bin/bashful"));
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("_a1"));
        assert!(!is_valid_name("1a"));
        assert!(!is_valid_name("a-b"));
        assert!(!is_valid_name(""));
    }
}
