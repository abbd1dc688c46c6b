//! Quote stripping
//!
//! An argument is split into quoting pieces, each quoted piece is replaced
//! by its unquoted spelling when that is safe, and the argument is rebuilt.
//! A piece stays quoted when unquoting it would
//!   - glue its text to a preceding bare `$name`, changing the name,
//!   - need more than one backslash escape,
//!   - expose an expansion to field splitting outside a no-split context,
//!   - turn an argument into nothing.
//!
//! Here-documents are never passed here.

use crate::ast::types::{Arg, Subarg};
use crate::parser::types::{is_name_char, is_name_start, is_special_var, RESERVED_WORDS};

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    /// Unquoted raw text, escapes included
    Raw(String),
    /// Content of '...'
    Single(String),
    /// Content of "...": raw text and quoted expansions
    Double(Vec<DoublePart>),
    /// $'...' or $"..." kept verbatim
    Verbatim(String),
    /// Unquoted expansion
    Exp(Subarg),
}

#[derive(Debug, Clone, PartialEq)]
enum DoublePart {
    Text(String),
    Exp(Subarg),
}

#[derive(Clone, Copy, PartialEq)]
enum State {
    Out,
    Single,
    Double,
    Dollar(char),
}

/// Split an argument into quoting pieces, None when quotes are unbalanced
fn split(arg: &Arg) -> Option<Vec<Piece>> {
    let mut pieces = Vec::new();
    let mut state = State::Out;
    let mut buf = String::new();
    let mut parts: Vec<DoublePart> = Vec::new();
    // last char of `buf` is an unescaped `$`
    let mut dollar = false;

    for sa in &arg.subargs {
        let raw = match sa {
            Subarg::Literal(raw) => raw,
            exp => {
                if state == State::Double {
                    if !buf.is_empty() {
                        parts.push(DoublePart::Text(std::mem::take(&mut buf)));
                    }
                    parts.push(DoublePart::Exp(exp.clone()));
                } else if state == State::Out {
                    if !buf.is_empty() {
                        pieces.push(Piece::Raw(std::mem::take(&mut buf)));
                    }
                    pieces.push(Piece::Exp(exp.clone()));
                    dollar = false;
                } else {
                    return None;
                }
                continue;
            }
        };
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match state {
                State::Out => match c {
                    '\\' => {
                        buf.push(c);
                        if let Some(n) = chars.next() {
                            buf.push(n);
                        }
                        dollar = false;
                    }
                    '\'' | '"' if dollar => {
                        buf.pop();
                        if !buf.is_empty() {
                            pieces.push(Piece::Raw(std::mem::take(&mut buf)));
                        }
                        buf.push('$');
                        buf.push(c);
                        state = State::Dollar(c);
                        dollar = false;
                    }
                    '\'' | '"' => {
                        if !buf.is_empty() {
                            pieces.push(Piece::Raw(std::mem::take(&mut buf)));
                        }
                        state = if c == '\'' { State::Single } else { State::Double };
                    }
                    _ => {
                        buf.push(c);
                        dollar = c == '$';
                    }
                },
                State::Single => {
                    if c == '\'' {
                        pieces.push(Piece::Single(std::mem::take(&mut buf)));
                        state = State::Out;
                    } else {
                        buf.push(c);
                    }
                }
                State::Double => match c {
                    '\\' => {
                        buf.push(c);
                        if let Some(n) = chars.next() {
                            buf.push(n);
                        }
                    }
                    '"' => {
                        if !buf.is_empty() {
                            parts.push(DoublePart::Text(std::mem::take(&mut buf)));
                        }
                        pieces.push(Piece::Double(std::mem::take(&mut parts)));
                        state = State::Out;
                    }
                    _ => buf.push(c),
                },
                State::Dollar(q) => {
                    buf.push(c);
                    if c == '\\' {
                        if let Some(n) = chars.next() {
                            buf.push(n);
                        }
                    } else if c == q {
                        pieces.push(Piece::Verbatim(std::mem::take(&mut buf)));
                        state = State::Out;
                    }
                }
            }
        }
    }
    if state != State::Out {
        return None;
    }
    if !buf.is_empty() {
        pieces.push(Piece::Raw(buf));
    }
    Some(pieces)
}

/// Characters needing a backslash outside quotes
fn needs_escape(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t'
            | '|'
            | '&'
            | ';'
            | '<'
            | '>'
            | '('
            | ')'
            | '$'
            | '`'
            | '\\'
            | '"'
            | '\''
            | '*'
            | '?'
            | '['
            | '#'
            | '~'
            | '{'
            | '}'
    )
}

/// Value of the text of a double-quoted piece
fn decode_double(raw: &str) -> String {
    let mut out = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('$' | '`' | '"' | '\\') => {
                    if let Some(n) = chars.next() {
                        out.push(n);
                    }
                }
                Some('\n') => {
                    chars.next();
                }
                _ => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Unquoted spelling of a literal value, None past one escape or on a newline
fn escape(value: &str, escapes: &mut usize) -> Option<String> {
    let mut out = String::with_capacity(value.len() + 1);
    for c in value.chars() {
        if c == '\n' {
            return None;
        }
        if needs_escape(c) {
            *escapes += 1;
            if *escapes > 1 {
                return None;
            }
            out.push('\\');
        }
        out.push(c);
    }
    Some(out)
}

/// `$name` without braces, which a following name character would extend
fn is_bare_name(sa: &Subarg) -> bool {
    match sa {
        Subarg::Variable { var, .. } => {
            !var.is_manip && var.name.bytes().next().map(is_name_start).unwrap_or(false)
        }
        _ => false,
    }
}

fn starts_with_name_char(s: &str) -> bool {
    s.bytes().next().map(is_name_char).unwrap_or(false)
}

/// Whether the piece ends with a bare `$name`
fn ends_with_bare_name(piece: &Piece) -> bool {
    match piece {
        Piece::Exp(sa) => is_bare_name(sa),
        _ => false,
    }
}

/// Unquoted pieces replacing `piece`, None when it must stay quoted
fn unquote(piece: &Piece, nosplit: bool) -> Option<Vec<Piece>> {
    let mut escapes = 0;
    match piece {
        Piece::Single(content) => Some(vec![Piece::Raw(escape(content, &mut escapes)?)]),
        Piece::Double(parts) => {
            let mut out: Vec<Piece> = Vec::new();
            for part in parts {
                match part {
                    DoublePart::Text(raw) => {
                        let text = escape(&decode_double(raw), &mut escapes)?;
                        if out.last().map(ends_with_bare_name).unwrap_or(false)
                            && starts_with_name_char(&text)
                        {
                            return None;
                        }
                        out.push(Piece::Raw(text));
                    }
                    DoublePart::Exp(sa) => {
                        if !nosplit {
                            return None;
                        }
                        let mut sa = sa.clone();
                        match &mut sa {
                            Subarg::Variable { var, quoted } => {
                                if var.name == "@" || var.name == "*" {
                                    return None;
                                }
                                *quoted = false;
                            }
                            Subarg::Subshell { quoted, .. } | Subarg::Arithmetic { quoted, .. } => {
                                *quoted = false;
                            }
                            _ => return None,
                        }
                        out.push(Piece::Exp(sa));
                    }
                }
            }
            out.retain(|p| !matches!(p, Piece::Raw(s) if s.is_empty()));
            Some(out)
        }
        _ => None,
    }
}

/// First character of a piece as it is written
fn first_char(piece: &Piece) -> Option<char> {
    match piece {
        Piece::Raw(s) | Piece::Verbatim(s) => s.chars().next(),
        Piece::Single(_) => Some('\''),
        Piece::Double(_) => Some('"'),
        Piece::Exp(_) => Some('$'),
    }
}

/// Whether a piece contributes literal characters to the word
fn has_literal_text(piece: &Piece) -> bool {
    match piece {
        Piece::Raw(s) | Piece::Single(s) | Piece::Verbatim(s) => !s.is_empty(),
        Piece::Double(parts) => parts
            .iter()
            .any(|p| matches!(p, DoublePart::Text(t) if !t.is_empty())),
        Piece::Exp(_) => false,
    }
}

/// Drop the backslash of `\$` when the `$` could not start an expansion
fn drop_redundant_dollar_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            if chars[i + 1] == '$' {
                if let Some(&next) = chars.get(i + 2) {
                    let can_expand = next.is_ascii_alphanumeric()
                        || next == '_'
                        || next == '{'
                        || next == '('
                        || next == '\''
                        || next == '"'
                        || (next.is_ascii() && is_special_var(next as u8));
                    if !can_expand {
                        out.push('$');
                        i += 2;
                        continue;
                    }
                }
            }
            out.push(c);
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

fn join(pieces: Vec<Piece>) -> Arg {
    let mut arg = Arg::default();
    for p in pieces {
        match p {
            Piece::Raw(s) => arg.push_literal(&drop_redundant_dollar_escapes(&s)),
            Piece::Verbatim(s) => arg.push_literal(&s),
            Piece::Single(s) => arg.push_literal(&format!("'{}'", s)),
            Piece::Double(parts) => {
                arg.push_literal("\"");
                for part in parts {
                    match part {
                        DoublePart::Text(t) => arg.push_literal(&drop_redundant_dollar_escapes(&t)),
                        DoublePart::Exp(sa) => arg.push(sa),
                    }
                }
                arg.push_literal("\"");
            }
            Piece::Exp(sa) => arg.push(sa),
        }
    }
    arg
}

/// Strip unneeded quotes from `arg`.
///
/// `nosplit`: the argument is not subject to field splitting (assignment
/// value, case subject). `command_name`: the argument is a command name,
/// which must not turn into a reserved word or an assignment.
pub fn strip_quotes(arg: &mut Arg, nosplit: bool, command_name: bool) {
    let Some(pieces) = split(arg) else {
        return;
    };
    let mut out: Vec<Piece> = Vec::with_capacity(pieces.len());
    for (i, piece) in pieces.iter().enumerate() {
        if !matches!(piece, Piece::Single(_) | Piece::Double(_)) {
            out.push(piece.clone());
            continue;
        }
        let Some(mut repl) = unquote(piece, nosplit) else {
            out.push(piece.clone());
            continue;
        };
        repl.retain(|p| !matches!(p, Piece::Raw(s) if s.is_empty()));
        // an empty quoted string is the whole word unless literal text remains
        if repl.is_empty()
            && !pieces
                .iter()
                .enumerate()
                .any(|(j, p)| j != i && has_literal_text(p))
        {
            out.push(piece.clone());
            continue;
        }
        let name_char = |c: char| c.is_ascii_alphanumeric() || c == '_';
        let glued_left = out.last().map(ends_with_bare_name).unwrap_or(false)
            && repl.first().and_then(first_char).map(name_char).unwrap_or(false);
        let glued_right = repl.last().map(ends_with_bare_name).unwrap_or(false)
            && pieces.get(i + 1).and_then(first_char).map(name_char).unwrap_or(false);
        if glued_left || glued_right {
            out.push(piece.clone());
            continue;
        }
        out.append(&mut repl);
    }

    let new = join(out);
    if command_name {
        if let Some(s) = new.string() {
            if RESERVED_WORDS.contains(s) || s.contains('=') {
                return;
            }
        }
    }
    *arg = new;
}
