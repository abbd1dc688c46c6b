//! Word Parser
//!
//! Splits one shell word into fragments: raw literal text, variable
//! references, command substitutions, arithmetic expansions and process
//! substitutions. Literal fragments keep their quotes and escapes verbatim.

use crate::ast::types::{Arg, Subarg, Variable};
use crate::parser::parser::{with_parser_stack, ParseResult, Parser};
use crate::parser::types::{
    is_blank, is_name_char, is_name_start, is_special_var, is_word_end, ParseError,
};

/// Where a word is being read, which decides what ends it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgContext {
    /// Command word: ends at an unquoted blank or operator
    Normal,
    /// Word inside `[[ ]]`: ends at blanks, `&&` and `||`
    Cond,
    /// Array subscript: ends at the matching `]`
    Index,
    /// Parameter manipulation: ends at the matching `}`
    Manip,
    /// Here-document body ending at the given offset, quotes are plain text
    Heredoc(usize),
}

impl<'a> Parser<'a> {
    /// Parse one word starting at `i`
    pub(crate) fn parse_arg(&mut self, i: usize, ctx: ArgContext) -> ParseResult<(Arg, usize)> {
        let limit = match ctx {
            ArgContext::Heredoc(end) => end,
            _ => self.bytes.len(),
        };
        let heredoc = matches!(ctx, ArgContext::Heredoc(_));
        let mut arg = Arg::default();
        let mut lit_start = i;
        let mut j = i;
        let mut in_dq = false;
        let mut dq_start = i;
        let mut nesting = 0usize;

        while j < limit {
            let c = self.at(j);
            if !in_dq && !heredoc {
                let stop = match ctx {
                    ArgContext::Normal => is_word_end(c) && !self.is_procsub_start(j),
                    ArgContext::Cond => {
                        is_blank(c)
                            || c == b'\n'
                            || c == b';'
                            || self.starts(j, "&&")
                            || self.starts(j, "||")
                    }
                    ArgContext::Index => match c {
                        b'[' => {
                            nesting += 1;
                            false
                        }
                        b']' if nesting == 0 => true,
                        b']' => {
                            nesting -= 1;
                            false
                        }
                        _ => false,
                    },
                    ArgContext::Manip => match c {
                        b'{' => {
                            nesting += 1;
                            false
                        }
                        b'}' if nesting == 0 => true,
                        b'}' => {
                            nesting -= 1;
                            false
                        }
                        _ => false,
                    },
                    ArgContext::Heredoc(_) => false,
                };
                if stop {
                    break;
                }
            }

            match c {
                b'\'' if !in_dq && !heredoc => {
                    match self.src[j + 1..].find('\'') {
                        Some(p) => j = j + 1 + p + 1,
                        None => return Err(self.error(j, "unterminated single quote")),
                    }
                }
                b'"' if !heredoc => {
                    if !in_dq {
                        dq_start = j;
                    }
                    in_dq = !in_dq;
                    j += 1;
                }
                b'\\' => j = (j + 2).min(limit),
                b'$' if self.at(j + 1) == b'\'' && !in_dq && !heredoc => {
                    j = self.skip_ansi_quote(j)?;
                }
                b'$' => match self.parse_dollar(j, in_dq)? {
                    Some((sa, next)) => {
                        arg.push_literal(&self.src[lit_start..j]);
                        arg.push(sa);
                        j = next;
                        lit_start = next;
                    }
                    None => j += 1,
                },
                b'`' => {
                    let (sa, next) = self.parse_backtick(j, in_dq || heredoc)?;
                    arg.push_literal(&self.src[lit_start..j]);
                    arg.push(sa);
                    j = next;
                    lit_start = next;
                }
                b'<' | b'>' if !in_dq && !heredoc && self.is_procsub_start(j) => {
                    self.require_bash(j, "process substitution")?;
                    let (lst, k) = self.nested(j, |p| p.parse_list(j + 2, &[")"]))?;
                    let k = self.expect_symbol(k, ")")?;
                    arg.push_literal(&self.src[lit_start..j]);
                    arg.push(Subarg::Procsub {
                        lst,
                        output: c == b'>',
                    });
                    j = k;
                    lit_start = k;
                }
                _ => j += 1,
            }
        }
        if in_dq {
            return Err(self.error(dq_start, "unterminated double quote"));
        }
        let j = j.min(limit);
        arg.push_literal(&self.src[lit_start..j]);
        Ok((arg, j))
    }

    /// Skip a `$'...'` string, honoring backslash escapes
    fn skip_ansi_quote(&self, i: usize) -> ParseResult<usize> {
        let mut j = i + 2;
        loop {
            match self.at(j) {
                _ if self.eof(j) => return Err(self.error(i, "unterminated $' quote")),
                b'\\' => j += 2,
                b'\'' => return Ok(j + 1),
                _ => j += 1,
            }
        }
    }

    /// Parse the expansion introduced by `$` at `i`.
    ///
    /// Returns None when the `$` is literal.
    pub(crate) fn parse_dollar(&mut self, i: usize, quoted: bool) -> ParseResult<Option<(Subarg, usize)>> {
        let next = self.at(i + 1);
        if self.starts(i, "$((") {
            let saved = self.heredoc_end;
            match self.nested(i, |p| p.parse_arithmetic_expansion(i + 3)) {
                Ok((arith, k)) => {
                    return Ok(Some((Subarg::Arithmetic { arith, quoted }, k + 2)));
                }
                // $( (cmd) ) written without the space
                Err(arith_err) => {
                    self.heredoc_end = saved;
                    return match self.parse_cmd_substitution(i, quoted) {
                        Ok(res) => Ok(Some(res)),
                        Err(_) => Err(arith_err),
                    };
                }
            }
        }
        if next == b'(' {
            return self.parse_cmd_substitution(i, quoted).map(Some);
        }
        if next == b'{' {
            let (var, k) = self.parse_manipulation(i + 2)?;
            return Ok(Some((Subarg::Variable { var, quoted }, k)));
        }
        if is_name_start(next) {
            let mut k = i + 2;
            while is_name_char(self.at(k)) {
                k += 1;
            }
            let var = Variable::new(&self.src[i + 1..k]);
            return Ok(Some((Subarg::Variable { var, quoted }, k)));
        }
        if next.is_ascii_digit() || is_special_var(next) {
            let var = Variable::new((next as char).to_string());
            return Ok(Some((Subarg::Variable { var, quoted }, i + 2)));
        }
        Ok(None)
    }

    /// `$( list )` starting at `i`
    fn parse_cmd_substitution(&mut self, i: usize, quoted: bool) -> ParseResult<(Subarg, usize)> {
        let (lst, k) = self.nested(i, |p| p.parse_list(i + 2, &[")"]))?;
        let k = self.expect_symbol(k, ")")?;
        Ok((
            Subarg::Subshell {
                lst,
                quoted,
                backtick: false,
            },
            k,
        ))
    }

    /// `${...}` with `i` just after the opening brace
    fn parse_manipulation(&mut self, i: usize) -> ParseResult<(Variable, usize)> {
        let mut var = Variable {
            is_manip: true,
            ..Default::default()
        };
        let mut j = i;
        let c = self.at(j);
        if (c == b'#' || c == b'!') && self.at(j + 1) != b'}' {
            if c == b'!' {
                self.require_bash(j, "'${!'")?;
            }
            var.precedence = true;
            var.manip = Some(Arg::literal((c as char).to_string()));
            j += 1;
        }

        let c = self.at(j);
        let name_end = if is_name_start(c) {
            let mut k = j + 1;
            while is_name_char(self.at(k)) {
                k += 1;
            }
            k
        } else if c.is_ascii_digit() {
            let mut k = j + 1;
            while self.at(k).is_ascii_digit() {
                k += 1;
            }
            k
        } else if is_special_var(c) {
            j + 1
        } else {
            return Err(self.error(j, "bad substitution"));
        };
        var.name = self.src[j..name_end].to_string();
        j = name_end;

        if self.at(j) == b'[' {
            self.require_bash(j, "array subscript")?;
            let (idx, k) = self.parse_arg(j + 1, ArgContext::Index)?;
            j = self.expect_symbol(k, "]")?;
            var.index = Some(idx);
        }
        if self.at(j) == b'}' {
            return Ok((var, j + 1));
        }
        if var.precedence {
            return Err(self.error(j, "bad substitution"));
        }
        let (manip, k) = self.parse_arg(j, ArgContext::Manip)?;
        if self.at(k) != b'}' {
            return Err(self.error(k, "unterminated '${'"));
        }
        var.manip = Some(manip);
        Ok((var, k + 1))
    }

    /// `` `...` `` starting at `i`, parsed as a `$( )` substitution
    fn parse_backtick(&mut self, i: usize, quoted: bool) -> ParseResult<(Subarg, usize)> {
        let mut j = i + 1;
        loop {
            match self.at(j) {
                _ if self.eof(j) => return Err(self.error(i, "unterminated backtick")),
                b'\\' => j += 2,
                b'`' => break,
                _ => j += 1,
            }
        }
        let inner = unescape_backtick(&self.src[i + 1..j], quoted);
        let location = ParseError::at(self.src, i, "");

        let mut sub = Parser::new(&inner, self.bash);
        sub.depth = self.depth + 1;
        let lst = match sub.parse_list(0, &[]) {
            Ok((lst, end)) if sub.eof(end) => lst,
            Ok((_, end)) => return Err(self.wrap_backtick(sub.unexpected(end), &location)),
            Err(e) => return Err(self.wrap_backtick(e, &location)),
        };
        Ok((
            Subarg::Subshell {
                lst,
                quoted,
                backtick: false,
            },
            j + 1,
        ))
    }

    fn wrap_backtick(&self, e: ParseError, location: &ParseError) -> ParseError {
        e.within(format!(
            "backtick substitution at {}:{}",
            location.line, location.column
        ))
    }
}

/// Remove the escaping that backticks add over `$( )`
fn unescape_backtick(raw: &str, quoted: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('\\' | '`' | '$') => {
                    out.extend(chars.next());
                    continue;
                }
                Some('"') if quoted => {
                    out.extend(chars.next());
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

/// Parse a standalone word
pub fn parse_arg_str(input: &str, bash: bool) -> ParseResult<Arg> {
    with_parser_stack(input, || {
        let mut p = Parser::new(input, bash);
        let (arg, end) = p.parse_arg(0, ArgContext::Normal)?;
        if !p.eof(end) {
            return Err(p.unexpected(end));
        }
        Ok(arg)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::Arithmetic;

    fn word(input: &str) -> Arg {
        parse_arg_str(input, true).unwrap()
    }

    #[test]
    fn test_literal_keeps_quotes() {
        let arg = word("'a b'\"c\"\\ d");
        assert_eq!(arg.string(), Some("'a b'\"c\"\\ d"));
    }

    #[test]
    fn test_variable_fragments() {
        let arg = word("pre$A\"$B\"${C}");
        assert_eq!(arg.subargs.len(), 6);
        assert!(matches!(&arg.subargs[1], Subarg::Variable { var, quoted: false } if var.name == "A"));
        assert!(matches!(&arg.subargs[3], Subarg::Variable { var, quoted: true } if var.name == "B"));
        assert!(matches!(&arg.subargs[5], Subarg::Variable { var, .. } if var.is_plain_braced()));
    }

    #[test]
    fn test_special_variables() {
        for (input, name) in [("$1", "1"), ("$@", "@"), ("$#", "#"), ("$?", "?"), ("$$", "$")] {
            let arg = word(input);
            assert!(matches!(&arg.subargs[0], Subarg::Variable { var, .. } if var.name == name), "{}", input);
        }
        assert_eq!(word("a$").string(), Some("a$"));
    }

    #[test]
    fn test_manipulation() {
        let arg = word("${A:-\"x y\"}");
        let Subarg::Variable { var, .. } = &arg.subargs[0] else {
            panic!("expected variable");
        };
        assert_eq!(var.name, "A");
        assert_eq!(var.manip.as_ref().unwrap().string(), Some(":-\"x y\""));
    }

    #[test]
    fn test_nested_manipulation() {
        let arg = word("${A:-${B%x}}");
        let Subarg::Variable { var, .. } = &arg.subargs[0] else {
            panic!("expected variable");
        };
        let manip = var.manip.as_ref().unwrap();
        assert!(matches!(&manip.subargs[1], Subarg::Variable { var, .. } if var.name == "B"));
    }

    #[test]
    fn test_precedence_and_index() {
        let arg = word("${#A[@]}");
        let Subarg::Variable { var, .. } = &arg.subargs[0] else {
            panic!("expected variable");
        };
        assert!(var.precedence);
        assert_eq!(var.manip.as_ref().unwrap().string(), Some("#"));
        assert_eq!(var.index.as_ref().unwrap().string(), Some("@"));
        assert!(matches!(&word("${#}").subargs[0], Subarg::Variable { var, .. } if var.name == "#"));
    }

    #[test]
    fn test_command_substitution() {
        let arg = word("\"$(echo a)\"");
        assert!(matches!(&arg.subargs[1], Subarg::Subshell { quoted: true, lst, .. } if lst.cls.len() == 1));
    }

    #[test]
    fn test_backtick_becomes_substitution() {
        let arg = word("`echo \\$HOME`");
        let Subarg::Subshell { lst, backtick, .. } = &arg.subargs[0] else {
            panic!("expected subshell");
        };
        assert!(!backtick);
        let cmd = lst.cls[0].single_cmd().unwrap();
        assert!(matches!(&cmd.args.args[1].subargs[0], Subarg::Variable { var, .. } if var.name == "HOME"));
    }

    #[test]
    fn test_backtick_error_origin() {
        let err = parse_arg_str("x`echo )`", false).unwrap_err();
        assert!(err.origin[0].starts_with("backtick substitution at 1:2"));
    }

    #[test]
    fn test_arithmetic_expansion() {
        let arg = word("$((1 + 2))");
        assert!(matches!(
            &arg.subargs[0],
            Subarg::Arithmetic { arith: Arithmetic::Operation { op, .. }, .. } if op == "+"
        ));
    }

    #[test]
    fn test_dollar_double_paren_subshell_fallback() {
        let arg = word("$((echo a) | cat)");
        assert!(matches!(&arg.subargs[0], Subarg::Subshell { .. }));
    }

    #[test]
    fn test_process_substitution() {
        let arg = word("<(ls)");
        assert!(matches!(&arg.subargs[0], Subarg::Procsub { output: false, .. }));
        assert!(parse_arg_str("<(ls)", false).is_err());
    }

    #[test]
    fn test_ansi_quote_is_literal() {
        assert_eq!(word("$'a\\'b'").string(), Some("$'a\\'b'"));
    }

    #[test]
    fn test_unterminated_quotes() {
        assert!(parse_arg_str("'abc", false).unwrap_err().message.contains("single quote"));
        assert!(parse_arg_str("\"abc", false).unwrap_err().message.contains("double quote"));
    }

    #[test]
    fn test_unescape_backtick() {
        assert_eq!(unescape_backtick("a \\` \\\\ \\$x \\n", false), "a ` \\ $x \\n");
        assert_eq!(unescape_backtick("\\\"", true), "\"");
        assert_eq!(unescape_backtick("\\\"", false), "\\\"");
    }
}
