//! Command Parser
//!
//! Handles parsing of simple commands, assignments, declaration operands,
//! redirections and here-documents.

use crate::ast::types::{
    Arg, Arglist, AssignValue, Assignment, Command, DeclItem, Redirect, Variable,
};
use crate::parser::parser::{ParseResult, Parser};
use crate::parser::types::{is_name_char, is_name_start, is_valid_name, is_word_end, CMDVAR_BUILTINS};
use crate::parser::word_parser::ArgContext;

/// Redirect operators, longest first
const REDIRECT_OPS: &[&str] = &["<<<", "<<-", "<<", "<>", "<&", "<", ">>", ">&", ">|", ">"];

impl<'a> Parser<'a> {
    /// Parse a simple command: assignments, words and redirects
    pub(crate) fn parse_cmd(&mut self, i: usize) -> ParseResult<(Command, usize)> {
        let mut cmd = Command::default();
        let mut i = i;
        loop {
            i = self.skip_blanks(i);
            if self.eof(i) || self.at(i) == b'#' {
                break;
            }
            if self.is_redirect_start(i)? {
                let (r, next) = self.parse_redirect(i)?;
                cmd.redirs.push(r);
                i = next;
                continue;
            }
            let c = self.at(i);
            if c == b'(' {
                return Err(self.unexpected(i));
            }
            if is_word_end(c) && !self.is_procsub_start(i) {
                break;
            }

            if cmd.args.is_empty() && self.is_assignment_start(i)? {
                let (a, next) = self.parse_assignment(i)?;
                cmd.var_assigns.push(a);
                i = next;
                continue;
            }
            if cmd.is_cmdvar {
                let (item, next) = self.parse_decl_item(i)?;
                cmd.cmd_var_assigns.push(item);
                i = next;
                continue;
            }

            let (arg, next) = self.parse_arg(i, ArgContext::Normal)?;
            if cmd.args.is_empty() {
                if let Some(name) = arg.string() {
                    cmd.is_cmdvar = CMDVAR_BUILTINS.contains(name);
                }
            }
            cmd.args.args.push(arg);
            i = next;
        }
        if cmd.args.is_empty() && cmd.var_assigns.is_empty() && cmd.redirs.is_empty() {
            return Err(self.error(i, format!("expecting command, found {}", self.describe(i))));
        }
        Ok((cmd, i))
    }

    // =========================================================================
    // ASSIGNMENTS
    // =========================================================================

    /// Whether `NAME=`, `NAME+=` or `NAME[...]=` starts at `i`.
    ///
    /// The bash forms are rejected in sh mode.
    pub(crate) fn is_assignment_start(&self, i: usize) -> ParseResult<bool> {
        if !is_name_start(self.at(i)) {
            return Ok(false);
        }
        let mut j = i + 1;
        while is_name_char(self.at(j)) {
            j += 1;
        }
        if self.at(j) == b'=' {
            return Ok(true);
        }
        let mut bash_form = None;
        if self.at(j) == b'[' {
            let mut depth = 0usize;
            let mut k = j;
            loop {
                match self.at(k) {
                    0 | b'\n' => return Ok(false),
                    b'[' => depth += 1,
                    b']' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                k += 1;
            }
            bash_form = Some("'NAME[INDEX]='");
            j = k + 1;
        }
        if self.starts(j, "+=") {
            bash_form = Some("'+='");
            j += 1;
        }
        match bash_form {
            Some(what) if self.at(j) == b'=' => {
                self.require_bash(i, what)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// NAME[INDEX]+=VALUE or NAME=(ELEMENTS)
    pub(crate) fn parse_assignment(&mut self, i: usize) -> ParseResult<(Assignment, usize)> {
        let mut j = i;
        while is_name_char(self.at(j)) {
            j += 1;
        }
        let mut var = Variable::definition(&self.src[i..j]);
        if self.at(j) == b'[' {
            let (idx, k) = self.parse_arg(j + 1, ArgContext::Index)?;
            j = self.expect_symbol(k, "]")?;
            var.index = Some(idx);
        }
        let append = self.at(j) == b'+';
        if append {
            j += 1;
        }
        j = self.expect_symbol(j, "=")?;

        let value = if self.at(j) == b'(' {
            self.require_bash(j, "array assignment")?;
            let (elems, k) = self.parse_array_elements(j + 1)?;
            j = k;
            Some(AssignValue::Array(elems))
        } else if self.eof(j) || is_word_end(self.at(j)) {
            None
        } else {
            let (val, k) = self.parse_arg(j, ArgContext::Normal)?;
            j = k;
            Some(AssignValue::Scalar(val))
        };
        Ok((Assignment { var, append, value }, j))
    }

    /// Elements of `( ... )` up to and including the closing parenthesis
    fn parse_array_elements(&mut self, i: usize) -> ParseResult<(Arglist, usize)> {
        let mut elems = Arglist::default();
        let mut j = i;
        loop {
            j = self.skip_separators(j);
            if self.at(j) == b')' {
                return Ok((elems, j + 1));
            }
            if self.eof(j) {
                return Err(self.error(j, "expecting ')', found end of file"));
            }
            if is_word_end(self.at(j)) {
                return Err(self.unexpected(j));
            }
            let (arg, k) = self.parse_arg(j, ArgContext::Normal)?;
            elems.args.push(arg);
            j = k;
        }
    }

    /// Operand of export/readonly/local/declare/typeset
    fn parse_decl_item(&mut self, i: usize) -> ParseResult<(DeclItem, usize)> {
        if self.is_assignment_start(i)? {
            let (a, j) = self.parse_assignment(i)?;
            return Ok((DeclItem::Assign(a), j));
        }
        let (arg, j) = self.parse_arg(i, ArgContext::Normal)?;
        let item = match arg.string() {
            Some(name) if is_valid_name(name) => DeclItem::Name(Variable::definition(name)),
            _ => DeclItem::Flag(arg),
        };
        Ok((item, j))
    }

    // =========================================================================
    // REDIRECTS
    // =========================================================================

    /// `<(` or `>(` at `i`
    pub(crate) fn is_procsub_start(&self, i: usize) -> bool {
        matches!(self.at(i), b'<' | b'>') && self.at(i + 1) == b'('
    }

    /// Whether a redirect starts at `i`
    pub(crate) fn is_redirect_start(&self, i: usize) -> ParseResult<bool> {
        if self.starts(i, "&>") {
            self.require_bash(i, "'&>'")?;
            return Ok(true);
        }
        let mut j = i;
        while self.at(j).is_ascii_digit() {
            j += 1;
        }
        if j == i && self.is_procsub_start(i) {
            return Ok(false);
        }
        Ok(matches!(self.at(j), b'<' | b'>'))
    }

    /// Parse one redirect starting at `i`
    pub(crate) fn parse_redirect(&mut self, i: usize) -> ParseResult<(Redirect, usize)> {
        let mut j = i;
        let op_end = if self.starts(i, "&>>") {
            i + 3
        } else if self.starts(i, "&>") {
            i + 2
        } else {
            while self.at(j).is_ascii_digit() {
                j += 1;
            }
            let op = REDIRECT_OPS
                .iter()
                .find(|op| self.starts(j, op))
                .ok_or_else(|| self.unexpected(j))?;
            if *op == "<<<" {
                self.require_bash(j, "'<<<'")?;
            }
            j + op.len()
        };
        let op = self.src[i..op_end].to_string();

        let t = self.skip_blanks(op_end);
        if self.eof(t) || (is_word_end(self.at(t)) && !self.is_procsub_start(t)) {
            return Err(self.error(
                t,
                format!("expecting redirect target, found {}", self.describe(t)),
            ));
        }
        let (target, k) = self.parse_arg(t, ArgContext::Normal)?;
        let mut redir = Redirect::new(op, target);

        let bare = redir.bare_op().to_string();
        if bare == "<<" || bare == "<<-" {
            let delim_raw = self.src[t..k].to_string();
            redir.here_document = Some(self.parse_heredoc_body(&delim_raw, k, bare == "<<-")?);
        }
        Ok((redir, k))
    }

    /// Read the here-document whose delimiter word is `delim_raw`.
    ///
    /// The body starts on the line after the redirect, or after the body of
    /// a previous here-document of the same line. Parsing resumes after the
    /// delimiter line once the current line is consumed.
    fn parse_heredoc_body(&mut self, delim_raw: &str, after: usize, strip_tabs: bool) -> ParseResult<Arg> {
        let quoted = delim_raw.contains(&['\'', '"', '\\'][..]);
        let delim = unquote_word(delim_raw);

        let body_start = match self.heredoc_end {
            Some(end) => end,
            None => match self.src[after..].find('\n') {
                Some(p) => after + p + 1,
                None => return Err(self.error(after, "here-document without body")),
            },
        };

        let mut p = body_start;
        let (body_end, resume) = loop {
            if self.eof(p) {
                return Err(self.error(
                    body_start,
                    format!("unterminated here-document, expecting '{}'", delim),
                ));
            }
            let line_end = self.src[p..].find('\n').map(|e| p + e).unwrap_or(self.bytes.len());
            let line = &self.src[p..line_end];
            let cmp = if strip_tabs { line.trim_start_matches('\t') } else { line };
            if cmp == delim {
                break (p, (line_end + 1).min(self.bytes.len()));
            }
            p = line_end + 1;
        };

        let body = if quoted || body_start == body_end {
            let raw = &self.src[body_start..body_end];
            if raw.is_empty() {
                Arg::default()
            } else {
                Arg::literal(raw)
            }
        } else {
            let saved = self.heredoc_end.take();
            let res = self.parse_arg(body_start, ArgContext::Heredoc(body_end));
            self.heredoc_end = saved;
            let (arg, _) = res.map_err(|e| e.within(format!("here-document '{}'", delim)))?;
            arg
        };
        self.heredoc_end = Some(resume);
        Ok(body)
    }
}

/// Word text with quoting removed
pub(crate) fn unquote_word(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    let mut quote: Option<char> = None;
    while let Some(c) = chars.next() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (q, '\\') if q != Some('\'') => {
                if let Some(n) = chars.next() {
                    out.push(n);
                }
            }
            (_, c) => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{Block, Script, Subarg};
    use crate::parser::parse_script;
    use crate::parser::types::ParseOptions;

    fn parse_with(input: &str, bash: bool) -> Script {
        parse_script(
            input,
            &ParseOptions {
                bash: Some(bash),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn first_cmd(sc: &Script) -> &Command {
        sc.lst.cls[0].single_cmd().unwrap()
    }

    #[test]
    fn test_unquote_word() {
        assert_eq!(unquote_word("'EOF'"), "EOF");
        assert_eq!(unquote_word("\"E\"OF"), "EOF");
        assert_eq!(unquote_word("\\EOF"), "EOF");
    }

    #[test]
    fn test_parse_assignments_before_command() {
        let sc = parse_with("A=1 B= env", false);
        let cmd = first_cmd(&sc);
        assert_eq!(cmd.var_assigns.len(), 2);
        assert!(cmd.var_assigns[1].value.is_none());
        assert_eq!(cmd.name(), Some("env"));
    }

    #[test]
    fn test_assignment_after_name_is_argument() {
        let sc = parse_with("echo a=1", false);
        assert_eq!(first_cmd(&sc).args.len(), 2);
    }

    #[test]
    fn test_parse_bash_assignments() {
        let sc = parse_with("a=(x \"y z\"\n w) a[1]+=v", true);
        let cmd = first_cmd(&sc);
        let Some(AssignValue::Array(elems)) = &cmd.var_assigns[0].value else {
            panic!("expected array");
        };
        assert_eq!(elems.len(), 3);
        assert!(cmd.var_assigns[1].append);
        assert_eq!(cmd.var_assigns[1].var.index.as_ref().unwrap().string(), Some("1"));
    }

    #[test]
    fn test_bash_assignments_rejected_in_sh() {
        for input in ["a+=1", "a[1]=2", "a=(1)"] {
            let err = parse_script(
                input,
                &ParseOptions {
                    bash: Some(false),
                    ..Default::default()
                },
            )
            .unwrap_err();
            assert!(err.message.contains("bash-only"), "{}", input);
        }
    }

    #[test]
    fn test_parse_cmdvar() {
        let sc = parse_with("export -n A=1 B", false);
        let cmd = first_cmd(&sc);
        assert!(cmd.is_cmdvar);
        assert_eq!(cmd.args.len(), 1);
        assert!(matches!(cmd.cmd_var_assigns[0], DeclItem::Flag(_)));
        assert!(matches!(cmd.cmd_var_assigns[1], DeclItem::Assign(_)));
        assert!(matches!(&cmd.cmd_var_assigns[2], DeclItem::Name(v) if v.name == "B"));
    }

    #[test]
    fn test_parse_redirects() {
        let sc = parse_with("cmd <in >out 2>&1 3>>log", false);
        let ops: Vec<_> = first_cmd(&sc).redirs.iter().map(|r| r.op.as_str()).collect();
        assert_eq!(ops, vec!["<", ">", "2>&", "3>>"]);
    }

    #[test]
    fn test_parse_redirect_only_command() {
        let sc = parse_with(">file", false);
        let cmd = first_cmd(&sc);
        assert!(cmd.args.is_empty());
        assert_eq!(cmd.redirs.len(), 1);
    }

    #[test]
    fn test_digit_word_is_not_redirect() {
        let sc = parse_with("echo 2 3a", false);
        assert_eq!(first_cmd(&sc).args.len(), 3);
    }

    #[test]
    fn test_parse_bash_redirects() {
        let sc = parse_with("cmd &>out <<<\"$x\"", true);
        let ops: Vec<_> = first_cmd(&sc).redirs.iter().map(|r| r.op.as_str()).collect();
        assert_eq!(ops, vec!["&>", "<<<"]);
    }

    #[test]
    fn test_parse_procsub_redirect_target() {
        let sc = parse_with("while read -r l; do echo \"$l\"; done < <(printf '1\\n2\\n')", true);
        let redirs = sc.lst.cls[0].pls[0].cmds[0].redirs();
        assert_eq!(redirs.len(), 1);
        assert_eq!(redirs[0].op, "<");
        assert!(matches!(
            redirs[0].target.subargs.as_slice(),
            [Subarg::Procsub { output: false, .. }]
        ));

        let sc = parse_with("cat < <(ls) >(wc)", true);
        let cmd = first_cmd(&sc);
        assert_eq!(cmd.redirs.len(), 1);
        assert_eq!(cmd.args.len(), 2);
    }

    #[test]
    fn test_parse_heredoc() {
        let sc = parse_with("cat <<EOF | tr a b\nhello $name\nEOF\necho done", false);
        assert_eq!(sc.lst.cls.len(), 2);
        let Block::Command(cat) = &sc.lst.cls[0].pls[0].cmds[0] else {
            panic!("expected command");
        };
        let doc = cat.redirs[0].here_document.as_ref().unwrap();
        assert_eq!(doc.subargs[0], Subarg::Literal("hello ".into()));
        assert!(matches!(doc.subargs[1], Subarg::Variable { .. }));
        assert_eq!(doc.subargs[2], Subarg::Literal("\n".into()));
        assert_eq!(sc.lst.cls[0].pls[0].cmds.len(), 2);
    }

    #[test]
    fn test_parse_quoted_heredoc_is_literal() {
        let sc = parse_with("cat <<'EOF'\n$x `y`\nEOF\n", false);
        let doc = first_cmd(&sc).redirs[0].here_document.as_ref().unwrap();
        assert_eq!(doc.string(), Some("$x `y`\n"));
    }

    #[test]
    fn test_parse_two_heredocs_same_line() {
        let sc = parse_with("cat <<A; cat <<-B\none\nA\n\ttwo\n\tB\necho end\n", false);
        assert_eq!(sc.lst.cls.len(), 3);
        let a = sc.lst.cls[0].single_cmd().unwrap().redirs[0].here_document.as_ref().unwrap();
        let b = sc.lst.cls[1].single_cmd().unwrap().redirs[0].here_document.as_ref().unwrap();
        assert_eq!(a.string(), Some("one\n"));
        assert_eq!(b.string(), Some("\ttwo\n"));
        assert_eq!(sc.lst.cls[2].single_cmd().unwrap().name(), Some("echo"));
    }

    #[test]
    fn test_unterminated_heredoc() {
        let err = parse_script("cat <<EOF\nabc\n", &ParseOptions::default()).unwrap_err();
        assert!(err.message.contains("unterminated here-document"));
    }
}
