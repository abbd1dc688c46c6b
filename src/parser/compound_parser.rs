//! Compound Command Parser
//!
//! Handles parsing of compound commands: if, for, while, until, case,
//! subshell, brace group, function definitions and `[[ ]]`.

use crate::ast::types::{
    Arg, Arglist, Block, Brace, Case, CaseItem, Command, For, Function, If, IfBranch, List,
    Subshell, Variable, While,
};
use crate::parser::parser::{ParseResult, Parser};
use crate::parser::types::{is_valid_name, is_word_end};
use crate::parser::word_parser::ArgContext;

impl<'a> Parser<'a> {
    /// Parse a list that must hold at least one statement
    fn parse_body(
        &mut self,
        i: usize,
        terms: &[&str],
        what: &str,
    ) -> ParseResult<(List, usize)> {
        let (lst, j) = self.parse_list(i, terms)?;
        if lst.is_empty() {
            return Err(self.error(
                j,
                format!("empty {}: unexpected {}", what, self.describe(j)),
            ));
        }
        Ok((lst, j))
    }

    /// ( list )
    pub(crate) fn parse_subshell(&mut self, i: usize) -> ParseResult<(Block, usize)> {
        let (lst, j) = self.parse_body(i + 1, &[")"], "subshell")?;
        let j = self.expect_symbol(j, ")")?;
        Ok((
            Block::Subshell(Subshell {
                lst,
                redirs: Vec::new(),
            }),
            j,
        ))
    }

    /// { list }
    pub(crate) fn parse_brace(&mut self, i: usize) -> ParseResult<(Block, usize)> {
        let (lst, j) = self.parse_body(i + 1, &["}"], "brace group")?;
        let j = self.expect_keyword(j, "}")?;
        Ok((
            Block::Brace(Brace {
                lst,
                redirs: Vec::new(),
            }),
            j,
        ))
    }

    /// if list; then list; [elif list; then list;]... [else list;] fi
    pub(crate) fn parse_if(&mut self, i: usize) -> ParseResult<(Block, usize)> {
        let mut node = If::default();
        let mut i = i + 2;
        loop {
            let (cond, j) = self.parse_body(i, &["then"], "if condition")?;
            let j = self.expect_keyword(j, "then")?;
            let (body, k) = self.parse_body(j, &["elif", "else", "fi"], "then clause")?;
            node.blocks.push(IfBranch { cond, body });
            if self.keyword_at(k, "elif") {
                i = k + 4;
                continue;
            }
            if self.keyword_at(k, "else") {
                let (lst, m) = self.parse_body(k + 4, &["fi"], "else clause")?;
                node.else_lst = Some(lst);
                i = self.expect_keyword(m, "fi")?;
            } else {
                i = self.expect_keyword(k, "fi")?;
            }
            break;
        }
        Ok((Block::If(node), i))
    }

    /// for NAME [in WORDS]; do list; done
    pub(crate) fn parse_for(&mut self, i: usize) -> ParseResult<(Block, usize)> {
        let i = self.skip_blanks(i + 3);
        if self.starts(i, "((") {
            return Err(self.error(i, "arithmetic for loop is not supported"));
        }
        let end = (i..self.bytes.len())
            .find(|e| is_word_end(self.at(*e)))
            .unwrap_or(self.bytes.len());
        let name = &self.src[i..end];
        if !is_valid_name(name) {
            return Err(self.error(i, format!("bad for loop variable {}", self.describe(i))));
        }
        let mut node = For {
            var: Variable::definition(name),
            ..Default::default()
        };

        let mut j = self.skip_blanks(end);
        if self.at(j) == b';' {
            j += 1;
        }
        j = self.skip_separators(j);
        if self.keyword_at(j, "in") {
            let mut words = Arglist::default();
            j += 2;
            loop {
                j = self.skip_blanks(j);
                match self.at(j) {
                    b';' => {
                        j += 1;
                        break;
                    }
                    b'\n' | b'#' => break,
                    _ if self.eof(j) => break,
                    c if is_word_end(c) => return Err(self.unexpected(j)),
                    _ => {
                        let (arg, k) = self.parse_arg(j, ArgContext::Normal)?;
                        words.args.push(arg);
                        j = k;
                    }
                }
            }
            node.iter = Some(words);
            j = self.skip_separators(j);
        }
        let j = self.expect_keyword(j, "do")?;
        let (ops, k) = self.parse_body(j, &["done"], "loop body")?;
        node.ops = ops;
        let k = self.expect_keyword(k, "done")?;
        Ok((Block::For(node), k))
    }

    /// while list; do list; done, until stored with a negated condition
    pub(crate) fn parse_while(&mut self, i: usize, until: bool) -> ParseResult<(Block, usize)> {
        // "while" and "until" have the same length
        let (mut cond, j) = self.parse_body(i + 5, &["do"], "loop condition")?;
        let j = self.expect_keyword(j, "do")?;
        let (ops, k) = self.parse_body(j, &["done"], "loop body")?;
        let k = self.expect_keyword(k, "done")?;
        if until {
            if let Some(last) = cond.cls.last_mut() {
                last.negate();
            }
        }
        Ok((
            Block::While(While {
                cond,
                ops,
                redirs: Vec::new(),
            }),
            k,
        ))
    }

    /// case WORD in [(]PATTERN[|PATTERN]...) list;; ... esac
    pub(crate) fn parse_case(&mut self, i: usize) -> ParseResult<(Block, usize)> {
        let i = self.skip_blanks(i + 4);
        if self.eof(i) || is_word_end(self.at(i)) {
            return Err(self.error(i, format!("expecting case word, found {}", self.describe(i))));
        }
        let (carg, j) = self.parse_arg(i, ArgContext::Normal)?;
        let j = self.skip_separators(j);
        let mut j = self.expect_keyword(j, "in")?;
        let mut node = Case {
            carg,
            ..Default::default()
        };

        loop {
            j = self.skip_separators(j);
            if self.keyword_at(j, "esac") {
                j += 4;
                break;
            }
            if self.eof(j) {
                return Err(self.error(j, "expecting 'esac', found end of file"));
            }
            if self.at(j) == b'(' {
                j = self.skip_blanks(j + 1);
            }
            let mut item = CaseItem::default();
            loop {
                j = self.skip_blanks(j);
                if self.eof(j) || is_word_end(self.at(j)) {
                    return Err(self.error(
                        j,
                        format!("expecting case pattern, found {}", self.describe(j)),
                    ));
                }
                let (pat, k) = self.parse_arg(j, ArgContext::Normal)?;
                item.patterns.push(pat);
                j = self.skip_blanks(k);
                match self.at(j) {
                    b'|' => j += 1,
                    b')' => {
                        j += 1;
                        break;
                    }
                    _ => {
                        return Err(self.error(
                            j,
                            format!("expecting ')', found {}", self.describe(j)),
                        ))
                    }
                }
            }
            let (body, k) = self.parse_list(j, &[";;", "esac"])?;
            item.body = body;
            node.cases.push(item);
            j = k;
            if self.starts(j, ";;&") || self.starts(j, ";&") {
                return Err(self.error(j, "case fall-through is not supported"));
            }
            if self.starts(j, ";;") {
                j += 2;
            } else if !self.keyword_at(j, "esac") {
                return Err(self.error(j, format!("expecting 'esac', found {}", self.describe(j))));
            }
        }
        Ok((Block::Case(node), j))
    }

    /// Position after the name when `name ( )` starts at `i`
    pub(crate) fn function_def_at(&self, i: usize) -> Option<usize> {
        let end = (i..self.bytes.len())
            .find(|e| {
                let c = self.at(*e);
                is_word_end(c) || matches!(c, b'"' | b'\'' | b'$' | b'`' | b'\\' | b'=')
            })
            .unwrap_or(self.bytes.len());
        if end == i || self.at(end) == b'=' {
            return None;
        }
        let j = self.skip_blanks(end);
        if self.at(j) != b'(' {
            return None;
        }
        let k = self.skip_blanks(j + 1);
        (self.at(k) == b')').then_some(end)
    }

    /// name() { list }
    pub(crate) fn parse_function(&mut self, i: usize, name_end: usize) -> ParseResult<(Block, usize)> {
        let name = self.src[i..name_end].to_string();
        let j = self.skip_blanks(name_end);
        let j = self.skip_blanks(j + 1);
        self.parse_function_body(name, j + 1)
    }

    /// function name [()] { list }
    pub(crate) fn parse_function_keyword(&mut self, i: usize) -> ParseResult<(Block, usize)> {
        let i = self.skip_blanks(i + 8);
        let end = (i..self.bytes.len())
            .find(|e| is_word_end(self.at(*e)))
            .unwrap_or(self.bytes.len());
        if end == i {
            return Err(self.error(i, format!("expecting function name, found {}", self.describe(i))));
        }
        let name = self.src[i..end].to_string();
        let mut j = self.skip_blanks(end);
        if self.at(j) == b'(' {
            j = self.skip_blanks(j + 1);
            j = self.expect_symbol(j, ")")?;
        }
        self.parse_function_body(name, j)
    }

    fn parse_function_body(&mut self, name: String, i: usize) -> ParseResult<(Block, usize)> {
        let j = self.skip_separators(i);
        if !self.keyword_at(j, "{") {
            return Err(self.error(
                j,
                format!("function body of '{}' must be a brace group", name),
            ));
        }
        let (lst, k) = self.parse_body(j + 1, &["}"], "function body")?;
        let k = self.expect_keyword(k, "}")?;
        let mut func = Function {
            name,
            lst,
            redirs: Vec::new(),
        };
        let mut k = k;
        loop {
            let m = self.skip_blanks(k);
            if !self.is_redirect_start(m)? {
                break;
            }
            let (r, next) = self.parse_redirect(m)?;
            func.redirs.push(r);
            k = next;
        }
        Ok((Block::Function(func), k))
    }

    /// [[ expression ]], kept as a command whose words are the tokens
    pub(crate) fn parse_double_bracket(&mut self, i: usize) -> ParseResult<(Block, usize)> {
        let mut cmd = Command::new(vec![Arg::literal("[[")]);
        let mut j = i + 2;
        loop {
            j = self.skip_blanks(j);
            if self.at(j) == b'\n' {
                j = self.newline(j);
                continue;
            }
            if self.eof(j) {
                return Err(self.error(j, "expecting ']]', found end of file"));
            }
            if self.keyword_at(j, "]]") {
                cmd.args.args.push(Arg::literal("]]"));
                j += 2;
                break;
            }
            let op = ["&&", "||", "(", ")", "<", ">"]
                .into_iter()
                .find(|op| self.starts(j, op));
            if let Some(op) = op {
                cmd.args.args.push(Arg::literal(op));
                j += op.len();
                continue;
            }
            if matches!(self.at(j), b';' | b'&' | b'|') {
                return Err(self.unexpected(j));
            }
            let (arg, k) = self.parse_arg(j, ArgContext::Cond)?;
            cmd.args.args.push(arg);
            j = k;
        }
        Ok((Block::Command(cmd), j))
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::types::{Block, Script};
    use crate::parser::types::ParseOptions;
    use crate::parser::parse_script;

    fn parse(input: &str) -> Script {
        parse_script(input, &ParseOptions::default()).unwrap()
    }

    fn parse_bash(input: &str) -> Script {
        parse_script(
            input,
            &ParseOptions {
                bash: Some(true),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn first(sc: &Script) -> &Block {
        &sc.lst.cls[0].pls[0].cmds[0]
    }

    #[test]
    fn test_parse_if_elif_else() {
        let sc = parse("if a; then b; elif c\nthen d; else e; fi");
        let Block::If(node) = first(&sc) else {
            panic!("expected if");
        };
        assert_eq!(node.blocks.len(), 2);
        assert!(node.else_lst.is_some());
    }

    #[test]
    fn test_parse_if_empty_body_errors() {
        let err = parse_script("if a; then fi", &ParseOptions::default()).unwrap_err();
        assert!(err.message.contains("empty then clause"));
    }

    #[test]
    fn test_parse_for() {
        let sc = parse("for i in a \"b c\" $d; do echo $i; done");
        let Block::For(node) = first(&sc) else {
            panic!("expected for");
        };
        assert_eq!(node.var.name, "i");
        assert!(node.var.definition);
        assert_eq!(node.iter.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn test_parse_for_without_in() {
        let sc = parse("for i\ndo\n  echo $i\ndone");
        let Block::For(node) = first(&sc) else {
            panic!("expected for");
        };
        assert!(node.iter.is_none());
    }

    #[test]
    fn test_parse_until_negates_condition() {
        let sc = parse("until a && b; do c; done");
        let Block::While(node) = first(&sc) else {
            panic!("expected while");
        };
        let cl = &node.cond.cls[0];
        assert!(cl.pls.iter().all(|p| p.negated));
        assert_eq!(cl.or_ops, vec![true]);
    }

    #[test]
    fn test_parse_case() {
        let sc = parse("case $x in\n  a|b) echo ab ;;\n  (c) ;;\n  *) echo other\nesac");
        let Block::Case(node) = first(&sc) else {
            panic!("expected case");
        };
        assert_eq!(node.cases.len(), 3);
        assert_eq!(node.cases[0].patterns.len(), 2);
        assert!(node.cases[1].body.is_empty());
        assert_eq!(node.cases[2].patterns[0].string(), Some("*"));
    }

    #[test]
    fn test_parse_case_inside_substitution() {
        let sc = parse("x=$(case a in a) echo 1;; esac)");
        assert_eq!(sc.lst.cls.len(), 1);
    }

    #[test]
    fn test_parse_function() {
        let sc = parse("f() {\n  echo hi\n} >/dev/null");
        let Block::Function(func) = first(&sc) else {
            panic!("expected function");
        };
        assert_eq!(func.name, "f");
        assert_eq!(func.redirs.len(), 1);
    }

    #[test]
    fn test_parse_function_keyword() {
        let sc = parse_bash("function g { true; }");
        let Block::Function(func) = first(&sc) else {
            panic!("expected function");
        };
        assert_eq!(func.name, "g");
    }

    #[test]
    fn test_function_body_must_be_brace() {
        let err = parse_script("f() ( true )", &ParseOptions::default()).unwrap_err();
        assert!(err.message.contains("brace group"));
    }

    #[test]
    fn test_parse_subshell_and_brace_redirects() {
        let sc = parse("( a; b ) >out; { c; } 2>&1");
        assert_eq!(sc.lst.cls.len(), 2);
        assert!(matches!(first(&sc), Block::Subshell(_)));
        assert_eq!(first(&sc).redirs()[0].op, ">");
        let brace = &sc.lst.cls[1].pls[0].cmds[0];
        assert_eq!(brace.redirs()[0].op, "2>&");
    }

    #[test]
    fn test_parse_double_bracket() {
        let sc = parse_bash("[[ $a == b* && ( -n $c ) ]]");
        let Block::Command(cmd) = first(&sc) else {
            panic!("expected command");
        };
        let words: Vec<_> = cmd.args.args.iter().map(|a| a.string().unwrap_or("<exp>")).collect();
        assert_eq!(words, vec!["[[", "<exp>", "==", "b*", "&&", "(", "-n", "<exp>", ")", "]]"]);
    }

    #[test]
    fn test_double_bracket_requires_bash() {
        let err = parse_script("[[ a ]]", &ParseOptions::default()).unwrap_err();
        assert!(err.message.contains("bash-only"));
    }

    #[test]
    fn test_arithmetic_command_unsupported() {
        let err = parse_script(
            "((i++))",
            &ParseOptions {
                bash: Some(true),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.message.contains("not supported"));
    }
}
