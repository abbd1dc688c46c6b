//! Recursive Descent Parser for shell scripts
//!
//! The parser works directly on the source bytes: there is no separate lexer
//! because tokenization in shell depends on the grammatical context (a `}` or
//! `then` is only a keyword at command start, `)` ends a case pattern, ...).
//!
//! Grammar (simplified):
//!   script       ::= [shebang] list
//!   list         ::= (condlist (';' | '&' | '\n'))*
//!   condlist     ::= pipeline (('&&' | '||') newline* pipeline)* ['&']
//!   pipeline     ::= ['!'] block ('|' newline* block)*
//!   block        ::= compound redirect* | function | command
//!   compound     ::= if | for | while | until | case | '(' list ')' | '{' list '}'
//!   command      ::= (assignment | redirect)* (word | redirect)*
//!
//! The parser is split over several files, each adding methods to [`Parser`]:
//! compound commands, simple commands and redirects, words, arithmetic.

use crate::ast::types::{Arg, Block, Condlist, List, Pipeline, Redirect, Script};
use crate::parser::types::{
    is_bash_shebang, is_blank, is_word_end, ParseError, ParseOptions, MAX_INPUT_SIZE,
    MAX_PARSER_DEPTH, PARSER_STACK_SIZE,
};
use tracing::debug;

pub type ParseResult<T> = Result<T, ParseError>;

/// Parser state over one source unit
pub struct Parser<'a> {
    pub(crate) src: &'a str,
    pub(crate) bytes: &'a [u8],
    /// Bash extensions are accepted
    pub(crate) bash: bool,
    /// Current nesting depth of blocks and substitutions
    pub(crate) depth: usize,
    /// Where parsing resumes after the newline that ends a line holding
    /// here-document redirects
    pub(crate) heredoc_end: Option<usize>,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str, bash: bool) -> Self {
        Parser {
            src,
            bytes: src.as_bytes(),
            bash,
            depth: 0,
            heredoc_end: None,
        }
    }

    // =========================================================================
    // POSITION HELPERS
    // =========================================================================

    /// Byte at `i`, 0 past the end
    #[inline]
    pub(crate) fn at(&self, i: usize) -> u8 {
        self.bytes.get(i).copied().unwrap_or(0)
    }

    #[inline]
    pub(crate) fn eof(&self, i: usize) -> bool {
        i >= self.bytes.len()
    }

    #[inline]
    pub(crate) fn starts(&self, i: usize, s: &str) -> bool {
        self.bytes
            .get(i..)
            .map(|b| b.starts_with(s.as_bytes()))
            .unwrap_or(false)
    }

    /// `word` at `i` followed by a word boundary
    pub(crate) fn keyword_at(&self, i: usize, word: &str) -> bool {
        self.starts(i, word) && {
            let after = i + word.len();
            self.eof(after) || is_word_end(self.at(after))
        }
    }

    pub(crate) fn error(&self, i: usize, message: impl Into<String>) -> ParseError {
        ParseError::at(self.src, i, message)
    }

    /// Describe the token at `i` for error messages
    pub(crate) fn describe(&self, i: usize) -> String {
        if self.eof(i) {
            return "end of file".to_string();
        }
        let end = if is_word_end(self.at(i)) {
            i + 1
        } else {
            (i..self.bytes.len())
                .find(|e| is_word_end(self.at(*e)))
                .unwrap_or(self.bytes.len())
        };
        match self.src.get(i..end) {
            Some("\n") => "newline".to_string(),
            Some(tok) => format!("'{}'", tok),
            None => "invalid character".to_string(),
        }
    }

    pub(crate) fn unexpected(&self, i: usize) -> ParseError {
        self.error(i, format!("unexpected {}", self.describe(i)))
    }

    /// Fail unless the keyword `word` is at `i`, return the position after it
    pub(crate) fn expect_keyword(&self, i: usize, word: &str) -> ParseResult<usize> {
        if self.keyword_at(i, word) {
            Ok(i + word.len())
        } else {
            Err(self.error(
                i,
                format!("expecting '{}', found {}", word, self.describe(i)),
            ))
        }
    }

    /// Fail unless the symbol `sym` is at `i`, return the position after it
    pub(crate) fn expect_symbol(&self, i: usize, sym: &str) -> ParseResult<usize> {
        if self.starts(i, sym) {
            Ok(i + sym.len())
        } else {
            Err(self.error(i, format!("expecting '{}', found {}", sym, self.describe(i))))
        }
    }

    /// Reject a bash construct in sh mode
    pub(crate) fn require_bash(&self, i: usize, what: &str) -> ParseResult<()> {
        if self.bash {
            Ok(())
        } else {
            Err(self.error(i, format!("bash-only construct {} in sh mode", what)))
        }
    }

    /// Run `f` one nesting level deeper
    pub(crate) fn nested<T>(
        &mut self,
        i: usize,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        if self.depth >= MAX_PARSER_DEPTH {
            return Err(self.error(i, "maximum nesting depth exceeded"));
        }
        self.depth += 1;
        let res = f(self);
        self.depth -= 1;
        res
    }

    // =========================================================================
    // SEPARATORS
    // =========================================================================

    /// Skip blanks and line continuations
    pub(crate) fn skip_blanks(&self, mut i: usize) -> usize {
        loop {
            if is_blank(self.at(i)) {
                i += 1;
            } else if self.starts(i, "\\\n") {
                i += 2;
            } else {
                return i;
            }
        }
    }

    /// Skip a comment up to (not including) its newline
    pub(crate) fn skip_comment(&self, i: usize) -> usize {
        if self.at(i) != b'#' {
            return i;
        }
        self.src[i..].find('\n').map(|p| i + p).unwrap_or(self.bytes.len())
    }

    /// Consume the newline at `i`, jumping over pending here-document bodies
    pub(crate) fn newline(&mut self, i: usize) -> usize {
        match self.heredoc_end.take() {
            Some(end) if end > i => end,
            _ => i + 1,
        }
    }

    /// Skip blanks, comments and newlines
    pub(crate) fn skip_separators(&mut self, mut i: usize) -> usize {
        loop {
            i = self.skip_blanks(i);
            match self.at(i) {
                b'#' => i = self.skip_comment(i),
                b'\n' => i = self.newline(i),
                _ => return i,
            }
        }
    }

    // =========================================================================
    // LISTS AND STATEMENTS
    // =========================================================================

    /// Whether one of the terminators `terms` is at `i`.
    ///
    /// Symbols (`)`, `;;`) match anywhere, words only as keywords.
    pub(crate) fn at_terminator(&self, i: usize, terms: &[&str]) -> bool {
        terms.iter().any(|t| match *t {
            ")" => self.at(i) == b')',
            ";;" => self.starts(i, ";;") || self.starts(i, ";&"),
            w => self.keyword_at(i, w),
        })
    }

    /// Parse statements until EOF or one of `terms`.
    ///
    /// Returns the list and the position of the terminator, which is left
    /// for the caller to check and consume.
    pub fn parse_list(&mut self, i: usize, terms: &[&str]) -> ParseResult<(List, usize)> {
        let mut lst = List::default();
        let mut i = i;
        loop {
            i = self.skip_separators(i);
            if self.eof(i) || self.at_terminator(i, terms) {
                break;
            }
            let (cl, next) = self.parse_condlist(i)?;
            let parallel = cl.parallel;
            lst.cls.push(cl);

            let j = self.skip_blanks(next);
            i = match self.at(j) {
                b';' if self.starts(j, ";;") || self.starts(j, ";&") => {
                    if terms.contains(&";;") {
                        j
                    } else {
                        return Err(self.unexpected(j));
                    }
                }
                b';' => j + 1,
                b'\n' | b'#' => j,
                _ if self.eof(j) || parallel || self.at_terminator(j, terms) => j,
                _ => return Err(self.unexpected(j)),
            };
        }
        Ok((lst, i))
    }

    /// Parse pipelines joined by `&&`/`||`
    pub fn parse_condlist(&mut self, i: usize) -> ParseResult<(Condlist, usize)> {
        let (pl, mut i) = self.parse_pipeline(i)?;
        let mut cl = Condlist::new(pl);
        loop {
            let j = self.skip_blanks(i);
            let or_op = if self.starts(j, "&&") {
                false
            } else if self.starts(j, "||") {
                true
            } else {
                i = j;
                break;
            };
            let j = self.skip_separators(j + 2);
            let (pl, next) = self.parse_pipeline(j)?;
            cl.add(pl, or_op);
            i = next;
        }
        if self.at(i) == b'&' && !self.starts(i, "&&") {
            cl.parallel = true;
            i += 1;
        }
        Ok((cl, i))
    }

    /// Parse blocks joined by `|`
    pub fn parse_pipeline(&mut self, i: usize) -> ParseResult<(Pipeline, usize)> {
        let mut i = self.skip_blanks(i);
        let mut negated = false;
        while self.at(i) == b'!' && (self.eof(i + 1) || is_word_end(self.at(i + 1))) {
            negated = !negated;
            i = self.skip_blanks(i + 1);
        }
        let (block, mut i) = self.parse_block(i)?;
        let mut pl = Pipeline {
            cmds: vec![block],
            negated,
        };
        loop {
            let j = self.skip_blanks(i);
            if self.at(j) != b'|' || self.at(j + 1) == b'|' {
                i = j;
                break;
            }
            let mut j = j + 1;
            if self.at(j) == b'&' {
                self.require_bash(j - 1, "'|&'")?;
                if let Some(last) = pl.cmds.last_mut() {
                    last.redirs_mut().push(Redirect::new("2>&", Arg::literal("1")));
                }
                j += 1;
            }
            let j = self.skip_separators(j);
            let (block, next) = self.parse_block(j)?;
            pl.cmds.push(block);
            i = next;
        }
        Ok((pl, i))
    }

    /// Parse one block: compound command, function definition or command
    pub fn parse_block(&mut self, i: usize) -> ParseResult<(Block, usize)> {
        self.nested(i, |p| p.parse_block_inner(i))
    }

    fn parse_block_inner(&mut self, i: usize) -> ParseResult<(Block, usize)> {
        if self.eof(i) {
            return Err(self.error(i, "expecting command, found end of file"));
        }
        for kw in ["then", "else", "elif", "fi", "do", "done", "esac", "}", "]]", "in"] {
            if self.keyword_at(i, kw) {
                return Err(self.unexpected(i));
            }
        }
        let (mut block, i) = match self.at(i) {
            b'(' if self.starts(i, "((") && self.bash => {
                return Err(self.error(i, "arithmetic command '((' is not supported"));
            }
            b'(' => self.parse_subshell(i)?,
            b')' | b';' | b'&' | b'|' | b'\n' => return Err(self.unexpected(i)),
            _ if self.keyword_at(i, "{") => self.parse_brace(i)?,
            _ if self.keyword_at(i, "if") => self.parse_if(i)?,
            _ if self.keyword_at(i, "for") => self.parse_for(i)?,
            _ if self.keyword_at(i, "while") => self.parse_while(i, false)?,
            _ if self.keyword_at(i, "until") => self.parse_while(i, true)?,
            _ if self.keyword_at(i, "case") => self.parse_case(i)?,
            _ if self.keyword_at(i, "function") && self.bash => {
                return self.parse_function_keyword(i);
            }
            _ if self.keyword_at(i, "[[") => {
                self.require_bash(i, "'[['")?;
                self.parse_double_bracket(i)?
            }
            _ => {
                if let Some(name_end) = self.function_def_at(i) {
                    return self.parse_function(i, name_end);
                }
                let (cmd, next) = self.parse_cmd(i)?;
                return Ok((Block::Command(cmd), next));
            }
        };
        let i = self.parse_block_redirects(i, block.redirs_mut())?;
        Ok((block, i))
    }

    /// Redirects trailing a compound command
    fn parse_block_redirects(&mut self, i: usize, redirs: &mut Vec<Redirect>) -> ParseResult<usize> {
        let mut i = i;
        loop {
            let j = self.skip_blanks(i);
            if !self.is_redirect_start(j)? {
                return Ok(j);
            }
            let (r, next) = self.parse_redirect(j)?;
            redirs.push(r);
            i = next;
        }
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Run `f` on a thread whose stack holds `MAX_PARSER_DEPTH` nesting levels.
///
/// Each level recurses through several productions, which the default
/// stack of a spawned thread cannot hold in unoptimized builds.
pub(crate) fn with_parser_stack<T, F>(input: &str, f: F) -> ParseResult<T>
where
    T: Send,
    F: FnOnce() -> ParseResult<T> + Send,
{
    std::thread::scope(|s| {
        let handle = std::thread::Builder::new()
            .name("lxsh-parser".to_string())
            .stack_size(PARSER_STACK_SIZE)
            .spawn_scoped(s, f)
            .map_err(|e| ParseError::at(input, 0, format!("cannot start parser: {}", e)))?;
        handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    })
}

/// Parse a complete script
pub fn parse_script(input: &str, options: &ParseOptions) -> ParseResult<Script> {
    with_parser_stack(input, || parse_script_inner(input, options))
}

fn parse_script_inner(input: &str, options: &ParseOptions) -> ParseResult<Script> {
    let with_origin = |e: ParseError| e.within(options.filename.clone());
    if input.len() > MAX_INPUT_SIZE {
        return Err(with_origin(ParseError::at(
            input,
            0,
            format!("input too large: {} bytes (max {})", input.len(), MAX_INPUT_SIZE),
        )));
    }

    let (shebang, start) = if input.starts_with("#!") {
        let end = input.find('\n').unwrap_or(input.len());
        (input[..end].to_string(), end)
    } else {
        (String::new(), 0)
    };
    let bash = options.bash.unwrap_or_else(|| is_bash_shebang(&shebang));
    debug!(filename = %options.filename, bash, "parsing script");

    let mut p = Parser::new(input, bash);
    let (lst, end) = p.parse_list(start, &[]).map_err(with_origin)?;
    if !p.eof(end) {
        return Err(with_origin(p.unexpected(end)));
    }
    Ok(Script {
        shebang,
        filename: options.filename.clone(),
        lst,
    })
}

/// Parse a fragment as a statement list
pub fn parse_list(input: &str, bash: bool) -> ParseResult<List> {
    with_parser_stack(input, || {
        let mut p = Parser::new(input, bash);
        let (lst, end) = p.parse_list(0, &[])?;
        if !p.eof(end) {
            return Err(p.unexpected(end));
        }
        Ok(lst)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{Block, Subarg};

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

    fn parse_err(input: &str) -> ParseError {
        parse_script(input, &ParseOptions::default()).unwrap_err()
    }

    #[test]
    fn test_parse_simple_command() {
        let sc = parse("echo hello world\n");
        assert_eq!(sc.lst.cls.len(), 1);
        let cmd = sc.lst.cls[0].single_cmd().unwrap();
        assert_eq!(cmd.name(), Some("echo"));
        assert_eq!(cmd.args.len(), 3);
    }

    #[test]
    fn test_parse_shebang_selects_bash() {
        let sc = parse("#!/bin/bash\na=(1 2)\n");
        assert_eq!(sc.shebang, "#!/bin/bash");
        assert_eq!(sc.lst.cls.len(), 1);
        assert!(parse_script("#!/bin/sh\na=(1 2)\n", &ParseOptions::default()).is_err());
    }

    #[test]
    fn test_parse_condlist() {
        let sc = parse("a && b || c &\nd");
        assert_eq!(sc.lst.cls.len(), 2);
        let cl = &sc.lst.cls[0];
        assert_eq!(cl.pls.len(), 3);
        assert_eq!(cl.or_ops, vec![false, true]);
        assert!(cl.parallel);
    }

    #[test]
    fn test_parse_condlist_newline_after_operator() {
        let sc = parse("a &&\n\n b");
        assert_eq!(sc.lst.cls.len(), 1);
        assert_eq!(sc.lst.cls[0].pls.len(), 2);
    }

    #[test]
    fn test_parse_pipeline() {
        let sc = parse("! a | b |\n c");
        let pl = &sc.lst.cls[0].pls[0];
        assert!(pl.negated);
        assert_eq!(pl.cmds.len(), 3);
    }

    #[test]
    fn test_parse_pipe_stderr() {
        let sc = parse_bash("a |& b");
        let pl = &sc.lst.cls[0].pls[0];
        assert_eq!(pl.cmds[0].redirs()[0].op, "2>&");
        assert!(parse_err("a |& b").message.contains("bash-only"));
    }

    #[test]
    fn test_parse_comments() {
        let sc = parse("# comment\na; b # trailing\n\nc");
        assert_eq!(sc.lst.cls.len(), 3);
        assert_eq!(sc.lst.cls[1].single_cmd().unwrap().args.len(), 1);
    }

    #[test]
    fn test_unexpected_token_errors() {
        assert!(parse_err("fi").message.contains("unexpected 'fi'"));
        assert!(parse_err("echo a )").message.contains("unexpected ')'"));
        assert!(parse_err("a ;; b").message.contains("unexpected"));
    }

    #[test]
    fn test_error_line_and_column() {
        let err = parse_err("echo ok\nif true; then\n  echo\n");
        assert_eq!(err.line, 4);
        assert!(err.message.contains("expecting 'fi'"));
    }

    #[test]
    fn test_error_carries_filename() {
        let err = parse_script(
            "done",
            &ParseOptions {
                filename: "x.sh".into(),
                bash: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("x.sh:1:1:"));
    }

    #[test]
    fn test_depth_limit() {
        let input = "(".repeat(MAX_PARSER_DEPTH + 5) + &")".repeat(MAX_PARSER_DEPTH + 5);
        let err = parse_err(&input);
        assert!(err.message.contains("depth"));
    }

    #[test]
    fn test_deep_nesting_below_limit() {
        let depth = MAX_PARSER_DEPTH - 10;
        let sc = parse(&("(".repeat(depth) + "ls" + &")".repeat(depth)));
        assert_eq!(sc.lst.cls.len(), 1);

        let input = "echo \"$(".repeat(depth / 2) + "ls" + &")\"".repeat(depth / 2);
        assert_eq!(parse(&input).lst.cls.len(), 1);
    }

    #[test]
    fn test_parse_list_fragment() {
        let lst = parse_list("a=1; echo \"$a\"", false).unwrap();
        assert_eq!(lst.cls.len(), 2);
        let cmd = lst.cls[1].single_cmd().unwrap();
        assert!(matches!(
            cmd.args.args[1].subargs[1],
            Subarg::Variable { quoted: true, .. }
        ));
        assert!(matches!(lst.cls[0].pls[0].cmds[0], Block::Command(_)));
    }
}
