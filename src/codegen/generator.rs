//! Shell code generator
//!
//! Renders the AST back to shell text in one of two modes:
//! - pretty: one statement per line, tab indentation, spaced operators
//! - minimal: no optional whitespace, statements packed with `;`
//!
//! Here-document bodies are queued when their redirect is written and
//! flushed after the statement holding them, which then ends with a newline.

use crate::ast::types::*;

/// Rendering options
#[derive(Debug, Clone, Default)]
pub struct GenOptions {
    /// Pack the output instead of pretty-printing it
    pub minimal: bool,
}

/// How a list is laid out
#[derive(Debug, Clone, Copy)]
enum Layout {
    /// One statement per line at the given depth (pretty mode only)
    Block(usize),
    /// Statements on one line; `trailing` terminates the last one too
    Inline { trailing: bool },
}

/// Generator state: output buffer and pending here-documents
pub struct Generator {
    minimal: bool,
    out: String,
    /// (body, delimiter) waiting for the end of the current statement
    heredocs: Vec<(String, String)>,
}

impl Generator {
    pub fn new(options: &GenOptions) -> Self {
        Generator {
            minimal: options.minimal,
            out: String::new(),
            heredocs: Vec::new(),
        }
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn indent(&mut self, depth: usize) {
        if !self.minimal {
            for _ in 0..depth {
                self.out.push('\t');
            }
        }
    }

    /// Write `pretty` or `minimal` depending on the mode
    fn sym(&mut self, pretty: &str, minimal: &str) {
        self.out.push_str(if self.minimal { minimal } else { pretty });
    }

    /// Write the here-documents of the statement just written
    fn flush_heredocs(&mut self) {
        for (body, delim) in std::mem::take(&mut self.heredocs) {
            self.out.push('\n');
            self.out.push_str(&body);
            if !body.is_empty() && !body.ends_with('\n') {
                self.out.push('\n');
            }
            self.out.push_str(&delim);
        }
        self.out.push('\n');
    }

    /// Write a keyword following a list (`then`, `do`, `fi`, `done`, `esac`)
    fn keyword(&mut self, kw: &str, depth: usize) {
        if self.out.ends_with('\n') {
            self.indent(depth);
        } else if self.out.ends_with(';') || self.out.ends_with('&') {
            if !self.minimal {
                self.out.push(' ');
            }
        } else {
            self.sym("; ", ";");
        }
        self.out.push_str(kw);
    }

    // =========================================================================
    // LISTS
    // =========================================================================

    pub fn script(&mut self, sc: &Script) {
        if !sc.shebang.is_empty() {
            self.out.push_str(&sc.shebang);
            self.out.push('\n');
        }
        if self.minimal {
            self.list(&sc.lst, Layout::Inline { trailing: false });
            if !self.out.is_empty() && !self.out.ends_with('\n') {
                self.out.push('\n');
            }
        } else {
            self.list(&sc.lst, Layout::Block(0));
        }
    }

    fn list(&mut self, lst: &List, layout: Layout) {
        // Here-documents of an enclosing statement wait for it
        let outer = std::mem::take(&mut self.heredocs);
        let layout = match layout {
            Layout::Block(_) if self.minimal => Layout::Inline { trailing: true },
            l => l,
        };
        let n = lst.cls.len();
        for (k, cl) in lst.cls.iter().enumerate() {
            let last = k + 1 == n;
            match layout {
                Layout::Block(depth) => {
                    self.indent(depth);
                    self.condlist(cl);
                    if self.heredocs.is_empty() {
                        self.out.push('\n');
                    } else {
                        self.flush_heredocs();
                    }
                }
                Layout::Inline { trailing } => {
                    self.condlist(cl);
                    if !self.heredocs.is_empty() {
                        self.flush_heredocs();
                    } else if cl.parallel {
                        if !last && !self.minimal {
                            self.out.push(' ');
                        }
                    } else if !last {
                        self.sym("; ", ";");
                    } else if trailing {
                        self.out.push(';');
                    }
                }
            }
        }
        self.heredocs = outer;
    }

    pub fn condlist(&mut self, cl: &Condlist) {
        for (k, pl) in cl.pls.iter().enumerate() {
            if k > 0 {
                if cl.or_ops[k - 1] {
                    self.sym(" || ", "||");
                } else {
                    self.sym(" && ", "&&");
                }
            }
            self.pipeline(pl);
        }
        if cl.parallel {
            self.sym(" &", "&");
        }
    }

    fn pipeline(&mut self, pl: &Pipeline) {
        if pl.negated {
            self.out.push_str("! ");
        }
        for (k, b) in pl.cmds.iter().enumerate() {
            if k > 0 {
                self.sym(" | ", "|");
            }
            self.block(b, self.current_depth());
        }
    }

    /// Indentation depth of the line being written
    fn current_depth(&self) -> usize {
        let line = self.out.rsplit('\n').next().unwrap_or("");
        line.bytes().take_while(|c| *c == b'\t').count()
    }

    // =========================================================================
    // BLOCKS
    // =========================================================================

    fn block(&mut self, b: &Block, depth: usize) {
        match b {
            Block::Command(c) => {
                self.command(c);
                return;
            }
            Block::Subshell(s) => {
                self.out.push('(');
                if self.minimal {
                    self.open_paren_guard(&s.lst);
                    self.list(&s.lst, Layout::Inline { trailing: false });
                } else {
                    self.out.push('\n');
                    self.list(&s.lst, Layout::Block(depth + 1));
                    self.indent(depth);
                }
                self.out.push(')');
            }
            Block::Brace(s) => {
                self.out.push('{');
                self.body(&s.lst, depth);
                self.keyword("}", depth);
            }
            Block::Function(f) => {
                self.out.push_str(&f.name);
                self.sym("() {", "(){");
                self.body(&f.lst, depth);
                self.keyword("}", depth);
            }
            Block::If(node) => {
                for (k, br) in node.blocks.iter().enumerate() {
                    if k == 0 {
                        self.out.push_str("if ");
                    } else {
                        self.keyword("elif ", depth);
                    }
                    self.list(&br.cond, Layout::Inline { trailing: self.minimal });
                    self.keyword("then", depth);
                    self.body(&br.body, depth);
                }
                if let Some(e) = &node.else_lst {
                    self.keyword("else", depth);
                    self.body(e, depth);
                }
                self.keyword("fi", depth);
            }
            Block::For(node) => {
                self.out.push_str("for ");
                self.out.push_str(&node.var.name);
                match &node.iter {
                    Some(words) => {
                        self.out.push_str(" in");
                        for w in &words.args {
                            self.out.push(' ');
                            self.arg(w);
                        }
                        self.sym("; do", ";do");
                    }
                    None => self.out.push_str(" do"),
                }
                self.body(&node.ops, depth);
                self.keyword("done", depth);
            }
            Block::While(node) => {
                self.out.push_str("while ");
                self.list(&node.cond, Layout::Inline { trailing: self.minimal });
                self.keyword("do", depth);
                self.body(&node.ops, depth);
                self.keyword("done", depth);
            }
            Block::Case(node) => {
                self.out.push_str("case ");
                self.arg(&node.carg);
                self.out.push_str(" in");
                for item in &node.cases {
                    if self.minimal {
                        self.out.push(' ');
                    } else {
                        self.out.push('\n');
                        self.indent(depth + 1);
                    }
                    for (k, pat) in item.patterns.iter().enumerate() {
                        if k > 0 {
                            self.out.push('|');
                        }
                        self.arg(pat);
                    }
                    self.out.push(')');
                    if self.minimal {
                        self.list(&item.body, Layout::Inline { trailing: false });
                        self.out.push_str(";;");
                    } else {
                        self.out.push('\n');
                        self.list(&item.body, Layout::Block(depth + 2));
                        self.indent(depth + 1);
                        self.out.push_str(";;");
                    }
                }
                if self.minimal {
                    self.out.push_str(" esac");
                } else {
                    self.out.push('\n');
                    self.indent(depth);
                    self.out.push_str("esac");
                }
            }
        }
        self.block_redirects(b.redirs());
    }

    /// Body of a brace, function, loop or if clause
    fn body(&mut self, lst: &List, depth: usize) {
        if self.minimal {
            self.out.push(' ');
            self.list(lst, Layout::Inline { trailing: true });
        } else {
            self.out.push('\n');
            self.list(lst, Layout::Block(depth + 1));
        }
    }

    /// `((` would open an arithmetic command or expansion
    fn open_paren_guard(&mut self, lst: &List) {
        let first = lst.cls.first().and_then(|cl| cl.pls.first());
        if let Some(pl) = first {
            if !pl.negated && matches!(pl.cmds.first(), Some(Block::Subshell(_))) {
                self.out.push(' ');
            }
        }
    }

    fn block_redirects(&mut self, redirs: &[Redirect]) {
        for r in redirs {
            if !self.minimal {
                self.out.push(' ');
            }
            self.redirect(r);
        }
    }

    fn command(&mut self, c: &Command) {
        let mut first = true;
        let mut sep = |g: &mut Generator| {
            if !first {
                g.out.push(' ');
            }
            first = false;
        };
        for a in &c.var_assigns {
            sep(self);
            self.assignment(a);
        }
        for a in &c.args.args {
            sep(self);
            self.arg(a);
        }
        for d in &c.cmd_var_assigns {
            sep(self);
            match d {
                DeclItem::Assign(a) => self.assignment(a),
                DeclItem::Name(v) => self.out.push_str(&v.name),
                DeclItem::Flag(a) => self.arg(a),
            }
        }
        for r in &c.redirs {
            sep(self);
            self.redirect(r);
        }
    }

    fn assignment(&mut self, a: &Assignment) {
        self.out.push_str(&a.var.name);
        if let Some(idx) = &a.var.index {
            self.out.push('[');
            self.arg(idx);
            self.out.push(']');
        }
        if a.append {
            self.out.push('+');
        }
        self.out.push('=');
        match &a.value {
            Some(AssignValue::Scalar(v)) => self.arg(v),
            Some(AssignValue::Array(elems)) => {
                self.out.push('(');
                for (k, e) in elems.args.iter().enumerate() {
                    if k > 0 {
                        self.out.push(' ');
                    }
                    self.arg(e);
                }
                self.out.push(')');
            }
            None => {}
        }
    }

    fn redirect(&mut self, r: &Redirect) {
        self.out.push_str(&r.op);
        // `< <(cmd)` must not fuse into `<<(`
        if matches!(r.target.subargs.first(), Some(Subarg::Procsub { .. })) {
            self.out.push(' ');
        }
        let start = self.out.len();
        self.arg(&r.target);
        if let Some(doc) = &r.here_document {
            let delim = unquote(&self.out[start..]);
            let mut body = Generator {
                minimal: self.minimal,
                out: String::new(),
                heredocs: Vec::new(),
            };
            body.arg(doc);
            self.heredocs.push((body.out, delim));
        }
    }

    // =========================================================================
    // ARGUMENTS
    // =========================================================================

    pub fn arg(&mut self, a: &Arg) {
        for sa in &a.subargs {
            self.subarg(sa);
        }
    }

    fn subarg(&mut self, sa: &Subarg) {
        match sa {
            Subarg::Literal(s) => self.out.push_str(s),
            Subarg::Variable { var, .. } => self.variable(var),
            Subarg::Subshell { lst, backtick, .. } => {
                if *backtick {
                    self.out.push('`');
                    self.list(lst, Layout::Inline { trailing: false });
                    self.out.push('`');
                } else {
                    self.out.push_str("$(");
                    self.open_paren_guard(lst);
                    self.list(lst, Layout::Inline { trailing: false });
                    self.out.push(')');
                }
            }
            Subarg::Arithmetic { arith, .. } => {
                self.out.push_str("$((");
                self.arithmetic(arith);
                self.out.push_str("))");
            }
            Subarg::Procsub { lst, output } => {
                self.out.push_str(if *output { ">(" } else { "<(" });
                self.list(lst, Layout::Inline { trailing: false });
                self.out.push(')');
            }
        }
    }

    fn variable(&mut self, v: &Variable) {
        if !v.is_manip {
            self.out.push('$');
            self.out.push_str(&v.name);
            return;
        }
        self.out.push_str("${");
        if v.precedence {
            if let Some(m) = &v.manip {
                self.arg(m);
            }
        }
        self.out.push_str(&v.name);
        if let Some(idx) = &v.index {
            self.out.push('[');
            self.arg(idx);
            self.out.push(']');
        }
        if !v.precedence {
            if let Some(m) = &v.manip {
                self.arg(m);
            }
        }
        self.out.push('}');
    }

    fn arithmetic(&mut self, a: &Arithmetic) {
        match a {
            Arithmetic::Number(n) => self.out.push_str(n),
            Arithmetic::Variable { var, dollar } => {
                if *dollar {
                    self.variable(var);
                } else {
                    self.out.push_str(&var.name);
                    if let Some(idx) = &var.index {
                        self.out.push('[');
                        self.arg(idx);
                        self.out.push(']');
                    }
                }
            }
            Arithmetic::Operation { op, lhs, rhs } => match (lhs, rhs) {
                (None, Some(r)) => {
                    self.out.push_str(op);
                    self.arith_operand(op, r);
                }
                (Some(l), None) => {
                    self.arithmetic(l);
                    self.out.push_str(op);
                }
                (Some(l), Some(r)) => {
                    self.arithmetic(l);
                    if self.minimal {
                        self.out.push_str(op);
                    } else {
                        self.out.push(' ');
                        self.out.push_str(op);
                        self.out.push(' ');
                    }
                    self.arith_operand(op, r);
                }
                (None, None) => self.out.push_str(op),
            },
            Arithmetic::Parenthesis(inner) => {
                self.out.push('(');
                self.arithmetic(inner);
                self.out.push(')');
            }
            Arithmetic::Subshell(lst) => {
                self.out.push_str("$(");
                self.open_paren_guard(lst);
                self.list(lst, Layout::Inline { trailing: false });
                self.out.push(')');
            }
        }
    }

    /// Right operand, spaced when it would fuse with the operator: `- -x`
    fn arith_operand(&mut self, op: &str, operand: &Arithmetic) {
        let mut sub = Generator {
            minimal: self.minimal,
            out: String::new(),
            heredocs: Vec::new(),
        };
        sub.arithmetic(operand);
        let fuse = match (op.chars().last(), sub.out.chars().next()) {
            (Some(a), Some(b)) => (a == '+' || a == '-') && a == b,
            _ => false,
        };
        if fuse && !self.out.ends_with(' ') {
            self.out.push(' ');
        }
        self.out.push_str(&sub.out);
    }
}

/// Here-document delimiter with its quoting removed
fn unquote(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, '\'' | '"' | '\\')).collect()
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Render a complete script
pub fn generate(sc: &Script, options: &GenOptions) -> String {
    let mut g = Generator::new(options);
    g.script(sc);
    g.finish()
}

/// Render a statement list
pub fn generate_list(lst: &List, options: &GenOptions) -> String {
    let mut g = Generator::new(options);
    if options.minimal {
        g.list(lst, Layout::Inline { trailing: false });
    } else {
        g.list(lst, Layout::Block(0));
    }
    g.finish()
}

/// Render one argument
pub fn generate_arg(a: &Arg) -> String {
    let mut g = Generator::new(&GenOptions::default());
    g.arg(a);
    g.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_script, ParseOptions};
    use pretty_assertions::assert_eq;

    fn roundtrip(input: &str, minimal: bool) -> String {
        let sc = parse_script(
            input,
            &ParseOptions {
                bash: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        generate(&sc, &GenOptions { minimal })
    }

    fn pretty(input: &str) -> String {
        roundtrip(input, false)
    }

    fn minimal(input: &str) -> String {
        roundtrip(input, true)
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(pretty("echo  a   b\nls"), "echo a b\nls\n");
        assert_eq!(minimal("echo  a   b\nls"), "echo a b;ls\n");
    }

    #[test]
    fn test_shebang_kept() {
        assert_eq!(pretty("#!/bin/sh\ntrue"), "#!/bin/sh\ntrue\n");
    }

    #[test]
    fn test_condlist_and_pipeline() {
        assert_eq!(pretty("a&&b||! c|d &"), "a && b || ! c | d &\n");
        assert_eq!(minimal("a && b || ! c | d &\ne"), "a&&b||! c|d&e\n");
    }

    #[test]
    fn test_if_layout() {
        let input = "if a; then b; elif c; then d; else e; fi";
        assert_eq!(
            pretty(input),
            "if a; then\n\tb\nelif c; then\n\td\nelse\n\te\nfi\n"
        );
        assert_eq!(minimal(input), "if a;then b;elif c;then d;else e;fi\n");
    }

    #[test]
    fn test_loops() {
        assert_eq!(pretty("for i in 1 2; do echo $i; done"), "for i in 1 2; do\n\techo $i\ndone\n");
        assert_eq!(minimal("for i\ndo echo $i; done"), "for i do echo $i;done\n");
        assert_eq!(minimal("while a; do b; done"), "while a;do b;done\n");
    }

    #[test]
    fn test_case_layout() {
        let input = "case $x in a|b) echo ab;; *) ;; esac";
        assert_eq!(
            pretty(input),
            "case $x in\n\ta|b)\n\t\techo ab\n\t;;\n\t*)\n\t;;\nesac\n"
        );
        assert_eq!(minimal(input), "case $x in a|b)echo ab;; *);; esac\n");
    }

    #[test]
    fn test_function_and_brace() {
        assert_eq!(pretty("f() { a; b; }"), "f() {\n\ta\n\tb\n}\n");
        assert_eq!(minimal("f() { a; b; }"), "f(){ a;b;}\n");
        assert_eq!(minimal("{ a & } >out"), "{ a&}>out\n");
    }

    #[test]
    fn test_nested_indentation() {
        let input = "f() {\nif a; then\nwhile b; do c; done\nfi\n}";
        assert_eq!(
            pretty(input),
            "f() {\n\tif a; then\n\t\twhile b; do\n\t\t\tc\n\t\tdone\n\tfi\n}\n"
        );
    }

    #[test]
    fn test_subshell_spacing() {
        assert_eq!(minimal("( (a) )"), "( (a))\n");
        assert_eq!(minimal("x=$( (a) )"), "x=$( (a))\n");
        assert_eq!(pretty("(a; b)"), "(\n\ta\n\tb\n)\n");
    }

    #[test]
    fn test_assignments_and_redirects() {
        assert_eq!(minimal("a=1 b+=2 c=(x y) cmd 2>&1 >out"), "a=1 b+=2 c=(x y) cmd 2>&1 >out\n");
        assert_eq!(minimal("export A=1 B"), "export A=1 B\n");
    }

    #[test]
    fn test_variables_and_substitutions() {
        let input = "echo \"${a:-x}\" ${#b} ${c[1]} $(d) `e` $((1+2)) <(f)";
        assert_eq!(
            minimal(input),
            "echo \"${a:-x}\" ${#b} ${c[1]} $(d) $(e) $((1+2)) <(f)\n"
        );
    }

    #[test]
    fn test_arithmetic_spacing() {
        assert_eq!(minimal("echo $((a - -b))"), "echo $((a- -b))\n");
        assert_eq!(pretty("echo $((a-b*2))"), "echo $((a - b * 2))\n");
        assert_eq!(minimal("echo $((x ? 1 : 2))"), "echo $((x?1:2))\n");
    }

    #[test]
    fn test_heredoc_roundtrip() {
        let input = "cat <<EOF | tr a b\nhello $x\nEOF\necho end\n";
        assert_eq!(pretty(input), input);
        let packed = minimal(input);
        assert_eq!(packed, "cat <<EOF|tr a b\nhello $x\nEOF\necho end\n");
        let opts = ParseOptions::default();
        assert_eq!(
            parse_script(&packed, &opts).unwrap().lst,
            parse_script(input, &opts).unwrap().lst
        );
    }

    #[test]
    fn test_procsub_redirect_target_spaced() {
        let input = "while read -r l; do echo \"$l\"; done < <(printf '1\\n')";
        assert_eq!(minimal(input), "while read -r l;do echo \"$l\";done< <(printf '1\\n')\n");
        let out = pretty(input);
        assert!(out.ends_with("done < <(printf '1\\n')\n"), "{}", out);
        assert_eq!(roundtrip(&out, false), out);
    }

    #[test]
    fn test_heredoc_in_condition() {
        let input = "if cat <<'E'; then a; fi\nbody\nE\n";
        assert_eq!(minimal(input), "if cat <<'E'\nbody\nE\nthen a;fi\n");
    }

    #[test]
    fn test_generated_output_reparses() {
        let input = "f() { case $1 in (a) x=$(cat <<E\n$y\nE\n) ;; esac; }\nf a && echo \"$x\" | tr a b &\n";
        for min in [false, true] {
            let out = roundtrip(input, min);
            let again = roundtrip(&out, min);
            assert_eq!(out, again);
        }
    }
}
