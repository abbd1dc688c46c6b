//! Debashify: rewrite bash-only constructs into POSIX sh
//!
//! The rewrite runs as one pre-order walk. Statement-level rewrites
//! (declarations, process substitution) happen when a list is reached,
//! here-strings when a pipeline is reached, everything else on the node
//! itself. Nodes synthesized by a rewrite are visited afterwards, so nested
//! constructs inside them are rewritten too.
//!
//! Rewrites that need a runtime helper record it; the caller injects the
//! matching library functions.

use crate::ast::types::{
    Arg, Arithmetic, AssignValue, Assignment, Block, Brace, Case, CaseItem, Command, Condlist,
    DeclItem, List, Pipeline, Redirect, Script, Subarg, Variable, AST,
};
use crate::ast::{try_walk_mut, walk_mut, NodeMut, Walk};
use crate::error::{Error, Result};
use crate::parser::command_parser::unquote_word;
use std::collections::{BTreeSet, HashMap};
use std::mem::take;
use tracing::debug;

/// Rewrite `sc` for POSIX sh and return the library functions it now calls
pub fn debashify(sc: &mut Script) -> Result<BTreeSet<String>> {
    let mut d = Debashifier::default();
    d.run(sc)?;
    sc.shebang = "#!/bin/sh".to_string();
    debug!(required = ?d.required, "debashified script");
    Ok(d.required)
}

/// State of one debashify run
#[derive(Debug, Default)]
pub struct Debashifier {
    /// Library functions called by rewritten code
    pub required: BTreeSet<String>,
    /// Names declared with `declare -a` (false) or `declare -A` (true)
    pub arrays: HashMap<String, bool>,
}

impl Debashifier {
    pub fn run(&mut self, sc: &mut Script) -> Result<()> {
        try_walk_mut(NodeMut::Script(sc), &mut |n: NodeMut<'_>| -> Result<Walk> {
            match n {
                NodeMut::List(l) => self.on_list(l)?,
                NodeMut::Pipeline(p) => self.on_pipeline(p),
                NodeMut::Block(b) => self.on_block(b)?,
                NodeMut::Assignment(a) => self.on_assignment(a)?,
                NodeMut::Subarg(sa) => self.on_subarg(sa)?,
                NodeMut::Arithmetic(a) => {
                    if let Arithmetic::Variable { var, .. } = a {
                        if let Some(lst) = self.variable_read(var)? {
                            *a = Arithmetic::Subshell(lst);
                        }
                    }
                }
                _ => {}
            }
            Ok(Walk::Continue)
        })
    }

    fn require(&mut self, name: &str) {
        self.required.insert(name.to_string());
    }

    /// `_lxsh_array` or `_lxsh_map` depending on how `name` was declared
    fn kind(&self, name: &str) -> &'static str {
        if self.arrays.get(name).copied().unwrap_or(false) {
            "_lxsh_map"
        } else {
            "_lxsh_array"
        }
    }

    fn is_map(&self, name: &str) -> bool {
        self.arrays.get(name).copied().unwrap_or(false)
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    fn on_list(&mut self, lst: &mut List) -> Result<()> {
        let had_statements = !lst.is_empty();
        let mut out = Vec::with_capacity(lst.cls.len());
        for mut cl in take(&mut lst.cls) {
            if !self.rewrite_declarations(&mut cl)? {
                continue;
            }
            out.extend(self.extract_procsubs(&mut cl));
            out.push(cl);
        }
        if had_statements && out.is_empty() {
            out.push(AST::true_statement());
        }
        lst.cls = out;
        Ok(())
    }

    /// Returns false when the whole statement must be deleted
    fn rewrite_declarations(&mut self, cl: &mut Condlist) -> Result<bool> {
        let single = cl.single_cmd().is_some();
        for pl in &mut cl.pls {
            for blk in &mut pl.cmds {
                let Block::Command(cmd) = blk else {
                    continue;
                };
                if !matches!(cmd.name(), Some("readonly" | "declare" | "typeset")) {
                    continue;
                }
                if self.rewrite_declaration(cmd) {
                    continue;
                }
                if single {
                    return Ok(false);
                }
                *blk = Block::Command(AST::command(&["true"]));
            }
        }
        Ok(true)
    }

    /// Rewrite one readonly/declare/typeset command, false when nothing is left
    fn rewrite_declaration(&mut self, cmd: &mut Command) -> bool {
        let items = take(&mut cmd.cmd_var_assigns);
        if cmd.name() != Some("readonly") {
            let flags: String = items
                .iter()
                .filter_map(|it| match it {
                    DeclItem::Flag(a) => a.string().filter(|s| s.starts_with('-')),
                    _ => None,
                })
                .collect();
            if flags.contains('a') || flags.contains('A') {
                let is_map = flags.contains('A');
                for it in &items {
                    match it {
                        DeclItem::Name(v) => {
                            self.arrays.insert(v.name.clone(), is_map);
                        }
                        DeclItem::Assign(a) => {
                            self.arrays.insert(a.var.name.clone(), is_map);
                        }
                        DeclItem::Flag(_) => {}
                    }
                }
            }
            if flags.contains('x') {
                cmd.args.args = vec![Arg::literal("export")];
                cmd.cmd_var_assigns = items
                    .into_iter()
                    .filter(|it| !matches!(it, DeclItem::Flag(_)))
                    .collect();
                return true;
            }
        }
        for it in items {
            if let DeclItem::Assign(a) = it {
                cmd.var_assigns.push(a);
            }
        }
        cmd.args.args.clear();
        cmd.is_cmdvar = false;
        !cmd.var_assigns.is_empty()
    }

    /// Replace the process substitutions of a statement by fifos and return
    /// the statements setting them up
    fn extract_procsubs(&mut self, cl: &mut Condlist) -> Vec<Condlist> {
        let mut found: Vec<(String, List, bool)> = Vec::new();
        walk_mut(NodeMut::Condlist(cl), &mut |n: NodeMut<'_>| match n {
            // nested lists are handled when the walk reaches them
            NodeMut::List(_) => Walk::Skip,
            NodeMut::Arg(a) => {
                if a.subargs.iter().any(|sa| matches!(sa, Subarg::Procsub { .. })) {
                    let mut out = Arg::default();
                    for sa in take(&mut a.subargs) {
                        match sa {
                            Subarg::Procsub { lst, output } => {
                                let name = format!("_lxsh_fifo_{}", found.len() + 1);
                                out.append(AST::quoted_var(&name));
                                found.push((name, lst, output));
                            }
                            other => out.push(other),
                        }
                    }
                    *a = out;
                }
                Walk::Continue
            }
            _ => Walk::Continue,
        });
        if found.is_empty() {
            return Vec::new();
        }
        self.require("_lxsh_random_tmpfile");

        let mut pre = Vec::new();
        for (name, _, _) in &found {
            let mut cmd = Command::default();
            cmd.var_assigns.push(Assignment {
                var: Variable::definition(name.clone()),
                append: false,
                value: Some(AssignValue::Scalar(Arg::new(vec![AST::cmd_substitution(
                    AST::command(&["_lxsh_random_tmpfile", "lxshfifo"]),
                    false,
                )]))),
            });
            pre.push(AST::statement(cmd));
        }
        let mut mkfifo = AST::command(&["mkfifo"]);
        for (name, _, _) in &found {
            mkfifo.args.args.push(AST::quoted_var(name));
        }
        pre.push(AST::statement(mkfifo));
        for (name, mut body, output) in found {
            let mut rm = AST::command(&["rm"]);
            rm.args.args.push(AST::quoted_var(&name));
            body.cls.push(AST::statement(rm));
            let op = if output { "<" } else { ">" };
            let mut bg = Condlist::from_block(Block::Brace(Brace {
                lst: body,
                redirs: vec![Redirect::new(op, AST::quoted_var(&name))],
            }));
            bg.parallel = true;
            pre.push(bg);
        }
        pre
    }

    /// Here-strings become a `printf` stage piped into the command
    fn on_pipeline(&mut self, pl: &mut Pipeline) {
        let mut i = 0;
        while i < pl.cmds.len() {
            let redirs = pl.cmds[i].redirs_mut();
            let mut value = None;
            redirs.retain_mut(|r| {
                if r.bare_op() == "<<<" {
                    value = Some(take(&mut r.target));
                    false
                } else {
                    true
                }
            });
            let Some(value) = value else {
                i += 1;
                continue;
            };
            let printf = Block::Command(Command::new(vec![
                Arg::literal("printf"),
                Arg::literal("'%s\\n'"),
                force_quote(value),
            ]));
            if i == 0 {
                pl.cmds.insert(0, printf);
                i += 2;
            } else {
                let blk = take(&mut pl.cmds[i]);
                pl.cmds[i] = AST::brace(List::new(vec![Condlist::new(Pipeline {
                    cmds: vec![printf, blk],
                    negated: false,
                })]));
                i += 1;
            }
        }
    }

    // =========================================================================
    // BLOCKS
    // =========================================================================

    fn on_block(&mut self, blk: &mut Block) -> Result<()> {
        if let Block::Command(cmd) = blk {
            if cmd.name() == Some("[[") {
                *blk = double_bracket(take(cmd))?;
            } else if cmd.name() == Some("echo") {
                if let Some(b) = echo(cmd) {
                    *blk = b;
                }
            }
        }
        split_combined_redirects(blk.redirs_mut());
        Ok(())
    }

    // =========================================================================
    // ASSIGNMENTS
    // =========================================================================

    fn on_assignment(&mut self, a: &mut Assignment) -> Result<()> {
        let name = a.var.name.clone();
        if let Some(idx) = a.var.index.take() {
            // VAR[I]=VAL, VAR[I]+=VAL
            let value = match a.value.take() {
                Some(AssignValue::Scalar(v)) => force_quote(v),
                Some(AssignValue::Array(_)) => {
                    return Err(Error::rewrite(format!(
                        "array value assigned to element of '{}'",
                        name
                    )))
                }
                None => Arg::literal("\"\""),
            };
            let kind = self.kind(&name);
            let set = format!("{}_set", kind);
            let idx = force_quote(idx);
            let value = if a.append {
                let get = format!("{}_get", kind);
                self.require(&get);
                let mut get_cmd = AST::command(&[get.as_str()]);
                get_cmd.args.args.push(AST::quoted_var(&name));
                get_cmd.args.args.push(idx.clone());
                let mut v = Arg::literal("\"");
                v.push(AST::cmd_substitution(get_cmd, true));
                v.push_literal("\"");
                v.append(value);
                v
            } else {
                value
            };
            self.require(&set);
            let mut set_cmd = AST::command(&[set.as_str()]);
            set_cmd.args.args.push(AST::quoted_var(&name));
            set_cmd.args.args.push(idx);
            set_cmd.args.args.push(value);
            a.value = Some(AssignValue::Scalar(Arg::new(vec![AST::cmd_substitution(
                set_cmd, false,
            )])));
            a.append = false;
            return Ok(());
        }

        match a.value.take() {
            Some(AssignValue::Array(elements)) => {
                // VAR=(...), VAR+=(...)
                let create = format!("{}_create", self.kind(&name));
                let mut cmd = AST::command(&[create.as_str()]);
                if a.append {
                    if self.is_map(&name) {
                        return Err(Error::rewrite(format!(
                            "'+=(...)' on associative array '{}'",
                            name
                        )));
                    }
                    let mut current = Arg::literal(":+\"");
                    current.push(Subarg::Variable {
                        var: Variable::new(name.clone()),
                        quoted: true,
                    });
                    current.push_literal("\"");
                    cmd.args.args.push(Arg::new(vec![Subarg::Variable {
                        var: Variable {
                            name: name.clone(),
                            manip: Some(current),
                            is_manip: true,
                            ..Default::default()
                        },
                        quoted: false,
                    }]));
                }
                if self.is_map(&name) {
                    // `[key]=value` pairs are neither split nor globbed
                    cmd.args
                        .args
                        .extend(elements.args.into_iter().map(|e| escape_globs(force_quote(e))));
                } else {
                    cmd.args.args.extend(elements.args);
                }
                self.require(&create);
                a.value = Some(AssignValue::Scalar(Arg::new(vec![AST::cmd_substitution(
                    cmd, false,
                )])));
            }
            Some(AssignValue::Scalar(v)) if a.append => {
                // VAR+=VAL
                let mut value = Arg::new(vec![Subarg::Variable {
                    var: Variable {
                        name: name.clone(),
                        is_manip: true,
                        ..Default::default()
                    },
                    quoted: false,
                }]);
                value.append(v);
                a.value = Some(AssignValue::Scalar(value));
            }
            other => a.value = other,
        }
        a.append = false;
        Ok(())
    }

    // =========================================================================
    // VARIABLE READS
    // =========================================================================

    fn on_subarg(&mut self, sa: &mut Subarg) -> Result<()> {
        if let Subarg::Variable { var, quoted } = sa {
            let quoted = *quoted;
            if let Some(lst) = self.variable_read(var)? {
                *sa = Subarg::Subshell {
                    lst,
                    quoted,
                    backtick: false,
                };
            }
        }
        Ok(())
    }

    /// Command substitution body replacing a bash-only variable read
    fn variable_read(&mut self, var: &mut Variable) -> Result<Option<List>> {
        if var.precedence {
            let prefix = var.manip.as_ref().and_then(|m| m.string()).unwrap_or("");
            if prefix == "!" {
                if var.index.is_some() {
                    return Err(Error::rewrite(format!(
                        "indirect expansion of array '{}'",
                        var.name
                    )));
                }
                // eval printf '%s' "\"\${$VAR}\""
                let mut target = Arg::literal("\"\\\"\\${");
                target.push(Subarg::Variable {
                    var: Variable::new(var.name.clone()),
                    quoted: true,
                });
                target.push_literal("}\\\"\"");
                let mut cmd = AST::command(&["eval", "printf", "'%s'"]);
                cmd.args.args.push(target);
                return Ok(Some(List::new(vec![AST::statement(cmd)])));
            }
        }

        if let Some(idx) = var.index.take() {
            if var.manip.is_some() {
                return Err(Error::rewrite(format!(
                    "manipulation on array element of '{}'",
                    var.name
                )));
            }
            let get = format!("{}_get", self.kind(&var.name));
            self.require(&get);
            let idx = match idx.string() {
                Some("*") | Some("@") => Arg::literal("\\*"),
                _ => force_quote(idx),
            };
            let mut cmd = AST::command(&[get.as_str()]);
            cmd.args.args.push(AST::quoted_var(&var.name));
            cmd.args.args.push(idx);
            return Ok(Some(List::new(vec![AST::statement(cmd)])));
        }

        if var.name == "RANDOM" {
            if var.manip.is_some() {
                return Err(Error::rewrite("manipulation on $RANDOM"));
            }
            self.require("_lxsh_random");
            return Ok(Some(List::new(vec![AST::statement(AST::command(&[
                "_lxsh_random",
            ]))])));
        }
        Ok(None)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Put every unquoted expansion of `arg` inside double quotes
pub fn force_quote(arg: Arg) -> Arg {
    if arg.is_empty() {
        return Arg::literal("\"\"");
    }
    let mut out = Arg::default();
    for mut sa in arg.subargs {
        let quoted = match &mut sa {
            Subarg::Variable { quoted, .. }
            | Subarg::Subshell { quoted, .. }
            | Subarg::Arithmetic { quoted, .. } => Some(quoted),
            Subarg::Literal(_) | Subarg::Procsub { .. } => None,
        };
        match quoted {
            Some(q) if !*q => {
                *q = true;
                out.push_literal("\"");
                out.push(sa);
                out.push_literal("\"");
            }
            _ => out.push(sa),
        }
    }
    out
}

/// Whether a `*`, `?` or `[` of the literal parts is outside any quoting
pub fn has_unquoted_glob(arg: &Arg) -> bool {
    let mut single = false;
    let mut double = false;
    for sa in &arg.subargs {
        let Subarg::Literal(raw) = sa else {
            continue;
        };
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' if !single => {
                    chars.next();
                }
                '\'' if !double => single = !single,
                '"' if !single => double = !double,
                '*' | '?' | '[' if !single && !double => return true,
                _ => {}
            }
        }
    }
    false
}

/// Backslash every `*`, `?` and `[` of the literal parts outside quoting
pub fn escape_globs(mut arg: Arg) -> Arg {
    let mut single = false;
    let mut double = false;
    for sa in &mut arg.subargs {
        let Subarg::Literal(raw) = sa else {
            continue;
        };
        let mut out = String::with_capacity(raw.len() + 2);
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' if !single => {
                    out.push(c);
                    if let Some(n) = chars.next() {
                        out.push(n);
                    }
                    continue;
                }
                '\'' if !double => single = !single,
                '"' if !single => double = !double,
                '*' | '?' | '[' if !single && !double => out.push('\\'),
                _ => {}
            }
            out.push(c);
        }
        *raw = out;
    }
    arg
}

fn split_combined_redirects(redirs: &mut Vec<Redirect>) {
    if !redirs
        .iter()
        .any(|r| matches!(r.op.as_str(), "&>" | "&>>" | ">&"))
    {
        return;
    }
    let mut out = Vec::with_capacity(redirs.len() + 1);
    for r in take(redirs) {
        let op = match r.op.as_str() {
            "&>" => ">",
            "&>>" => ">>",
            ">&" if is_file_target(&r.target) => ">",
            _ => {
                out.push(r);
                continue;
            }
        };
        out.push(Redirect::new(op, r.target));
        out.push(Redirect::new("2>&", Arg::literal("1")));
    }
    *redirs = out;
}

/// `>&word` names a file only when `word` is a literal that is not a
/// descriptor (`2`, `3-`) nor `-`; an expansion may yield a descriptor
fn is_file_target(target: &Arg) -> bool {
    let Some(raw) = target.string() else {
        return false;
    };
    let word = unquote_word(raw);
    let fd = word.strip_suffix('-').unwrap_or(&word);
    !fd.is_empty() && !fd.bytes().all(|b| b.is_ascii_digit())
}

// =============================================================================
// [[ ]]
// =============================================================================

/// `[[ a && b || c ]]` as `{ test a && test b || test c; }`
fn double_bracket(cmd: Command) -> Result<Block> {
    let mut words = cmd.args.args;
    if words.last().and_then(|a| a.string()) == Some("]]") {
        words.pop();
    }
    let words: Vec<Arg> = words.into_iter().skip(1).collect();

    let mut groups: Vec<Vec<Arg>> = vec![Vec::new()];
    let mut or_ops = Vec::new();
    for w in words {
        match w.string() {
            Some("&&") | Some("||") => {
                or_ops.push(w.string() == Some("||"));
                groups.push(Vec::new());
            }
            Some("(") | Some(")") => {
                return Err(Error::rewrite("parenthesized group in '[[ ]]'"));
            }
            _ => {
                if let Some(g) = groups.last_mut() {
                    g.push(w);
                }
            }
        }
    }

    let mut pls = Vec::with_capacity(groups.len());
    for mut group in groups {
        let mut negated = false;
        while group.first().and_then(|a| a.string()) == Some("!") {
            group.remove(0);
            negated = !negated;
        }
        pls.push(Pipeline {
            cmds: vec![test_block(group)?],
            negated,
        });
    }
    let cl = Condlist {
        pls,
        or_ops,
        parallel: false,
    };
    Ok(Block::Brace(Brace {
        lst: List::new(vec![cl]),
        redirs: cmd.redirs,
    }))
}

fn bracket(words: Vec<Arg>) -> Block {
    let mut args = vec![Arg::literal("[")];
    args.extend(words);
    args.push(Arg::literal("]"));
    Block::Command(Command::new(args))
}

/// One operand of a `[[ ]]` expression
fn test_block(mut words: Vec<Arg>) -> Result<Block> {
    // `<=` and `>=` are read as two tokens
    if words.len() == 4
        && matches!(words[1].string(), Some("<") | Some(">"))
        && words[2].string() == Some("=")
    {
        words.remove(2);
        if let Some(op) = words[1].string().map(|s| format!("{}=", s)) {
            words[1] = Arg::literal(op);
        }
    }

    match words.len() {
        0 => Err(Error::rewrite("empty expression in '[[ ]]'")),
        1 => {
            let x = words.remove(0);
            Ok(bracket(vec![Arg::literal("-n"), force_quote(x)]))
        }
        2 => {
            let x = words.remove(1);
            let op = match words[0].string() {
                Some("-a") => "-e".to_string(),
                Some(op) if op.starts_with('-') => op.to_string(),
                _ => return Err(Error::rewrite("unsupported unary test in '[[ ]]'")),
            };
            Ok(bracket(vec![Arg::literal(op), force_quote(x)]))
        }
        3 => {
            let rhs = words.remove(2);
            let op = words.remove(1).string().unwrap_or("").to_string();
            let lhs = force_quote(words.remove(0));
            match op.as_str() {
                "=" | "==" | "!=" if has_unquoted_glob(&rhs) => {
                    let (hit, miss) = if op == "!=" {
                        ("false", "true")
                    } else {
                        ("true", "false")
                    };
                    Ok(Block::Case(Case {
                        carg: lhs,
                        cases: vec![
                            CaseItem {
                                patterns: vec![rhs],
                                body: List::new(vec![AST::statement(AST::command(&[hit]))]),
                            },
                            CaseItem {
                                patterns: vec![Arg::literal("*")],
                                body: List::new(vec![AST::statement(AST::command(&[miss]))]),
                            },
                        ],
                        redirs: Vec::new(),
                    }))
                }
                "=~" => Ok(regex_match(lhs, rhs)),
                _ => {
                    let op = match op.as_str() {
                        "==" => "=",
                        "<" => "-lt",
                        "<=" => "-le",
                        ">" => "-gt",
                        ">=" => "-ge",
                        "=" | "!=" => op.as_str(),
                        o if o.starts_with('-') => o,
                        _ => {
                            return Err(Error::rewrite(format!(
                                "unsupported operator '{}' in '[[ ]]'",
                                op
                            )))
                        }
                    };
                    Ok(bracket(vec![lhs, Arg::literal(op), force_quote(rhs)]))
                }
            }
        }
        _ => Err(Error::rewrite("unsupported expression in '[[ ]]'")),
    }
}

/// `expr L : ".*PATTERN" >/dev/null`, a leading `^` anchors the match
fn regex_match(lhs: Arg, mut rhs: Arg) -> Block {
    let mut anchored = false;
    if let Some(Subarg::Literal(s)) = rhs.subargs.first_mut() {
        if let Some(rest) = s.strip_prefix('^') {
            *s = rest.to_string();
            anchored = true;
        }
    }
    rhs.subargs.retain(|sa| !matches!(sa, Subarg::Literal(s) if s.is_empty()));
    let mut pattern = if anchored {
        Arg::default()
    } else {
        Arg::literal("\".*\"")
    };
    pattern.append(force_quote(rhs));
    if pattern.is_empty() {
        pattern = Arg::literal("\"\"");
    }
    let mut cmd = Command::new(vec![Arg::literal("expr"), lhs, Arg::literal(":"), pattern]);
    cmd.redirs.push(Redirect::new(">", Arg::literal("/dev/null")));
    Block::Command(cmd)
}

// =============================================================================
// ECHO
// =============================================================================

fn is_echo_option(s: &str) -> bool {
    s.len() > 1 && s.starts_with('-') && s[1..].chars().all(|c| matches!(c, 'n' | 'e' | 'E'))
}

fn has_literal_backslash(a: &Arg) -> bool {
    a.subargs
        .iter()
        .any(|sa| matches!(sa, Subarg::Literal(s) if s.contains('\\')))
}

/// Whether the argument always expands to exactly one word
fn is_single_word(a: &Arg) -> bool {
    !a.has_unquoted_expansion()
        && !a
            .subargs
            .iter()
            .any(|sa| matches!(sa, Subarg::Variable { var, .. } if var.name == "@"))
}

/// Rewrite `echo`; a returned block replaces the whole command
fn echo(cmd: &mut Command) -> Option<Block> {
    let mut newline = true;
    let mut interpret = false;
    let mut k = 1;
    while let Some(s) = cmd.arg_string(k).map(unquote_word) {
        if !is_echo_option(&s) {
            break;
        }
        for c in s[1..].chars() {
            match c {
                'n' => newline = false,
                'e' => interpret = true,
                _ => interpret = false,
            }
        }
        k += 1;
    }
    let rest: Vec<Arg> = cmd.args.args.drain(1..).skip(k - 1).collect();

    if !interpret && newline && !rest.iter().any(has_literal_backslash) {
        cmd.args.args.extend(rest);
        return None;
    }

    let spec = if interpret { "%b" } else { "%s" };
    if rest.iter().all(is_single_word) {
        let mut fmt = vec![spec; rest.len()].join(" ");
        if newline {
            fmt.push_str("\\n");
        }
        cmd.args.args = vec![Arg::literal("printf"), Arg::literal(format!("'{}'", fmt))];
        cmd.args.args.extend(rest);
        return None;
    }

    let mut rest = rest.into_iter();
    let mut lst = List::default();
    let printf = |fmt: String, args: Vec<Arg>| {
        let mut c = Command::new(vec![Arg::literal("printf"), Arg::literal(fmt)]);
        c.args.args.extend(args);
        c.var_assigns = cmd.var_assigns.clone();
        AST::statement(c)
    };
    if let Some(first) = rest.next() {
        lst.cls.push(printf(format!("'{}'", spec), vec![first]));
    }
    let others: Vec<Arg> = rest.collect();
    if !others.is_empty() {
        lst.cls.push(printf(format!("' {}'", spec), others));
    }
    if newline {
        let mut c = AST::command(&["echo"]);
        c.var_assigns = cmd.var_assigns.clone();
        lst.cls.push(AST::statement(c));
    }
    Some(Block::Brace(Brace {
        lst,
        redirs: take(&mut cmd.redirs),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{generate, GenOptions};
    use crate::parser::{parse_script, ParseOptions};
    use pretty_assertions::assert_eq;

    fn run(input: &str) -> Result<(String, BTreeSet<String>)> {
        let mut sc = parse_script(
            input,
            &ParseOptions {
                bash: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        let req = debashify(&mut sc)?;
        Ok((generate(&sc, &GenOptions::default()), req))
    }

    fn out(input: &str) -> String {
        run(input).unwrap().0
    }

    fn body(input: &str) -> String {
        out(input).trim_start_matches("#!/bin/sh\n").to_string()
    }

    #[test]
    fn test_shebang_forced() {
        assert_eq!(out("#!/bin/bash\ntrue\n"), "#!/bin/sh\ntrue\n");
    }

    #[test]
    fn test_echo_fast_path() {
        assert_eq!(body("echo hello world"), "echo hello world\n");
        assert_eq!(body("echo -E hello $x"), "echo hello $x\n");
    }

    #[test]
    fn test_echo_static_count() {
        assert_eq!(body("echo -n hello"), "printf '%s' hello\n");
        assert_eq!(body("echo -n \"$a\" b"), "printf '%s %s' \"$a\" b\n");
        assert_eq!(body("echo -e 'a\\tb'"), "printf '%b\\n' 'a\\tb'\n");
        assert_eq!(body("echo 'a\\b'"), "printf '%s\\n' 'a\\b'\n");
    }

    #[test]
    fn test_echo_quoted_options() {
        assert_eq!(body("echo \"-n\" hi"), "printf '%s' hi\n");
        assert_eq!(body("echo '-e' 'a\\tb'"), "printf '%b\\n' 'a\\tb'\n");
        assert_eq!(body("echo \"-x\" hi"), "echo \"-x\" hi\n");
    }

    #[test]
    fn test_echo_dynamic_count() {
        assert_eq!(
            body("echo -n $a b >f"),
            "{\n\tprintf '%s' $a\n\tprintf ' %s' b\n} >f\n"
        );
        assert_eq!(
            body("echo -e $a"),
            "{\n\tprintf '%b' $a\n\techo\n}\n"
        );
    }

    #[test]
    fn test_double_bracket_glob() {
        assert_eq!(
            body("[[ $a = foo* ]]"),
            "{\n\tcase \"$a\" in\n\t\tfoo*)\n\t\t\ttrue\n\t\t;;\n\t\t*)\n\t\t\tfalse\n\t\t;;\n\tesac\n}\n"
        );
    }

    #[test]
    fn test_double_bracket_operators() {
        assert_eq!(
            body("[[ $a == b && ! -a f || $n < 3 ]]"),
            "{\n\t[ \"$a\" = b ] && ! [ -e f ] || [ \"$n\" -lt 3 ]\n}\n"
        );
        assert_eq!(body("[[ $x ]]"), "{\n\t[ -n \"$x\" ]\n}\n");
        assert_eq!(body("[[ $n >= 3 ]]"), "{\n\t[ \"$n\" -ge 3 ]\n}\n");
    }

    #[test]
    fn test_double_bracket_regex() {
        assert_eq!(
            body("[[ $a =~ ^ab ]]"),
            "{\n\texpr \"$a\" : ab >/dev/null\n}\n"
        );
        assert_eq!(
            body("[[ $a =~ b ]]"),
            "{\n\texpr \"$a\" : \".*\"b >/dev/null\n}\n"
        );
    }

    #[test]
    fn test_double_bracket_group_is_error() {
        assert!(matches!(
            run("[[ ( a ) ]]"),
            Err(Error::Rewrite { .. })
        ));
    }

    #[test]
    fn test_declare_array_scenario() {
        let (text, req) = run("declare -a arr; arr=(1 2 3); echo \"${arr[1]}\"").unwrap();
        assert_eq!(
            text,
            "#!/bin/sh\narr=$(_lxsh_array_create 1 2 3)\necho \"$(_lxsh_array_get \"$arr\" 1)\"\n"
        );
        assert!(req.contains("_lxsh_array_create"));
        assert!(req.contains("_lxsh_array_get"));
    }

    #[test]
    fn test_map_set_and_append() {
        assert_eq!(
            body("declare -A m; m[k]+=v"),
            "m=$(_lxsh_map_set \"$m\" k \"$(_lxsh_map_get \"$m\" k)\"v)\n"
        );
        assert!(matches!(
            run("declare -A m; m+=(a)"),
            Err(Error::Rewrite { .. })
        ));
    }

    #[test]
    fn test_map_create_pairs_not_globbed() {
        assert_eq!(
            body("declare -A m; m=([k]=v [x]=$y ['a b']=c)"),
            "m=$(_lxsh_map_create \\[k]=v \\[x]=\"$y\" \\['a b']=c)\n"
        );
        assert_eq!(
            body("declare -a l; l=(*.txt)"),
            "l=$(_lxsh_array_create *.txt)\n"
        );
    }

    #[test]
    fn test_array_append() {
        assert_eq!(
            body("a+=(x y)"),
            "a=$(_lxsh_array_create ${a:+\"$a\"} x y)\n"
        );
    }

    #[test]
    fn test_scalar_append() {
        assert_eq!(body("a+=b"), "a=${a}b\n");
    }

    #[test]
    fn test_readonly_and_declare_x() {
        assert_eq!(body("readonly a=1 b; true"), "a=1\ntrue\n");
        assert_eq!(body("readonly b"), "true\n");
        assert_eq!(body("declare -x a=1"), "export a=1\n");
    }

    #[test]
    fn test_random_and_indirect() {
        let (text, req) = run("echo \"$RANDOM\"").unwrap();
        assert!(text.contains("$(_lxsh_random)"));
        assert!(req.contains("_lxsh_random"));
        assert_eq!(
            body("x=${!v}"),
            "x=$(eval printf '%s' \"\\\"\\${$v}\\\"\")\n"
        );
        assert!(run("echo ${RANDOM:-1}").is_err());
    }

    #[test]
    fn test_index_with_manipulation_is_error() {
        assert!(matches!(
            run("echo ${a[1]:-x}"),
            Err(Error::Rewrite { .. })
        ));
    }

    #[test]
    fn test_herestring() {
        assert_eq!(body("cat <<< $x"), "printf '%s\\n' \"$x\" | cat\n");
        assert_eq!(
            body("a | cat <<< x"),
            "a | {\n\tprintf '%s\\n' x | cat\n}\n"
        );
    }

    #[test]
    fn test_combined_redirects() {
        assert_eq!(body("cmd &>f"), "cmd >f 2>&1\n");
        assert_eq!(body("cmd &>>f"), "cmd >>f 2>&1\n");
        assert_eq!(body("cmd >&f"), "cmd >f 2>&1\n");
        assert_eq!(body("cmd >&2"), "cmd >&2\n");
        assert_eq!(body("cmd >&3-"), "cmd >&3-\n");
        assert_eq!(body("cmd >&-"), "cmd >&-\n");
        assert_eq!(body("cmd >&'out file'"), "cmd >'out file' 2>&1\n");
    }

    #[test]
    fn test_fd_duplication_from_expansion_kept() {
        assert_eq!(body("echo hi >&$fd"), "echo hi >&$fd\n");
        assert_eq!(body("echo hi >&\"$fd\""), "echo hi >&\"$fd\"\n");
        assert_eq!(body("echo hi 2>&$(get_fd)"), "echo hi 2>&$(get_fd)\n");
    }

    #[test]
    fn test_process_substitution() {
        let (text, req) = run("diff <(a) <(b)").unwrap();
        assert_eq!(
            text,
            "#!/bin/sh\n\
             _lxsh_fifo_1=$(_lxsh_random_tmpfile lxshfifo)\n\
             _lxsh_fifo_2=$(_lxsh_random_tmpfile lxshfifo)\n\
             mkfifo \"$_lxsh_fifo_1\" \"$_lxsh_fifo_2\"\n\
             {\n\ta\n\trm \"$_lxsh_fifo_1\"\n} >\"$_lxsh_fifo_1\" &\n\
             {\n\tb\n\trm \"$_lxsh_fifo_2\"\n} >\"$_lxsh_fifo_2\" &\n\
             diff \"$_lxsh_fifo_1\" \"$_lxsh_fifo_2\"\n"
        );
        assert!(req.contains("_lxsh_random_tmpfile"));
    }

    #[test]
    fn test_process_substitution_redirect() {
        assert_eq!(
            body("while read -r l; do echo \"$l\"; done < <(printf '1\\n2\\n')"),
            "_lxsh_fifo_1=$(_lxsh_random_tmpfile lxshfifo)\n\
             mkfifo \"$_lxsh_fifo_1\"\n\
             {\n\tprintf '1\\n2\\n'\n\trm \"$_lxsh_fifo_1\"\n} >\"$_lxsh_fifo_1\" &\n\
             while read -r l; do\n\techo \"$l\"\ndone <\"$_lxsh_fifo_1\"\n"
        );
    }
}
