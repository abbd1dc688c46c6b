//! Structural minification: quote stripping, block inlining, `${VAR}`
//! collapse and backtick substitutions.
//!
//! Everything happens in one pre-order walk. At a block, inlining runs
//! first and the arguments of the resulting block are then stripped; `${}`
//! collapse runs when the walk reaches each argument. A command substitution
//! is minified as a whole when reached, then turned into backticks when its
//! text allows it.

use super::quotes::strip_quotes;
use crate::analysis::Maps;
use crate::ast::types::{AssignValue, Block, Command, DeclItem, List, Redirect, Script, Subarg};
use crate::ast::{walk_mut, NodeMut, Walk};
use crate::codegen::{generate_list, GenOptions};
use crate::parser::types::{is_name_char, is_valid_name};
use std::collections::HashSet;
use std::mem::take;

/// Builtins whose effect would escape an inlined subshell
const ENV_BUILTINS: &[&str] = &[
    ".", "alias", "bind", "builtin", "cd", "command", "declare", "eval", "exec", "exit",
    "export", "getopts", "hash", "local", "popd", "pushd", "read", "readonly", "return", "set",
    "shift", "source", "trap", "typeset", "ulimit", "umask", "unalias", "unset", "wait",
];

/// Run the structural minification over a whole script
pub fn minify_quotes(sc: &mut Script, maps: &mut Maps) {
    let fcts: HashSet<String> = maps.fcts(sc).keys().cloned().collect();
    minify_list(&mut sc.lst, &fcts);
}

/// `fcts` holds the functions the script defines
fn minify_list(lst: &mut List, fcts: &HashSet<String>) {
    walk_mut(NodeMut::List(lst), &mut |n: NodeMut<'_>| visit(n, fcts));
}

fn visit(n: NodeMut<'_>, fcts: &HashSet<String>) -> Walk {
    match n {
        NodeMut::Block(blk) => {
            while let Some(inner) = inline(blk, fcts) {
                *blk = inner;
            }
            strip_block(blk);
            Walk::Continue
        }
        NodeMut::Arg(arg) => {
            collapse_braces(&mut arg.subargs);
            Walk::Continue
        }
        NodeMut::Subarg(Subarg::Subshell {
            lst,
            quoted,
            backtick,
        }) => {
            minify_list(lst, fcts);
            if !*backtick {
                let text = generate_list(lst, &GenOptions { minimal: true });
                if !text.contains('`') && !text.contains('\\') && !(*quoted && text.contains('"')) {
                    *backtick = true;
                }
            }
            Walk::Skip
        }
        _ => Walk::Continue,
    }
}

// =============================================================================
// INLINING
// =============================================================================

fn is_stream_redirect(r: &Redirect) -> bool {
    !r.is_heredoc() && r.bare_op() != "<<<"
}

/// Whether running `blk` in the current shell instead of a subshell is the same
fn is_environment_safe(blk: &Block, fcts: &HashSet<String>) -> bool {
    match blk {
        Block::Command(c) => {
            !c.is_assignment_only()
                && !c.is_cmdvar
                && c.name().map(|n| is_plain_cmd(n, fcts)).unwrap_or(false)
        }
        Block::Subshell(_) => true,
        _ => false,
    }
}

/// Neither a state-changing builtin nor a function of the script
fn is_plain_cmd(name: &str, fcts: &HashSet<String>) -> bool {
    !ENV_BUILTINS.contains(&name) && !fcts.contains(name)
}

/// Single block a subshell or brace group can be replaced with
fn inline(blk: &mut Block, fcts: &HashSet<String>) -> Option<Block> {
    let (lst, redirs, subshell) = match blk {
        Block::Subshell(s) => (&mut s.lst, &mut s.redirs, true),
        Block::Brace(b) => (&mut b.lst, &mut b.redirs, false),
        _ => return None,
    };
    let [cl] = lst.cls.as_mut_slice() else {
        return None;
    };
    if cl.parallel || cl.pls.len() != 1 || cl.pls[0].negated || cl.pls[0].cmds.len() != 1 {
        return None;
    }
    if !redirs.iter().all(is_stream_redirect) {
        return None;
    }
    let inner = &mut cl.pls[0].cmds[0];
    if subshell && !is_environment_safe(inner, fcts) {
        return None;
    }
    if matches!(inner, Block::Function(_)) {
        return None;
    }
    let mut inner = take(inner);
    // outer redirections are set up before the inner ones
    let mut all = take(redirs);
    all.append(inner.redirs_mut());
    *inner.redirs_mut() = all;
    Some(inner)
}

// =============================================================================
// ARGUMENTS
// =============================================================================

fn strip_redirects(redirs: &mut [Redirect]) {
    for r in redirs.iter_mut().filter(|r| !r.is_heredoc()) {
        strip_quotes(&mut r.target, false, false);
    }
}

fn strip_command(c: &mut Command) {
    for a in &mut c.var_assigns {
        match &mut a.value {
            Some(AssignValue::Scalar(v)) => strip_quotes(v, true, false),
            Some(AssignValue::Array(l)) => {
                for v in &mut l.args {
                    strip_quotes(v, false, false);
                }
            }
            None => {}
        }
    }
    for (i, arg) in c.args.args.iter_mut().enumerate() {
        strip_quotes(arg, false, i == 0);
    }
    for d in &mut c.cmd_var_assigns {
        match d {
            DeclItem::Assign(a) => {
                if let Some(AssignValue::Scalar(v)) = &mut a.value {
                    strip_quotes(v, false, false);
                }
            }
            DeclItem::Flag(v) => strip_quotes(v, false, false),
            DeclItem::Name(_) => {}
        }
    }
}

fn strip_block(blk: &mut Block) {
    match blk {
        Block::Command(c) => strip_command(c),
        Block::For(f) => {
            if let Some(iter) = &mut f.iter {
                for v in &mut iter.args {
                    strip_quotes(v, false, false);
                }
            }
        }
        Block::Case(c) => {
            strip_quotes(&mut c.carg, true, false);
            for item in &mut c.cases {
                for p in &mut item.patterns {
                    strip_quotes(p, false, false);
                }
            }
        }
        _ => {}
    }
    strip_redirects(blk.redirs_mut());
}

/// `${VAR}` to `$VAR` where nothing after it would extend the name
fn collapse_braces(subargs: &mut [Subarg]) {
    for i in 0..subargs.len() {
        let next_extends = match subargs.get(i + 1) {
            Some(Subarg::Literal(s)) => s.bytes().next().map(is_name_char).unwrap_or(false),
            _ => false,
        };
        if let Subarg::Variable { var, .. } = &mut subargs[i] {
            if !var.is_plain_braced() {
                continue;
            }
            let collapsible = if is_valid_name(&var.name) {
                !next_extends
            } else {
                // positional and special parameters
                var.name.len() == 1
                    && !(var.name.as_bytes()[0].is_ascii_digit() && next_extends)
            };
            if collapsible {
                var.is_manip = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::generate;
    use crate::parser::{parse_script, ParseOptions};
    use pretty_assertions::assert_eq;

    fn run(input: &str) -> String {
        let mut sc = parse_script(
            input,
            &ParseOptions {
                bash: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        minify_quotes(&mut sc, &mut Maps::new());
        generate(&sc, &GenOptions { minimal: true })
    }

    #[test]
    fn test_strip_arguments() {
        assert_eq!(run("echo 'hello' \"world\""), "echo hello world\n");
        assert_eq!(run("x=\"$y\"; echo \"$y\""), "x=$y;echo \"$y\"\n");
        assert_eq!(run("case \"$a\" in 'b') ;; esac"), "case $a in b);; esac\n");
    }

    #[test]
    fn test_heredoc_untouched() {
        let input = "cat <<'E' >\"out\"\n'quoted' ${x}y\nE\n";
        assert_eq!(run(input), "cat <<'E' >out\n'quoted' ${x}y\nE\n");
    }

    #[test]
    fn test_collapse_braces() {
        assert_eq!(run("echo ${a} ${a}b ${a}-b ${1}0 ${@}"), "echo $a ${a}b $a-b ${1}0 $@\n");
        assert_eq!(run("echo ${10}"), "echo ${10}\n");
    }

    #[test]
    fn test_inline_blocks() {
        assert_eq!(run("{ echo a; } >f"), "echo a >f\n");
        assert_eq!(run("( (ls) )"), "ls\n");
        assert_eq!(run("(cd /tmp)"), "(cd /tmp)\n");
        assert_eq!(run("(a=1)"), "(a=1)\n");
        assert_eq!(run("{ a; b; }"), "{ a;b;}\n");
        assert_eq!(run("{ a & }"), "{ a&}\n");
    }

    #[test]
    fn test_subshell_around_function_kept() {
        assert_eq!(
            run("f() { x=2; }; x=1; (f); echo \"$x\""),
            "f(){ x=2;};x=1;(f);echo \"$x\"\n"
        );
        assert_eq!(run("{ f; }; f() { :; }"), "f;f(){ :;}\n");
        assert_eq!(run("(command cd /)"), "(command cd /)\n");
        assert_eq!(run("(builtin cd /)"), "(builtin cd /)\n");
        assert_eq!(run("(g)"), "g\n");
    }

    #[test]
    fn test_inline_keeps_redirect_order() {
        assert_eq!(run("{ cmd 2>&1; } >f"), "cmd >f 2>&1\n");
    }

    #[test]
    fn test_backticks() {
        assert_eq!(run("x=$(ls)"), "x=`ls`\n");
        assert_eq!(run("x=$(echo $(ls))"), "x=$(echo `ls`)\n");
        assert_eq!(run("x=$(echo a\\ b)"), "x=$(echo a\\ b)\n");
        assert_eq!(run("echo \"$(echo \"a b\")\""), "echo \"$(echo \"a b\")\"\n");
    }
}
