//! Identifier renaming
//!
//! Defined variables and functions get the shortest free names, the most
//! frequent first. A name already holding one of the names given to its
//! frequency class keeps it, so renaming an already renamed script is a
//! no-op.

use super::MinifyOptions;
use crate::analysis::names::{is_reserved_variable, is_reserved_word, name_args, NameArg};
use crate::analysis::Maps;
use crate::ast::types::{Arg, Block, Script};
use crate::ast::{walk_mut, NodeMut, Walk};
use crate::parser::types::is_valid_name;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

const FIRST_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_";
const NEXT_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_0123456789";

/// `n`-th generated name: every one-character name, then two characters, ...
pub fn generated_name(mut n: usize) -> String {
    let mut name = String::new();
    name.push(FIRST_CHARS[n % FIRST_CHARS.len()] as char);
    n /= FIRST_CHARS.len();
    while n > 0 {
        n -= 1;
        name.push(NEXT_CHARS[n % NEXT_CHARS.len()] as char);
        n /= NEXT_CHARS.len();
    }
    name
}

/// Assign new names to the candidates of `freq`.
///
/// `is_free` tells whether a generated name may be handed out. Identity
/// renames are left out of the result.
pub fn build_map<F>(freq: &BTreeMap<String, usize>, is_free: F) -> BTreeMap<String, String>
where
    F: Fn(&str) -> bool,
{
    let mut cands: Vec<(&str, usize)> = freq.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    cands.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(a.0)));

    let mut map = BTreeMap::new();
    let mut gen = 0;
    let mut next_name = || loop {
        let name = generated_name(gen);
        gen += 1;
        if is_free(&name) {
            return name;
        }
    };

    for class in cands.chunk_by(|a, b| a.1 == b.1) {
        let targets: Vec<String> = (0..class.len()).map(|_| next_name()).collect();
        let kept: HashSet<&str> = class
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| targets.iter().any(|t| t.as_str() == *name))
            .collect();
        let mut free = targets.iter().filter(|t| !kept.contains(t.as_str()));
        for (name, _) in class {
            if kept.contains(name) {
                continue;
            }
            if let Some(to) = free.next() {
                map.insert(name.to_string(), to.clone());
            }
        }
    }
    map
}

fn var_excluded(name: &str, opts: &MinifyOptions) -> bool {
    !is_valid_name(name)
        || is_reserved_word(name)
        || (opts.exclude_reserved && is_reserved_variable(name))
        || opts.exclude_var.as_ref().map(|re| re.is_match(name)).unwrap_or(false)
}

fn fct_excluded(name: &str, opts: &MinifyOptions) -> bool {
    !is_valid_name(name)
        || is_reserved_word(name)
        || opts.exclude_fct.as_ref().map(|re| re.is_match(name)).unwrap_or(false)
}

/// Rename variables, returns the applied map
pub fn minify_var(
    sc: &mut Script,
    maps: &mut Maps,
    opts: &MinifyOptions,
) -> BTreeMap<String, String> {
    let map = match &opts.map {
        Some(m) => m.var.clone(),
        None => {
            let defs = maps.vardefs(sc).clone();
            let calls = maps.varcalls(sc).clone();
            let freq: BTreeMap<String, usize> = defs
                .iter()
                .filter(|(name, _)| !var_excluded(name, opts))
                .map(|(name, n)| (name.clone(), n + calls.get(name).copied().unwrap_or(0)))
                .collect();
            let fixed: BTreeSet<&String> = defs
                .keys()
                .chain(calls.keys())
                .filter(|name| !freq.contains_key(*name))
                .collect();
            build_map(&freq, |n| {
                !fixed.iter().any(|f| f.as_str() == n)
                    && !var_excluded(n, opts)
                    && !is_reserved_variable(n)
            })
        }
    };
    if !map.is_empty() {
        rename_vars(sc, &map);
        maps.invalidate_vars();
    }
    debug!(count = map.len(), "renamed variables");
    map
}

/// Rename functions, returns the applied map
pub fn minify_fct(
    sc: &mut Script,
    maps: &mut Maps,
    opts: &MinifyOptions,
) -> BTreeMap<String, String> {
    let map = match &opts.map {
        Some(m) => m.fct.clone(),
        None => {
            let fcts = maps.fcts(sc).clone();
            let cmds = maps.cmds(sc).clone();
            let freq: BTreeMap<String, usize> = fcts
                .iter()
                .filter(|(name, _)| !fct_excluded(name, opts))
                .map(|(name, n)| (name.clone(), n + cmds.get(name).copied().unwrap_or(0)))
                .collect();
            let fixed: BTreeSet<&String> = fcts
                .keys()
                .chain(cmds.keys())
                .filter(|name| !freq.contains_key(*name))
                .collect();
            build_map(&freq, |n| {
                !fixed.iter().any(|f| f.as_str() == n) && !fct_excluded(n, opts)
            })
        }
    };
    if !map.is_empty() {
        rename_fcts(sc, &map);
        maps.invalidate_fcts();
    }
    debug!(count = map.len(), "renamed functions");
    map
}

/// Apply a variable rename map
pub fn rename_vars(sc: &mut Script, map: &BTreeMap<String, String>) {
    walk_mut(NodeMut::Script(sc), &mut |n: NodeMut<'_>| {
        match n {
            NodeMut::Variable(v) => {
                if let Some(to) = map.get(&v.name) {
                    v.name = to.clone();
                }
            }
            NodeMut::Block(Block::Command(c)) => {
                for (i, kind) in name_args(c) {
                    if kind == NameArg::Function {
                        continue;
                    }
                    if let Some(to) = c.arg_string(i).and_then(|s| map.get(s)) {
                        c.args.args[i] = Arg::literal(to.clone());
                    }
                }
            }
            _ => {}
        }
        Walk::Continue
    });
}

/// Apply a function rename map
pub fn rename_fcts(sc: &mut Script, map: &BTreeMap<String, String>) {
    walk_mut(NodeMut::Script(sc), &mut |n: NodeMut<'_>| {
        match n {
            NodeMut::Block(Block::Function(f)) => {
                if let Some(to) = map.get(&f.name) {
                    f.name = to.clone();
                }
            }
            NodeMut::Block(Block::Command(c)) => {
                let mut positions: Vec<usize> = name_args(c)
                    .into_iter()
                    .filter(|(_, kind)| *kind == NameArg::Function)
                    .map(|(i, _)| i)
                    .collect();
                positions.push(0);
                for i in positions {
                    if let Some(to) = c.arg_string(i).and_then(|s| map.get(s)) {
                        c.args.args[i] = Arg::literal(to.clone());
                    }
                }
            }
            _ => {}
        }
        Walk::Continue
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{generate, GenOptions};
    use crate::parser::{parse_script, ParseOptions};
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Script {
        parse_script(input, &ParseOptions::default()).unwrap()
    }

    fn min(sc: &Script) -> String {
        generate(sc, &GenOptions { minimal: true })
    }

    #[test]
    fn test_generated_names() {
        assert_eq!(generated_name(0), "a");
        assert_eq!(generated_name(25), "z");
        assert_eq!(generated_name(26), "A");
        assert_eq!(generated_name(52), "_");
        assert_eq!(generated_name(53), "aa");
        assert_eq!(generated_name(54), "ba");
    }

    #[test]
    fn test_build_map_orders_by_frequency() {
        let freq: BTreeMap<String, usize> = [("x".to_string(), 1), ("LONG".to_string(), 5)]
            .into_iter()
            .collect();
        let map = build_map(&freq, |_| true);
        assert_eq!(map.get("LONG").map(String::as_str), Some("a"));
        assert_eq!(map.get("x").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_build_map_keeps_names_in_class() {
        let freq: BTreeMap<String, usize> = [("b".to_string(), 2), ("zz".to_string(), 2)]
            .into_iter()
            .collect();
        let map = build_map(&freq, |_| true);
        assert_eq!(map.get("zz").map(String::as_str), Some("a"));
        assert!(!map.contains_key("b"));
    }

    #[test]
    fn test_minify_var_scenario() {
        let mut sc = parse("VAR_LONG_NAME=1; echo \"$VAR_LONG_NAME\"");
        let mut maps = Maps::new();
        minify_var(&mut sc, &mut maps, &MinifyOptions::default());
        assert_eq!(min(&sc), "a=1;echo \"$a\"\n");
    }

    #[test]
    fn test_minify_var_avoids_used_names() {
        let mut sc = parse("long=1; echo $a $long $HOME");
        let mut maps = Maps::new();
        let map = minify_var(&mut sc, &mut maps, &MinifyOptions::default());
        assert_eq!(map.get("long").map(String::as_str), Some("b"));
        assert_eq!(min(&sc), "b=1;echo $a $b $HOME\n");
    }

    #[test]
    fn test_minify_var_is_idempotent() {
        let mut sc = parse("one=1; two=2; three=$one$two; read four; echo $three $four $two");
        let mut maps = Maps::new();
        let opts = MinifyOptions::default();
        let first = minify_var(&mut sc, &mut maps, &opts);
        assert!(!first.is_empty());
        let second = minify_var(&mut sc, &mut maps, &opts);
        assert!(second.is_empty());
    }

    #[test]
    fn test_minify_var_renaming_is_injective() {
        let mut sc = parse("aa=1; bb=2; cc=3; PATH=x; echo $aa $bb $cc");
        let mut maps = Maps::new();
        let map = minify_var(&mut sc, &mut maps, &MinifyOptions::default());
        let targets: HashSet<&String> = map.values().collect();
        assert_eq!(targets.len(), map.len());
        assert!(!map.contains_key("PATH"));
        assert!(!targets.iter().any(|t| is_reserved_variable(t)));
    }

    #[test]
    fn test_minify_var_exclusion_regex() {
        let mut sc = parse("keep_me=1; other=2; echo $keep_me $other");
        let mut maps = Maps::new();
        let opts = MinifyOptions {
            exclude_var: Some(regex_lite::Regex::new("^keep_").unwrap()),
            ..Default::default()
        };
        minify_var(&mut sc, &mut maps, &opts);
        assert_eq!(min(&sc), "keep_me=1;a=2;echo $keep_me $a\n");
    }

    #[test]
    fn test_minify_fct() {
        let mut sc = parse("my_function() { ls; }; my_function; unset -f my_function");
        let mut maps = Maps::new();
        let map = minify_fct(&mut sc, &mut maps, &MinifyOptions::default());
        assert_eq!(map.get("my_function").map(String::as_str), Some("a"));
        assert_eq!(min(&sc), "a(){ ls;};a;unset -f a\n");
    }

    #[test]
    fn test_minify_fct_avoids_commands() {
        let mut sc = parse("long() { a; }; long");
        let mut maps = Maps::new();
        let map = minify_fct(&mut sc, &mut maps, &MinifyOptions::default());
        assert_eq!(map.get("long").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_preseeded_map() {
        let mut sc = parse("x=1; echo $x");
        let mut maps = Maps::new();
        let opts = MinifyOptions {
            map: Some(crate::passes::minify::MinifyMap::parse("var zz x\n").unwrap()),
            ..Default::default()
        };
        minify_var(&mut sc, &mut maps, &opts);
        assert_eq!(min(&sc), "zz=1;echo $zz\n");
    }
}
