//! Analysis Maps
//!
//! Occurrence counts of variable definitions, variable uses, function
//! definitions and command invocations. Each map is built by one walk and
//! cached until invalidated; passes that delete or rename nodes must
//! invalidate before the next read since the minifier depends on exact counts.

use crate::analysis::names::{name_args, NameArg};
use crate::ast::types::{Block, Script};
use crate::ast::{walk, Node, Walk};
use crate::parser::types::is_valid_name;
use std::collections::BTreeMap;

/// Name -> number of occurrences
pub type Counts = BTreeMap<String, usize>;

fn bump(map: &mut Counts, name: &str) {
    *map.entry(name.to_string()).or_insert(0) += 1;
}

/// Variable definitions and uses under `node`
pub fn count_vars(node: Node<'_>) -> (Counts, Counts) {
    let mut defs = Counts::new();
    let mut calls = Counts::new();
    walk(node, &mut |n| {
        match n {
            Node::Variable(v) if is_valid_name(&v.name) => {
                if v.definition {
                    bump(&mut defs, &v.name);
                } else {
                    bump(&mut calls, &v.name);
                }
            }
            Node::Block(Block::Command(c)) => {
                for (i, kind) in name_args(c) {
                    if let Some(name) = c.arg_string(i) {
                        match kind {
                            NameArg::Definition => bump(&mut defs, name),
                            NameArg::Use => bump(&mut calls, name),
                            NameArg::Function => {}
                        }
                    }
                }
            }
            _ => {}
        }
        Walk::Continue
    });
    (defs, calls)
}

/// Function definitions under `node`
pub fn count_fcts(node: Node<'_>) -> Counts {
    let mut fcts = Counts::new();
    walk(node, &mut |n| {
        if let Node::Block(Block::Function(f)) = n {
            bump(&mut fcts, &f.name);
        }
        Walk::Continue
    });
    fcts
}

/// Command invocations under `node`, by literal command name
pub fn count_cmds(node: Node<'_>) -> Counts {
    let mut cmds = Counts::new();
    walk(node, &mut |n| {
        if let Node::Block(Block::Command(c)) = n {
            if let Some(name) = c.name() {
                bump(&mut cmds, name);
            }
        }
        Walk::Continue
    });
    cmds
}

/// Memoized maps over one script
#[derive(Debug, Default)]
pub struct Maps {
    vardefs: Option<Counts>,
    varcalls: Option<Counts>,
    fcts: Option<Counts>,
    cmds: Option<Counts>,
}

impl Maps {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_vars(&mut self, sc: &Script) {
        if self.vardefs.is_none() || self.varcalls.is_none() {
            let (defs, calls) = count_vars(Node::Script(sc));
            self.vardefs = Some(defs);
            self.varcalls = Some(calls);
        }
    }

    pub fn vardefs(&mut self, sc: &Script) -> &Counts {
        self.ensure_vars(sc);
        self.vardefs.get_or_insert_with(Counts::new)
    }

    pub fn varcalls(&mut self, sc: &Script) -> &Counts {
        self.ensure_vars(sc);
        self.varcalls.get_or_insert_with(Counts::new)
    }

    pub fn fcts(&mut self, sc: &Script) -> &Counts {
        self.fcts.get_or_insert_with(|| count_fcts(Node::Script(sc)))
    }

    pub fn cmds(&mut self, sc: &Script) -> &Counts {
        self.cmds.get_or_insert_with(|| count_cmds(Node::Script(sc)))
    }

    pub fn invalidate_vars(&mut self) {
        self.vardefs = None;
        self.varcalls = None;
    }

    pub fn invalidate_fcts(&mut self) {
        self.fcts = None;
        self.cmds = None;
    }

    pub fn invalidate(&mut self) {
        self.invalidate_vars();
        self.invalidate_fcts();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_script, ParseOptions};

    fn parse(input: &str) -> Script {
        parse_script(input, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn test_count_vars() {
        let sc = parse("a=1; b=$a; for i in x; do echo \"$a$i\" $((c + 1)); done; read d; unset e; echo $1");
        let (defs, calls) = count_vars(Node::Script(&sc));
        assert_eq!(defs.get("a"), Some(&1));
        assert_eq!(defs.get("b"), Some(&1));
        assert_eq!(defs.get("i"), Some(&1));
        assert_eq!(defs.get("d"), Some(&1));
        assert_eq!(calls.get("a"), Some(&2));
        assert_eq!(calls.get("c"), Some(&1));
        assert_eq!(calls.get("e"), Some(&1));
        assert!(calls.get("1").is_none());
    }

    #[test]
    fn test_count_fcts_and_cmds() {
        let sc = parse("f() { g; }; f; f; ls");
        let fcts = count_fcts(Node::Script(&sc));
        let cmds = count_cmds(Node::Script(&sc));
        assert_eq!(fcts.get("f"), Some(&1));
        assert_eq!(cmds.get("f"), Some(&2));
        assert_eq!(cmds.get("g"), Some(&1));
        assert_eq!(cmds.get("ls"), Some(&1));
    }

    #[test]
    fn test_maps_cache_and_invalidate() {
        let mut sc = parse("a=1");
        let mut maps = Maps::new();
        assert_eq!(maps.vardefs(&sc).len(), 1);
        sc.lst.cls.clear();
        // stale until invalidated
        assert_eq!(maps.vardefs(&sc).len(), 1);
        maps.invalidate();
        assert!(maps.vardefs(&sc).is_empty());
    }
}
