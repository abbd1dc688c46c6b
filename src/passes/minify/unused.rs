//! Dead code elimination
//!
//! Functions never invoked and assignments of variables never read are
//! deleted, round after round, until a round deletes nothing: deleting a
//! function may leave the variables it read unused.

use super::MinifyOptions;
use crate::analysis::names::is_reserved_variable;
use crate::analysis::{Counts, Maps};
use crate::ast::types::{AssignValue, Assignment, Block, Condlist, List, Script, Subarg, AST};
use crate::ast::{walk_mut, NodeMut, Walk};
use crate::parser::types::is_valid_name;
use tracing::debug;

/// Delete unused functions and variables, returns the number of deleted items
pub fn delete_unused(sc: &mut Script, maps: &mut Maps, opts: &MinifyOptions) -> usize {
    let mut total = 0;
    loop {
        maps.invalidate();
        let calls = maps.varcalls(sc).clone();
        let cmds = maps.cmds(sc).clone();
        let unused = Unused {
            calls: &calls,
            cmds: &cmds,
            opts,
        };
        let deleted = unused.prune(sc);
        if deleted == 0 {
            break;
        }
        debug!(deleted, "deleted unused code");
        total += deleted;
    }
    maps.invalidate();
    total
}

struct Unused<'a> {
    calls: &'a Counts,
    cmds: &'a Counts,
    opts: &'a MinifyOptions,
}

impl Unused<'_> {
    fn unused_fct(&self, name: &str) -> bool {
        !self.cmds.contains_key(name)
            && !self
                .opts
                .exclude_fct
                .as_ref()
                .map(|re| re.is_match(name))
                .unwrap_or(false)
    }

    fn unused_var(&self, a: &Assignment) -> bool {
        let name = a.var.name.as_str();
        is_valid_name(name)
            && a.var.index.is_none()
            && !self.calls.contains_key(name)
            && !is_reserved_variable(name)
            && !self
                .opts
                .exclude_var
                .as_ref()
                .map(|re| re.is_match(name))
                .unwrap_or(false)
            && !has_side_effects(a)
    }

    fn prune(&self, sc: &mut Script) -> usize {
        let mut deleted = 0;
        let mut top = true;
        walk_mut(NodeMut::Script(sc), &mut |n: NodeMut<'_>| {
            if let NodeMut::List(lst) = n {
                let had_statements = !lst.is_empty();
                deleted += self.prune_list(lst);
                // bodies keep at least one statement, the script itself may be empty
                if had_statements && lst.is_empty() && !top {
                    lst.cls.push(AST::true_statement());
                }
                top = false;
            }
            Walk::Continue
        });
        deleted
    }

    fn prune_list(&self, lst: &mut List) -> usize {
        let mut deleted = 0;
        lst.cls.retain_mut(|cl| {
            if let [pl] = cl.pls.as_slice() {
                if let [Block::Function(f)] = pl.cmds.as_slice() {
                    if self.unused_fct(&f.name) {
                        deleted += 1;
                        return false;
                    }
                }
            }
            let (n, keep) = self.prune_statement(cl);
            deleted += n;
            keep
        });
        deleted
    }

    /// Delete unused assignments of a statement, false when nothing is left
    fn prune_statement(&self, cl: &mut Condlist) -> (usize, bool) {
        let single = cl.single_cmd().is_some();
        let mut deleted = 0;
        for pl in &mut cl.pls {
            for blk in &mut pl.cmds {
                let Block::Command(cmd) = blk else {
                    continue;
                };
                if !cmd.is_assignment_only() {
                    continue;
                }
                let before = cmd.var_assigns.len();
                cmd.var_assigns.retain(|a| !self.unused_var(a));
                deleted += before - cmd.var_assigns.len();
                if !cmd.var_assigns.is_empty() || !cmd.redirs.is_empty() {
                    continue;
                }
                if single {
                    return (deleted, false);
                }
                *blk = Block::Command(AST::command(&["true"]));
            }
        }
        (deleted, true)
    }
}

/// Whether evaluating the assigned value can do more than produce a string
fn has_side_effects(a: &Assignment) -> bool {
    let args = match &a.value {
        None => return false,
        Some(AssignValue::Scalar(arg)) => std::slice::from_ref(arg),
        Some(AssignValue::Array(lst)) => lst.args.as_slice(),
    };
    args.iter().any(|arg| {
        arg.subargs.iter().any(|sa| match sa {
            Subarg::Subshell { .. } | Subarg::Procsub { .. } | Subarg::Arithmetic { .. } => true,
            Subarg::Variable { var, .. } => var.manip.is_some(),
            Subarg::Literal(_) => false,
        })
    })
}
