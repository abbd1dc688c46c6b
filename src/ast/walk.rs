//! Generic depth-first traversal
//!
//! Every pass shares one walk. The per-node operation receives a tagged
//! reference, runs before the node's children are visited, and decides with
//! its return value whether the children are visited at all. Extra state is
//! whatever the closure captures.
//!
//! Children are visited in source order. Slots that are absent (an `if`
//! without `else`, a variable without index) are simply not visited.

use std::convert::Infallible;

use crate::ast::types::{
    Arg, Arglist, Arithmetic, AssignValue, Assignment, Block, Condlist, DeclItem, List, Pipeline,
    Redirect, Script, Subarg, Variable,
};

/// What the walk does after the operation ran on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    /// Visit the node's children
    Continue,
    /// Do not descend into this node
    Skip,
}

/// Tagged shared reference to any node
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Script(&'a Script),
    List(&'a List),
    Condlist(&'a Condlist),
    Pipeline(&'a Pipeline),
    Block(&'a Block),
    Arglist(&'a Arglist),
    Arg(&'a Arg),
    Subarg(&'a Subarg),
    Variable(&'a Variable),
    Assignment(&'a Assignment),
    DeclItem(&'a DeclItem),
    Redirect(&'a Redirect),
    Arithmetic(&'a Arithmetic),
}

/// Tagged exclusive reference to any node
#[derive(Debug)]
pub enum NodeMut<'a> {
    Script(&'a mut Script),
    List(&'a mut List),
    Condlist(&'a mut Condlist),
    Pipeline(&'a mut Pipeline),
    Block(&'a mut Block),
    Arglist(&'a mut Arglist),
    Arg(&'a mut Arg),
    Subarg(&'a mut Subarg),
    Variable(&'a mut Variable),
    Assignment(&'a mut Assignment),
    DeclItem(&'a mut DeclItem),
    Redirect(&'a mut Redirect),
    Arithmetic(&'a mut Arithmetic),
}

impl NodeMut<'_> {
    /// Shorter-lived copy of the same reference
    pub fn reborrow(&mut self) -> NodeMut<'_> {
        match self {
            NodeMut::Script(n) => NodeMut::Script(n),
            NodeMut::List(n) => NodeMut::List(n),
            NodeMut::Condlist(n) => NodeMut::Condlist(n),
            NodeMut::Pipeline(n) => NodeMut::Pipeline(n),
            NodeMut::Block(n) => NodeMut::Block(n),
            NodeMut::Arglist(n) => NodeMut::Arglist(n),
            NodeMut::Arg(n) => NodeMut::Arg(n),
            NodeMut::Subarg(n) => NodeMut::Subarg(n),
            NodeMut::Variable(n) => NodeMut::Variable(n),
            NodeMut::Assignment(n) => NodeMut::Assignment(n),
            NodeMut::DeclItem(n) => NodeMut::DeclItem(n),
            NodeMut::Redirect(n) => NodeMut::Redirect(n),
            NodeMut::Arithmetic(n) => NodeMut::Arithmetic(n),
        }
    }
}

// =============================================================================
// SHARED WALK
// =============================================================================

/// Walk a tree read-only
pub fn walk<'a, F>(node: Node<'a>, f: &mut F)
where
    F: FnMut(Node<'a>) -> Walk,
{
    let _ = try_walk(node, &mut |n| Ok::<_, Infallible>(f(n)));
}

/// Walk a tree read-only, stopping at the first error
pub fn try_walk<'a, E, F>(node: Node<'a>, f: &mut F) -> Result<(), E>
where
    F: FnMut(Node<'a>) -> Result<Walk, E>,
{
    if f(node)? == Walk::Skip {
        return Ok(());
    }
    match node {
        Node::Script(s) => try_walk(Node::List(&s.lst), f)?,
        Node::List(l) => {
            for cl in &l.cls {
                try_walk(Node::Condlist(cl), f)?;
            }
        }
        Node::Condlist(c) => {
            for pl in &c.pls {
                try_walk(Node::Pipeline(pl), f)?;
            }
        }
        Node::Pipeline(p) => {
            for b in &p.cmds {
                try_walk(Node::Block(b), f)?;
            }
        }
        Node::Block(b) => {
            match b {
                Block::Subshell(s) => try_walk(Node::List(&s.lst), f)?,
                Block::Brace(s) => try_walk(Node::List(&s.lst), f)?,
                Block::Function(s) => try_walk(Node::List(&s.lst), f)?,
                Block::Command(c) => {
                    for a in &c.var_assigns {
                        try_walk(Node::Assignment(a), f)?;
                    }
                    try_walk(Node::Arglist(&c.args), f)?;
                    for d in &c.cmd_var_assigns {
                        try_walk(Node::DeclItem(d), f)?;
                    }
                }
                Block::Case(c) => {
                    try_walk(Node::Arg(&c.carg), f)?;
                    for item in &c.cases {
                        for pat in &item.patterns {
                            try_walk(Node::Arg(pat), f)?;
                        }
                        try_walk(Node::List(&item.body), f)?;
                    }
                }
                Block::If(i) => {
                    for br in &i.blocks {
                        try_walk(Node::List(&br.cond), f)?;
                        try_walk(Node::List(&br.body), f)?;
                    }
                    if let Some(e) = &i.else_lst {
                        try_walk(Node::List(e), f)?;
                    }
                }
                Block::For(x) => {
                    try_walk(Node::Variable(&x.var), f)?;
                    if let Some(it) = &x.iter {
                        try_walk(Node::Arglist(it), f)?;
                    }
                    try_walk(Node::List(&x.ops), f)?;
                }
                Block::While(w) => {
                    try_walk(Node::List(&w.cond), f)?;
                    try_walk(Node::List(&w.ops), f)?;
                }
            }
            for r in b.redirs() {
                try_walk(Node::Redirect(r), f)?;
            }
        }
        Node::Arglist(a) => {
            for arg in &a.args {
                try_walk(Node::Arg(arg), f)?;
            }
        }
        Node::Arg(a) => {
            for sa in &a.subargs {
                try_walk(Node::Subarg(sa), f)?;
            }
        }
        Node::Subarg(sa) => match sa {
            Subarg::Literal(_) => {}
            Subarg::Variable { var, .. } => try_walk(Node::Variable(var), f)?,
            Subarg::Subshell { lst, .. } | Subarg::Procsub { lst, .. } => {
                try_walk(Node::List(lst), f)?
            }
            Subarg::Arithmetic { arith, .. } => try_walk(Node::Arithmetic(arith), f)?,
        },
        Node::Variable(v) => {
            if let Some(i) = &v.index {
                try_walk(Node::Arg(i), f)?;
            }
            if let Some(m) = &v.manip {
                try_walk(Node::Arg(m), f)?;
            }
        }
        Node::Assignment(a) => {
            try_walk(Node::Variable(&a.var), f)?;
            match &a.value {
                Some(AssignValue::Scalar(arg)) => try_walk(Node::Arg(arg), f)?,
                Some(AssignValue::Array(al)) => try_walk(Node::Arglist(al), f)?,
                None => {}
            }
        }
        Node::DeclItem(d) => match d {
            DeclItem::Assign(a) => try_walk(Node::Assignment(a), f)?,
            DeclItem::Name(v) => try_walk(Node::Variable(v), f)?,
            DeclItem::Flag(arg) => try_walk(Node::Arg(arg), f)?,
        },
        Node::Redirect(r) => {
            try_walk(Node::Arg(&r.target), f)?;
            if let Some(h) = &r.here_document {
                try_walk(Node::Arg(h), f)?;
            }
        }
        Node::Arithmetic(a) => match a {
            Arithmetic::Number(_) => {}
            Arithmetic::Variable { var, .. } => try_walk(Node::Variable(var), f)?,
            Arithmetic::Operation { lhs, rhs, .. } => {
                if let Some(l) = lhs {
                    try_walk(Node::Arithmetic(l), f)?;
                }
                if let Some(r) = rhs {
                    try_walk(Node::Arithmetic(r), f)?;
                }
            }
            Arithmetic::Parenthesis(x) => try_walk(Node::Arithmetic(x), f)?,
            Arithmetic::Subshell(l) => try_walk(Node::List(l), f)?,
        },
    }
    Ok(())
}

// =============================================================================
// EXCLUSIVE WALK
// =============================================================================

/// Walk a tree, letting the operation mutate each node before its children
/// are visited. Children are read after the operation returns, so a node
/// replaced in place is walked in its new shape.
pub fn walk_mut<F>(node: NodeMut<'_>, f: &mut F)
where
    F: FnMut(NodeMut<'_>) -> Walk,
{
    let _ = try_walk_mut(node, &mut |n| Ok::<_, Infallible>(f(n)));
}

/// Fallible [`walk_mut`]: the first error aborts the walk
pub fn try_walk_mut<E, F>(mut node: NodeMut<'_>, f: &mut F) -> Result<(), E>
where
    F: FnMut(NodeMut<'_>) -> Result<Walk, E>,
{
    if f(node.reborrow())? == Walk::Skip {
        return Ok(());
    }
    match node {
        NodeMut::Script(s) => try_walk_mut(NodeMut::List(&mut s.lst), f)?,
        NodeMut::List(l) => {
            for cl in &mut l.cls {
                try_walk_mut(NodeMut::Condlist(cl), f)?;
            }
        }
        NodeMut::Condlist(c) => {
            for pl in &mut c.pls {
                try_walk_mut(NodeMut::Pipeline(pl), f)?;
            }
        }
        NodeMut::Pipeline(p) => {
            for b in &mut p.cmds {
                try_walk_mut(NodeMut::Block(b), f)?;
            }
        }
        NodeMut::Block(b) => {
            match &mut *b {
                Block::Subshell(s) => try_walk_mut(NodeMut::List(&mut s.lst), f)?,
                Block::Brace(s) => try_walk_mut(NodeMut::List(&mut s.lst), f)?,
                Block::Function(s) => try_walk_mut(NodeMut::List(&mut s.lst), f)?,
                Block::Command(c) => {
                    for a in &mut c.var_assigns {
                        try_walk_mut(NodeMut::Assignment(a), f)?;
                    }
                    try_walk_mut(NodeMut::Arglist(&mut c.args), f)?;
                    for d in &mut c.cmd_var_assigns {
                        try_walk_mut(NodeMut::DeclItem(d), f)?;
                    }
                }
                Block::Case(c) => {
                    try_walk_mut(NodeMut::Arg(&mut c.carg), f)?;
                    for item in &mut c.cases {
                        for pat in &mut item.patterns {
                            try_walk_mut(NodeMut::Arg(pat), f)?;
                        }
                        try_walk_mut(NodeMut::List(&mut item.body), f)?;
                    }
                }
                Block::If(i) => {
                    for br in &mut i.blocks {
                        try_walk_mut(NodeMut::List(&mut br.cond), f)?;
                        try_walk_mut(NodeMut::List(&mut br.body), f)?;
                    }
                    if let Some(e) = &mut i.else_lst {
                        try_walk_mut(NodeMut::List(e), f)?;
                    }
                }
                Block::For(x) => {
                    try_walk_mut(NodeMut::Variable(&mut x.var), f)?;
                    if let Some(it) = &mut x.iter {
                        try_walk_mut(NodeMut::Arglist(it), f)?;
                    }
                    try_walk_mut(NodeMut::List(&mut x.ops), f)?;
                }
                Block::While(w) => {
                    try_walk_mut(NodeMut::List(&mut w.cond), f)?;
                    try_walk_mut(NodeMut::List(&mut w.ops), f)?;
                }
            }
            for r in b.redirs_mut() {
                try_walk_mut(NodeMut::Redirect(r), f)?;
            }
        }
        NodeMut::Arglist(a) => {
            for arg in &mut a.args {
                try_walk_mut(NodeMut::Arg(arg), f)?;
            }
        }
        NodeMut::Arg(a) => {
            for sa in &mut a.subargs {
                try_walk_mut(NodeMut::Subarg(sa), f)?;
            }
        }
        NodeMut::Subarg(sa) => match sa {
            Subarg::Literal(_) => {}
            Subarg::Variable { var, .. } => try_walk_mut(NodeMut::Variable(var), f)?,
            Subarg::Subshell { lst, .. } | Subarg::Procsub { lst, .. } => {
                try_walk_mut(NodeMut::List(lst), f)?
            }
            Subarg::Arithmetic { arith, .. } => try_walk_mut(NodeMut::Arithmetic(arith), f)?,
        },
        NodeMut::Variable(v) => {
            if let Some(i) = &mut v.index {
                try_walk_mut(NodeMut::Arg(i), f)?;
            }
            if let Some(m) = &mut v.manip {
                try_walk_mut(NodeMut::Arg(m), f)?;
            }
        }
        NodeMut::Assignment(a) => {
            try_walk_mut(NodeMut::Variable(&mut a.var), f)?;
            match &mut a.value {
                Some(AssignValue::Scalar(arg)) => try_walk_mut(NodeMut::Arg(arg), f)?,
                Some(AssignValue::Array(al)) => try_walk_mut(NodeMut::Arglist(al), f)?,
                None => {}
            }
        }
        NodeMut::DeclItem(d) => match d {
            DeclItem::Assign(a) => try_walk_mut(NodeMut::Assignment(a), f)?,
            DeclItem::Name(v) => try_walk_mut(NodeMut::Variable(v), f)?,
            DeclItem::Flag(arg) => try_walk_mut(NodeMut::Arg(arg), f)?,
        },
        NodeMut::Redirect(r) => {
            try_walk_mut(NodeMut::Arg(&mut r.target), f)?;
            if let Some(h) = &mut r.here_document {
                try_walk_mut(NodeMut::Arg(h), f)?;
            }
        }
        NodeMut::Arithmetic(a) => match a {
            Arithmetic::Number(_) => {}
            Arithmetic::Variable { var, .. } => try_walk_mut(NodeMut::Variable(var), f)?,
            Arithmetic::Operation { lhs, rhs, .. } => {
                if let Some(l) = lhs {
                    try_walk_mut(NodeMut::Arithmetic(l), f)?;
                }
                if let Some(r) = rhs {
                    try_walk_mut(NodeMut::Arithmetic(r), f)?;
                }
            }
            Arithmetic::Parenthesis(x) => try_walk_mut(NodeMut::Arithmetic(x), f)?,
            Arithmetic::Subshell(l) => try_walk_mut(NodeMut::List(l), f)?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{Command, Condlist, AST};

    fn sample() -> List {
        let mut cmd = AST::command(&["echo"]);
        cmd.args.args.push(Arg::new(vec![Subarg::Variable {
            var: Variable::new("x"),
            quoted: false,
        }]));
        List::new(vec![
            Condlist::from_block(Block::Command(cmd)),
            AST::statement(AST::command(&["true"])),
        ])
    }

    #[test]
    fn test_walk_visits_top_down() {
        let lst = sample();
        let mut order = Vec::new();
        walk(Node::List(&lst), &mut |n| {
            match n {
                Node::List(_) => order.push("list"),
                Node::Block(_) => order.push("block"),
                Node::Variable(_) => order.push("var"),
                _ => {}
            }
            Walk::Continue
        });
        assert_eq!(order, vec!["list", "block", "var", "block"]);
    }

    #[test]
    fn test_walk_skip_prunes_children() {
        let lst = sample();
        let mut vars = 0;
        walk(Node::List(&lst), &mut |n| match n {
            Node::Arglist(_) => Walk::Skip,
            Node::Variable(_) => {
                vars += 1;
                Walk::Continue
            }
            _ => Walk::Continue,
        });
        assert_eq!(vars, 0);
    }

    #[test]
    fn test_walk_mut_sees_replaced_node() {
        let mut lst = sample();
        let mut seen_true = 0;
        walk_mut(NodeMut::List(&mut lst), &mut |n| {
            if let NodeMut::Block(b) = n {
                if b.cmd_name() == Some("echo") {
                    *b = Block::Command(Command::new(vec![Arg::literal("true")]));
                }
                if b.cmd_name() == Some("true") {
                    seen_true += 1;
                }
            }
            Walk::Continue
        });
        assert_eq!(seen_true, 2);
    }

    #[test]
    fn test_try_walk_mut_stops_on_error() {
        let mut lst = sample();
        let mut blocks = 0;
        let res: Result<(), &str> = try_walk_mut(NodeMut::List(&mut lst), &mut |n| {
            if let NodeMut::Block(_) = n {
                blocks += 1;
                return Err("stop");
            }
            Ok(Walk::Continue)
        });
        assert_eq!(res, Err("stop"));
        assert_eq!(blocks, 1);
    }
}
