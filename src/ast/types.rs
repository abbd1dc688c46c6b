//! Abstract Syntax Tree (AST) Types for shell scripts
//!
//! Every node exclusively owns its children: there is no sharing and no cycle,
//! so a pass that moves a subtree takes it out of its slot (leaving a default
//! value behind) instead of copying it.
//!
//! Literal argument fragments keep their raw source text, quotes and escapes
//! included. Regenerating a literal therefore reproduces its exact quoting and
//! passes such as quote stripping work directly on that text.

// =============================================================================
// SCRIPT & LISTS
// =============================================================================

/// Root node: a complete file or unit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    /// Shebang line without trailing newline, empty when absent
    pub shebang: String,
    /// Origin of the script, used in diagnostics
    pub filename: String,
    pub lst: List,
}

/// A sequence of statements
#[derive(Debug, Clone, PartialEq, Default)]
pub struct List {
    pub cls: Vec<Condlist>,
}

/// A chain of pipelines joined by `&&`/`||`, optionally run in background
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condlist {
    pub pls: Vec<Pipeline>,
    /// Operator between `pls[i]` and `pls[i + 1]`: `true` is `||`
    pub or_ops: Vec<bool>,
    /// Trailing `&`
    pub parallel: bool,
}

/// A chain of blocks joined by `|`, optionally negated with `!`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    pub cmds: Vec<Block>,
    pub negated: bool,
}

// =============================================================================
// BLOCKS
// =============================================================================

/// Any executable unit
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Subshell(Subshell),
    Brace(Brace),
    Function(Function),
    Command(Command),
    Case(Case),
    If(If),
    For(For),
    While(While),
}

impl Default for Block {
    fn default() -> Self {
        Block::Command(Command::default())
    }
}

/// Subshell: ( ... )
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Subshell {
    pub lst: List,
    pub redirs: Vec<Redirect>,
}

/// Brace group: { ...; }
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Brace {
    pub lst: List,
    pub redirs: Vec<Redirect>,
}

/// Function definition: name() { ... }
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Function {
    pub name: String,
    pub lst: List,
    pub redirs: Vec<Redirect>,
}

/// One command invocation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
    /// Assignments before the command: VAR=value cmd
    pub var_assigns: Vec<Assignment>,
    /// Command name and arguments
    pub args: Arglist,
    /// Variable-declaring builtin (export, readonly, local, declare, typeset)
    pub is_cmdvar: bool,
    /// Operands of a variable-declaring builtin
    pub cmd_var_assigns: Vec<DeclItem>,
    pub redirs: Vec<Redirect>,
}

/// case statement
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Case {
    pub carg: Arg,
    pub cases: Vec<CaseItem>,
    pub redirs: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaseItem {
    pub patterns: Vec<Arg>,
    /// May be empty: `a) ;;`
    pub body: List,
}

/// if statement
#[derive(Debug, Clone, PartialEq, Default)]
pub struct If {
    pub blocks: Vec<IfBranch>,
    pub else_lst: Option<List>,
    pub redirs: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IfBranch {
    pub cond: List,
    pub body: List,
}

/// for loop: for VAR in WORDS; do ...; done
#[derive(Debug, Clone, PartialEq, Default)]
pub struct For {
    pub var: Variable,
    /// Words to iterate over (None = "$@")
    pub iter: Option<Arglist>,
    pub ops: List,
    pub redirs: Vec<Redirect>,
}

/// while loop, `until` is stored with a negated condition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct While {
    pub cond: List,
    pub ops: List,
    pub redirs: Vec<Redirect>,
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

/// Variable assignment: VAR=value, VAR+=value, VAR[I]=value or VAR=(a b c)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Assignment {
    pub var: Variable,
    /// Append mode: VAR+=value
    pub append: bool,
    /// None for `VAR=`
    pub value: Option<AssignValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignValue {
    Scalar(Arg),
    /// Array literal: VAR=(a b c)
    Array(Arglist),
}

/// Operand of a variable-declaring builtin
#[derive(Debug, Clone, PartialEq)]
pub enum DeclItem {
    /// `export VAR=value`
    Assign(Assignment),
    /// `export VAR`
    Name(Variable),
    /// Anything else, usually an option such as `-a`
    Flag(Arg),
}

// =============================================================================
// ARGUMENTS
// =============================================================================

/// Argument vector
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Arglist {
    pub args: Vec<Arg>,
}

/// One shell word, made of fragments
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Arg {
    pub subargs: Vec<Subarg>,
}

/// Fragment of an argument
#[derive(Debug, Clone, PartialEq)]
pub enum Subarg {
    /// Raw source text, quotes and escapes included
    Literal(String),
    /// $VAR or ${VAR...}
    Variable { var: Variable, quoted: bool },
    /// $(...) or `...`
    Subshell {
        lst: List,
        quoted: bool,
        backtick: bool,
    },
    /// $((...))
    Arithmetic { arith: Arithmetic, quoted: bool },
    /// <(...) or >(...)
    Procsub { lst: List, output: bool },
}

/// A variable reference or assignment target
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variable {
    pub name: String,
    /// Assignment target rather than a read
    pub definition: bool,
    /// Array subscript: ${VAR[I]}
    pub index: Option<Arg>,
    /// Manipulation text: the part after the name, or the `#`/`!` prefix
    /// when `precedence` is set
    pub manip: Option<Arg>,
    /// Written with braces
    pub is_manip: bool,
    /// Manipulation is a prefix: ${#VAR}, ${!VAR}
    pub precedence: bool,
}

/// I/O redirection
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Redirect {
    /// Operator including its file descriptor: `>`, `2>`, `2>&`, `<<-`, `&>`, ...
    pub op: String,
    /// Target word, or the delimiter for here-documents
    pub target: Arg,
    /// Body of a here-document
    pub here_document: Option<Arg>,
}

// =============================================================================
// ARITHMETIC
// =============================================================================

/// $(( )) expression
#[derive(Debug, Clone, PartialEq)]
pub enum Arithmetic {
    Number(String),
    /// `x`, `$x` or `${x}`
    Variable { var: Variable, dollar: bool },
    /// Prefix unary when `lhs` is None, postfix unary when `rhs` is None
    Operation {
        op: String,
        lhs: Option<Box<Arithmetic>>,
        rhs: Option<Box<Arithmetic>>,
    },
    Parenthesis(Box<Arithmetic>),
    /// $(...) inside an expression
    Subshell(List),
}

impl Default for Arithmetic {
    fn default() -> Self {
        Arithmetic::Number("0".to_string())
    }
}

// =============================================================================
// NODE HELPERS
// =============================================================================

impl List {
    pub fn new(cls: Vec<Condlist>) -> Self {
        List { cls }
    }

    pub fn is_empty(&self) -> bool {
        self.cls.is_empty()
    }

    /// Append the statements of another list
    pub fn extend(&mut self, other: List) {
        self.cls.extend(other.cls);
    }
}

impl Condlist {
    pub fn new(pl: Pipeline) -> Self {
        Condlist {
            pls: vec![pl],
            or_ops: Vec::new(),
            parallel: false,
        }
    }

    /// Single-block statement
    pub fn from_block(block: Block) -> Self {
        Condlist::new(Pipeline::new(block))
    }

    pub fn add(&mut self, pl: Pipeline, or_op: bool) {
        self.or_ops.push(or_op);
        self.pls.push(pl);
    }

    /// Logical negation: flip every pipeline and swap every operator.
    ///
    /// With `&&`/`||` left-associative and of equal precedence this is the
    /// De Morgan dual of the chain.
    pub fn negate(&mut self) {
        for pl in &mut self.pls {
            pl.negated = !pl.negated;
        }
        for op in &mut self.or_ops {
            *op = !*op;
        }
    }

    /// The command when the statement is a single plain command
    pub fn single_cmd(&self) -> Option<&Command> {
        match self.pls.as_slice() {
            [pl] => match pl.cmds.as_slice() {
                [Block::Command(c)] => Some(c),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn single_cmd_mut(&mut self) -> Option<&mut Command> {
        match self.pls.as_mut_slice() {
            [pl] => match pl.cmds.as_mut_slice() {
                [Block::Command(c)] => Some(c),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Pipeline {
    pub fn new(block: Block) -> Self {
        Pipeline {
            cmds: vec![block],
            negated: false,
        }
    }
}

impl Block {
    pub fn redirs(&self) -> &Vec<Redirect> {
        match self {
            Block::Subshell(b) => &b.redirs,
            Block::Brace(b) => &b.redirs,
            Block::Function(b) => &b.redirs,
            Block::Command(b) => &b.redirs,
            Block::Case(b) => &b.redirs,
            Block::If(b) => &b.redirs,
            Block::For(b) => &b.redirs,
            Block::While(b) => &b.redirs,
        }
    }

    pub fn redirs_mut(&mut self) -> &mut Vec<Redirect> {
        match self {
            Block::Subshell(b) => &mut b.redirs,
            Block::Brace(b) => &mut b.redirs,
            Block::Function(b) => &mut b.redirs,
            Block::Command(b) => &mut b.redirs,
            Block::Case(b) => &mut b.redirs,
            Block::If(b) => &mut b.redirs,
            Block::For(b) => &mut b.redirs,
            Block::While(b) => &mut b.redirs,
        }
    }

    /// Literal name when this block is a command
    pub fn cmd_name(&self) -> Option<&str> {
        match self {
            Block::Command(c) => c.name(),
            _ => None,
        }
    }
}

impl Command {
    pub fn new(args: Vec<Arg>) -> Self {
        Command {
            args: Arglist { args },
            ..Default::default()
        }
    }

    /// Literal command name, if any
    pub fn name(&self) -> Option<&str> {
        self.arg_string(0)
    }

    /// Literal value of argument `n`, if it is a single literal fragment
    pub fn arg_string(&self, n: usize) -> Option<&str> {
        self.args.args.get(n).and_then(|a| a.string())
    }

    /// A statement made only of assignments: `a=1 b=2`
    pub fn is_assignment_only(&self) -> bool {
        self.args.args.is_empty() && !self.var_assigns.is_empty()
    }
}

impl Arglist {
    pub fn new(args: Vec<Arg>) -> Self {
        Arglist { args }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

impl Arg {
    pub fn new(subargs: Vec<Subarg>) -> Self {
        Arg { subargs }
    }

    /// Argument made of one raw literal
    pub fn literal(raw: impl Into<String>) -> Self {
        Arg {
            subargs: vec![Subarg::Literal(raw.into())],
        }
    }

    /// Raw text when the argument is a single literal fragment
    pub fn string(&self) -> Option<&str> {
        match self.subargs.as_slice() {
            [Subarg::Literal(s)] => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subargs.is_empty()
    }

    /// Append raw literal text, merging with a trailing literal
    pub fn push_literal(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        if let Some(Subarg::Literal(s)) = self.subargs.last_mut() {
            s.push_str(raw);
        } else {
            self.subargs.push(Subarg::Literal(raw.to_string()));
        }
    }

    /// Prepend raw literal text, merging with a leading literal
    pub fn prepend_literal(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        if let Some(Subarg::Literal(s)) = self.subargs.first_mut() {
            s.insert_str(0, raw);
        } else {
            self.subargs.insert(0, Subarg::Literal(raw.to_string()));
        }
    }

    /// Append a fragment, merging adjacent literals
    pub fn push(&mut self, sa: Subarg) {
        match sa {
            Subarg::Literal(s) => self.push_literal(&s),
            other => self.subargs.push(other),
        }
    }

    /// Append every fragment of another argument
    pub fn append(&mut self, other: Arg) {
        for sa in other.subargs {
            self.push(sa);
        }
    }

    /// Whether some expansion is outside double quotes
    pub fn has_unquoted_expansion(&self) -> bool {
        self.subargs.iter().any(|sa| match sa {
            Subarg::Literal(_) => false,
            Subarg::Variable { quoted, .. }
            | Subarg::Subshell { quoted, .. }
            | Subarg::Arithmetic { quoted, .. } => !quoted,
            Subarg::Procsub { .. } => true,
        })
    }

    /// Whether the argument holds any expansion at all
    pub fn has_expansion(&self) -> bool {
        self.subargs.iter().any(|sa| !matches!(sa, Subarg::Literal(_)))
    }
}

impl Subarg {
    pub fn is_quoted(&self) -> bool {
        match self {
            Subarg::Literal(_) | Subarg::Procsub { .. } => false,
            Subarg::Variable { quoted, .. }
            | Subarg::Subshell { quoted, .. }
            | Subarg::Arithmetic { quoted, .. } => *quoted,
        }
    }
}

impl Variable {
    /// Plain `$name` reference
    pub fn new(name: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Assignment target
    pub fn definition(name: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            definition: true,
            ..Default::default()
        }
    }

    /// `${name}` without manipulation nor index
    pub fn is_plain_braced(&self) -> bool {
        self.is_manip && self.manip.is_none() && self.index.is_none() && !self.precedence
    }
}

impl Redirect {
    pub fn new(op: impl Into<String>, target: Arg) -> Self {
        Redirect {
            op: op.into(),
            target,
            here_document: None,
        }
    }

    pub fn is_heredoc(&self) -> bool {
        self.here_document.is_some()
    }

    /// Operator without its leading file descriptor digits
    pub fn bare_op(&self) -> &str {
        self.op.trim_start_matches(|c: char| c.is_ascii_digit())
    }
}

// =============================================================================
// AST FACTORY
// =============================================================================

/// Factory for synthesized nodes
pub struct AST;

impl AST {
    pub fn script(shebang: impl Into<String>, lst: List) -> Script {
        Script {
            shebang: shebang.into(),
            filename: String::new(),
            lst,
        }
    }

    /// Command from literal raw words
    pub fn command(words: &[&str]) -> Command {
        Command::new(words.iter().map(|w| Arg::literal(*w)).collect())
    }

    /// Statement running one plain command
    pub fn statement(cmd: Command) -> Condlist {
        Condlist::from_block(Block::Command(cmd))
    }

    /// `true`, the sentinel inserted into emptied bodies
    pub fn true_statement() -> Condlist {
        AST::statement(AST::command(&["true"]))
    }

    /// Brace group around a list
    pub fn brace(lst: List) -> Block {
        Block::Brace(Brace {
            lst,
            redirs: Vec::new(),
        })
    }

    /// `"$name"`
    pub fn quoted_var(name: &str) -> Arg {
        Arg::new(vec![
            Subarg::Literal("\"".to_string()),
            Subarg::Variable {
                var: Variable::new(name),
                quoted: true,
            },
            Subarg::Literal("\"".to_string()),
        ])
    }

    /// `$(cmd)` fragment
    pub fn cmd_substitution(cmd: Command, quoted: bool) -> Subarg {
        Subarg::Subshell {
            lst: List::new(vec![AST::statement(cmd)]),
            quoted,
            backtick: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condlist_negate() {
        let mut cl = Condlist::new(Pipeline::new(Block::default()));
        cl.add(Pipeline::new(Block::default()), false);
        cl.add(Pipeline::new(Block::default()), true);
        cl.negate();
        assert!(cl.pls.iter().all(|p| p.negated));
        assert_eq!(cl.or_ops, vec![true, false]);
    }

    #[test]
    fn test_arg_push_merges_literals() {
        let mut arg = Arg::literal("a");
        arg.push(Subarg::Literal("b".into()));
        arg.push(Subarg::Variable {
            var: Variable::new("x"),
            quoted: false,
        });
        arg.push_literal("c");
        assert_eq!(arg.subargs.len(), 3);
        assert_eq!(arg.subargs[0], Subarg::Literal("ab".into()));
        assert!(arg.has_unquoted_expansion());
    }

    #[test]
    fn test_command_name() {
        let cmd = AST::command(&["echo", "hi"]);
        assert_eq!(cmd.name(), Some("echo"));
        assert_eq!(cmd.arg_string(1), Some("hi"));
        assert!(!cmd.is_assignment_only());
    }

    #[test]
    fn test_redirect_bare_op() {
        let r = Redirect::new("2>&", Arg::literal("1"));
        assert_eq!(r.bare_op(), ">&");
        assert!(!r.is_heredoc());
    }
}
