//! Directive resolution: `%include` and `%resolve`
//!
//! A directive written as a whole statement is replaced by the statements it
//! produces. A directive that is the only statement of a command
//! substitution is replaced by its text inside the enclosing argument, which
//! is then parsed again.
//!
//! Flags:
//!   -C  do not enter the directory of the file being processed
//!   -e  escape the text for a double-quoted context
//!   -f  `%include`: include files already included; `%resolve`: ignore
//!       a failing exit code

use crate::ast::types::{Arg, Command, Condlist, List, Script, Subarg, AST};
use crate::ast::{try_walk_mut, NodeMut, Walk};
use crate::codegen::generate_arg;
use crate::error::{Error, Result};
use crate::host::{dirname, resolve_path, Host};
use crate::parser::{parse_arg_str, parse_list, parse_script, ParseOptions};
use std::collections::HashSet;
use std::mem::take;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Include,
    Resolve,
}

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    no_cd: bool,
    escape: bool,
    force: bool,
}

/// One parsed directive command
#[derive(Debug)]
struct Directive {
    kind: Kind,
    flags: Flags,
    args: Vec<Arg>,
    /// Source text, for error context
    text: String,
}

impl Directive {
    fn from_command(cmd: &Command) -> Result<Option<Directive>> {
        let kind = match cmd.name() {
            Some("%include") => Kind::Include,
            Some("%resolve") => Kind::Resolve,
            _ => return Ok(None),
        };
        let text = cmd
            .args
            .args
            .iter()
            .map(generate_arg)
            .collect::<Vec<_>>()
            .join(" ");
        let mut flags = Flags::default();
        let mut rest = cmd.args.args[1..].iter().peekable();
        while let Some(opt) = rest.peek().copied().and_then(Arg::string) {
            if opt == "--" {
                rest.next();
                break;
            }
            let Some(letters) = opt.strip_prefix('-').filter(|l| !l.is_empty()) else {
                break;
            };
            for c in letters.chars() {
                match c {
                    'C' => flags.no_cd = true,
                    'e' => flags.escape = true,
                    'f' => flags.force = true,
                    _ => {
                        let err = Error::Option(format!("unknown option -{}", c));
                        return Err(err.in_directive(text));
                    }
                }
            }
            rest.next();
        }
        Ok(Some(Directive {
            kind,
            flags,
            args: rest.cloned().collect(),
            text,
        }))
    }

    /// Directive making up a whole statement
    fn from_statement(cl: &Condlist) -> Result<Option<Directive>> {
        match cl.single_cmd() {
            Some(cmd) => Directive::from_command(cmd),
            None => Ok(None),
        }
    }

    /// Directive making up a whole command substitution
    fn from_subarg(sa: &Subarg) -> Result<Option<Directive>> {
        match sa {
            Subarg::Subshell { lst, .. } => match lst.cls.as_slice() {
                [cl] => Directive::from_statement(cl),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Command line run by `%resolve`
    fn command_line(&self) -> String {
        self.args
            .iter()
            .map(generate_arg)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Remove shell quoting from a literal word
fn dequote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    let mut double = false;
    while let Some(c) = chars.next() {
        match c {
            '\'' if !double => out.extend(chars.by_ref().take_while(|c| *c != '\'')),
            '"' => double = !double,
            '\\' => {
                if let Some(next) = chars.next() {
                    if double && !matches!(next, '"' | '\\' | '$' | '`') {
                        out.push('\\');
                    }
                    out.push(next);
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Escape text for use between double quotes
fn escape_double(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// State of one resolution run
pub struct Resolver<'a> {
    host: &'a mut dyn Host,
    /// Canonical paths of the files included so far
    included: HashSet<String>,
    /// Parse mode of included and produced code
    bash: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(host: &'a mut dyn Host, bash: bool) -> Self {
        Resolver {
            host,
            included: HashSet::new(),
            bash,
        }
    }

    /// Expand every directive of a script
    pub fn resolve(&mut self, sc: &mut Script) -> Result<()> {
        let file = if sc.filename.is_empty() || sc.filename == "-" {
            None
        } else {
            Some(
                self.host
                    .canonical_path(&sc.filename)
                    .unwrap_or_else(|_| resolve_path(&self.host.getcwd(), &sc.filename)),
            )
        };
        self.resolve_list(&mut sc.lst, file.as_deref())
    }

    fn resolve_list(&mut self, lst: &mut List, file: Option<&str>) -> Result<()> {
        let mut out = Vec::with_capacity(lst.cls.len());
        for mut cl in take(&mut lst.cls) {
            match Directive::from_statement(&cl)? {
                Some(d) => {
                    let spliced = self
                        .expand_statement(&d, file)
                        .map_err(|e| e.in_directive(d.text.clone()))?;
                    out.extend(spliced.cls);
                }
                None => {
                    self.resolve_nested(&mut cl, file)?;
                    out.push(cl);
                }
            }
        }
        lst.cls = out;
        Ok(())
    }

    /// Directives inside the blocks and arguments of a statement
    fn resolve_nested(&mut self, cl: &mut Condlist, file: Option<&str>) -> Result<()> {
        try_walk_mut(NodeMut::Condlist(cl), &mut |n: NodeMut<'_>| -> Result<Walk> {
            match n {
                NodeMut::List(l) => {
                    let had_statements = !l.is_empty();
                    self.resolve_list(l, file)?;
                    if had_statements && l.is_empty() {
                        l.cls.push(AST::true_statement());
                    }
                    Ok(Walk::Skip)
                }
                NodeMut::Arg(arg) => {
                    if let Some(new) = self.substitute(arg, file)? {
                        *arg = new;
                    }
                    Ok(Walk::Continue)
                }
                // here-document bodies are not words
                NodeMut::Redirect(r) if r.is_heredoc() => Ok(Walk::Skip),
                _ => Ok(Walk::Continue),
            }
        })
    }

    /// Argument with its directive substitutions replaced, None when it has none
    fn substitute(&mut self, arg: &Arg, file: Option<&str>) -> Result<Option<Arg>> {
        let mut found = false;
        let mut replaced = Arg::default();
        for sa in &arg.subargs {
            match Directive::from_subarg(sa)? {
                Some(d) => {
                    let text = self
                        .expand_text(&d, file)
                        .map_err(|e| e.in_directive(d.text.clone()))?;
                    replaced.push_literal(&text);
                    found = true;
                }
                None => replaced.subargs.push(sa.clone()),
            }
        }
        if !found {
            return Ok(None);
        }
        let text = generate_arg(&replaced);
        let arg = parse_arg_str(&text, self.bash)?;
        Ok(Some(arg))
    }

    // =========================================================================
    // EXPANSION
    // =========================================================================

    fn expand_statement(&mut self, d: &Directive, file: Option<&str>) -> Result<List> {
        match d.kind {
            Kind::Include => self.in_file_dir(file, d.flags.no_cd, |r| r.include(d)),
            Kind::Resolve => {
                let output = self.in_file_dir(file, d.flags.no_cd, |r| r.run(d))?;
                let lst = parse_list(&output, self.bash)
                    .map_err(|e| e.within(format!("output of '{}'", d.command_line())))?;
                Ok(lst)
            }
        }
    }

    fn expand_text(&mut self, d: &Directive, file: Option<&str>) -> Result<String> {
        let text = match d.kind {
            Kind::Include => self.in_file_dir(file, d.flags.no_cd, |r| r.include_text(d))?,
            Kind::Resolve => self.in_file_dir(file, d.flags.no_cd, |r| r.run(d))?,
        };
        Ok(if d.flags.escape {
            escape_double(&text)
        } else {
            text
        })
    }

    /// Run `f` from the directory of `file`, then return to the current one
    fn in_file_dir<T, F>(&mut self, file: Option<&str>, no_cd: bool, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let Some(file) = file.filter(|_| !no_cd) else {
            return f(self);
        };
        let saved = self.host.getcwd();
        self.host.chdir(&dirname(file))?;
        let result = f(self);
        self.host.chdir(&saved)?;
        result
    }

    /// Files named by the patterns of an include, in order
    fn include_paths(&mut self, d: &Directive) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for arg in &d.args {
            let Some(raw) = arg.string() else {
                return Err(Error::Option(format!(
                    "cannot expand '{}' at compile time",
                    generate_arg(arg)
                )));
            };
            let pattern = dequote(raw);
            let matches = self.host.glob(&pattern)?;
            if matches.is_empty() {
                paths.push(pattern);
            } else {
                paths.extend(matches);
            }
        }
        Ok(paths)
    }

    /// Canonical path and content of each file to include
    fn include_files(&mut self, d: &Directive) -> Result<Vec<(String, String)>> {
        let mut files = Vec::new();
        for path in self.include_paths(d)? {
            let canonical = self.host.canonical_path(&path)?;
            if !self.included.insert(canonical.clone()) && !d.flags.force {
                debug!(path = %canonical, "already included, skipping");
                continue;
            }
            let content = self.host.read_file(&canonical)?;
            files.push((canonical, content));
        }
        Ok(files)
    }

    fn include(&mut self, d: &Directive) -> Result<List> {
        let mut lst = List::default();
        for (path, content) in self.include_files(d)? {
            info!(path = %path, "including file");
            let mut sc = parse_script(
                &content,
                &ParseOptions {
                    filename: path.clone(),
                    bash: Some(self.bash),
                },
            )?;
            self.resolve_list(&mut sc.lst, Some(&path))?;
            lst.extend(sc.lst);
        }
        Ok(lst)
    }

    fn include_text(&mut self, d: &Directive) -> Result<String> {
        let mut text = String::new();
        for (_, content) in self.include_files(d)? {
            text.push_str(&content);
        }
        Ok(text.trim_end_matches('\n').to_string())
    }

    /// Output of a `%resolve` command, without trailing newlines
    fn run(&mut self, d: &Directive) -> Result<String> {
        let command = d.command_line();
        info!(command = %command, "resolving command");
        let (output, code) = self.host.run(&command)?;
        if code != 0 && !d.flags.force {
            return Err(Error::CommandFailed { command, code });
        }
        Ok(output.trim_end_matches('\n').to_string())
    }
}

/// Expand the directives of `sc` using `host`
pub fn resolve(sc: &mut Script, host: &mut dyn Host, bash: bool) -> Result<()> {
    Resolver::new(host, bash).resolve(sc)
}
