//! Name tables and name-argument helpers
//!
//! Reserved names the minifier must never produce or rename, and the
//! positions of variable-name operands of `read`, `getopts` and `unset`.

use crate::ast::types::Command;
use crate::parser::types::{is_valid_name, RESERVED_WORDS};
use std::collections::HashSet;

lazy_static::lazy_static! {
    /// Variables with a meaning to the shell or the environment
    pub static ref RESERVED_VARIABLES: HashSet<&'static str> = [
        "HOME", "PATH", "SHELL", "PWD", "OLDPWD", "IFS", "PS1", "PS2", "PS3", "PS4",
        "LANG", "LANGUAGE", "LC_ALL", "LC_CTYPE", "LC_COLLATE", "LC_MESSAGES", "LC_NUMERIC",
        "TERM", "USER", "LOGNAME", "UID", "EUID", "PPID", "RANDOM", "LINENO", "SECONDS",
        "OPTARG", "OPTIND", "OPTERR", "REPLY", "HOSTNAME", "TMPDIR", "MAIL", "MAILPATH",
        "ENV", "CDPATH", "HISTFILE", "HISTSIZE", "COLUMNS", "LINES", "EDITOR", "PAGER",
        "BASH", "BASH_VERSION", "BASH_SOURCE", "BASH_LINENO", "BASH_REMATCH", "BASHPID",
        "FUNCNAME", "PIPESTATUS", "GROUPS", "HOSTTYPE", "OSTYPE", "MACHTYPE", "SHLVL",
        "SHELLOPTS", "DISPLAY", "TZ", "_",
    ]
    .into_iter()
    .collect();
}

/// Reserved shell word
pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(name)
}

/// Reserved variable name
pub fn is_reserved_variable(name: &str) -> bool {
    RESERVED_VARIABLES.contains(name)
}

/// `read` options taking an operand
const READ_OPTS_WITH_ARG: &[char] = &['d', 'n', 'N', 'p', 't', 'u', 'i'];

/// Kind of a name operand of a builtin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameArg {
    /// Assigned by the builtin: read, getopts
    Definition,
    /// Variable read or removed: unset
    Use,
    /// Function removed: unset -f
    Function,
}

/// Indices of arguments of `cmd` that are bare variable or function names
pub fn name_args(cmd: &Command) -> Vec<(usize, NameArg)> {
    let args = &cmd.args.args;
    let literal = |k: usize| args.get(k).and_then(|a| a.string());
    let mut res = Vec::new();
    match cmd.name() {
        Some("read") => {
            let mut k = 1;
            while let Some(s) = literal(k) {
                if s == "--" {
                    k += 1;
                    break;
                }
                if !s.starts_with('-') || s.len() < 2 {
                    break;
                }
                let flags = &s[1..];
                // -a NAME stores into an array
                if flags.ends_with('a') {
                    if literal(k + 1).map(is_valid_name).unwrap_or(false) {
                        res.push((k + 1, NameArg::Definition));
                    }
                    k += 2;
                    continue;
                }
                let takes_arg = flags
                    .chars()
                    .last()
                    .map(|c| READ_OPTS_WITH_ARG.contains(&c))
                    .unwrap_or(false);
                k += if takes_arg { 2 } else { 1 };
            }
            for (i, a) in args.iter().enumerate().skip(k) {
                if a.string().map(is_valid_name).unwrap_or(false) {
                    res.push((i, NameArg::Definition));
                }
            }
        }
        Some("getopts") => {
            if literal(2).map(is_valid_name).unwrap_or(false) {
                res.push((2, NameArg::Definition));
            }
        }
        Some("unset") => {
            let mut kind = NameArg::Use;
            for (i, a) in args.iter().enumerate().skip(1) {
                match a.string() {
                    Some("-f") => kind = NameArg::Function,
                    Some("-v") => kind = NameArg::Use,
                    Some(n) if is_valid_name(n) => res.push((i, kind)),
                    _ => {}
                }
            }
        }
        _ => {}
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::AST;

    #[test]
    fn test_read_names() {
        let cmd = AST::command(&["read", "-r", "-p", "prompt", "a", "b"]);
        assert_eq!(
            name_args(&cmd),
            vec![(4, NameArg::Definition), (5, NameArg::Definition)]
        );
    }

    #[test]
    fn test_read_array_name() {
        let cmd = AST::command(&["read", "-ra", "arr"]);
        assert_eq!(name_args(&cmd), vec![(2, NameArg::Definition)]);
    }

    #[test]
    fn test_getopts_name() {
        let cmd = AST::command(&["getopts", "ab:", "opt"]);
        assert_eq!(name_args(&cmd), vec![(2, NameArg::Definition)]);
    }

    #[test]
    fn test_unset_names() {
        let cmd = AST::command(&["unset", "a", "-f", "fn"]);
        assert_eq!(
            name_args(&cmd),
            vec![(1, NameArg::Use), (3, NameArg::Function)]
        );
    }

    #[test]
    fn test_reserved() {
        assert!(is_reserved_word("done"));
        assert!(is_reserved_variable("IFS"));
        assert!(!is_reserved_variable("foo"));
    }
}
