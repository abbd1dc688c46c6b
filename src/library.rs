//! POSIX support library
//!
//! Shell functions the debashify pass calls in place of bash-only features.
//! Arrays are stored as tab-separated strings; maps as newline-separated
//! `[key]=value` lines.

use crate::ast::types::{Block, List, Script};
use crate::error::Result;
use crate::parser::parse_list;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// One catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LibFunction {
    pub name: &'static str,
    /// Argument signature, for listings
    pub args: &'static str,
    pub description: &'static str,
    /// Function definition in POSIX sh
    pub code: &'static str,
    /// Other catalog functions called by `code`
    pub deps: &'static [&'static str],
}

pub const CATALOG: &[LibFunction] = &[
    LibFunction {
        name: "_lxsh_random",
        args: "",
        description: "Random integer in [0, 32767], replaces $RANDOM",
        code: r#"_lxsh_random() {
	echo $(( $(od -An -N2 -tu2 /dev/urandom) % 32768 ))
}
"#,
        deps: &[],
    },
    LibFunction {
        name: "_lxsh_random_string",
        args: "[N]",
        description: "Random alphanumeric string of N characters, 20 by default",
        code: r#"_lxsh_random_string() {
	env LC_ALL=C tr -dc 'a-zA-Z0-9' </dev/urandom | dd bs=1 count="${1-20}" 2>/dev/null
}
"#,
        deps: &[],
    },
    LibFunction {
        name: "_lxsh_random_tmpfile",
        args: "PREFIX",
        description: "Random path in the temporary directory",
        code: r#"_lxsh_random_tmpfile() {
	echo "${TMPDIR-/tmp}/$1-$(_lxsh_random_string 20)"
}
"#,
        deps: &["_lxsh_random_string"],
    },
    LibFunction {
        name: "_lxsh_array_create",
        args: "VALUES...",
        description: "Create an array out of the given values",
        code: r#"_lxsh_array_create() {
	printf "%s" "$1"
	shift 1 2>/dev/null || return 0
	for _lxsh_v
	do
		printf "\t%s" "$_lxsh_v"
	done
}
"#,
        deps: &[],
    },
    LibFunction {
        name: "_lxsh_array_get",
        args: "ARRAY INDEX",
        description: "Element INDEX of ARRAY, every element for * or @",
        code: r#"_lxsh_array_get() {
	if [ "$2" = "*" ] || [ "$2" = "@" ]
	then
		printf "%s" "$1" | tr '\t' ' '
	else
		printf "%s\n" "$1" | cut -f "$(($2 + 1))"
	fi
}
"#,
        deps: &[],
    },
    LibFunction {
        name: "_lxsh_array_set",
        args: "ARRAY INDEX VALUE",
        description: "ARRAY with element INDEX set to VALUE",
        code: r#"_lxsh_array_set() {
	printf "%s\n" "$1" | awk -F '\t' -v i="$2" 'BEGIN{OFS="\t"; v=ARGV[1]; delete ARGV[1]} {$(i+1)=v; print}' "$3"
}
"#,
        deps: &[],
    },
    LibFunction {
        name: "_lxsh_map_create",
        args: "[KEY]=VALUE...",
        description: "Create a map out of the given key/value pairs",
        code: r#"_lxsh_map_create() {
	for _lxsh_v
	do
		printf "%s\n" "$_lxsh_v"
	done
}
"#,
        deps: &[],
    },
    LibFunction {
        name: "_lxsh_map_get",
        args: "MAP KEY",
        description: "Value of KEY in MAP",
        code: r#"_lxsh_map_get() {
	printf "%s\n" "$1" | while IFS= read -r _lxsh_l
	do
		case "$_lxsh_l" in
			"[$2]="*) printf "%s" "${_lxsh_l#*]=}" ; break ;;
		esac
	done
}
"#,
        deps: &[],
    },
    LibFunction {
        name: "_lxsh_map_set",
        args: "MAP KEY VALUE",
        description: "MAP with KEY set to VALUE",
        code: r#"_lxsh_map_set() {
	printf "%s\n" "$1" | grep -v -e "^\[$2\]=" -e '^$'
	printf "[%s]=%s" "$2" "$3"
}
"#,
        deps: &[],
    },
];

/// Catalog entry by name
pub fn lookup(name: &str) -> Option<&'static LibFunction> {
    CATALOG.iter().find(|f| f.name == name)
}

/// Transitive closure of `names` over dependencies, in catalog order
pub fn with_dependencies<'a, I>(names: I) -> Vec<&'static LibFunction>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut needed: HashSet<&'static str> = HashSet::new();
    let mut stack: Vec<&'static LibFunction> = names.into_iter().filter_map(lookup).collect();
    while let Some(f) = stack.pop() {
        if needed.insert(f.name) {
            stack.extend(f.deps.iter().filter_map(|d| lookup(d)));
        }
    }
    CATALOG.iter().filter(|f| needed.contains(f.name)).collect()
}

/// Parsed definitions of the given functions and their dependencies
pub fn definitions(names: &BTreeSet<String>) -> Result<List> {
    let mut lst = List::default();
    for f in with_dependencies(names.iter().map(String::as_str)) {
        lst.extend(parse_list(f.code, false)?);
    }
    Ok(lst)
}

/// Prepend the required functions to a script, skipping those it already defines
pub fn inject(sc: &mut Script, names: &BTreeSet<String>) -> Result<()> {
    if names.is_empty() {
        return Ok(());
    }
    let defined: HashSet<String> = sc
        .lst
        .cls
        .iter()
        .flat_map(|cl| cl.pls.iter())
        .flat_map(|pl| pl.cmds.iter())
        .filter_map(|b| match b {
            Block::Function(f) => Some(f.name.clone()),
            _ => None,
        })
        .collect();
    let mut lst = definitions(names)?;
    lst.cls.retain(|cl| match cl.pls.first().and_then(|pl| pl.cmds.first()) {
        Some(Block::Function(f)) => !defined.contains(&f.name),
        _ => true,
    });
    debug!(count = lst.cls.len(), "injecting library functions");
    lst.cls.append(&mut sc.lst.cls);
    sc.lst = lst;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_script, ParseOptions};

    #[test]
    fn test_catalog_parses_as_sh() {
        for f in CATALOG {
            let lst = parse_list(f.code, false).unwrap();
            assert_eq!(lst.cls.len(), 1, "{}", f.name);
            assert!(matches!(
                lst.cls[0].pls[0].cmds[0],
                Block::Function(ref fct) if fct.name == f.name
            ));
        }
    }

    #[test]
    fn test_values_not_passed_by_environment() {
        // renaming a prefix assignment cannot reach names read by another program
        for f in CATALOG {
            assert!(!f.code.contains("ENVIRON"), "{}", f.name);
        }
    }

    #[test]
    fn test_dependencies_are_in_catalog() {
        for f in CATALOG {
            for d in f.deps {
                assert!(lookup(d).is_some(), "{} -> {}", f.name, d);
            }
        }
    }

    #[test]
    fn test_with_dependencies() {
        let names: Vec<_> = with_dependencies(["_lxsh_random_tmpfile"])
            .iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["_lxsh_random_string", "_lxsh_random_tmpfile"]);
    }

    #[test]
    fn test_inject_prepends_once() {
        let mut sc = parse_script("echo hi", &ParseOptions::default()).unwrap();
        let names: BTreeSet<String> = ["_lxsh_array_get".to_string()].into_iter().collect();
        inject(&mut sc, &names).unwrap();
        assert_eq!(sc.lst.cls.len(), 2);
        inject(&mut sc, &names).unwrap();
        assert_eq!(sc.lst.cls.len(), 2);
    }
}
