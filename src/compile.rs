//! Compilation driver
//!
//! Ties together the parser, the passes and the code generator:
//!   parse → resolve directives → debashify → inject library → minify → generate

use crate::analysis::{Counts, Maps};
use crate::ast::types::Script;
use crate::codegen::{generate, GenOptions};
use crate::error::Result;
use crate::host::Host;
use crate::library;
use crate::parser::types::is_bash_shebang;
use crate::parser::{parse_script, ParseOptions};
use crate::passes::{debashify, minify, MinifyMap, MinifyOptions, Resolver};
use serde::Serialize;
use std::fmt::Write;
use tracing::info;

/// Options for one compilation
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Force bash or sh parsing; None reads it from the first shebang
    pub bash: Option<bool>,
    pub debashify: bool,
    pub minify: MinifyOptions,
    /// Minimal rendering without any minification pass
    pub minimal: bool,
    /// Replace the output shebang
    pub shebang: Option<String>,
}

/// One input unit
#[derive(Debug, Clone)]
pub struct Source {
    /// Name used in diagnostics and to resolve relative includes, `-` for stdin
    pub filename: String,
    pub text: String,
}

/// Result of a compilation
#[derive(Debug)]
pub struct Compiled {
    pub script: Script,
    pub text: String,
    /// Renames applied by the minifier
    pub map: MinifyMap,
}

/// Compile the sources, concatenated in order, into one script
pub fn compile(
    sources: &[Source],
    options: &CompileOptions,
    host: &mut dyn Host,
) -> Result<Compiled> {
    let first_shebang = sources
        .first()
        .and_then(|s| s.text.lines().next())
        .filter(|l| l.starts_with("#!"))
        .unwrap_or("");
    let bash = options.bash.unwrap_or_else(|| is_bash_shebang(first_shebang));

    let mut resolver = Resolver::new(host, bash);
    let mut script = Script::default();
    for (k, src) in sources.iter().enumerate() {
        let mut sc = parse_script(
            &src.text,
            &ParseOptions {
                filename: src.filename.clone(),
                bash: Some(bash),
            },
        )?;
        resolver.resolve(&mut sc)?;
        if k == 0 {
            script.shebang = sc.shebang;
            script.filename = sc.filename;
        }
        script.lst.extend(sc.lst);
    }

    if options.debashify {
        let required = debashify(&mut script)?;
        library::inject(&mut script, &required)?;
    }

    let mut maps = Maps::new();
    let map = minify(&mut script, &mut maps, &options.minify);

    if let Some(shebang) = &options.shebang {
        script.shebang = shebang.clone();
    }
    let minimal = options.minimal || options.minify.any();
    let text = generate(&script, &GenOptions { minimal });
    info!(bytes = text.len(), minimal, "compiled script");
    Ok(Compiled { script, text, map })
}

// =============================================================================
// LISTINGS
// =============================================================================

/// Which occurrence table to list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    /// Variables, definitions and uses together
    Var,
    VarDef,
    VarCall,
    Fct,
    Cmd,
}

#[derive(Debug, Serialize)]
struct Entry<'a> {
    name: &'a str,
    count: usize,
}

/// Occurrence counts of one kind of name
pub fn listing(sc: &Script, kind: Listing) -> Counts {
    let mut maps = Maps::new();
    match kind {
        Listing::Var => {
            let mut all = maps.vardefs(sc).clone();
            for (name, n) in maps.varcalls(sc) {
                *all.entry(name.clone()).or_default() += n;
            }
            all
        }
        Listing::VarDef => maps.vardefs(sc).clone(),
        Listing::VarCall => maps.varcalls(sc).clone(),
        Listing::Fct => maps.fcts(sc).clone(),
        Listing::Cmd => maps.cmds(sc).clone(),
    }
}

/// Render counts as `count name` lines, or as a JSON array
pub fn format_listing(counts: &Counts, json: bool) -> String {
    if json {
        let entries: Vec<Entry> = counts
            .iter()
            .map(|(name, count)| Entry { name, count: *count })
            .collect();
        // a list of plain structs always serializes
        return serde_json::to_string_pretty(&entries).unwrap_or_default() + "\n";
    }
    let width = counts.values().map(|n| n.to_string().len()).max().unwrap_or(1);
    let mut out = String::new();
    for (name, count) in counts {
        let _ = writeln!(out, "{:>width$} {}", count, name, width = width);
    }
    out
}

/// Library catalog as text or JSON
pub fn format_library(json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(library::CATALOG).unwrap_or_default() + "\n";
    }
    let mut out = String::new();
    for f in library::CATALOG {
        let _ = writeln!(out, "{} {}", f.name, f.args);
        let _ = writeln!(out, "\t{}", f.description);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use pretty_assertions::assert_eq;

    fn source(name: &str, text: &str) -> Source {
        Source {
            filename: name.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_plain_roundtrip() {
        let mut host = MemoryHost::new();
        let out = compile(
            &[source("-", "#!/bin/sh\nif true; then echo ok; fi\n")],
            &CompileOptions::default(),
            &mut host,
        )
        .unwrap();
        assert_eq!(out.text, "#!/bin/sh\nif true; then\n\techo ok\nfi\n");
        assert!(out.map.is_empty());
    }

    #[test]
    fn test_sources_are_concatenated() {
        let mut host = MemoryHost::new();
        let out = compile(
            &[source("a.sh", "#!/bin/sh\na=1\n"), source("b.sh", "echo $a\n")],
            &CompileOptions {
                minimal: true,
                shebang: Some("#!/usr/bin/env sh".to_string()),
                ..Default::default()
            },
            &mut host,
        )
        .unwrap();
        assert_eq!(out.text, "#!/usr/bin/env sh\na=1;echo $a\n");
    }

    #[test]
    fn test_debashify_injects_library() {
        let mut host = MemoryHost::new();
        let out = compile(
            &[source("-", "#!/bin/bash\necho $RANDOM\n")],
            &CompileOptions {
                debashify: true,
                ..Default::default()
            },
            &mut host,
        )
        .unwrap();
        assert!(out.text.starts_with("#!/bin/sh\n_lxsh_random() {\n"));
        assert!(out.text.ends_with("echo $(_lxsh_random)\n"));
    }

    #[test]
    fn test_full_pipeline() {
        let mut host = MemoryHost::new()
            .with_file("/w/main.sh", "#!/bin/bash\n%include lib.sh\nsay \"hello\"\n")
            .with_file("/w/lib.sh", "say() { local message=\"$1\"; echo \"$message\"; }\n");
        let out = compile(
            &[source("/w/main.sh", "#!/bin/bash\n%include lib.sh\nsay \"hello\"\n")],
            &CompileOptions {
                debashify: true,
                minify: MinifyOptions::all(),
                ..Default::default()
            },
            &mut host,
        )
        .unwrap();
        assert_eq!(out.text, "#!/bin/sh\na(){ local a=\"$1\";echo \"$a\";};a hello\n");
        assert_eq!(out.map.to_string(), "var a message\nfct a say\n");
    }

    #[test]
    fn test_library_survives_minification() {
        let mut host = MemoryHost::new();
        let out = compile(
            &[source(
                "-",
                "#!/bin/bash\ndeclare -a arr\narr=(a b c)\narr[1]=X\necho \"${arr[1]}\"\n",
            )],
            &CompileOptions {
                debashify: true,
                minify: MinifyOptions::all(),
                ..Default::default()
            },
            &mut host,
        )
        .unwrap();
        assert!(!out.text.contains("ENVIRON"));
        assert!(out.text.contains("v=ARGV[1]; delete ARGV[1]} {$(i+1)=v; print}' \"$3\""));
        // the library loop variable and the script array are renamed alike
        assert!(out.map.var.contains_key("arr"));
        assert!(out.map.var.contains_key("_lxsh_v"));
        assert!(!out.text.contains("_lxsh_v"));
    }

    #[test]
    fn test_parse_error_carries_filename() {
        let mut host = MemoryHost::new();
        let err = compile(
            &[source("bad.sh", "echo ok\nfi\n")],
            &CompileOptions::default(),
            &mut host,
        )
        .unwrap_err();
        let pe = err.parse_error().unwrap();
        assert_eq!(pe.line, 2);
        assert!(err.to_string().starts_with("bad.sh:2:1:"));
    }

    #[test]
    fn test_listing() {
        let sc = parse_script("a=1; f() { echo $a $a; }; f; ls", &ParseOptions::default()).unwrap();
        let vars = listing(&sc, Listing::Var);
        assert_eq!(vars.get("a"), Some(&3));
        let cmds = listing(&sc, Listing::Cmd);
        assert_eq!(format_listing(&cmds, false), "1 echo\n1 f\n1 ls\n");
        assert_eq!(
            format_listing(&listing(&sc, Listing::Fct), true),
            "[\n  {\n    \"name\": \"f\",\n    \"count\": 1\n  }\n]\n"
        );
    }

    #[test]
    fn test_library_listing() {
        let text = format_library(false);
        assert!(text.starts_with("_lxsh_random \n\tRandom integer"));
        assert!(format_library(true).contains("\"name\": \"_lxsh_map_set\""));
    }
}
