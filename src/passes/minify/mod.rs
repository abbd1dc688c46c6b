//! Minifier
//!
//! Passes shrinking a script without changing its behavior: dead code
//! elimination, variable and function renaming, quote stripping and
//! structural simplifications.

pub mod map_file;
pub mod quotes;
pub mod rename;
pub mod simplify;
pub mod unused;

pub use map_file::MinifyMap;
pub use rename::{minify_fct, minify_var};
pub use simplify::minify_quotes;
pub use unused::delete_unused;

use crate::analysis::Maps;
use crate::ast::types::Script;
use regex_lite::Regex;
use tracing::info;

/// Which minification passes run, and with what exclusions
#[derive(Debug, Clone)]
pub struct MinifyOptions {
    pub quotes: bool,
    pub var: bool,
    pub fct: bool,
    pub remove_unused: bool,
    /// Variables matching are neither renamed nor deleted
    pub exclude_var: Option<Regex>,
    /// Functions matching are neither renamed nor deleted
    pub exclude_fct: Option<Regex>,
    /// Leave reserved variable names (PATH, IFS, ...) alone
    pub exclude_reserved: bool,
    /// Renames to apply instead of computing them
    pub map: Option<MinifyMap>,
}

impl Default for MinifyOptions {
    fn default() -> Self {
        MinifyOptions {
            quotes: false,
            var: false,
            fct: false,
            remove_unused: false,
            exclude_var: None,
            exclude_fct: None,
            exclude_reserved: true,
            map: None,
        }
    }
}

impl MinifyOptions {
    /// Every pass enabled
    pub fn all() -> Self {
        MinifyOptions {
            quotes: true,
            var: true,
            fct: true,
            remove_unused: true,
            ..Default::default()
        }
    }

    pub fn any(&self) -> bool {
        self.quotes || self.var || self.fct || self.remove_unused
    }
}

/// Run the enabled passes, returns the renames applied
pub fn minify(sc: &mut Script, maps: &mut Maps, opts: &MinifyOptions) -> MinifyMap {
    let mut applied = MinifyMap::default();
    if opts.remove_unused {
        let n = delete_unused(sc, maps, opts);
        info!(deleted = n, "removed unused code");
    }
    if opts.var {
        applied.var = minify_var(sc, maps, opts);
    }
    if opts.fct {
        applied.fct = minify_fct(sc, maps, opts);
    }
    if opts.quotes {
        minify_quotes(sc, maps);
        maps.invalidate();
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{generate, GenOptions};
    use crate::parser::{parse_script, ParseOptions};
    use pretty_assertions::assert_eq;

    fn run(input: &str, opts: &MinifyOptions) -> (String, MinifyMap) {
        let mut sc = parse_script(input, &ParseOptions::default()).unwrap();
        let mut maps = Maps::new();
        let map = minify(&mut sc, &mut maps, opts);
        (generate(&sc, &GenOptions { minimal: true }), map)
    }

    #[test]
    fn test_nothing_enabled() {
        let (out, map) = run("x=\"1\"; echo \"$x\"", &MinifyOptions::default());
        assert_eq!(out, "x=\"1\";echo \"$x\"\n");
        assert!(map.is_empty());
    }

    #[test]
    fn test_all_passes() {
        let input = "unused_fn() { echo no; }\n\
            my_fn() { echo \"${greeting}\"; }\n\
            greeting='hello'\n\
            my_fn\n";
        let (out, map) = run(input, &MinifyOptions::all());
        assert_eq!(out, "a(){ echo \"$a\";};a=hello;a\n");
        assert_eq!(map.to_string(), "var a greeting\nfct a my_fn\n");
    }

    #[test]
    fn test_minify_is_stable() {
        let input = "long_name=1; f() { echo $long_name; }; f";
        let mut sc = parse_script(input, &ParseOptions::default()).unwrap();
        let mut maps = Maps::new();
        minify(&mut sc, &mut maps, &MinifyOptions::all());
        let once = generate(&sc, &GenOptions { minimal: true });
        let mut again = parse_script(&once, &ParseOptions::default()).unwrap();
        let map = minify(&mut again, &mut maps, &MinifyOptions::all());
        assert_eq!(generate(&again, &GenOptions { minimal: true }), once);
        assert!(map.is_empty());
    }

    #[test]
    fn test_function_subshell_survives_renaming() {
        let input = "f() { x=2; }; x=1; (f); echo \"$x\"";
        let (out, _) = run(input, &MinifyOptions::all());
        assert_eq!(out, "a(){ a=2;};a=1;(a);echo \"$a\"\n");
    }
}
