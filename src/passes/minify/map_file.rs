//! Minify map files
//!
//! One rename per line: `<kind> <to> <from>`, kind being `var` or `fct`.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Renames applied by the minifier, original name -> new name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinifyMap {
    pub var: BTreeMap<String, String>,
    pub fct: BTreeMap<String, String>,
}

impl MinifyMap {
    pub fn is_empty(&self) -> bool {
        self.var.is_empty() && self.fct.is_empty()
    }

    /// Read a map file; blank lines are ignored
    pub fn parse(text: &str) -> Result<Self> {
        let mut map = MinifyMap::default();
        for (n, line) in text.lines().enumerate() {
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.as_slice() {
                [] => {}
                ["var", to, from] => {
                    map.var.insert(from.to_string(), to.to_string());
                }
                ["fct", to, from] => {
                    map.fct.insert(from.to_string(), to.to_string());
                }
                _ => {
                    return Err(Error::Option(format!(
                        "map file line {}: expecting '<var|fct> <to> <from>', found '{}'",
                        n + 1,
                        line
                    )))
                }
            }
        }
        Ok(map)
    }
}

impl fmt::Display for MinifyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (from, to) in &self.var {
            writeln!(f, "var {} {}", to, from)?;
        }
        for (from, to) in &self.fct {
            writeln!(f, "fct {} {}", to, from)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let text = "var a LONG_NAME\n\nfct b my_function\n";
        let map = MinifyMap::parse(text).unwrap();
        assert_eq!(map.var.get("LONG_NAME").map(String::as_str), Some("a"));
        assert_eq!(map.fct.get("my_function").map(String::as_str), Some("b"));
        assert_eq!(map.to_string(), "var a LONG_NAME\nfct b my_function\n");
    }

    #[test]
    fn test_parse_rejects_bad_line() {
        let err = MinifyMap::parse("var a\n").unwrap_err();
        assert!(err.to_string().starts_with("map file line 1:"));
        assert!(MinifyMap::parse("cmd a b\n").is_err());
    }
}
