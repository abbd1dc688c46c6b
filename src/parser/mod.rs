//! Parser module for shell scripts
//!
//! Turns POSIX sh or bash source into the AST of [`crate::ast::types`].

pub mod types;
pub mod parser;
pub mod arithmetic_parser;
pub mod word_parser;
pub mod compound_parser;
pub mod command_parser;

// Re-exports
pub use types::{ParseError, ParseOptions};
pub use parser::{parse_list, parse_script, ParseResult, Parser};
pub use word_parser::parse_arg_str;
