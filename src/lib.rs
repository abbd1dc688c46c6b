//! lxsh - a shell script compiler
//!
//! This library parses POSIX sh and bash scripts into an AST, rewrites it
//! (directive resolution, bash to POSIX translation, minification) and
//! generates shell code back.

pub mod analysis;
pub mod ast;
pub mod codegen;
pub mod compile;
pub mod error;
pub mod host;
pub mod library;
pub mod parser;
pub mod passes;

pub use ast::types::*;
pub use codegen::{generate, GenOptions};
pub use compile::{compile, CompileOptions, Compiled, Listing, Source};
pub use error::{Error, Result};
pub use host::{Host, MemoryHost, SystemHost};
pub use parser::{parse_script, ParseError, ParseOptions};
