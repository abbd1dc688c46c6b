//! Code generation: AST back to shell text

pub mod generator;

pub use generator::{generate, generate_arg, generate_list, GenOptions, Generator};
