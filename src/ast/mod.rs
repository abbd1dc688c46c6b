//! Abstract Syntax Tree (AST) for shell scripts
//!
//! Architecture:
//!   Input → Parser → AST → Passes → Code generator → Output

pub mod types;
pub mod walk;

pub use walk::{try_walk, try_walk_mut, walk, walk_mut, Node, NodeMut, Walk};
