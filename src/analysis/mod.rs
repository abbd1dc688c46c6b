//! Analysis over the AST: occurrence maps and name tables

pub mod maps;
pub mod names;

pub use maps::{count_cmds, count_fcts, count_vars, Counts, Maps};
