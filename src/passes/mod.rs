//! Tree transformations
//!
//! Each pass mutates a [`Script`](crate::ast::types::Script) in place and
//! leaves the analysis maps stale: callers invalidate them afterwards.

pub mod debashify;
pub mod minify;
pub mod resolve;

pub use debashify::debashify;
pub use minify::{minify, MinifyMap, MinifyOptions};
pub use resolve::{resolve, Resolver};
