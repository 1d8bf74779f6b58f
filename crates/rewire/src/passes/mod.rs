//! Whole-IR passes and control-flow utilities.

pub mod canonical;
pub mod dead_blocks;
pub mod utils;

pub use canonical::canonicalize;
