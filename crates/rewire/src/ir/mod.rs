//! Intermediate representation: an SSA-form control-flow graph.
//!
//! An [`Ir`] is a list of basic blocks (the first is the entry), a variable
//! counter shared by all blocks, a line table and optional provenance
//! metadata. Blocks take parameters instead of phi nodes; every branch passes
//! exactly one argument per target parameter.

mod types;
pub use types::*;

mod block;
pub use block::Block;

mod fragment;
pub(crate) use fragment::Def;
pub use fragment::Ir;

mod display;
mod verify;
