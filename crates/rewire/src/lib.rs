//! rewire: an SSA control-flow-graph IR with recursive call interception.
//!
//! The crate provides:
//! - [`ir`]: blocks, variables, statements and branches, with mutation
//!   primitives that reject invalid edits
//! - [`pipe`]: an edit buffer for O(1) edits during a forward pass
//! - [`lower`]: structural lowering of source functions into IR
//! - [`dynamo`]: hooks that fetch, transform, memoize and re-enter IR
//!   across a call graph
//! - [`world`] / [`backend`]: the function registry, metadata provider and
//!   the interpreter that runs compiled IR
//!
//! ```no_run
//! use rewire::dynamo::{Dynamo, TransformCx};
//! use rewire::{Ir, Value, World};
//!
//! let world = World::new();
//! world.define("fn prod(a, b) { a * b }\nfn wrapped(a, b) { prod(a, b) }")?;
//!
//! // Route every call inside `wrapped` back through the hook.
//! let hook = world.register_hook(Dynamo::new("trace", |cx: &mut TransformCx<'_>, mut ir: Ir| {
//!     cx.recurse(&mut ir);
//!     Ok(Some(ir))
//! }));
//! let wrapped = world.resolve("wrapped")?;
//! let out = world.call(&Value::Hook(hook), &[wrapped, Value::Int(5), Value::Int(10)])?;
//! assert_eq!(out, Value::Int(50));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod backend;
pub mod dynamo;
pub mod error;
pub mod ir;
pub mod lower;
pub mod passes;
pub mod pipe;
pub mod source;
pub mod world;

// Re-export key types for convenience
pub use anyhow::{Context, Result};
pub use error::IrError;
pub use ir::{BlockId, Branch, Expr, Ir, LineInfo, Operand, Statement, Target, Variable};
pub use pipe::Pipe;
pub use rewire_runtime::{FuncId, HookId, Trap, Type, Value};
pub use world::{Meta, MetadataProvider, Signature, World};

/// Configuration options for compiling and running IR.
#[derive(Debug, Clone)]
pub struct Options {
    /// Run `Ir::verify` on every IR before compiling it.
    pub verify: bool,
    /// Remove unreachable blocks before compiling.
    pub prune_dead_blocks: bool,
    /// Maximum nesting of calls through a world before trapping. A call
    /// through a hook counts twice: once for the hook, once for the unit
    /// it runs.
    pub max_call_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            verify: true,
            prune_dead_blocks: true,
            max_call_depth: 256,
        }
    }
}
