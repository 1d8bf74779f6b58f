//! Backends: turning IR into something callable.
//!
//! The `Backend` trait is the seam between IR production (lowering, hooks)
//! and execution. The world compiles every IR it runs through its backend;
//! [`Interpreter`] is the default.

mod interp;
pub use interp::{Interpreter, Program};

use crate::ir::Ir;
use crate::world::World;
use anyhow::Result;
use rewire_runtime::Value;
use std::rc::Rc;

/// A compiled, invocable unit.
pub trait Invoke {
    /// Run the unit. `args` exclude the implicit callee parameter.
    fn invoke(&self, world: &World, args: &[Value]) -> Result<Value>;

    /// Number of arguments `invoke` expects: the entry block's parameters
    /// minus the implicit callee parameter when the IR has metadata.
    fn arity(&self) -> usize;

    /// The IR the unit was compiled from, for backends that keep it.
    fn ir(&self) -> Option<&Ir> {
        None
    }
}

/// Compiles IR into invocable units.
pub trait Backend {
    fn compile(&self, ir: Ir) -> Result<Rc<dyn Invoke>>;
}
