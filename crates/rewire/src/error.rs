//! Error taxonomy for IR construction, mutation and dispatch.

use crate::ir::{BlockId, Variable};
use crate::world::Signature;

/// Errors raised by IR operations.
///
/// Only [`IrError::Unsupported`] is recovered locally (by hook dispatch,
/// which falls back to calling the callee directly). Every other variant
/// means an attempted mutation would have broken an invariant; the IR is left
/// unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IrError {
    /// An invariant violation: dangling reference, unbalanced branch arity,
    /// misplaced terminator, use before definition, deleting a variable that
    /// is still referenced.
    #[error("structural error: {0}")]
    Structural(String),

    /// Reference to a variable that was never allocated in this IR.
    #[error("variable {0} is not defined")]
    UnknownVariable(Variable),

    /// Reference to a block that does not exist.
    #[error("block {0} does not exist")]
    UnknownBlock(BlockId),

    /// The metadata provider has no source-level body for this signature.
    #[error("no IR available for {0}")]
    Unsupported(Signature),

    /// No rule of the hook accepts the call signature.
    #[error("hook `{hook}` has no rule matching {signature}")]
    NoMatchingRule { hook: String, signature: Signature },

    /// A Pipe edit named a variable other than the statement being visited.
    #[error("edit relative to {got} while visiting {current}")]
    Cursor { current: String, got: Variable },
}

impl IrError {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        IrError::Structural(msg.into())
    }

    /// True for the "no IR" sentinel.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, IrError::Unsupported(_))
    }

    /// True for the lookup class (unknown variable or block, no matching rule).
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            IrError::UnknownVariable(_) | IrError::UnknownBlock(_) | IrError::NoMatchingRule { .. }
        )
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, IrError::Structural(_))
    }
}
