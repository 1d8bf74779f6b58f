//! Basic blocks.

use super::types::*;
use rewire_runtime::Type;

/// A basic block: parameters, straight-line statements, and a terminator.
///
/// Fields are crate-private: every mutation goes through [`super::Ir`] so the
/// variable definition table stays consistent with block contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    /// Block parameters (phi equivalents), with their type annotations.
    pub(crate) params: Vec<(Variable, Type)>,

    /// Statements in execution order (no control flow within).
    pub(crate) body: Vec<(Variable, Statement)>,

    /// The terminator. Empty until the block is closed.
    pub(crate) branches: Vec<Branch>,
}

impl Block {
    /// Parameter variables in order.
    pub fn params(&self) -> impl Iterator<Item = Variable> + '_ {
        self.params.iter().map(|(v, _)| *v)
    }

    pub fn param_types(&self) -> impl Iterator<Item = Type> + '_ {
        self.params.iter().map(|(_, t)| *t)
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    /// `(Variable, Statement)` bindings in body order.
    pub fn body(&self) -> &[(Variable, Statement)] {
        &self.body
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// A block is terminated once its last branch is unconditional.
    pub fn is_terminated(&self) -> bool {
        self.branches.last().is_some_and(|b| !b.is_conditional())
    }

    /// The value this block returns, if its terminator ends in a return.
    pub fn return_value(&self) -> Option<&Operand> {
        self.branches
            .last()
            .filter(|b| b.is_return() && !b.is_conditional())
            .and_then(|b| b.args.first())
    }

    /// Successor blocks in branch order (duplicates preserved).
    pub fn successors(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.branches.iter().filter_map(|b| b.target_block())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewire_runtime::Value;

    #[test]
    fn empty_block_is_not_terminated() {
        let b = Block::default();
        assert!(!b.is_terminated());
        assert!(b.return_value().is_none());
        assert!(b.is_empty());
    }

    #[test]
    fn conditional_branch_does_not_terminate() {
        let b = Block {
            branches: vec![Branch::to(BlockId(1), vec![]).unless(Variable(0))],
            ..Default::default()
        };
        assert!(!b.is_terminated());
    }

    #[test]
    fn return_value_of_returning_block() {
        let b = Block {
            branches: vec![
                Branch::to(BlockId(2), vec![]).unless(Variable(1)),
                Branch::ret(Value::Int(0)),
            ],
            ..Default::default()
        };
        assert!(b.is_terminated());
        assert_eq!(b.return_value(), Some(&Operand::Const(Value::Int(0))));
        assert_eq!(b.successors().collect::<Vec<_>>(), vec![BlockId(2)]);
    }
}
