//! Whole-IR invariant checking.

use super::fragment::{Def, Ir};
use super::types::*;
use crate::error::IrError;
use crate::passes::utils::dominators;
use std::collections::BTreeSet;

impl Ir {
    /// Check every structural invariant of the IR.
    ///
    /// - every block ends in exactly one unconditional branch, placed last
    /// - branch targets exist, argument counts match target parameters
    ///   (exactly one for a return)
    /// - every use is defined and, in reachable blocks, dominated by its
    ///   definition
    ///
    /// Unreachable blocks only get the existence check: they have no
    /// dominators.
    pub fn verify(&self) -> Result<(), IrError> {
        for (i, block) in self.blocks.iter().enumerate() {
            let id = BlockId(i as u32);
            let Some((last, init)) = block.branches.split_last() else {
                return Err(IrError::structural(format!(
                    "block {} has no terminator",
                    id
                )));
            };
            if last.is_conditional() {
                return Err(IrError::structural(format!(
                    "block {} ends in a conditional branch",
                    id
                )));
            }
            if init.iter().any(|b| !b.is_conditional()) {
                return Err(IrError::structural(format!(
                    "block {} has an unconditional branch before its last branch",
                    id
                )));
            }
            for br in &block.branches {
                let expected = match br.target {
                    Target::Block(t) => self.block(t)?.num_params(),
                    Target::Return => 1,
                };
                if br.args.len() != expected {
                    return Err(IrError::structural(format!(
                        "`{}` in block {} passes {} argument(s), expected {}",
                        br,
                        id,
                        br.args.len(),
                        expected
                    )));
                }
            }
        }

        self.verify_uses()
    }

    /// The use-before-definition half of [`Ir::verify`]: every use is
    /// defined and, in reachable blocks, dominated by its definition.
    /// Terminators are not required.
    pub(crate) fn verify_uses(&self) -> Result<(), IrError> {
        let dom = dominators(self);
        for (i, block) in self.blocks.iter().enumerate() {
            let id = BlockId(i as u32);
            let doms = dom.get(&id);
            for (pos, (_, st)) in block.body.iter().enumerate() {
                let mut result = Ok(());
                st.expr.for_each_use(|u| {
                    if result.is_ok() {
                        result = self.check_use(u, id, Some(pos), doms);
                    }
                });
                result?;
            }
            for br in &block.branches {
                let mut result = Ok(());
                br.for_each_use(|u| {
                    if result.is_ok() {
                        result = self.check_use(u, id, None, doms);
                    }
                });
                result?;
            }
        }
        Ok(())
    }

    /// `pos` is the user's body index, `None` for the terminator.
    fn check_use(
        &self,
        u: Variable,
        block: BlockId,
        pos: Option<usize>,
        doms: Option<&BTreeSet<BlockId>>,
    ) -> Result<(), IrError> {
        let def = match self.defs.get(u.index()) {
            None => return Err(IrError::UnknownVariable(u)),
            Some(Def::Deleted) => {
                return Err(IrError::structural(format!(
                    "dangling reference to deleted variable {}",
                    u
                )))
            }
            Some(def) => *def,
        };
        let Some(doms) = doms else {
            return Ok(());
        };
        let ok = match def {
            Def::Param { block: b, .. } => doms.contains(&b),
            Def::Stmt { block: b, index } if b == block => pos.map_or(true, |p| index < p),
            Def::Stmt { block: b, .. } => doms.contains(&b),
            Def::Deleted => false,
        };
        if ok {
            Ok(())
        } else {
            Err(IrError::structural(format!(
                "use of {} in block {} is not dominated by its definition",
                u, block
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Statement;
    use rewire_runtime::{Type, Value};

    fn square() -> Ir {
        let mut ir = Ir::new();
        let x = ir.add_param(BlockId::ENTRY, Type::Any).unwrap();
        let y = ir
            .push(Statement::call(Operand::global("*"), vec![x.into(), x.into()]))
            .unwrap();
        ir.ret(BlockId::ENTRY, y).unwrap();
        ir
    }

    #[test]
    fn well_formed_ir_verifies() {
        square().verify().unwrap();
    }

    #[test]
    fn missing_terminator_fails() {
        let mut ir = square();
        ir.add_block();
        assert!(ir.verify().unwrap_err().is_structural());
    }

    #[test]
    fn conditional_last_branch_fails() {
        let mut ir = Ir::new();
        let c = ir.push(Statement::operand(Value::Bool(true))).unwrap();
        ir.add_branch(BlockId::ENTRY, Branch::ret(Value::Int(1)).unless(c))
            .unwrap();
        assert!(ir.verify().unwrap_err().is_structural());
    }

    #[test]
    fn use_from_sibling_branch_is_not_dominated() {
        // 0 → {1, 2} → 3, where 3 reads a value defined only in 1.
        let mut ir = Ir::new();
        let c = ir.push(Statement::operand(Value::Bool(true))).unwrap();
        let then = ir.add_block();
        let other = ir.add_block();
        let merge = ir.add_block();
        ir.branch_unless(BlockId::ENTRY, other, vec![], c).unwrap();
        ir.branch(BlockId::ENTRY, then, vec![]).unwrap();
        let t = ir.push_to(then, Statement::operand(Value::Int(1))).unwrap();
        ir.branch(then, merge, vec![]).unwrap();
        ir.branch(other, merge, vec![]).unwrap();
        ir.ret(merge, t).unwrap();
        assert!(ir.verify().unwrap_err().is_structural());
    }

    #[test]
    fn block_param_threading_verifies() {
        let mut ir = Ir::new();
        let c = ir.push(Statement::operand(Value::Bool(true))).unwrap();
        let then = ir.add_block();
        let other = ir.add_block();
        let merge = ir.add_block();
        let r = ir.add_param(merge, Type::Any).unwrap();
        ir.branch_unless(BlockId::ENTRY, other, vec![], c).unwrap();
        ir.branch(BlockId::ENTRY, then, vec![]).unwrap();
        let t = ir.push_to(then, Statement::operand(Value::Int(1))).unwrap();
        ir.branch(then, merge, vec![t.into()]).unwrap();
        ir.branch(other, merge, vec![Value::Int(2).into()]).unwrap();
        ir.ret(merge, r).unwrap();
        ir.verify().unwrap();
    }

    #[test]
    fn unreachable_blocks_only_need_existing_definitions() {
        let mut ir = square();
        let dead = ir.add_block();
        ir.ret(dead, Variable(1)).unwrap();
        ir.verify().unwrap();
    }
}
