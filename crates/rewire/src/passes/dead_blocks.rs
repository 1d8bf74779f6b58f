//! Dead basic block elimination.
//!
//! Removes blocks that are unreachable from the entry and renumbers the
//! survivors so block ids stay dense. Dead blocks arise when a user transform
//! redirects branches, or when lowering emits the continuation of an `if`
//! whose arms both return.

use super::utils::reachable;
use crate::ir::{BlockId, Ir, Target};
use std::collections::HashMap;
use tracing::trace;

/// Removes unreachable blocks in place. Returns the number removed.
///
/// Variables defined in removed blocks become deleted; the variable counter
/// is unchanged, so surviving variables keep their identity.
pub fn eliminate(ir: &mut Ir) -> usize {
    let live = reachable(ir);
    let removed = ir.blocks.len() - live.len();
    if removed == 0 {
        return 0;
    }

    let renumber: HashMap<BlockId, BlockId> = live
        .iter()
        .enumerate()
        .map(|(new, old)| (*old, BlockId(new as u32)))
        .collect();

    let blocks = std::mem::take(&mut ir.blocks);
    ir.blocks = blocks
        .into_iter()
        .enumerate()
        .filter(|(i, _)| live.contains(&BlockId(*i as u32)))
        .map(|(_, b)| b)
        .collect();

    for block in &mut ir.blocks {
        for br in &mut block.branches {
            if let Target::Block(t) = br.target {
                // Live blocks only branch to live blocks.
                if let Some(new) = renumber.get(&t) {
                    br.target = Target::Block(*new);
                }
            }
        }
    }
    ir.rebuild_defs();
    trace!(removed, "eliminated dead blocks");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Operand, Statement};
    use rewire_runtime::{Type, Value};

    fn block_count(ir: &Ir) -> usize {
        ir.num_blocks()
    }

    // ── Basic cases ──────────────────────────────────────────────────────

    #[test]
    fn single_block_return_kept() {
        let mut ir = Ir::new();
        ir.ret(BlockId::ENTRY, Value::Nothing).unwrap();
        assert_eq!(eliminate(&mut ir), 0);
        assert_eq!(block_count(&ir), 1);
    }

    #[test]
    fn all_reachable_linear_chain() {
        let mut ir = Ir::new();
        let next = ir.add_block();
        ir.branch(BlockId::ENTRY, next, vec![]).unwrap();
        ir.ret(next, Value::Nothing).unwrap();
        assert_eq!(eliminate(&mut ir), 0);
        assert_eq!(block_count(&ir), 2);
    }

    // ── Removal and renumbering ──────────────────────────────────────────

    #[test]
    fn dead_block_in_the_middle_is_removed_and_targets_renumbered() {
        // 0 → 2, block 1 is dead.
        let mut ir = Ir::new();
        let dead = ir.add_block();
        let live = ir.add_block();
        let p = ir.add_param(live, Type::Any).unwrap();
        let d = ir.push_to(dead, Statement::operand(Value::Int(1))).unwrap();
        ir.ret(dead, d).unwrap();
        ir.branch(BlockId::ENTRY, live, vec![Value::Int(2).into()])
            .unwrap();
        ir.ret(live, p).unwrap();

        assert_eq!(eliminate(&mut ir), 1);
        assert_eq!(block_count(&ir), 2);
        assert_eq!(
            ir.entry().branches()[0].target,
            Target::Block(BlockId(1))
        );
        assert!(!ir.contains(d), "statements of dead blocks are gone");
        assert_eq!(ir.defining_block(p), Some(BlockId(1)));
        ir.verify().unwrap();
    }

    #[test]
    fn self_looping_dead_block_is_removed() {
        let mut ir = Ir::new();
        ir.ret(BlockId::ENTRY, Value::Nothing).unwrap();
        let dead = ir.add_block();
        ir.branch(dead, dead, vec![]).unwrap();
        assert_eq!(eliminate(&mut ir), 1);
        assert!(ir.back_edges().is_empty());
    }

    #[test]
    fn variable_numbering_survives() {
        let mut ir = Ir::new();
        let x = ir.add_param(BlockId::ENTRY, Type::Any).unwrap();
        let y = ir
            .push(Statement::call(Operand::global("neg"), vec![x.into()]))
            .unwrap();
        ir.ret(BlockId::ENTRY, y).unwrap();
        ir.add_block();
        let before = ir.var_count();
        eliminate(&mut ir);
        assert_eq!(ir.var_count(), before);
        assert!(ir.contains(y));
    }
}
