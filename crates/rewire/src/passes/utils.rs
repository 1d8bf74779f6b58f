//! Control-flow queries shared by verification and the passes.

use crate::ir::{BlockId, Ir};
use std::collections::{BTreeSet, HashMap, HashSet};

// ── Successors / predecessors ────────────────────────────────────────────────

/// Distinct successor blocks of `block`, in first-branch order.
pub fn successors(ir: &Ir, block: BlockId) -> Vec<BlockId> {
    let mut out = Vec::new();
    if let Ok(b) = ir.block(block) {
        for s in b.successors() {
            if !out.contains(&s) {
                out.push(s);
            }
        }
    }
    out
}

/// Map from each block to the set of *distinct* predecessor blocks.
pub fn predecessors(ir: &Ir) -> HashMap<BlockId, HashSet<BlockId>> {
    let mut preds: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for i in 0..ir.num_blocks() {
        preds.entry(BlockId(i as u32)).or_default();
    }
    for (i, block) in ir.blocks().iter().enumerate() {
        for succ in block.successors() {
            preds.entry(succ).or_default().insert(BlockId(i as u32));
        }
    }
    preds
}

// ── Reachability ─────────────────────────────────────────────────────────────

/// Blocks reachable from the entry. Targets that do not exist are skipped.
pub fn reachable(ir: &Ir) -> BTreeSet<BlockId> {
    let mut seen = BTreeSet::new();
    let mut worklist = vec![BlockId::ENTRY];
    while let Some(id) = worklist.pop() {
        if id.index() >= ir.num_blocks() || !seen.insert(id) {
            continue;
        }
        worklist.extend(successors(ir, id));
    }
    seen
}

// ── Dominators ───────────────────────────────────────────────────────────────

/// Dominator sets of every reachable block (each set includes the block).
///
/// Classic iterative data-flow: `dom(entry) = {entry}`,
/// `dom(b) = {b} ∪ ⋂ dom(p)` over reachable predecessors `p`, to fixpoint.
pub fn dominators(ir: &Ir) -> HashMap<BlockId, BTreeSet<BlockId>> {
    let live = reachable(ir);
    let preds = predecessors(ir);

    let mut dom: HashMap<BlockId, BTreeSet<BlockId>> = live
        .iter()
        .map(|b| {
            let init = if *b == BlockId::ENTRY {
                BTreeSet::from([BlockId::ENTRY])
            } else {
                live.clone()
            };
            (*b, init)
        })
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for b in live.iter().filter(|b| **b != BlockId::ENTRY) {
            let mut new: Option<BTreeSet<BlockId>> = None;
            for p in preds[b].iter().filter(|p| live.contains(*p)) {
                let pd = &dom[p];
                new = Some(match new {
                    None => pd.clone(),
                    Some(acc) => acc.intersection(pd).copied().collect(),
                });
            }
            let mut new = new.unwrap_or_default();
            new.insert(*b);
            if new != dom[b] {
                dom.insert(*b, new);
                changed = true;
            }
        }
    }
    dom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Operand, Statement};
    use rewire_runtime::{Type, Value};

    /// 0 → {1, 2} → 3, plus an unreachable block 4.
    fn diamond() -> Ir {
        let mut ir = Ir::new();
        let x = ir.add_param(BlockId::ENTRY, Type::Any).unwrap();
        let c = ir
            .push(Statement::call(Operand::global("!"), vec![x.into()]))
            .unwrap();
        let then = ir.add_block();
        let other = ir.add_block();
        let merge = ir.add_block();
        let _dead = ir.add_block();
        ir.branch_unless(BlockId::ENTRY, other, vec![], c).unwrap();
        ir.branch(BlockId::ENTRY, then, vec![]).unwrap();
        ir.branch(then, merge, vec![]).unwrap();
        ir.branch(other, merge, vec![]).unwrap();
        ir.ret(merge, Value::Nothing).unwrap();
        ir
    }

    #[test]
    fn reachable_skips_dead_block() {
        let ir = diamond();
        let r: Vec<u32> = reachable(&ir).iter().map(|b| b.0).collect();
        assert_eq!(r, vec![0, 1, 2, 3]);
    }

    #[test]
    fn predecessors_of_merge() {
        let ir = diamond();
        let preds = predecessors(&ir);
        assert_eq!(preds[&BlockId(3)], HashSet::from([BlockId(1), BlockId(2)]));
        assert!(preds[&BlockId(0)].is_empty());
    }

    #[test]
    fn merge_is_dominated_only_by_entry() {
        let ir = diamond();
        let dom = dominators(&ir);
        assert_eq!(dom[&BlockId(3)], BTreeSet::from([BlockId(0), BlockId(3)]));
        assert_eq!(dom[&BlockId(1)], BTreeSet::from([BlockId(0), BlockId(1)]));
        assert!(!dom.contains_key(&BlockId(4)));
    }

    #[test]
    fn loop_header_dominates_body() {
        let mut ir = Ir::new();
        let header = ir.add_block();
        let body = ir.add_block();
        let exit = ir.add_block();
        let c = ir.push_to(header, Statement::operand(Value::Bool(true))).unwrap();
        ir.branch(BlockId::ENTRY, header, vec![]).unwrap();
        ir.branch_unless(header, exit, vec![], c).unwrap();
        ir.branch(header, body, vec![]).unwrap();
        ir.branch(body, header, vec![]).unwrap();
        ir.ret(exit, Value::Nothing).unwrap();

        let dom = dominators(&ir);
        assert!(dom[&body].contains(&header));
        assert!(dom[&exit].contains(&header));
        assert!(!dom[&header].contains(&body));
    }
}
