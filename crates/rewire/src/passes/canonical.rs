//! Canonical variable renumbering.
//!
//! Two IRs built by different edit sequences can describe the same program
//! under different variable numbers. Renumbering both in definition order
//! (block by block, parameters then body) makes them comparable.

use crate::ir::{Block, Ir, Operand, Variable};
use std::collections::HashMap;

/// A copy of `ir` with live variables renumbered `%0, %1, ...` in definition
/// order. The counter of the copy equals the number of live variables.
pub fn canonicalize(ir: &Ir) -> Ir {
    let mut map: HashMap<Variable, Variable> = HashMap::new();
    for block in ir.blocks() {
        for v in block.params().chain(block.body().iter().map(|(v, _)| *v)) {
            let next = Variable(map.len() as u32);
            map.insert(v, next);
        }
    }
    let rename = |v: Variable| map.get(&v).copied().unwrap_or(v);
    let rename_op = |op: &mut Operand| {
        if let Operand::Var(v) = op {
            *v = rename(*v);
        }
    };

    let mut out = ir.clone();
    out.blocks = ir
        .blocks()
        .iter()
        .map(|b| {
            let mut nb: Block = b.clone();
            for (v, _) in &mut nb.params {
                *v = rename(*v);
            }
            for (v, st) in &mut nb.body {
                *v = rename(*v);
                st.expr.for_each_operand_mut(rename_op);
            }
            for br in &mut nb.branches {
                br.condition = br.condition.map(rename);
                br.args.iter_mut().for_each(rename_op);
            }
            nb
        })
        .collect();
    out.defs = vec![crate::ir::Def::Deleted; map.len()];
    out.rebuild_defs();
    out
}

impl Ir {
    /// True if both IRs have the same blocks, statements (including type and
    /// line index) and branches once variables are renumbered canonically.
    /// Metadata and the line table are not compared.
    pub fn structural_eq(&self, other: &Ir) -> bool {
        self.num_blocks() == other.num_blocks()
            && canonicalize(self).blocks == canonicalize(other).blocks
    }
}
