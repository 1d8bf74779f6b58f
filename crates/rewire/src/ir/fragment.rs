//! The `Ir` container and its mutation primitives.
//!
//! Every primitive validates before it mutates: a rejected edit returns an
//! error and leaves the IR exactly as it was.
//!
//! ## Cost model
//!
//! Bodies are dense vectors, so `push` is O(1) amortized while
//! `insert_before` / `insert_after` / `prepend` / `delete` shift the rest of
//! the block (O(block length)) and `delete` additionally scans for remaining
//! uses (O(IR size)). Sequences of edits during a traversal belong in a
//! [`crate::Pipe`], which does each edit in O(1).

use super::block::Block;
use super::types::*;
use crate::error::IrError;
use crate::world::Meta;
use rewire_runtime::{Type, Value};
use std::rc::Rc;

/// Where a variable is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Def {
    Param { block: BlockId, index: usize },
    Stmt { block: BlockId, index: usize },
    Deleted,
}

/// A fragment of SSA-form code: blocks, a variable counter, a line table.
///
/// `Ir` deliberately does not implement `PartialEq`: two fragments that only
/// differ in variable numbering are compared with [`Ir::structural_eq`].
#[derive(Debug, Clone)]
pub struct Ir {
    /// Definition site per allocated variable. Its length is the variable
    /// counter; entries are never removed.
    pub(crate) defs: Vec<Def>,

    /// All basic blocks. INVARIANT: never empty, `blocks[0]` is the entry.
    pub(crate) blocks: Vec<Block>,

    /// Source locations referenced by `Statement::line` (1-based; 0 = none).
    pub lines: Vec<LineInfo>,

    /// Provenance, present when the IR was lowered from a function.
    pub meta: Option<Rc<Meta>>,
}

impl Default for Ir {
    fn default() -> Self {
        Self::new()
    }
}

impl Ir {
    /// A fragment with a single entry block: no parameters, no statements,
    /// no terminator.
    pub fn new() -> Self {
        Self {
            defs: Vec::new(),
            blocks: vec![Block::default()],
            lines: Vec::new(),
            meta: None,
        }
    }

    /// An empty fragment carrying `meta`.
    pub fn with_meta(meta: Rc<Meta>) -> Self {
        Self {
            meta: Some(meta),
            ..Self::new()
        }
    }

    /// An empty fragment that keeps this IR's line table and metadata.
    pub fn empty_like(&self) -> Self {
        Self {
            defs: Vec::new(),
            blocks: vec![Block::default()],
            lines: self.lines.clone(),
            meta: self.meta.clone(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Number of variables ever allocated (params and statements, including
    /// deleted ones).
    pub fn var_count(&self) -> usize {
        self.defs.len()
    }

    /// Number of live statements across all blocks.
    pub fn len(&self) -> usize {
        self.blocks.iter().map(|b| b.body.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.body.is_empty())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, id: BlockId) -> Result<&Block, IrError> {
        self.blocks.get(id.index()).ok_or(IrError::UnknownBlock(id))
    }

    pub fn entry(&self) -> &Block {
        &self.blocks[0]
    }

    /// Parameters of the entry block.
    pub fn arguments(&self) -> Vec<Variable> {
        self.entry().params().collect()
    }

    /// The statement bound to `v`, if `v` is a live statement variable.
    pub fn get(&self, v: Variable) -> Option<&Statement> {
        match self.defs.get(v.index())? {
            Def::Stmt { block, index } => Some(&self.blocks[block.index()].body[*index].1),
            _ => None,
        }
    }

    /// True if `v` names a live statement (block parameters excluded).
    pub fn contains(&self, v: Variable) -> bool {
        matches!(self.defs.get(v.index()), Some(Def::Stmt { .. }))
    }

    /// True if `v` is a live statement or block parameter.
    pub fn is_defined(&self, v: Variable) -> bool {
        matches!(
            self.defs.get(v.index()),
            Some(Def::Stmt { .. } | Def::Param { .. })
        )
    }

    /// The block defining `v` (as statement or parameter).
    pub fn defining_block(&self, v: Variable) -> Option<BlockId> {
        match self.defs.get(v.index())? {
            Def::Stmt { block, .. } | Def::Param { block, .. } => Some(*block),
            Def::Deleted => None,
        }
    }

    /// `(Variable, Statement)` pairs in block order, then body order.
    /// Block parameters and terminators are not included.
    pub fn iter(&self) -> impl Iterator<Item = (Variable, &Statement)> + '_ {
        self.blocks
            .iter()
            .flat_map(|b| b.body.iter().map(|(v, s)| (*v, s)))
    }

    /// Variables of all statements, in iteration order.
    pub fn keys(&self) -> Vec<Variable> {
        self.iter().map(|(v, _)| v).collect()
    }

    /// Branches whose target sits at or before their own block: the loops.
    pub fn back_edges(&self) -> Vec<(BlockId, BlockId)> {
        let mut edges = Vec::new();
        for (i, block) in self.blocks.iter().enumerate() {
            for target in block.successors() {
                if target.index() <= i {
                    edges.push((BlockId(i as u32), target));
                }
            }
        }
        edges
    }

    /// True if any statement or branch still reads `v`.
    pub fn is_used(&self, v: Variable) -> bool {
        let mut used = false;
        for block in &self.blocks {
            for (_, st) in &block.body {
                st.expr.for_each_use(|u| used |= u == v);
            }
            for br in &block.branches {
                br.for_each_use(|u| used |= u == v);
            }
            if used {
                return true;
            }
        }
        false
    }

    // ── Validation helpers ───────────────────────────────────────────────

    fn check_block(&self, id: BlockId) -> Result<(), IrError> {
        self.block(id).map(|_| ())
    }

    /// Resolve a variable that is about to be referenced.
    fn check_reference(&self, v: Variable) -> Result<Def, IrError> {
        match self.defs.get(v.index()) {
            None => Err(IrError::UnknownVariable(v)),
            Some(Def::Deleted) => Err(IrError::structural(format!(
                "dangling reference to deleted variable {}",
                v
            ))),
            Some(def) => Ok(*def),
        }
    }

    /// Check that `stmt`, placed at `position` in `block`, only reads
    /// variables that exist and, within the same block, are defined earlier.
    ///
    /// Cross-block dominance is checked by [`Ir::verify`]; the graph may
    /// still be under construction here.
    fn check_operands(
        &self,
        block: BlockId,
        position: usize,
        stmt: &Statement,
    ) -> Result<(), IrError> {
        let mut result = Ok(());
        stmt.expr.for_each_use(|u| {
            if result.is_err() {
                return;
            }
            result = match self.check_reference(u) {
                Ok(Def::Stmt { block: b, index }) if b == block && index >= position => {
                    Err(IrError::structural(format!(
                        "{} is used before its definition in block {}",
                        u, block
                    )))
                }
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            };
        });
        result
    }

    fn check_operand(&self, op: &Operand) -> Result<(), IrError> {
        match op {
            Operand::Var(v) => self.check_reference(*v).map(|_| ()),
            _ => Ok(()),
        }
    }

    fn stmt_site(&self, v: Variable) -> Result<(BlockId, usize), IrError> {
        match self.defs.get(v.index()) {
            Some(Def::Stmt { block, index }) => Ok((*block, *index)),
            Some(Def::Param { .. }) => Err(IrError::structural(format!(
                "{} is a block parameter, not a statement",
                v
            ))),
            Some(Def::Deleted) | None => Err(IrError::UnknownVariable(v)),
        }
    }

    // ── Variables and blocks ─────────────────────────────────────────────

    pub(crate) fn alloc_var(&mut self, def: Def) -> Variable {
        let v = Variable(self.defs.len() as u32);
        self.defs.push(def);
        v
    }

    /// Append a new, empty block and return its id.
    pub fn add_block(&mut self) -> BlockId {
        self.blocks.push(Block::default());
        BlockId((self.blocks.len() - 1) as u32)
    }

    /// Append a parameter to `block`; existing branches into it pass `nothing`.
    pub fn add_param(&mut self, block: BlockId, ty: Type) -> Result<Variable, IrError> {
        self.add_param_with(block, ty, Operand::Const(Value::Nothing))
    }

    /// Append a parameter to `block`; existing branches into it pass `default`,
    /// so the branch/parameter arity invariant holds after the call.
    pub fn add_param_with(
        &mut self,
        block: BlockId,
        ty: Type,
        default: Operand,
    ) -> Result<Variable, IrError> {
        self.check_block(block)?;
        let end = self.blocks[block.index()].params.len();
        self.add_param_at(block, end, ty, default)
    }

    /// Insert a parameter into `block` at `position`, shifting later
    /// parameters right. Existing branches into the block pass `default`
    /// at the same position.
    ///
    /// # Errors
    /// - `UnknownBlock` for a missing block
    /// - `Structural` if `position` is past the last parameter
    pub fn add_param_at(
        &mut self,
        block: BlockId,
        position: usize,
        ty: Type,
        default: Operand,
    ) -> Result<Variable, IrError> {
        self.check_block(block)?;
        self.check_operand(&default)?;
        let len = self.blocks[block.index()].params.len();
        if position > len {
            return Err(IrError::structural(format!(
                "parameter position {} out of range for block {} with {} parameter(s)",
                position, block, len
            )));
        }
        let v = self.alloc_var(Def::Param {
            block,
            index: position,
        });
        let params = &mut self.blocks[block.index()].params;
        params.insert(position, (v, ty));
        for (index, (p, _)) in params.iter().enumerate().skip(position + 1) {
            self.defs[p.index()] = Def::Param { block, index };
        }
        for b in &mut self.blocks {
            for br in &mut b.branches {
                if br.target == Target::Block(block) {
                    br.args.insert(position, default.clone());
                }
            }
        }
        Ok(v)
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn insert_at(
        &mut self,
        block: BlockId,
        position: usize,
        stmt: Statement,
    ) -> Result<Variable, IrError> {
        self.check_operands(block, position, &stmt)?;
        let v = self.alloc_var(Def::Stmt {
            block,
            index: position,
        });
        let body = &mut self.blocks[block.index()].body;
        body.insert(position, (v, stmt));
        for (index, (var, _)) in body.iter().enumerate().skip(position + 1) {
            self.defs[var.index()] = Def::Stmt { block, index };
        }
        Ok(v)
    }

    /// Append `stmt` to the last block, before its terminator.
    pub fn push(&mut self, stmt: impl Into<Statement>) -> Result<Variable, IrError> {
        let last = BlockId((self.blocks.len() - 1) as u32);
        self.push_to(last, stmt)
    }

    /// Append `stmt` to `block`, before its terminator.
    pub fn push_to(
        &mut self,
        block: BlockId,
        stmt: impl Into<Statement>,
    ) -> Result<Variable, IrError> {
        self.check_block(block)?;
        let position = self.blocks[block.index()].body.len();
        self.insert_at(block, position, stmt.into())
    }

    /// Insert `stmt` as the first statement of the entry block.
    pub fn prepend(&mut self, stmt: impl Into<Statement>) -> Result<Variable, IrError> {
        self.prepend_to(BlockId::ENTRY, stmt)
    }

    /// Insert `stmt` as the first statement of `block`.
    pub fn prepend_to(
        &mut self,
        block: BlockId,
        stmt: impl Into<Statement>,
    ) -> Result<Variable, IrError> {
        self.check_block(block)?;
        self.insert_at(block, 0, stmt.into())
    }

    /// Insert `stmt` just before the statement defining `v`.
    pub fn insert_before(
        &mut self,
        v: Variable,
        stmt: impl Into<Statement>,
    ) -> Result<Variable, IrError> {
        let (block, index) = self.stmt_site(v)?;
        self.insert_at(block, index, stmt.into())
    }

    /// Insert `stmt` just after the statement defining `v`.
    pub fn insert_after(
        &mut self,
        v: Variable,
        stmt: impl Into<Statement>,
    ) -> Result<Variable, IrError> {
        let (block, index) = self.stmt_site(v)?;
        self.insert_at(block, index + 1, stmt.into())
    }

    /// Replace the statement bound to `v`, returning the old one.
    pub fn set(
        &mut self,
        v: Variable,
        stmt: impl Into<Statement>,
    ) -> Result<Statement, IrError> {
        let (block, index) = self.stmt_site(v)?;
        let stmt = stmt.into();
        self.check_operands(block, index, &stmt)?;
        Ok(std::mem::replace(
            &mut self.blocks[block.index()].body[index].1,
            stmt,
        ))
    }

    /// Remove the statement bound to `v`.
    ///
    /// # Errors
    /// - `UnknownVariable` if `v` is not a live statement
    /// - `Structural` if any statement or branch still reads `v`
    pub fn delete(&mut self, v: Variable) -> Result<Statement, IrError> {
        let (block, index) = self.stmt_site(v)?;
        if self.is_used(v) {
            return Err(IrError::structural(format!("{} is still referenced", v)));
        }
        let body = &mut self.blocks[block.index()].body;
        let (_, stmt) = body.remove(index);
        for (index, (var, _)) in body.iter().enumerate().skip(index) {
            self.defs[var.index()] = Def::Stmt { block, index };
        }
        self.defs[v.index()] = Def::Deleted;
        Ok(stmt)
    }

    /// Recompute every definition site from block contents. Variables no
    /// longer present anywhere become `Deleted`; the counter is unchanged.
    pub(crate) fn rebuild_defs(&mut self) {
        for def in &mut self.defs {
            *def = Def::Deleted;
        }
        for (bi, block) in self.blocks.iter().enumerate() {
            let id = BlockId(bi as u32);
            for (index, (v, _)) in block.params.iter().enumerate() {
                self.defs[v.index()] = Def::Param { block: id, index };
            }
            for (index, (v, _)) in block.body.iter().enumerate() {
                self.defs[v.index()] = Def::Stmt { block: id, index };
            }
        }
    }

    /// Mutable access to every statement, for rewrites that only rearrange
    /// existing operands.
    pub(crate) fn statements_mut(&mut self) -> impl Iterator<Item = (Variable, &mut Statement)> {
        self.blocks
            .iter_mut()
            .flat_map(|b| b.body.iter_mut().map(|(v, s)| (*v, s)))
    }

    /// Replace constant and global operands throughout the IR.
    ///
    /// `f` sees every non-variable operand (callees, arguments, branch
    /// arguments) and returns a replacement or `None`. Replacements are
    /// collected first and applied only if none of them is a variable, so a
    /// rejected rewrite leaves the IR untouched. Returns the number of
    /// operands replaced.
    pub fn rewrite_refs<F>(&mut self, mut f: F) -> Result<usize, IrError>
    where
        F: FnMut(&Operand) -> Option<Operand>,
    {
        let mut stmt_edits: Vec<(usize, usize, usize, Operand)> = Vec::new();
        let mut branch_edits: Vec<(usize, usize, usize, Operand)> = Vec::new();

        for (bi, block) in self.blocks.iter().enumerate() {
            for (si, (_, st)) in block.body.iter().enumerate() {
                let mut k = 0;
                st.expr.for_each_operand(|op| {
                    if op.as_var().is_none() {
                        if let Some(new) = f(op) {
                            stmt_edits.push((bi, si, k, new));
                        }
                    }
                    k += 1;
                });
            }
            for (ri, br) in block.branches.iter().enumerate() {
                for (k, op) in br.args.iter().enumerate() {
                    if op.as_var().is_none() {
                        if let Some(new) = f(op) {
                            branch_edits.push((bi, ri, k, new));
                        }
                    }
                }
            }
        }

        let introduces_var = stmt_edits
            .iter()
            .chain(branch_edits.iter())
            .any(|(.., op)| op.as_var().is_some());
        if introduces_var {
            return Err(IrError::structural(
                "rewrite_refs cannot introduce variable operands",
            ));
        }

        let count = stmt_edits.len() + branch_edits.len();
        for (bi, si, k, new) in stmt_edits {
            let mut slot = 0;
            let mut new = Some(new);
            self.blocks[bi].body[si].1.expr.for_each_operand_mut(|op| {
                if slot == k {
                    if let Some(n) = new.take() {
                        *op = n;
                    }
                }
                slot += 1;
            });
        }
        for (bi, ri, k, new) in branch_edits {
            self.blocks[bi].branches[ri].args[k] = new;
        }
        Ok(count)
    }

    // ── Terminators ──────────────────────────────────────────────────────

    /// Append a branch to `from`'s terminator after validating it.
    ///
    /// # Errors
    /// - `UnknownBlock` for a missing source or target block
    /// - `Structural` if `from` already ends in an unconditional branch
    ///   (the new branch would sit mid-block), or if the argument count does
    ///   not match the target's parameters (exactly one for a return)
    pub fn add_branch(&mut self, from: BlockId, branch: Branch) -> Result<(), IrError> {
        self.check_block(from)?;
        if self.blocks[from.index()].is_terminated() {
            return Err(IrError::structural(format!(
                "block {} already ends in an unconditional branch",
                from
            )));
        }
        let expected = match branch.target {
            Target::Block(t) => self.block(t)?.num_params(),
            Target::Return => 1,
        };
        if branch.args.len() != expected {
            return Err(IrError::structural(format!(
                "branch from block {} passes {} argument(s), target expects {}",
                from,
                branch.args.len(),
                expected
            )));
        }
        if let Some(c) = branch.condition {
            self.check_reference(c)?;
        }
        for a in &branch.args {
            self.check_operand(a)?;
        }
        self.blocks[from.index()].branches.push(branch);
        Ok(())
    }

    /// `br target (args...)`
    pub fn branch(
        &mut self,
        from: BlockId,
        target: BlockId,
        args: Vec<Operand>,
    ) -> Result<(), IrError> {
        self.add_branch(from, Branch::to(target, args))
    }

    /// `br target (args...) unless condition`
    pub fn branch_unless(
        &mut self,
        from: BlockId,
        target: BlockId,
        args: Vec<Operand>,
        condition: Variable,
    ) -> Result<(), IrError> {
        self.add_branch(from, Branch::to(target, args).unless(condition))
    }

    /// `return value`
    pub fn ret(&mut self, from: BlockId, value: impl Into<Operand>) -> Result<(), IrError> {
        self.add_branch(from, Branch::ret(value))
    }

    /// The value returned by `block`, if it ends in a return.
    pub fn return_value(&self, block: BlockId) -> Option<&Operand> {
        self.blocks.get(block.index())?.return_value()
    }

    // ── Line table ───────────────────────────────────────────────────────

    /// Index of `info` in the line table, appending it if new (1-based).
    pub fn intern_line(&mut self, info: LineInfo) -> u32 {
        if let Some(pos) = self.lines.iter().position(|l| *l == info) {
            return pos as u32 + 1;
        }
        self.lines.push(info);
        self.lines.len() as u32
    }

    /// The line table entry for a statement line index.
    pub fn line_info(&self, line: u32) -> Option<&LineInfo> {
        line.checked_sub(1)
            .and_then(|i| self.lines.get(i as usize))
    }
}
