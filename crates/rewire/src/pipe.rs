//! The edit buffer: O(1) edits during one forward pass over an IR.
//!
//! A [`Pipe`] visits the statements of an IR in iteration order. Edits are
//! made relative to the statement being visited and accumulate into a fresh
//! body per block; [`Pipe::finish`] swaps the new bodies in, applies pending
//! substitutions and checks that nothing refers to a deleted variable.
//!
//! ```text
//! let mut p = Pipe::new(ir);
//! while let Some(v) = p.advance() {
//!     p.insert_before(v, stmt)?;
//! }
//! let ir = p.finish()?;
//! ```
//!
//! Untouched statements keep their variable and relative order. Inserted
//! statements get fresh variables from the IR's counter. Multiple
//! `insert_after` calls on one statement come out in call order.

use crate::error::IrError;
use crate::ir::{Def, Ir, Operand, Statement, Variable};
use rewire_runtime::Value;
use std::collections::{HashMap, HashSet};
use tracing::trace;

pub struct Pipe {
    ir: Ir,
    /// Output body per block.
    out: Vec<Vec<(Variable, Statement)>>,
    /// Source position: block index and next body index.
    block: usize,
    next: usize,
    current: Option<Variable>,
    /// The visited statement, `None` once deleted.
    staged: Option<Statement>,
    after: Vec<(Variable, Statement)>,
    /// Where emitted statements sit in `out`.
    emitted: HashMap<Variable, (usize, usize)>,
    deleted: HashSet<Variable>,
    subst: HashMap<Variable, Operand>,
}

impl Pipe {
    pub fn new(ir: Ir) -> Self {
        let out = vec![Vec::new(); ir.num_blocks()];
        Self {
            ir,
            out,
            block: 0,
            next: 0,
            current: None,
            staged: None,
            after: Vec::new(),
            emitted: HashMap::new(),
            deleted: HashSet::new(),
            subst: HashMap::new(),
        }
    }

    /// Move to the next statement and return its variable, or `None` when
    /// every statement has been visited.
    pub fn advance(&mut self) -> Option<Variable> {
        self.flush();
        loop {
            let body = &mut self.ir.blocks.get_mut(self.block)?.body;
            if let Some((v, st)) = body.get_mut(self.next) {
                let st = std::mem::replace(st, Statement::operand(Value::Nothing));
                let v = *v;
                self.next += 1;
                self.current = Some(v);
                self.staged = Some(st);
                return Some(v);
            }
            self.block += 1;
            self.next = 0;
        }
    }

    /// The variable being visited.
    pub fn current(&self) -> Option<Variable> {
        self.current
    }

    /// The statement of `v` as it currently stands in the output, or in the
    /// source if `v` has not been visited yet.
    pub fn stmt(&self, v: Variable) -> Option<&Statement> {
        if self.current == Some(v) {
            return self.staged.as_ref();
        }
        if self.deleted.contains(&v) {
            return None;
        }
        if let Some(&(b, i)) = self.emitted.get(&v) {
            return Some(&self.out[b][i].1);
        }
        if let Some((_, st)) = self.after.iter().find(|(a, _)| *a == v) {
            return Some(st);
        }
        match self.ir.defs.get(v.index())? {
            Def::Stmt { block, index }
                if (block.index(), *index) >= (self.block, self.next) =>
            {
                Some(&self.ir.blocks[block.index()].body[*index].1)
            }
            _ => None,
        }
    }

    /// Total number of variables allocated so far.
    pub fn var_count(&self) -> usize {
        self.ir.var_count()
    }

    fn check_cursor(&self, v: Variable) -> Result<(), IrError> {
        if self.current == Some(v) {
            return Ok(());
        }
        Err(IrError::Cursor {
            current: self
                .current
                .map_or_else(|| "nothing".to_string(), |c| c.to_string()),
            got: v,
        })
    }

    /// Reject unknown variables and uses of anything defined at or past
    /// the insertion point. `before` places the statement ahead of the
    /// visited one, which then may not read it or its queued successors.
    fn check_operands(&self, stmt: &Statement, before: bool) -> Result<(), IrError> {
        let count = self.ir.var_count();
        let mut bad = None;
        stmt.expr.for_each_use(|u| {
            if bad.is_none() {
                bad = self.check_use(u, count, before).err();
            }
        });
        match bad {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn check_use(&self, u: Variable, count: usize, before: bool) -> Result<(), IrError> {
        if u.index() >= count {
            return Err(IrError::UnknownVariable(u));
        }
        let ahead = || {
            IrError::structural(format!(
                "use of {} before its definition in the pipe",
                u
            ))
        };
        if before && (self.current == Some(u) || self.after.iter().any(|(a, _)| *a == u)) {
            return Err(ahead());
        }
        match self.ir.defs.get(u.index()) {
            Some(Def::Stmt { block, index }) if (block.index(), *index) >= (self.block, self.next) => {
                Err(ahead())
            }
            _ => Ok(()),
        }
    }

    fn fresh(&mut self) -> Variable {
        self.ir.alloc_var(Def::Deleted)
    }

    fn emit(&mut self, v: Variable, stmt: Statement) {
        let body = &mut self.out[self.block];
        self.emitted.insert(v, (self.block, body.len()));
        body.push((v, stmt));
    }

    /// Insert `stmt` immediately before the visited statement `v`.
    pub fn insert_before(
        &mut self,
        v: Variable,
        stmt: impl Into<Statement>,
    ) -> Result<Variable, IrError> {
        self.check_cursor(v)?;
        let stmt = stmt.into();
        self.check_operands(&stmt, true)?;
        let new = self.fresh();
        self.emit(new, stmt);
        Ok(new)
    }

    /// Insert `stmt` after the visited statement `v`.
    pub fn insert_after(
        &mut self,
        v: Variable,
        stmt: impl Into<Statement>,
    ) -> Result<Variable, IrError> {
        self.check_cursor(v)?;
        let stmt = stmt.into();
        self.check_operands(&stmt, false)?;
        let new = self.fresh();
        self.after.push((new, stmt));
        Ok(new)
    }

    /// Replace the visited statement, keeping its variable.
    pub fn replace(&mut self, v: Variable, stmt: impl Into<Statement>) -> Result<(), IrError> {
        self.check_cursor(v)?;
        let stmt = stmt.into();
        self.check_operands(&stmt, true)?;
        self.deleted.remove(&v);
        self.staged = Some(stmt);
        Ok(())
    }

    /// Delete the visited statement. Remaining uses of `v` must be
    /// redirected with [`Pipe::substitute`] before `finish`.
    pub fn delete(&mut self, v: Variable) -> Result<Statement, IrError> {
        self.check_cursor(v)?;
        let stmt = self.staged.take().ok_or(IrError::UnknownVariable(v))?;
        self.deleted.insert(v);
        Ok(stmt)
    }

    /// Redirect every use of `v` to `op` when the pipe finishes.
    pub fn substitute(&mut self, v: Variable, op: impl Into<Operand>) -> Result<(), IrError> {
        let op = op.into();
        if v.index() >= self.ir.var_count() {
            return Err(IrError::UnknownVariable(v));
        }
        if op == Operand::Var(v) {
            return Err(IrError::structural(format!("{} substituted by itself", v)));
        }
        self.subst.insert(v, op);
        Ok(())
    }

    fn flush(&mut self) {
        let Some(v) = self.current.take() else {
            return;
        };
        if let Some(st) = self.staged.take() {
            self.emit(v, st);
        }
        for (a, st) in std::mem::take(&mut self.after) {
            self.emit(a, st);
        }
    }

    /// Materialize the edited IR.
    ///
    /// # Errors
    /// `Structural` if any statement or branch still uses a deleted
    /// variable that was not substituted, or if a substitution leaves a use
    /// that its definition does not dominate.
    pub fn finish(mut self) -> Result<Ir, IrError> {
        self.flush();

        // Statements never visited stay where they are.
        for b in self.block..self.ir.blocks.len() {
            let start = if b == self.block { self.next } else { 0 };
            let rest = std::mem::take(&mut self.ir.blocks[b].body);
            self.out[b].extend(rest.into_iter().skip(start));
        }
        for (block, body) in self.ir.blocks.iter_mut().zip(self.out) {
            block.body = body;
        }

        if !self.subst.is_empty() {
            let subst = &self.subst;
            let resolve = |op: &mut Operand| {
                let mut hops = 0;
                while let Operand::Var(v) = *op {
                    match subst.get(&v) {
                        Some(next) if hops <= subst.len() => {
                            *op = next.clone();
                            hops += 1;
                        }
                        _ => break,
                    }
                }
            };
            for block in &mut self.ir.blocks {
                for (_, st) in &mut block.body {
                    st.expr.for_each_operand_mut(resolve);
                }
                for br in &mut block.branches {
                    br.args.iter_mut().for_each(resolve);
                    if let Some(c) = br.condition {
                        let mut op = Operand::Var(c);
                        resolve(&mut op);
                        match op {
                            Operand::Var(nc) => br.condition = Some(nc),
                            other => {
                                return Err(IrError::structural(format!(
                                    "branch condition {} substituted by non-variable {}",
                                    c, other
                                )))
                            }
                        }
                    }
                }
            }
        }

        self.ir.rebuild_defs();
        let mut dangling = None;
        for block in &self.ir.blocks {
            let mut check = |u: Variable| {
                if matches!(self.ir.defs.get(u.index()), Some(Def::Deleted) | None) {
                    dangling.get_or_insert(u);
                }
            };
            for (_, st) in &block.body {
                st.expr.for_each_use(&mut check);
            }
            for br in &block.branches {
                br.for_each_use(&mut check);
            }
        }
        if let Some(u) = dangling {
            return Err(IrError::structural(format!(
                "{} was deleted but is still referenced",
                u
            )));
        }
        self.ir.verify_uses()?;
        trace!(statements = self.ir.len(), "pipe finished");
        Ok(self.ir)
    }
}

impl From<Ir> for Pipe {
    fn from(ir: Ir) -> Self {
        Pipe::new(ir)
    }
}
