//! Lowering of conditionals, ternaries and loops.
//!
//! ```text
//! if c { a } else { b }        while c { body }
//!
//!   0: br 2 unless %c            0: br 1 (init...)
//!      br 1                      1: (carried...)        header
//!   1: a; br 3 (vals...)            br 3 unless %c
//!   2: b; br 3 (vals...)            br 2
//!   3: (merged...)               2: body; br 1 (vals...)  back-edge
//!                                3: ...                  exit
//! ```
//!
//! An `if` without `else` branches straight to the join block when the
//! condition is false.

use super::liveness;
use super::{Env, Lowerer};
use crate::error::IrError;
use crate::ir::{BlockId, Operand, Variable};
use crate::source::{Expr, Stmt};
use rewire_runtime::{Type, Value};
use std::collections::BTreeSet;

/// A control-flow edge into a join block that has not been created yet.
struct Edge {
    from: BlockId,
    env: Env,
    /// Value of the construct along this edge (ternaries only).
    value: Option<Operand>,
    /// `br join unless cond` followed by `br fallthrough`, emitted once the
    /// join block exists.
    deferred: Option<(Variable, BlockId)>,
}

impl Lowerer<'_> {
    pub(super) fn if_stmt(
        &mut self,
        cond: &Expr,
        then_body: &[Stmt],
        else_body: Option<&[Stmt]>,
        line: u32,
        live_after: &BTreeSet<String>,
    ) -> Result<(), IrError> {
        let c = self.expr(cond, line)?;
        let c = self.cond_var(c, line)?;
        let from = self.current;
        let entry_env = self.env.clone();
        let then_block = self.ir.add_block();
        let mut edges = Vec::new();

        match else_body {
            Some(else_body) => {
                let else_block = self.ir.add_block();
                self.ir.branch_unless(from, else_block, vec![], c)?;
                self.ir.branch(from, then_block, vec![])?;
                self.arm(then_block, then_body, &entry_env, live_after, &mut edges)?;
                self.arm(else_block, else_body, &entry_env, live_after, &mut edges)?;
            }
            None => {
                edges.push(Edge {
                    from,
                    env: entry_env.clone(),
                    value: None,
                    deferred: Some((c, then_block)),
                });
                self.arm(then_block, then_body, &entry_env, live_after, &mut edges)?;
            }
        }
        self.join(edges, live_after)?;
        Ok(())
    }

    /// Lower one arm starting at `block`, recording its outgoing edge.
    fn arm(
        &mut self,
        block: BlockId,
        body: &[Stmt],
        entry_env: &Env,
        live_after: &BTreeSet<String>,
        edges: &mut Vec<Edge>,
    ) -> Result<(), IrError> {
        self.current = block;
        self.env = entry_env.clone();
        self.terminated = false;
        self.body(body, live_after)?;
        if !self.terminated {
            edges.push(Edge {
                from: self.current,
                env: self.env.clone(),
                value: None,
                deferred: None,
            });
        }
        Ok(())
    }

    pub(super) fn ternary(
        &mut self,
        cond: &Expr,
        then: &Expr,
        other: &Expr,
        line: u32,
    ) -> Result<Operand, IrError> {
        let c = self.expr(cond, line)?;
        let c = self.cond_var(c, line)?;
        let from = self.current;
        let then_block = self.ir.add_block();
        let else_block = self.ir.add_block();
        self.ir.branch_unless(from, else_block, vec![], c)?;
        self.ir.branch(from, then_block, vec![])?;

        let mut edges = Vec::with_capacity(2);
        for (block, e) in [(then_block, then), (else_block, other)] {
            self.current = block;
            let value = self.expr(e, line)?;
            edges.push(Edge {
                from: self.current,
                env: self.env.clone(),
                value: Some(value),
                deferred: None,
            });
        }
        // Expressions never rebind names, so no binding is merged.
        let merged = self.join(edges, &BTreeSet::new())?;
        Ok(merged.unwrap_or(Operand::Const(Value::Nothing)))
    }

    /// Create the join block for `edges` and continue lowering there.
    ///
    /// Live bindings whose value differs between edges (or is missing on
    /// some) become join parameters in name order, followed by the
    /// construct's value when the edges carry one. With no incoming edge the
    /// current path is marked terminated.
    fn join(
        &mut self,
        edges: Vec<Edge>,
        live: &BTreeSet<String>,
    ) -> Result<Option<Operand>, IrError> {
        if edges.is_empty() {
            self.terminated = true;
            return Ok(None);
        }

        let mut names: BTreeSet<&String> = BTreeSet::new();
        for e in &edges {
            names.extend(e.env.keys());
        }

        let join = self.ir.add_block();
        let mut env = Env::new();
        let mut threaded: Vec<String> = Vec::new();
        for name in names {
            let first = edges[0].env.get(name);
            let uniform = edges.iter().all(|e| e.env.get(name) == first);
            match first {
                Some(op) if uniform => {
                    env.insert(name.clone(), op.clone());
                }
                _ if live.contains(name) => {
                    let p = self.ir.add_param(join, Type::Any)?;
                    env.insert(name.clone(), Operand::Var(p));
                    threaded.push(name.clone());
                }
                _ => {}
            }
        }
        let value = if edges.iter().any(|e| e.value.is_some()) {
            Some(Operand::Var(self.ir.add_param(join, Type::Any)?))
        } else {
            None
        };

        for e in edges {
            let mut args: Vec<Operand> = threaded
                .iter()
                .map(|n| {
                    e.env
                        .get(n)
                        .cloned()
                        .unwrap_or(Operand::Const(Value::Nothing))
                })
                .collect();
            if value.is_some() {
                args.push(e.value.unwrap_or(Operand::Const(Value::Nothing)));
            }
            match e.deferred {
                Some((c, fallthrough)) => {
                    self.ir.branch_unless(e.from, join, args, c)?;
                    self.ir.branch(e.from, fallthrough, vec![])?;
                }
                None => self.ir.branch(e.from, join, args)?,
            }
        }

        self.current = join;
        self.env = env;
        self.terminated = false;
        Ok(value)
    }

    pub(super) fn while_stmt(
        &mut self,
        cond: &Expr,
        body: &[Stmt],
        line: u32,
        live_after: &BTreeSet<String>,
    ) -> Result<(), IrError> {
        // Everything the loop reads may observe a value from the previous
        // iteration.
        let mut live_in_loop = cond_reads(cond);
        live_in_loop.extend(liveness::reads(body));
        live_in_loop.extend(live_after.iter().cloned());
        let carried: Vec<String> = liveness::assigned(body)
            .into_iter()
            .filter(|n| live_in_loop.contains(n))
            .collect();

        let header = self.ir.add_block();
        let mut init = Vec::with_capacity(carried.len());
        let mut header_env = self.env.clone();
        for name in &carried {
            let p = self.ir.add_param(header, Type::Any)?;
            init.push(
                self.env
                    .get(name)
                    .cloned()
                    .unwrap_or(Operand::Const(Value::Nothing)),
            );
            header_env.insert(name.clone(), Operand::Var(p));
        }
        self.ir.branch(self.current, header, init)?;

        self.current = header;
        self.env = header_env;
        let c = self.expr(cond, line)?;
        let c = self.cond_var(c, line)?;
        let test_block = self.current;
        let header_env = self.env.clone();

        let body_block = self.ir.add_block();
        let exit = self.ir.add_block();
        self.ir.branch_unless(test_block, exit, vec![], c)?;
        self.ir.branch(test_block, body_block, vec![])?;

        self.current = body_block;
        self.body(body, &live_in_loop)?;
        if !self.terminated {
            let back: Vec<Operand> = carried
                .iter()
                .map(|n| {
                    self.env
                        .get(n)
                        .cloned()
                        .unwrap_or(Operand::Const(Value::Nothing))
                })
                .collect();
            self.ir.branch(self.current, header, back)?;
        }

        self.current = exit;
        self.env = header_env;
        self.terminated = false;
        Ok(())
    }
}

fn cond_reads(cond: &Expr) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    cond.collect_reads(&mut out);
    out
}
