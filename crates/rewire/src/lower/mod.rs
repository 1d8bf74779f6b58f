//! Structural lowering: source function definitions → IR.
//!
//! Lowering walks the nested statements of a function and emits straight-line
//! statements into the current block. Conditionals and loops open new blocks
//! (see `control`); bindings whose values differ between incoming edges
//! become parameters of the join block. These are the only block parameters
//! created automatically.
//!
//! The entry block's first parameter is the implicit callee (the function
//! itself), followed by the declared parameters.

mod control;
mod liveness;

use crate::error::IrError;
use crate::ir::{BlockId, Ir, LineInfo, Operand, Statement, Variable};
use crate::source::{Expr, FunctionDef, Stmt, StmtKind};
use crate::world::Meta;
use rewire_runtime::{Type, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::trace;

/// Name → current SSA value.
pub(crate) type Env = BTreeMap<String, Operand>;

/// Lower the function described by `meta`, attaching `meta` to the result.
pub fn lower(meta: Rc<Meta>) -> Result<Ir, IrError> {
    let mut ir = lower_function(&meta.def, &meta.file)?;
    ir.meta = Some(meta);
    Ok(ir)
}

/// Lower `def` without provenance metadata.
///
/// A trailing expression statement at the top level of the body is the
/// return value; falling off the end otherwise returns `nothing`.
pub fn lower_function(def: &FunctionDef, file: &str) -> Result<Ir, IrError> {
    let mut lw = Lowerer::new(file);
    lw.ir.add_param(BlockId::ENTRY, Type::Any)?;
    for p in &def.params {
        let v = lw.ir.add_param(BlockId::ENTRY, Type::Any)?;
        lw.env.insert(p.clone(), Operand::Var(v));
    }

    let (init, tail) = match def.body.split_last() {
        Some((last, init)) if matches!(last.kind, StmtKind::Expr(_)) => (init, Some(last)),
        _ => (&def.body[..], None),
    };
    let tail_reads = tail
        .map(|t| liveness::reads(std::slice::from_ref(t)))
        .unwrap_or_default();
    lw.body(init, &tail_reads)?;

    if !lw.terminated {
        let value = match tail {
            Some(Stmt {
                kind: StmtKind::Expr(e),
                line,
            }) => lw.expr(e, *line)?,
            _ => Operand::Const(Value::Nothing),
        };
        if !lw.terminated {
            lw.ir.ret(lw.current, value)?;
        }
    }
    trace!(
        function = %def.name,
        blocks = lw.ir.num_blocks(),
        statements = lw.ir.len(),
        "lowered"
    );
    Ok(lw.ir)
}

pub(crate) struct Lowerer<'a> {
    pub(crate) ir: Ir,
    pub(crate) current: BlockId,
    pub(crate) env: Env,
    /// The current path ended in a return; following statements are dead.
    pub(crate) terminated: bool,
    file: &'a str,
}

impl<'a> Lowerer<'a> {
    fn new(file: &'a str) -> Self {
        Self {
            ir: Ir::new(),
            current: BlockId::ENTRY,
            env: Env::new(),
            terminated: false,
            file,
        }
    }

    fn line(&mut self, line: u32) -> u32 {
        self.ir.intern_line(LineInfo {
            file: self.file.to_string(),
            line,
        })
    }

    pub(crate) fn emit(&mut self, stmt: Statement, line: u32) -> Result<Variable, IrError> {
        let line = self.line(line);
        self.ir.push_to(self.current, stmt.with_line(line))
    }

    /// Lower `stmts` in order. `live_out` are the names read after them.
    pub(crate) fn body(
        &mut self,
        stmts: &[Stmt],
        live_out: &BTreeSet<String>,
    ) -> Result<(), IrError> {
        for (i, st) in stmts.iter().enumerate() {
            if self.terminated {
                break;
            }
            let mut live = liveness::reads(&stmts[i + 1..]);
            live.extend(live_out.iter().cloned());
            self.stmt(st, &live)?;
        }
        Ok(())
    }

    fn stmt(&mut self, st: &Stmt, live_after: &BTreeSet<String>) -> Result<(), IrError> {
        match &st.kind {
            StmtKind::Assign(name, e) => {
                let value = self.expr(e, st.line)?;
                if !self.terminated {
                    self.env.insert(name.clone(), value);
                }
            }
            StmtKind::Expr(e) => {
                self.expr(e, st.line)?;
            }
            StmtKind::Return(e) => {
                let value = self.expr(e, st.line)?;
                if !self.terminated {
                    self.ir.ret(self.current, value)?;
                    self.terminated = true;
                }
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => self.if_stmt(cond, then_body, else_body.as_deref(), st.line, live_after)?,
            StmtKind::While { cond, body } => self.while_stmt(cond, body, st.line, live_after)?,
        }
        Ok(())
    }

    /// Lower an expression to an operand. Names resolve to the current
    /// binding or, when unbound, to a global reference.
    pub(crate) fn expr(&mut self, e: &Expr, line: u32) -> Result<Operand, IrError> {
        Ok(match e {
            Expr::Name(n) => self
                .env
                .get(n)
                .cloned()
                .unwrap_or_else(|| Operand::global(n.as_str())),
            Expr::Lit(v) => Operand::Const(*v),
            Expr::Call(callee, args) => {
                let callee = self.expr(callee, line)?;
                let mut ops = Vec::with_capacity(args.len());
                for a in args {
                    ops.push(self.expr(a, line)?);
                }
                Operand::Var(self.emit(Statement::call(callee, ops), line)?)
            }
            Expr::Cond(c, t, f) => self.ternary(c, t, f, line)?,
        })
    }

    /// A variable holding `op`, for use as a branch condition.
    pub(crate) fn cond_var(&mut self, op: Operand, line: u32) -> Result<Variable, IrError> {
        match op {
            Operand::Var(v) => Ok(v),
            Operand::Const(v) => self.emit(Statement::operand(v).with_type(v.type_of()), line),
            other => self.emit(Statement::operand(other), line),
        }
    }
}
