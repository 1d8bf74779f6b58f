//! Interpreter backend: evaluates the block graph directly.

use super::{Backend, Invoke};
use crate::ir::{BlockId, Expr, Ir, Operand, Target};
use crate::passes::dead_blocks;
use crate::world::World;
use crate::Options;
use anyhow::{anyhow, Context, Result};
use rewire_runtime::{Trap, Value};
use std::rc::Rc;

/// Interpreter backend.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    options: Options,
}

impl Interpreter {
    pub fn new(options: Options) -> Self {
        Self { options }
    }
}

impl Backend for Interpreter {
    fn compile(&self, mut ir: Ir) -> Result<Rc<dyn Invoke>> {
        if self.options.prune_dead_blocks {
            dead_blocks::eliminate(&mut ir);
        }
        if self.options.verify {
            ir.verify().context("IR failed verification")?;
        }
        Ok(Rc::new(Program::new(ir)))
    }
}

/// A compiled IR.
#[derive(Debug)]
pub struct Program {
    ir: Ir,
    /// Bound to the first entry parameter when the IR was lowered from a
    /// function.
    implicit_self: Option<Value>,
}

impl Program {
    pub fn new(ir: Ir) -> Self {
        let implicit_self = ir.meta.as_ref().map(|m| Value::Func(m.callee));
        Self { ir, implicit_self }
    }

    pub fn ir(&self) -> &Ir {
        &self.ir
    }

    fn run(&self, world: &World, args: &[Value]) -> Result<Value> {
        let mut values = vec![Value::Nothing; self.ir.var_count()];
        let entry: Vec<Value> = self.implicit_self.into_iter().chain(args.iter().copied()).collect();
        for (v, value) in self.ir.entry().params().zip(entry) {
            values[v.index()] = value;
        }

        let mut block = BlockId::ENTRY;
        loop {
            let b = self.ir.block(block)?;
            for (v, st) in b.body() {
                values[v.index()] = match &st.expr {
                    Expr::Operand(op) => operand(world, &values, op)?,
                    Expr::Call { callee, args } => {
                        let f = operand(world, &values, callee)?;
                        let args = args
                            .iter()
                            .map(|a| operand(world, &values, a))
                            .collect::<Result<Vec<_>>>()?;
                        world.call(&f, &args)?
                    }
                };
            }

            let mut taken = None;
            for br in b.branches() {
                if let Some(c) = br.condition {
                    // `br target unless c`: taken only when `c` is false.
                    if values[c.index()].as_bool()? {
                        continue;
                    }
                }
                taken = Some(br);
                break;
            }
            let br = taken.ok_or_else(|| anyhow!("block {} has no branch to take", block))?;

            // Evaluate every argument before binding: a back-edge may pass
            // the target's own parameters.
            let passed = br
                .args
                .iter()
                .map(|a| operand(world, &values, a))
                .collect::<Result<Vec<_>>>()?;
            match br.target {
                Target::Return => {
                    return passed
                        .into_iter()
                        .next()
                        .ok_or_else(|| anyhow!("return branch without a value"));
                }
                Target::Block(t) => {
                    for (p, value) in self.ir.block(t)?.params().zip(passed) {
                        values[p.index()] = value;
                    }
                    block = t;
                }
            }
        }
    }
}

fn operand(world: &World, values: &[Value], op: &Operand) -> Result<Value> {
    Ok(match op {
        Operand::Var(v) => values[v.index()],
        Operand::Const(c) => *c,
        Operand::Global(name) => world.resolve(name)?,
    })
}

impl Invoke for Program {
    fn invoke(&self, world: &World, args: &[Value]) -> Result<Value> {
        let expected = self.arity();
        if args.len() != expected {
            return Err(Trap::ArityMismatch {
                expected,
                got: args.len(),
            }
            .into());
        }
        self.run(world, args)
    }

    fn arity(&self) -> usize {
        let params = self.ir.entry().num_params();
        if self.implicit_self.is_some() {
            params.saturating_sub(1)
        } else {
            params
        }
    }

    fn ir(&self) -> Option<&Ir> {
        Some(&self.ir)
    }
}
