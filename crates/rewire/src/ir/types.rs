//! IR type definitions.
//!
//! These types represent an SSA-form control-flow graph: every statement
//! defines exactly one `Variable`, statements never nest, and control flow
//! is expressed only through branches at the end of a block.

use rewire_runtime::{Type, Value};
use std::fmt;

/// Unique identifier for a variable in SSA form.
///
/// Variables are numbered sequentially per IR (`%0`, `%1`, ...) and are never
/// reused, even after the defining statement is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(pub u32);

impl Variable {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Identifier of a basic block, its position in `Ir::blocks`.
///
/// INVARIANT: `BlockId(0)` is always the entry block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An argument of a statement or branch.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A variable defined by a statement or block parameter.
    Var(Variable),
    /// A literal constant (including function and hook references).
    Const(Value),
    /// A late-bound reference to a named global, resolved at call time.
    Global(String),
}

impl Operand {
    pub fn global(name: impl Into<String>) -> Self {
        Operand::Global(name.into())
    }

    pub fn as_var(&self) -> Option<Variable> {
        match self {
            Operand::Var(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_global(&self, name: &str) -> bool {
        matches!(self, Operand::Global(n) if n == name)
    }
}

impl From<Variable> for Operand {
    fn from(v: Variable) -> Self {
        Operand::Var(v)
    }
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Const(v)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(v) => write!(f, "{}", v),
            Operand::Const(v) => write!(f, "{}", v),
            Operand::Global(name) => write!(f, "{}", name),
        }
    }
}

/// The operation of a statement. Never nested: every argument is an operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `callee(args...)`
    Call { callee: Operand, args: Vec<Operand> },
    /// A plain reference or constant (`%3 = %1`, `%4 = 42`).
    Operand(Operand),
}

impl Expr {
    pub fn call(callee: impl Into<Operand>, args: Vec<Operand>) -> Self {
        Expr::Call {
            callee: callee.into(),
            args,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Expr::Call { .. })
    }

    /// Calls `f` with every operand of this expression (callee first).
    pub fn for_each_operand<F: FnMut(&Operand)>(&self, mut f: F) {
        match self {
            Expr::Call { callee, args } => {
                f(callee);
                for a in args {
                    f(a);
                }
            }
            Expr::Operand(op) => f(op),
        }
    }

    /// Mutable variant of [`Expr::for_each_operand`].
    pub fn for_each_operand_mut<F: FnMut(&mut Operand)>(&mut self, mut f: F) {
        match self {
            Expr::Call { callee, args } => {
                f(callee);
                for a in args {
                    f(a);
                }
            }
            Expr::Operand(op) => f(op),
        }
    }

    /// Calls `f` with every variable read by this expression.
    pub fn for_each_use<F: FnMut(Variable)>(&self, mut f: F) {
        self.for_each_operand(|op| {
            if let Operand::Var(v) = op {
                f(*v);
            }
        });
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Call { callee, args } => {
                write!(f, "{}(", callee)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Expr::Operand(op) => write!(f, "{}", op),
        }
    }
}

/// A single statement: one operation, its result type, and a source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub expr: Expr,
    /// Result type annotation. `Type::Any` unless a producer knows better.
    pub ty: Type,
    /// Index into the IR line table; 0 means "no line information".
    pub line: u32,
}

impl Statement {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            ty: Type::Any,
            line: 0,
        }
    }

    /// `callee(args...)` with default type and no line.
    pub fn call(callee: impl Into<Operand>, args: Vec<Operand>) -> Self {
        Self::new(Expr::call(callee, args))
    }

    /// A statement that just yields `op`.
    pub fn operand(op: impl Into<Operand>) -> Self {
        Self::new(Expr::Operand(op.into()))
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = ty;
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }
}

impl From<Expr> for Statement {
    fn from(expr: Expr) -> Self {
        Statement::new(expr)
    }
}

/// Where a branch transfers control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Block(BlockId),
    /// Leave the function; the branch carries exactly one argument.
    Return,
}

/// One edge of a block terminator.
///
/// Branches are tried in order. A branch with a condition is taken when the
/// condition is `false` (`br 2 unless %3`); a branch without one is always
/// taken.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub target: Target,
    pub condition: Option<Variable>,
    /// Values bound to the target block's parameters, in order.
    pub args: Vec<Operand>,
}

impl Branch {
    pub fn to(target: BlockId, args: Vec<Operand>) -> Self {
        Self {
            target: Target::Block(target),
            condition: None,
            args,
        }
    }

    pub fn ret(value: impl Into<Operand>) -> Self {
        Self {
            target: Target::Return,
            condition: None,
            args: vec![value.into()],
        }
    }

    pub fn unless(mut self, condition: Variable) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }

    pub fn is_return(&self) -> bool {
        self.target == Target::Return
    }

    pub fn target_block(&self) -> Option<BlockId> {
        match self.target {
            Target::Block(b) => Some(b),
            Target::Return => None,
        }
    }

    /// Calls `f` with every variable read by this branch (condition first).
    pub fn for_each_use<F: FnMut(Variable)>(&self, mut f: F) {
        if let Some(c) = self.condition {
            f(c);
        }
        for a in &self.args {
            if let Operand::Var(v) = a {
                f(*v);
            }
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Target::Return => write!(f, "return {}", self.args[0])?,
            Target::Block(b) => {
                write!(f, "br {}", b)?;
                if !self.args.is_empty() {
                    write!(f, " (")?;
                    for (i, a) in self.args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, ")")?;
                }
            }
        }
        if let Some(c) = self.condition {
            write!(f, " unless {}", c)?;
        }
        Ok(())
    }
}

/// A source location in the IR line table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineInfo {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for LineInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_display() {
        assert_eq!(Variable(0).to_string(), "%0");
        assert_eq!(Variable(42).to_string(), "%42");
    }

    #[test]
    fn test_block_id_entry() {
        assert_eq!(BlockId::ENTRY, BlockId(0));
        assert_eq!(BlockId(3).index(), 3);
    }

    #[test]
    fn test_expr_display() {
        let e = Expr::call(
            Operand::global("*"),
            vec![Variable(1).into(), Value::Int(2).into()],
        );
        assert_eq!(e.to_string(), "*(%1, 2)");
        assert_eq!(Expr::Operand(Value::Nothing.into()).to_string(), "nothing");
    }

    #[test]
    fn test_branch_display() {
        let br = Branch::to(BlockId(3), vec![Variable(2).into()]).unless(Variable(3));
        assert_eq!(br.to_string(), "br 3 (%2) unless %3");
        assert_eq!(Branch::to(BlockId(1), vec![]).to_string(), "br 1");
        assert_eq!(Branch::ret(Variable(5)).to_string(), "return %5");
    }

    #[test]
    fn test_uses_skip_non_variables() {
        let e = Expr::call(
            Variable(7),
            vec![Operand::global("x"), Variable(1).into(), Value::Int(1).into()],
        );
        let mut uses = vec![];
        e.for_each_use(|v| uses.push(v));
        assert_eq!(uses, vec![Variable(7), Variable(1)]);

        let br = Branch::to(BlockId(0), vec![Variable(4).into()]).unless(Variable(2));
        let mut uses = vec![];
        br.for_each_use(|v| uses.push(v));
        assert_eq!(uses, vec![Variable(2), Variable(4)]);
    }

    #[test]
    fn test_statement_builders() {
        let st = Statement::call(Operand::global("f"), vec![])
            .with_type(Type::Int)
            .with_line(3);
        assert!(st.expr.is_call());
        assert_eq!(st.ty, Type::Int);
        assert_eq!(st.line, 3);
        assert_eq!(Statement::operand(Variable(1)).ty, Type::Any);
    }
}
