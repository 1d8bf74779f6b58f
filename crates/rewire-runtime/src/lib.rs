//! `rewire-runtime`: runtime values for evaluating rewire IR.
//!
//! This crate provides:
//! - `Value` / `Type`: the dynamically typed values flowing through IR and
//!   the type tags used to build call signatures
//! - `Trap` / `TrapResult<T>` for evaluation failures
//! - `ops`: the primitive operators installed in every world's prelude

use std::fmt;

pub mod ops;

/// Identity of a function registered in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

/// Identity of a hook (dynamo) registered in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(pub u32);

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook#{}", self.0)
    }
}

/// A runtime value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    /// The absent value, also used to back-fill new block parameters.
    #[default]
    Nothing,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Reference to a registered function (source or native).
    Func(FuncId),
    /// Reference to a registered hook.
    Hook(HookId),
}

impl Value {
    /// The dispatch type of this value.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Nothing => Type::Nothing,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Func(id) => Type::Func(*id),
            Value::Hook(id) => Type::Hook(*id),
        }
    }

    /// Returns the boolean payload, trapping for any other value.
    pub fn as_bool(&self) -> TrapResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(Trap::NotBoolean(other.type_of())),
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Func(_) | Value::Hook(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => write!(f, "nothing"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            // Keep a decimal point so floats stay distinguishable from ints.
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{:.1}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Func(id) => write!(f, "{}", id),
            Value::Hook(id) => write!(f, "{}", id),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Type tags: the element type of call signatures and statement annotations.
///
/// Every function and hook has its own singleton type, so a signature like
/// `(Func(prod), Int, Int)` pins down both the callee and its argument types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Type {
    /// Unknown / not inferred. The default annotation of a statement.
    #[default]
    Any,
    Nothing,
    Bool,
    Int,
    Float,
    Func(FuncId),
    Hook(HookId),
}

impl Type {
    pub fn is_number(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Type::Func(_) | Type::Hook(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "Any"),
            Type::Nothing => write!(f, "Nothing"),
            Type::Bool => write!(f, "Bool"),
            Type::Int => write!(f, "Int"),
            Type::Float => write!(f, "Float"),
            Type::Func(id) => write!(f, "typeof({})", id),
            Type::Hook(id) => write!(f, "typeof({})", id),
        }
    }
}

/// Evaluation errors raised while running IR or primitives.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Trap {
    /// An operator was applied to operands it does not support.
    #[error("`{op}` is not defined for ({lhs}, {rhs})")]
    TypeMismatch {
        op: &'static str,
        lhs: Type,
        rhs: Type,
    },
    /// A unary operator was applied to an operand it does not support.
    #[error("`{op}` is not defined for {operand}")]
    UnaryTypeMismatch { op: &'static str, operand: Type },
    /// Integer division or remainder by zero.
    #[error("integer division by zero")]
    DivisionByZero,
    /// A callable received the wrong number of arguments.
    #[error("expected {expected} argument(s), got {got}")]
    ArityMismatch { expected: usize, got: usize },
    /// A global reference names nothing registered in the world.
    #[error("undefined global `{0}`")]
    UndefinedGlobal(String),
    /// Something other than a function or hook was called.
    #[error("value of type {0} is not callable")]
    NotCallable(Type),
    /// A branch condition did not evaluate to a boolean.
    #[error("branch condition must be Bool, got {0}")]
    NotBoolean(Type),
    /// The configured maximum call depth was exceeded.
    #[error("maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),
}

/// Result type for evaluation, `Result<T, Trap>`.
pub type TrapResult<T> = Result<T, Trap>;
