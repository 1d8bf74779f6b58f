//! Primitive operators over `Value`.
//!
//! ## Numeric promotion
//!
//! `Int op Int` stays integral and uses wrapping arithmetic (no overflow
//! panics in debug builds). Any mix of `Int` and `Float` promotes to `Float`.
//! Everything else traps with `TypeMismatch`.
//!
//! ## Integer division / remainder
//!
//! `checked_div` / `checked_rem` return `None` for both divide-by-zero and
//! `i64::MIN / -1`; both trap with `DivisionByZero`.
//!
//! These are the bodies of the prelude natives (`+`, `*`, `<`, ...). They
//! carry no source IR, so the metadata provider reports them as unsupported
//! and hooks run them directly.

use crate::{Trap, TrapResult, Value};

/// A primitive binary operator.
pub type BinaryOp = fn(&Value, &Value) -> TrapResult<Value>;

/// A primitive unary operator.
pub type UnaryOp = fn(&Value) -> TrapResult<Value>;

/// Binary primitives by global name.
pub const BINARY: &[(&str, BinaryOp)] = &[
    ("+", add),
    ("-", sub),
    ("*", mul),
    ("/", div),
    ("%", rem),
    ("<", lt),
    ("<=", le),
    (">", gt),
    (">=", ge),
    ("==", eq),
    ("!=", ne),
];

/// Unary primitives by global name.
pub const UNARY: &[(&str, UnaryOp)] = &[("neg", neg), ("!", not)];

enum Numeric {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numeric(op: &'static str, lhs: &Value, rhs: &Value) -> TrapResult<Numeric> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Numeric::Ints(*a, *b)),
        (Value::Int(a), Value::Float(b)) => Ok(Numeric::Floats(*a as f64, *b)),
        (Value::Float(a), Value::Int(b)) => Ok(Numeric::Floats(*a, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(Numeric::Floats(*a, *b)),
        _ => Err(Trap::TypeMismatch {
            op,
            lhs: lhs.type_of(),
            rhs: rhs.type_of(),
        }),
    }
}

// ── Arithmetic ───────────────────────────────────────────────────────────────

pub fn add(lhs: &Value, rhs: &Value) -> TrapResult<Value> {
    Ok(match numeric("+", lhs, rhs)? {
        Numeric::Ints(a, b) => Value::Int(a.wrapping_add(b)),
        Numeric::Floats(a, b) => Value::Float(a + b),
    })
}

pub fn sub(lhs: &Value, rhs: &Value) -> TrapResult<Value> {
    Ok(match numeric("-", lhs, rhs)? {
        Numeric::Ints(a, b) => Value::Int(a.wrapping_sub(b)),
        Numeric::Floats(a, b) => Value::Float(a - b),
    })
}

pub fn mul(lhs: &Value, rhs: &Value) -> TrapResult<Value> {
    Ok(match numeric("*", lhs, rhs)? {
        Numeric::Ints(a, b) => Value::Int(a.wrapping_mul(b)),
        Numeric::Floats(a, b) => Value::Float(a * b),
    })
}

/// Integer division truncates toward zero; float division follows IEEE 754.
pub fn div(lhs: &Value, rhs: &Value) -> TrapResult<Value> {
    match numeric("/", lhs, rhs)? {
        Numeric::Ints(a, b) => a
            .checked_div(b)
            .map(Value::Int)
            .ok_or(Trap::DivisionByZero),
        Numeric::Floats(a, b) => Ok(Value::Float(a / b)),
    }
}

pub fn rem(lhs: &Value, rhs: &Value) -> TrapResult<Value> {
    match numeric("%", lhs, rhs)? {
        Numeric::Ints(a, b) => a
            .checked_rem(b)
            .map(Value::Int)
            .ok_or(Trap::DivisionByZero),
        Numeric::Floats(a, b) => Ok(Value::Float(a % b)),
    }
}

// ── Comparisons ──────────────────────────────────────────────────────────────

fn compare(
    op: &'static str,
    lhs: &Value,
    rhs: &Value,
    ints: fn(&i64, &i64) -> bool,
    floats: fn(&f64, &f64) -> bool,
) -> TrapResult<Value> {
    Ok(Value::Bool(match numeric(op, lhs, rhs)? {
        Numeric::Ints(a, b) => ints(&a, &b),
        Numeric::Floats(a, b) => floats(&a, &b),
    }))
}

pub fn lt(lhs: &Value, rhs: &Value) -> TrapResult<Value> {
    compare("<", lhs, rhs, i64::lt, f64::lt)
}

pub fn le(lhs: &Value, rhs: &Value) -> TrapResult<Value> {
    compare("<=", lhs, rhs, i64::le, f64::le)
}

pub fn gt(lhs: &Value, rhs: &Value) -> TrapResult<Value> {
    compare(">", lhs, rhs, i64::gt, f64::gt)
}

pub fn ge(lhs: &Value, rhs: &Value) -> TrapResult<Value> {
    compare(">=", lhs, rhs, i64::ge, f64::ge)
}

/// Equality is total: numbers compare after promotion, other values
/// compare structurally, values of unrelated types are unequal.
pub fn eq(lhs: &Value, rhs: &Value) -> TrapResult<Value> {
    Ok(Value::Bool(values_equal(lhs, rhs)))
}

pub fn ne(lhs: &Value, rhs: &Value) -> TrapResult<Value> {
    Ok(Value::Bool(!values_equal(lhs, rhs)))
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match numeric("==", lhs, rhs) {
        Ok(Numeric::Ints(a, b)) => a == b,
        Ok(Numeric::Floats(a, b)) => a == b,
        Err(_) => lhs == rhs,
    }
}

// ── Unary ────────────────────────────────────────────────────────────────────

pub fn neg(operand: &Value) -> TrapResult<Value> {
    match operand {
        Value::Int(v) => Ok(Value::Int(v.wrapping_neg())),
        Value::Float(v) => Ok(Value::Float(-v)),
        other => Err(Trap::UnaryTypeMismatch {
            op: "neg",
            operand: other.type_of(),
        }),
    }
}

pub fn not(operand: &Value) -> TrapResult<Value> {
    match operand {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        other => Err(Trap::UnaryTypeMismatch {
            op: "!",
            operand: other.type_of(),
        }),
    }
}
