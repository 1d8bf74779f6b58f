//! The source language: a small structured language whose functions are the
//! source-level bodies lowered into IR.
//!
//! ```text
//! fn pow(x, n) {
//!   r = 1
//!   while n > 0 {
//!     n = n - 1
//!     r = r * x
//!   }
//!   return r
//! }
//! ```
//!
//! Operators desugar to calls of globals named by the operator, so `a * b`
//! is `*(a, b)` and unary minus is `neg(a)`.

pub mod ast;
mod lexer;
mod parser;

pub use ast::{Expr, FunctionDef, Stmt, StmtKind};
pub use parser::parse_program;
