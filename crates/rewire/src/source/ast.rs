//! Syntax tree of the source language.

use rewire_runtime::Value;
use std::collections::BTreeSet;

/// `fn name(params) { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    /// Line of the `fn` keyword.
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign(String, Expr),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return(Expr),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Lit(Value),
    /// Operators are calls of the global named by the operator.
    Call(Box<Expr>, Vec<Expr>),
    /// `cond ? then : else`
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn call(callee: &str, args: Vec<Expr>) -> Self {
        Expr::Call(Box::new(Expr::Name(callee.to_string())), args)
    }

    /// Names read by this expression.
    pub fn collect_reads(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Name(n) => {
                out.insert(n.clone());
            }
            Expr::Lit(_) => {}
            Expr::Call(callee, args) => {
                callee.collect_reads(out);
                for a in args {
                    a.collect_reads(out);
                }
            }
            Expr::Cond(c, t, e) => {
                c.collect_reads(out);
                t.collect_reads(out);
                e.collect_reads(out);
            }
        }
    }
}
