//! Name-level read/write sets used to decide which bindings cross block
//! boundaries.
//!
//! These are over-approximations: every name read anywhere in a statement
//! list counts as live, reassignments do not kill. A binding that is not
//! actually read only costs an extra block parameter.

use crate::source::{Stmt, StmtKind};
use std::collections::BTreeSet;

/// Names read by `stmts`, including nested bodies and conditions.
pub fn reads(stmts: &[Stmt]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for st in stmts {
        collect_reads(st, &mut out);
    }
    out
}

fn collect_reads(st: &Stmt, out: &mut BTreeSet<String>) {
    match &st.kind {
        StmtKind::Assign(_, e) | StmtKind::Return(e) | StmtKind::Expr(e) => e.collect_reads(out),
        StmtKind::If {
            cond,
            then_body,
            else_body,
        } => {
            cond.collect_reads(out);
            for s in then_body {
                collect_reads(s, out);
            }
            for s in else_body.iter().flatten() {
                collect_reads(s, out);
            }
        }
        StmtKind::While { cond, body } => {
            cond.collect_reads(out);
            for s in body {
                collect_reads(s, out);
            }
        }
    }
}

/// Names assigned anywhere in `stmts`.
pub fn assigned(stmts: &[Stmt]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for st in stmts {
        collect_assigned(st, &mut out);
    }
    out
}

fn collect_assigned(st: &Stmt, out: &mut BTreeSet<String>) {
    match &st.kind {
        StmtKind::Assign(name, _) => {
            out.insert(name.clone());
        }
        StmtKind::If {
            then_body,
            else_body,
            ..
        } => {
            for s in then_body.iter().chain(else_body.iter().flatten()) {
                collect_assigned(s, out);
            }
        }
        StmtKind::While { body, .. } => {
            for s in body {
                collect_assigned(s, out);
            }
        }
        StmtKind::Return(_) | StmtKind::Expr(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::parse_program;

    fn body(src: &str) -> Vec<Stmt> {
        parse_program(src).unwrap().remove(0).body
    }

    #[test]
    fn reads_cover_nested_bodies() {
        let b = body("fn f(x) { if a { y = b } else { z = c(d) } while e { w = w + 1 } }");
        let r: Vec<String> = reads(&b).into_iter().collect();
        assert_eq!(r, vec!["+", "a", "b", "c", "d", "e", "w"]);
    }

    #[test]
    fn assigned_covers_nested_bodies() {
        let b = body("fn f(x) { x = 1 if x { y = 2 } while x { z = 3 } }");
        let a: Vec<String> = assigned(&b).into_iter().collect();
        assert_eq!(a, vec!["x", "y", "z"]);
    }
}
