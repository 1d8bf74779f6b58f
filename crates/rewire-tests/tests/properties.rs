//! Property-based tests for IR editing and lowering.
//!
//! Uses proptest to generate random edit sequences and random programs and
//! checks that the IR invariants hold throughout.

use proptest::prelude::*;
use rewire::{BlockId, Ir, Operand, Pipe, Statement, Target, Type, Value, Variable};
use rewire_tests::{call_ints, world_with};

// ── IR edits ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Edit {
    Push,
    InsertBefore(usize),
    InsertAfter(usize),
    Delete(usize),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        Just(Edit::Push),
        any::<usize>().prop_map(Edit::InsertBefore),
        any::<usize>().prop_map(Edit::InsertAfter),
        any::<usize>().prop_map(Edit::Delete),
    ]
}

fn inc(v: Variable) -> Statement {
    Statement::call(Operand::global("+"), vec![v.into(), Value::Int(1).into()])
}

fn apply(ir: &mut Ir, x: Variable, edit: &Edit) {
    let keys = ir.keys();
    let pick = |i: usize| keys.get(i % keys.len().max(1)).copied();
    let _ = match *edit {
        Edit::Push => ir.push(inc(x)).map(|_| ()),
        Edit::InsertBefore(i) => match pick(i) {
            Some(v) => ir.insert_before(v, inc(x)).map(|_| ()),
            None => Ok(()),
        },
        // Reading the anchor is always legal after it.
        Edit::InsertAfter(i) => match pick(i) {
            Some(v) => ir.insert_after(v, inc(v)).map(|_| ()),
            None => Ok(()),
        },
        Edit::Delete(i) => match pick(i) {
            Some(v) => ir.delete(v).map(|_| ()),
            None => Ok(()),
        },
    };
}

proptest! {
    /// Any sequence of edits, successful or rejected, leaves a valid IR.
    #[test]
    fn edits_preserve_validity(edits in prop::collection::vec(edit(), 0..64)) {
        let mut ir = Ir::new();
        let x = ir.add_param(BlockId::ENTRY, Type::Int).unwrap();
        ir.ret(BlockId::ENTRY, x).unwrap();
        for e in &edits {
            let before = ir.to_string();
            apply(&mut ir, x, e);
            prop_assert!(ir.verify().is_ok(), "after {:?}:\n{}\nwas:\n{}", e, ir, before);
        }
        for v in ir.keys() {
            prop_assert!(ir.is_defined(v));
        }
    }

    /// A rejected delete changes nothing.
    #[test]
    fn rejected_delete_is_atomic(n in 1usize..16, i in any::<usize>()) {
        let mut ir = Ir::new();
        let mut acc = ir.add_param(BlockId::ENTRY, Type::Int).unwrap();
        for _ in 0..n {
            acc = ir.push(inc(acc)).unwrap();
        }
        ir.ret(BlockId::ENTRY, acc).unwrap();
        // Every statement of the chain is read by the next one or the return.
        let keys = ir.keys();
        let before = ir.to_string();
        prop_assert!(ir.delete(keys[i % keys.len()]).is_err());
        prop_assert_eq!(ir.to_string(), before);
    }

    /// A pipe that inserts before every statement doubles the statement count
    /// and keeps the original variables in order.
    #[test]
    fn pipe_interleaves(n in 0usize..40) {
        let mut ir = Ir::new();
        let mut acc = ir.add_param(BlockId::ENTRY, Type::Int).unwrap();
        for _ in 0..n {
            acc = ir.push(inc(acc)).unwrap();
        }
        ir.ret(BlockId::ENTRY, acc).unwrap();
        let original = ir.keys();

        let mut pipe = Pipe::new(ir);
        while let Some(v) = pipe.advance() {
            pipe.insert_before(v, Statement::operand(Value::Int(0))).unwrap();
        }
        let ir = pipe.finish().unwrap();
        prop_assert_eq!(ir.len(), 2 * n);
        let kept: Vec<Variable> = ir.keys().into_iter().filter(|v| original.contains(v)).collect();
        prop_assert_eq!(kept, original);
        prop_assert!(ir.verify().is_ok());
    }
}

// ── Lowering ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Arith {
    X,
    Lit(i64),
    Bin(&'static str, Box<Arith>, Box<Arith>),
}

impl Arith {
    fn source(&self) -> String {
        match self {
            Arith::X => "x".to_string(),
            Arith::Lit(v) if *v < 0 => format!("({})", v),
            Arith::Lit(v) => v.to_string(),
            Arith::Bin(op, a, b) => format!("({} {} {})", a.source(), op, b.source()),
        }
    }

    fn eval(&self, x: i64) -> i64 {
        match self {
            Arith::X => x,
            Arith::Lit(v) => *v,
            Arith::Bin(op, a, b) => {
                let (a, b) = (a.eval(x), b.eval(x));
                match *op {
                    "+" => a.wrapping_add(b),
                    "-" => a.wrapping_sub(b),
                    _ => a.wrapping_mul(b),
                }
            }
        }
    }
}

fn arith() -> impl Strategy<Value = Arith> {
    let leaf = prop_oneof![Just(Arith::X), (-10i64..10).prop_map(Arith::Lit)];
    leaf.prop_recursive(4, 16, 2, |inner| {
        (prop_oneof![Just("+"), Just("-"), Just("*")], inner.clone(), inner)
            .prop_map(|(op, a, b)| Arith::Bin(op, Box::new(a), Box::new(b)))
    })
}

#[derive(Debug, Clone)]
enum Program {
    Assign(&'static str, &'static str, &'static str),
    If(&'static str, Vec<Program>, Option<Vec<Program>>),
    While(&'static str, Vec<Program>),
}

const VARS: [&str; 3] = ["a", "b", "s"];

fn name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(VARS.to_vec())
}

fn program() -> impl Strategy<Value = Program> {
    let assign = (name(), name(), name()).prop_map(|(d, l, r)| Program::Assign(d, l, r));
    assign.prop_recursive(3, 24, 3, |inner| {
        let body = prop::collection::vec(inner, 1..3);
        prop_oneof![
            (name(), body.clone(), prop::option::of(body.clone()))
                .prop_map(|(c, t, e)| Program::If(c, t, e)),
            (name(), body).prop_map(|(c, b)| Program::While(c, b)),
        ]
    })
}

fn render(stmts: &[Program], out: &mut String) {
    for st in stmts {
        match st {
            Program::Assign(d, l, r) => out.push_str(&format!("{} = {} + {}\n", d, l, r)),
            Program::If(c, t, e) => {
                out.push_str(&format!("if {} < s {{\n", c));
                render(t, out);
                out.push('}');
                if let Some(e) = e {
                    out.push_str(" else {\n");
                    render(e, out);
                    out.push('}');
                }
                out.push('\n');
            }
            Program::While(c, b) => {
                out.push_str(&format!("while {} < s {{\n", c));
                render(b, out);
                out.push_str("}\n");
            }
        }
    }
}

proptest! {
    /// Straight-line arithmetic evaluates like the host would.
    #[test]
    fn arithmetic_matches_host(e in arith(), x in -10i64..10) {
        let world = world_with(&format!("fn f(x) {{ {} }}", e.source()));
        prop_assert_eq!(call_ints(&world, "f", &[x]).unwrap(), Value::Int(e.eval(x)));
    }

    /// Every lowered branch passes exactly as many arguments as its target
    /// takes, and the lowered IR verifies.
    #[test]
    fn lowering_balances_branch_arity(body in prop::collection::vec(program(), 1..5)) {
        let mut src = String::from("fn f(a, b) {\ns = 0\n");
        render(&body, &mut src);
        src.push_str("return s\n}\n");
        let world = world_with(&src);
        let ir = world.code_ir(world.func_id("f").unwrap()).unwrap();
        for block in ir.blocks() {
            for br in block.branches() {
                let expected = match br.target {
                    Target::Block(t) => ir.block(t).unwrap().num_params(),
                    Target::Return => 1,
                };
                prop_assert_eq!(br.args.len(), expected, "in\n{}\nfrom\n{}", ir, src);
            }
        }
        prop_assert!(ir.verify().is_ok(), "{}", ir);
        prop_assert_eq!(ir.entry().num_params(), 3);
    }
}
