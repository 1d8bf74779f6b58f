//! Shared fixtures for the rewire end-to-end tests.

use anyhow::Result;
use rewire::dynamo::{Dynamo, Pattern, SigPattern, TransformCx};
use rewire::{BlockId, HookId, Ir, Operand, Statement, Type, Value, World};

/// A world with the prelude and the given source defined.
pub fn world_with(src: &str) -> World {
    let world = World::new();
    if let Err(e) = world.define(src) {
        panic!("fixture source failed to define: {e:#}");
    }
    world
}

/// Call global `name` with integer arguments.
pub fn call_ints(world: &World, name: &str, args: &[i64]) -> Result<Value> {
    let args: Vec<Value> = args.iter().copied().map(Value::Int).collect();
    world.call_global(name, &args)
}

/// Call `callee` through `hook` with integer arguments.
pub fn call_hooked(world: &World, hook: HookId, callee: &str, args: &[i64]) -> Result<Value> {
    let mut all = vec![world.resolve(callee)?];
    all.extend(args.iter().copied().map(Value::Int));
    world.call(&Value::Hook(hook), &all)
}

/// `fn(x) = x * x` built by hand: `0: (%0)  %1 = *(%0, %0)  return %1`.
pub fn square_ir() -> Ir {
    let mut ir = Ir::new();
    let x = ir
        .add_param(BlockId::ENTRY, Type::Any)
        .expect("entry block exists");
    let y = ir
        .push(Statement::call(Operand::global("*"), vec![x.into(), x.into()]))
        .expect("operands are defined");
    ir.ret(BlockId::ENTRY, y).expect("return arity is one");
    ir
}

/// A hook that recurses into every call and, when it intercepts `*` on
/// numbers, adds instead.
pub fn mul_becomes_add(world: &World) -> HookId {
    let mul = world.func_id("*").expect("prelude defines `*`");
    let hook = Dynamo::builder("mul_to_add")
        .transform_fn(SigPattern::any(), |cx: &mut TransformCx<'_>, mut ir: Ir| {
            cx.recurse(&mut ir);
            Ok(Some(ir))
        })
        .native(
            SigPattern::exact(vec![
                Pattern::Exact(Type::Func(mul)),
                Pattern::Number,
                Pattern::Number,
            ]),
            |world: &World, args: &[Value]| world.call_global("+", &args[1..]),
        )
        .build();
    world.register_hook(hook)
}

/// A hook whose transform hands the IR back unchanged, without recursion.
pub fn passthrough(world: &World) -> HookId {
    world.register_hook(Dynamo::new("passthrough", |_: &mut TransformCx<'_>, ir: Ir| {
        Ok(Some(ir))
    }))
}

/// A hook whose transform rewrites every reference to `*` into `+`,
/// optionally routing the calls it leaves behind back through itself.
pub fn mul_refs_to_add(world: &World, recurse: bool) -> HookId {
    world.register_hook(Dynamo::new(
        "mul_refs_to_add",
        move |cx: &mut TransformCx<'_>, mut ir: Ir| {
            ir.rewrite_refs(|op| op.is_global("*").then(|| Operand::global("+")))?;
            if recurse {
                cx.recurse(&mut ir);
            }
            Ok(Some(ir))
        },
    ))
}
