//! Hooks intercepting calls, transforming callee IR and memoizing the result.

use rewire::dynamo::{Dynamo, Pattern, SigPattern, Transform, TransformCx};
use rewire::{Ir, IrError, Operand, Result, Signature, Trap, Type, Value, World};
use rewire_tests::{call_hooked, mul_becomes_add, mul_refs_to_add, passthrough, world_with};
use std::cell::Cell;
use std::rc::Rc;

const PROD: &str = "fn prod(a, b) { a * b }";
const WRAPPED: &str = "fn prod(a, b) { a * b }\nfn wrapped(a, b) { prod(a, b) }";

#[test]
fn test_direct_call_is_untransformed() {
    let world = world_with(PROD);
    mul_becomes_add(&world);
    let out = world
        .call_global("prod", &[Value::Int(5), Value::Int(10)])
        .unwrap();
    assert_eq!(out, Value::Int(50));
}

#[test]
fn test_recursive_hook_overrides_primitive() {
    let world = world_with(PROD);
    let hook = mul_becomes_add(&world);
    assert_eq!(call_hooked(&world, hook, "prod", &[5, 10]).unwrap(), Value::Int(15));
}

#[test]
fn test_hook_reaches_nested_calls() {
    let world = world_with("fn sq(x) { x * x }\nfn f(x) { sq(x) + 1 }");
    let hook = mul_becomes_add(&world);
    // sq(4) becomes 4 + 4.
    assert_eq!(call_hooked(&world, hook, "f", &[4]).unwrap(), Value::Int(9));
    assert_eq!(rewire_tests::call_ints(&world, "f", &[4]).unwrap(), Value::Int(17));
}

#[test]
fn test_passthrough_without_recursion() {
    let world = world_with(PROD);
    let hook = passthrough(&world);
    assert_eq!(call_hooked(&world, hook, "prod", &[5, 10]).unwrap(), Value::Int(50));
}

#[test]
fn test_hook_callable_from_source() {
    let world = world_with(PROD);
    mul_becomes_add(&world);
    world.define("fn main() { mul_to_add(prod, 2, 3) }").unwrap();
    assert_eq!(world.call_global("main", &[]).unwrap(), Value::Int(5));
}

/// Counts intercepted calls to `sq`.
#[derive(Default)]
struct CountSquares {
    count: Rc<Cell<usize>>,
}

impl Transform for CountSquares {
    fn transform(&self, cx: &mut TransformCx<'_>, mut ir: Ir) -> Result<Option<Ir>> {
        cx.recurse(&mut ir);
        let sq = cx.world().func_id("sq").map(Type::Func);
        if sq.is_some() && cx.signature().callee() == sq {
            let count = Rc::clone(&self.count);
            // Each compiled `sq` bumps the counter on entry.
            let id = cx
                .world()
                .define_native("__count_sq", move |_: &World, _: &[Value]| {
                    count.set(count.get() + 1);
                    Ok(Value::Nothing)
                })?;
            ir.prepend(rewire::Statement::call(Operand::Const(Value::Func(id)), vec![]))?;
        }
        Ok(Some(ir))
    }
}

#[test]
fn test_stateful_transform_counts_calls() {
    let world = world_with("fn sq(x) { x * x }\nfn f(x) { sq(x) + sq(x + 1) }");
    let counter = CountSquares::default();
    let count = Rc::clone(&counter.count);
    let hook = world.register_hook(
        Dynamo::builder("count")
            .transform(SigPattern::any(), Rc::new(counter))
            .build(),
    );
    // 3 * 3 + 4 * 4
    assert_eq!(call_hooked(&world, hook, "f", &[3]).unwrap(), Value::Int(25));
    assert_eq!(count.get(), 2);
    assert_eq!(call_hooked(&world, hook, "f", &[3]).unwrap(), Value::Int(25));
    assert_eq!(count.get(), 4, "cached units keep counting");
}

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("transform refused {0}")]
struct Refused(String);

#[test]
fn test_transform_error_propagates_unchanged() {
    let world = world_with(PROD);
    let hook = world.register_hook(Dynamo::new("refuse", |cx: &mut TransformCx<'_>, _: Ir| {
        Err(Refused(cx.signature().to_string()).into())
    }));
    let err = call_hooked(&world, hook, "prod", &[1, 2]).unwrap_err();
    let prod = world.func_id("prod").unwrap();
    assert_eq!(
        err.downcast_ref::<Refused>(),
        Some(&Refused(format!("(typeof({}), Int, Int)", prod)))
    );
    // Nothing was cached for the failed signature.
    assert_eq!(world.hook(hook).unwrap().cache_len(), 0);
}

#[test]
fn test_trap_inside_transformed_code_propagates() {
    let world = world_with("fn div(a, b) { a / b }");
    let hook = passthrough(&world);
    let err = call_hooked(&world, hook, "div", &[1, 0]).unwrap_err();
    assert_eq!(err.downcast_ref::<Trap>(), Some(&Trap::DivisionByZero));
}

#[test]
fn test_cached_unit_is_reused() {
    let world = world_with(PROD);
    let hook = passthrough(&world);
    let prod = world.resolve("prod").unwrap();
    let sig = Signature::of(&[prod, Value::Int(0), Value::Int(0)]);
    let h = world.hook(hook).unwrap();

    call_hooked(&world, hook, "prod", &[2, 3]).unwrap();
    let first = h.cached_unit(&sig).unwrap();
    call_hooked(&world, hook, "prod", &[4, 5]).unwrap();
    let second = h.cached_unit(&sig).unwrap();
    assert!(Rc::ptr_eq(&first, &second));

    // A new argument type is a new signature.
    world
        .call(&Value::Hook(hook), &[prod, Value::Float(1.5), Value::Int(2)])
        .unwrap();
    assert_eq!(h.cache_len(), 2);
}

#[test]
fn test_transform_runs_once_per_signature() {
    let world = world_with(PROD);
    let runs = Rc::new(Cell::new(0));
    let seen = Rc::clone(&runs);
    let hook = world.register_hook(Dynamo::new("once", move |_: &mut TransformCx<'_>, ir: Ir| {
        seen.set(seen.get() + 1);
        Ok(Some(ir))
    }));
    for i in 0..5 {
        call_hooked(&world, hook, "prod", &[i, i]).unwrap();
    }
    assert_eq!(runs.get(), 1);
}

#[test]
fn test_most_specific_rule_wins() {
    let world = world_with(PROD);
    let prod = world.func_id("prod").unwrap();
    let hook = world.register_hook(
        Dynamo::builder("pick")
            .native(SigPattern::variadic(vec![Pattern::Callable], Pattern::Any), |_: &World, _: &[Value]| {
                Ok(Value::Int(1))
            })
            .native(
                SigPattern::exact(vec![Pattern::Exact(Type::Func(prod)), Pattern::Number, Pattern::Number]),
                |_: &World, _: &[Value]| Ok(Value::Int(2)),
            )
            .native(
                SigPattern::exact(vec![Pattern::Callable, Pattern::Any, Pattern::Any]),
                |_: &World, _: &[Value]| Ok(Value::Int(3)),
            )
            .build(),
    );
    assert_eq!(call_hooked(&world, hook, "prod", &[1, 1]).unwrap(), Value::Int(2));
    let prod = Value::Func(prod);
    assert_eq!(
        world.call(&Value::Hook(hook), &[prod, Value::Bool(true), Value::Int(1)]).unwrap(),
        Value::Int(3)
    );
    assert_eq!(world.call(&Value::Hook(hook), &[prod]).unwrap(), Value::Int(1));
}

#[test]
fn test_unmatched_signature_is_a_lookup_error() {
    let world = world_with(PROD);
    let hook = world.register_hook(
        Dynamo::builder("floats")
            .transform_fn(
                SigPattern::variadic(vec![Pattern::Callable], Pattern::Exact(Type::Float)),
                |_: &mut TransformCx<'_>, ir: Ir| Ok(Some(ir)),
            )
            .build(),
    );
    let err = call_hooked(&world, hook, "prod", &[1, 2]).unwrap_err();
    let err = err.downcast_ref::<IrError>().unwrap();
    assert!(err.is_lookup());
    assert!(err.to_string().contains("floats"));
}

#[test]
fn test_hooking_a_hook_calls_it_directly() {
    let world = world_with(PROD);
    let inner = mul_becomes_add(&world);
    let outer = passthrough(&world);
    let prod = world.resolve("prod").unwrap();
    let out = world
        .call(
            &Value::Hook(outer),
            &[Value::Hook(inner), prod, Value::Int(5), Value::Int(10)],
        )
        .unwrap();
    assert_eq!(out, Value::Int(15));
}

#[test]
fn test_empty_hook_call_traps() {
    let world = World::new();
    let hook = passthrough(&world);
    let err = world.call(&Value::Hook(hook), &[]).unwrap_err();
    assert_eq!(
        err.downcast_ref::<Trap>(),
        Some(&Trap::ArityMismatch { expected: 1, got: 0 })
    );
}

#[test]
fn test_rewritten_refs_with_recursion() {
    let world = world_with(WRAPPED);
    let hook = mul_refs_to_add(&world, true);
    assert_eq!(call_hooked(&world, hook, "prod", &[5, 10]).unwrap(), Value::Int(15));
    assert_eq!(call_hooked(&world, hook, "wrapped", &[5, 10]).unwrap(), Value::Int(15));
    // Plain calls still multiply.
    assert_eq!(rewire_tests::call_ints(&world, "wrapped", &[5, 10]).unwrap(), Value::Int(50));
}

#[test]
fn test_rewritten_refs_without_recursion_stop_at_the_callee() {
    let world = world_with(WRAPPED);
    let hook = mul_refs_to_add(&world, false);
    assert_eq!(call_hooked(&world, hook, "prod", &[5, 10]).unwrap(), Value::Int(15));
    // `wrapped` has no `*` of its own and `prod` runs untransformed.
    assert_eq!(call_hooked(&world, hook, "wrapped", &[5, 10]).unwrap(), Value::Int(50));
}

#[test]
fn test_transformed_ir_shows_the_rewritten_body() {
    let world = world_with(PROD);
    let hook = mul_refs_to_add(&world, true);
    let prod = world.resolve("prod").unwrap();
    let sig = Signature::of(&[prod, Value::Int(5), Value::Int(10)]);

    let ir = world.transformed_ir(hook, &sig).unwrap().expect("prod has IR");
    assert_eq!(
        ir.to_string(),
        format!("0: (%0, %1, %2)\n  %3 = hook#{}(+, %1, %2)\n  return %3\n", hook.0)
    );
    // Inspecting compiles into the cache; the later call reuses it.
    let h = world.hook(hook).unwrap();
    assert!(h.cached(&sig));
    assert_eq!(call_hooked(&world, hook, "prod", &[5, 10]).unwrap(), Value::Int(15));
    assert_eq!(h.cache_len(), 2, "prod plus the intercepted `+`");
}

#[test]
fn test_transformed_ir_is_absent_for_natives() {
    let world = world_with(PROD);
    let hook = mul_becomes_add(&world);
    let mul = world.resolve("*").unwrap();
    let plus = world.resolve("+").unwrap();
    let h = world.hook(hook).unwrap();

    // A native rule intercepts `*` on numbers.
    let native = Signature::of(&[mul, Value::Int(1), Value::Int(2)]);
    assert!(h.code_ir(&world, hook, &native).unwrap().is_none());
    // `+` has no IR to transform.
    let direct = Signature::of(&[plus, Value::Int(1), Value::Int(2)]);
    assert!(world.transformed_ir(hook, &direct).unwrap().is_none());
}
