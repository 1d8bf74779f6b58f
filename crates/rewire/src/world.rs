//! The host world: function registry, metadata provider and call entry point.
//!
//! A [`World`] owns every function and hook that IR can reference. Source
//! functions carry a body the metadata provider can hand out; native
//! functions (including the prelude operators) do not, so hooks run them
//! directly.

use crate::backend::{Backend, Interpreter, Invoke};
use crate::dynamo::Dynamo;
use crate::error::IrError;
use crate::ir::Ir;
use crate::lower::lower;
use crate::source::{parse_program, FunctionDef};
use crate::Options;
use anyhow::{bail, Result};
use rewire_runtime::{ops, FuncId, HookId, Trap, Type, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

// ── Signatures and metadata ──────────────────────────────────────────────────

/// The types of a call's arguments, callee first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub types: Vec<Type>,
}

impl Signature {
    pub fn new(types: Vec<Type>) -> Self {
        Self { types }
    }

    /// The signature of calling `args[0]` with `args[1..]`.
    pub fn of(args: &[Value]) -> Self {
        Self::new(args.iter().map(Value::type_of).collect())
    }

    pub fn callee(&self) -> Option<Type> {
        self.types.first().copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, t) in self.types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", t)?;
        }
        write!(f, ")")
    }
}

/// Provenance of a lowered IR: which function, from where, for which call.
#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub callee: FuncId,
    pub name: String,
    pub file: String,
    pub def: Rc<FunctionDef>,
    pub signature: Signature,
}

/// Supplies the source-level body of a call signature.
pub trait MetadataProvider {
    /// Metadata for `signature`, or [`IrError::Unsupported`] when there is
    /// no source body (natives, hooks, non-callables, arity mismatch).
    ///
    /// Repeated calls return equal results until the callee is redefined.
    fn meta(&self, signature: &Signature) -> Result<Meta, IrError>;
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// A native function: receives the world and the call arguments.
pub type NativeFn = Rc<dyn Fn(&World, &[Value]) -> Result<Value>>;

/// The primitive operators as natives, binary then unary.
fn prelude() -> impl Iterator<Item = (&'static str, NativeFn)> {
    let binary = ops::BINARY.iter().map(|&(name, op)| {
        let f: NativeFn = Rc::new(move |_: &World, args: &[Value]| match args {
            [a, b] => Ok(op(a, b)?),
            _ => Err(Trap::ArityMismatch {
                expected: 2,
                got: args.len(),
            }
            .into()),
        });
        (name, f)
    });
    let unary = ops::UNARY.iter().map(|&(name, op)| {
        let f: NativeFn = Rc::new(move |_: &World, args: &[Value]| match args {
            [a] => Ok(op(a)?),
            _ => Err(Trap::ArityMismatch {
                expected: 1,
                got: args.len(),
            }
            .into()),
        });
        (name, f)
    });
    binary.chain(unary)
}

enum Body {
    Source { def: Rc<FunctionDef>, file: String },
    Native(NativeFn),
}

struct Function {
    name: String,
    body: Body,
}

/// Decrements the call depth when a call returns (or unwinds with an error).
struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// The registry of functions and hooks, and the entry point for calls.
///
/// All state sits behind `RefCell`/`Cell`: a world is shared by `&`
/// reference through arbitrarily deep re-entrant calls. No borrow is held
/// while user code (natives, transforms, compiled units) runs.
pub struct World {
    functions: RefCell<Vec<Rc<Function>>>,
    hooks: RefCell<Vec<Rc<Dynamo>>>,
    globals: RefCell<HashMap<String, Value>>,
    /// Untransformed compiled bodies for direct calls.
    compiled: RefCell<HashMap<FuncId, Rc<dyn Invoke>>>,
    backend: Rc<dyn Backend>,
    options: Options,
    depth: Cell<usize>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// A world with default options and the prelude operators installed.
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    /// A world with the prelude operators installed.
    pub fn with_options(options: Options) -> Self {
        let world = Self::bare(options);
        // Nothing is bound yet, so no operator can collide with a hook.
        for (name, f) in prelude() {
            world.push_function(name, Body::Native(f));
        }
        world
    }

    /// A world with nothing registered.
    pub fn bare(options: Options) -> Self {
        Self {
            functions: RefCell::new(Vec::new()),
            hooks: RefCell::new(Vec::new()),
            globals: RefCell::new(HashMap::new()),
            compiled: RefCell::new(HashMap::new()),
            backend: Rc::new(Interpreter::new(options.clone())),
            options,
            depth: Cell::new(0),
        }
    }

    /// Replace the backend used to compile IR.
    pub fn with_backend(mut self, backend: Rc<dyn Backend>) -> Self {
        self.backend = backend;
        self.compiled.borrow_mut().clear();
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Register the primitive operators of [`rewire_runtime::ops`] as natives.
    ///
    /// Fails if an operator name is already bound to a hook.
    pub fn install_prelude(&self) -> Result<()> {
        for (name, f) in prelude() {
            self.install(name, Body::Native(f))?;
        }
        Ok(())
    }

    // ── Definitions ──────────────────────────────────────────────────────

    /// Define every function in `src`. See [`World::define_file`].
    pub fn define(&self, src: &str) -> Result<Vec<FuncId>> {
        self.define_file("main.rw", src)
    }

    /// Define every function in `src`, recording `file` as their origin.
    ///
    /// Redefining a name keeps its [`FuncId`] and replaces the body. The
    /// direct-call cache of this world is invalidated for it; hook caches
    /// are not (see [`Dynamo::refresh`]).
    pub fn define_file(&self, file: &str, src: &str) -> Result<Vec<FuncId>> {
        let defs = parse_program(src)?;
        let mut ids = Vec::with_capacity(defs.len());
        for def in defs {
            let name = def.name.clone();
            let body = Body::Source {
                def: Rc::new(def),
                file: file.to_string(),
            };
            ids.push(self.install(&name, body)?);
        }
        Ok(ids)
    }

    /// Register a native function under `name`, replacing the body of a
    /// function already bound there. Fails if `name` is bound to a hook.
    pub fn define_native<F>(&self, name: &str, f: F) -> Result<FuncId>
    where
        F: Fn(&World, &[Value]) -> Result<Value> + 'static,
    {
        self.install(name, Body::Native(Rc::new(f)))
    }

    fn install(&self, name: &str, body: Body) -> Result<FuncId> {
        let bound = self.globals.borrow().get(name).copied();
        match bound {
            Some(Value::Func(id)) => {
                self.replace(id, name, body);
                Ok(id)
            }
            Some(Value::Hook(_)) => bail!("`{}` is bound to a hook and cannot be redefined", name),
            _ => Ok(self.push_function(name, body)),
        }
    }

    fn push_function(&self, name: &str, body: Body) -> FuncId {
        let mut functions = self.functions.borrow_mut();
        let id = FuncId(functions.len() as u32);
        functions.push(Rc::new(Function {
            name: name.to_string(),
            body,
        }));
        self.globals
            .borrow_mut()
            .insert(name.to_string(), Value::Func(id));
        id
    }

    fn replace(&self, id: FuncId, name: &str, body: Body) {
        self.functions.borrow_mut()[id.0 as usize] = Rc::new(Function {
            name: name.to_string(),
            body,
        });
        self.compiled.borrow_mut().remove(&id);
        debug!("redefined `{}` ({})", name, id);
    }

    /// Register a hook; when the hook has a name, the name becomes a global.
    pub fn register_hook(&self, hook: Dynamo) -> HookId {
        let mut hooks = self.hooks.borrow_mut();
        let id = HookId(hooks.len() as u32);
        if !hook.name().is_empty() {
            self.globals
                .borrow_mut()
                .insert(hook.name().to_string(), Value::Hook(id));
        }
        hooks.push(Rc::new(hook));
        id
    }

    /// Bind `name` to an arbitrary value.
    pub fn set_global(&self, name: &str, value: Value) {
        self.globals.borrow_mut().insert(name.to_string(), value);
    }

    // ── Lookup ───────────────────────────────────────────────────────────

    /// The value a global reference evaluates to.
    pub fn resolve(&self, name: &str) -> Result<Value, Trap> {
        self.globals
            .borrow()
            .get(name)
            .copied()
            .ok_or_else(|| Trap::UndefinedGlobal(name.to_string()))
    }

    pub fn func_id(&self, name: &str) -> Option<FuncId> {
        match self.globals.borrow().get(name) {
            Some(Value::Func(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn func_name(&self, id: FuncId) -> Option<String> {
        self.functions
            .borrow()
            .get(id.0 as usize)
            .map(|f| f.name.clone())
    }

    pub fn hook(&self, id: HookId) -> Result<Rc<Dynamo>> {
        match self.hooks.borrow().get(id.0 as usize) {
            Some(h) => Ok(Rc::clone(h)),
            None => bail!("no hook with id {}", id),
        }
    }

    fn function(&self, id: FuncId) -> Result<Rc<Function>> {
        match self.functions.borrow().get(id.0 as usize) {
            Some(f) => Ok(Rc::clone(f)),
            None => bail!("no function with id {}", id),
        }
    }

    /// The untransformed IR of a source function, lowered for a call with
    /// untyped arguments.
    pub fn code_ir(&self, id: FuncId) -> Result<Ir, IrError> {
        let arity = match self.function(id).map(|f| match &f.body {
            Body::Source { def, .. } => Some(def.params.len()),
            Body::Native(_) => None,
        }) {
            Ok(Some(arity)) => arity,
            _ => {
                return Err(IrError::Unsupported(Signature::new(vec![Type::Func(id)])));
            }
        };
        let mut types = vec![Type::Func(id)];
        types.extend(std::iter::repeat(Type::Any).take(arity));
        let meta = self.meta(&Signature::new(types))?;
        lower(Rc::new(meta))
    }

    /// The IR `hook` runs for a call of `signature` (callee first). See [`Dynamo::code_ir`].
    pub fn transformed_ir(&self, hook: HookId, signature: &Signature) -> Result<Option<Ir>> {
        self.hook(hook)?.code_ir(self, hook, signature)
    }

    // ── Calls ────────────────────────────────────────────────────────────

    /// Compile `ir` with this world's backend.
    pub fn compile(&self, ir: Ir) -> Result<Rc<dyn Invoke>> {
        self.backend.compile(ir)
    }

    /// Call `f` with `args`.
    ///
    /// Natives run directly, source functions run their untransformed
    /// compiled body, hooks dispatch (`args[0]` is then the intercepted
    /// callee).
    pub fn call(&self, f: &Value, args: &[Value]) -> Result<Value> {
        let _guard = self.enter()?;
        match f {
            Value::Func(id) => {
                let function = self.function(*id)?;
                match &function.body {
                    Body::Native(native) => native(self, args),
                    Body::Source { def, .. } => {
                        if def.params.len() != args.len() {
                            return Err(Trap::ArityMismatch {
                                expected: def.params.len(),
                                got: args.len(),
                            }
                            .into());
                        }
                        let unit = self.direct_unit(*id)?;
                        unit.invoke(self, args)
                    }
                }
            }
            Value::Hook(id) => {
                // Dispatch plus the unit it runs: hook frames are deep.
                let _dispatch = self.enter()?;
                let hook = self.hook(*id)?;
                hook.call(self, *id, args)
            }
            other => Err(Trap::NotCallable(other.type_of()).into()),
        }
    }

    /// Call the global `name`.
    pub fn call_global(&self, name: &str, args: &[Value]) -> Result<Value> {
        let f = self.resolve(name)?;
        self.call(&f, args)
    }

    /// Evict `hook`'s cache entry for `signature`, or the whole cache.
    /// Returns whether anything was evicted.
    pub fn refresh(&self, hook: HookId, signature: Option<&Signature>) -> Result<bool> {
        let hook = self.hook(hook)?;
        Ok(match signature {
            Some(sig) => hook.refresh_signature(sig),
            None => {
                let had = hook.cache_len() > 0;
                hook.refresh();
                had
            }
        })
    }

    fn direct_unit(&self, id: FuncId) -> Result<Rc<dyn Invoke>> {
        if let Some(unit) = self.compiled.borrow().get(&id) {
            return Ok(Rc::clone(unit));
        }
        let ir = self.code_ir(id)?;
        let unit = self.compile(ir)?;
        self.compiled.borrow_mut().insert(id, Rc::clone(&unit));
        Ok(unit)
    }

    fn enter(&self) -> Result<DepthGuard<'_>, Trap> {
        let depth = self.depth.get();
        if depth >= self.options.max_call_depth {
            return Err(Trap::CallDepthExceeded(self.options.max_call_depth));
        }
        self.depth.set(depth + 1);
        Ok(DepthGuard(&self.depth))
    }
}

impl MetadataProvider for World {
    fn meta(&self, signature: &Signature) -> Result<Meta, IrError> {
        let unsupported = || IrError::Unsupported(signature.clone());
        let Some(Type::Func(id)) = signature.callee() else {
            return Err(unsupported());
        };
        let function = self.function(id).map_err(|_| unsupported())?;
        match &function.body {
            Body::Source { def, file } if def.params.len() + 1 == signature.len() => Ok(Meta {
                callee: id,
                name: function.name.clone(),
                file: file.clone(),
                def: Rc::clone(def),
                signature: signature.clone(),
            }),
            _ => Err(unsupported()),
        }
    }
}
