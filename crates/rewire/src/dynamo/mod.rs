//! Hooks ("dynamos"): call interception with IR-level transforms.
//!
//! A hook intercepts `hook(f, args...)`. Dispatch picks the most specific
//! rule matching the signature `(typeof(f), typeof(args)...)`:
//!
//! - a *native* rule runs a replacement function directly;
//! - a *transform* rule fetches `f`'s IR from the metadata provider, hands
//!   it to the user's [`Transform`], compiles the result and runs it. The
//!   compiled unit is memoized per signature until [`Dynamo::refresh`].
//!
//! When the provider has no IR (natives, hooks, arity mismatch) or the
//! transform returns `None`, the callee runs directly. A transform that
//! calls [`TransformCx::recurse`] routes every call in the IR back through
//! the hook, so the transform reaches the whole dynamic extent of the call;
//! recursion bottoms out at the natives.
//!
//! Hook state lives in the transform object itself (fields behind `Cell` /
//! `RefCell`), shared by every call the hook intercepts.

mod cache;
pub mod dispatch;

pub use dispatch::{Handler, Pattern, Rule, SigPattern};

use crate::backend::Invoke;
use crate::error::IrError;
use crate::ir::{Expr, Ir, Operand};
use crate::lower::lower;
use crate::world::{MetadataProvider, Signature, World};
use anyhow::Result;
use cache::{Cache, CacheEntry};
use rewire_runtime::{HookId, Trap, Value};
use std::rc::Rc;
use tracing::debug;

/// A user transform over the IR of an intercepted callee.
///
/// Return `Some(ir)` to run `ir` in place of the callee or `None` to run the
/// callee unchanged. Errors propagate unchanged to the caller of the
/// intercepted call.
pub trait Transform {
    fn transform(&self, cx: &mut TransformCx<'_>, ir: Ir) -> Result<Option<Ir>>;
}

impl<F> Transform for F
where
    F: Fn(&mut TransformCx<'_>, Ir) -> Result<Option<Ir>>,
{
    fn transform(&self, cx: &mut TransformCx<'_>, ir: Ir) -> Result<Option<Ir>> {
        self(cx, ir)
    }
}

/// What a transform sees besides the IR.
pub struct TransformCx<'a> {
    world: &'a World,
    hook: HookId,
    signature: &'a Signature,
}

impl<'a> TransformCx<'a> {
    pub fn world(&self) -> &'a World {
        self.world
    }

    /// The intercepting hook, for building calls back into it.
    pub fn hook(&self) -> HookId {
        self.hook
    }

    pub fn signature(&self) -> &Signature {
        self.signature
    }

    /// Rewrite every call `f(a, b)` in `ir` into `hook(f, a, b)`.
    ///
    /// Calls whose callee already is this hook are left alone. Returns the
    /// number of calls rewritten.
    pub fn recurse(&self, ir: &mut Ir) -> usize {
        let hook = Operand::Const(Value::Hook(self.hook));
        let mut rewritten = 0;
        for (_, st) in ir.statements_mut() {
            if let Expr::Call { callee, args } = &mut st.expr {
                if *callee == hook {
                    continue;
                }
                let original = std::mem::replace(callee, hook.clone());
                args.insert(0, original);
                rewritten += 1;
            }
        }
        rewritten
    }
}

/// A hook: a rule table plus its memo cache.
pub struct Dynamo {
    name: String,
    rules: Vec<Rule>,
    cache: Cache,
}

impl Dynamo {
    pub fn builder(name: &str) -> DynamoBuilder {
        DynamoBuilder {
            name: name.to_string(),
            rules: Vec::new(),
        }
    }

    /// A hook with a single catch-all transform rule.
    pub fn new<F>(name: &str, transform: F) -> Self
    where
        F: Fn(&mut TransformCx<'_>, Ir) -> Result<Option<Ir>> + 'static,
    {
        Self::builder(name).transform_fn(SigPattern::any(), transform).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Handle an intercepted call. `args[0]` is the callee.
    pub fn call(&self, world: &World, hook: HookId, args: &[Value]) -> Result<Value> {
        let Some((callee, rest)) = args.split_first() else {
            return Err(Trap::ArityMismatch {
                expected: 1,
                got: 0,
            }
            .into());
        };
        let sig = Signature::of(args);
        let Some(rule) = dispatch::select(&self.rules, &sig) else {
            return Err(IrError::NoMatchingRule {
                hook: self.name.clone(),
                signature: sig,
            }
            .into());
        };

        let transform = match &rule.handler {
            Handler::Native(f) => {
                debug!("hook `{}`: native rule {} for {}", self.name, rule.pattern, sig);
                return f(world, args);
            }
            Handler::Transform(t) => t,
        };

        let entry = self.entry(world, hook, &sig, &**transform)?;
        match entry {
            CacheEntry::Unit(unit) => unit.invoke(world, rest),
            CacheEntry::Direct => world.call(callee, rest),
        }
    }

    /// The cached decision for `sig`, building and caching it on a miss.
    fn entry(
        &self,
        world: &World,
        hook: HookId,
        sig: &Signature,
        transform: &dyn Transform,
    ) -> Result<CacheEntry> {
        if let Some(entry) = self.cache.get(sig) {
            debug!("hook `{}`: cache hit for {}", self.name, sig);
            return Ok(entry);
        }
        debug!("hook `{}`: cache miss for {}", self.name, sig);
        let entry = self.build(world, hook, sig, transform)?;
        self.cache.insert(sig.clone(), entry.clone());
        Ok(entry)
    }

    /// The transformed IR this hook runs for a call of `sig`, compiling and
    /// caching it if needed.
    ///
    /// `None` when the call would not run transformed IR: a native rule
    /// matches, the callee has no IR, the transform declined, or the backend
    /// does not keep IR.
    pub fn code_ir(&self, world: &World, hook: HookId, sig: &Signature) -> Result<Option<Ir>> {
        let Some(rule) = dispatch::select(&self.rules, sig) else {
            return Err(IrError::NoMatchingRule {
                hook: self.name.clone(),
                signature: sig.clone(),
            }
            .into());
        };
        let Handler::Transform(transform) = &rule.handler else {
            return Ok(None);
        };
        Ok(match self.entry(world, hook, sig, &**transform)? {
            CacheEntry::Unit(unit) => unit.ir().cloned(),
            CacheEntry::Direct => None,
        })
    }

    fn build(
        &self,
        world: &World,
        hook: HookId,
        sig: &Signature,
        transform: &dyn Transform,
    ) -> Result<CacheEntry> {
        let meta = match world.meta(sig) {
            Ok(meta) => meta,
            Err(e) if e.is_unsupported() => {
                debug!("hook `{}`: no IR for {}, calling directly", self.name, sig);
                return Ok(CacheEntry::Direct);
            }
            Err(e) => return Err(e.into()),
        };
        let ir = lower(Rc::new(meta))?;
        let mut cx = TransformCx {
            world,
            hook,
            signature: sig,
        };
        match transform.transform(&mut cx, ir)? {
            Some(ir) => Ok(CacheEntry::Unit(world.compile(ir)?)),
            None => Ok(CacheEntry::Direct),
        }
    }

    /// Evict every cached signature.
    pub fn refresh(&self) {
        debug!("hook `{}`: refreshed", self.name);
        self.cache.clear();
    }

    /// Evict one signature. Returns `false` if it was not cached.
    pub fn refresh_signature(&self, sig: &Signature) -> bool {
        let removed = self.cache.remove(sig);
        if removed {
            debug!("hook `{}`: refreshed {}", self.name, sig);
        }
        removed
    }

    /// True if a decision (compiled unit or direct call) is cached for `sig`.
    pub fn cached(&self, sig: &Signature) -> bool {
        self.cache.get(sig).is_some()
    }

    /// The compiled unit cached for `sig`, if the transform produced one.
    pub fn cached_unit(&self, sig: &Signature) -> Option<Rc<dyn Invoke>> {
        match self.cache.get(sig)? {
            CacheEntry::Unit(unit) => Some(unit),
            CacheEntry::Direct => None,
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

pub struct DynamoBuilder {
    name: String,
    rules: Vec<Rule>,
}

impl DynamoBuilder {
    /// Add a transform rule backed by a shared transform object.
    pub fn transform(mut self, pattern: SigPattern, transform: Rc<dyn Transform>) -> Self {
        self.rules.push(Rule {
            pattern,
            handler: Handler::Transform(transform),
        });
        self
    }

    /// Add a transform rule backed by a closure.
    pub fn transform_fn<F>(self, pattern: SigPattern, f: F) -> Self
    where
        F: Fn(&mut TransformCx<'_>, Ir) -> Result<Option<Ir>> + 'static,
    {
        self.transform(pattern, Rc::new(f))
    }

    /// Add a native rule: `f` receives the whole call, callee first.
    pub fn native<F>(mut self, pattern: SigPattern, f: F) -> Self
    where
        F: Fn(&World, &[Value]) -> Result<Value> + 'static,
    {
        self.rules.push(Rule {
            pattern,
            handler: Handler::Native(Rc::new(f)),
        });
        self
    }

    pub fn build(self) -> Dynamo {
        Dynamo {
            name: self.name,
            rules: self.rules,
            cache: Cache::default(),
        }
    }
}
