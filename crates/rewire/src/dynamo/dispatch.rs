//! Rule tables: type patterns and most-specific-rule selection.

use crate::world::{NativeFn, Signature};
use rewire_runtime::Type;
use std::fmt;
use std::rc::Rc;

use super::Transform;

/// Matches one position of a call signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Any,
    /// `Int` or `Float`.
    Number,
    /// A function or hook.
    Callable,
    Exact(Type),
}

impl Pattern {
    pub fn matches(&self, ty: Type) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Number => ty.is_number(),
            Pattern::Callable => ty.is_callable(),
            Pattern::Exact(t) => *t == ty,
        }
    }

    /// True if every type matched by `self` is matched by `other`.
    pub fn refines(&self, other: &Pattern) -> bool {
        match (self, other) {
            (_, Pattern::Any) => true,
            (Pattern::Number, Pattern::Number) | (Pattern::Callable, Pattern::Callable) => true,
            (Pattern::Exact(t), Pattern::Number) => t.is_number(),
            (Pattern::Exact(t), Pattern::Callable) => t.is_callable(),
            (Pattern::Exact(a), Pattern::Exact(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Any => write!(f, "_"),
            Pattern::Number => write!(f, "Number"),
            Pattern::Callable => write!(f, "Callable"),
            Pattern::Exact(t) => write!(f, "{}", t),
        }
    }
}

/// Matches a whole signature (callee first): fixed positions, then an
/// optional variadic tail matching every remaining position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigPattern {
    pub fixed: Vec<Pattern>,
    pub rest: Option<Pattern>,
}

impl SigPattern {
    /// Matches any call.
    pub fn any() -> Self {
        Self::variadic(vec![], Pattern::Any)
    }

    /// Matches calls with exactly these positions.
    pub fn exact(fixed: Vec<Pattern>) -> Self {
        Self { fixed, rest: None }
    }

    pub fn variadic(fixed: Vec<Pattern>, rest: Pattern) -> Self {
        Self {
            fixed,
            rest: Some(rest),
        }
    }

    /// Matches calls of `callee` with any arguments.
    pub fn callee(callee: Type) -> Self {
        Self::variadic(vec![Pattern::Exact(callee)], Pattern::Any)
    }

    pub fn matches(&self, sig: &Signature) -> bool {
        let arity_ok = match self.rest {
            Some(_) => sig.len() >= self.fixed.len(),
            None => sig.len() == self.fixed.len(),
        };
        arity_ok
            && sig
                .types
                .iter()
                .enumerate()
                .all(|(i, t)| self.at(i).is_some_and(|p| p.matches(*t)))
    }

    fn at(&self, i: usize) -> Option<&Pattern> {
        self.fixed.get(i).or(self.rest.as_ref())
    }

    /// True if `self` is strictly more specific than `other` for a call of
    /// `arity` positions. Both must match that arity.
    pub fn more_specific(&self, other: &SigPattern, arity: usize) -> bool {
        let mut refines = true;
        let mut strictly = false;
        for i in 0..arity {
            let (Some(a), Some(b)) = (self.at(i), other.at(i)) else {
                return false;
            };
            refines &= a.refines(b);
            strictly |= a.refines(b) && !b.refines(a);
        }
        refines && (strictly || (self.rest.is_none() && other.rest.is_some()))
    }
}

impl fmt::Display for SigPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.fixed.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        if let Some(rest) = &self.rest {
            if !self.fixed.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "{}...", rest)?;
        }
        write!(f, ")")
    }
}

/// What a rule does with a matching call.
#[derive(Clone)]
pub enum Handler {
    /// Obtain IR for the callee, transform it, compile it. Memoized.
    Transform(Rc<dyn Transform>),
    /// Run this function instead of the callee. Receives all arguments,
    /// callee included.
    Native(NativeFn),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Transform(_) => write!(f, "Transform"),
            Handler::Native(_) => write!(f, "Native"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: SigPattern,
    pub handler: Handler,
}

/// The most specific rule matching `sig`.
///
/// Rules are scanned in registration order; a later rule displaces the
/// current choice only when it is strictly more specific, so incomparable
/// and equal rules resolve to the earliest.
pub fn select<'r>(rules: &'r [Rule], sig: &Signature) -> Option<&'r Rule> {
    let mut best: Option<&Rule> = None;
    for rule in rules.iter().filter(|r| r.pattern.matches(sig)) {
        best = match best {
            Some(b) if !rule.pattern.more_specific(&b.pattern, sig.len()) => Some(b),
            _ => Some(rule),
        };
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;
    use rewire_runtime::{FuncId, Value};

    fn native(tag: i64) -> Handler {
        Handler::Native(Rc::new(move |_: &World, _: &[Value]| Ok(Value::Int(tag))))
    }

    fn rule(pattern: SigPattern, tag: i64) -> Rule {
        Rule {
            pattern,
            handler: native(tag),
        }
    }

    fn tag_of(rule: Option<&Rule>) -> Option<i64> {
        let world = World::bare(crate::Options::default());
        match &rule?.handler {
            Handler::Native(f) => match f(&world, &[]) {
                Ok(Value::Int(t)) => Some(t),
                _ => None,
            },
            Handler::Transform(_) => None,
        }
    }

    const MUL: Type = Type::Func(FuncId(2));

    fn sig(types: &[Type]) -> Signature {
        Signature::new(types.to_vec())
    }

    #[test]
    fn pattern_refinement() {
        assert!(Pattern::Exact(Type::Int).refines(&Pattern::Number));
        assert!(Pattern::Number.refines(&Pattern::Any));
        assert!(!Pattern::Any.refines(&Pattern::Number));
        assert!(!Pattern::Exact(Type::Bool).refines(&Pattern::Number));
        assert!(Pattern::Exact(MUL).refines(&Pattern::Callable));
    }

    #[test]
    fn signature_matching_with_variadic_tail() {
        let p = SigPattern::callee(MUL);
        assert!(p.matches(&sig(&[MUL])));
        assert!(p.matches(&sig(&[MUL, Type::Int, Type::Float])));
        assert!(!p.matches(&sig(&[Type::Int])));
        assert!(!p.matches(&sig(&[])));

        let fixed = SigPattern::exact(vec![Pattern::Callable, Pattern::Number]);
        assert!(fixed.matches(&sig(&[MUL, Type::Int])));
        assert!(!fixed.matches(&sig(&[MUL, Type::Int, Type::Int])));
    }

    #[test]
    fn most_specific_rule_wins_regardless_of_order() {
        let s = sig(&[MUL, Type::Int, Type::Int]);
        let specific = rule(
            SigPattern::exact(vec![Pattern::Exact(MUL), Pattern::Number, Pattern::Number]),
            2,
        );
        let generic = rule(SigPattern::any(), 1);
        assert_eq!(tag_of(select(&[generic.clone(), specific.clone()], &s)), Some(2));
        assert_eq!(tag_of(select(&[specific, generic], &s)), Some(2));
    }

    #[test]
    fn ties_go_to_the_earlier_rule() {
        let s = sig(&[MUL, Type::Int]);
        let a = rule(SigPattern::any(), 1);
        let b = rule(SigPattern::any(), 2);
        assert_eq!(tag_of(select(&[a, b], &s)), Some(1));

        // Incomparable: (Callable, _) vs (_, Number).
        let c = rule(SigPattern::exact(vec![Pattern::Callable, Pattern::Any]), 3);
        let d = rule(SigPattern::exact(vec![Pattern::Any, Pattern::Number]), 4);
        assert_eq!(tag_of(select(&[c.clone(), d.clone()], &s)), Some(3));
        assert_eq!(tag_of(select(&[d, c], &s)), Some(4));
    }

    #[test]
    fn fixed_arity_beats_equal_variadic() {
        let s = sig(&[MUL, Type::Int]);
        let variadic = rule(SigPattern::any(), 1);
        let fixed = rule(SigPattern::exact(vec![Pattern::Any, Pattern::Any]), 2);
        assert_eq!(tag_of(select(&[variadic, fixed], &s)), Some(2));
    }

    #[test]
    fn no_rule_matches() {
        let r = rule(SigPattern::callee(MUL), 1);
        assert!(select(&[r], &sig(&[Type::Int])).is_none());
    }

    #[test]
    fn display() {
        let p = SigPattern::variadic(vec![Pattern::Exact(MUL), Pattern::Number], Pattern::Any);
        assert_eq!(p.to_string(), "(typeof(fn#2), Number, _...)");
    }
}
