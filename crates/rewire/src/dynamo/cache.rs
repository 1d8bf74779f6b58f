//! Per-hook memo table keyed by call signature.

use crate::backend::Invoke;
use crate::world::Signature;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone)]
pub(crate) enum CacheEntry {
    /// The transformed, compiled callee.
    Unit(Rc<dyn Invoke>),
    /// No IR (or the transform declined): call the callee directly.
    Direct,
}

#[derive(Default)]
pub(crate) struct Cache {
    entries: RefCell<HashMap<Signature, CacheEntry>>,
}

impl Cache {
    /// The entry for `sig`. The borrow ends before the caller runs it.
    pub(crate) fn get(&self, sig: &Signature) -> Option<CacheEntry> {
        self.entries.borrow().get(sig).cloned()
    }

    pub(crate) fn insert(&self, sig: Signature, entry: CacheEntry) {
        self.entries.borrow_mut().insert(sig, entry);
    }

    pub(crate) fn remove(&self, sig: &Signature) -> bool {
        self.entries.borrow_mut().remove(sig).is_some()
    }

    pub(crate) fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}
