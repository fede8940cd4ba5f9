//! Runtime contexts.
//!
//! An [`Activation`] is created for every object-handler invocation (and
//! for each module or program run). Blocks never get their own: their
//! parameters and locals live in pre-allocated slots of the activation that
//! created them.
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::ir::Stmt;
use crate::value::Value;

pub type ContextRef = Rc<Activation>;

/// Persistent map of provided values. Adding a key makes a new version;
/// older versions held by other contexts are unaffected.
#[derive(Clone, Default)]
pub struct ProvideMap(Option<Rc<ProvideNode>>);

struct ProvideNode {
    key: String,
    value: Value,
    parent: ProvideMap,
}

impl ProvideMap {
    pub fn with(&self, key: impl Into<String>, value: Value) -> ProvideMap {
        ProvideMap(Some(Rc::new(ProvideNode {
            key: key.into(),
            value,
            parent: self.clone(),
        })))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut node = self.0.as_ref();
        while let Some(n) = node {
            if n.key == key {
                return Some(n.value.clone());
            }
            node = n.parent.0.as_ref();
        }
        None
    }
}

pub struct Activation {
    pub id: usize,
    pub self_value: Value,
    locals: RefCell<Vec<Option<Value>>>,
    provides: RefCell<ProvideMap>,
    defers: RefCell<Vec<Rc<[Stmt]>>>,
    alive: Cell<bool>,
}

impl Activation {
    pub fn new(
        id: usize,
        self_value: Value,
        provides: ProvideMap,
        locals: usize,
    ) -> ContextRef {
        Rc::new(Self {
            id,
            self_value,
            locals: RefCell::new(vec![None; locals]),
            provides: RefCell::new(provides),
            defers: RefCell::new(Vec::new()),
            alive: Cell::new(true),
        })
    }

    /// `None` for a slot that was never written.
    pub fn local(&self, slot: usize) -> Option<Value> {
        self.locals.borrow().get(slot).cloned().flatten()
    }

    pub fn set_local(&self, slot: usize, value: Value) {
        let mut locals = self.locals.borrow_mut();
        if slot >= locals.len() {
            locals.resize(slot + 1, None);
        }
        locals[slot] = Some(value);
    }

    pub fn provides(&self) -> ProvideMap {
        self.provides.borrow().clone()
    }

    pub fn provide(&self, key: &str, value: Value) {
        let next = self.provides.borrow().with(key, value);
        *self.provides.borrow_mut() = next;
    }

    pub fn provided(&self, key: &str) -> Option<Value> {
        self.provides.borrow().get(key)
    }

    pub fn push_defer(&self, stmts: Rc<[Stmt]>) {
        self.defers.borrow_mut().push(stmts);
    }

    pub fn pop_defer(&self) -> Option<Rc<[Stmt]>> {
        self.defers.borrow_mut().pop()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// Marks the context expired and drops its slots, which also breaks
    /// cycles through blocks stored in them.
    pub fn finish(&self) {
        self.alive.set(false);
        self.locals.borrow_mut().clear();
        self.defers.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::special::bootstrap;

    #[test]
    fn provide_versions_are_persistent() {
        let vm = bootstrap();
        let base = ProvideMap::default().with("depth", vm.int(1));
        let inner = base.with("depth", vm.int(2)).with("name", vm.string("x"));
        assert_eq!(base.get("depth").and_then(|v| v.as_int()), Some(1));
        assert_eq!(inner.get("depth").and_then(|v| v.as_int()), Some(2));
        assert!(base.get("name").is_none());
    }

    #[test]
    fn locals_grow_and_finish_clears() {
        let vm = bootstrap();
        let ctx = Activation::new(0, vm.unit(), ProvideMap::default(), 1);
        assert!(ctx.local(0).is_none());
        ctx.set_local(3, vm.int(7));
        assert_eq!(ctx.local(3).and_then(|v| v.as_int()), Some(7));
        ctx.finish();
        assert!(!ctx.is_alive());
        assert!(ctx.local(3).is_none());
    }

    #[test]
    fn provide_in_context_shadows() {
        let vm = bootstrap();
        let ctx = Activation::new(0, vm.unit(), ProvideMap::default(), 0);
        ctx.provide("k", vm.int(1));
        let snapshot = ctx.provides();
        ctx.provide("k", vm.int(2));
        assert_eq!(ctx.provided("k").and_then(|v| v.as_int()), Some(2));
        assert_eq!(snapshot.get("k").and_then(|v| v.as_int()), Some(1));
    }
}
