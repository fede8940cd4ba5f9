//! Name resolution for the compiler.
//!
//! The scope is a stack of layers. An *activation* layer stands for one
//! runtime context (the program, a module, or an object handler) and holds
//! naming levels; do blocks and parenthesized blocks add levels to the
//! activation they appear in and share its slot counter. An *instance*
//! layer sits between an object's handlers and the code around the object
//! literal, and turns free names into captured instance variables.
use std::collections::{HashMap, HashSet};
use std::mem;

use parser::Span;

use crate::error::CompileError;
use crate::ir::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Let,
    Var,
    Do,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeRecord {
    pub index: usize,
    pub kind: BindingKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Local(ScopeRecord),
    Ivar(usize),
}

/// One naming level.
#[derive(Debug, Default)]
pub struct Locals {
    names: HashMap<String, ScopeRecord>,
}

impl Locals {
    pub fn get(&self, name: &str) -> Option<ScopeRecord> {
        self.names.get(name).copied()
    }

    pub fn insert(&mut self, name: &str, record: ScopeRecord) {
        self.names.insert(name.to_string(), record);
    }
}

#[derive(Debug)]
struct ActivationScope {
    levels: Vec<Locals>,
    next_slot: usize,
    /// Vars referenced by each enclosing send being compiled.
    send_scopes: Vec<HashSet<String>>,
    /// Do bodies being compiled; their var references are unchecked.
    open_blocks: usize,
}

impl ActivationScope {
    fn new() -> Self {
        Self {
            levels: vec![Locals::default()],
            next_slot: 0,
            send_scopes: Vec::new(),
            open_blocks: 0,
        }
    }

    fn find(&self, name: &str) -> Option<ScopeRecord> {
        self.levels.iter().rev().find_map(|level| level.get(name))
    }
}

#[derive(Debug)]
struct InstanceScope {
    /// Declared fields first, then captures.
    ivars: Vec<String>,
    /// How to compute each capture in the enclosing context.
    captures: Vec<Expr>,
    has_else: bool,
}

#[derive(Debug)]
enum Layer {
    Activation(ActivationScope),
    Instance(InstanceScope),
}

#[derive(Debug)]
pub struct Scope {
    layers: Vec<Layer>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

fn layer_error(what: &str) -> CompileError {
    CompileError::Unreachable(format!("{what} outside an activation"))
}

impl Scope {
    pub fn new() -> Self {
        Self {
            layers: vec![Layer::Activation(ActivationScope::new())],
        }
    }

    fn activation(&mut self) -> Result<&mut ActivationScope, CompileError> {
        match self.layers.last_mut() {
            Some(Layer::Activation(act)) => Ok(act),
            _ => Err(layer_error("scope access")),
        }
    }

    // ── Layers and levels ──

    /// Enters an object handler: slots start again at 0.
    pub fn push_activation(&mut self) {
        self.layers.push(Layer::Activation(ActivationScope::new()));
    }

    /// Leaves an object handler, returning how many slots it used.
    pub fn pop_activation(&mut self) -> Result<usize, CompileError> {
        match self.layers.pop() {
            Some(Layer::Activation(act)) => Ok(act.next_slot),
            _ => Err(layer_error("pop_activation")),
        }
    }

    pub fn push_instance(&mut self, fields: Vec<String>, has_else: bool) {
        self.layers.push(Layer::Instance(InstanceScope {
            ivars: fields,
            captures: Vec::new(),
            has_else,
        }));
    }

    /// Leaves an object literal, returning the capture expressions in ivar
    /// order (after the declared fields).
    pub fn pop_instance(&mut self) -> Result<Vec<Expr>, CompileError> {
        match self.layers.pop() {
            Some(Layer::Instance(inst)) => Ok(inst.captures),
            _ => Err(CompileError::Unreachable("pop_instance on an activation".into())),
        }
    }

    pub fn push_level(&mut self) -> Result<(), CompileError> {
        self.activation()?.levels.push(Locals::default());
        Ok(())
    }

    pub fn pop_level(&mut self) -> Result<(), CompileError> {
        let act = self.activation()?;
        if act.levels.len() <= 1 {
            return Err(CompileError::Unreachable("popped the base level".into()));
        }
        act.levels.pop();
        Ok(())
    }

    pub fn slot_count(&self) -> usize {
        match self.layers.last() {
            Some(Layer::Activation(act)) => act.next_slot,
            _ => 0,
        }
    }

    // ── Declarations ──

    /// A slot no name refers to.
    pub fn alloc_slot(&mut self) -> Result<usize, CompileError> {
        let act = self.activation()?;
        let slot = act.next_slot;
        act.next_slot += 1;
        Ok(slot)
    }

    pub fn declare(&mut self, name: &str, kind: BindingKind) -> Result<usize, CompileError> {
        let index = self.alloc_slot()?;
        let act = self.activation()?;
        let level = act
            .levels
            .last_mut()
            .ok_or_else(|| CompileError::Unreachable("activation without levels".into()))?;
        level.insert(name, ScopeRecord { index, kind });
        Ok(index)
    }

    // ── Lookup ──

    /// Resolves `name`, capturing it into enclosing objects on the way out
    /// when it lives beyond an object boundary.
    pub fn lookup(&mut self, name: &str, span: Span) -> Result<Resolved, CompileError> {
        let top = self.layers.len() - 1;
        self.resolve_at(top, name, span)?
            .ok_or_else(|| CompileError::UnknownIdentifier {
                name: name.to_string(),
                span,
            })
    }

    fn resolve_at(
        &mut self,
        depth: usize,
        name: &str,
        span: Span,
    ) -> Result<Option<Resolved>, CompileError> {
        let found = match &self.layers[depth] {
            Layer::Activation(act) => act.find(name).map(Resolved::Local),
            Layer::Instance(inst) => inst.ivars.iter().position(|n| n == name).map(Resolved::Ivar),
        };
        if found.is_some() || depth == 0 {
            return Ok(found);
        }
        let outer = self.resolve_at(depth - 1, name, span)?;
        let Layer::Instance(inst) = &mut self.layers[depth] else {
            return Ok(outer);
        };
        let capture = match outer {
            None => return Ok(None),
            Some(Resolved::Ivar(index)) => Expr::Ivar(index),
            Some(Resolved::Local(record)) => match record.kind {
                BindingKind::Let => Expr::Local(record.index),
                BindingKind::Var => {
                    return Err(CompileError::CaptureVar {
                        name: name.to_string(),
                        span,
                    });
                }
                BindingKind::Do => {
                    return Err(CompileError::CaptureDo {
                        name: name.to_string(),
                        span,
                    });
                }
            },
        };
        inst.ivars.push(name.to_string());
        inst.captures.push(capture);
        Ok(Some(Resolved::Ivar(inst.ivars.len() - 1)))
    }

    /// Kind of the nearest binding of `name` outside the current
    /// activation, without capturing anything.
    fn find_outside(&self, name: &str) -> Option<BindingKind> {
        let below = self.layers.len().saturating_sub(1);
        self.layers[..below].iter().rev().find_map(|layer| match layer {
            Layer::Activation(act) => act.find(name).map(|r| r.kind),
            Layer::Instance(inst) => inst.ivars.iter().any(|n| n == name).then_some(BindingKind::Let),
        })
    }

    /// Slot of a `var` that the current activation may write.
    pub fn lookup_var_index(&mut self, name: &str, span: Span) -> Result<usize, CompileError> {
        if let Some(record) = self.activation()?.find(name) {
            return match record.kind {
                BindingKind::Var => Ok(record.index),
                _ => Err(CompileError::NotAVar {
                    name: name.to_string(),
                    span,
                }),
            };
        }
        let name = name.to_string();
        match self.find_outside(&name) {
            Some(BindingKind::Var) => Err(CompileError::VarOutOfReach { name, span }),
            Some(_) => Err(CompileError::NotAVar { name, span }),
            None => Err(CompileError::UnknownIdentifier { name, span }),
        }
    }

    /// Whether the innermost object being compiled declares an else handler.
    pub fn in_else_object(&self) -> bool {
        self.layers.iter().rev().find_map(|layer| match layer {
            Layer::Instance(inst) => Some(inst.has_else),
            Layer::Activation(_) => None,
        }) == Some(true)
    }

    // ── Send scopes ──

    pub fn begin_send(&mut self) -> Result<(), CompileError> {
        self.activation()?.send_scopes.push(HashSet::new());
        Ok(())
    }

    pub fn end_send(&mut self) -> Result<(), CompileError> {
        self.activation()?.send_scopes.pop();
        Ok(())
    }

    /// Records a reference to var `name` in every enclosing send; a second
    /// reference within any of them is a double borrow. Inside a do body
    /// nothing is recorded.
    pub fn borrow_var(&mut self, name: &str, span: Span) -> Result<(), CompileError> {
        let act = self.activation()?;
        if act.open_blocks > 0 {
            return Ok(());
        }
        if act.send_scopes.iter().any(|scope| scope.contains(name)) {
            return Err(CompileError::DoubleBorrow {
                name: name.to_string(),
                span,
            });
        }
        for scope in &mut act.send_scopes {
            scope.insert(name.to_string());
        }
        Ok(())
    }

    /// Opens a do body: a fresh naming level and a detached send stack.
    pub fn enter_block(&mut self) -> Result<Vec<HashSet<String>>, CompileError> {
        self.push_level()?;
        let act = self.activation()?;
        act.open_blocks += 1;
        Ok(mem::take(&mut act.send_scopes))
    }

    pub fn leave_block(&mut self, saved: Vec<HashSet<String>>) -> Result<(), CompileError> {
        self.pop_level()?;
        let act = self.activation()?;
        act.open_blocks = act.open_blocks.saturating_sub(1);
        act.send_scopes = saved;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::default()
    }

    #[test]
    fn levels_share_the_slot_counter() {
        let mut scope = Scope::new();
        assert_eq!(scope.declare("a", BindingKind::Let).unwrap(), 0);
        scope.push_level().unwrap();
        assert_eq!(scope.declare("b", BindingKind::Var).unwrap(), 1);
        assert_eq!(
            scope.lookup("a", span()).unwrap(),
            Resolved::Local(ScopeRecord { index: 0, kind: BindingKind::Let })
        );
        scope.pop_level().unwrap();
        assert!(matches!(
            scope.lookup("b", span()),
            Err(CompileError::UnknownIdentifier { .. })
        ));
        assert_eq!(scope.declare("c", BindingKind::Let).unwrap(), 2);
        assert_eq!(scope.slot_count(), 3);
    }

    #[test]
    fn objects_capture_lets() {
        let mut scope = Scope::new();
        scope.declare("outer", BindingKind::Let).unwrap();
        scope.push_instance(vec!["field".into()], false);
        scope.push_activation();
        assert_eq!(scope.lookup("field", span()).unwrap(), Resolved::Ivar(0));
        assert_eq!(scope.lookup("outer", span()).unwrap(), Resolved::Ivar(1));
        // a second lookup reuses the capture
        assert_eq!(scope.lookup("outer", span()).unwrap(), Resolved::Ivar(1));
        assert_eq!(scope.pop_activation().unwrap(), 0);
        let captures = scope.pop_instance().unwrap();
        assert_eq!(captures.len(), 1);
        assert!(matches!(captures[0], Expr::Local(0)));
    }

    #[test]
    fn nested_objects_capture_through_ivars() {
        let mut scope = Scope::new();
        scope.declare("x", BindingKind::Let).unwrap();
        scope.push_instance(Vec::new(), false);
        scope.push_activation();
        scope.push_instance(Vec::new(), false);
        scope.push_activation();
        assert_eq!(scope.lookup("x", span()).unwrap(), Resolved::Ivar(0));
        scope.pop_activation().unwrap();
        let inner = scope.pop_instance().unwrap();
        assert!(matches!(inner[0], Expr::Ivar(0)));
        scope.pop_activation().unwrap();
        let outer = scope.pop_instance().unwrap();
        assert!(matches!(outer[0], Expr::Local(0)));
    }

    #[test]
    fn vars_and_dos_cannot_be_captured() {
        let mut scope = Scope::new();
        scope.declare("v", BindingKind::Var).unwrap();
        scope.declare("d", BindingKind::Do).unwrap();
        scope.push_instance(Vec::new(), false);
        scope.push_activation();
        assert!(matches!(scope.lookup("v", span()), Err(CompileError::CaptureVar { .. })));
        assert!(matches!(scope.lookup("d", span()), Err(CompileError::CaptureDo { .. })));
    }

    #[test]
    fn var_index_rules() {
        let mut scope = Scope::new();
        scope.declare("v", BindingKind::Var).unwrap();
        scope.declare("l", BindingKind::Let).unwrap();
        scope.push_level().unwrap();
        assert_eq!(scope.lookup_var_index("v", span()).unwrap(), 0);
        assert!(matches!(scope.lookup_var_index("l", span()), Err(CompileError::NotAVar { .. })));
        scope.pop_level().unwrap();
        scope.push_instance(Vec::new(), false);
        scope.push_activation();
        assert!(matches!(
            scope.lookup_var_index("v", span()),
            Err(CompileError::VarOutOfReach { .. })
        ));
        assert!(matches!(scope.lookup_var_index("l", span()), Err(CompileError::NotAVar { .. })));
        assert!(matches!(
            scope.lookup_var_index("nope", span()),
            Err(CompileError::UnknownIdentifier { .. })
        ));
    }

    #[test]
    fn double_borrow_spans_nested_sends() {
        let mut scope = Scope::new();
        scope.begin_send().unwrap();
        scope.borrow_var("v", span()).unwrap();
        scope.begin_send().unwrap();
        assert!(matches!(scope.borrow_var("v", span()), Err(CompileError::DoubleBorrow { .. })));
        scope.borrow_var("w", span()).unwrap();
        scope.end_send().unwrap();
        // `w` was registered in the outer send too
        assert!(scope.borrow_var("w", span()).is_err());
        scope.end_send().unwrap();
        scope.borrow_var("v", span()).unwrap();
    }

    #[test]
    fn do_bodies_are_unchecked() {
        let mut scope = Scope::new();
        scope.declare("v", BindingKind::Var).unwrap();
        scope.begin_send().unwrap();
        scope.borrow_var("v", span()).unwrap();
        let saved = scope.enter_block().unwrap();
        scope.begin_send().unwrap();
        scope.borrow_var("v", span()).unwrap();
        scope.borrow_var("v", span()).unwrap();
        scope.end_send().unwrap();
        // object handlers inside a do body are checked again
        scope.push_instance(Vec::new(), false);
        scope.push_activation();
        scope.declare("w", BindingKind::Var).unwrap();
        scope.begin_send().unwrap();
        scope.borrow_var("w", span()).unwrap();
        assert!(scope.borrow_var("w", span()).is_err());
        scope.end_send().unwrap();
        scope.pop_activation().unwrap();
        scope.pop_instance().unwrap();
        scope.leave_block(saved).unwrap();
        assert!(scope.borrow_var("v", span()).is_err());
    }

    #[test]
    fn else_objects_are_tracked() {
        let mut scope = Scope::new();
        assert!(!scope.in_else_object());
        scope.push_instance(Vec::new(), true);
        scope.push_activation();
        assert!(scope.in_else_object());
    }
}
