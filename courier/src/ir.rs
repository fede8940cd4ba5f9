//! Intermediate representation.
//!
//! After compilation every identifier is a slot ([`Expr::Local`]), an
//! instance variable ([`Expr::Ivar`]) or `self`, and every message is a
//! canonical selector string.
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use parser::Span;

use crate::error::CompileError;
use crate::frames::FrameMethod;
use crate::primitives::PrimitiveDesc;
use crate::value::Value;

/// Canonical selector for a list of pair keys: sorted, each followed by
/// `:`. `["y", "x"]` becomes `"x:y:"`, `[""]` becomes `":"`.
pub fn selector_for<S: AsRef<str>>(keys: &[S]) -> String {
    let mut sorted: Vec<&str> = keys.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.iter().map(|k| format!("{k}:")).collect()
}

// ── Classes ──

/// Canonical selector and sorted field keys of a frame-shaped class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameShape {
    pub selector: String,
    pub keys: Vec<String>,
}

pub struct IrClass {
    pub name: String,
    handlers: HashMap<String, Handler>,
    else_handler: Option<Handler>,
    pub shape: Option<FrameShape>,
}

impl IrClass {
    pub fn handler(&self, selector: &str) -> Option<&Handler> {
        self.handlers.get(selector)
    }

    pub fn else_handler(&self) -> Option<&Handler> {
        self.else_handler.as_ref()
    }

    pub fn has_else(&self) -> bool {
        self.else_handler.is_some()
    }

    pub fn selectors(&self) -> Vec<&str> {
        let mut all: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        all.sort_unstable();
        all
    }
}

impl fmt::Debug for IrClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("IrClass");
        s.field("name", &self.name);
        let mut handlers: Vec<_> = self.handlers.iter().collect();
        handlers.sort_by(|a, b| a.0.cmp(b.0));
        s.field("handlers", &handlers);
        if let Some(handler) = &self.else_handler {
            s.field("else", handler);
        }
        s.finish()
    }
}

/// Accumulates handlers for one class and enforces registration rules.
pub struct ClassBuilder {
    name: String,
    handlers: HashMap<String, Handler>,
    /// User-defined candidates, frozen into `On`/`OnBlock` by `build`.
    candidates: HashMap<String, Vec<Body>>,
    else_handler: Option<Handler>,
    shape: Option<FrameShape>,
    block: bool,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
            candidates: HashMap::new(),
            else_handler: None,
            shape: None,
            block: false,
        }
    }

    /// Classes of `do` literals; user handlers run in the captured context.
    pub fn block(name: impl Into<String>) -> Self {
        Self {
            block: true,
            ..Self::new(name)
        }
    }

    pub fn is_block(&self) -> bool {
        self.block
    }

    pub fn defines(&self, selector: &str) -> bool {
        self.handlers.contains_key(selector) || self.candidates.contains_key(selector)
    }

    pub fn set_shape(&mut self, shape: FrameShape) {
        self.shape = Some(shape);
    }

    pub fn add(
        &mut self,
        selector: impl Into<String>,
        handler: Handler,
        span: Span,
    ) -> Result<(), CompileError> {
        let selector = selector.into();
        if self.defines(&selector) {
            return Err(CompileError::DuplicateHandler { selector, span });
        }
        self.handlers.insert(selector, handler);
        Ok(())
    }

    /// Adds `handler` unless the selector is already taken.
    pub fn add_default(&mut self, selector: impl Into<String>, handler: Handler) {
        let selector = selector.into();
        if !self.defines(&selector) {
            self.handlers.insert(selector, handler);
        }
    }

    /// Adds a user-defined body. A selector may collect several candidates
    /// only while every earlier candidate is guarded.
    pub fn add_body(
        &mut self,
        selector: String,
        body: Body,
        span: Span,
    ) -> Result<(), CompileError> {
        if self.handlers.contains_key(&selector) {
            return Err(CompileError::DuplicateHandler { selector, span });
        }
        let candidates = self.candidates.entry(selector.clone()).or_default();
        if candidates.iter().any(|c| c.guards.is_empty()) {
            return Err(CompileError::DuplicateHandler { selector, span });
        }
        candidates.push(body);
        Ok(())
    }

    pub fn set_else(&mut self, handler: Handler, span: Span) -> Result<(), CompileError> {
        if self.else_handler.is_some() {
            return Err(CompileError::DuplicateElse { span });
        }
        self.else_handler = Some(handler);
        Ok(())
    }

    pub fn build(self) -> IrClass {
        let block = self.block;
        let mut handlers = self.handlers;
        for (selector, bodies) in self.candidates {
            let bodies: Rc<[Body]> = bodies.into();
            let handler = if block {
                Handler::OnBlock(bodies)
            } else {
                Handler::On(bodies)
            };
            handlers.insert(selector, handler);
        }
        IrClass {
            name: self.name,
            handlers,
            else_handler: self.else_handler,
            shape: self.shape,
        }
    }
}

// ── Handlers ──

#[derive(Clone)]
pub enum Handler {
    Constant(Value),
    Getter(usize),
    Primitive(PrimitiveDesc),
    Frame(FrameMethod),
    /// Candidates tried in declaration order; only the last may be
    /// unguarded.
    On(Rc<[Body]>),
    Else(Rc<Body>),
    /// Catch-all whose single do parameter re-sends the original message.
    Forward(Rc<Body>),
    OnBlock(Rc<[Body]>),
    ElseBlock(Rc<Body>),
    ForwardBlock(Rc<Body>),
    /// The `:` handler of a synthetic message block.
    Resend(String),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Constant(v) => write!(f, "Constant({v:?})"),
            Handler::Getter(i) => write!(f, "Getter({i})"),
            Handler::Primitive(_) => write!(f, "Primitive"),
            Handler::Frame(m) => write!(f, "Frame({m:?})"),
            Handler::On(bodies) => f.debug_tuple("On").field(bodies).finish(),
            Handler::Else(body) => f.debug_tuple("Else").field(body).finish(),
            Handler::Forward(body) => f.debug_tuple("Forward").field(body).finish(),
            Handler::OnBlock(bodies) => f.debug_tuple("OnBlock").field(bodies).finish(),
            Handler::ElseBlock(body) => f.debug_tuple("ElseBlock").field(body).finish(),
            Handler::ForwardBlock(body) => {
                f.debug_tuple("ForwardBlock").field(body).finish()
            }
            Handler::Resend(selector) => write!(f, "Resend({selector:?})"),
        }
    }
}

/// One compiled handler candidate.
#[derive(Debug)]
pub struct Body {
    /// In selector order.
    pub params: Vec<IrParam>,
    pub guards: Vec<Guard>,
    pub body: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrParam {
    /// `None` for guard parameters, which bind nothing.
    Value(Option<usize>),
    Var(usize),
    Do(usize),
}

impl IrParam {
    pub fn kind_name(&self) -> &'static str {
        match self {
            IrParam::Value(_) => "value",
            IrParam::Var(_) => "var",
            IrParam::Do(_) => "do",
        }
    }
}

/// Argument `arg` must equal `value` for the candidate to apply.
#[derive(Debug)]
pub struct Guard {
    pub arg: usize,
    pub value: Value,
}

// ── Code ──

#[derive(Debug)]
pub enum Expr {
    SelfRef,
    Constant(Value),
    Local(usize),
    Ivar(usize),
    /// Fields in sorted key order, then captured values.
    Object {
        class: Rc<IrClass>,
        ivars: Vec<Expr>,
    },
    Do(Rc<IrClass>),
    Send(Box<Send>),
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    Block {
        stmts: Vec<Stmt>,
        result: Box<Expr>,
    },
    Module(String),
}

#[derive(Debug)]
pub struct Send {
    pub selector: String,
    pub target: Expr,
    /// In selector order.
    pub args: Vec<Arg>,
    pub or_else: Option<Expr>,
}

#[derive(Debug)]
pub enum Arg {
    Value(Expr),
    Var(usize),
    Do(Expr),
}

#[derive(Debug)]
pub enum Stmt {
    Assign { slot: usize, value: Expr },
    Expr(Expr),
    Return(Expr),
    Defer(Rc<[Stmt]>),
    Provide { key: String, value: Expr },
    Using { key: String, slot: usize },
}

/// A compiled top-level unit.
#[derive(Debug)]
pub struct Program {
    pub body: Expr,
    pub locals: usize,
}
