//! Parse tree.
//!
//! The parser accepts binding shapes (`let`, `var`, `import`, parameter
//! patterns) as ordinary expressions; the compiler decides which shapes are
//! valid where. Every [`Expr`] and [`Stmt`] carries its source [`Span`].
use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    SelfRef,
    /// `()`
    Unit,
    Integer(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Ident(String),

    /// `(a; b; c)` evaluates to its last expression statement.
    Parens(Vec<Stmt>),

    /// `[on {...} body; else body; field: value]`, at least one handler.
    Object {
        fields: Vec<Pair>,
        handlers: Vec<HandlerDecl>,
    },
    /// `[]`, `[tag]`, `[x: 1 y: 2]`.
    Frame(Message),

    /// `target{message}`
    Send {
        target: Box<Expr>,
        message: Message,
    },
    /// `target{message} ?? alternate`
    TrySend {
        target: Box<Expr>,
        message: Message,
        or_else: Box<Expr>,
    },

    /// `do body`, `do {params} body`, `do [on ...; else ...]`.
    Do(Vec<HandlerDecl>),

    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },

    /// `-x`, `!x`
    UnaryOp {
        op: String,
        operand: Box<Expr>,
    },
    /// `a + b`
    BinaryOp {
        op: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// The contents of `{...}` in a send, a frame, `provide` or `using`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `{key}`; the blank message `{}` is `Key("")`.
    Key(String),
    Pairs(Vec<Pair>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    /// `""` for the positional key `: x`.
    pub key: String,
    pub value: Arg,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Expr(Expr),
    /// `key: var x`
    Var(Expr),
    /// `key:` with no value stands for `key: key`.
    Pun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    On,
    Else,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandlerDecl {
    pub kind: HandlerKind,
    /// Always present for `on`; optional for `else`.
    pub params: Option<Params>,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Key(String),
    Pairs(Vec<ParamPair>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamPair {
    pub key: String,
    pub param: Param,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// A name, a literal guard, or a frame pattern.
    Binding(Expr),
    /// `key: name := default`
    Default { binding: Expr, default: Expr },
    /// `key: var name`
    Var(Expr),
    /// `key: do name`
    Do(Expr),
    /// `key:`
    Pun,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let { binding: Expr, value: Expr },
    Var { binding: Expr, value: Expr },
    /// `target := value`
    Set { target: Expr, value: Expr },
    /// `set x{message}`
    SetInPlace(Expr),
    Import { binding: Expr, module: String },
    Provide(Message),
    Using(Message),
    Return(Expr),
    Defer(Expr),
    Expr(Expr),
}
