use parser::{ParseError, Span};
use thiserror::Error;

/// Raised while resolving names and building IR. Compilation of the unit
/// stops at the first one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("unknown identifier `{name}` at {span}")]
    UnknownIdentifier { name: String, span: Span },
    #[error("object cannot capture var `{name}` at {span}")]
    CaptureVar { name: String, span: Span },
    #[error("object cannot capture do `{name}` at {span}")]
    CaptureDo { name: String, span: Span },
    #[error("`{name}` is not a var at {span}")]
    NotAVar { name: String, span: Span },
    #[error("var `{name}` lives outside this object at {span}")]
    VarOutOfReach { name: String, span: Span },
    #[error("var `{name}` is borrowed twice in one send at {span}")]
    DoubleBorrow { name: String, span: Span },
    #[error("handler `{selector}` is defined twice at {span}")]
    DuplicateHandler { selector: String, span: Span },
    #[error("second else handler at {span}")]
    DuplicateElse { span: Span },
    #[error("key `{key}` appears twice at {span}")]
    DuplicateKey { key: String, span: Span },
    #[error("invalid let binding at {span}")]
    InvalidLetBinding { span: Span },
    #[error("invalid var binding at {span}")]
    InvalidVarBinding { span: Span },
    #[error("invalid assignment target at {span}")]
    InvalidSetTarget { span: Span },
    #[error("invalid import binding at {span}")]
    InvalidImportBinding { span: Span },
    #[error("provide needs `key: value` pairs at {span}")]
    InvalidProvide { span: Span },
    #[error("using needs a key or `key: name` pairs at {span}")]
    InvalidUsing { span: Span },
    #[error("invalid frame field at {span}")]
    InvalidFrameField { span: Span },
    #[error("var argument must name a var at {span}")]
    InvalidVarArg { span: Span },
    #[error("do value used outside argument position at {span}")]
    InvalidDoUsage { span: Span },
    #[error("invalid parameter at {span}")]
    InvalidParam { span: Span },
    #[error("else takes no parameters or a single `{{: name}}` at {span}")]
    InvalidElseParams { span: Span },
    #[error("try-send on self can never fall back, the object has an else handler, at {span}")]
    RedundantTrySend { span: Span },
    #[error("unreachable: {0}")]
    Unreachable(String),
}

/// Raised while executing IR.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("{class} has no handler for `{selector}`")]
    NoHandler { class: String, selector: String },
    #[error("nothing provides `{key}`")]
    NoProvider { key: String },
    #[error("`{selector}` expects a {expected} argument, got a {got} argument")]
    ParamMismatch {
        selector: String,
        expected: &'static str,
        got: &'static str,
    },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("collection is empty")]
    EmptyCollection,
    #[error("expected {expected}, got {got}")]
    TypeMismatch { expected: &'static str, got: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("panic: {0}")]
    Panic(String),
    #[error("do block used after its call returned")]
    ExpiredDo,
    #[error("module `{key}` imports itself")]
    CircularImport { key: String },
    #[error("no module named `{key}`")]
    UnknownModule { key: String },
    #[error("unreachable: {0}")]
    Unreachable(String),
}

/// Everything the pipeline can fail with. `Unreachable` from either tier is
/// reported as [`Error::Internal`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("compile error: {0}")]
    Compile(CompileError),
    #[error("runtime error: {0}")]
    Runtime(RuntimeError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::Unreachable(message) => Error::Internal(message),
            other => Error::Compile(other),
        }
    }
}

impl From<RuntimeError> for Error {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Unreachable(message) => Error::Internal(message),
            other => Error::Runtime(other),
        }
    }
}
