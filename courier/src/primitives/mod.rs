use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::activation::ContextRef;
use crate::error::RuntimeError;
use crate::interpreter::{Exec, Interpreter};
use crate::ir::{ClassBuilder, Handler};
use crate::value::{Payload, Value};

pub mod array;
pub mod boolean;
pub mod cell;
pub mod core_module;
pub mod float;
pub mod integer;
pub mod string;

pub type PrimitiveFn = fn(&mut Interpreter, &ContextRef, &Value, &[Value]) -> Exec<Value>;

#[derive(Clone, Copy)]
pub struct PrimitiveDesc {
    pub selector: &'static str,
    pub arity: u8,
    pub func: PrimitiveFn,
}

impl PrimitiveDesc {
    pub const fn new(selector: &'static str, arity: u8, func: PrimitiveFn) -> Self {
        Self {
            selector,
            arity,
            func,
        }
    }

    /// Runs the primitive once the argument count matches `arity`.
    pub fn call(
        &self,
        interp: &mut Interpreter,
        ctx: &ContextRef,
        target: &Value,
        args: &[Value],
    ) -> Exec<Value> {
        if args.len() != usize::from(self.arity) {
            return Err(RuntimeError::Unreachable(format!(
                "`{}` takes {} arguments, got {}",
                self.selector,
                self.arity,
                args.len()
            ))
            .into());
        }
        (self.func)(interp, ctx, target, args)
    }
}

/// A class builder preloaded with one primitive handler per descriptor.
pub(crate) fn builder(name: &str, primitives: &[PrimitiveDesc]) -> ClassBuilder {
    let mut builder = ClassBuilder::new(name);
    for desc in primitives {
        builder.add_default(desc.selector, Handler::Primitive(*desc));
    }
    builder
}

// ── Argument helpers ──

pub(crate) fn arg(args: &[Value], index: usize) -> Exec<&Value> {
    args.get(index).ok_or_else(|| {
        RuntimeError::Unreachable(format!("primitive argument {index} missing")).into()
    })
}

fn mismatch(expected: &'static str, got: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected,
        got: got.kind_name(),
    }
}

pub(crate) fn expect_str(value: &Value) -> Result<&str, RuntimeError> {
    value.as_str().ok_or_else(|| mismatch("string", value))
}

pub(crate) fn expect_bool(value: &Value) -> Result<bool, RuntimeError> {
    value.as_bool().ok_or_else(|| mismatch("boolean", value))
}

pub(crate) fn expect_array(value: &Value) -> Result<&Rc<Vec<Value>>, RuntimeError> {
    value.as_array().ok_or_else(|| mismatch("array", value))
}

/// A valid position in a sequence of `len` elements.
pub(crate) fn expect_index(value: &Value, len: usize) -> Result<usize, RuntimeError> {
    let index = value.as_int().ok_or_else(|| mismatch("integer index", value))?;
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or(RuntimeError::IndexOutOfRange { index, len })
}

// ── Numbers ──

/// Numeric view of a value shared by the integer and float classes.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Number<'a> {
    Small(i64),
    Big(&'a BigInt),
    Float(f64),
}

impl<'a> Number<'a> {
    pub(crate) fn of(value: &'a Value) -> Option<Self> {
        match value.payload()? {
            Payload::Int(n) => Some(Number::Small(*n)),
            Payload::BigInt(n) => Some(Number::Big(n)),
            Payload::Float(x) => Some(Number::Float(*x)),
            _ => None,
        }
    }

    pub(crate) fn expect(value: &'a Value) -> Result<Self, RuntimeError> {
        Self::of(value).ok_or_else(|| mismatch("number", value))
    }

    pub(crate) fn is_float(&self) -> bool {
        matches!(self, Number::Float(_))
    }

    pub(crate) fn to_f64(&self) -> f64 {
        match self {
            Number::Small(n) => *n as f64,
            Number::Big(n) => n.to_f64().unwrap_or(f64::NAN),
            Number::Float(x) => *x,
        }
    }

    /// `None` for floats.
    pub(crate) fn to_bigint(&self) -> Option<BigInt> {
        match self {
            Number::Small(n) => Some(BigInt::from(*n)),
            Number::Big(n) => Some((*n).clone()),
            Number::Float(_) => None,
        }
    }

    pub(crate) fn compare(&self, other: &Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Small(a), Number::Small(b)) => Some(a.cmp(b)),
            _ => match (self.to_bigint(), other.to_bigint()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => self.to_f64().partial_cmp(&other.to_f64()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn holds(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (_, None) => false,
            (Comparison::Lt, Some(o)) => o == Ordering::Less,
            (Comparison::Le, Some(o)) => o != Ordering::Greater,
            (Comparison::Gt, Some(o)) => o == Ordering::Greater,
            (Comparison::Ge, Some(o)) => o != Ordering::Less,
        }
    }
}

/// `==:` between numbers; anything else is simply unequal.
pub(crate) fn numbers_equal(receiver: &Value, other: &Value) -> bool {
    match (Number::of(receiver), Number::of(other)) {
        (Some(a), Some(b)) => a.compare(&b) == Some(Ordering::Equal),
        _ => false,
    }
}

pub(crate) fn compare_numbers(
    interp: &mut Interpreter,
    receiver: &Value,
    args: &[Value],
    comparison: Comparison,
) -> Exec<Value> {
    let lhs = Number::expect(receiver)?;
    let rhs = Number::expect(arg(args, 0)?)?;
    Ok(interp.vm().boolean(comparison.holds(lhs.compare(&rhs))))
}
