use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;

use crate::activation::ContextRef;
use crate::ir::IrClass;

/// A runtime datum. Every value knows its class, and everything a program
/// does to a value is a message send dispatched on that class.
#[derive(Clone)]
pub enum Value {
    /// An immutable instance of a compiled class.
    Object(Rc<Object>),
    /// A host-native payload behind a primitive class.
    Primitive(Rc<IrClass>, Payload),
    /// A block closing over the context that created it.
    Do(Rc<IrClass>, ContextRef),
}

pub struct Object {
    pub class: Rc<IrClass>,
    pub ivars: Vec<Value>,
}

#[derive(Clone)]
pub enum Payload {
    Int(i64),
    /// Only holds values outside the `i64` range.
    BigInt(Rc<BigInt>),
    Float(f64),
    Str(Rc<str>),
    Bool(bool),
    Unit,
    Array(Rc<Vec<Value>>),
    Cell(Rc<RefCell<Value>>),
    /// The native `core` module.
    Core,
}

impl Value {
    pub fn object(class: Rc<IrClass>, ivars: Vec<Value>) -> Value {
        Value::Object(Rc::new(Object { class, ivars }))
    }

    pub fn class(&self) -> &Rc<IrClass> {
        match self {
            Value::Object(obj) => &obj.class,
            Value::Primitive(class, _) | Value::Do(class, _) => class,
        }
    }

    /// Short description used in type errors.
    pub fn kind_name(&self) -> String {
        match self {
            Value::Object(obj) => obj.class.name.clone(),
            Value::Primitive(_, payload) => payload.kind_name().to_string(),
            Value::Do(..) => "do".to_string(),
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Value::Primitive(_, payload) => Some(payload),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.payload()? {
            Payload::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<&BigInt> {
        match self.payload()? {
            Payload::BigInt(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.payload()? {
            Payload::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.payload()? {
            Payload::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.payload()? {
            Payload::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Rc<Vec<Value>>> {
        match self.payload()? {
            Payload::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self.payload(), Some(Payload::Unit))
    }

    pub fn as_object(&self) -> Option<&Rc<Object>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Equality of literal-like payloads, used by parameter guards.
    /// Objects, blocks and containers never match.
    pub fn literal_eq(&self, other: &Value) -> bool {
        match (self.payload(), other.payload()) {
            (Some(Payload::Int(a)), Some(Payload::Int(b))) => a == b,
            (Some(Payload::BigInt(a)), Some(Payload::BigInt(b))) => a == b,
            (Some(Payload::Float(a)), Some(Payload::Float(b))) => a == b,
            (Some(Payload::Str(a)), Some(Payload::Str(b))) => a == b,
            (Some(Payload::Bool(a)), Some(Payload::Bool(b))) => a == b,
            (Some(Payload::Unit), Some(Payload::Unit)) => true,
            _ => false,
        }
    }
}

impl Payload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Int(_) | Payload::BigInt(_) => "integer",
            Payload::Float(_) => "float",
            Payload::Str(_) => "string",
            Payload::Bool(_) => "boolean",
            Payload::Unit => "unit",
            Payload::Array(_) => "array",
            Payload::Cell(_) => "cell",
            Payload::Core => "core",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Object(obj) => {
                write!(f, "<{}", obj.class.name)?;
                for ivar in &obj.ivars {
                    write!(f, " {ivar:?}")?;
                }
                write!(f, ">")
            }
            Value::Primitive(_, payload) => match payload {
                Payload::Int(n) => write!(f, "{n}"),
                Payload::BigInt(n) => write!(f, "{n}"),
                Payload::Float(x) => write!(f, "{x:?}"),
                Payload::Str(s) => write!(f, "{s:?}"),
                Payload::Bool(b) => write!(f, "{b}"),
                Payload::Unit => write!(f, "()"),
                Payload::Array(items) => f.debug_list().entries(items.iter()).finish(),
                Payload::Cell(cell) => match cell.try_borrow() {
                    Ok(inner) => write!(f, "cell({:?})", *inner),
                    Err(_) => write!(f, "cell(<borrowed>)"),
                },
                Payload::Core => write!(f, "<core>"),
            },
            Value::Do(class, ctx) => write!(f, "<{} in #{}>", class.name, ctx.id),
        }
    }
}
