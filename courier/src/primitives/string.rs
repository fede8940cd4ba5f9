use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::activation::ContextRef;
use crate::error::RuntimeError;
use crate::interpreter::{Exec, Interpreter};
use crate::ir::IrClass;
use crate::primitives::{arg, builder, expect_index, expect_str, PrimitiveDesc};
use crate::value::Value;

pub fn string_concat(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let lhs = expect_str(receiver)?;
    let rhs = expect_str(arg(args, 0)?)?;
    Ok(interp.vm().string(format!("{lhs}{rhs}")))
}

pub fn string_eq(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let equal = receiver.as_str().is_some() && receiver.as_str() == arg(args, 0)?.as_str();
    Ok(interp.vm().boolean(equal))
}

pub fn string_ne(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let equal = receiver.as_str().is_some() && receiver.as_str() == arg(args, 0)?.as_str();
    Ok(interp.vm().boolean(!equal))
}

/// Length in characters.
pub fn string_length(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let len = expect_str(receiver)?.chars().count();
    Ok(interp.vm().int(len as i64))
}

/// The character at a position, as a one-character string.
pub fn string_at(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let s = expect_str(receiver)?;
    let len = s.chars().count();
    let index = expect_index(arg(args, 0)?, len)?;
    let c = s
        .chars()
        .nth(index)
        .ok_or_else(|| RuntimeError::Unreachable("character vanished".into()))?;
    Ok(interp.vm().string(c.to_string()))
}

pub fn string_debug(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let s = expect_str(receiver)?;
    Ok(interp.vm().string(format!("{s:?}")))
}

pub fn string_hash(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let mut hasher = DefaultHasher::new();
    expect_str(receiver)?.hash(&mut hasher);
    Ok(interp.vm().int(hasher.finish() as i64))
}

pub fn primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("++:", 1, string_concat),
        PrimitiveDesc::new("==:", 1, string_eq),
        PrimitiveDesc::new("!=:", 1, string_ne),
        PrimitiveDesc::new("length", 0, string_length),
        PrimitiveDesc::new("at:", 1, string_at),
        PrimitiveDesc::new("debug", 0, string_debug),
        PrimitiveDesc::new("hash", 0, string_hash),
    ]
}

pub fn class() -> IrClass {
    builder("string", &primitives()).build()
}
