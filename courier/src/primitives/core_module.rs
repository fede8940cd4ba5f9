//! The native `core` module, importable as `import core from "core"`.
use std::rc::Rc;

use crate::activation::ContextRef;
use crate::error::RuntimeError;
use crate::interpreter::{Exec, Interpreter};
use crate::ir::{Handler, IrClass};
use crate::primitives::{arg, builder, PrimitiveDesc};
use crate::value::{Payload, Value};

pub fn core_array(interp: &mut Interpreter, _ctx: &ContextRef, _receiver: &Value, _args: &[Value]) -> Exec<Value> {
    Ok(interp.vm().array(Vec::new()))
}

pub fn core_cell(interp: &mut Interpreter, _ctx: &ContextRef, _receiver: &Value, args: &[Value]) -> Exec<Value> {
    let initial = arg(args, 0)?.clone();
    Ok(interp.vm().cell(initial))
}

/// Strings are shown as is, everything else through `debug`.
fn display(interp: &mut Interpreter, ctx: &ContextRef, value: &Value) -> Exec<String> {
    match value.as_str() {
        Some(s) => Ok(s.to_string()),
        None => interp.debug_string(ctx, value.clone()),
    }
}

pub fn core_panic(interp: &mut Interpreter, ctx: &ContextRef, _receiver: &Value, args: &[Value]) -> Exec<Value> {
    let message = display(interp, ctx, arg(args, 0)?)?;
    Err(RuntimeError::Panic(message).into())
}

pub fn core_print(interp: &mut Interpreter, ctx: &ContextRef, _receiver: &Value, args: &[Value]) -> Exec<Value> {
    let text = display(interp, ctx, arg(args, 0)?)?;
    println!("{text}");
    Ok(interp.vm().unit())
}

/// Prints the `debug` rendering and answers the argument unchanged.
pub fn core_debug(interp: &mut Interpreter, ctx: &ContextRef, _receiver: &Value, args: &[Value]) -> Exec<Value> {
    let value = arg(args, 0)?.clone();
    let text = interp.debug_string(ctx, value.clone())?;
    println!("{text}");
    Ok(value)
}

pub fn primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("array", 0, core_array),
        PrimitiveDesc::new("cell:", 1, core_cell),
        PrimitiveDesc::new("panic:", 1, core_panic),
        PrimitiveDesc::new("print:", 1, core_print),
        PrimitiveDesc::new("debug:", 1, core_debug),
    ]
}

/// The core class also answers `unit` and `version` with constants, built
/// from the already bootstrapped unit and string classes.
pub fn class(unit: &Rc<IrClass>, string: &Rc<IrClass>) -> IrClass {
    let mut builder = builder("core", &primitives());
    let version = Value::Primitive(string.clone(), Payload::Str(Rc::from(env!("CARGO_PKG_VERSION"))));
    let constants = [
        ("unit", Value::Primitive(unit.clone(), Payload::Unit)),
        ("version", version),
    ];
    for (selector, value) in constants {
        builder.add_default(selector, Handler::Constant(value));
    }
    builder.build()
}
