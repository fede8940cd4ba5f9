//! Booleans and unit.
use crate::activation::ContextRef;
use crate::interpreter::{Exec, Interpreter};
use crate::ir::IrClass;
use crate::primitives::{arg, builder, expect_bool, PrimitiveDesc};
use crate::value::Value;

pub fn boolean_not(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let b = expect_bool(receiver)?;
    Ok(interp.vm().boolean(!b))
}

/// Both operands are already evaluated; there is no short circuit.
pub fn boolean_and(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let a = expect_bool(receiver)?;
    let b = expect_bool(arg(args, 0)?)?;
    Ok(interp.vm().boolean(a && b))
}

pub fn boolean_or(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let a = expect_bool(receiver)?;
    let b = expect_bool(arg(args, 0)?)?;
    Ok(interp.vm().boolean(a || b))
}

pub fn boolean_eq(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let equal = receiver.as_bool().is_some() && receiver.as_bool() == arg(args, 0)?.as_bool();
    Ok(interp.vm().boolean(equal))
}

pub fn boolean_ne(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let equal = receiver.as_bool().is_some() && receiver.as_bool() == arg(args, 0)?.as_bool();
    Ok(interp.vm().boolean(!equal))
}

pub fn boolean_debug(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let b = expect_bool(receiver)?;
    Ok(interp.vm().string(b.to_string()))
}

pub fn boolean_hash(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let b = expect_bool(receiver)?;
    Ok(interp.vm().int(i64::from(b)))
}

/// `b{: do [on {true} ...; on {false} ...]}`
pub fn boolean_match(interp: &mut Interpreter, ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let selector = if expect_bool(receiver)? { "true" } else { "false" };
    interp.send_values(ctx, selector, arg(args, 0)?.clone(), Vec::new())
}

pub fn primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("!", 0, boolean_not),
        PrimitiveDesc::new("&&:", 1, boolean_and),
        PrimitiveDesc::new("||:", 1, boolean_or),
        PrimitiveDesc::new("==:", 1, boolean_eq),
        PrimitiveDesc::new("!=:", 1, boolean_ne),
        PrimitiveDesc::new("debug", 0, boolean_debug),
        PrimitiveDesc::new("hash", 0, boolean_hash),
        PrimitiveDesc::new(":", 1, boolean_match),
    ]
}

pub fn class() -> IrClass {
    builder("boolean", &primitives()).build()
}

// ── Unit ──

pub fn unit_debug(interp: &mut Interpreter, _ctx: &ContextRef, _receiver: &Value, _args: &[Value]) -> Exec<Value> {
    Ok(interp.vm().string("()"))
}

pub fn unit_eq(interp: &mut Interpreter, _ctx: &ContextRef, _receiver: &Value, args: &[Value]) -> Exec<Value> {
    let equal = arg(args, 0)?.is_unit();
    Ok(interp.vm().boolean(equal))
}

pub fn unit_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("debug", 0, unit_debug),
        PrimitiveDesc::new("==:", 1, unit_eq),
    ]
}

pub fn unit_class() -> IrClass {
    builder("unit", &unit_primitives()).build()
}

#[cfg(test)]
mod tests {
    use crate::error::{Error, RuntimeError};
    use crate::testing::{run, run_err};

    #[test]
    fn logic() {
        assert_eq!(run("!true").as_bool(), Some(false));
        assert_eq!(run("true && false").as_bool(), Some(false));
        assert_eq!(run("false || true").as_bool(), Some(true));
        assert_eq!(run("1 < 2 && 2 < 3").as_bool(), Some(true));
        assert_eq!(run("true == true").as_bool(), Some(true));
        assert_eq!(run("true != 1").as_bool(), Some(true));
        assert!(matches!(
            run_err("true && 1"),
            Error::Runtime(RuntimeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn matcher_sends_true_or_false() {
        let src = "(3 > 2){: do [on {true} \"yes\"; on {false} \"no\"]}";
        assert_eq!(run(src).as_str(), Some("yes"));
        let src = "false{: do [on {true} 1; else 0]}";
        assert_eq!(run(src).as_int(), Some(0));
    }

    #[test]
    fn unit() {
        assert_eq!(run("(){debug}").as_str(), Some("()"));
        assert_eq!(run("() == ()").as_bool(), Some(true));
        assert_eq!(run("() == 0").as_bool(), Some(false));
        assert_eq!(run("true{debug}").as_str(), Some("true"));
    }
}
