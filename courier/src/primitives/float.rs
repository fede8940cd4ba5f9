use crate::activation::ContextRef;
use crate::error::RuntimeError;
use crate::interpreter::{Exec, Interpreter};
use crate::ir::IrClass;
use crate::primitives::integer::Arith;
use crate::primitives::{arg, builder, compare_numbers, numbers_equal, Comparison, Number, PrimitiveDesc};
use crate::value::Value;

fn expect_float(value: &Value) -> Result<f64, RuntimeError> {
    value.as_float().ok_or_else(|| RuntimeError::TypeMismatch {
        expected: "float",
        got: value.kind_name(),
    })
}

fn arith(interp: &mut Interpreter, receiver: &Value, args: &[Value], op: Arith) -> Exec<Value> {
    let lhs = expect_float(receiver)?;
    let rhs = Number::expect(arg(args, 0)?)?.to_f64();
    Ok(interp.vm().float(op.float(lhs, rhs)))
}

pub fn float_add(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    arith(interp, receiver, args, Arith::Add)
}

pub fn float_sub(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    arith(interp, receiver, args, Arith::Sub)
}

pub fn float_mul(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    arith(interp, receiver, args, Arith::Mul)
}

pub fn float_div(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    arith(interp, receiver, args, Arith::Div)
}

pub fn float_rem(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    arith(interp, receiver, args, Arith::Rem)
}

pub fn float_neg(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let x = expect_float(receiver)?;
    Ok(interp.vm().float(-x))
}

pub fn float_eq(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let equal = numbers_equal(receiver, arg(args, 0)?);
    Ok(interp.vm().boolean(equal))
}

pub fn float_ne(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let equal = numbers_equal(receiver, arg(args, 0)?);
    Ok(interp.vm().boolean(!equal))
}

pub fn float_lt(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    compare_numbers(interp, receiver, args, Comparison::Lt)
}

pub fn float_le(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    compare_numbers(interp, receiver, args, Comparison::Le)
}

pub fn float_gt(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    compare_numbers(interp, receiver, args, Comparison::Gt)
}

pub fn float_ge(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    compare_numbers(interp, receiver, args, Comparison::Ge)
}

pub fn float_debug(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let x = expect_float(receiver)?;
    Ok(interp.vm().string(format!("{x:?}")))
}

pub fn float_hash(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let x = expect_float(receiver)?;
    Ok(interp.vm().int(x.to_bits() as i64))
}

pub fn primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("+:", 1, float_add),
        PrimitiveDesc::new("-:", 1, float_sub),
        PrimitiveDesc::new("*:", 1, float_mul),
        PrimitiveDesc::new("/:", 1, float_div),
        PrimitiveDesc::new("%:", 1, float_rem),
        PrimitiveDesc::new("==:", 1, float_eq),
        PrimitiveDesc::new("!=:", 1, float_ne),
        PrimitiveDesc::new("<:", 1, float_lt),
        PrimitiveDesc::new("<=:", 1, float_le),
        PrimitiveDesc::new(">:", 1, float_gt),
        PrimitiveDesc::new(">=:", 1, float_ge),
        PrimitiveDesc::new("-", 0, float_neg),
        PrimitiveDesc::new("debug", 0, float_debug),
        PrimitiveDesc::new("hash", 0, float_hash),
    ]
}

pub fn class() -> IrClass {
    builder("float", &primitives()).build()
}

#[cfg(test)]
mod tests {
    use crate::testing::run;

    #[test]
    fn arithmetic_accepts_integers() {
        assert_eq!(run("1.5 + 1").as_float(), Some(2.5));
        assert_eq!(run("1.0 / 0").as_float(), Some(f64::INFINITY));
        assert_eq!(run("-2.5").as_float(), Some(-2.5));
        assert_eq!(run("let x := 2.5; -x").as_float(), Some(-2.5));
    }

    #[test]
    fn comparison_and_debug() {
        assert_eq!(run("0.1 < 0.2").as_bool(), Some(true));
        assert_eq!(run("2.0 == 2").as_bool(), Some(true));
        assert_eq!(run("2.0{debug}").as_str(), Some("2.0"));
        assert_eq!(run("2.0 != \"2\"").as_bool(), Some(true));
    }
}
