use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use num_bigint::BigInt;
use num_traits::Zero;

use crate::activation::ContextRef;
use crate::error::RuntimeError;
use crate::interpreter::{Exec, Interpreter};
use crate::ir::IrClass;
use crate::primitives::{arg, builder, compare_numbers, numbers_equal, Comparison, Number, PrimitiveDesc};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Arith {
    fn small(self, a: i64, b: i64) -> Option<i64> {
        match self {
            Arith::Add => a.checked_add(b),
            Arith::Sub => a.checked_sub(b),
            Arith::Mul => a.checked_mul(b),
            Arith::Div => a.checked_div(b),
            Arith::Rem => a.checked_rem(b),
        }
    }

    fn big(self, a: BigInt, b: BigInt) -> BigInt {
        match self {
            Arith::Add => a + b,
            Arith::Sub => a - b,
            Arith::Mul => a * b,
            Arith::Div => a / b,
            Arith::Rem => a % b,
        }
    }

    pub(crate) fn float(self, a: f64, b: f64) -> f64 {
        match self {
            Arith::Add => a + b,
            Arith::Sub => a - b,
            Arith::Mul => a * b,
            Arith::Div => a / b,
            Arith::Rem => a % b,
        }
    }
}

fn expect_integer(value: &Value) -> Result<Number<'_>, RuntimeError> {
    match Number::of(value) {
        Some(n) if !n.is_float() => Ok(n),
        _ => Err(RuntimeError::TypeMismatch {
            expected: "integer",
            got: value.kind_name(),
        }),
    }
}

/// Exact while both sides are integers: overflow promotes to a big integer
/// and results that fit are demoted again. A float operand makes the
/// result a float.
fn arith(interp: &mut Interpreter, receiver: &Value, args: &[Value], op: Arith) -> Exec<Value> {
    let lhs = expect_integer(receiver)?;
    let rhs = Number::expect(arg(args, 0)?)?;
    let vm = interp.vm();
    if rhs.is_float() {
        return Ok(vm.float(op.float(lhs.to_f64(), rhs.to_f64())));
    }
    if let (Number::Small(a), Number::Small(b)) = (lhs, rhs) {
        if matches!(op, Arith::Div | Arith::Rem) && b == 0 {
            return Err(RuntimeError::DivisionByZero.into());
        }
        if let Some(result) = op.small(a, b) {
            return Ok(vm.int(result));
        }
    }
    match (lhs.to_bigint(), rhs.to_bigint()) {
        (Some(a), Some(b)) => {
            if matches!(op, Arith::Div | Arith::Rem) && b.is_zero() {
                return Err(RuntimeError::DivisionByZero.into());
            }
            Ok(vm.bigint(op.big(a, b)))
        }
        _ => Err(RuntimeError::Unreachable("integer operand turned into a float".into()).into()),
    }
}

pub fn integer_add(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    arith(interp, receiver, args, Arith::Add)
}

pub fn integer_sub(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    arith(interp, receiver, args, Arith::Sub)
}

pub fn integer_mul(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    arith(interp, receiver, args, Arith::Mul)
}

pub fn integer_div(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    arith(interp, receiver, args, Arith::Div)
}

pub fn integer_rem(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    arith(interp, receiver, args, Arith::Rem)
}

pub fn integer_neg(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let vm = interp.vm();
    match expect_integer(receiver)? {
        Number::Small(n) => match n.checked_neg() {
            Some(negated) => Ok(vm.int(negated)),
            None => Ok(vm.bigint(-BigInt::from(n))),
        },
        Number::Big(n) => Ok(vm.bigint(-n.clone())),
        Number::Float(x) => Ok(vm.float(-x)),
    }
}

pub fn integer_eq(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let equal = numbers_equal(receiver, arg(args, 0)?);
    Ok(interp.vm().boolean(equal))
}

pub fn integer_ne(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let equal = numbers_equal(receiver, arg(args, 0)?);
    Ok(interp.vm().boolean(!equal))
}

pub fn integer_lt(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    compare_numbers(interp, receiver, args, Comparison::Lt)
}

pub fn integer_le(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    compare_numbers(interp, receiver, args, Comparison::Le)
}

pub fn integer_gt(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    compare_numbers(interp, receiver, args, Comparison::Gt)
}

pub fn integer_ge(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    compare_numbers(interp, receiver, args, Comparison::Ge)
}

pub fn integer_debug(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let text = match expect_integer(receiver)? {
        Number::Small(n) => n.to_string(),
        Number::Big(n) => n.to_string(),
        Number::Float(x) => format!("{x:?}"),
    };
    Ok(interp.vm().string(text))
}

pub fn integer_hash(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let hash = match expect_integer(receiver)? {
        Number::Small(n) => n,
        Number::Big(n) => {
            let mut hasher = DefaultHasher::new();
            n.hash(&mut hasher);
            hasher.finish() as i64
        }
        Number::Float(x) => x.to_bits() as i64,
    };
    Ok(interp.vm().int(hash))
}

pub fn primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("+:", 1, integer_add),
        PrimitiveDesc::new("-:", 1, integer_sub),
        PrimitiveDesc::new("*:", 1, integer_mul),
        PrimitiveDesc::new("/:", 1, integer_div),
        PrimitiveDesc::new("%:", 1, integer_rem),
        PrimitiveDesc::new("==:", 1, integer_eq),
        PrimitiveDesc::new("!=:", 1, integer_ne),
        PrimitiveDesc::new("<:", 1, integer_lt),
        PrimitiveDesc::new("<=:", 1, integer_le),
        PrimitiveDesc::new(">:", 1, integer_gt),
        PrimitiveDesc::new(">=:", 1, integer_ge),
        PrimitiveDesc::new("-", 0, integer_neg),
        PrimitiveDesc::new("debug", 0, integer_debug),
        PrimitiveDesc::new("hash", 0, integer_hash),
    ]
}

pub fn class() -> IrClass {
    builder("integer", &primitives()).build()
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;

    use crate::error::{Error, RuntimeError};
    use crate::testing::{run, run_err};

    #[test]
    fn arithmetic() {
        assert_eq!(run("1 + 2 * 3").as_int(), Some(7));
        assert_eq!(run("(1 + 2) * 3").as_int(), Some(9));
        assert_eq!(run("7 / 2").as_int(), Some(3));
        assert_eq!(run("-7 % 3").as_int(), Some(-1));
        assert_eq!(run("5{-}").as_int(), Some(-5));
        assert_eq!(run("let x := 4; -x").as_int(), Some(-4));
    }

    #[test]
    fn overflow_promotes_and_demotes() {
        let big = run("9223372036854775807 + 1");
        assert_eq!(big.as_int(), None);
        assert_eq!(big.as_bigint(), Some(&(BigInt::from(i64::MAX) + BigInt::from(1))));
        assert_eq!(run("9223372036854775807 + 1 - 1").as_int(), Some(i64::MAX));
        assert_eq!(
            run("(9223372036854775807 * 4){debug}").as_str(),
            Some("36893488147419103228")
        );
        assert_eq!(run("(9223372036854775807 + 1) > 0").as_bool(), Some(true));
    }

    #[test]
    fn mixing_with_floats() {
        assert_eq!(run("1 + 0.5").as_float(), Some(1.5));
        assert_eq!(run("1 == 1.0").as_bool(), Some(true));
        assert_eq!(run("2 < 2.5").as_bool(), Some(true));
    }

    #[test]
    fn comparisons_and_equality() {
        assert_eq!(run("1 < 2").as_bool(), Some(true));
        assert_eq!(run("2 <= 1").as_bool(), Some(false));
        assert_eq!(run("3 >= 3").as_bool(), Some(true));
        assert_eq!(run("1 == \"1\"").as_bool(), Some(false));
        assert_eq!(run("1 != 2").as_bool(), Some(true));
        assert!(matches!(
            run_err("1 < \"2\""),
            Error::Runtime(RuntimeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn division_by_zero() {
        assert!(matches!(
            run_err("1 / 0"),
            Error::Runtime(RuntimeError::DivisionByZero)
        ));
        assert!(matches!(
            run_err("(9223372036854775807 + 1) % 0"),
            Error::Runtime(RuntimeError::DivisionByZero)
        ));
    }

    #[test]
    fn debug_and_hash() {
        assert_eq!(run("42{debug}").as_str(), Some("42"));
        assert_eq!(run("-3{hash}").as_int(), Some(-3));
    }
}
