//! Immutable arrays. Every "modifying" message answers a new array.
use crate::activation::ContextRef;
use crate::error::RuntimeError;
use crate::interpreter::{Exec, Interpreter};
use crate::ir::IrClass;
use crate::primitives::{arg, builder, expect_array, expect_index, PrimitiveDesc};
use crate::value::Value;

pub fn array_length(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let items = expect_array(receiver)?;
    Ok(interp.vm().int(items.len() as i64))
}

pub fn array_at(_interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let items = expect_array(receiver)?;
    let index = expect_index(arg(args, 0)?, items.len())?;
    Ok(items[index].clone())
}

pub fn array_push(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let mut items = expect_array(receiver)?.as_ref().clone();
    items.push(arg(args, 0)?.clone());
    Ok(interp.vm().array(items))
}

pub fn array_first(_interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let items = expect_array(receiver)?;
    items
        .first()
        .cloned()
        .ok_or_else(|| RuntimeError::EmptyCollection.into())
}

pub fn array_concat(interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let mut items = expect_array(receiver)?.as_ref().clone();
    items.extend(expect_array(arg(args, 0)?)?.iter().cloned());
    Ok(interp.vm().array(items))
}

/// Sends `{: item}` to the block for each item and collects the answers.
pub fn array_map(interp: &mut Interpreter, ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let items = expect_array(receiver)?.clone();
    let block = arg(args, 0)?;
    let mut mapped = Vec::with_capacity(items.len());
    for item in items.iter() {
        mapped.push(interp.send_values(ctx, ":", block.clone(), vec![item.clone()])?);
    }
    Ok(interp.vm().array(mapped))
}

pub fn array_each(interp: &mut Interpreter, ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let items = expect_array(receiver)?.clone();
    let block = arg(args, 0)?;
    for item in items.iter() {
        interp.send_values(ctx, ":", block.clone(), vec![item.clone()])?;
    }
    Ok(interp.vm().unit())
}

/// Threads an accumulator through `{acc: _ item: _}` sends, starting from
/// the `into:` value.
pub fn array_fold(interp: &mut Interpreter, ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let items = expect_array(receiver)?.clone();
    let block = arg(args, 0)?;
    let mut acc = arg(args, 1)?.clone();
    for item in items.iter() {
        acc = interp.send_values(ctx, "acc:item:", block.clone(), vec![acc, item.clone()])?;
    }
    Ok(acc)
}

pub fn array_debug(interp: &mut Interpreter, ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let items = expect_array(receiver)?.clone();
    let mut parts = Vec::with_capacity(items.len());
    for item in items.iter() {
        parts.push(interp.debug_string(ctx, item.clone())?);
    }
    Ok(interp.vm().string(format!("[{}]", parts.join(", "))))
}

/// Element-wise `==:`, stopping at the first difference.
pub fn array_eq(interp: &mut Interpreter, ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let items = expect_array(receiver)?.clone();
    let Some(other) = arg(args, 0)?.as_array().cloned() else {
        return Ok(interp.vm().boolean(false));
    };
    if items.len() != other.len() {
        return Ok(interp.vm().boolean(false));
    }
    for (a, b) in items.iter().zip(other.iter()) {
        let equal = interp.send_values(ctx, "==:", a.clone(), vec![b.clone()])?;
        if equal.as_bool() != Some(true) {
            return Ok(interp.vm().boolean(false));
        }
    }
    Ok(interp.vm().boolean(true))
}

pub fn primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("length", 0, array_length),
        PrimitiveDesc::new("at:", 1, array_at),
        PrimitiveDesc::new("push:", 1, array_push),
        PrimitiveDesc::new("first", 0, array_first),
        PrimitiveDesc::new("++:", 1, array_concat),
        PrimitiveDesc::new("map:", 1, array_map),
        PrimitiveDesc::new("each:", 1, array_each),
        PrimitiveDesc::new("fold:into:", 2, array_fold),
        PrimitiveDesc::new("debug", 0, array_debug),
        PrimitiveDesc::new("==:", 1, array_eq),
    ]
}

pub fn class() -> IrClass {
    builder("array", &primitives()).build()
}

#[cfg(test)]
mod tests {
    use crate::error::{Error, RuntimeError};
    use crate::testing::{run, run_err};

    fn with_items(body: &str) -> String {
        format!(
            "import core from \"core\";\n\
             let xs := core{{array}}{{push: 1}}{{push: 2}}{{push: 3}};\n\
             {body}"
        )
    }

    #[test]
    fn access() {
        assert_eq!(run(&with_items("xs{length}")).as_int(), Some(3));
        assert_eq!(run(&with_items("xs{at: 1}")).as_int(), Some(2));
        assert_eq!(run(&with_items("xs{first}")).as_int(), Some(1));
        assert!(matches!(
            run_err(&with_items("xs{at: 3}")),
            Error::Runtime(RuntimeError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert!(matches!(
            run_err(&with_items("core{array}{first}")),
            Error::Runtime(RuntimeError::EmptyCollection)
        ));
    }

    #[test]
    fn push_leaves_the_original() {
        assert_eq!(
            run(&with_items("let ys := xs{push: 4}; xs{length} * 10 + ys{length}")).as_int(),
            Some(34)
        );
    }

    #[test]
    fn higher_order() {
        assert_eq!(
            run(&with_items("xs{map: do {: x} x * x}{debug}")).as_str(),
            Some("[1, 4, 9]")
        );
        assert_eq!(
            run(&with_items("xs{fold: do {acc: a item: x} a + x into: 10}")).as_int(),
            Some(16)
        );
        assert_eq!(
            run(&with_items("(xs ++ xs){debug}")).as_str(),
            Some("[1, 2, 3, 1, 2, 3]")
        );
    }

    #[test]
    fn equality() {
        assert_eq!(run(&with_items("xs == xs{map: do {: x} x}")).as_bool(), Some(true));
        assert_eq!(run(&with_items("xs == xs{push: 4}")).as_bool(), Some(false));
        assert_eq!(run(&with_items("xs == 1")).as_bool(), Some(false));
    }
}
