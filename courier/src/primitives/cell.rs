//! Cells are the only mutable values.
use std::cell::RefCell;
use std::rc::Rc;

use crate::activation::ContextRef;
use crate::error::RuntimeError;
use crate::interpreter::{Exec, Interpreter};
use crate::ir::IrClass;
use crate::primitives::{arg, builder, PrimitiveDesc};
use crate::value::{Payload, Value};

fn expect_cell(value: &Value) -> Result<&Rc<RefCell<Value>>, RuntimeError> {
    match value.payload() {
        Some(Payload::Cell(cell)) => Ok(cell),
        _ => Err(RuntimeError::TypeMismatch {
            expected: "cell",
            got: value.kind_name(),
        }),
    }
}

pub fn cell_get(_interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    Ok(expect_cell(receiver)?.borrow().clone())
}

/// Stores the argument and answers it.
pub fn cell_set(_interp: &mut Interpreter, _ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let value = arg(args, 0)?.clone();
    *expect_cell(receiver)?.borrow_mut() = value.clone();
    Ok(value)
}

/// Sends `{: current}` to the block, stores the answer and returns it.
pub fn cell_update(interp: &mut Interpreter, ctx: &ContextRef, receiver: &Value, args: &[Value]) -> Exec<Value> {
    let cell = expect_cell(receiver)?.clone();
    let current = cell.borrow().clone();
    let updated = interp.send_values(ctx, ":", arg(args, 0)?.clone(), vec![current])?;
    *cell.borrow_mut() = updated.clone();
    Ok(updated)
}

pub fn cell_debug(interp: &mut Interpreter, ctx: &ContextRef, receiver: &Value, _args: &[Value]) -> Exec<Value> {
    let current = expect_cell(receiver)?.borrow().clone();
    let inner = interp.debug_string(ctx, current)?;
    Ok(interp.vm().string(format!("cell({inner})")))
}

pub fn primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::new("get", 0, cell_get),
        PrimitiveDesc::new("set:", 1, cell_set),
        PrimitiveDesc::new("update:", 1, cell_update),
        PrimitiveDesc::new("debug", 0, cell_debug),
    ]
}

pub fn class() -> IrClass {
    builder("cell", &primitives()).build()
}

#[cfg(test)]
mod tests {
    use crate::testing::run;

    #[test]
    fn get_set_update() {
        let src = "import core from \"core\";\n\
                   let c := core{cell: 1};\n\
                   c{set: 5};\n\
                   c{update: do {: v} v * 3};\n\
                   c{get}";
        assert_eq!(run(src).as_int(), Some(15));
    }

    #[test]
    fn cells_are_shared_through_objects() {
        let src = "import core from \"core\";\n\
                   let counter := core{cell: 0};\n\
                   let o := [on {bump} counter{update: do {: v} v + 1}];\n\
                   o{bump}; o{bump};\n\
                   counter{debug}";
        assert_eq!(run(src).as_str(), Some("cell(2)"));
    }

    #[test]
    fn update_may_read_the_cell() {
        let src = "import core from \"core\";\n\
                   let c := core{cell: 2};\n\
                   c{update: do {: v} v + c{get}}";
        assert_eq!(run(src).as_int(), Some(4));
    }
}
