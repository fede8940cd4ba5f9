//! # Courier
//!
//! A message-passing language where everything, from integers to `if`, is a
//! send to an immutable object.
//!
//! ```text
//!  source ──parse_source──▶ ast ──compile_program──▶ IR ──Interpreter──▶ Value
//! ```
//!
//! All compilation units run against one [`VM`], which owns the primitive
//! classes and the cache of frame classes.
pub mod activation;
pub mod compiler;
pub mod error;
pub mod frames;
pub mod interpreter;
pub mod ir;
pub mod primitives;
pub mod scope;
pub mod special;
pub mod value;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use ir::IrClass;

pub use error::{CompileError, Error, RuntimeError};
pub use interpreter::Interpreter;
pub use ir::Program;
pub use special::{bootstrap, SpecialClasses};
pub use value::Value;

/// Shared state of every compilation unit and run.
pub struct VM {
    pub special: SpecialClasses,
    /// Pure frame classes keyed by canonical selector.
    pub(crate) frames: RefCell<HashMap<String, Rc<IrClass>>>,
}

/// Parses and compiles one unit against `vm`.
pub fn compile_source(vm: &VM, source: &str) -> Result<Program, Error> {
    let stmts = parser::parse_source(source)?;
    Ok(compiler::compile_program(vm, &stmts)?)
}

/// Compiles and runs `source` as the root unit of `interp`.
pub fn run_source(interp: &mut Interpreter, source: &str) -> Result<Value, Error> {
    let program = compile_source(interp.vm(), source)?;
    interp.run(&program)
}
