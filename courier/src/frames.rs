//! Frames: structural records such as `[x: 1 y: 2]` or `[none]`.
//!
//! A frame's class is derived from its sorted field keys and cached on the
//! [`VM`] by canonical selector, so every `[x: _ y: _]` literal in every
//! compilation unit sharing the VM gets the same class. Objects that declare
//! fields get the same derived methods, minus any the user defined.
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use log::debug;

use crate::activation::ContextRef;
use crate::error::RuntimeError;
use crate::interpreter::{Exec, Interpreter};
use crate::ir::{ClassBuilder, FrameShape, Handler, IrClass};
use crate::value::{Object, Value};
use crate::VM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMethod {
    /// `k:` returns a copy with field `k` replaced.
    Setter(usize),
    /// `->k:` sends the block `{: current}` and stores the result.
    Updater(usize),
    /// `:` sends the frame's own selector with its fields to a block.
    Matcher,
    Equals,
    NotEquals,
    Debug,
    Hash,
    /// `fold:into:` on a field-less frame answers the `into:` value.
    Fold,
}

impl FrameShape {
    pub fn new(selector: impl Into<String>, keys: Vec<String>) -> Self {
        Self {
            selector: selector.into(),
            keys,
        }
    }

    fn class_name(&self) -> String {
        if self.keys.is_empty() {
            format!("[{}]", self.selector)
        } else {
            let keys: Vec<String> = self.keys.iter().map(|k| format!("{k}:")).collect();
            format!("[{}]", keys.join(" "))
        }
    }
}

/// Installs getters, setters, updaters and the per-class frame methods,
/// skipping every selector the builder already defines.
pub fn install(builder: &mut ClassBuilder, shape: &FrameShape) {
    for (index, key) in shape.keys.iter().enumerate() {
        builder.add_default(key.clone(), Handler::Getter(index));
        builder.add_default(format!("{key}:"), Handler::Frame(FrameMethod::Setter(index)));
        builder.add_default(format!("->{key}:"), Handler::Frame(FrameMethod::Updater(index)));
    }
    builder.add_default(":", Handler::Frame(FrameMethod::Matcher));
    builder.add_default("==:", Handler::Frame(FrameMethod::Equals));
    builder.add_default("!=:", Handler::Frame(FrameMethod::NotEquals));
    builder.add_default("debug", Handler::Frame(FrameMethod::Debug));
    builder.add_default("hash", Handler::Frame(FrameMethod::Hash));
    if shape.keys.is_empty() {
        builder.add_default("fold:into:", Handler::Frame(FrameMethod::Fold));
    }
    builder.set_shape(shape.clone());
}

impl VM {
    /// Returns the cached class for a pure frame, building it on first use.
    pub fn frame_class(&self, selector: &str, keys: &[String]) -> Rc<IrClass> {
        if let Some(class) = self.frames.borrow().get(selector) {
            return class.clone();
        }
        let shape = FrameShape::new(selector, keys.to_vec());
        let mut builder = ClassBuilder::new(shape.class_name());
        install(&mut builder, &shape);
        let class = Rc::new(builder.build());
        debug!("created frame class {}", class.name);
        self.frames
            .borrow_mut()
            .insert(selector.to_string(), class.clone());
        class
    }

    pub fn cached_frames(&self) -> usize {
        self.frames.borrow().len()
    }
}

// ── Derived behaviour ──

fn receiver_object(receiver: &Value) -> Exec<&Rc<Object>> {
    receiver.as_object().ok_or_else(|| {
        RuntimeError::Unreachable(format!(
            "frame method on non-object {}",
            receiver.kind_name()
        ))
        .into()
    })
}

fn field(obj: &Object, index: usize) -> Exec<Value> {
    obj.ivars.get(index).cloned().ok_or_else(|| {
        RuntimeError::Unreachable(format!("{} has no field {index}", obj.class.name)).into()
    })
}

fn arg(args: &[Value], index: usize) -> Exec<Value> {
    args.get(index)
        .cloned()
        .ok_or_else(|| RuntimeError::Unreachable("missing frame argument".into()).into())
}

fn shape(obj: &Object) -> Exec<&FrameShape> {
    obj.class.shape.as_ref().ok_or_else(|| {
        RuntimeError::Unreachable(format!("{} is not frame-shaped", obj.class.name)).into()
    })
}

pub fn invoke(
    interp: &mut Interpreter,
    ctx: &ContextRef,
    method: FrameMethod,
    receiver: &Value,
    args: &[Value],
) -> Exec<Value> {
    let obj = receiver_object(receiver)?;
    match method {
        FrameMethod::Setter(index) => {
            let mut ivars = obj.ivars.clone();
            let slot = ivars.get_mut(index).ok_or_else(|| {
                RuntimeError::Unreachable(format!("{} has no field {index}", obj.class.name))
            })?;
            *slot = arg(args, 0)?;
            Ok(Value::object(obj.class.clone(), ivars))
        }
        FrameMethod::Updater(index) => {
            let current = field(obj, index)?;
            let updated = interp.send_values(ctx, ":", arg(args, 0)?, vec![current])?;
            let mut ivars = obj.ivars.clone();
            ivars[index] = updated;
            Ok(Value::object(obj.class.clone(), ivars))
        }
        FrameMethod::Matcher => {
            let shape = shape(obj)?;
            let fields = obj.ivars[..shape.keys.len()].to_vec();
            interp.send_values(ctx, &shape.selector, arg(args, 0)?, fields)
        }
        FrameMethod::Equals => {
            let equal = fields_equal(interp, ctx, obj, &arg(args, 0)?)?;
            Ok(interp.vm().boolean(equal))
        }
        FrameMethod::NotEquals => {
            let equal = fields_equal(interp, ctx, obj, &arg(args, 0)?)?;
            Ok(interp.vm().boolean(!equal))
        }
        FrameMethod::Debug => {
            let text = debug_frame(interp, ctx, obj)?;
            Ok(interp.vm().string(text))
        }
        FrameMethod::Hash => {
            let shape = shape(obj)?;
            let mut hasher = DefaultHasher::new();
            shape.selector.hash(&mut hasher);
            let mut hash = hasher.finish() as i64;
            for index in 0..shape.keys.len() {
                let value = interp.send_values(ctx, "hash", field(obj, index)?, Vec::new())?;
                let field_hash = value.as_int().ok_or_else(|| RuntimeError::TypeMismatch {
                    expected: "integer hash",
                    got: value.kind_name(),
                })?;
                hash = hash.wrapping_mul(31).wrapping_add(field_hash);
            }
            Ok(interp.vm().int(hash))
        }
        FrameMethod::Fold => arg(args, 1),
    }
}

/// Same class, then field-wise `==:` until the first `false`.
fn fields_equal(
    interp: &mut Interpreter,
    ctx: &ContextRef,
    obj: &Object,
    other: &Value,
) -> Exec<bool> {
    let Some(other) = other.as_object() else {
        return Ok(false);
    };
    if !Rc::ptr_eq(&obj.class, &other.class) {
        return Ok(false);
    }
    let fields = shape(obj)?.keys.len();
    for index in 0..fields {
        let result =
            interp.send_values(ctx, "==:", field(obj, index)?, vec![field(other, index)?])?;
        match result.as_bool() {
            Some(true) => {}
            Some(false) => return Ok(false),
            None => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "boolean",
                    got: result.kind_name(),
                }
                .into());
            }
        }
    }
    Ok(true)
}

fn debug_frame(interp: &mut Interpreter, ctx: &ContextRef, obj: &Object) -> Exec<String> {
    let shape = shape(obj)?;
    if shape.keys.is_empty() {
        return Ok(format!("[{}]", shape.selector));
    }
    let mut parts = Vec::with_capacity(shape.keys.len());
    for (index, key) in shape.keys.iter().enumerate() {
        let text = interp.debug_string(ctx, field(obj, index)?)?;
        parts.push(format!("{key}: {text}"));
    }
    Ok(format!("[{}]", parts.join(" ")))
}

#[cfg(test)]
mod tests {
    use crate::special::bootstrap;
    use crate::testing::{run, run_with};

    #[test]
    fn frame_class_is_cached_by_selector() {
        let vm = bootstrap();
        let keys = vec!["x".to_string(), "y".to_string()];
        let a = vm.frame_class("x:y:", &keys);
        let b = vm.frame_class("x:y:", &keys);
        assert!(std::rc::Rc::ptr_eq(&a, &b));
        assert_eq!(vm.cached_frames(), 1);
        vm.frame_class("none", &[]);
        assert_eq!(vm.cached_frames(), 2);
    }

    #[test]
    fn literals_share_the_cached_class() {
        let (value, vm) = run_with(
            "let a := [y: 2 x: 1];\n\
             let b := [x: 3 y: 4];\n\
             a{x} + b{y}",
        );
        assert_eq!(value.as_int(), Some(5));
        assert_eq!(vm.cached_frames(), 1);
    }

    #[test]
    fn getters_setters_and_updaters() {
        assert_eq!(run("[x: 1 y: 2]{x: 10}{x}").as_int(), Some(10));
        assert_eq!(run("let p := [x: 1 y: 2]; p{x: 10}; p{x}").as_int(), Some(1));
        assert_eq!(run("[n: 4]{->n: do {: v} v * 2}{n}").as_int(), Some(8));
        assert_eq!(run("[x: 1 y: 2]{x: 5} == [y: 2 x: 5]").as_bool(), Some(true));
        assert_eq!(run("[x: 1 y: 2]{->y: do {: v} v + 1} == [x: 1 y: 3]").as_bool(), Some(true));
    }

    #[test]
    fn matcher_sends_the_frame_selector() {
        assert_eq!(
            run("[x: 3 y: 4]{: do {x: a y: b} a * b}").as_int(),
            Some(12)
        );
        assert_eq!(
            run("[none]{: do [on {some: v} v; on {none} 0]}").as_int(),
            Some(0)
        );
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(run("[x: 1 y: 2] == [y: 2 x: 1]").as_bool(), Some(true));
        assert_eq!(run("[x: 1 y: 2] == [x: 1 y: 3]").as_bool(), Some(false));
        assert_eq!(run("[x: 1] == [y: 1]").as_bool(), Some(false));
        assert_eq!(run("[x: 1] != 1").as_bool(), Some(true));
        assert_eq!(run("[none] == [none]").as_bool(), Some(true));
    }

    #[test]
    fn debug_and_hash() {
        assert_eq!(
            run("[y: \"b\" x: 1]{debug}").as_str(),
            Some("[x: 1 y: \"b\"]")
        );
        assert_eq!(run("[none]{debug}").as_str(), Some("[none]"));
        assert_eq!(run("[]{debug}").as_str(), Some("[]"));
        assert_eq!(
            run("[x: 1 y: 2]{hash} == [y: 2 x: 1]{hash}").as_bool(),
            Some(true)
        );
        assert_eq!(
            run("[x: 1 y: 2]{hash} == [x: 2 y: 1]{hash}").as_bool(),
            Some(false)
        );
    }

    #[test]
    fn empty_frames_fold_to_their_seed() {
        assert_eq!(run("[none]{fold: do {: x} x into: 7}").as_int(), Some(7));
        assert!(crate::testing::run_err("[x: 1]{fold: do {: x} x into: 7}")
            .to_string()
            .contains("fold:into:"));
        assert!(crate::testing::run_err("[none]{: 0 fold: do {: x} x into: 7}")
            .to_string()
            .contains(":fold:into:"));
    }
}
