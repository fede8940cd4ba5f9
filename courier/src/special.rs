use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::ir::IrClass;
use crate::primitives;
use crate::value::{Payload, Value};
use crate::VM;

/// Classes of every primitive payload plus the native `core` module.
pub struct SpecialClasses {
    pub integer: Rc<IrClass>,
    pub float: Rc<IrClass>,
    pub string: Rc<IrClass>,
    pub boolean: Rc<IrClass>,
    pub unit: Rc<IrClass>,
    pub array: Rc<IrClass>,
    pub cell: Rc<IrClass>,
    pub core: Rc<IrClass>,
}

/// Builds every primitive class and returns a fresh [`VM`] with an empty
/// frame cache.
pub fn bootstrap() -> VM {
    let unit = Rc::new(primitives::boolean::unit_class());
    let string = Rc::new(primitives::string::class());
    let core = Rc::new(primitives::core_module::class(&unit, &string));
    let special = SpecialClasses {
        integer: Rc::new(primitives::integer::class()),
        float: Rc::new(primitives::float::class()),
        string,
        boolean: Rc::new(primitives::boolean::class()),
        unit,
        array: Rc::new(primitives::array::class()),
        cell: Rc::new(primitives::cell::class()),
        core,
    };
    VM {
        special,
        frames: RefCell::new(HashMap::new()),
    }
}

impl VM {
    pub fn int(&self, n: i64) -> Value {
        Value::Primitive(self.special.integer.clone(), Payload::Int(n))
    }

    /// Big integers that fit in an `i64` are stored as plain integers.
    pub fn bigint(&self, n: BigInt) -> Value {
        match n.to_i64() {
            Some(small) => self.int(small),
            None => Value::Primitive(
                self.special.integer.clone(),
                Payload::BigInt(Rc::new(n)),
            ),
        }
    }

    pub fn float(&self, x: f64) -> Value {
        Value::Primitive(self.special.float.clone(), Payload::Float(x))
    }

    pub fn string(&self, s: impl Into<Rc<str>>) -> Value {
        Value::Primitive(self.special.string.clone(), Payload::Str(s.into()))
    }

    pub fn boolean(&self, b: bool) -> Value {
        Value::Primitive(self.special.boolean.clone(), Payload::Bool(b))
    }

    pub fn unit(&self) -> Value {
        Value::Primitive(self.special.unit.clone(), Payload::Unit)
    }

    pub fn array(&self, items: Vec<Value>) -> Value {
        Value::Primitive(self.special.array.clone(), Payload::Array(Rc::new(items)))
    }

    pub fn cell(&self, value: Value) -> Value {
        Value::Primitive(
            self.special.cell.clone(),
            Payload::Cell(Rc::new(RefCell::new(value))),
        )
    }

    pub fn core(&self) -> Value {
        Value::Primitive(self.special.core.clone(), Payload::Core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigint_demotes_when_it_fits() {
        let vm = bootstrap();
        assert_eq!(vm.bigint(BigInt::from(5)).as_int(), Some(5));
        let big = BigInt::from(i64::MAX) + BigInt::from(1);
        let value = vm.bigint(big.clone());
        assert_eq!(value.as_int(), None);
        assert_eq!(value.as_bigint(), Some(&big));
    }

    #[test]
    fn payload_classes() {
        let vm = bootstrap();
        assert!(Rc::ptr_eq(vm.int(1).class(), &vm.special.integer));
        assert!(Rc::ptr_eq(vm.string("a").class(), &vm.special.string));
        assert!(vm.unit().is_unit());
        assert_eq!(vm.boolean(true).as_bool(), Some(true));
    }
}
