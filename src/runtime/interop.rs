//! Host interop bridge
//!
//! Hosts expose native objects to scripts through one capability trait.
//! An object enters the interpreter in one of two flavors: `Shared`
//! (mutable, method calls and field writes land on the live object) or
//! `Frozen` (an immutable snapshot). Calling a mutating method on a
//! frozen object still succeeds: the call runs on a private copy and the
//! mutation is discarded with it.

use std::sync::{Arc, RwLock};

use crate::error::{EvalResult, Fault};
use crate::runtime::value::Value;
use crate::span::Span;

pub trait HostObject: Send + Sync {
    /// The name scripts see in `type_of` and fault messages.
    fn type_name(&self) -> &str;

    /// Field read; None when the object has no such field.
    fn field(&self, name: &str) -> Option<Value>;

    /// Field write; false when the object has no such field or refuses
    /// the value.
    fn set_field(&mut self, name: &str, value: Value) -> bool {
        let _ = (name, value);
        false
    }

    /// Whether `name` resolves to a callable method. Member access uses
    /// this to build bound-method values without calling anything.
    fn has_method(&self, name: &str) -> bool {
        let _ = name;
        false
    }

    /// Method dispatch; None when the object has no such method.
    fn call_method(&mut self, name: &str, args: Vec<Value>) -> Option<EvalResult<Value>> {
        let _ = (name, args);
        None
    }

    fn clone_box(&self) -> Box<dyn HostObject>;
}

#[derive(Clone)]
pub enum ObjectRef {
    Shared(Arc<RwLock<Box<dyn HostObject>>>),
    Frozen(Arc<dyn HostObject>),
}

impl ObjectRef {
    pub fn shared(object: impl HostObject + 'static) -> ObjectRef {
        ObjectRef::Shared(Arc::new(RwLock::new(Box::new(object))))
    }

    pub fn frozen(object: impl HostObject + 'static) -> ObjectRef {
        ObjectRef::Frozen(Arc::new(object))
    }

    pub fn type_name(&self) -> String {
        match self {
            ObjectRef::Shared(obj) => obj.read().unwrap().type_name().to_string(),
            ObjectRef::Frozen(obj) => obj.type_name().to_string(),
        }
    }

    pub fn same_object(&self, other: &ObjectRef) -> bool {
        match (self, other) {
            (ObjectRef::Shared(a), ObjectRef::Shared(b)) => Arc::ptr_eq(a, b),
            (ObjectRef::Frozen(a), ObjectRef::Frozen(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        match self {
            ObjectRef::Shared(obj) => obj.read().unwrap().field(name),
            ObjectRef::Frozen(obj) => obj.field(name),
        }
    }

    pub fn set_field(&self, name: &str, value: Value, span: Span) -> EvalResult<()> {
        match self {
            ObjectRef::Shared(obj) => {
                if obj.write().unwrap().set_field(name, value) {
                    Ok(())
                } else {
                    Err(Fault::coerce(
                        format!(
                            "cannot assign to member '{}' of {}",
                            name,
                            self.type_name()
                        ),
                        span,
                    ))
                }
            }
            ObjectRef::Frozen(obj) => Err(Fault::coerce(
                format!(
                    "cannot assign to member '{}' of frozen {}",
                    name,
                    obj.type_name()
                ),
                span,
            )),
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        match self {
            ObjectRef::Shared(obj) => obj.read().unwrap().has_method(name),
            ObjectRef::Frozen(obj) => obj.has_method(name),
        }
    }

    /// Runs a method. Frozen objects fall back to a throwaway copy so
    /// methods that take the receiver mutably still run.
    pub fn invoke(&self, name: &str, args: Vec<Value>, span: Span) -> EvalResult<Value> {
        let result = match self {
            ObjectRef::Shared(obj) => obj.write().unwrap().call_method(name, args),
            ObjectRef::Frozen(obj) => {
                let mut copy = obj.clone_box();
                copy.call_method(name, args)
            }
        };
        match result {
            Some(outcome) => outcome.map_err(|fault| fault.at(span)),
            None => Err(member_fault(name, &self.type_name(), span)),
        }
    }
}

pub fn member_fault(name: &str, type_name: &str, span: Span) -> Fault {
    Fault::lookup(format!("no member named '{}' for {}", name, type_name), span)
}
