//! Value coercions
//!
//! One truthiness table for the whole interpreter; every conditional and
//! logical operator routes through `as_bool`. The fallible conversions
//! raise faults at a default span, which callers re-position with
//! `Fault::at`.

use crate::error::{EvalResult, Fault};
use crate::runtime::value::Value;
use crate::span::Span;

impl Value {
    /// Total: every value is truthy or falsy, no faults.
    ///
    /// nil and false are falsy; zero numerics, the empty string and empty
    /// aggregates are falsy; everything else (functions, channels,
    /// objects, types, modules) is truthy. NaN is non-zero, so truthy.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(arr) => !arr.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Func(_)
            | Value::NativeFn(_, _)
            | Value::Method(_, _)
            | Value::Chan(_)
            | Value::Object(_)
            | Value::Type(_)
            | Value::Module(_) => true,
        }
    }

    /// Int passes through, floats truncate toward zero, bools map to 1/0,
    /// strings parse as base-10 or `0x` hex.
    pub fn as_int(&self) -> EvalResult<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Float(x) => Ok(*x as i64),
            Value::Bool(true) => Ok(1),
            Value::Bool(false) => Ok(0),
            Value::Str(s) => {
                let text = s.trim();
                let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    Some(hex) => i64::from_str_radix(hex, 16).ok(),
                    None => text.parse::<i64>().ok(),
                };
                parsed.ok_or_else(|| {
                    Fault::coerce(
                        format!("couldn't convert to integer: {:?}", s),
                        Span::default(),
                    )
                })
            }
            other => Err(Fault::coerce(
                format!("couldn't convert {} to integer", other.type_name()),
                Span::default(),
            )),
        }
    }

    pub fn as_float(&self) -> EvalResult<f64> {
        match self {
            Value::Float(x) => Ok(*x),
            Value::Int(n) => Ok(*n as f64),
            Value::Bool(true) => Ok(1.0),
            Value::Bool(false) => Ok(0.0),
            Value::Str(s) => s.trim().parse::<f64>().map_err(|_| {
                Fault::coerce(
                    format!("couldn't convert to float: {:?}", s),
                    Span::default(),
                )
            }),
            other => Err(Fault::coerce(
                format!("couldn't convert {} to float", other.type_name()),
                Span::default(),
            )),
        }
    }

    /// Total: the Display form.
    pub fn as_str(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::{MapKey, MapRef};

    #[test]
    fn test_truthiness_table() {
        assert!(!Value::Nil.as_bool());
        assert!(!Value::Bool(false).as_bool());
        assert!(Value::Bool(true).as_bool());
        assert!(!Value::Int(0).as_bool());
        assert!(Value::Int(-1).as_bool());
        assert!(!Value::Float(0.0).as_bool());
        assert!(Value::Float(f64::NAN).as_bool());
        assert!(!Value::Str(String::new()).as_bool());
        assert!(Value::Str("false".to_string()).as_bool());
        assert!(!Value::array(vec![]).as_bool());
        assert!(Value::array(vec![Value::Nil]).as_bool());
        assert!(!Value::empty_map().as_bool());
        let map = MapRef::new();
        map.insert(MapKey::Int(1), Value::Nil);
        assert!(Value::Map(map).as_bool());
    }

    #[test]
    fn test_as_bool_idempotent() {
        let samples = vec![
            Value::Nil,
            Value::Bool(true),
            Value::Int(0),
            Value::Int(7),
            Value::Float(0.0),
            Value::Float(2.5),
            Value::Str(String::new()),
            Value::Str("x".to_string()),
            Value::array(vec![]),
            Value::array(vec![Value::Int(1)]),
            Value::empty_map(),
        ];
        for v in samples {
            let once = v.as_bool();
            assert_eq!(Value::Bool(once).as_bool(), once, "not idempotent for {:?}", v);
        }
    }

    #[test]
    fn test_as_int() {
        assert_eq!(Value::Int(5).as_int().unwrap(), 5);
        assert_eq!(Value::Float(3.9).as_int().unwrap(), 3);
        assert_eq!(Value::Float(-3.9).as_int().unwrap(), -3);
        assert_eq!(Value::Bool(true).as_int().unwrap(), 1);
        assert_eq!(Value::Str("42".to_string()).as_int().unwrap(), 42);
        assert_eq!(Value::Str("-7".to_string()).as_int().unwrap(), -7);
        assert_eq!(Value::Str("0x2a".to_string()).as_int().unwrap(), 42);
        assert!(Value::Str("pears".to_string()).as_int().is_err());
        assert!(Value::Nil.as_int().is_err());
        assert!(Value::array(vec![]).as_int().is_err());
    }

    #[test]
    fn test_as_float() {
        assert_eq!(Value::Float(1.5).as_float().unwrap(), 1.5);
        assert_eq!(Value::Int(2).as_float().unwrap(), 2.0);
        assert_eq!(Value::Str("2.5".to_string()).as_float().unwrap(), 2.5);
        assert!(Value::Str("pears".to_string()).as_float().is_err());
        assert!(Value::Nil.as_float().is_err());
    }

    #[test]
    fn test_as_str_is_display() {
        assert_eq!(Value::Nil.as_str(), "nil");
        assert_eq!(Value::Int(3).as_str(), "3");
        assert_eq!(Value::Str("hi".to_string()).as_str(), "hi");
    }
}
