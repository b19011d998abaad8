//! Operator dispatch
//!
//! Pure value-in/value-out evaluation for binary and unary operators.
//! `&&`, `||` and `??` short-circuit in the expression evaluator before
//! both operands exist; the strict forms here keep the dispatch total.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::ast::{BinOp, UnaryOp};
use crate::error::{EvalResult, Fault};
use crate::runtime::value::{MapKey, Value};
use crate::span::Span;

pub fn eval_binop(op: BinOp, left: &Value, right: &Value, span: Span) -> EvalResult<Value> {
    match op {
        BinOp::Add => add(left, right, span),
        BinOp::Sub => sub(left, right, span),
        BinOp::Mul => mul(left, right, span),
        BinOp::Div => div(left, right, span),
        BinOp::Mod => rem(left, right, span),

        BinOp::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinOp::Lt => Ok(Value::Bool(
            order(left, right, "<", span)? == Some(Ordering::Less),
        )),
        BinOp::Le => Ok(Value::Bool(matches!(
            order(left, right, "<=", span)?,
            Some(Ordering::Less) | Some(Ordering::Equal)
        ))),
        BinOp::Gt => Ok(Value::Bool(
            order(left, right, ">", span)? == Some(Ordering::Greater),
        )),
        BinOp::Ge => Ok(Value::Bool(matches!(
            order(left, right, ">=", span)?,
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ))),

        BinOp::And => Ok(Value::Bool(left.as_bool() && right.as_bool())),
        BinOp::Or => Ok(Value::Bool(left.as_bool() || right.as_bool())),
        BinOp::Coalesce => Ok(if left.is_nil() {
            right.clone()
        } else {
            left.clone()
        }),

        BinOp::In => membership(left, right, span),

        BinOp::BitAnd => int_operands(op, left, right, span).map(|(a, b)| Value::Int(a & b)),
        BinOp::BitOr => int_operands(op, left, right, span).map(|(a, b)| Value::Int(a | b)),
        BinOp::BitXor => int_operands(op, left, right, span).map(|(a, b)| Value::Int(a ^ b)),
        BinOp::Shl => {
            let (a, b) = int_operands(op, left, right, span)?;
            if !(0..64).contains(&b) {
                return Err(Fault::range(format!("shift count {} out of range", b), span));
            }
            Ok(Value::Int(a << b))
        }
        BinOp::Shr => {
            let (a, b) = int_operands(op, left, right, span)?;
            if !(0..64).contains(&b) {
                return Err(Fault::range(format!("shift count {} out of range", b), span));
            }
            Ok(Value::Int(a >> b))
        }
    }
}

pub fn eval_unary(op: UnaryOp, operand: &Value, span: Span) -> EvalResult<Value> {
    match op {
        UnaryOp::Neg => match operand {
            Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
            Value::Float(x) => Ok(Value::Float(-x)),
            other => Err(Fault::coerce(
                format!("unsupported operand type for -: {}", other.type_name()),
                span,
            )),
        },
        UnaryOp::Not => Ok(Value::Bool(!operand.as_bool())),
        UnaryOp::BitNot => match operand {
            Value::Int(n) => Ok(Value::Int(!n)),
            other => Err(Fault::coerce(
                format!("unsupported operand type for ^: {}", other.type_name()),
                span,
            )),
        },
    }
}

/// Structural equality. Numeric kinds compare across int/float; handles
/// compare by element for arrays and maps, by identity for everything
/// opaque. Remaining combinations are cross-kind and unequal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            let xs = x.to_vec();
            let ys = y.to_vec();
            xs.len() == ys.len() && xs.iter().zip(&ys).all(|(l, r)| values_equal(l, r))
        }
        (Value::Map(x), Value::Map(y)) => {
            if x.same_table(y) {
                return true;
            }
            let pairs = x.pairs();
            pairs.len() == y.len()
                && pairs.iter().all(|(k, v)| match y.get(k) {
                    Some(w) => values_equal(v, &w),
                    None => false,
                })
        }
        (Value::Func(x), Value::Func(y)) => Arc::ptr_eq(x, y),
        (Value::NativeFn(x, _), Value::NativeFn(y, _)) => x == y,
        (Value::Chan(x), Value::Chan(y)) => x.same_channel(y),
        (Value::Object(x), Value::Object(y)) => x.same_object(y),
        (Value::Method(ox, nx), Value::Method(oy, ny)) => ox.same_object(oy) && nx == ny,
        (Value::Type(x), Value::Type(y)) => Arc::ptr_eq(x, y),
        (Value::Module(x), Value::Module(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

fn add(left: &Value, right: &Value, span: Span) -> EvalResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (Value::Array(a), Value::Array(b)) => {
            let mut items = a.to_vec();
            items.extend(b.to_vec());
            Ok(Value::array(items))
        }
        // array + element appends into a new array
        (Value::Array(a), other) => {
            let mut items = a.to_vec();
            items.push(other.clone());
            Ok(Value::array(items))
        }
        (a, b) => Err(type_fault("+", a, b, span)),
    }
}

fn sub(left: &Value, right: &Value, span: Span) -> EvalResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 - b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a - *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
        (a, b) => Err(type_fault("-", a, b, span)),
    }
}

fn mul(left: &Value, right: &Value, span: Span) -> EvalResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(*b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 * b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a * *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
        (Value::Str(s), Value::Int(n)) => {
            if *n < 0 {
                return Err(Fault::range(
                    format!("cannot repeat a string {} times", n),
                    span,
                ));
            }
            Ok(Value::Str(s.repeat(*n as usize)))
        }
        (a, b) => Err(type_fault("*", a, b, span)),
    }
}

/// Integer division truncates toward zero. Only integer zero divisors
/// fault; float division follows IEEE.
fn div(left: &Value, right: &Value, span: Span) -> EvalResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(Fault::range("division by zero", span));
            }
            Ok(Value::Int(a.wrapping_div(*b)))
        }
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 / b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a / *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
        (a, b) => Err(type_fault("/", a, b, span)),
    }
}

fn rem(left: &Value, right: &Value, span: Span) -> EvalResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(Fault::range("modulo by zero", span));
            }
            Ok(Value::Int(a.wrapping_rem(*b)))
        }
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 % b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a % *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a % b)),
        (a, b) => Err(type_fault("%", a, b, span)),
    }
}

/// None means unordered (NaN was involved); every comparison against an
/// unordered pair is false.
fn order(
    left: &Value,
    right: &Value,
    op_symbol: &str,
    span: Span,
) -> EvalResult<Option<Ordering>> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::Int(a), Value::Float(b)) => Ok((*a as f64).partial_cmp(b)),
        (Value::Float(a), Value::Int(b)) => Ok(a.partial_cmp(&(*b as f64))),
        (Value::Float(a), Value::Float(b)) => Ok(a.partial_cmp(b)),
        (a, b) => Err(type_fault(op_symbol, a, b, span)),
    }
}

fn membership(left: &Value, right: &Value, span: Span) -> EvalResult<Value> {
    match right {
        Value::Array(arr) => Ok(Value::Bool(
            arr.to_vec().iter().any(|item| values_equal(left, item)),
        )),
        Value::Map(map) => {
            let key = MapKey::from_value(left, span)?;
            Ok(Value::Bool(map.contains(&key)))
        }
        Value::Str(s) => match left {
            Value::Str(sub) => Ok(Value::Bool(s.contains(sub.as_str()))),
            other => Err(Fault::coerce(
                format!("cannot search a string for {}", other.type_name()),
                span,
            )),
        },
        other => Err(Fault::coerce(
            format!("cannot use in on {}", other.type_name()),
            span,
        )),
    }
}

fn int_operands(op: BinOp, left: &Value, right: &Value, span: Span) -> EvalResult<(i64, i64)> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok((*a, *b)),
        (a, b) => Err(type_fault(op.symbol(), a, b, span)),
    }
}

fn type_fault(op: &str, left: &Value, right: &Value, span: Span) -> Fault {
    Fault::coerce(
        format!(
            "unsupported operand types for {}: {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ),
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;
    use crate::runtime::value::MapRef;

    fn binop(op: BinOp, left: Value, right: Value) -> EvalResult<Value> {
        eval_binop(op, &left, &right, Span::default())
    }

    fn int(op: BinOp, a: i64, b: i64) -> i64 {
        match binop(op, Value::Int(a), Value::Int(b)) {
            Ok(Value::Int(n)) => n,
            other => panic!("expected int result, got {:?}", other),
        }
    }

    #[test]
    fn test_integer_division_truncates() {
        assert_eq!(int(BinOp::Div, 7, 2), 3);
        assert_eq!(int(BinOp::Div, -7, 2), -3);
        assert_eq!(int(BinOp::Div, 7, -2), -3);
        assert_eq!(int(BinOp::Mod, 7, 2), 1);
        assert_eq!(int(BinOp::Mod, -7, 2), -1);
    }

    #[test]
    fn test_division_by_zero_faults() {
        let err = binop(BinOp::Div, Value::Int(1), Value::Int(0)).unwrap_err();
        assert!(matches!(err.kind, FaultKind::Range));
        let err = binop(BinOp::Mod, Value::Int(1), Value::Int(0)).unwrap_err();
        assert!(matches!(err.kind, FaultKind::Range));
    }

    #[test]
    fn test_min_over_minus_one_wraps() {
        assert_eq!(int(BinOp::Div, i64::MIN, -1), i64::MIN);
    }

    #[test]
    fn test_widening() {
        match binop(BinOp::Add, Value::Int(1), Value::Float(2.5)).unwrap() {
            Value::Float(x) => assert_eq!(x, 3.5),
            other => panic!("expected float, got {:?}", other),
        }
        match binop(BinOp::Div, Value::Float(1.0), Value::Int(0)).unwrap() {
            Value::Float(x) => assert!(x.is_infinite()),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_string_concat_and_repeat() {
        assert_eq!(
            binop(
                BinOp::Add,
                Value::Str("ab".to_string()),
                Value::Str("cd".to_string())
            )
            .unwrap()
            .to_string(),
            "abcd"
        );
        assert_eq!(
            binop(BinOp::Mul, Value::Str("ab".to_string()), Value::Int(3))
                .unwrap()
                .to_string(),
            "ababab"
        );
        let err = binop(BinOp::Mul, Value::Str("ab".to_string()), Value::Int(-1)).unwrap_err();
        assert!(matches!(err.kind, FaultKind::Range));
    }

    #[test]
    fn test_string_plus_non_string_faults() {
        let err = binop(BinOp::Add, Value::Str("n=".to_string()), Value::Int(3)).unwrap_err();
        assert!(matches!(err.kind, FaultKind::Coerce));
        assert!(err.message.contains("+"));
    }

    #[test]
    fn test_array_concat_leaves_originals() {
        let a = Value::array(vec![Value::Int(1)]);
        let b = Value::array(vec![Value::Int(2)]);
        let joined = binop(BinOp::Add, a.clone(), b.clone()).unwrap();
        assert_eq!(joined.to_string(), "[1, 2]");
        assert_eq!(a.to_string(), "[1]");
        assert_eq!(b.to_string(), "[2]");
        let appended = binop(BinOp::Add, a.clone(), Value::Int(9)).unwrap();
        assert_eq!(appended.to_string(), "[1, 9]");
        assert_eq!(a.to_string(), "[1]");
    }

    #[test]
    fn test_equality_cross_kind() {
        assert!(!values_equal(&Value::Int(0), &Value::Str("0".to_string())));
        assert!(!values_equal(&Value::Nil, &Value::Bool(false)));
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(values_equal(&Value::Nil, &Value::Nil));
    }

    #[test]
    fn test_array_and_map_equality_structural() {
        let a = Value::array(vec![Value::Int(1), Value::Str("x".to_string())]);
        let b = Value::array(vec![Value::Int(1), Value::Str("x".to_string())]);
        assert!(values_equal(&a, &b));

        let m1 = MapRef::new();
        m1.insert(MapKey::Str("k".to_string()), Value::Int(1));
        let m2 = MapRef::new();
        m2.insert(MapKey::Str("k".to_string()), Value::Int(1));
        assert!(values_equal(&Value::Map(m1), &Value::Map(m2)));
    }

    #[test]
    fn test_ordering() {
        assert!(matches!(
            binop(BinOp::Lt, Value::Str("abc".to_string()), Value::Str("abd".to_string())),
            Ok(Value::Bool(true))
        ));
        assert!(matches!(
            binop(BinOp::Ge, Value::Int(2), Value::Float(2.0)),
            Ok(Value::Bool(true))
        ));
        let err = binop(BinOp::Lt, Value::Bool(true), Value::Bool(false)).unwrap_err();
        assert!(matches!(err.kind, FaultKind::Coerce));
    }

    #[test]
    fn test_nan_comparisons_all_false() {
        for op in [BinOp::Lt, BinOp::Le, BinOp::Gt, BinOp::Ge] {
            assert!(matches!(
                binop(op, Value::Float(f64::NAN), Value::Int(1)),
                Ok(Value::Bool(false))
            ));
        }
    }

    #[test]
    fn test_bitwise_requires_ints() {
        assert_eq!(int(BinOp::BitAnd, 6, 3), 2);
        assert_eq!(int(BinOp::BitOr, 6, 3), 7);
        assert_eq!(int(BinOp::BitXor, 6, 3), 5);
        assert_eq!(int(BinOp::Shl, 1, 4), 16);
        assert_eq!(int(BinOp::Shr, -8, 1), -4);
        let err = binop(BinOp::BitAnd, Value::Bool(true), Value::Int(1)).unwrap_err();
        assert!(matches!(err.kind, FaultKind::Coerce));
    }

    #[test]
    fn test_shift_count_range() {
        let err = binop(BinOp::Shl, Value::Int(1), Value::Int(64)).unwrap_err();
        assert!(matches!(err.kind, FaultKind::Range));
        let err = binop(BinOp::Shr, Value::Int(1), Value::Int(-1)).unwrap_err();
        assert!(matches!(err.kind, FaultKind::Range));
    }

    #[test]
    fn test_membership() {
        let arr = Value::array(vec![Value::Int(1), Value::Int(2)]);
        assert!(matches!(binop(BinOp::In, Value::Int(2), arr.clone()), Ok(Value::Bool(true))));
        assert!(matches!(binop(BinOp::In, Value::Int(9), arr), Ok(Value::Bool(false))));

        let map = MapRef::new();
        map.insert(MapKey::Str("k".to_string()), Value::Int(1));
        assert!(matches!(
            binop(BinOp::In, Value::Str("k".to_string()), Value::Map(map)),
            Ok(Value::Bool(true))
        ));

        assert!(matches!(
            binop(
                BinOp::In,
                Value::Str("ell".to_string()),
                Value::Str("hello".to_string())
            ),
            Ok(Value::Bool(true))
        ));
    }

    #[test]
    fn test_unary() {
        assert!(matches!(
            eval_unary(UnaryOp::Neg, &Value::Int(3), Span::default()),
            Ok(Value::Int(-3))
        ));
        assert!(matches!(
            eval_unary(UnaryOp::Not, &Value::Str(String::new()), Span::default()),
            Ok(Value::Bool(true))
        ));
        assert!(matches!(
            eval_unary(UnaryOp::BitNot, &Value::Int(0), Span::default()),
            Ok(Value::Int(-1))
        ));
        assert!(eval_unary(UnaryOp::Neg, &Value::Str("x".to_string()), Span::default()).is_err());
    }
}
