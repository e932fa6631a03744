// ---------------------------------------------------------------------------
// Value comparison, ordering, arithmetic, and membership
// ---------------------------------------------------------------------------

use std::cmp::Ordering;
use std::sync::Arc;

use super::{ArithOp, CmpOp};
use crate::error::EvalError;
use crate::value::{Value, map_get};

/// Numeric kinds compare exactly when both sides are integers.
enum Num {
    Int(i128),
    Float(f64),
}

fn as_num(v: &Value) -> Option<Num> {
    match v {
        Value::Int(n) => Some(Num::Int(i128::from(*n))),
        Value::Uint(n) => Some(Num::Int(i128::from(*n))),
        Value::Double(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn num_order(a: Num, b: Num) -> Option<Ordering> {
    match (a, b) {
        (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
        (Num::Int(a), Num::Float(b)) => (a as f64).partial_cmp(&b),
        (Num::Float(a), Num::Int(b)) => a.partial_cmp(&(b as f64)),
        (Num::Float(a), Num::Float(b)) => a.partial_cmp(&b),
    }
}

pub(super) fn compare_values(left: &Value, op: CmpOp, right: &Value) -> Result<bool, EvalError> {
    let ord = match op {
        CmpOp::Eq => return Ok(values_equal(left, right)),
        CmpOp::Ne => return Ok(!values_equal(left, right)),
        _ => values_order(left, right).ok_or_else(|| {
            EvalError::runtime(format!(
                "no such overload: {} {} {}",
                left.type_name(),
                op.symbol(),
                right.type_name()
            ))
        })?,
    };
    // NaN compares false against everything.
    let Some(ord) = ord else {
        return Ok(false);
    };
    Ok(match op {
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Ge => ord != Ordering::Less,
        CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
    })
}

/// Heterogeneous equality: numbers compare by value across kinds, values of
/// different kinds are simply unequal. Map equality ignores key order.
pub(super) fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_num(left), as_num(right)) {
        return num_order(a, b) == Some(Ordering::Equal);
    }
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            Arc::ptr_eq(a, b)
                || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y)))
        }
        (Value::Object(a), Value::Object(b)) => {
            Arc::ptr_eq(a, b)
                || (a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| map_get(b, k).is_some_and(|bv| values_equal(v, bv))))
        }
        _ => false,
    }
}

/// Ordering for `<`-style operators. Outer `None`: the kinds are not
/// orderable against each other. Inner `None`: a NaN was involved.
fn values_order(left: &Value, right: &Value) -> Option<Option<Ordering>> {
    if let (Some(a), Some(b)) = (as_num(left), as_num(right)) {
        return Some(num_order(a, b));
    }
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Some(Some(a.cmp(b))),
        (Value::String(a), Value::String(b)) => Some(Some(a.cmp(b))),
        _ => None,
    }
}

/// `elem in container`: list membership by equality, map key presence.
pub(super) fn contains(elem: &Value, container: &Value) -> Result<bool, EvalError> {
    match container {
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(elem, v))),
        Value::Object(map) => match elem {
            Value::String(k) => Ok(map_get(map, k).is_some()),
            _ => Ok(false),
        },
        _ => Err(EvalError::runtime(format!(
            "no such overload: {} in {}",
            elem.type_name(),
            container.type_name()
        ))),
    }
}

/// Elements and entries reachable from `v`, counting stops once past `cap`.
fn element_count(v: &Value, cap: u64) -> u64 {
    match v {
        Value::Array(items) => count_children(items.iter(), cap),
        Value::Object(map) => count_children(map.iter().map(|(_, v)| v), cap),
        _ => 0,
    }
}

fn count_children<'v>(children: impl Iterator<Item = &'v Value>, cap: u64) -> u64 {
    let mut n = 0u64;
    for child in children {
        n = n.saturating_add(1 + element_count(child, cap.saturating_sub(n)));
        if n > cap {
            break;
        }
    }
    n
}

/// Units for a deep `==`/`!=`. Scalars and shared containers are free.
pub(super) fn equality_cost(left: &Value, right: &Value, cap: u64) -> u64 {
    match (left, right) {
        (Value::Array(a), Value::Array(b)) if !Arc::ptr_eq(a, b) && a.len() == b.len() => {
            element_count(left, cap)
        }
        (Value::Object(a), Value::Object(b)) if !Arc::ptr_eq(a, b) && a.len() == b.len() => {
            element_count(left, cap)
        }
        _ => 0,
    }
}

/// Units for `elem in list`: one per element, more when `elem` is itself a
/// container.
pub(super) fn contains_cost(elem: &Value, container: &Value, cap: u64) -> u64 {
    match container {
        Value::Array(items) => {
            (items.len() as u64).saturating_mul(1 + element_count(elem, cap))
        }
        _ => 0,
    }
}

/// Units for list and string concatenation.
pub(super) fn concat_cost(left: &Value, op: ArithOp, right: &Value) -> u64 {
    match (left, op, right) {
        (Value::Array(a), ArithOp::Add, Value::Array(b)) => (a.len() + b.len()) as u64,
        (Value::String(a), ArithOp::Add, Value::String(b)) => (a.len() + b.len()) as u64 / 10,
        _ => 0,
    }
}

fn no_overload(left: &Value, op: ArithOp, right: &Value) -> EvalError {
    EvalError::runtime(format!(
        "no such overload: {} {} {}",
        left.type_name(),
        op.symbol(),
        right.type_name()
    ))
}

fn overflow() -> EvalError {
    EvalError::runtime("integer overflow")
}

pub(super) fn arith_values(left: &Value, op: ArithOp, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_arith(*a, op, *b).map(Value::Int),
        (Value::Uint(a), Value::Uint(b)) => uint_arith(*a, op, *b).map(Value::Uint),
        (Value::String(a), Value::String(b)) if op == ArithOp::Add => {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Ok(Value::String(s))
        }
        (Value::Array(a), Value::Array(b)) if op == ArithOp::Add => {
            let mut result = Vec::with_capacity(a.len() + b.len());
            result.extend_from_slice(a);
            result.extend_from_slice(b);
            Ok(Value::Array(Arc::new(result)))
        }
        _ if op != ArithOp::Mod => match (left.as_f64(), right.as_f64()) {
            // Mixed numeric kinds promote to double.
            (Some(a), Some(b)) => Ok(Value::Double(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Mod => unreachable!("excluded by guard"),
            })),
            _ => Err(no_overload(left, op, right)),
        },
        _ => Err(no_overload(left, op, right)),
    }
}

fn int_arith(a: i64, op: ArithOp, b: i64) -> Result<i64, EvalError> {
    match op {
        ArithOp::Add => a.checked_add(b).ok_or_else(overflow),
        ArithOp::Sub => a.checked_sub(b).ok_or_else(overflow),
        ArithOp::Mul => a.checked_mul(b).ok_or_else(overflow),
        ArithOp::Div if b == 0 => Err(EvalError::runtime("division by zero")),
        ArithOp::Div => a.checked_div(b).ok_or_else(overflow),
        ArithOp::Mod if b == 0 => Err(EvalError::runtime("modulus by zero")),
        ArithOp::Mod => a.checked_rem(b).ok_or_else(overflow),
    }
}

fn uint_arith(a: u64, op: ArithOp, b: u64) -> Result<u64, EvalError> {
    match op {
        ArithOp::Add => a.checked_add(b).ok_or_else(overflow),
        ArithOp::Sub => a.checked_sub(b).ok_or_else(overflow),
        ArithOp::Mul => a.checked_mul(b).ok_or_else(overflow),
        ArithOp::Div if b == 0 => Err(EvalError::runtime("division by zero")),
        ArithOp::Div => Ok(a / b),
        ArithOp::Mod if b == 0 => Err(EvalError::runtime("modulus by zero")),
        ArithOp::Mod => Ok(a % b),
    }
}

pub(super) fn negate(v: &Value) -> Result<Value, EvalError> {
    match v {
        Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(overflow),
        Value::Double(f) => Ok(Value::Double(-f)),
        other => Err(EvalError::runtime(format!(
            "no such overload: -{}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Map;

    fn obj(pairs: &[(&str, i64)]) -> Value {
        let map: Map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Int(*v)))
            .collect();
        Value::from(map)
    }

    fn ints(n: i64) -> Value {
        Value::from((0..n).map(Value::Int).collect::<Vec<_>>())
    }

    #[test]
    fn container_work_is_priced_by_size() {
        let xs = ints(1000);
        let ys = ints(1000);
        assert_eq!(equality_cost(&xs, &ys, u64::MAX), 1000);
        assert_eq!(equality_cost(&xs, &xs, u64::MAX), 0);
        assert_eq!(equality_cost(&xs, &ints(3), u64::MAX), 0);
        assert_eq!(equality_cost(&Value::Int(1), &Value::Int(1), u64::MAX), 0);
        assert_eq!(contains_cost(&Value::Int(-1), &xs, u64::MAX), 1000);
        assert_eq!(contains_cost(&Value::from("k"), &obj(&[("k", 1)]), u64::MAX), 0);
        assert_eq!(concat_cost(&xs, ArithOp::Add, &ys), 2000);
        let s = Value::from("x".repeat(100));
        assert_eq!(concat_cost(&s, ArithOp::Add, &s), 20);
        assert_eq!(concat_cost(&Value::Int(1), ArithOp::Add, &Value::Int(2)), 0);
    }

    #[test]
    fn nested_counting_stops_at_cap() {
        let nested = Value::from(vec![ints(500), ints(500)]);
        assert_eq!(equality_cost(&nested, &nested.clone(), u64::MAX), 0);
        let other = Value::from(vec![ints(500), ints(500)]);
        assert_eq!(equality_cost(&nested, &other, u64::MAX), 1002);
        let capped = equality_cost(&nested, &other, 10);
        assert!(capped > 10 && capped < 500, "{capped}");
    }

    #[test]
    fn numeric_equality_across_kinds() {
        assert!(values_equal(&Value::Int(1), &Value::Double(1.0)));
        assert!(values_equal(&Value::Uint(7), &Value::Int(7)));
        assert!(!values_equal(&Value::Int(-1), &Value::Uint(u64::MAX)));
        assert!(!values_equal(&Value::Double(f64::NAN), &Value::Double(f64::NAN)));
    }

    #[test]
    fn different_kinds_are_unequal_not_errors() {
        assert!(!values_equal(&Value::Int(1), &Value::String("1".into())));
        assert!(compare_values(&Value::Null, CmpOp::Ne, &Value::Bool(false)).unwrap());
    }

    #[test]
    fn map_equality_ignores_order() {
        assert!(values_equal(&obj(&[("a", 1), ("b", 2)]), &obj(&[("b", 2), ("a", 1)])));
        assert!(!values_equal(&obj(&[("a", 1)]), &obj(&[("a", 2)])));
    }

    #[test]
    fn ordering() {
        assert!(compare_values(&Value::Int(2), CmpOp::Gt, &Value::Double(1.5)).unwrap());
        assert!(compare_values(&Value::Uint(u64::MAX), CmpOp::Gt, &Value::Int(i64::MAX)).unwrap());
        assert!(compare_values(&Value::from("a"), CmpOp::Lt, &Value::from("b")).unwrap());
        assert!(compare_values(&Value::Bool(false), CmpOp::Lt, &Value::Bool(true)).unwrap());
        assert!(!compare_values(&Value::Double(f64::NAN), CmpOp::Lt, &Value::Int(1)).unwrap());
        assert!(compare_values(&Value::Int(1), CmpOp::Lt, &Value::from("a")).is_err());
        assert!(compare_values(&Value::Null, CmpOp::Lt, &Value::Null).is_err());
    }

    #[test]
    fn int_arith_is_checked() {
        assert_eq!(
            arith_values(&Value::Int(2), ArithOp::Mul, &Value::Int(3)).unwrap(),
            Value::Int(6)
        );
        assert!(arith_values(&Value::Int(i64::MAX), ArithOp::Add, &Value::Int(1)).is_err());
        assert!(arith_values(&Value::Int(1), ArithOp::Div, &Value::Int(0)).is_err());
        assert!(arith_values(&Value::Int(1), ArithOp::Mod, &Value::Int(0)).is_err());
        assert!(arith_values(&Value::Uint(0), ArithOp::Sub, &Value::Uint(1)).is_err());
        assert_eq!(
            arith_values(&Value::Int(-7), ArithOp::Mod, &Value::Int(3)).unwrap(),
            Value::Int(-1)
        );
    }

    #[test]
    fn mixed_numbers_promote() {
        assert_eq!(
            arith_values(&Value::Int(1), ArithOp::Add, &Value::Double(0.5)).unwrap(),
            Value::Double(1.5)
        );
        assert!(arith_values(&Value::Int(1), ArithOp::Mod, &Value::Double(2.0)).is_err());
    }

    #[test]
    fn concatenation() {
        assert_eq!(
            arith_values(&Value::from("ab"), ArithOp::Add, &Value::from("cd")).unwrap(),
            Value::from("abcd")
        );
        let l = Value::from(vec![Value::Int(1)]);
        let r = Value::from(vec![Value::Int(2)]);
        assert_eq!(
            arith_values(&l, ArithOp::Add, &r).unwrap(),
            Value::from(vec![Value::Int(1), Value::Int(2)])
        );
        assert!(arith_values(&Value::from("a"), ArithOp::Sub, &Value::from("b")).is_err());
        assert!(arith_values(&Value::from("a"), ArithOp::Add, &Value::Int(1)).is_err());
    }

    #[test]
    fn membership() {
        let list = Value::from(vec![Value::Int(1), Value::from("x")]);
        assert!(contains(&Value::Double(1.0), &list).unwrap());
        assert!(!contains(&Value::from("y"), &list).unwrap());
        assert!(contains(&Value::from("a"), &obj(&[("a", 1)])).unwrap());
        assert!(!contains(&Value::Int(1), &obj(&[("a", 1)])).unwrap());
        assert!(contains(&Value::Int(1), &Value::Int(1)).is_err());
    }

    #[test]
    fn negation() {
        assert_eq!(negate(&Value::Int(3)).unwrap(), Value::Int(-3));
        assert!(negate(&Value::Int(i64::MIN)).is_err());
        assert!(negate(&Value::Uint(1)).is_err());
    }
}
