//! `== != < > <= >= and or not` (`spec.md` §4.8). Comparisons always
//! produce bool (vectors broadcast like arithmetic); `null < x` is true
//! for every non-null `x`, and `null == null` is true (per §4.8's null
//! ordering rules).

use super::{broadcast_binary, Num};
use rayforce_core::alloc::ThreadHeap;
use rayforce_core::value::{values_equal, Value};
use std::sync::Arc;

pub(super) fn pointwise(verb: &str, a: &Value, b: &Value, heap: &Arc<ThreadHeap>) -> Value {
    // Null ordering is handled here rather than inside `broadcast_binary`'s
    // shared null-propagation branch (which assumes a numeric-null result),
    // since comparisons against a null always yield a bool, never a
    // propagated null.
    match (a, b) {
        (Value::Vector(_), _) | (_, Value::Vector(_)) | (Value::List(_), _) | (_, Value::List(_)) => {
            broadcast_binary(verb, a, b, heap, |x, y| Ok(Num::I(compare_nums(verb, x, y) as i64)))
        }
        _ => Value::Bool(compare_scalars(verb, a, b)),
    }
}

fn compare_nums(verb: &str, x: Num, y: Num) -> bool {
    let (xf, yf) = (x.as_f64(), y.as_f64());
    match verb {
        "==" => xf == yf,
        "!=" => xf != yf,
        "<" => xf < yf,
        ">" => xf > yf,
        "<=" => xf <= yf,
        ">=" => xf >= yf,
        _ => unreachable!(),
    }
}

fn compare_scalars(verb: &str, a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return match verb {
            "==" => a.is_null() && b.is_null(),
            "!=" => !(a.is_null() && b.is_null()),
            "<" => a.is_null() && !b.is_null(),
            ">" => b.is_null() && !a.is_null(),
            "<=" => a.is_null(),
            ">=" => b.is_null(),
            _ => false,
        };
    }
    match (Num::from_value(a), Num::from_value(b)) {
        (Some(x), Some(y)) => compare_nums(verb, x, y),
        _ => match verb {
            "==" => values_equal(a, b),
            "!=" => !values_equal(a, b),
            _ => false,
        },
    }
}

pub(super) fn not(a: &Value) -> Value {
    match a {
        Value::Vector(_) | Value::List(_) => {
            let results: Vec<Value> = (0..a.len()).map(|i| Value::Bool(!as_bool(&a.at_idx(i)))).collect();
            super::build_vector_or_list(results)
        }
        _ => Value::Bool(!as_bool(a)),
    }
}

pub(super) fn and(a: &Value, b: &Value) -> Value {
    bool_binary(a, b, |x, y| x && y)
}

pub(super) fn or(a: &Value, b: &Value) -> Value {
    bool_binary(a, b, |x, y| x || y)
}

fn bool_binary(a: &Value, b: &Value, op: impl Fn(bool, bool) -> bool) -> Value {
    match (a, b) {
        (Value::Vector(_), _) | (_, Value::Vector(_)) | (Value::List(_), _) | (_, Value::List(_)) => {
            let n = a.len().max(b.len());
            let results: Vec<Value> = (0..n)
                .map(|i| {
                    let ai = if a.len() == 1 { a.clone() } else { a.at_idx(i) };
                    let bi = if b.len() == 1 { b.clone() } else { b.at_idx(i) };
                    Value::Bool(op(as_bool(&ai), as_bool(&bi)))
                })
                .collect();
            super::build_vector_or_list(results)
        }
        _ => Value::Bool(op(as_bool(a), as_bool(b))),
    }
}

fn as_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::I64(n) => *n != 0,
        _ => !v.is_null(),
    }
}
