//! Verb kernels (`spec.md` §4.8): the fixed "selected verbs" contract
//! table. `dispatch` is the single entry point `vm::Vm::call_builtin`
//! consults for every name that isn't one of the special-cased forms
//! (`set`, the iteration dispatcher, the query forms) it already
//! handles itself.
//!
//! Kernels work at the `Value` level rather than poking `VecData` bytes
//! directly: scalars go straight through, and vector arguments are
//! walked with `Value::at_idx`/rebuilt with [`build_vector`]. This
//! keeps every kernel's broadcasting/null-propagation logic in one
//! place ([`broadcast_binary`]) instead of duplicating raw-byte loops
//! per verb, at the cost of one extra decode/re-encode pass per vector
//! op versus operating on `VecData` bytes directly — an acceptable
//! trade in an in-process engine where vectors are not yet columnar-hot
//! paths the way `rayforce-runtime`'s storage layer (`spec.md` §4.12) is.

mod aggregate;
mod arithmetic;
mod compare;
mod join;
mod string;
mod transform;

use rayforce_core::alloc::ThreadHeap;
use rayforce_core::error::{ErrorKind, RfError};
use rayforce_core::symbol::SymbolInterner;
use rayforce_core::tag::Tag;
use rayforce_core::value::{VecData, Value};
use std::sync::Arc;

pub fn dispatch(name: &str, args: &[Value], heap: &Arc<ThreadHeap>) -> Option<Value> {
    Some(match name {
        "+" | "-" | "*" | "%" => arithmetic::pointwise(name, &args[0], &args[1], heap),
        "/" => arithmetic::int_div(&args[0], &args[1], heap),
        "div" => arithmetic::float_div(&args[0], &args[1], heap),
        "neg" => arithmetic::neg(&args[0], heap),
        "floor" | "ceil" | "round" => arithmetic::rounding(name, &args[0], heap),
        "til" => transform::til(&args[0], heap),
        "rand" => transform::rand(&args[0], &args[1], heap),
        "==" | "!=" | "<" | ">" | "<=" | ">=" => compare::pointwise(name, &args[0], &args[1], heap),
        "not" => compare::not(&args[0]),
        "and" => compare::and(&args[0], &args[1]),
        "or" => compare::or(&args[0], &args[1]),
        "sum" | "avg" | "min" | "max" | "count" | "first" | "last" | "med" | "dev" => {
            aggregate::reduce(name, &args[0])
        }
        "concat" => transform::concat(&args[0], &args[1], heap),
        "take" => transform::take(&args[0], &args[1], heap),
        "filter" => transform::filter(&args[0], &args[1]),
        "where" => transform::where_(&args[0]),
        "distinct" => transform::distinct(&args[0]),
        "group" => transform::group(&args[0], heap),
        "in" => transform::in_(&args[0], &args[1]),
        "sect" => transform::sect(&args[0], &args[1]),
        "except" => transform::except(&args[0], &args[1]),
        "union" => transform::union(&args[0], &args[1]),
        "within" => transform::within(&args[0], &args[1]),
        "find" => transform::find(&args[0], &args[1]),
        "asc" | "desc" | "iasc" | "idesc" => transform::sort(name, &args[0], heap),
        "xasc" | "xdesc" => transform::xsort(name, &args[0], &args[1]),
        "rank" => transform::rank(&args[0], heap),
        "xbar" => transform::xbar(&args[0], &args[1], heap),
        "bin" | "binr" => transform::bin(name, &args[0], &args[1]),
        "split" => transform::split(&args[0], &args[1]),
        "raze" => transform::raze(&args[0]),
        "enlist" => transform::enlist(&args[0]),
        "as" => transform::cast(&args[0], &args[1], heap),
        "like" => string::string_match_verb(&args[0], &args[1]),
        // `ser`/`de` need the symbol interner (`spec.md` §4.13's
        // null-terminated-string symbol encoding), which this dispatcher
        // doesn't have — `vm::Vm::call_builtin` special-cases them before
        // ever reaching here, the same way it special-cases `set`.
        _ => return None,
    })
}

/// `asof-join`/`left-join`/`inner-join`/`window-join` (`spec.md` §4.8):
/// dispatched separately from [`dispatch`] because `window-join` needs
/// the symbol interner to name the column it synthesizes, and giving
/// every kernel an interner parameter just for this one verb would
/// widen the hot path for no benefit.
pub fn join_dispatch(name: &str, args: &[Value], heap: &Arc<ThreadHeap>, interner: &SymbolInterner) -> Value {
    if let Some(err) = args.iter().find(|a| a.is_error()) {
        return (*err).clone();
    }
    match name {
        "inner-join" => join::inner_join(&args[0], &args[1], &args[2]),
        "left-join" => join::left_join(&args[0], &args[1], &args[2]),
        "asof-join" => join::asof_join(&args[0], &args[1], &args[2]),
        "window-join" => join::window_join(&args[0], &args[1], &args[2], &args[3], heap, interner),
        _ => Value::error(ErrorKind::NotImplemented, format!("unimplemented join '{name}'")),
    }
}

/// Scalar numeric domain used by arithmetic/aggregate kernels
/// (`spec.md` §4.8's promotion ordering `bool < u8 < i16 < i32 < i64 <
/// f64`, collapsed to an i64-or-f64 split since every integer kind
/// below `i64` widens losslessly into it).
#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    I(i64),
    F(f64),
}

impl Num {
    pub(crate) fn from_value(v: &Value) -> Option<Num> {
        Some(match v {
            Value::Bool(b) => Num::I(*b as i64),
            Value::U8(n) => Num::I(*n as i64),
            Value::I16(n) => Num::I(*n as i64),
            Value::I32(n) => Num::I(*n as i64),
            Value::I64(n) => Num::I(*n),
            Value::F64(n) => Num::F(*n),
            Value::Date(n) => Num::I(*n as i64),
            Value::Time(n) => Num::I(*n as i64),
            Value::Timestamp(n) => Num::I(*n),
            _ => return None,
        })
    }

    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Num::I(n) => n as f64,
            Num::F(n) => n,
        }
    }

    pub(crate) fn is_null(self) -> bool {
        match self {
            Num::I(n) => n == i64::MIN,
            Num::F(n) => n.is_nan(),
        }
    }

    pub(crate) fn into_value(self) -> Value {
        match self {
            Num::I(n) => Value::I64(n),
            Num::F(n) => Value::F64(n),
        }
    }
}

/// `spec.md` §4.8 Broadcasting: `(vector, scalar)`/`(scalar, vector)`
/// broadcasts the scalar; `(vector, vector)` requires equal length or
/// one side length 1. Applies `op` elementwise with null propagation
/// (`spec.md` §4.8 "arithmetic with any null operand yields the
/// result-type's null") and reassembles a `Vector` if every result
/// shares one tag, otherwise a `List`.
pub(crate) fn broadcast_binary(
    verb: &str,
    a: &Value,
    b: &Value,
    heap: &Arc<ThreadHeap>,
    op: impl Fn(Num, Num) -> Result<Num, Value>,
) -> Value {
    let a_len = match a {
        Value::Vector(_) | Value::List(_) => a.len(),
        _ => 1,
    };
    let b_len = match b {
        Value::Vector(_) | Value::List(_) => b.len(),
        _ => 1,
    };
    let is_vector_ish = |v: &Value| matches!(v, Value::Vector(_) | Value::List(_));
    if !is_vector_ish(a) && !is_vector_ish(b) {
        return apply_scalar(verb, a, b, &op);
    }
    let n = if a_len == b_len {
        a_len
    } else if a_len == 1 {
        b_len
    } else if b_len == 1 {
        a_len
    } else {
        return Value::error(ErrorKind::Length, format!("{verb}: length mismatch: {a_len} vs {b_len}"));
    };
    let mut results = Vec::with_capacity(n);
    for i in 0..n {
        let ai = if a_len == 1 { a.clone() } else { a.at_idx(i) };
        let bi = if b_len == 1 { b.clone() } else { b.at_idx(i) };
        let r = apply_scalar(verb, &ai, &bi, &op);
        if r.is_error() {
            return r;
        }
        results.push(r);
    }
    build_vector_or_list(results)
}

/// Single-argument counterpart to [`broadcast_binary`] (`neg`, `floor`,
/// `ceil`, `round`): walks a vector elementwise, or applies directly to
/// a scalar.
pub(crate) fn broadcast_unary(verb: &str, a: &Value, op: impl Fn(Num) -> Num) -> Value {
    match a {
        Value::Vector(_) | Value::List(_) => {
            let n = a.len();
            let mut results = Vec::with_capacity(n);
            for i in 0..n {
                let ai = a.at_idx(i);
                let Some(na) = Num::from_value(&ai) else {
                    return Value::Error(Arc::new(RfError::new(
                        rayforce_core::error::ErrorKind::Type,
                        format!("{verb}: unsupported type '{}'", ai.type_name()),
                    )));
                };
                results.push(if na.is_null() { ai } else { op(na).into_value() });
            }
            build_vector_or_list(results)
        }
        _ => match Num::from_value(a) {
            Some(na) if na.is_null() => a.clone(),
            Some(na) => op(na).into_value(),
            None => Value::Error(Arc::new(RfError::new(
                rayforce_core::error::ErrorKind::Type,
                format!("{verb}: unsupported type '{}'", a.type_name()),
            ))),
        },
    }
}

fn apply_scalar(verb: &str, a: &Value, b: &Value, op: &impl Fn(Num, Num) -> Result<Num, Value>) -> Value {
    let (Some(na), Some(nb)) = (Num::from_value(a), Num::from_value(b)) else {
        return Value::Error(Arc::new(Value::type_mismatch(verb, a, b)));
    };
    if na.is_null() || nb.is_null() {
        return match (na, nb) {
            (Num::F(_), _) | (_, Num::F(_)) => Value::F64(f64::NAN),
            _ => Value::I64(i64::MIN),
        };
    }
    match op(na, nb) {
        Ok(n) => n.into_value(),
        Err(v) => v,
    }
}

/// Rebuild a `Vector` if every element shares a tag with a primitive
/// size, otherwise fall back to a `List` (`spec.md` §4.9's "if a later
/// result has a different type, promote the result to a list").
pub(crate) fn build_vector_or_list(values: Vec<Value>) -> Value {
    let Some(first) = values.first() else {
        return Value::List(Arc::new(values));
    };
    let tag = first.tag();
    if tag.element_size().is_some() && values.iter().all(|v| v.tag() == tag) {
        let heap = Arc::new(ThreadHeap::new());
        Value::Vector(Arc::new(build_vector(&heap, tag, &values)))
    } else {
        Value::List(Arc::new(values))
    }
}

/// Construct a `VecData` of `tag` from already-decoded scalar `Value`s.
pub(crate) fn build_vector(heap: &Arc<ThreadHeap>, tag: Tag, values: &[Value]) -> VecData {
    let mut v = VecData::with_capacity(heap.clone(), tag, values.len());
    for val in values {
        push_scalar(&mut v, val);
    }
    v
}

fn push_scalar(v: &mut VecData, val: &Value) {
    match val {
        Value::Bool(b) => v.push_raw(&[*b as u8]),
        Value::U8(n) => v.push_raw(&[*n]),
        Value::Char(c) => v.push_raw(&[*c]),
        Value::I16(n) => v.push_raw(&n.to_le_bytes()),
        Value::I32(n) => v.push_raw(&n.to_le_bytes()),
        Value::Date(n) => v.push_raw(&n.to_le_bytes()),
        Value::Time(n) => v.push_raw(&n.to_le_bytes()),
        Value::I64(n) => v.push_i64(*n),
        Value::Timestamp(n) => v.push_i64(*n),
        Value::F64(n) => v.push_f64(*n),
        Value::Symbol(s) => {
            let mut bytes = s.0.to_le_bytes().to_vec();
            bytes.extend_from_slice(&[0u8; 4]);
            v.push_raw(&bytes);
        }
        Value::Guid(g) => v.push_raw(g),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_scalar_and_vector() {
        let heap = Arc::new(ThreadHeap::new());
        let v = Value::Vector(Arc::new(build_vector(&heap, Tag::I64, &[Value::I64(1), Value::I64(2)])));
        let result = broadcast_binary("+", &v, &Value::I64(10), &heap, |a, b| Ok(Num::I(a.as_f64() as i64 + b.as_f64() as i64)));
        assert_eq!(result.len(), 2);
        assert!(matches!(result.at_idx(0), Value::I64(11)));
    }

    #[test]
    fn mismatched_vector_lengths_raise_length_error() {
        let heap = Arc::new(ThreadHeap::new());
        let a = Value::Vector(Arc::new(build_vector(&heap, Tag::I64, &[Value::I64(1), Value::I64(2)])));
        let b = Value::Vector(Arc::new(build_vector(&heap, Tag::I64, &[Value::I64(1), Value::I64(2), Value::I64(3)])));
        let result = broadcast_binary("+", &a, &b, &heap, |x, y| Ok(Num::I(x.as_f64() as i64 + y.as_f64() as i64)));
        assert!(result.is_error());
    }
}
