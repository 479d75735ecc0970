//! `+ - * % / div neg floor ceil round til rand` (`spec.md` §4.8).

use super::{broadcast_binary, broadcast_unary, Num};
use rayforce_core::alloc::ThreadHeap;
use rayforce_core::value::Value;
use std::sync::Arc;

/// `+ - * %`: pointwise with the usual numeric-ladder promotion, plus
/// the temporal special cases `spec.md` §4.8 calls out explicitly
/// (`date + i -> date`, `date - date -> i`, `date + time -> timestamp`)
/// before falling through to plain numeric promotion for everything else.
pub(super) fn pointwise(verb: &str, a: &Value, b: &Value, heap: &Arc<ThreadHeap>) -> Value {
    if let Some(temporal) = temporal_special_case(verb, a, b) {
        return temporal;
    }
    broadcast_binary(verb, a, b, heap, |x, y| {
        Ok(match verb {
            "+" => numeric_op(x, y, |a, b| a + b, |a, b| a + b),
            "-" => numeric_op(x, y, |a, b| a - b, |a, b| a - b),
            "*" => numeric_op(x, y, |a, b| a * b, |a, b| a * b),
            "%" => Num::F(x.as_f64() % y.as_f64()),
            _ => unreachable!(),
        })
    })
}

fn numeric_op(x: Num, y: Num, fi: impl Fn(i64, i64) -> i64, ff: impl Fn(f64, f64) -> f64) -> Num {
    match (x, y) {
        (Num::I(a), Num::I(b)) => Num::I(fi(a, b)),
        _ => Num::F(ff(x.as_f64(), y.as_f64())),
    }
}

/// `date + i`, `date - date`, `date + time` are atom-level special
/// cases rather than ordinary numeric promotion (`spec.md` §4.8's
/// temporal promotion rules); only fires when both sides are scalar
/// temporal/integer atoms, deferring to the generic path otherwise.
fn temporal_special_case(verb: &str, a: &Value, b: &Value) -> Option<Value> {
    match (verb, a, b) {
        ("+", Value::Date(d), Value::I64(n)) | ("+", Value::I64(n), Value::Date(d)) => {
            Some(Value::Date((*d as i64 + n) as i32))
        }
        ("-", Value::Date(d), Value::Date(e)) => Some(Value::I64(*d as i64 - *e as i64)),
        ("-", Value::Date(d), Value::I64(n)) => Some(Value::Date((*d as i64 - n) as i32)),
        ("+", Value::Date(d), Value::Time(t)) | ("+", Value::Time(t), Value::Date(d)) => {
            Some(Value::Timestamp(*d as i64 * 86_400_000 + *t as i64))
        }
        _ => None,
    }
}

/// `/`: integer division, i64 result; division by zero yields the i64
/// null rather than an error (`spec.md` §4.8).
pub(super) fn int_div(a: &Value, b: &Value, heap: &Arc<ThreadHeap>) -> Value {
    broadcast_binary("/", a, b, heap, |x, y| {
        let (xi, yi) = (x.as_f64() as i64, y.as_f64() as i64);
        Ok(if yi == 0 { Num::I(i64::MIN) } else { Num::I(xi.div_euclid(yi)) })
    })
}

/// `div`: float division, f64 result (`spec.md` §4.8, "with 1-decimal-
/// place printing" — a display concern, not a representation one).
pub(super) fn float_div(a: &Value, b: &Value, heap: &Arc<ThreadHeap>) -> Value {
    broadcast_binary("div", a, b, heap, |x, y| Ok(Num::F(x.as_f64() / y.as_f64())))
}

pub(super) fn neg(a: &Value, _heap: &Arc<ThreadHeap>) -> Value {
    broadcast_unary("neg", a, |x| match x {
        Num::I(n) => Num::I(-n),
        Num::F(n) => Num::F(-n),
    })
}

pub(super) fn rounding(verb: &str, a: &Value, _heap: &Arc<ThreadHeap>) -> Value {
    broadcast_unary(verb, a, |x| {
        let f = x.as_f64();
        let rounded = match verb {
            "floor" => f.floor(),
            "ceil" => f.ceil(),
            "round" => f.round(),
            _ => unreachable!(),
        };
        match x {
            Num::I(_) => Num::I(rounded as i64),
            Num::F(_) => Num::F(rounded),
        }
    })
}
