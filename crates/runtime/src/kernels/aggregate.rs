//! `sum avg min max count first last med dev` (`spec.md` §4.8):
//! reductions over a vector/list, skipping nulls except where the verb
//! itself is null-sensitive (`count` counts every element, `first`/
//! `last` return whatever sits at that position including a null).

use super::Num;
use rayforce_core::error::ErrorKind;
use rayforce_core::value::Value;

pub(super) fn reduce(verb: &str, x: &Value) -> Value {
    match verb {
        "count" => return Value::I64(x.len() as i64),
        "first" => return if x.is_empty() { Value::error(ErrorKind::Index, "first: empty") } else { x.at_idx(0) },
        "last" => {
            return if x.is_empty() {
                Value::error(ErrorKind::Index, "last: empty")
            } else {
                x.at_idx(x.len() - 1)
            }
        }
        _ => {}
    }

    let nums: Vec<f64> = (0..x.len())
        .map(|i| x.at_idx(i))
        .filter(|v| !v.is_null())
        .filter_map(|v| Num::from_value(&v).map(Num::as_f64))
        .collect();

    if nums.is_empty() {
        return Value::F64(f64::NAN);
    }

    let result = match verb {
        "sum" => nums.iter().sum::<f64>(),
        "avg" => nums.iter().sum::<f64>() / nums.len() as f64,
        "min" => nums.iter().cloned().fold(f64::INFINITY, f64::min),
        "max" => nums.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        "med" => median(&nums),
        "dev" => std_dev(&nums),
        _ => return Value::error(ErrorKind::NotImplemented, format!("{verb}: not implemented")),
    };

    // `sum`/`min`/`max` preserve an integer result when every contributing
    // element was integral (`spec.md` §4.8's promotion ladder keeps i64
    // results i64 until an f64 operand forces widening).
    let all_integral = (0..x.len()).all(|i| matches!(Num::from_value(&x.at_idx(i)), Some(Num::I(_)) | None));
    if all_integral && matches!(verb, "sum" | "min" | "max") && result.fract() == 0.0 {
        Value::I64(result as i64)
    } else {
        Value::F64(result)
    }
}

fn median(sorted_source: &[f64]) -> f64 {
    let mut v = sorted_source.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = v.len();
    if n % 2 == 1 {
        v[n / 2]
    } else {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    }
}

fn std_dev(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
