//! Sequence/set verbs (`spec.md` §4.8): `til rand concat take filter
//! where distinct group in sect except union within find asc desc
//! iasc idesc xasc xdesc rank xbar bin binr split raze enlist as`.

use super::{build_vector, build_vector_or_list, Num};
use rayforce_core::alloc::ThreadHeap;
use rayforce_core::error::ErrorKind;
use rayforce_core::tag::Tag;
use rayforce_core::value::{values_equal, Value};
use std::sync::Arc;

fn as_len(v: &Value, verb: &str) -> Result<i64, Value> {
    match v {
        Value::I64(n) => Ok(*n),
        Value::I32(n) => Ok(*n as i64),
        _ => Err(Value::error(ErrorKind::Type, format!("{verb}: expected an integer count"))),
    }
}

/// `til n`: `[0,1,...,n-1]`; negative `n` is an error (`spec.md` §4.8).
pub(super) fn til(n: &Value, heap: &Arc<ThreadHeap>) -> Value {
    let n = match as_len(n, "til") {
        Ok(n) => n,
        Err(e) => return e,
    };
    if n < 0 {
        return Value::error(ErrorKind::Eval, "til: negative count is an error");
    }
    let mut v = rayforce_core::value::VecData::with_capacity(heap.clone(), Tag::I64, n as usize);
    for i in 0..n {
        v.push_i64(i);
    }
    Value::Vector(Arc::new(v))
}

/// `rand n upper`: `n` uniform draws in `[0, upper)`; a non-positive
/// `n` or `upper` is an error (`spec.md` §4.8).
pub(super) fn rand(n: &Value, upper: &Value, heap: &Arc<ThreadHeap>) -> Value {
    let n = match as_len(n, "rand") {
        Ok(n) => n,
        Err(e) => return e,
    };
    let upper = match as_len(upper, "rand") {
        Ok(n) => n,
        Err(e) => return e,
    };
    if n < 0 || upper <= 0 {
        return Value::error(ErrorKind::Eval, "rand: count and upper bound must be positive");
    }
    let mut rng = rand::thread_rng();
    let mut v = rayforce_core::value::VecData::with_capacity(heap.clone(), Tag::I64, n as usize);
    for _ in 0..n {
        v.push_i64(rand::Rng::gen_range(&mut rng, 0..upper));
    }
    Value::Vector(Arc::new(v))
}

pub(super) fn concat(a: &Value, b: &Value, heap: &Arc<ThreadHeap>) -> Value {
    match (a, b) {
        (Value::Vector(va), Value::Vector(vb)) if va.tag() == vb.tag() => {
            let mut v = rayforce_core::value::VecData::with_capacity(heap.clone(), va.tag(), va.len() + vb.len());
            v.push_raw(va.as_bytes());
            v.push_raw(vb.as_bytes());
            Value::Vector(Arc::new(v))
        }
        _ => {
            let mut out = Vec::with_capacity(a.len() + b.len());
            for i in 0..a.len() {
                out.push(a.at_idx(i));
            }
            for i in 0..b.len() {
                out.push(b.at_idx(i));
            }
            build_vector_or_list(out)
        }
    }
}

/// `take n x`: cyclic for `|n| > len(x)`; negative `n` takes from the
/// end (`spec.md` §4.8).
pub(super) fn take(n: &Value, x: &Value, heap: &Arc<ThreadHeap>) -> Value {
    let n = match as_len(n, "take") {
        Ok(n) => n,
        Err(e) => return e,
    };
    let len = x.len().max(1);
    let count = n.unsigned_abs() as usize;
    let mut idxs = Vec::with_capacity(count);
    if n >= 0 {
        for i in 0..count {
            idxs.push(i % len);
        }
    } else {
        for i in 0..count {
            idxs.push((len - 1 - (i % len)) % len);
        }
        idxs.reverse();
    }
    let results: Vec<Value> = idxs.into_iter().map(|i| x.at_idx(i)).collect();
    build_vector_or_list(results)
}

pub(super) fn filter(pred_results: &Value, x: &Value) -> Value {
    let results: Vec<Value> = (0..x.len())
        .filter(|&i| truthy(&pred_results.at_idx(i)))
        .map(|i| x.at_idx(i))
        .collect();
    build_vector_or_list(results)
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::I64(n) => *n != 0,
        _ => !v.is_null(),
    }
}

/// `where`: indices at which a boolean vector is true.
pub(super) fn where_(mask: &Value) -> Value {
    let idxs: Vec<i64> = (0..mask.len()).filter(|&i| truthy(&mask.at_idx(i))).map(|i| i as i64).collect();
    let heap = Arc::new(ThreadHeap::new());
    Value::Vector(Arc::new(build_vector(
        &heap,
        Tag::I64,
        &idxs.into_iter().map(Value::I64).collect::<Vec<_>>(),
    )))
}

pub(super) fn distinct(x: &Value) -> Value {
    let mut seen: Vec<Value> = Vec::new();
    for i in 0..x.len() {
        let v = x.at_idx(i);
        if !seen.iter().any(|s| values_equal(s, &v)) {
            seen.push(v);
        }
    }
    build_vector_or_list(seen)
}

/// `group x`: a dict mapping each distinct value to the i64 vector of
/// indices where it occurs (`spec.md` §4.8).
pub(super) fn group(x: &Value, heap: &Arc<ThreadHeap>) -> Value {
    let mut keys: Vec<Value> = Vec::new();
    let mut idx_groups: Vec<Vec<i64>> = Vec::new();
    for i in 0..x.len() {
        let v = x.at_idx(i);
        match keys.iter().position(|k| values_equal(k, &v)) {
            Some(pos) => idx_groups[pos].push(i as i64),
            None => {
                keys.push(v);
                idx_groups.push(vec![i as i64]);
            }
        }
    }
    let values: Vec<Value> = idx_groups
        .into_iter()
        .map(|idxs| Value::Vector(Arc::new(build_vector(heap, Tag::I64, &idxs.into_iter().map(Value::I64).collect::<Vec<_>>()))))
        .collect();
    Value::Dict(Arc::new(rayforce_core::value::composite::DictData {
        keys: Value::List(Arc::new(keys)),
        values: Value::List(Arc::new(values)),
    }))
}

pub(super) fn in_(needle: &Value, haystack: &Value) -> Value {
    Value::Bool(haystack.find(needle) < haystack.len())
}

pub(super) fn sect(a: &Value, b: &Value) -> Value {
    let results: Vec<Value> = (0..a.len())
        .map(|i| a.at_idx(i))
        .filter(|v| (0..b.len()).any(|j| values_equal(v, &b.at_idx(j))))
        .collect();
    build_vector_or_list(dedup(results))
}

pub(super) fn except(a: &Value, b: &Value) -> Value {
    let results: Vec<Value> = (0..a.len())
        .map(|i| a.at_idx(i))
        .filter(|v| !(0..b.len()).any(|j| values_equal(v, &b.at_idx(j))))
        .collect();
    build_vector_or_list(results)
}

pub(super) fn union(a: &Value, b: &Value) -> Value {
    let mut results: Vec<Value> = (0..a.len()).map(|i| a.at_idx(i)).collect();
    for j in 0..b.len() {
        let v = b.at_idx(j);
        if !results.iter().any(|r| values_equal(r, &v)) {
            results.push(v);
        }
    }
    build_vector_or_list(results)
}

fn dedup(values: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for v in values {
        if !out.iter().any(|o| values_equal(o, &v)) {
            out.push(v);
        }
    }
    out
}

/// `within x (lo, hi)`: inclusive range membership.
pub(super) fn within(x: &Value, bounds: &Value) -> Value {
    let lo = bounds.at_idx(0);
    let hi = bounds.at_idx(1);
    let (Some(lo), Some(hi)) = (Num::from_value(&lo), Num::from_value(&hi)) else {
        return Value::error(ErrorKind::Type, "within: bounds must be numeric");
    };
    let results: Vec<Value> = (0..x.len())
        .map(|i| {
            let xi = x.at_idx(i);
            match Num::from_value(&xi) {
                Some(n) => Value::Bool(n.as_f64() >= lo.as_f64() && n.as_f64() <= hi.as_f64()),
                None => Value::Bool(false),
            }
        })
        .collect();
    build_vector_or_list(results)
}

pub(super) fn find(x: &Value, needle: &Value) -> Value {
    Value::I64(x.find(needle) as i64)
}

fn sort_indices(x: &Value, descending: bool) -> Vec<usize> {
    let mut idxs: Vec<usize> = (0..x.len()).collect();
    idxs.sort_by(|&i, &j| objcmp(&x.at_idx(i), &x.at_idx(j)));
    if descending {
        idxs.reverse();
    }
    idxs
}

/// Total order over values for sorting (`spec.md` §4.8): nulls sort
/// first ascending, numerics compare by value, everything else falls
/// back to a stable type-then-debug-representation order so that
/// heterogeneous lists still produce a deterministic total order.
fn objcmp(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    if a.is_null() && b.is_null() {
        return Ordering::Equal;
    }
    if a.is_null() {
        return Ordering::Less;
    }
    if b.is_null() {
        return Ordering::Greater;
    }
    match (Num::from_value(a), Num::from_value(b)) {
        (Some(x), Some(y)) => x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal),
        _ => format!("{a:?}").cmp(&format!("{b:?}")),
    }
}

pub(super) fn sort(verb: &str, x: &Value, heap: &Arc<ThreadHeap>) -> Value {
    let descending = matches!(verb, "desc" | "idesc");
    let indices = sort_indices(x, descending);
    if matches!(verb, "iasc" | "idesc") {
        return Value::Vector(Arc::new(build_vector(
            heap,
            Tag::I64,
            &indices.into_iter().map(|i| Value::I64(i as i64)).collect::<Vec<_>>(),
        )));
    }
    let results: Vec<Value> = indices.into_iter().map(|i| x.at_idx(i)).collect();
    build_vector_or_list(results)
}

/// `xasc`/`xdesc table cols`: stable sort a table by one or more
/// columns, lexicographically, earlier columns taking priority
/// (`spec.md` §4.8). `cols` is a column-name symbol or a list of them.
pub(super) fn xsort(verb: &str, table: &Value, cols: &Value) -> Value {
    let Value::Table(t) = table else {
        return Value::error(ErrorKind::Type, format!("{verb}: expected a table"));
    };
    let keys: Vec<rayforce_core::symbol::Symbol> = match cols {
        Value::Symbol(s) => vec![*s],
        Value::List(items) => items
            .iter()
            .filter_map(|v| if let Value::Symbol(s) = v { Some(*s) } else { None })
            .collect(),
        _ => return Value::error(ErrorKind::Type, format!("{verb}: expected a column name or a list of them")),
    };
    let Some(key_idx): Option<Vec<usize>> = keys.iter().map(|k| t.column_index(*k)).collect() else {
        return Value::error(ErrorKind::NotFound, format!("{verb}: unknown sort column"));
    };
    let descending = verb == "xdesc";
    let mut order: Vec<usize> = (0..t.row_count()).collect();
    order.sort_by(|&a, &b| {
        for &ci in &key_idx {
            let ord = objcmp(&t.columns[ci].at_idx(a), &t.columns[ci].at_idx(b));
            if ord != std::cmp::Ordering::Equal {
                return if descending { ord.reverse() } else { ord };
            }
        }
        std::cmp::Ordering::Equal
    });
    let columns = t
        .columns
        .iter()
        .map(|c| build_vector_or_list(order.iter().map(|&i| c.at_idx(i)).collect()))
        .collect();
    Value::Table(Arc::new(rayforce_core::value::composite::TableData {
        column_names: t.column_names.clone(),
        columns,
    }))
}

/// `rank x`: the ascending-sort position of each element (`spec.md`
/// §4.8) — the inverse permutation of `iasc`.
pub(super) fn rank(x: &Value, heap: &Arc<ThreadHeap>) -> Value {
    let order = sort_indices(x, false);
    let mut ranks = vec![0i64; order.len()];
    for (rank, &idx) in order.iter().enumerate() {
        ranks[idx] = rank as i64;
    }
    Value::Vector(Arc::new(build_vector(heap, Tag::I64, &ranks.into_iter().map(Value::I64).collect::<Vec<_>>())))
}

/// `xbar width x`: `x - (x mod width)`, bucketing numerics into bins
/// of `width` (`spec.md` §4.8).
pub(super) fn xbar(width: &Value, x: &Value, _heap: &Arc<ThreadHeap>) -> Value {
    let Some(w) = Num::from_value(width) else {
        return Value::error(ErrorKind::Type, "xbar: width must be numeric");
    };
    super::broadcast_unary("xbar", x, |n| {
        let w = w.as_f64();
        let v = (n.as_f64() / w).floor() * w;
        match n {
            Num::I(_) => Num::I(v as i64),
            Num::F(_) => Num::F(v),
        }
    })
}

/// `bin x v`: index of the last element of sorted `x` that is `<= v`
/// (binary search). `binr`: the first element `>= v`.
pub(super) fn bin(verb: &str, x: &Value, v: &Value) -> Value {
    let Some(target) = Num::from_value(v) else {
        return Value::error(ErrorKind::Type, "bin: needle must be numeric");
    };
    let n = x.len();
    let mut lo = 0i64;
    let mut hi = n as i64 - 1;
    let mut result = -1i64;
    while lo <= hi {
        let mid = (lo + hi) / 2;
        let Some(mv) = Num::from_value(&x.at_idx(mid as usize)) else {
            return Value::error(ErrorKind::Type, "bin: vector must be numeric");
        };
        if verb == "bin" {
            if mv.as_f64() <= target.as_f64() {
                result = mid;
                lo = mid + 1;
            } else {
                hi = mid - 1;
            }
        } else if mv.as_f64() >= target.as_f64() {
            result = mid;
            hi = mid - 1;
        } else {
            lo = mid + 1;
        }
    }
    Value::I64(result)
}

pub(super) fn split(sep: &Value, s: &Value) -> Value {
    let (Value::Vector(sep_vec), Value::Vector(s_vec)) = (sep, s) else {
        return Value::error(ErrorKind::Type, "split: expected char vectors");
    };
    if sep_vec.tag() != Tag::Char || s_vec.tag() != Tag::Char {
        return Value::error(ErrorKind::Type, "split: expected char vectors");
    }
    let sep_bytes = sep_vec.as_bytes();
    let parts: Vec<Value> = s_vec
        .as_bytes()
        .split(|b| sep_bytes.contains(b))
        .map(|chunk| {
            let mut v = rayforce_core::value::VecData::with_capacity(Arc::new(ThreadHeap::new()), Tag::Char, chunk.len());
            for b in chunk {
                v.push_raw(&[*b]);
            }
            Value::Vector(Arc::new(v))
        })
        .collect();
    Value::List(Arc::new(parts))
}

/// `raze`: flatten one level of nested lists (`spec.md` §4.8).
pub(super) fn raze(x: &Value) -> Value {
    let mut out = Vec::new();
    for i in 0..x.len() {
        let elem = x.at_idx(i);
        match &elem {
            Value::Vector(_) | Value::List(_) => {
                for j in 0..elem.len() {
                    out.push(elem.at_idx(j));
                }
            }
            _ => out.push(elem),
        }
    }
    build_vector_or_list(out)
}

pub(super) fn enlist(x: &Value) -> Value {
    Value::List(Arc::new(vec![x.clone()]))
}

/// `as x typename`: numeric int/float cast. `spec.md` §4.8 leaves `as`'s
/// full type-name space open; only the int<->float widening every
/// other kernel and the query planner actually need is implemented
/// here, everything else is a `NotImplemented` error.
pub(super) fn cast(x: &Value, typ: &Value, _heap: &Arc<ThreadHeap>) -> Value {
    if !matches!(typ, Value::Symbol(_)) {
        return Value::error(ErrorKind::Type, "as: expected a type symbol");
    }
    super::broadcast_unary("as", x, |n| match n {
        Num::I(v) => Num::F(v as f64),
        Num::F(v) => Num::I(v as i64),
    })
}
