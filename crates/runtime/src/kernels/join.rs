//! Table joins (`spec.md` §4.8 `asof-join left-join inner-join
//! window-join`). The verb table names these but leaves their exact
//! semantics to "See §4.11" without spelling them out further, so the
//! conventions followed here are the usual array-language ones: `on`
//! names the shared columns, with the *last* name treated as the
//! ordered time column for the two time-aware joins.

use super::{build_vector_or_list, Num};
use rayforce_core::alloc::ThreadHeap;
use rayforce_core::error::ErrorKind;
use rayforce_core::symbol::{Symbol, SymbolInterner};
use rayforce_core::value::{composite::TableData, values_equal, Value};
use std::sync::Arc;

fn symbol_list(v: &Value) -> Vec<Symbol> {
    match v {
        Value::Symbol(s) => vec![*s],
        Value::List(items) => items.iter().filter_map(|x| if let Value::Symbol(s) = x { Some(*s) } else { None }).collect(),
        _ => Vec::new(),
    }
}

fn key_indices(t: &TableData, keys: &[Symbol]) -> Option<Vec<usize>> {
    keys.iter().map(|k| t.column_index(*k)).collect()
}

fn push_left_row(out: &mut [Vec<Value>], lt: &TableData, li: usize) {
    for ci in 0..lt.column_names.len() {
        out[ci].push(lt.columns[ci].at_idx(li));
    }
}

fn push_right_extra(out: &mut [Vec<Value>], offset: usize, rt: &TableData, r_extra: &[usize], ri: Option<usize>) {
    for (slot, &ci) in r_extra.iter().enumerate() {
        let v = match ri {
            Some(ri) => rt.columns[ci].at_idx(ri),
            // Out-of-range index on a `Vector` column decodes to that
            // type's null (`rayforce_core::value::Value::at_idx`); on a
            // `List` column it is a sentinel error value instead, which
            // is an accepted rough edge for joins against non-primitive
            // columns.
            None => rt.columns[ci].at_idx(rt.row_count()),
        };
        out[offset + slot].push(v);
    }
}

pub(super) fn inner_join(left: &Value, right: &Value, on: &Value) -> Value {
    equi_join(left, right, on, false)
}

pub(super) fn left_join(left: &Value, right: &Value, on: &Value) -> Value {
    equi_join(left, right, on, true)
}

fn equi_join(left: &Value, right: &Value, on: &Value, keep_unmatched: bool) -> Value {
    let (Value::Table(lt), Value::Table(rt)) = (left, right) else {
        return Value::error(ErrorKind::Type, "join: expected two tables");
    };
    let keys = symbol_list(on);
    if keys.is_empty() {
        return Value::error(ErrorKind::Eval, "join: expected at least one join column");
    }
    let Some(l_idx) = key_indices(lt, &keys) else {
        return Value::error(ErrorKind::NotFound, "join: key column missing from left table");
    };
    let Some(r_idx) = key_indices(rt, &keys) else {
        return Value::error(ErrorKind::NotFound, "join: key column missing from right table");
    };
    let r_extra: Vec<usize> = (0..rt.column_names.len()).filter(|i| !r_idx.contains(i)).collect();

    let mut out_names = lt.column_names.clone();
    out_names.extend(r_extra.iter().map(|&i| rt.column_names[i]));
    let mut out_cols: Vec<Vec<Value>> = vec![Vec::new(); out_names.len()];
    let lw = lt.column_names.len();

    for li in 0..lt.row_count() {
        let lkey: Vec<Value> = l_idx.iter().map(|&ci| lt.columns[ci].at_idx(li)).collect();
        let mut matched = false;
        for ri in 0..rt.row_count() {
            let rkey: Vec<Value> = r_idx.iter().map(|&ci| rt.columns[ci].at_idx(ri)).collect();
            if lkey.iter().zip(rkey.iter()).all(|(a, b)| values_equal(a, b)) {
                matched = true;
                push_left_row(&mut out_cols, lt, li);
                push_right_extra(&mut out_cols, lw, rt, &r_extra, Some(ri));
            }
        }
        if !matched && keep_unmatched {
            push_left_row(&mut out_cols, lt, li);
            push_right_extra(&mut out_cols, lw, rt, &r_extra, None);
        }
    }
    Value::Table(Arc::new(TableData {
        column_names: out_names,
        columns: out_cols.into_iter().map(build_vector_or_list).collect(),
    }))
}

fn temporal_value(v: &Value) -> f64 {
    Num::from_value(v).map(|n| n.as_f64()).unwrap_or(f64::NAN)
}

/// `asof-join left right on`: for each left row, attach the last right
/// row (matching the group columns in `on`, all but its last entry)
/// whose time column (`on`'s last entry) is `<=` the left row's time.
pub(super) fn asof_join(left: &Value, right: &Value, on: &Value) -> Value {
    let (Value::Table(lt), Value::Table(rt)) = (left, right) else {
        return Value::error(ErrorKind::Type, "asof-join: expected two tables");
    };
    let keys = symbol_list(on);
    let Some((&time_key, group_keys)) = keys.split_last() else {
        return Value::error(ErrorKind::Eval, "asof-join: expected at least a time column");
    };
    let Some(l_group_idx) = key_indices(lt, group_keys) else {
        return Value::error(ErrorKind::NotFound, "asof-join: group column missing from left table");
    };
    let Some(r_group_idx) = key_indices(rt, group_keys) else {
        return Value::error(ErrorKind::NotFound, "asof-join: group column missing from right table");
    };
    let Some(l_time_idx) = lt.column_index(time_key) else {
        return Value::error(ErrorKind::NotFound, "asof-join: time column missing from left table");
    };
    let Some(r_time_idx) = rt.column_index(time_key) else {
        return Value::error(ErrorKind::NotFound, "asof-join: time column missing from right table");
    };
    let r_extra: Vec<usize> = (0..rt.column_names.len())
        .filter(|&i| i != r_time_idx && !r_group_idx.contains(&i))
        .collect();
    let mut out_names = lt.column_names.clone();
    out_names.extend(r_extra.iter().map(|&i| rt.column_names[i]));
    let mut out_cols: Vec<Vec<Value>> = vec![Vec::new(); out_names.len()];
    let lw = lt.column_names.len();

    for li in 0..lt.row_count() {
        let lkey: Vec<Value> = l_group_idx.iter().map(|&ci| lt.columns[ci].at_idx(li)).collect();
        let ltime = temporal_value(&lt.columns[l_time_idx].at_idx(li));
        let mut best: Option<(usize, f64)> = None;
        for ri in 0..rt.row_count() {
            let rkey: Vec<Value> = r_group_idx.iter().map(|&ci| rt.columns[ci].at_idx(ri)).collect();
            if !lkey.iter().zip(rkey.iter()).all(|(a, b)| values_equal(a, b)) {
                continue;
            }
            let rtime = temporal_value(&rt.columns[r_time_idx].at_idx(ri));
            let better = match best {
                None => true,
                Some((_, bt)) => rtime > bt,
            };
            if rtime <= ltime && better {
                best = Some((ri, rtime));
            }
        }
        push_left_row(&mut out_cols, lt, li);
        push_right_extra(&mut out_cols, lw, rt, &r_extra, best.map(|(ri, _)| ri));
    }
    Value::Table(Arc::new(TableData {
        column_names: out_names,
        columns: out_cols.into_iter().map(build_vector_or_list).collect(),
    }))
}

/// `window-join left right on window`: attaches, per left row, the i64
/// vector of right-row indices within `[time - window, time]` for the
/// matching group (`on`'s last entry is the time column, the rest are
/// group keys). Kept as an index vector rather than expanded rows or
/// pre-aggregated — the open `MAPGROUP`-style cursor `spec.md` §9
/// mentions for window-join intermediates — so callers (typically a
/// `select` aggregate column) decide how to reduce it without this verb
/// guessing an aggregate function on their behalf.
pub(super) fn window_join(left: &Value, right: &Value, on: &Value, window: &Value, heap: &Arc<ThreadHeap>, interner: &SymbolInterner) -> Value {
    let (Value::Table(lt), Value::Table(rt)) = (left, right) else {
        return Value::error(ErrorKind::Type, "window-join: expected two tables");
    };
    let keys = symbol_list(on);
    let Some((&time_key, group_keys)) = keys.split_last() else {
        return Value::error(ErrorKind::Eval, "window-join: expected at least a time column");
    };
    let Some(w) = Num::from_value(window) else {
        return Value::error(ErrorKind::Type, "window-join: expected a numeric window size");
    };
    let w = w.as_f64();
    let Some(l_group_idx) = key_indices(lt, group_keys) else {
        return Value::error(ErrorKind::NotFound, "window-join: group column missing from left table");
    };
    let Some(r_group_idx) = key_indices(rt, group_keys) else {
        return Value::error(ErrorKind::NotFound, "window-join: group column missing from right table");
    };
    let Some(l_time_idx) = lt.column_index(time_key) else {
        return Value::error(ErrorKind::NotFound, "window-join: time column missing from left table");
    };
    let Some(r_time_idx) = rt.column_index(time_key) else {
        return Value::error(ErrorKind::NotFound, "window-join: time column missing from right table");
    };

    let mut window_indices: Vec<Value> = Vec::with_capacity(lt.row_count());
    for li in 0..lt.row_count() {
        let lkey: Vec<Value> = l_group_idx.iter().map(|&ci| lt.columns[ci].at_idx(li)).collect();
        let ltime = temporal_value(&lt.columns[l_time_idx].at_idx(li));
        let mut idxs = super::build_vector(heap, rayforce_core::tag::Tag::I64, &[]);
        for ri in 0..rt.row_count() {
            let rkey: Vec<Value> = r_group_idx.iter().map(|&ci| rt.columns[ci].at_idx(ri)).collect();
            if !lkey.iter().zip(rkey.iter()).all(|(a, b)| values_equal(a, b)) {
                continue;
            }
            let rtime = temporal_value(&rt.columns[r_time_idx].at_idx(ri));
            if rtime <= ltime && rtime >= ltime - w {
                idxs.push_i64(ri as i64);
            }
        }
        window_indices.push(Value::Vector(Arc::new(idxs)));
    }

    let mut column_names = lt.column_names.clone();
    column_names.push(interner.intern("w"));
    let mut columns = lt.columns.clone();
    columns.push(Value::List(Arc::new(window_indices)));
    Value::Table(Arc::new(TableData { column_names, columns }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayforce_core::value::{composite::TableData, VecData};

    fn sym_col(heap: &Arc<ThreadHeap>, interner: &SymbolInterner, names: &[&str]) -> Value {
        let mut v = VecData::with_capacity(heap.clone(), rayforce_core::tag::Tag::Symbol, names.len());
        for n in names {
            let s = interner.intern(n);
            let mut bytes = s.0.to_le_bytes().to_vec();
            bytes.extend_from_slice(&[0u8; 4]);
            v.push_raw(&bytes);
        }
        Value::Vector(Arc::new(v))
    }

    fn i64_col(heap: &Arc<ThreadHeap>, vals: &[i64]) -> Value {
        let mut v = VecData::with_capacity(heap.clone(), rayforce_core::tag::Tag::I64, vals.len());
        for x in vals {
            v.push_i64(*x);
        }
        Value::Vector(Arc::new(v))
    }

    #[test]
    fn inner_join_matches_on_shared_column() {
        let heap = Arc::new(ThreadHeap::new());
        let interner = SymbolInterner::new();
        let left = Value::Table(Arc::new(TableData {
            column_names: vec![interner.intern("sym"), interner.intern("qty")],
            columns: vec![sym_col(&heap, &interner, &["a", "b"]), i64_col(&heap, &[1, 2])],
        }));
        let right = Value::Table(Arc::new(TableData {
            column_names: vec![interner.intern("sym"), interner.intern("price")],
            columns: vec![sym_col(&heap, &interner, &["a", "c"]), i64_col(&heap, &[10, 30])],
        }));
        let on = Value::Symbol(interner.intern("sym"));
        let result = inner_join(&left, &right, &on);
        let Value::Table(t) = result else { panic!("expected a table") };
        assert_eq!(t.row_count(), 1);
    }

    #[test]
    fn asof_join_picks_latest_time_not_after_left() {
        let heap = Arc::new(ThreadHeap::new());
        let interner = SymbolInterner::new();
        let left = Value::Table(Arc::new(TableData {
            column_names: vec![interner.intern("time")],
            columns: vec![i64_col(&heap, &[5])],
        }));
        let right = Value::Table(Arc::new(TableData {
            column_names: vec![interner.intern("time"), interner.intern("price")],
            columns: vec![i64_col(&heap, &[1, 4, 9]), i64_col(&heap, &[100, 200, 300])],
        }));
        let on = Value::Symbol(interner.intern("time"));
        let result = asof_join(&left, &right, &on);
        let Value::Table(t) = result else { panic!("expected a table") };
        let price_idx = t.column_index(interner.intern("price")).unwrap();
        assert!(matches!(t.columns[price_idx].at_idx(0), Value::I64(200)));
    }
}
