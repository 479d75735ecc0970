//! Query evaluator (`spec.md` §4.11): `select`/`update`/`insert`/`upsert`.
//!
//! The compiler quotes these forms wholesale (`rayforce_compiler`'s
//! `compile_special_form` turns the entire call, clause dict included,
//! into one `Value` constant via `expr_to_value`) rather than compiling
//! clause expressions to bytecode. So unlike every other builtin, this
//! module receives unevaluated AST data and is its own small
//! tree-walking interpreter over it, with column names bound to column
//! values the way `spec.md` §4.11 describes ("`where`/aggregate-column
//! expressions are evaluated in an environment where each source
//! column name is bound to its column vector").

use crate::vm::Vm;
use rayforce_core::error::ErrorKind;
use rayforce_core::symbol::Symbol;
use rayforce_core::tag::Tag;
use rayforce_core::value::composite::{DictData, MapFdData, PartedData, TableData};
use rayforce_core::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub fn dispatch(vm: &mut Vm, name: &str, args: Vec<Value>) -> Value {
    let Some(Value::List(items)) = args.into_iter().next() else {
        return Value::error(ErrorKind::Eval, format!("{name}: malformed query form"));
    };
    let clause = &items[1..];
    match name {
        "select" => eval_select(vm, clause),
        "update" => eval_update(vm, clause),
        "insert" => eval_insert(vm, clause),
        "upsert" => eval_upsert(vm, clause),
        _ => unreachable!("query::dispatch called with non-query builtin '{name}'"),
    }
}

/// Parsed `select`/`update` clause dict: `from`/`where`/`by` are
/// handled specially, everything else is a named result column
/// expression, kept in declaration order.
struct Clauses {
    from: Option<Symbol>,
    where_expr: Option<Value>,
    by: Option<Vec<Symbol>>,
    cols: Vec<(Symbol, Value)>,
}

impl Clauses {
    fn parse(dict: &DictData, vm: &Vm) -> Clauses {
        let mut c = Clauses { from: None, where_expr: None, by: None, cols: Vec::new() };
        let (Value::List(keys), Value::List(values)) = (&dict.keys, &dict.values) else {
            return c;
        };
        for (k, v) in keys.iter().zip(values.iter()) {
            let Value::Symbol(ks) = k else { continue };
            let kname = vm.interner.get(*ks);
            match &*kname {
                "from" => {
                    if let Value::Symbol(s) = v {
                        c.from = Some(*s);
                    }
                }
                "where" => c.where_expr = Some(v.clone()),
                "by" => c.by = Some(symbols_of(v)),
                _ => c.cols.push((*ks, v.clone())),
            }
        }
        c
    }
}

fn symbols_of(v: &Value) -> Vec<Symbol> {
    match v {
        Value::Symbol(s) => vec![*s],
        Value::List(items) => items.iter().filter_map(|x| if let Value::Symbol(s) = x { Some(*s) } else { None }).collect(),
        _ => Vec::new(),
    }
}

/// Verb names `eval_quoted` treats as calls to evaluate rather than as
/// plain symbol/vector data. A bracketed vector of bare column-name
/// symbols that happens to start with one of these names (e.g. `by:
/// [sum x]` naming columns literally called `sum` and `x`) is
/// misidentified as a call — an accepted rough edge of quoting the
/// whole clause as one undifferentiated `Value::List` tree, recorded in
/// `DESIGN.md`.
fn is_known_verb(name: &str) -> bool {
    matches!(
        name,
        "+" | "-"
            | "*"
            | "%"
            | "/"
            | "div"
            | "=="
            | "!="
            | "<"
            | ">"
            | "<="
            | ">="
            | "and"
            | "or"
            | "not"
            | "sum"
            | "avg"
            | "min"
            | "max"
            | "count"
            | "first"
            | "last"
            | "med"
            | "dev"
            | "floor"
            | "ceil"
            | "round"
            | "til"
            | "rand"
            | "neg"
            | "concat"
            | "take"
            | "filter"
            | "where"
            | "distinct"
            | "group"
            | "in"
            | "sect"
            | "except"
            | "union"
            | "within"
            | "find"
            | "asc"
            | "desc"
            | "iasc"
            | "idesc"
            | "xasc"
            | "xdesc"
            | "rank"
            | "xbar"
            | "bin"
            | "binr"
            | "split"
            | "raze"
            | "enlist"
            | "as"
            | "like"
            | "list"
    )
}

/// Evaluate a quoted AST fragment: a bare symbol is a column-binding
/// (or, failing that, global-variable) lookup, a list headed by a
/// known verb name is a call, anything else is literal data.
fn eval_quoted(v: &Value, bindings: &HashMap<Symbol, Value>, vm: &mut Vm) -> Value {
    match v {
        Value::Symbol(s) => bindings.get(s).cloned().unwrap_or_else(|| {
            vm.env
                .resolve(*s)
                .unwrap_or_else(|| Value::error(ErrorKind::NotFound, format!("unbound name '{}'", vm.interner.get(*s))))
        }),
        Value::List(items) => {
            if let Some(Value::Symbol(head)) = items.first() {
                let name = vm.interner.get(*head);
                if is_known_verb(&name) {
                    let mut call_args = Vec::with_capacity(items.len() - 1);
                    for a in &items[1..] {
                        let r = eval_quoted(a, bindings, vm);
                        if r.is_error() {
                            return r;
                        }
                        call_args.push(r);
                    }
                    return call_verb(vm, &name, call_args);
                }
            }
            let mut values = Vec::with_capacity(items.len());
            for a in items.iter() {
                let r = eval_quoted(a, bindings, vm);
                if r.is_error() {
                    return r;
                }
                values.push(r);
            }
            crate::kernels::build_vector_or_list(values)
        }
        other => other.clone(),
    }
}

fn call_verb(vm: &mut Vm, name: &str, args: Vec<Value>) -> Value {
    if name == "list" {
        return crate::kernels::build_vector_or_list(args);
    }
    if let Some(r) = crate::kernels::dispatch(name, &args, &vm.heap) {
        return r;
    }
    let sym = vm.interner.intern(name);
    match vm.env.resolve(sym) {
        Some(callee) => vm.dispatch_call(callee, args),
        None => Value::error(ErrorKind::NotFound, format!("unbound function '{name}'")),
    }
}

fn bool_mask_indices(v: &Value) -> Option<Vec<usize>> {
    match v {
        Value::Vector(vec) if vec.tag() == Tag::Bool => Some((0..vec.len()).filter(|&i| matches!(v.at_idx(*i), Value::Bool(true))).collect()),
        _ => None,
    }
}

fn gather(v: &Value, indices: &[usize]) -> Value {
    crate::kernels::build_vector_or_list(indices.iter().map(|&i| v.at_idx(i)).collect())
}

fn restrict_columns(bindings: &HashMap<Symbol, Value>, indices: &[usize]) -> HashMap<Symbol, Value> {
    bindings.iter().map(|(k, v)| (*k, gather(v, indices))).collect()
}

fn table_bindings(t: &TableData) -> HashMap<Symbol, Value> {
    t.column_names.iter().cloned().zip(t.columns.iter().cloned()).collect()
}

fn group_by(bindings: &HashMap<Symbol, Value>, row_indices: &[usize], by_cols: &[Symbol]) -> (Vec<Value>, Vec<Vec<usize>>) {
    let mut order: Vec<Value> = Vec::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for &i in row_indices {
        let key = if by_cols.len() == 1 {
            bindings[&by_cols[0]].at_idx(i)
        } else {
            Value::List(Arc::new(by_cols.iter().map(|c| bindings[c].at_idx(i)).collect()))
        };
        match order.iter().position(|k| rayforce_core::value::values_equal(k, &key)) {
            Some(pos) => groups[pos].push(i),
            None => {
                order.push(key);
                groups.push(vec![i]);
            }
        }
    }
    (order, groups)
}

fn materialize(source: &Value, heap: &Arc<rayforce_core::alloc::ThreadHeap>) -> Value {
    match source {
        Value::MapFd(m) => {
            let columns = m.columns.iter().map(|c| crate::storage::read_column(c, heap)).collect();
            Value::Table(Arc::new(TableData { column_names: m.column_names.clone(), columns }))
        }
        other => other.clone(),
    }
}

fn eval_select(vm: &mut Vm, clause: &[Value]) -> Value {
    let Some(Value::Dict(dict)) = clause.first() else {
        return Value::error(ErrorKind::Eval, "select: expected a clause dict");
    };
    let clauses = Clauses::parse(dict, vm);
    let Some(table_sym) = clauses.from else {
        return Value::error(ErrorKind::Eval, "select: missing 'from'");
    };
    let Some(source) = vm.env.resolve(table_sym) else {
        return Value::error(ErrorKind::NotFound, format!("select: unbound table '{}'", vm.interner.get(table_sym)));
    };
    match &source {
        Value::Parted(p) => select_over_parted(vm, p, &clauses),
        Value::Table(_) | Value::MapFd(_) => {
            let table = materialize(&source, &vm.heap);
            select_over_rows(vm, &table, &clauses)
        }
        other => Value::error(ErrorKind::Type, format!("select: expected a table, got {}", other.type_name())),
    }
}

fn select_over_rows(vm: &mut Vm, table: &Value, clauses: &Clauses) -> Value {
    let Value::Table(t) = table else {
        return Value::error(ErrorKind::Type, "select: expected a table");
    };
    let n = t.row_count();
    let bindings = table_bindings(t);
    let row_indices = match &clauses.where_expr {
        Some(expr) => {
            let result = eval_quoted(expr, &bindings, vm);
            if result.is_error() {
                return result;
            }
            match bool_mask_indices(&result) {
                Some(rows) => rows,
                None => return Value::error(ErrorKind::Type, "select: where clause must return a bool vector"),
            }
        }
        None => (0..n).collect(),
    };
    if let Some(by_cols) = &clauses.by {
        select_grouped(vm, &bindings, &row_indices, by_cols, &clauses.cols)
    } else {
        select_ungrouped(vm, &bindings, &t.column_names, &row_indices, &clauses.cols)
    }
}

fn select_ungrouped(vm: &mut Vm, bindings: &HashMap<Symbol, Value>, order: &[Symbol], row_indices: &[usize], cols: &[(Symbol, Value)]) -> Value {
    let restricted = restrict_columns(bindings, row_indices);
    if cols.is_empty() {
        let columns = order.iter().map(|name| restricted[name].clone()).collect();
        return Value::Table(Arc::new(TableData { column_names: order.to_vec(), columns }));
    }
    let mut names = Vec::with_capacity(cols.len());
    let mut values = Vec::with_capacity(cols.len());
    for (name, expr) in cols {
        let r = eval_quoted(expr, &restricted, vm);
        if r.is_error() {
            return r;
        }
        names.push(*name);
        values.push(r);
    }
    Value::Table(Arc::new(TableData { column_names: names, columns: values }))
}

fn select_grouped(vm: &mut Vm, bindings: &HashMap<Symbol, Value>, row_indices: &[usize], by_cols: &[Symbol], cols: &[(Symbol, Value)]) -> Value {
    let (keys, groups) = group_by(bindings, row_indices, by_cols);
    let mut by_columns: Vec<Vec<Value>> = vec![Vec::with_capacity(keys.len()); by_cols.len()];
    for key in &keys {
        if by_cols.len() == 1 {
            by_columns[0].push(key.clone());
        } else if let Value::List(parts) = key {
            for (ci, part) in parts.iter().enumerate() {
                by_columns[ci].push(part.clone());
            }
        }
    }
    let mut col_names: Vec<Symbol> = by_cols.to_vec();
    let mut col_values: Vec<Value> = by_columns.into_iter().map(crate::kernels::build_vector_or_list).collect();
    for (name, expr) in cols {
        let mut per_group = Vec::with_capacity(groups.len());
        for g in &groups {
            let restricted = restrict_columns(bindings, g);
            let r = eval_quoted(expr, &restricted, vm);
            if r.is_error() {
                return r;
            }
            per_group.push(r);
        }
        col_names.push(*name);
        col_values.push(crate::kernels::build_vector_or_list(per_group));
    }
    Value::Table(Arc::new(TableData { column_names: col_names, columns: col_values }))
}

/// Parted-table `select` (`spec.md` §4.12's aggregate pushdown and
/// testable property 9, `select count by Date from T`): when grouping
/// exactly by the partition column with no `where`, each aggregate
/// column is evaluated per-partition straight off the mmap'd bytes via
/// [`crate::storage::pushdown_aggregate`], with zero vector
/// materialization. Anything shaped differently (a `where` clause, a
/// `by` on a non-partition column) falls back to materializing every
/// partition into one in-memory table and delegating to the ordinary
/// row-wise evaluator.
fn select_over_parted(vm: &mut Vm, p: &Arc<PartedData>, clauses: &Clauses) -> Value {
    let grouping_by_partition = clauses.by.as_deref() == Some(std::slice::from_ref(&p.partition_column));
    if grouping_by_partition && clauses.where_expr.is_none() {
        let mut keys = Vec::with_capacity(p.partitions.len());
        let mut col_values: Vec<Vec<Value>> = clauses.cols.iter().map(|_| Vec::new()).collect();
        for (key, mapfd) in &p.partitions {
            keys.push(key.clone());
            for (slot, (_, expr)) in clauses.cols.iter().enumerate() {
                let v = eval_partition_aggregate(vm, mapfd, expr).unwrap_or_else(|| {
                    let table = materialize(&Value::MapFd(mapfd.clone()), &vm.heap);
                    let Value::Table(t) = &table else { unreachable!() };
                    let bindings = table_bindings(t);
                    eval_quoted(expr, &bindings, vm)
                });
                col_values[slot].push(v);
            }
        }
        let mut col_names = vec![p.partition_column];
        let mut columns = vec![crate::kernels::build_vector_or_list(keys)];
        for (slot, (name, _)) in clauses.cols.iter().enumerate() {
            col_names.push(*name);
            columns.push(crate::kernels::build_vector_or_list(std::mem::take(&mut col_values[slot])));
        }
        return Value::Table(Arc::new(TableData { column_names: col_names, columns }));
    }

    let mut names = p.partitions.first().map(|(_, m)| m.column_names.clone()).unwrap_or_default();
    names.insert(0, p.partition_column);
    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); names.len()];
    for (key, mapfd) in &p.partitions {
        let n = mapfd.row_count();
        for _ in 0..n {
            columns[0].push(key.clone());
        }
        for (ci, mc) in mapfd.columns.iter().enumerate() {
            let col = crate::storage::read_column(mc, &vm.heap);
            for i in 0..n {
                columns[ci + 1].push(col.at_idx(i));
            }
        }
    }
    let table = Value::Table(Arc::new(TableData {
        column_names: names,
        columns: columns.into_iter().map(crate::kernels::build_vector_or_list).collect(),
    }));
    select_over_rows(vm, &table, clauses)
}

fn eval_partition_aggregate(vm: &Vm, mapfd: &MapFdData, expr: &Value) -> Option<Value> {
    let Value::List(items) = expr else { return None };
    let Value::Symbol(verb_sym) = items.first()? else { return None };
    let verb = vm.interner.get(*verb_sym);
    if &*verb == "count" && items.len() == 1 {
        return Some(Value::I64(mapfd.row_count() as i64));
    }
    if items.len() != 2 {
        return None;
    }
    let Value::Symbol(col_sym) = &items[1] else { return None };
    let idx = mapfd.column_names.iter().position(|c| c == col_sym)?;
    crate::storage::pushdown_aggregate(&verb, &mapfd.columns[idx])
}

fn scatter(col: Value, indices: &[usize], values: &Value) -> Value {
    let mut items: Vec<Value> = (0..col.len()).map(|i| col.at_idx(i)).collect();
    for (slot, &i) in indices.iter().enumerate() {
        let v = if values.len() == indices.len() { values.at_idx(slot) } else { values.clone() };
        if i < items.len() {
            items[i] = v;
        }
    }
    crate::kernels::build_vector_or_list(items)
}

fn null_like(existing: &Value) -> Value {
    match existing {
        Value::Vector(_) => existing.at_idx(existing.len()),
        _ => Value::I64(i64::MIN),
    }
}

fn eval_update(vm: &mut Vm, clause: &[Value]) -> Value {
    let Some(Value::Dict(dict)) = clause.first() else {
        return Value::error(ErrorKind::Eval, "update: expected a clause dict");
    };
    let clauses = Clauses::parse(dict, vm);
    let Some(table_sym) = clauses.from else {
        return Value::error(ErrorKind::Eval, "update: missing 'from'");
    };
    let Some(current) = vm.env.resolve(table_sym) else {
        return Value::error(ErrorKind::NotFound, format!("update: unbound table '{}'", vm.interner.get(table_sym)));
    };
    let current = materialize(&current, &vm.heap);
    let Value::Table(t) = &current else {
        return Value::error(ErrorKind::Type, "update: target is not a table");
    };
    let n = t.row_count();
    let bindings = table_bindings(t);

    let row_indices = match &clauses.where_expr {
        Some(expr) => {
            let result = eval_quoted(expr, &bindings, vm);
            if result.is_error() {
                return result;
            }
            match bool_mask_indices(&result) {
                Some(rows) => rows,
                None => return Value::error(ErrorKind::Type, "update: where clause must return a bool vector"),
            }
        }
        None => (0..n).collect(),
    };

    let mut new_columns = bindings.clone();
    if let Some(by_cols) = &clauses.by {
        let (_, groups) = group_by(&bindings, &row_indices, by_cols);
        for (name, expr) in &clauses.cols {
            let mut col = bindings.get(name).cloned().unwrap_or_else(|| crate::kernels::build_vector_or_list(vec![Value::I64(i64::MIN); n]));
            for g in &groups {
                let restricted = restrict_columns(&bindings, g);
                let value = eval_quoted(expr, &restricted, vm);
                if value.is_error() {
                    return value;
                }
                let broadcast = crate::kernels::build_vector_or_list(vec![value; g.len()]);
                col = scatter(col, g, &broadcast);
            }
            new_columns.insert(*name, col);
        }
    } else {
        let restricted = restrict_columns(&bindings, &row_indices);
        for (name, expr) in &clauses.cols {
            let value = eval_quoted(expr, &restricted, vm);
            if value.is_error() {
                return value;
            }
            let col = bindings.get(name).cloned().unwrap_or_else(|| crate::kernels::build_vector_or_list(vec![null_like(&value); n]));
            new_columns.insert(*name, scatter(col, &row_indices, &value));
        }
    }

    let mut column_names = t.column_names.clone();
    for (name, _) in &clauses.cols {
        if !column_names.contains(name) {
            column_names.push(*name);
        }
    }
    let columns = column_names.iter().map(|n| new_columns.get(n).cloned().unwrap()).collect();
    let result = Value::Table(Arc::new(TableData { column_names, columns }));
    vm.env.set_variable(table_sym, result.clone());
    result
}

fn concat_values(a: &Value, b: &Value) -> Value {
    crate::kernels::build_vector_or_list((0..a.len()).map(|i| a.at_idx(i)).chain((0..b.len()).map(|i| b.at_idx(i))).collect())
}

fn null_column(existing: &Value, n: usize) -> Value {
    crate::kernels::build_vector_or_list(vec![null_like(existing); n])
}

fn append_from_positional(t: &TableData, items: &[Value]) -> Result<TableData, Value> {
    if items.len() != t.column_names.len() {
        return Err(Value::error(ErrorKind::Length, "insert: row has the wrong number of columns"));
    }
    let bulk = items.iter().any(|v| matches!(v, Value::Vector(_) | Value::List(_)));
    let mut columns = t.columns.clone();
    for (col, new_val) in columns.iter_mut().zip(items.iter()) {
        let addition = if bulk { new_val.clone() } else { crate::kernels::build_vector_or_list(vec![new_val.clone()]) };
        *col = concat_values(col, &addition);
    }
    Ok(TableData { column_names: t.column_names.clone(), columns })
}

fn append_from_dict(t: &TableData, d: &DictData) -> Result<TableData, Value> {
    let (Value::List(keys), Value::List(values)) = (&d.keys, &d.values) else {
        return Err(Value::error(ErrorKind::Type, "insert: malformed row dict"));
    };
    let mut by_name: HashMap<Symbol, &Value> = HashMap::new();
    for (k, v) in keys.iter().zip(values.iter()) {
        if let Value::Symbol(s) = k {
            by_name.insert(*s, v);
        }
    }
    let add_rows = by_name
        .values()
        .next()
        .map(|v| match v {
            Value::Vector(_) | Value::List(_) => v.len(),
            _ => 1,
        })
        .unwrap_or(1);
    let mut columns = Vec::with_capacity(t.column_names.len());
    for (i, name) in t.column_names.iter().enumerate() {
        let existing = &t.columns[i];
        let addition = match by_name.get(name) {
            Some(Value::Vector(v)) => Value::Vector(v.clone()),
            Some(Value::List(v)) => Value::List(v.clone()),
            Some(atom) => crate::kernels::build_vector_or_list(vec![(*atom).clone(); add_rows]),
            None => null_column(existing, add_rows),
        };
        columns.push(concat_values(existing, &addition));
    }
    Ok(TableData { column_names: t.column_names.clone(), columns })
}

fn append_from_table(t: &TableData, rt: &TableData) -> Result<TableData, Value> {
    let add_rows = rt.row_count();
    let mut columns = Vec::with_capacity(t.column_names.len());
    for (i, name) in t.column_names.iter().enumerate() {
        let existing = &t.columns[i];
        let addition = match rt.column_index(*name) {
            Some(j) => rt.columns[j].clone(),
            None => null_column(existing, add_rows),
        };
        columns.push(concat_values(existing, &addition));
    }
    Ok(TableData { column_names: t.column_names.clone(), columns })
}

fn append_rows(t: &TableData, row: &Value) -> Result<TableData, Value> {
    match row {
        Value::Dict(d) => append_from_dict(t, d),
        Value::Table(rt) => append_from_table(t, rt),
        Value::List(items) => append_from_positional(t, items),
        other => Err(Value::error(ErrorKind::Type, format!("insert: unsupported row shape '{}'", other.type_name()))),
    }
}

fn eval_insert(vm: &mut Vm, clause: &[Value]) -> Value {
    if clause.len() != 2 {
        return Value::error(ErrorKind::Arity, "insert: expected (table, row)");
    }
    let Value::Symbol(table_sym) = &clause[0] else {
        return Value::error(ErrorKind::Type, "insert: expected a table name");
    };
    let Some(current) = vm.env.resolve(*table_sym) else {
        return Value::error(ErrorKind::NotFound, format!("insert: unbound table '{}'", vm.interner.get(*table_sym)));
    };
    let current = materialize(&current, &vm.heap);
    let Value::Table(t) = &current else {
        return Value::error(ErrorKind::Type, "insert: target is not a table");
    };
    let bindings = HashMap::new();
    let row = eval_quoted(&clause[1], &bindings, vm);
    if row.is_error() {
        return row;
    }
    let updated = match append_rows(t, &row) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let result = Value::Table(Arc::new(updated));
    vm.env.set_variable(*table_sym, result.clone());
    result
}

fn eval_upsert(vm: &mut Vm, clause: &[Value]) -> Value {
    if clause.len() != 3 {
        return Value::error(ErrorKind::Arity, "upsert: expected (table, key-count, row)");
    }
    let Value::Symbol(table_sym) = &clause[0] else {
        return Value::error(ErrorKind::Type, "upsert: expected a table name");
    };
    let Some(current) = vm.env.resolve(*table_sym) else {
        return Value::error(ErrorKind::NotFound, format!("upsert: unbound table '{}'", vm.interner.get(*table_sym)));
    };
    let current = materialize(&current, &vm.heap);
    let Value::Table(t) = &current else {
        return Value::error(ErrorKind::Type, "upsert: target is not a table");
    };
    let bindings = HashMap::new();
    let k_val = eval_quoted(&clause[1], &bindings, vm);
    let Value::I64(k) = k_val else {
        return Value::error(ErrorKind::Type, "upsert: key count must be an integer");
    };
    let row = eval_quoted(&clause[2], &bindings, vm);
    if row.is_error() {
        return row;
    }
    let merged = match merge_upsert(t, k as usize, &row) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let result = Value::Table(Arc::new(merged));
    vm.env.set_variable(*table_sym, result.clone());
    result
}

/// `upsert`'s row-replace semantics: append `row` like `insert`, then
/// collapse duplicate key-column tuples, keeping the *last* occurrence
/// of each key (so freshly-appended rows win over pre-existing ones)
/// while preserving first-occurrence order.
fn merge_upsert(t: &TableData, k: usize, row: &Value) -> Result<TableData, Value> {
    let appended = append_rows(t, row)?;
    let key_cols = &appended.column_names[..k.min(appended.column_names.len())];
    let n = appended.row_count();
    let mut seen: Vec<Vec<Value>> = Vec::new();
    let mut last_index_of: Vec<usize> = Vec::new();
    for i in 0..n {
        let key: Vec<Value> = key_cols
            .iter()
            .map(|name| {
                let ci = appended.column_index(*name).unwrap();
                appended.columns[ci].at_idx(i)
            })
            .collect();
        match seen
            .iter()
            .position(|k| k.iter().zip(key.iter()).all(|(a, b)| rayforce_core::value::values_equal(a, b)))
        {
            Some(pos) => last_index_of[pos] = i,
            None => {
                seen.push(key);
                last_index_of.push(i);
            }
        }
    }
    let columns = appended
        .columns
        .iter()
        .map(|c| crate::kernels::build_vector_or_list(last_index_of.iter().map(|&i| c.at_idx(i)).collect()))
        .collect();
    Ok(TableData { column_names: appended.column_names, columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use rayforce_compiler::{compile_program, parse};
    use rayforce_core::alloc::ThreadHeap;
    use rayforce_core::symbol::SymbolInterner;
    use rayforce_core::value::{BuiltinArity, BuiltinData, LambdaData, VecData};

    fn run(src: &str) -> Value {
        let interner = Arc::new(SymbolInterner::new());
        let env = Arc::new(Env::new());
        for name in ["select", "update", "insert", "upsert", "sum", "count", "avg"] {
            env.register_builtin(
                interner.intern(name),
                Value::Builtin(Arc::new(BuiltinData { name: interner.intern(name), arity: BuiltinArity::Vary })),
            );
        }
        let heap = Arc::new(ThreadHeap::new());
        let names = [interner.intern("sym"), interner.intern("price")];
        let syms = {
            let mut v = VecData::with_capacity(heap.clone(), Tag::Symbol, 3);
            for s in ["a", "a", "b"] {
                let sym = interner.intern(s);
                let mut bytes = sym.0.to_le_bytes().to_vec();
                bytes.extend_from_slice(&[0u8; 4]);
                v.push_raw(&bytes);
            }
            Value::Vector(Arc::new(v))
        };
        let prices = {
            let mut v = VecData::with_capacity(heap.clone(), Tag::I64, 3);
            for p in [10i64, 20, 30] {
                v.push_i64(p);
            }
            Value::Vector(Arc::new(v))
        };
        let table = Value::Table(Arc::new(TableData { column_names: names.to_vec(), columns: vec![syms, prices] }));
        env.set_variable(interner.intern("t"), table);

        let (program, spans) = parse(src, &interner).unwrap();
        let compiled = compile_program(&program, &spans, &interner).unwrap();
        let lambda = Arc::new(LambdaData {
            params: Vec::new(),
            bytecode: crate::bytecode::encode_ops(&compiled.ops).into(),
            constants: compiled.constants.into(),
            env: Arc::from(Vec::new()),
        });
        let mut vm = Vm::new(env, interner);
        vm.eval_program(lambda)
    }

    #[test]
    fn select_with_where_filters_rows() {
        let result = run("(select {from: t where: (> price 15) p: price})");
        let Value::Table(t) = result else { panic!("expected a table") };
        assert_eq!(t.row_count(), 2);
    }

    #[test]
    fn select_with_by_groups_and_aggregates() {
        let result = run("(select {from: t by: sym s: (sum price)})");
        let Value::Table(t) = result else { panic!("expected a table") };
        assert_eq!(t.row_count(), 2);
    }
}
