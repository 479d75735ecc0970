//! Iteration dispatcher (`spec.md` §4.9): `map`/`map-left`/`map-right`/
//! `fold`/`scan`/`pmap`.
//!
//! Unlike the query forms in [`crate::query`], these arrive as ordinary
//! already-evaluated builtin arguments (`compiler::builtins`'s arity
//! table lists them as plain `Vary` calls, not special forms), so the
//! callee here is a live `Value::Lambda`/`Value::Builtin` rather than
//! quoted AST.

use crate::vm::Vm;
use rayforce_core::error::ErrorKind;
use rayforce_core::value::Value;

pub fn dispatch(vm: &mut Vm, name: &str, mut args: Vec<Value>) -> Value {
    match name {
        "map" => map(vm, args),
        "map-left" => {
            if args.len() != 3 {
                return Value::error(ErrorKind::Arity, "map-left: expected (f, x, ys)");
            }
            let ys = args.pop().unwrap();
            let x = args.pop().unwrap();
            let f = args.pop().unwrap();
            map_left(vm, f, x, ys)
        }
        "map-right" => {
            if args.len() != 3 {
                return Value::error(ErrorKind::Arity, "map-right: expected (f, xs, y)");
            }
            let y = args.pop().unwrap();
            let xs = args.pop().unwrap();
            let f = args.pop().unwrap();
            map_right(vm, f, xs, y)
        }
        "fold" => fold(vm, args),
        "scan" => scan(vm, args),
        "pmap" => pmap(vm, args),
        _ => unreachable!("iter::dispatch called with non-iteration builtin '{name}'"),
    }
}

/// `map f x` / `map f x y` (`spec.md` §4.9): unary over one list/vector,
/// or binary over two (with one side allowed to be a length-1 atom).
fn map(vm: &mut Vm, mut args: Vec<Value>) -> Value {
    match args.len() {
        2 => {
            let x = args.pop().unwrap();
            let f = args.pop().unwrap();
            map_unary(vm, f, x)
        }
        3 => {
            let y = args.pop().unwrap();
            let x = args.pop().unwrap();
            let f = args.pop().unwrap();
            map_binary(vm, f, x, y)
        }
        n => Value::error(ErrorKind::Arity, format!("map: expected 2 or 3 argument(s), got {n}")),
    }
}

fn map_unary(vm: &mut Vm, f: Value, x: Value) -> Value {
    let n = x.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let r = vm.dispatch_call(f.clone(), vec![x.at_idx(i)]);
        if r.is_error() {
            return r;
        }
        out.push(r);
    }
    crate::kernels::build_vector_or_list(out)
}

fn map_binary(vm: &mut Vm, f: Value, x: Value, y: Value) -> Value {
    let (nx, ny) = (x.len(), y.len());
    let n = match (nx, ny) {
        (a, b) if a == b => a,
        (1, b) => b,
        (a, 1) => a,
        _ => return Value::error(ErrorKind::Length, format!("map: length mismatch: {nx} vs {ny}")),
    };
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let xi = if nx == 1 { x.at_idx(0) } else { x.at_idx(i) };
        let yi = if ny == 1 { y.at_idx(0) } else { y.at_idx(i) };
        let r = vm.dispatch_call(f.clone(), vec![xi, yi]);
        if r.is_error() {
            return r;
        }
        out.push(r);
    }
    crate::kernels::build_vector_or_list(out)
}

/// `map-left f x ys`: `f(x, ys[i])` for each `i`.
fn map_left(vm: &mut Vm, f: Value, x: Value, ys: Value) -> Value {
    let n = ys.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let r = vm.dispatch_call(f.clone(), vec![x.clone(), ys.at_idx(i)]);
        if r.is_error() {
            return r;
        }
        out.push(r);
    }
    crate::kernels::build_vector_or_list(out)
}

/// `map-right f xs y`: `f(xs[i], y)` for each `i`.
fn map_right(vm: &mut Vm, f: Value, xs: Value, y: Value) -> Value {
    let n = xs.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let r = vm.dispatch_call(f.clone(), vec![xs.at_idx(i), y.clone()]);
        if r.is_error() {
            return r;
        }
        out.push(r);
    }
    crate::kernels::build_vector_or_list(out)
}

/// `fold f xs` / `fold f init xs` (`spec.md` §4.9): left-to-right
/// binary reduction.
fn fold(vm: &mut Vm, mut args: Vec<Value>) -> Value {
    match args.len() {
        2 => {
            let xs = args.pop().unwrap();
            let f = args.pop().unwrap();
            let n = xs.len();
            if n == 0 {
                return Value::error(ErrorKind::Length, "fold: empty sequence with no initial value");
            }
            let mut acc = xs.at_idx(0);
            for i in 1..n {
                acc = vm.dispatch_call(f.clone(), vec![acc, xs.at_idx(i)]);
                if acc.is_error() {
                    return acc;
                }
            }
            acc
        }
        3 => {
            let xs = args.pop().unwrap();
            let init = args.pop().unwrap();
            let f = args.pop().unwrap();
            let mut acc = init;
            for i in 0..xs.len() {
                acc = vm.dispatch_call(f.clone(), vec![acc, xs.at_idx(i)]);
                if acc.is_error() {
                    return acc;
                }
            }
            acc
        }
        n => Value::error(ErrorKind::Arity, format!("fold: expected 2 or 3 argument(s), got {n}")),
    }
}

/// `scan`: like `fold`, but emits every intermediate accumulator value.
fn scan(vm: &mut Vm, mut args: Vec<Value>) -> Value {
    let (f, mut acc, xs, start) = match args.len() {
        2 => {
            let xs = args.pop().unwrap();
            let f = args.pop().unwrap();
            if xs.is_empty() {
                return Value::error(ErrorKind::Length, "scan: empty sequence with no initial value");
            }
            let seed = xs.at_idx(0);
            (f, seed, xs, 1)
        }
        3 => {
            let xs = args.pop().unwrap();
            let init = args.pop().unwrap();
            let f = args.pop().unwrap();
            (f, init, xs, 0)
        }
        n => return Value::error(ErrorKind::Arity, format!("scan: expected 2 or 3 argument(s), got {n}")),
    };
    let mut out = vec![acc.clone()];
    for i in start..xs.len() {
        acc = vm.dispatch_call(f.clone(), vec![acc, xs.at_idx(i)]);
        if acc.is_error() {
            return acc;
        }
        out.push(acc.clone());
    }
    crate::kernels::build_vector_or_list(out)
}

/// `pmap f xs` (`spec.md` §4.9/§4.10): partition `xs` into
/// `num_workers` contiguous ranges, run each range on the worker pool,
/// concatenate in submission (= input) order. Falls back to running
/// in-process when no pool is attached to this `Vm`.
fn pmap(vm: &mut Vm, mut args: Vec<Value>) -> Value {
    if args.len() != 2 {
        return Value::error(ErrorKind::Arity, "pmap: expected (f, xs)");
    }
    let xs = args.pop().unwrap();
    let f = args.pop().unwrap();
    let n = xs.len();
    if n == 0 {
        return Value::List(std::sync::Arc::new(Vec::new()));
    }

    let Some(pool) = vm.pool.clone() else {
        return map_unary(vm, f, xs);
    };

    let workers = pool.worker_count().max(1);
    let chunk = n.div_ceil(workers);
    let env = vm.env.clone();
    let interner = vm.interner.clone();
    let mut tasks: Vec<Box<dyn FnOnce() -> Vec<Value> + Send>> = Vec::new();
    let mut start = 0;
    while start < n {
        let end = (start + chunk).min(n);
        let items: Vec<Value> = (start..end).map(|i| xs.at_idx(i)).collect();
        let f = f.clone();
        let env = env.clone();
        let interner = interner.clone();
        tasks.push(Box::new(move || {
            let mut worker_vm = Vm::new(env, interner);
            items
                .into_iter()
                .map(|item| worker_vm.dispatch_call(f.clone(), vec![item]))
                .collect()
        }));
        start = end;
    }

    let chunks = pool.run(tasks);
    let mut out = Vec::with_capacity(n);
    let mut first_error = None;
    for chunk_result in chunks {
        for v in chunk_result {
            if v.is_error() && first_error.is_none() {
                first_error = Some(v.clone());
            }
            out.push(v);
        }
    }
    if let Some(e) = first_error {
        return e;
    }
    crate::kernels::build_vector_or_list(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;
    use rayforce_compiler::{compile_program, parse};
    use rayforce_core::symbol::SymbolInterner;
    use rayforce_core::value::{BuiltinArity, BuiltinData, LambdaData};
    use std::sync::Arc;

    fn run(src: &str) -> Value {
        let interner = Arc::new(SymbolInterner::new());
        let env = Arc::new(Env::new());
        for name in ["map", "map-left", "map-right", "fold", "scan", "pmap", "+", "*"] {
            env.register_builtin(
                interner.intern(name),
                Value::Builtin(Arc::new(BuiltinData { name: interner.intern(name), arity: BuiltinArity::Vary })),
            );
        }
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
    fn map_applies_a_lambda_to_each_element() {
        let result = run("(map (lambda (x) (* x 2)) [1 2 3])");
        let Value::Vector(v) = result else { panic!("expected a vector") };
        assert_eq!(v.as_i64_slice(), &[2, 4, 6]);
    }

    #[test]
    fn fold_reduces_left_to_right() {
        assert!(matches!(run("(fold + [1 2 3 4])"), Value::I64(10)));
    }

    #[test]
    fn scan_emits_every_intermediate() {
        let result = run("(scan + [1 2 3 4])");
        let Value::Vector(v) = result else { panic!("expected a vector") };
        assert_eq!(v.as_i64_slice(), &[1, 3, 6, 10]);
    }

    #[test]
    fn pmap_without_a_pool_matches_plain_map() {
        let result = run("(pmap (lambda (x) (* x 2)) [1 2 3])");
        let Value::Vector(v) = result else { panic!("expected a vector") };
        assert_eq!(v.as_i64_slice(), &[2, 4, 6]);
    }
}
