//! The bytecode virtual machine (`spec.md` §4.7).
//!
//! One [`Vm`] owns one thread's operand stack and [`rayforce_core::alloc::ThreadHeap`];
//! `CALLF` recurses through [`Vm::exec_frame`] rather than threading a
//! manual `rs[]` return-stack array, letting the native Rust call stack
//! stand in for `spec.md`'s frame stack (`{return-ip, saved-bp,
//! caller-lambda}` falls out of the Rust stack frame for free). `CALLS`
//! is the one case that still needs an explicit loop: it rebinds the
//! current frame's slots and resets `ip` in place so self-recursion
//! doesn't grow either stack, matching "tail/self-recursive call"
//! (`spec.md` §4.6).
//!
//! Errors are ordinary values (`spec.md` §3.6): a call that fails
//! returns `Value::Error` exactly like any other result, and propagates
//! up through `RET` like any other value until an active `try` handler
//! claims it or it reaches the top of [`crate::eval_str`].

use crate::bytecode::decode_ops;
use crate::env::Env;
use rayforce_compiler::Op;
use rayforce_core::alloc::ThreadHeap;
use rayforce_core::error::ErrorKind;
use rayforce_core::symbol::SymbolInterner;
use rayforce_core::value::{LambdaData, Value};
use std::sync::Arc;

/// `spec.md` §4.7's `VM_STACK_SIZE`, used here as the recursion-depth
/// guard for `CALLF` rather than a literal array bound, since frames
/// live on the Rust call stack.
const MAX_CALL_DEPTH: usize = 4096;

struct TryHandler {
    /// Operand stack depth to restore before pushing the caught error,
    /// discarding whatever partial state the aborted guarded expression
    /// left behind.
    stack_depth: usize,
    /// Bytecode offset of the handler clause.
    target: usize,
}

/// Per-thread VM state (`spec.md` §4.7's "per-thread state" list).
pub struct Vm {
    pub env: Arc<Env>,
    pub interner: Arc<SymbolInterner>,
    pub heap: Arc<ThreadHeap>,
    pub pool: Option<Arc<crate::pool::WorkerPool>>,
    ps: Vec<Value>,
    call_depth: usize,
}

impl Vm {
    pub fn new(env: Arc<Env>, interner: Arc<SymbolInterner>) -> Self {
        Vm {
            env,
            interner,
            heap: Arc::new(ThreadHeap::new()),
            pool: None,
            ps: Vec::new(),
            call_depth: 0,
        }
    }

    pub fn with_pool(mut self, pool: Arc<crate::pool::WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Evaluate a zero-argument top-level program (`rayforce_compiler::compile_program`'s
    /// output).
    pub fn eval_program(&mut self, lambda: Arc<LambdaData>) -> Value {
        self.exec_frame(lambda, Vec::new())
    }

    /// `CALLF`: invoke a `Lambda` value with already-evaluated arguments.
    pub fn exec_frame(&mut self, lambda: Arc<LambdaData>, args: Vec<Value>) -> Value {
        self.call_depth += 1;
        if self.call_depth > MAX_CALL_DEPTH {
            self.call_depth -= 1;
            return Value::error(ErrorKind::StackOverflow, "call stack depth exceeded");
        }
        let result = self.exec_frame_inner(lambda, args);
        self.call_depth -= 1;
        result
    }

    fn exec_frame_inner(&mut self, mut lambda: Arc<LambdaData>, args: Vec<Value>) -> Value {
        let mut ops = match decode_ops(&lambda.bytecode) {
            Ok(ops) => ops,
            Err(e) => return Value::Error(Arc::new(e)),
        };
        if args.len() != lambda.params.len() {
            return Value::error(
                ErrorKind::Arity,
                format!("lambda expects {} argument(s), got {}", lambda.params.len(), args.len()),
            );
        }
        let mut slots: Vec<Value> = args;
        slots.extend(lambda.env.iter().map(|(_, v)| v.clone()));

        let mut ip: usize = 0;
        let mut try_stack: Vec<TryHandler> = Vec::new();
        let base = self.ps.len();

        loop {
            let Some(op) = ops.get(ip) else {
                return Value::error(ErrorKind::Eval, "instruction pointer ran past end of bytecode");
            };
            match op.clone() {
                Op::LoadConst(k) => {
                    let v = lambda
                        .constants
                        .get(k as usize)
                        .cloned()
                        .unwrap_or_else(|| Value::error(ErrorKind::Eval, "constant index out of range"));
                    self.ps.push(v);
                    ip += 1;
                }
                Op::LoadEnv(i) => {
                    let v = slots
                        .get(i as usize)
                        .cloned()
                        .unwrap_or_else(|| Value::error(ErrorKind::Eval, "env slot out of range"));
                    self.ps.push(v);
                    ip += 1;
                }
                Op::StoreEnv(i) => {
                    let v = self.pop_operand(base);
                    let idx = i as usize;
                    if idx >= slots.len() {
                        slots.resize(idx + 1, Value::Bool(false));
                    }
                    slots[idx] = v;
                    ip += 1;
                }
                Op::Pop => {
                    self.pop_operand(base);
                    ip += 1;
                }
                Op::Resolve => {
                    let sym_val = self.pop_operand(base);
                    let result = match sym_val {
                        Value::Symbol(sym) => self.env.resolve(sym).unwrap_or_else(|| {
                            Value::error(
                                ErrorKind::NotFound,
                                format!("unbound symbol '{}'", self.interner.get(sym)),
                            )
                        }),
                        other => Value::error(ErrorKind::Type, format!("RESOLVE: expected a symbol, got {}", other.type_name())),
                    };
                    self.settle(result, &mut try_stack, &mut ip, base);
                }
                Op::Jmp(off) => {
                    ip = (ip as i64 + off as i64) as usize;
                }
                Op::Jmpf(off) => {
                    let cond = self.pop_operand(base);
                    match cond {
                        Value::Bool(true) => ip += 1,
                        Value::Bool(false) => ip = (ip as i64 + off as i64) as usize,
                        Value::Error(_) => return cond,
                        other => {
                            return Value::error(ErrorKind::Type, format!("expected bool, got {}", other.type_name()))
                        }
                    }
                }
                Op::Call1 => {
                    let callee = self.pop_operand(base);
                    let a = self.pop_operand(base);
                    let result = self.dispatch_call(callee, vec![a]);
                    self.settle(result, &mut try_stack, &mut ip, base);
                }
                Op::Call2 => {
                    let callee = self.pop_operand(base);
                    let b = self.pop_operand(base);
                    let a = self.pop_operand(base);
                    let result = self.dispatch_call(callee, vec![a, b]);
                    self.settle(result, &mut try_stack, &mut ip, base);
                }
                Op::CallN(n) => {
                    let callee = self.pop_operand(base);
                    let args = self.pop_n(n as usize, base);
                    let result = self.dispatch_call(callee, args);
                    self.settle(result, &mut try_stack, &mut ip, base);
                }
                Op::CallD(n) => {
                    let callee = self.pop_operand(base);
                    let args = self.pop_n(n as usize, base);
                    let result = self.dispatch_call(callee, args);
                    self.settle(result, &mut try_stack, &mut ip, base);
                }
                Op::CallF => {
                    let callee = self.pop_operand(base);
                    let result = match callee {
                        Value::Lambda(l) => {
                            let args = self.pop_n(l.params.len(), base);
                            self.exec_frame(l, args)
                        }
                        Value::Error(_) => callee,
                        other => Value::error(ErrorKind::Type, format!("cannot call a {}", other.type_name())),
                    };
                    self.settle(result, &mut try_stack, &mut ip, base);
                }
                Op::CallS => {
                    let args = self.pop_n(lambda.params.len(), base);
                    slots.truncate(0);
                    slots.extend(args);
                    slots.extend(lambda.env.iter().map(|(_, v)| v.clone()));
                    ip = 0;
                    try_stack.clear();
                }
                Op::Ret => {
                    return self.pop_operand(base);
                }
                Op::Try(off) => {
                    try_stack.push(TryHandler {
                        stack_depth: self.ps.len(),
                        target: (ip as i64 + off as i64) as usize,
                    });
                    ip += 1;
                }
                Op::Catch => {
                    try_stack.pop();
                    ip += 1;
                }
                Op::Throw => {
                    let raised = self.pop_operand(base);
                    let err = match raised {
                        Value::Error(_) => raised,
                        other => Value::error(ErrorKind::Raise, format!("raised: {other:?}")),
                    };
                    self.settle(err, &mut try_stack, &mut ip, base);
                }
                Op::Trace => {
                    let frame = Value::I64(self.call_depth as i64);
                    self.ps.push(frame);
                    ip += 1;
                }
            }
            let _ = &mut lambda;
        }
    }

    /// Push `result`; if it is an error and an active `try` handler
    /// exists in this frame, instead unwind the operand stack back to
    /// the handler's depth, push the error, and jump into the handler.
    fn settle(&mut self, result: Value, try_stack: &mut Vec<TryHandler>, ip: &mut usize, base: usize) {
        if result.is_error() {
            if let Some(handler) = try_stack.pop() {
                self.ps.truncate(handler.stack_depth.max(base));
                self.ps.push(result);
                *ip = handler.target;
                return;
            }
        }
        self.ps.push(result);
        *ip += 1;
    }

    fn pop_operand(&mut self, base: usize) -> Value {
        if self.ps.len() <= base {
            return Value::error(ErrorKind::Eval, "operand stack underflow");
        }
        self.ps.pop().expect("checked non-empty above")
    }

    fn pop_n(&mut self, n: usize, base: usize) -> Vec<Value> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.pop_operand(base));
        }
        out.reverse();
        out
    }

    pub(crate) fn dispatch_call(&mut self, callee: Value, args: Vec<Value>) -> Value {
        match callee {
            Value::Builtin(b) => self.call_builtin(b.name, args),
            Value::Lambda(l) => {
                if l.params.len() != args.len() {
                    return Value::error(
                        ErrorKind::Arity,
                        format!("lambda expects {} argument(s), got {}", l.params.len(), args.len()),
                    );
                }
                self.exec_frame(l, args)
            }
            Value::Error(_) => callee,
            other => Value::error(ErrorKind::Type, format!("cannot call a {}", other.type_name())),
        }
    }

    fn call_builtin(&mut self, name: rayforce_core::symbol::Symbol, args: Vec<Value>) -> Value {
        if let Some(err) = args.iter().find(|a| a.is_error()) {
            return (*err).clone();
        }
        let name_str = self.interner.get(name);
        match &*name_str {
            "set" => {
                let [sym, value] = take2(args);
                match sym {
                    Value::Symbol(s) => {
                        self.env.set_variable(s, value.clone());
                        value
                    }
                    other => Value::error(ErrorKind::Type, format!("set: expected a symbol, got {}", other.type_name())),
                }
            }
            "map" | "map-left" | "map-right" | "fold" | "scan" | "pmap" => {
                crate::iter::dispatch(self, &name_str, args)
            }
            "select" | "update" | "insert" | "upsert" => crate::query::dispatch(self, &name_str, args),
            "ser" => crate::serialize::serialize_value(&args[0], &self.interner),
            "de" => crate::serialize::deserialize_value(&args[0], &self.interner, &self.heap),
            // Joins need the symbol interner (`window-join`'s synthesized
            // column name), which the general kernel dispatcher doesn't have.
            "asof-join" | "left-join" | "inner-join" | "window-join" => {
                crate::kernels::join_dispatch(&name_str, &args, &self.heap, &self.interner)
            }
            _ => crate::kernels::dispatch(&name_str, &args, &self.heap)
                .unwrap_or_else(|| Value::error(ErrorKind::NotImplemented, format!("unimplemented builtin '{name_str}'"))),
        }
    }
}

fn take2(mut v: Vec<Value>) -> [Value; 2] {
    debug_assert_eq!(v.len(), 2);
    let b = v.pop().unwrap();
    let a = v.pop().unwrap();
    [a, b]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayforce_compiler::{compile_program, parse};

    fn run(src: &str) -> Value {
        let interner = Arc::new(SymbolInterner::new());
        let (program, spans) = parse(src, &interner).unwrap();
        let compiled = compile_program(&program, &spans, &interner).unwrap();
        let lambda = Arc::new(LambdaData {
            params: Vec::new(),
            bytecode: crate::bytecode::encode_ops(&compiled.ops).into(),
            constants: compiled.constants.into(),
            env: Arc::from(Vec::new()),
        });
        let env = Arc::new(Env::new());
        let mut vm = Vm::new(env, interner);
        vm.eval_program(lambda)
    }

    #[test]
    fn evaluates_binary_arithmetic() {
        assert!(matches!(run("(+ 1 2)"), Value::I64(3)));
    }

    #[test]
    fn if_branches_correctly() {
        assert!(matches!(run("(if true 1 2)"), Value::I64(1)));
        assert!(matches!(run("(if false 1 2)"), Value::I64(2)));
    }

    #[test]
    fn let_binds_a_value() {
        assert!(matches!(run("(let x 5 (+ x 1))"), Value::I64(6)));
    }

    #[test]
    fn try_catches_a_negative_til_error() {
        // `/`/`div` don't error on a zero divisor (`spec.md` §4.8: `/`
        // yields the integer null, `div` yields `NaN`) — `til` with a
        // negative count is the verb table's actual error case.
        let result = run("(try (til -1) (lambda (e) 42))");
        assert!(matches!(result, Value::I64(42)));
    }

    #[test]
    fn immediately_invoked_lambda_literal_calls() {
        assert!(matches!(run("((lambda (x) (+ x 1)) 9)"), Value::I64(10)));
    }

    #[test]
    fn unbound_symbol_is_a_not_found_error() {
        let result = run("undefined-name");
        assert!(result.is_error());
    }
}
