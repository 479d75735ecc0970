//! Bytecode compiler (`spec.md` §4.6): `compile(lambda-expr) ->
//! Lambda{args, bytecode, constants, dbg}`.

use crate::ast::{Expr, Literal, Program, SpanId};
use crate::builtins::{self, Arity};
use crate::opcode::{DebugMap, Op};
use crate::spans::SpanTable;
use rayforce_core::error::{ErrorKind, RfError, RfResult};
use rayforce_core::symbol::{Symbol, SymbolInterner};
use rayforce_core::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The compiled artifact (`spec.md` §4.6's `Lambda{args, bytecode,
/// constants, dbg}`). `rayforce-core`'s `LambdaData` stores this same
/// shape but keeps `bytecode` as opaque bytes so the core crate doesn't
/// need to depend on the compiler; here we keep the structured `Op`
/// list, which the runtime VM consumes directly.
#[derive(Debug, Clone)]
pub struct CompiledLambda {
    pub params: Vec<Symbol>,
    pub ops: Vec<Op>,
    pub constants: Vec<Value>,
    pub debug: DebugMap,
}

/// Per-lambda lexical scope: args then let-bindings share one flat slot
/// space (`spec.md` §4.6, `LOADENV i` "push env-slot i (args then
/// let-bindings)"). Nested `let`s push new bindings onto a fresh slot
/// rather than reusing one, and a scope stack lets the same symbol be
/// shadowed in an inner block.
struct Scope {
    slots: Vec<HashMap<Symbol, u32>>,
    next_slot: u32,
}

impl Scope {
    fn new(params: &[Symbol]) -> Self {
        let mut root = HashMap::new();
        for (i, &p) in params.iter().enumerate() {
            root.insert(p, i as u32);
        }
        Scope {
            next_slot: params.len() as u32,
            slots: vec![root],
        }
    }

    fn lookup(&self, sym: Symbol) -> Option<u32> {
        self.slots.iter().rev().find_map(|m| m.get(&sym).copied())
    }

    fn push_block(&mut self) {
        self.slots.push(HashMap::new());
    }

    fn pop_block(&mut self) {
        self.slots.pop();
    }

    fn bind(&mut self, sym: Symbol) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.last_mut().unwrap().insert(sym, slot);
        slot
    }
}

struct Compiler<'a> {
    spans: &'a SpanTable,
    interner: &'a SymbolInterner,
    constants: Vec<Value>,
    ops: Vec<Op>,
    debug: DebugMap,
    scope: Scope,
    self_sym: Option<Symbol>,
}

/// Compile a top-level program into an implicit zero-argument lambda
/// whose body runs each top-level expression in sequence, discarding
/// all but the last result (`spec.md` §4.5's "multi-expression"
/// program attribute).
pub fn compile_program(
    program: &Program,
    spans: &SpanTable,
    interner: &SymbolInterner,
) -> RfResult<CompiledLambda> {
    let mut compiler = Compiler {
        spans,
        interner,
        constants: Vec::new(),
        ops: Vec::new(),
        debug: DebugMap::default(),
        scope: Scope::new(&[]),
        self_sym: None,
    };
    compiler.compile_sequence(&program.exprs)?;
    compiler.ops.push(Op::Ret);
    Ok(CompiledLambda {
        params: Vec::new(),
        ops: compiler.ops,
        constants: compiler.constants,
        debug: compiler.debug,
    })
}

/// Compile a `(lambda (params...) body...)` form into a standalone
/// `CompiledLambda`. `name` is the symbol the lambda is bound under (if
/// any), enabling `CALLS` for self-recursive calls.
pub fn compile_lambda(
    params: &[Expr],
    body: &[Expr],
    spans: &SpanTable,
    interner: &SymbolInterner,
    name: Option<Symbol>,
) -> RfResult<CompiledLambda> {
    let mut param_syms = Vec::with_capacity(params.len());
    for p in params {
        match p {
            Expr::Ident(sym, _) => param_syms.push(*sym),
            other => {
                return Err(RfError::new(ErrorKind::Parse, "lambda parameters must be identifiers")
                    .with_span(spans.get(other.span_id())))
            }
        }
    }
    let mut compiler = Compiler {
        spans,
        interner,
        constants: Vec::new(),
        ops: Vec::new(),
        debug: DebugMap::default(),
        scope: Scope::new(&param_syms),
        self_sym: name,
    };
    compiler.compile_sequence(body)?;
    compiler.ops.push(Op::Ret);
    Ok(CompiledLambda {
        params: param_syms,
        ops: compiler.ops,
        constants: compiler.constants,
        debug: compiler.debug,
    })
}

impl<'a> Compiler<'a> {
    fn mark(&mut self, span_id: SpanId) {
        self.debug.push(self.ops.len() as u32, span_id);
    }

    fn push_const(&mut self, v: Value) -> u32 {
        self.constants.push(v);
        (self.constants.len() - 1) as u32
    }

    fn compile_sequence(&mut self, exprs: &[Expr]) -> RfResult<()> {
        if exprs.is_empty() {
            let k = self.push_const(Value::I64(rayforce_core::value::vecdata::null::I64));
            self.ops.push(Op::LoadConst(k));
            return Ok(());
        }
        for (i, expr) in exprs.iter().enumerate() {
            self.compile_expr(expr)?;
            if i + 1 < exprs.len() {
                self.ops.push(Op::Pop);
            }
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> RfResult<()> {
        self.mark(expr.span_id());
        match expr {
            Expr::Literal(lit, _) => {
                let v = literal_to_value(lit, self.interner);
                let k = self.push_const(v);
                self.ops.push(Op::LoadConst(k));
                Ok(())
            }
            Expr::Vector(items, span_id) => {
                let v = vector_to_value(items, self.interner, self.spans, *span_id)?;
                let k = self.push_const(v);
                self.ops.push(Op::LoadConst(k));
                Ok(())
            }
            Expr::Dict(_, _) => {
                // Dict *literals* (not the `select`/`group` query forms)
                // are rare in practice; compile by constant-folding
                // through `expr_to_value`, matching how vector literals
                // are folded above.
                let v = expr_to_value(expr, self.interner);
                let k = self.push_const(v);
                self.ops.push(Op::LoadConst(k));
                Ok(())
            }
            Expr::Ident(sym, _) => {
                if let Some(slot) = self.scope.lookup(*sym) {
                    self.ops.push(Op::LoadEnv(slot));
                } else {
                    let k = self.push_const(Value::Symbol(*sym));
                    self.ops.push(Op::LoadConst(k));
                    self.ops.push(Op::Resolve);
                }
                Ok(())
            }
            Expr::List(items, span_id) => self.compile_list(items, *span_id),
        }
    }

    fn compile_list(&mut self, items: &[Expr], span_id: SpanId) -> RfResult<()> {
        if items.is_empty() {
            let k = self.push_const(Value::List(Arc::new(Vec::new())));
            self.ops.push(Op::LoadConst(k));
            return Ok(());
        }
        let callee_name = match &items[0] {
            Expr::Ident(sym, _) => Some(self.interner.get(*sym)),
            _ => None,
        };
        let args = &items[1..];

        if let Some(name) = callee_name.as_deref() {
            if builtins::is_control_form(name) {
                return self.compile_control_form(name, args, span_id);
            }
            if name == "lambda" {
                return self.compile_lambda_literal(args, span_id);
            }
            if builtins::is_special_form(name) {
                return self.compile_special_form(name, args, span_id);
            }
            if self.self_sym.map(|s| &*self.interner.get(s) == name).unwrap_or(false) {
                for a in args {
                    self.compile_expr(a)?;
                }
                self.ops.push(Op::CallS);
                return Ok(());
            }
            if let Some(arity) = builtins::known_arity(name) {
                // `CALL1`/`CALL2`/`CALLN` carry no callee reference of
                // their own (`spec.md` §4.6's opcode table gives them no
                // operand beyond `CALLN`'s count), so the builtin value
                // is pushed onto the stack too — last, right before the
                // call, matching `CALLD n`'s documented "pops callee, n
                // args" order (callee on top).
                for a in args {
                    self.compile_expr(a)?;
                }
                let k = self.push_const(Value::Builtin(Arc::new(rayforce_core::value::BuiltinData {
                    name: self.interner.intern(name),
                    arity: to_core_arity(arity),
                })));
                self.ops.push(Op::LoadConst(k));
                match arity {
                    Arity::Unary => self.ops.push(Op::Call1),
                    Arity::Binary => self.ops.push(Op::Call2),
                    Arity::Vary => self.ops.push(Op::CallN(args.len() as u32)),
                }
                return Ok(());
            }
        }

        // An immediately-invoked lambda literal `((lambda (x) x) 5)` is
        // statically known to be a Lambda callee, so it compiles to
        // `CALLF` rather than the fully dynamic `CALLD` path below.
        if self.is_lambda_literal(&items[0]) {
            for a in args {
                self.compile_expr(a)?;
            }
            self.compile_expr(&items[0])?;
            self.ops.push(Op::CallF);
            return Ok(());
        }

        // Dynamic dispatch: evaluate the arguments, then the callee
        // expression, then pop the callee and dispatch at runtime
        // (`spec.md` §4.6 `CALLD n`: "pops callee, n args").
        for a in args {
            self.compile_expr(a)?;
        }
        self.compile_expr(&items[0])?;
        self.ops.push(Op::CallD(args.len() as u32));
        Ok(())
    }

    fn compile_control_form(&mut self, name: &str, args: &[Expr], span_id: SpanId) -> RfResult<()> {
        match name {
            "if" => {
                if args.len() < 2 || args.len() > 3 {
                    return Err(self.arity_err("if", span_id));
                }
                self.compile_expr(&args[0])?;
                let jmpf_at = self.ops.len();
                self.ops.push(Op::Jmpf(0));
                self.compile_expr(&args[1])?;
                let jmp_at = self.ops.len();
                self.ops.push(Op::Jmp(0));
                let else_target = self.ops.len() as i32;
                if let Some(else_expr) = args.get(2) {
                    self.compile_expr(else_expr)?;
                } else {
                    let k = self.push_const(Value::I64(rayforce_core::value::vecdata::null::I64));
                    self.ops.push(Op::LoadConst(k));
                }
                let end_target = self.ops.len() as i32;
                self.ops[jmpf_at] = Op::Jmpf(else_target - jmpf_at as i32);
                self.ops[jmp_at] = Op::Jmp(end_target - jmp_at as i32);
                Ok(())
            }
            "cond" => {
                // `(cond (c1 e1) (c2 e2) ... (else))` desugars to nested `if`.
                self.compile_cond(args, span_id)
            }
            "and" => self.compile_short_circuit(args, true, span_id),
            "or" => self.compile_short_circuit(args, false, span_id),
            _ => unreachable!(),
        }
    }

    fn compile_cond(&mut self, clauses: &[Expr], span_id: SpanId) -> RfResult<()> {
        if clauses.is_empty() {
            let k = self.push_const(Value::I64(rayforce_core::value::vecdata::null::I64));
            self.ops.push(Op::LoadConst(k));
            return Ok(());
        }
        let Expr::List(pair, _) = &clauses[0] else {
            return Err(self.arity_err("cond", span_id));
        };
        if pair.len() != 2 {
            return Err(self.arity_err("cond", span_id));
        }
        self.compile_expr(&pair[0])?;
        let jmpf_at = self.ops.len();
        self.ops.push(Op::Jmpf(0));
        self.compile_expr(&pair[1])?;
        let jmp_at = self.ops.len();
        self.ops.push(Op::Jmp(0));
        let else_target = self.ops.len() as i32;
        self.compile_cond(&clauses[1..], span_id)?;
        let end_target = self.ops.len() as i32;
        self.ops[jmpf_at] = Op::Jmpf(else_target - jmpf_at as i32);
        self.ops[jmp_at] = Op::Jmp(end_target - jmp_at as i32);
        Ok(())
    }

    /// `and`/`or` short-circuit at the VM level (`spec.md` §4.8): `(and
    /// a b c)` compiles as `if a (and b c) false`, `(or a b c)` as `if a
    /// true (or b c)` — each operand is compiled and evaluated at most
    /// once, reusing the same `Jmpf`/`Jmp` shape as `if` rather than
    /// needing a `dup` opcode to test-and-keep a value.
    fn compile_short_circuit(&mut self, args: &[Expr], is_and: bool, span_id: SpanId) -> RfResult<()> {
        if args.is_empty() {
            let k = self.push_const(Value::Bool(is_and));
            self.ops.push(Op::LoadConst(k));
            return Ok(());
        }
        self.compile_expr(&args[0])?;
        if args.len() == 1 {
            return Ok(());
        }
        let jmpf_at = self.ops.len();
        self.ops.push(Op::Jmpf(0));
        if is_and {
            self.compile_short_circuit(&args[1..], is_and, span_id)?;
            let jmp_at = self.ops.len();
            self.ops.push(Op::Jmp(0));
            let false_target = self.ops.len() as i32;
            let k = self.push_const(Value::Bool(false));
            self.ops.push(Op::LoadConst(k));
            let end_target = self.ops.len() as i32;
            self.ops[jmpf_at] = Op::Jmpf(false_target - jmpf_at as i32);
            self.ops[jmp_at] = Op::Jmp(end_target - jmp_at as i32);
        } else {
            let k = self.push_const(Value::Bool(true));
            self.ops.push(Op::LoadConst(k));
            let jmp_at = self.ops.len();
            self.ops.push(Op::Jmp(0));
            let rest_target = self.ops.len() as i32;
            self.ops[jmpf_at] = Op::Jmpf(rest_target - jmpf_at as i32);
            self.compile_short_circuit(&args[1..], is_and, span_id)?;
            let end_target = self.ops.len() as i32;
            self.ops[jmp_at] = Op::Jmp(end_target - jmp_at as i32);
        }
        Ok(())
    }

    fn compile_lambda_literal(&mut self, args: &[Expr], span_id: SpanId) -> RfResult<()> {
        if args.is_empty() {
            return Err(self.arity_err("lambda", span_id));
        }
        let Expr::Vector(params, _) | Expr::List(params, _) = &args[0] else {
            return Err(self.arity_err("lambda", span_id));
        };
        let compiled = compile_lambda(params, &args[1..], self.spans, self.interner, None)?;
        let lambda_value = Value::Lambda(Arc::new(rayforce_core::value::LambdaData {
            params: compiled.params.clone(),
            bytecode: encode_ops(&compiled.ops).into(),
            constants: compiled.constants.into(),
            env: Arc::from(Vec::new()),
        }));
        let k = self.push_const(lambda_value);
        self.ops.push(Op::LoadConst(k));
        Ok(())
    }

    fn compile_special_form(&mut self, name: &str, args: &[Expr], span_id: SpanId) -> RfResult<()> {
        match name {
            "quote" => {
                if args.len() != 1 {
                    return Err(self.arity_err("quote", span_id));
                }
                let v = expr_to_value(&args[0], self.interner);
                let k = self.push_const(v);
                self.ops.push(Op::LoadConst(k));
                Ok(())
            }
            "let" => self.compile_let(args, span_id),
            "set" => self.compile_set(args, span_id),
            "try" => self.compile_try(args, span_id),
            // Query forms: the compiler does not evaluate clause
            // arguments; it quotes the whole form as a constant AST
            // value and lets `rayforce-runtime`'s query evaluator
            // (`spec.md` §4.11) interpret it at call time, exactly the
            // way `spec.md` §4.6 describes special forms generally.
            "select" | "update" | "insert" | "upsert" | "from" | "where" | "by" => {
                let quoted = expr_to_value(
                    &Expr::List(
                        std::iter::once(Expr::Ident(self.interner.intern(name), span_id))
                            .chain(args.iter().cloned())
                            .collect(),
                        span_id,
                    ),
                    self.interner,
                );
                let k = self.push_const(quoted);
                self.ops.push(Op::LoadConst(k));
                let builtin_k = self.push_const(Value::Builtin(Arc::new(rayforce_core::value::BuiltinData {
                    name: self.interner.intern(name),
                    arity: to_core_arity(Arity::Unary),
                })));
                self.ops.push(Op::LoadConst(builtin_k));
                self.ops.push(Op::Call1);
                Ok(())
            }
            _ => unreachable!(),
        }
    }

    /// `(let sym expr body...)`.
    fn compile_let(&mut self, args: &[Expr], span_id: SpanId) -> RfResult<()> {
        if args.len() < 2 {
            return Err(self.arity_err("let", span_id));
        }
        let Expr::Ident(sym, _) = &args[0] else {
            return Err(self.arity_err("let", span_id));
        };
        self.compile_expr(&args[1])?;
        self.scope.push_block();
        let slot = self.scope.bind(*sym);
        self.ops.push(Op::StoreEnv(slot));
        self.compile_sequence(&args[2..])?;
        self.scope.pop_block();
        Ok(())
    }

    /// `(set sym expr)` — assigns the runtime's global `variables` table
    /// (`spec.md` §3.5); the symbol is pushed unevaluated.
    fn compile_set(&mut self, args: &[Expr], span_id: SpanId) -> RfResult<()> {
        if args.len() != 2 {
            return Err(self.arity_err("set", span_id));
        }
        let Expr::Ident(sym, _) = &args[0] else {
            return Err(self.arity_err("set", span_id));
        };
        let k = self.push_const(Value::Symbol(*sym));
        self.ops.push(Op::LoadConst(k));
        self.compile_expr(&args[1])?;
        let builtin_k = self.push_const(Value::Builtin(Arc::new(rayforce_core::value::BuiltinData {
            name: self.interner.intern("set"),
            arity: to_core_arity(Arity::Binary),
        })));
        self.ops.push(Op::LoadConst(builtin_k));
        self.ops.push(Op::CallN(2));
        Ok(())
    }

    /// `(try guarded handler)` — the original's explicit `OP_TRY`/
    /// `OP_CATCH` pair (`SPEC_FULL.md` §11). `spec.md` §4.7: on an
    /// unwind into an active `try` handler, the VM pushes the caught
    /// error value and jumps to the handler target; the handler is
    /// then invoked with that error "bound to the handler's argument"
    /// (`spec.md` line 453), so the handler expression must evaluate to
    /// a one-arg `Lambda` and gets called via `CALLF` with the error
    /// already sitting on the stack as its sole argument.
    fn compile_try(&mut self, args: &[Expr], span_id: SpanId) -> RfResult<()> {
        if args.len() != 2 {
            return Err(self.arity_err("try", span_id));
        }
        let try_at = self.ops.len();
        self.ops.push(Op::Try(0));
        self.compile_expr(&args[0])?;
        self.ops.push(Op::Catch);
        let jmp_at = self.ops.len();
        self.ops.push(Op::Jmp(0));
        let handler_target = self.ops.len() as i32;
        self.compile_expr(&args[1])?;
        self.ops.push(Op::CallF);
        let end_target = self.ops.len() as i32;
        self.ops[try_at] = Op::Try(handler_target - try_at as i32);
        self.ops[jmp_at] = Op::Jmp(end_target - jmp_at as i32);
        Ok(())
    }

    fn is_lambda_literal(&self, expr: &Expr) -> bool {
        match expr {
            Expr::List(items, _) => matches!(
                items.first(),
                Some(Expr::Ident(sym, _)) if &*self.interner.get(*sym) == "lambda"
            ),
            _ => false,
        }
    }

    fn arity_err(&self, form: &str, span_id: SpanId) -> RfError {
        RfError::new(ErrorKind::Arity, format!("{form}: malformed special form")).with_span(self.spans.get(span_id))
    }
}

fn to_core_arity(a: Arity) -> rayforce_core::value::BuiltinArity {
    match a {
        Arity::Unary => rayforce_core::value::BuiltinArity::Unary,
        Arity::Binary => rayforce_core::value::BuiltinArity::Binary,
        Arity::Vary => rayforce_core::value::BuiltinArity::Vary,
    }
}

fn literal_to_value(lit: &Literal, _interner: &SymbolInterner) -> Value {
    match lit {
        Literal::Bool(b) => Value::Bool(*b),
        Literal::I16(n) => Value::I16(*n),
        Literal::I32(n) => Value::I32(*n),
        Literal::I64(n) => Value::I64(*n),
        Literal::F64(n) => Value::F64(*n),
        Literal::U8(n) => Value::U8(*n),
        Literal::Char(c) => Value::Char(*c),
        Literal::Symbol(s) | Literal::QuotedSymbol(s) => Value::Symbol(*s),
        Literal::Date(d) => Value::Date(*d),
        Literal::Time(t) => Value::Time(*t),
        Literal::Timestamp(ts) => Value::Timestamp(*ts),
        Literal::Guid(g) => Value::Guid(*g),
        Literal::String(s) => {
            // A string literal is a `CHAR` vector (`spec.md` §3.2
            // "strings are C8 vectors"); compiled as a `List` of `Char`
            // atoms here and promoted to a packed vector when the
            // constant is loaded into a `VecData`-backed heap at link
            // time (`rayforce-runtime`'s loader, not this crate).
            Value::List(Arc::new(s.bytes().map(Value::Char).collect()))
        }
    }
}

fn vector_to_value(items: &[Expr], interner: &SymbolInterner, spans: &SpanTable, span_id: SpanId) -> RfResult<Value> {
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Expr::Literal(lit, _) => values.push(literal_to_value(lit, interner)),
            other => {
                return Err(RfError::new(ErrorKind::Parse, "vector literal elements must be literals")
                    .with_span(spans.get(other.span_id())))
            }
        }
    }
    let _ = span_id;
    Ok(Value::List(Arc::new(values)))
}

/// Convert a quoted expression into the `Value` it denotes as data
/// (`spec.md` §4.5: "a bare single quote followed by an identifier
/// yields a quoted symbol"; generalized here to the `quote` special
/// form and the query-form constant-folding above).
fn expr_to_value(expr: &Expr, interner: &SymbolInterner) -> Value {
    match expr {
        Expr::Literal(lit, _) => literal_to_value(lit, interner),
        Expr::Ident(sym, _) => Value::Symbol(*sym),
        Expr::Vector(items, _) => Value::List(Arc::new(items.iter().map(|e| expr_to_value(e, interner)).collect())),
        Expr::List(items, _) => Value::List(Arc::new(items.iter().map(|e| expr_to_value(e, interner)).collect())),
        Expr::Dict(pairs, _) => {
            let keys: Vec<Value> = pairs.iter().map(|(k, _)| expr_to_value(k, interner)).collect();
            let values: Vec<Value> = pairs.iter().map(|(_, v)| expr_to_value(v, interner)).collect();
            Value::Dict(Arc::new(rayforce_core::value::DictData {
                keys: Value::List(Arc::new(keys)),
                values: Value::List(Arc::new(values)),
            }))
        }
    }
}

/// Serialize `ops` into the opaque byte form `rayforce_core::LambdaData`
/// expects (so `rayforce-core` can carry a compiled lambda without
/// depending on this crate's `Op` type). Uses `bincode` over a `Vec<Op>`
/// clone compiled with `serde`-derived (de)serialization in the runtime
/// crate's VM loader; here we only need a stable placeholder encoding
/// the runtime decodes with the matching `rayforce-runtime::bytecode`
/// module.
fn encode_ops(ops: &[Op]) -> Vec<u8> {
    rayforce_runtime_wire::encode(ops)
}

/// Thin module kept local to avoid a circular dependency on
/// `rayforce-runtime` (which depends on this crate for `Op`): encodes
/// `Op` with a small manual tag+payload scheme instead of pulling the
/// runtime crate in as a dependency.
mod rayforce_runtime_wire {
    use super::Op;

    pub fn encode(ops: &[Op]) -> Vec<u8> {
        let mut out = Vec::with_capacity(ops.len() * 5);
        for op in ops {
            let (tag, payload): (u8, i64) = match *op {
                Op::LoadConst(k) => (0, k as i64),
                Op::LoadEnv(i) => (1, i as i64),
                Op::StoreEnv(i) => (2, i as i64),
                Op::Pop => (3, 0),
                Op::Resolve => (4, 0),
                Op::Jmp(o) => (5, o as i64),
                Op::Jmpf(o) => (6, o as i64),
                Op::Call1 => (7, 0),
                Op::Call2 => (8, 0),
                Op::CallN(n) => (9, n as i64),
                Op::CallF => (10, 0),
                Op::CallS => (11, 0),
                Op::CallD(n) => (12, n as i64),
                Op::Ret => (13, 0),
                Op::Try(o) => (14, o as i64),
                Op::Catch => (15, 0),
                Op::Throw => (16, 0),
                Op::Trace => (17, 0),
            };
            out.push(tag);
            out.extend_from_slice(&payload.to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn compile_src(src: &str) -> (CompiledLambda, SymbolInterner) {
        let interner = SymbolInterner::new();
        let (program, spans) = parse(src, &interner).unwrap();
        let compiled = compile_program(&program, &spans, &interner).unwrap();
        (compiled, interner)
    }

    #[test]
    fn compiles_binary_arithmetic_to_call2() {
        let (compiled, _) = compile_src("(+ 1 2)");
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::Call2)));
    }

    #[test]
    fn compiles_unary_aggregate_to_call1() {
        let (compiled, _) = compile_src("(sum [1 2 3])");
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::Call1)));
    }

    #[test]
    fn if_emits_jumps() {
        let (compiled, _) = compile_src("(if true 1 2)");
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::Jmpf(_))));
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::Jmp(_))));
    }

    #[test]
    fn unbound_symbol_resolves_globally() {
        let (compiled, _) = compile_src("foo");
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::Resolve)));
    }

    #[test]
    fn let_binds_env_slot() {
        let (compiled, _) = compile_src("(let x 1 x)");
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::StoreEnv(_))));
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::LoadEnv(_))));
    }

    #[test]
    fn try_emits_try_and_catch() {
        let (compiled, _) = compile_src("(try 1 2)");
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::Try(_))));
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::Catch)));
    }
}
