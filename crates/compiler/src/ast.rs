//! Abstract syntax tree produced by [`crate::parser::parse`] (`spec.md`
//! §4.5). Each node carries the `SpanId` the parser assigned it rather
//! than a raw `Span`, so spans live once in the compiler's span table
//! and the AST stays small to clone.

use rayforce_core::symbol::Symbol;

/// Index into the per-compilation span table, keyed by sub-expression
/// identity (`spec.md` §4.5 "Spans").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
    U8(u8),
    Char(u8),
    Symbol(Symbol),
    QuotedSymbol(Symbol),
    Date(i32),
    Time(i32),
    Timestamp(i64),
    Guid([u8; 16]),
    String(String),
}

/// One parsed expression. `spec.md` §4.5's grammar: `atom | vector |
/// list | dict`, plus the two forms the AST needs beyond raw literals:
/// a bare symbol reference (resolved at compile time to `LOADENV` or
/// `LOADCONST+RESOLVE`) and an application (`(f a b)` — the first list
/// element names the callee).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal, SpanId),
    /// A symbol used as a value reference (not quoted) — looked up in
    /// the current env layout or the global `functions`/`variables`
    /// table at compile time.
    Ident(Symbol, SpanId),
    /// `[a b c]` — a vector literal; all elements must share a
    /// promotable primitive type (`spec.md` §4.5, "mixing i64 and f64
    /// auto-promotes to f64; otherwise it is an error").
    Vector(Vec<Expr>, SpanId),
    /// `(f a b ...)` — the first element is the callee.
    List(Vec<Expr>, SpanId),
    /// `{k1: v1, k2: v2}`.
    Dict(Vec<(Expr, Expr)>, SpanId),
}

impl Expr {
    pub fn span_id(&self) -> SpanId {
        match self {
            Expr::Literal(_, s)
            | Expr::Ident(_, s)
            | Expr::Vector(_, s)
            | Expr::List(_, s)
            | Expr::Dict(_, s) => *s,
        }
    }
}

/// A parsed program: top-level expressions evaluated in sequence
/// (`spec.md` §4.5's "list of top-level expressions with
/// `multi-expression` attribute").
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub exprs: Vec<Expr>,
}
