//! Per-compilation span table (`spec.md` §4.5 "Spans", §4.6 `dbg`).
//!
//! The parser assigns every sub-expression a [`crate::ast::SpanId`] as it
//! goes; the table below is the only place the actual `{start_line,
//! end_line, start_col, end_col}` lives. The compiler's `dbg` map then
//! associates bytecode offsets with `SpanId`s instead of duplicating
//! spans into every instruction.

use crate::ast::SpanId;
use rayforce_core::error::Span;

#[derive(Debug, Clone, Default)]
pub struct SpanTable {
    spans: Vec<Span>,
}

impl SpanTable {
    pub fn new() -> Self {
        SpanTable { spans: Vec::new() }
    }

    pub fn push(&mut self, span: Span) -> SpanId {
        let id = SpanId(self.spans.len() as u32);
        self.spans.push(span);
        id
    }

    pub fn get(&self, id: SpanId) -> Span {
        self.spans[id.0 as usize]
    }
}
