//! Bytecode opcode set (`spec.md` §4.6), plus the original's
//! `try`/`catch`/`throw`/`trace` instructions carried forward per
//! `SPEC_FULL.md` §11 for explicit exception-unwind support.

/// One decoded instruction. The compiler emits a flat `Vec<Op>`; the VM
/// (`rayforce-runtime`) walks it with an explicit `ip` rather than
/// threading through an enum-of-enums dispatch table, matching
/// `spec.md` §4.7's "tight threaded loop over opcodes".
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    LoadConst(u32),
    LoadEnv(u32),
    StoreEnv(u32),
    Pop,
    Resolve,
    Jmp(i32),
    Jmpf(i32),
    Call1,
    Call2,
    CallN(u32),
    CallF,
    CallS,
    CallD(u32),
    Ret,
    /// Push a `try` handler frame; the operand is the jump target if the
    /// guarded block completes without raising (skips past `Catch`).
    Try(i32),
    /// Pop the active `try` handler (guarded block completed normally).
    Catch,
    /// Raise the top-of-stack value as an error, unwinding to the
    /// nearest active `Try` handler.
    Throw,
    /// Push a bounded stack-trace snapshot (used by the top-level error
    /// path, `spec.md` §7).
    Trace,
}

/// `dbg` map: bytecode offset → span id, sorted by offset
/// (`spec.md` §4.6: "runtime lookup returns the span with the largest
/// offset ≤ the instruction pointer at the point of error").
#[derive(Debug, Clone, Default)]
pub struct DebugMap {
    entries: Vec<(u32, crate::ast::SpanId)>,
}

impl DebugMap {
    pub fn push(&mut self, offset: u32, span: crate::ast::SpanId) {
        debug_assert!(
            self.entries.last().map(|(o, _)| *o <= offset).unwrap_or(true),
            "DebugMap entries must be pushed in non-decreasing offset order"
        );
        self.entries.push((offset, span));
    }

    pub fn lookup(&self, ip: u32) -> Option<crate::ast::SpanId> {
        match self.entries.binary_search_by_key(&ip, |(o, _)| *o) {
            Ok(i) => Some(self.entries[i].1),
            Err(0) => None,
            Err(i) => Some(self.entries[i - 1].1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SpanId;

    #[test]
    fn lookup_returns_largest_offset_not_exceeding_ip() {
        let mut map = DebugMap::default();
        map.push(0, SpanId(0));
        map.push(5, SpanId(1));
        map.push(10, SpanId(2));
        assert_eq!(map.lookup(7), Some(SpanId(1)));
        assert_eq!(map.lookup(10), Some(SpanId(2)));
        assert_eq!(map.lookup(11), Some(SpanId(2)));
    }
}
