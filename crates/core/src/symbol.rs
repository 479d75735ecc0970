//! Symbol interner (`spec.md` §4.2).
//!
//! Deterministic mapping between interned ids and byte strings, with O(1)
//! equality by id. The process owns exactly one interner (`spec.md` §9,
//! "the symbol interner is the only true singleton"); it is exposed only
//! through `intern`/`get`, constructed once via [`SymbolInterner::new`] and
//! handed to the runtime at startup rather than hidden behind a `static`.
//!
//! The original's two-hash-table, lock-free-after-publish design
//! (`spec.md` §4.2) is approximated here with a single
//! `parking_lot::RwLock` guarding an append-only table: reads take a
//! shared lock (cheap and uncontended in practice), and only `intern`
//! of a previously-unseen string takes the writer path. This keeps the
//! same external contract (monotonic ids, id 0 reserved, same bytes
//! always yield the same id) without hand-rolling a second probing table.

use parking_lot::RwLock;
use std::collections::HashMap;

/// An interned symbol id. Id 0 is the reserved null symbol
/// (`spec.md` §3.2, "symbol id 0" is the null sentinel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(pub u32);

impl Symbol {
    pub const NULL: Symbol = Symbol(0);
}

struct Tables {
    by_str: HashMap<Box<str>, u32>,
    by_id: Vec<Box<str>>,
}

/// The process-global symbol table.
///
/// Strings are copied into the table and never moved or freed for the
/// lifetime of the interner, matching `spec.md` §4.2's arena-of-pages
/// description (here backed by `Vec<Box<str>>`, which never reallocates
/// existing entries in place).
pub struct SymbolInterner {
    tables: RwLock<Tables>,
}

impl Default for SymbolInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolInterner {
    pub fn new() -> Self {
        let mut by_id = Vec::with_capacity(64);
        by_id.push(Box::from(""));
        let mut by_str = HashMap::with_capacity(64);
        by_str.insert(Box::from(""), 0);
        SymbolInterner {
            tables: RwLock::new(Tables { by_str, by_id }),
        }
    }

    /// Intern `s`, returning the same id for the same bytes within this
    /// interner's lifetime.
    pub fn intern(&self, s: &str) -> Symbol {
        if s.is_empty() {
            return Symbol::NULL;
        }
        {
            let tables = self.tables.read();
            if let Some(&id) = tables.by_str.get(s) {
                return Symbol(id);
            }
        }
        let mut tables = self.tables.write();
        // Re-check: another writer may have interned `s` while we waited.
        if let Some(&id) = tables.by_str.get(s) {
            return Symbol(id);
        }
        let id = tables.by_id.len() as u32;
        let boxed: Box<str> = Box::from(s);
        tables.by_id.push(boxed.clone());
        tables.by_str.insert(boxed, id);
        Symbol(id)
    }

    /// Look up the string for a previously interned id.
    ///
    /// Panics if `id` was never returned by `intern` on this interner,
    /// since that indicates a corrupted symbol vector (`spec.md` §4.12,
    /// "a symbol id larger than the symbol dictionary length is a fatal
    /// open error" — callers reading from storage must validate bounds
    /// themselves before calling `get`).
    pub fn get(&self, sym: Symbol) -> Box<str> {
        let tables = self.tables.read();
        tables.by_id[sym.0 as usize].clone()
    }

    pub fn try_get(&self, sym: Symbol) -> Option<Box<str>> {
        let tables = self.tables.read();
        tables.by_id.get(sym.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_yield_same_id() {
        let interner = SymbolInterner::new();
        let a = interner.intern("apl");
        let b = interner.intern("apl");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_yield_different_ids() {
        let interner = SymbolInterner::new();
        let a = interner.intern("apl");
        let b = interner.intern("vod");
        assert_ne!(a, b);
    }

    #[test]
    fn empty_string_is_null_symbol() {
        let interner = SymbolInterner::new();
        assert_eq!(interner.intern(""), Symbol::NULL);
    }

    #[test]
    fn round_trips_through_get() {
        let interner = SymbolInterner::new();
        let id = interner.intern("god");
        assert_eq!(&*interner.get(id), "god");
    }

    #[test]
    fn ids_are_monotonic() {
        let interner = SymbolInterner::new();
        let a = interner.intern("one");
        let b = interner.intern("two");
        assert!(b.0 > a.0);
    }
}
