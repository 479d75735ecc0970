//! The per-runtime `env` (`spec.md` §3.5): the global `functions`/
//! `variables`/`typenames` tables a `RESOLVE` or `set` touches. Per-call
//! argument and let-bindings are not kept here — `spec.md` §4.6 compiles
//! those down to numeric env-slot indices (`LOADENV i`/`STOREENV i`), so
//! they live in [`crate::vm::Frame::slots`] instead, a flat `Vec<Value>`
//! the compiler's `Scope` already numbers at compile time.

use parking_lot::RwLock;
use rayforce_core::symbol::Symbol;
use rayforce_core::tag::Tag;
use rayforce_core::value::Value;
use std::collections::HashMap;

/// Global state shared by every VM thread in a runtime (`spec.md` §3.5,
/// §5 "the symbol interner is the only true singleton" — `Env` is the
/// second process-wide table, guarded the same way).
pub struct Env {
    functions: RwLock<HashMap<Symbol, Value>>,
    variables: RwLock<HashMap<Symbol, Value>>,
    typenames: RwLock<HashMap<Tag, Symbol>>,
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl Env {
    pub fn new() -> Self {
        Env {
            functions: RwLock::new(HashMap::new()),
            variables: RwLock::new(HashMap::new()),
            typenames: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_builtin(&self, name: Symbol, builtin: Value) {
        self.functions.write().insert(name, builtin);
    }

    pub fn lookup_function(&self, name: Symbol) -> Option<Value> {
        self.functions.read().get(&name).cloned()
    }

    pub fn get_variable(&self, name: Symbol) -> Option<Value> {
        self.variables.read().get(&name).cloned()
    }

    pub fn set_variable(&self, name: Symbol, value: Value) {
        self.variables.write().insert(name, value);
    }

    /// `RESOLVE` (`spec.md` §4.6): a global binding may be either a
    /// previously `set` variable or a builtin/lambda registered as a
    /// function; variables shadow functions of the same name.
    pub fn resolve(&self, name: Symbol) -> Option<Value> {
        self.get_variable(name).or_else(|| self.lookup_function(name))
    }

    pub fn register_typename(&self, tag: Tag, name: Symbol) {
        self.typenames.write().insert(tag, name);
    }

    pub fn typename(&self, tag: Tag) -> Option<Symbol> {
        self.typenames.read().get(&tag).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayforce_core::symbol::SymbolInterner;

    #[test]
    fn variable_shadows_function_of_same_name() {
        let interner = SymbolInterner::new();
        let env = Env::new();
        let name = interner.intern("x");
        env.register_builtin(name, Value::Bool(true));
        env.set_variable(name, Value::I64(7));
        assert!(matches!(env.resolve(name), Some(Value::I64(7))));
    }

    #[test]
    fn unregistered_name_resolves_to_none() {
        let interner = SymbolInterner::new();
        let env = Env::new();
        assert!(env.resolve(interner.intern("missing")).is_none());
    }
}
