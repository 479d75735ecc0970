//! Composite payloads (`spec.md` §3.2/§3.3): `DICT`, `TABLE`, the
//! callable kinds, `ENUM`, `EXT`, and the splayed/partitioned storage
//! views. Each is held behind an `Arc` in [`super::Value`] so cloning a
//! composite value is O(1) (`spec.md` §3.4).

use super::Value;
use crate::symbol::Symbol;
use std::path::PathBuf;
use std::sync::Arc;

/// `spec.md` §3.3: "two lists of equal length; keys are typically a
/// symbol vector but may be any vector."
#[derive(Debug, Clone)]
pub struct DictData {
    pub keys: Value,
    pub values: Value,
}

/// `spec.md` §3.3: "column-names is a symbol vector of length c;
/// columns is a list of c vectors of identical length n."
#[derive(Debug, Clone)]
pub struct TableData {
    pub column_names: Vec<Symbol>,
    pub columns: Vec<Value>,
}

impl TableData {
    pub fn row_count(&self) -> usize {
        self.columns.first().map(Value::len).unwrap_or(0)
    }

    pub fn column_index(&self, name: Symbol) -> Option<usize> {
        self.column_names.iter().position(|&s| s == name)
    }
}

/// A compiled user lambda (`spec.md` §4.6's `Lambda{args, bytecode,
/// constants, dbg}`). The bytecode/constant representation itself lives
/// in `rayforce-compiler`; core only needs an opaque handle it can store
/// inside a `Value` and the runtime can downcast.
#[derive(Debug, Clone)]
pub struct LambdaData {
    pub params: Vec<Symbol>,
    /// Opaque compiled body, produced by `rayforce_compiler::compile`.
    /// Stored as bytes here so `rayforce-core` does not depend on
    /// `rayforce-compiler` (the dependency runs the other way).
    pub bytecode: Arc<[u8]>,
    pub constants: Arc<[Value]>,
    /// Captured enclosing-scope bindings, for closures.
    pub env: Arc<[(Symbol, Value)]>,
}

/// `spec.md` §3.2: `UNARY`/`BINARY`/`VARY` are native (Rust-implemented)
/// callables distinguished from a compiled `LAMBDA` by arity and the
/// absence of bytecode. The runtime's builtin table is keyed by name and
/// holds the actual function pointer; core only carries the name and
/// declared arity so `Value::Builtin` can be formatted/compared without
/// the runtime crate in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinData {
    pub name: Symbol,
    pub arity: BuiltinArity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinArity {
    Unary,
    Binary,
    Vary,
}

/// `spec.md` §3.3: `(symbol-source, index-vec)`.
#[derive(Debug, Clone)]
pub struct EnumData {
    pub symbols: Arc<[Symbol]>,
    pub indices: Value,
}

/// `spec.md` §3.2: "opaque extension pointer with drop callback."
/// Modeled as a type-erased boxed value rather than a raw pointer, since
/// the embedding host is Rust, not C — `spec.md` §6 leaves the host
/// language unspecified and the original's raw-pointer-plus-callback
/// convention is a C FFI accommodation this workspace has no need for.
pub struct ExtData {
    pub type_name: &'static str,
    pub inner: Box<dyn std::any::Any + Send + Sync>,
}

impl std::fmt::Debug for ExtData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtData").field("type_name", &self.type_name).finish()
    }
}

/// One mmap'd column file backing a splayed table (`spec.md` §3.3
/// "Splayed view (MAPFD)... (obj, fd, byte-size) triples are tracked
/// for release on drop").
pub struct MappedColumn {
    pub path: PathBuf,
    pub map: memmap2::Mmap,
    pub tag: crate::tag::Tag,
}

impl std::fmt::Debug for MappedColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedColumn")
            .field("path", &self.path)
            .field("tag", &self.tag)
            .field("bytes", &self.map.len())
            .finish()
    }
}

/// `spec.md` §3.2/§3.3: a splayed (`MAPFD`) table, one file per column,
/// `refcount_enabled=no` payload whose drop unmaps each file.
#[derive(Debug)]
pub struct MapFdData {
    pub dir: PathBuf,
    pub column_names: Vec<Symbol>,
    pub columns: Vec<MappedColumn>,
}

impl MapFdData {
    pub fn row_count(&self) -> usize {
        self.columns
            .first()
            .map(|c| c.map.len() / c.tag.element_size().unwrap_or(1))
            .unwrap_or(0)
    }
}

/// A partitioned view: one splayed table per partition value, plus the
/// partition-key column injected as column 0 (`spec.md` §3.3).
#[derive(Debug)]
pub struct PartedData {
    pub partition_column: Symbol,
    pub partitions: Vec<(Value, Arc<MapFdData>)>,
}
