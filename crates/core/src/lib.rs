//! Rayforce Core: the tagged value model and the allocator underneath it.
//!
//! This crate provides the language-agnostic primitives shared by the
//! compiler and the runtime:
//!
//! - `tag`: the type tag space (atoms are the negated vector tag).
//! - `error`: the error-kind codes and the `RfError` type that becomes an
//!   `ERROR` value at the VM boundary.
//! - `alloc`: the buddy allocator over mmap-backed pools, and the
//!   per-thread heap that owns it.
//! - `symbol`: the process-global symbol interner.
//! - `value`: the tagged, reference-counted `Value` and its payloads.
//! - `format`: the structured pretty-printer shared by every value kind.
//!
//! # Modules
//!
//! `Value` is the only type the compiler and runtime crates need from here;
//! everything else is implementation detail of how `Value` is represented
//! and allocated.

pub mod alloc;
pub mod error;
pub mod format;
pub mod symbol;
pub mod tag;
pub mod value;

pub use error::{ErrorKind, RfError, Span};
pub use symbol::{Symbol, SymbolInterner};
pub use tag::Tag;
pub use value::{
    composite::{
        BuiltinArity, BuiltinData, DictData, EnumData, ExtData, LambdaData, MapFdData,
        MappedColumn, PartedData, TableData,
    },
    Attrs, RawBuf, Value, VecData,
};
