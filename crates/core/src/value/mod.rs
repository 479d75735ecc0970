//! The tagged value (`spec.md` §3). A flat enum with inline scalars and
//! `Arc`-wrapped composite payloads, mirroring the teacher's own
//! `runtime::value::Value` (inline-scalar-or-`Arc`-payload enum) but
//! using `Arc` uniformly instead of a raw enum with a hand-rolled
//! `unsafe impl Send`/`Sync` — `Arc`'s atomic refcount already gives us
//! `spec.md` §3.1's "atomic for refcount_enabled values shared across
//! threads" for free, and `Arc::make_mut` gives us §3.4's copy-on-write
//! exactly: it clones the payload only when the strong count is greater
//! than one, otherwise mutates in place.
//!
//! `spec.md` §3.1's header (`memory_mode`, `refcount_enabled`, `type`,
//! `attrs`, `refcount`) is not a separate struct here: `type` is the
//! enum discriminant itself, `refcount` is `Arc`'s internal count,
//! `memory_mode` follows from which variant holds the payload
//! (`Vector` payloads live on a [`crate::alloc::ThreadHeap`], composite
//! spines use the ordinary Rust allocator), and `attrs`/`refcount_enabled`
//! are carried explicitly where a bare `Arc` can't express them (see
//! [`Attrs`] and [`vecdata::VecData::refcount_enabled`]).

pub mod attrs;
pub mod composite;
pub mod raw_buf;
pub mod vecdata;

pub use attrs::Attrs;
pub use composite::{
    BuiltinArity, BuiltinData, DictData, EnumData, ExtData, LambdaData, MapFdData, MappedColumn,
    PartedData, TableData,
};
pub use raw_buf::RawBuf;
pub use vecdata::VecData;

use crate::error::{ErrorKind, RfError, Span};
use crate::symbol::Symbol;
use crate::tag::Tag;
use std::sync::Arc;

/// The tagged value (`spec.md` §3.1). Atoms are inline; every composite
/// or variable-length kind is `Arc`-wrapped so `clone` is O(1) and
/// thread-safe.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
    Char(u8),
    Symbol(Symbol),
    Date(i32),
    Time(i32),
    Timestamp(i64),
    Guid([u8; 16]),

    /// A homogeneous primitive vector (`spec.md` §3.1, "length +
    /// contiguous element array").
    Vector(Arc<VecData>),
    /// A heterogeneous list (`spec.md` §3.2 `LIST`).
    List(Arc<Vec<Value>>),
    Dict(Arc<DictData>),
    Table(Arc<TableData>),
    Enum(Arc<EnumData>),
    Lambda(Arc<LambdaData>),
    Builtin(Arc<BuiltinData>),
    MapFd(Arc<MapFdData>),
    Parted(Arc<PartedData>),
    Ext(Arc<ExtData>),
    /// First-class error (`spec.md` §3.6): short-circuits through every
    /// verb except `try`.
    Error(Arc<RfError>),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Bool(_) => Tag::Bool,
            Value::U8(_) => Tag::U8,
            Value::I16(_) => Tag::I16,
            Value::I32(_) => Tag::I32,
            Value::I64(_) => Tag::I64,
            Value::F64(_) => Tag::F64,
            Value::Char(_) => Tag::Char,
            Value::Symbol(_) => Tag::Symbol,
            Value::Date(_) => Tag::Date,
            Value::Time(_) => Tag::Time,
            Value::Timestamp(_) => Tag::Timestamp,
            Value::Guid(_) => Tag::Guid,
            Value::Vector(v) => v.tag(),
            Value::List(_) => Tag::List,
            Value::Dict(_) => Tag::Dict,
            Value::Table(_) | Value::MapFd(_) | Value::Parted(_) => Tag::Table,
            Value::Enum(_) => Tag::Enum,
            Value::Lambda(_) => Tag::Lambda,
            Value::Builtin(b) => match b.arity {
                BuiltinArity::Unary => Tag::Unary,
                BuiltinArity::Binary => Tag::Binary,
                BuiltinArity::Vary => Tag::Vary,
            },
            Value::Ext(_) => Tag::Ext,
            Value::Error(_) => Tag::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::I16(n) => *n == vecdata::null::I16,
            Value::I32(n) | Value::Date(n) | Value::Time(n) => *n == vecdata::null::I32,
            Value::I64(n) | Value::Timestamp(n) => *n == vecdata::null::I64,
            Value::F64(n) => n.is_nan(),
            Value::Symbol(s) => s.0 == vecdata::null::SYMBOL,
            Value::Guid(g) => *g == vecdata::null::GUID,
            _ => false,
        }
    }

    /// `spec.md` §4.3's notion of length, generalized across every
    /// composite kind: atoms have length 1 (their own arity under
    /// iteration), vectors/lists/dicts/tables their element/row count.
    pub fn len(&self) -> usize {
        match self {
            Value::Vector(v) => v.len(),
            Value::List(v) => v.len(),
            Value::Dict(d) => d.keys.len(),
            Value::Table(t) => t.row_count(),
            Value::MapFd(m) => m.row_count(),
            Value::Parted(p) => p.partitions.iter().map(|(_, t)| t.row_count()).sum(),
            Value::Enum(e) => e.indices.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `spec.md` §4.3 `at_idx(v, i)`: fetch a clone of the element at
    /// `i`; out-of-range on a vector returns the typed null rather than
    /// erroring.
    pub fn at_idx(&self, i: usize) -> Value {
        match self {
            Value::Vector(v) => decode_scalar(v.tag(), &v.at_idx_bytes(i)),
            Value::List(v) => v.get(i).cloned().unwrap_or(Value::Error(Arc::new(
                RfError::new(ErrorKind::Index, "index out of range"),
            ))),
            _ => self.clone(),
        }
    }

    /// `spec.md` §4.3 `find_raw`: linear search, `len()` if absent.
    /// Only meaningful for vectors and lists of scalars; composite kinds
    /// always report "not found".
    pub fn find(&self, needle: &Value) -> usize {
        match self {
            Value::Vector(v) => {
                let bytes = encode_scalar(needle);
                match bytes {
                    Some(b) => v.find_raw(&b),
                    None => v.len(),
                }
            }
            Value::List(v) => v
                .iter()
                .position(|x| values_equal(x, needle))
                .unwrap_or(v.len()),
            _ => 0,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.tag().type_name()
    }

    pub fn type_mismatch(verb: &str, a: &Value, b: &Value) -> RfError {
        RfError::type_mismatch(verb, a.type_name(), b.type_name())
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Value {
        Value::Error(Arc::new(RfError::new(kind, message)))
    }

    pub fn error_at(err: RfError, span: Span) -> Value {
        Value::Error(Arc::new(err.with_span(span)))
    }
}

/// `spec.md` §3.4 copy-on-write: "any mutating operation on `v` with
/// refcount > 1 must first clone the spine... and proceed." `Arc::make_mut`
/// already implements exactly this — it clones via [`VecData::clone_data`]
/// only when the strong count is greater than one.
pub fn resize_cow(v: &mut Arc<VecData>, new_len: usize) {
    Arc::make_mut(v).resize(new_len);
}

pub fn push_raw_cow(v: &mut Arc<VecData>, bytes: &[u8]) {
    let data = Arc::make_mut(v);
    let old_len = data.len();
    data.resize(old_len + 1);
    let elem = data.tag().element_size().expect("primitive tag");
    data.as_bytes_mut()[old_len * elem..(old_len + 1) * elem].copy_from_slice(bytes);
}

/// `spec.md` §4.3 `push_obj`: append a `Value` onto a `LIST`, cloning
/// the spine first if shared.
pub fn push_obj_cow(v: &mut Arc<Vec<Value>>, obj: Value) {
    Arc::make_mut(v).push(obj);
}

impl Clone for VecData {
    fn clone(&self) -> Self {
        self.clone_data()
    }
}

fn decode_scalar(tag: Tag, bytes: &[u8]) -> Value {
    use Tag::*;
    match tag {
        Bool => Value::Bool(bytes[0] != 0),
        U8 => Value::U8(bytes[0]),
        Char => Value::Char(bytes[0]),
        I16 => Value::I16(i16::from_le_bytes(bytes.try_into().unwrap())),
        I32 => Value::I32(i32::from_le_bytes(bytes.try_into().unwrap())),
        Date => Value::Date(i32::from_le_bytes(bytes.try_into().unwrap())),
        Time => Value::Time(i32::from_le_bytes(bytes.try_into().unwrap())),
        I64 => Value::I64(i64::from_le_bytes(bytes.try_into().unwrap())),
        Timestamp => Value::Timestamp(i64::from_le_bytes(bytes.try_into().unwrap())),
        F64 => Value::F64(f64::from_le_bytes(bytes.try_into().unwrap())),
        Symbol | Enum => Value::Symbol(Symbol(u32::from_le_bytes(bytes[..4].try_into().unwrap()))),
        Guid => {
            let mut g = [0u8; 16];
            g.copy_from_slice(&bytes[..16]);
            Value::Guid(g)
        }
        _ => unreachable!("{tag} has no scalar decoding"),
    }
}

fn encode_scalar(v: &Value) -> Option<Vec<u8>> {
    Some(match v {
        Value::Bool(b) => vec![*b as u8],
        Value::U8(b) => vec![*b],
        Value::Char(c) => vec![*c],
        Value::I16(n) => n.to_le_bytes().to_vec(),
        Value::I32(n) => n.to_le_bytes().to_vec(),
        Value::Date(n) => n.to_le_bytes().to_vec(),
        Value::Time(n) => n.to_le_bytes().to_vec(),
        Value::I64(n) => n.to_le_bytes().to_vec(),
        Value::Timestamp(n) => n.to_le_bytes().to_vec(),
        Value::F64(n) => n.to_le_bytes().to_vec(),
        Value::Symbol(s) => {
            let mut b = s.0.to_le_bytes().to_vec();
            b.extend_from_slice(&[0u8; 4]);
            b
        }
        Value::Guid(g) => g.to_vec(),
        _ => return None,
    })
}

/// Structural equality (`spec.md` §4.4 round-trip property, §4.8
/// grouping/`distinct`: "nulls... compare equal to themselves").
/// `F64` compares by bit pattern for NaN (null) so that two nulls are
/// equal, matching the composite-invariant note in `spec.md` §3.2.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    use Value::*;
    match (a, b) {
        (Bool(x), Bool(y)) => x == y,
        (U8(x), U8(y)) => x == y,
        (Char(x), Char(y)) => x == y,
        (I16(x), I16(y)) => x == y,
        (I32(x), I32(y)) => x == y,
        (I64(x), I64(y)) => x == y,
        (Date(x), Date(y)) => x == y,
        (Time(x), Time(y)) => x == y,
        (Timestamp(x), Timestamp(y)) => x == y,
        (F64(x), F64(y)) => x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan()),
        (Symbol(x), Symbol(y)) => x == y,
        (Guid(x), Guid(y)) => x == y,
        (Vector(x), Vector(y)) => x.tag() == y.tag() && x.as_bytes() == y.as_bytes(),
        (List(x), List(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| values_equal(p, q))
        }
        (Error(x), Error(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::ThreadHeap;

    fn heap() -> Arc<ThreadHeap> {
        Arc::new(ThreadHeap::new())
    }

    #[test]
    fn vector_at_idx_decodes_scalar() {
        let mut v = VecData::with_capacity(heap(), Tag::I64, 2);
        v.push_i64(7);
        let val = Value::Vector(Arc::new(v));
        assert!(matches!(val.at_idx(0), Value::I64(7)));
    }

    #[test]
    fn vector_out_of_range_is_null() {
        let v = VecData::with_capacity(heap(), Tag::I64, 0);
        let val = Value::Vector(Arc::new(v));
        assert!(val.at_idx(3).is_null());
    }

    #[test]
    fn clone_is_cheap_arc_bump() {
        let v = VecData::with_capacity(heap(), Tag::I64, 4);
        let val = Value::Vector(Arc::new(v));
        let val2 = val.clone();
        if let (Value::Vector(a), Value::Vector(b)) = (&val, &val2) {
            assert!(Arc::ptr_eq(a, b));
        } else {
            panic!("expected vectors");
        }
    }

    #[test]
    fn nan_equals_nan_for_grouping() {
        assert!(values_equal(&Value::F64(f64::NAN), &Value::F64(f64::NAN)));
    }

    #[test]
    fn error_short_circuits_are_distinguishable() {
        let e = Value::error(ErrorKind::Type, "bad");
        assert!(e.is_error());
    }
}
