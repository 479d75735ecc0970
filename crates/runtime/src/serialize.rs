//! Wire format (`spec.md` §4.13): header + one recursively-encoded
//! value, stable across processes/runtime versions. Backs the `ser`/`de`
//! kernel verbs and, eventually, `pmap` task shipping and on-disk
//! storage of non-columnar values.

use rayforce_core::alloc::ThreadHeap;
use rayforce_core::error::ErrorKind;
use rayforce_core::symbol::{Symbol, SymbolInterner};
use rayforce_core::tag::Tag;
use rayforce_core::value::composite::{BuiltinArity, BuiltinData, DictData};
use rayforce_core::value::{VecData, Value};
use std::sync::Arc;

const MAGIC: u8 = 0xF1;
const VERSION: u8 = 1;
const ENDIAN_LE: u8 = 0;
const MSGTYPE_VALUE: u16 = 0;

/// `ser v`: header + recursively-encoded payload, returned as a `U8`
/// vector (`spec.md` §4.13's frame is an opaque byte blob).
pub fn serialize_value(v: &Value, interner: &SymbolInterner) -> Value {
    let mut payload = Vec::new();
    encode(v, interner, &mut payload);

    let mut out = Vec::with_capacity(12 + payload.len());
    out.push(MAGIC);
    out.push(VERSION);
    out.push(0); // flags
    out.push(ENDIAN_LE);
    out.extend_from_slice(&MSGTYPE_VALUE.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // reserved
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);

    let heap = Arc::new(ThreadHeap::new());
    let mut vec = VecData::with_capacity(heap, Tag::U8, out.len());
    for b in out {
        vec.push_raw(&[b]);
    }
    Value::Vector(Arc::new(vec))
}

/// `de bytes`: inverse of [`serialize_value`]. Rejects headers carrying
/// a version newer than this reader knows with `ERR_NOT_SUPPORTED`
/// (`spec.md` §4.13).
pub fn deserialize_value(v: &Value, interner: &SymbolInterner, heap: &Arc<ThreadHeap>) -> Value {
    let Value::Vector(vec) = v else {
        return Value::error(ErrorKind::Type, "de: expected a byte vector");
    };
    if vec.tag() != Tag::U8 {
        return Value::error(ErrorKind::Type, "de: expected a byte vector");
    }
    let bytes = vec.as_bytes();
    if bytes.len() < 12 {
        return Value::error(ErrorKind::Format, "de: truncated header");
    }
    if bytes[0] != MAGIC {
        return Value::error(ErrorKind::Format, "de: bad magic byte");
    }
    if bytes[1] > VERSION {
        return Value::error(ErrorKind::NotSupported, format!("de: unsupported frame version {}", bytes[1]));
    }
    let size = u64::from_le_bytes(bytes[4..12].try_into().unwrap()) as usize;
    if bytes.len() < 12 + size {
        return Value::error(ErrorKind::Format, "de: truncated payload");
    }
    match decode(&bytes[12..12 + size], interner, heap) {
        Ok((value, _)) => value,
        Err(e) => e,
    }
}

/// The wire type tag (`spec.md` §4.13: "same as the in-memory tag"):
/// negated for atoms, matching `Tag::atom_tag`/`Tag::from_raw`'s sign
/// convention, so a scalar `Symbol` and a `Symbol` vector — which share
/// one [`Tag`] variant — decode unambiguously.
fn wire_tag(v: &Value) -> u8 {
    let atom = !matches!(
        v,
        Value::Vector(_) | Value::List(_) | Value::Dict(_) | Value::Table(_) | Value::MapFd(_) | Value::Parted(_) | Value::Enum(_)
    );
    if atom {
        v.tag().atom_tag() as u8
    } else {
        v.tag() as i8 as u8
    }
}

fn encode(v: &Value, interner: &SymbolInterner, out: &mut Vec<u8>) {
    out.push(wire_tag(v));
    match v {
        Value::Bool(b) => out.push(*b as u8),
        Value::U8(n) | Value::Char(n) => out.push(*n),
        Value::I16(n) => out.extend_from_slice(&n.to_le_bytes()),
        Value::I32(n) | Value::Date(n) => out.extend_from_slice(&n.to_le_bytes()),
        Value::Time(n) => out.extend_from_slice(&(*n as i16).to_le_bytes()),
        Value::I64(n) | Value::Timestamp(n) => out.extend_from_slice(&n.to_le_bytes()),
        Value::F64(n) => out.extend_from_slice(&n.to_le_bytes()),
        Value::Guid(g) => out.extend_from_slice(g),
        Value::Symbol(s) => {
            out.extend_from_slice(interner.get(*s).as_bytes());
            out.push(0);
        }
        Value::Vector(vec) if vec.tag() == Tag::Symbol => {
            out.extend_from_slice(&(vec.len() as u64).to_le_bytes());
            for i in 0..vec.len() {
                if let Value::Symbol(s) = v.at_idx(i) {
                    out.extend_from_slice(interner.get(s).as_bytes());
                }
                out.push(0);
            }
        }
        Value::Vector(vec) => {
            out.extend_from_slice(&(vec.len() as u64).to_le_bytes());
            out.extend_from_slice(vec.as_bytes());
        }
        Value::List(items) => {
            out.extend_from_slice(&(items.len() as u64).to_le_bytes());
            for item in items.iter() {
                encode(item, interner, out);
            }
        }
        Value::Dict(d) => {
            encode(&d.keys, interner, out);
            encode(&d.values, interner, out);
        }
        Value::Table(t) => {
            let names: Vec<Value> = t.column_names.iter().map(|&s| Value::Symbol(s)).collect();
            encode(&Value::List(Arc::new(names)), interner, out);
            encode(&Value::List(Arc::new(t.columns.clone())), interner, out);
        }
        Value::Lambda(l) => {
            let params: Vec<Value> = l.params.iter().map(|&s| Value::Symbol(s)).collect();
            encode(&Value::List(Arc::new(params)), interner, out);
            out.extend_from_slice(&(l.bytecode.len() as u64).to_le_bytes());
            out.extend_from_slice(&l.bytecode);
        }
        Value::Builtin(b) => {
            out.extend_from_slice(interner.get(b.name).as_bytes());
            out.push(0);
        }
        Value::Error(e) => {
            out.push(e.kind.code() as u8);
            let msg = Value::List(Arc::new(e.message.bytes().map(|b| Value::Char(b)).collect()));
            encode(&msg, interner, out);
        }
        _ => {}
    }
}

fn read_cstr(bytes: &[u8]) -> (&str, usize) {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    (std::str::from_utf8(&bytes[..end]).unwrap_or(""), end + 1)
}

fn decode(bytes: &[u8], interner: &SymbolInterner, heap: &Arc<ThreadHeap>) -> Result<(Value, usize), Value> {
    if bytes.is_empty() {
        return Err(Value::error(ErrorKind::Format, "de: truncated value"));
    }
    let (tag, is_atom) = Tag::from_raw(bytes[0] as i8).ok_or_else(|| Value::error(ErrorKind::Format, "de: unknown type tag"))?;
    let rest = &bytes[1..];
    // Twelve tags double as both an atom and a vector element kind
    // (`spec.md` §3.2); the wire tag's sign (`Tag::atom_tag`/`from_raw`)
    // is what actually disambiguates them, so atom decoding is routed
    // here before the shared vector-decoding fallback below.
    if is_atom {
        if let Some((value, consumed)) = decode_atom(tag, rest, interner) {
            return Ok((value, 1 + consumed));
        }
    }
    Ok(match tag {
        Tag::List => {
            let len = u64::from_le_bytes(rest[..8].try_into().unwrap()) as usize;
            let mut off = 8;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                let (v, n) = decode(&rest[off..], interner, heap)?;
                items.push(v);
                off += n;
            }
            (Value::List(Arc::new(items)), 1 + off)
        }
        Tag::Dict => {
            let (keys, n1) = decode(rest, interner, heap)?;
            let (values, n2) = decode(&rest[n1..], interner, heap)?;
            (Value::Dict(Arc::new(DictData { keys, values })), 1 + n1 + n2)
        }
        Tag::Table => {
            let (names, n1) = decode(rest, interner, heap)?;
            let (columns, n2) = decode(&rest[n1..], interner, heap)?;
            let column_names: Vec<Symbol> = match names {
                Value::List(items) => items.iter().filter_map(|v| if let Value::Symbol(s) = v { Some(*s) } else { None }).collect(),
                _ => Vec::new(),
            };
            let columns: Vec<Value> = match columns {
                Value::List(items) => items.as_ref().clone(),
                _ => Vec::new(),
            };
            (
                Value::Table(Arc::new(rayforce_core::value::composite::TableData { column_names, columns })),
                1 + n1 + n2,
            )
        }
        Tag::Lambda => {
            let (params, n1) = decode(rest, interner, heap)?;
            let off = n1;
            let len = u64::from_le_bytes(rest[off..off + 8].try_into().unwrap()) as usize;
            let bytecode: Arc<[u8]> = Arc::from(&rest[off + 8..off + 8 + len]);
            let params: Vec<Symbol> = match params {
                Value::List(items) => items.iter().filter_map(|v| if let Value::Symbol(s) = v { Some(*s) } else { None }).collect(),
                _ => Vec::new(),
            };
            (
                Value::Lambda(Arc::new(rayforce_core::value::LambdaData {
                    params,
                    bytecode,
                    constants: Arc::from(Vec::new()),
                    env: Arc::from(Vec::new()),
                })),
                1 + off + 8 + len,
            )
        }
        Tag::Unary | Tag::Binary | Tag::Vary => {
            let (name, consumed) = read_cstr(rest);
            let arity = match tag {
                Tag::Unary => BuiltinArity::Unary,
                Tag::Binary => BuiltinArity::Binary,
                _ => BuiltinArity::Vary,
            };
            (
                Value::Builtin(Arc::new(BuiltinData { name: interner.intern(name), arity })),
                1 + consumed,
            )
        }
        Tag::Error => {
            let code = rest[0];
            let kind = error_kind_from_code(code);
            let (msg, consumed) = decode(&rest[1..], interner, heap)?;
            let message = match msg {
                Value::List(items) => items
                    .iter()
                    .filter_map(|v| if let Value::Char(c) = v { Some(*c as char) } else { None })
                    .collect(),
                _ => String::new(),
            };
            (Value::error(kind, message), 2 + consumed)
        }
        Tag::Symbol => {
            let len = u64::from_le_bytes(rest[..8].try_into().unwrap()) as usize;
            let mut off = 8;
            let mut v = VecData::with_capacity(heap.clone(), Tag::Symbol, len);
            for _ in 0..len {
                let (s, consumed) = read_cstr(&rest[off..]);
                let sym = interner.intern(s);
                let mut bytes = sym.0.to_le_bytes().to_vec();
                bytes.extend_from_slice(&[0u8; 4]);
                v.push_raw(&bytes);
                off += consumed;
            }
            (Value::Vector(Arc::new(v)), 1 + off)
        }
        other if other.element_size().is_some() => {
            let len = u64::from_le_bytes(rest[..8].try_into().unwrap()) as usize;
            let elem = other.element_size().unwrap();
            let data = &rest[8..8 + len * elem];
            let v = VecData::from_bytes(heap.clone(), other, data);
            (Value::Vector(Arc::new(v)), 1 + 8 + len * elem)
        }
        _ => return Err(Value::error(ErrorKind::NotImplemented, format!("de: unsupported tag {tag}"))),
    })
}

/// Atom-form decoding for the twelve dual-use tags (`spec.md` §3.2).
/// Returns `None` for tags with no atom form (`List`/`Dict`/`Table`/...),
/// which [`decode`]'s caller never reaches with `is_atom` set anyway.
fn decode_atom(tag: Tag, rest: &[u8], interner: &SymbolInterner) -> Option<(Value, usize)> {
    Some(match tag {
        Tag::Bool => (Value::Bool(rest[0] != 0), 1),
        Tag::U8 => (Value::U8(rest[0]), 1),
        Tag::Char => (Value::Char(rest[0]), 1),
        Tag::I16 => (Value::I16(i16::from_le_bytes(rest[..2].try_into().unwrap())), 2),
        Tag::I32 => (Value::I32(i32::from_le_bytes(rest[..4].try_into().unwrap())), 4),
        Tag::Date => (Value::Date(i32::from_le_bytes(rest[..4].try_into().unwrap())), 4),
        Tag::Time => (Value::Time(i16::from_le_bytes(rest[..2].try_into().unwrap()) as i32), 2),
        Tag::I64 => (Value::I64(i64::from_le_bytes(rest[..8].try_into().unwrap())), 8),
        Tag::Timestamp => (Value::Timestamp(i64::from_le_bytes(rest[..8].try_into().unwrap())), 8),
        Tag::F64 => (Value::F64(f64::from_le_bytes(rest[..8].try_into().unwrap())), 8),
        Tag::Guid => {
            let mut g = [0u8; 16];
            g.copy_from_slice(&rest[..16]);
            (Value::Guid(g), 16)
        }
        Tag::Symbol => {
            let (s, consumed) = read_cstr(rest);
            (Value::Symbol(interner.intern(s)), consumed)
        }
        _ => return None,
    })
}

fn error_kind_from_code(code: u8) -> ErrorKind {
    use ErrorKind::*;
    [
        Init, Parse, Eval, Format, Type, Length, Arity, Index, Heap, Io, Sys, NotFound, NotExist, NotImplemented,
        NotSupported, StackOverflow, Raise,
    ]
    .into_iter()
    .find(|k| k.code() as u8 == code)
    .unwrap_or(Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_i64_atom() {
        let interner = SymbolInterner::new();
        let heap = Arc::new(ThreadHeap::new());
        let frame = serialize_value(&Value::I64(42), &interner);
        let back = deserialize_value(&frame, &interner, &heap);
        assert!(matches!(back, Value::I64(42)));
    }

    #[test]
    fn round_trips_an_i64_vector() {
        let interner = SymbolInterner::new();
        let heap = Arc::new(ThreadHeap::new());
        let mut v = VecData::with_capacity(heap.clone(), Tag::I64, 3);
        v.push_i64(1);
        v.push_i64(2);
        v.push_i64(3);
        let value = Value::Vector(Arc::new(v));
        let frame = serialize_value(&value, &interner);
        let back = deserialize_value(&frame, &interner, &heap);
        assert_eq!(back.len(), 3);
        assert!(matches!(back.at_idx(1), Value::I64(2)));
    }

    #[test]
    fn rejects_a_future_version() {
        let interner = SymbolInterner::new();
        let heap = Arc::new(ThreadHeap::new());
        let mut frame = serialize_value(&Value::I64(1), &interner);
        if let Value::Vector(v) = &mut frame {
            let owned = Arc::make_mut(v);
            let mut bytes = owned.as_bytes().to_vec();
            bytes[1] = VERSION + 1;
            *owned = VecData::from_bytes(heap.clone(), Tag::U8, &bytes);
        }
        let result = deserialize_value(&frame, &interner, &heap);
        assert!(result.is_error());
    }
}
