//! Type tags.
//!
//! Positive tags name a vector kind; the arithmetic negation of a vector
//! tag names the corresponding atom. Kinds that have no vector form
//! (`LAMBDA`/`UNARY`/`BINARY`/`VARY`/`EXT`/`ERROR`) keep the same tag in
//! atom position; `is_atom`/`is_vector` below account for that.
//!
//! Numeric values follow `examples/original_source/core/rayforce.h`
//! (`TYPE_LIST=0` .. `TYPE_ERROR=127`) since `spec.md` §3.2 names the tags
//! but never pins down concrete numbers, and round-tripping the
//! serializer's one-byte type prefix (`spec.md` §4.13) requires a fixed
//! encoding.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i8)]
pub enum Tag {
    List = 0,
    Bool = 1,
    U8 = 2,
    I64 = 3,
    F64 = 4,
    Symbol = 5,
    Timestamp = 6,
    Guid = 7,
    Char = 8,
    I16 = 9,
    I32 = 10,
    Date = 11,
    Time = 12,
    Enum = 20,
    AnyMap = 77,
    FilterMap = 78,
    GroupMap = 79,
    MapFd = 80,
    Table = 98,
    Dict = 99,
    Lambda = 100,
    Unary = 101,
    Binary = 102,
    Vary = 103,
    Ext = 110,
    Error = 127,
}

impl Tag {
    /// Primitive element vector tags, in promotion order
    /// (`bool < u8 < i16 < i32 < i64 < f64`, per `spec.md` §4.8).
    pub const PRIMITIVE_ORDER: [Tag; 6] =
        [Tag::Bool, Tag::U8, Tag::I16, Tag::I32, Tag::I64, Tag::F64];

    /// Width in bytes of one element, for vector tags with a fixed-size
    /// primitive payload. Composite kinds (List/Dict/Table/...) return
    /// `None`.
    pub const fn element_size(self) -> Option<usize> {
        use Tag::*;
        Some(match self {
            Bool | U8 | Char => 1,
            I16 | Time => 2,
            I32 | Date => 4,
            I64 | Timestamp | Symbol | Enum => 8,
            F64 => 8,
            Guid => 16,
            _ => return None,
        })
    }

    /// True if this tag, when negated, names the corresponding atom.
    /// `LAMBDA/UNARY/BINARY/VARY/EXT/ERROR` are atom-only and have no
    /// negated form (`spec.md` §3.2).
    pub const fn has_atom_form(self) -> bool {
        !matches!(
            self,
            Tag::Lambda | Tag::Unary | Tag::Binary | Tag::Vary | Tag::Ext | Tag::Error
        )
    }

    pub const fn atom_tag(self) -> i8 {
        if self.has_atom_form() {
            -(self as i8)
        } else {
            self as i8
        }
    }

    /// Resolve a raw tag byte back into a `Tag`, honoring the negated
    /// atom convention.
    pub fn from_raw(raw: i8) -> Option<(Tag, bool)> {
        let is_atom = raw < 0 || matches!(raw, 100..=103 | 110 | 127);
        let positive = if raw < 0 { -raw } else { raw };
        Tag::from_positive(positive).map(|t| (t, is_atom))
    }

    fn from_positive(v: i8) -> Option<Tag> {
        use Tag::*;
        Some(match v {
            0 => List,
            1 => Bool,
            2 => U8,
            3 => I64,
            4 => F64,
            5 => Symbol,
            6 => Timestamp,
            7 => Guid,
            8 => Char,
            9 => I16,
            10 => I32,
            11 => Date,
            12 => Time,
            20 => Enum,
            77 => AnyMap,
            78 => FilterMap,
            79 => GroupMap,
            80 => MapFd,
            98 => Table,
            99 => Dict,
            100 => Lambda,
            101 => Unary,
            102 => Binary,
            103 => Vary,
            110 => Ext,
            127 => Error,
            _ => return None,
        })
    }

    pub fn type_name(self) -> &'static str {
        use Tag::*;
        match self {
            List => "list",
            Bool => "bool",
            U8 => "byte",
            I64 => "i64",
            F64 => "f64",
            Symbol => "symbol",
            Timestamp => "timestamp",
            Guid => "guid",
            Char => "char",
            I16 => "i16",
            I32 => "i32",
            Date => "date",
            Time => "time",
            Enum => "enum",
            AnyMap => "anymap",
            FilterMap => "filtermap",
            GroupMap => "groupmap",
            MapFd => "mapfd",
            Table => "table",
            Dict => "dict",
            Lambda => "lambda",
            Unary => "unary",
            Binary => "binary",
            Vary => "vary",
            Ext => "ext",
            Error => "error",
        }
    }

    /// Promotion rank used by binary arithmetic's type-promotion matrix
    /// (`spec.md` §4.8). `None` for tags outside the numeric ladder.
    pub fn numeric_rank(self) -> Option<u8> {
        Self::PRIMITIVE_ORDER
            .iter()
            .position(|&t| t == self)
            .map(|i| i as u8)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_tag_negates_vector_tag() {
        assert_eq!(Tag::I64.atom_tag(), -3);
        assert_eq!(Tag::F64.atom_tag(), -4);
    }

    #[test]
    fn atom_only_kinds_keep_their_tag() {
        assert_eq!(Tag::Lambda.atom_tag(), 100);
        assert_eq!(Tag::Error.atom_tag(), 127);
    }

    #[test]
    fn from_raw_round_trips() {
        let (tag, is_atom) = Tag::from_raw(-3).unwrap();
        assert_eq!(tag, Tag::I64);
        assert!(is_atom);

        let (tag, is_atom) = Tag::from_raw(3).unwrap();
        assert_eq!(tag, Tag::I64);
        assert!(!is_atom);
    }

    #[test]
    fn numeric_promotion_order() {
        assert!(Tag::Bool.numeric_rank() < Tag::U8.numeric_rank());
        assert!(Tag::I32.numeric_rank() < Tag::I64.numeric_rank());
        assert!(Tag::I64.numeric_rank() < Tag::F64.numeric_rank());
    }
}
