//! Primitive vector payload: tag + contiguous element buffer
//! (`spec.md` §3.1 "Length + contiguous element array").
//!
//! Element bytes live in a [`RawBuf`], i.e. on the owning thread's
//! buddy-allocator heap, matching `spec.md` §4.1's allocator sizing
//! ("service allocations from ~64B up to ~32MB").

use super::raw_buf::RawBuf;
use crate::alloc::ThreadHeap;
use crate::tag::Tag;
use std::sync::Arc;

/// Typed null sentinels, per `spec.md` §3.2 ("distinguished null
/// bit-pattern... min signed value for integers, NaN for F64, zero GUID,
/// specific sentinel for date/time/timestamp, symbol id 0") and
/// `examples/original_source/core/rayforce.h`'s `NULL_I64`/`NULL_F64`.
pub mod null {
    pub const I16: i16 = i16::MIN;
    pub const I32: i32 = i32::MIN;
    pub const I64: i64 = i64::MIN;
    pub const F64: f64 = f64::NAN;
    pub const DATE: i32 = i32::MIN;
    pub const TIME: i32 = i32::MIN;
    pub const TIMESTAMP: i64 = i64::MIN;
    pub const SYMBOL: u32 = 0;
    pub const GUID: [u8; 16] = [0u8; 16];
    pub const BOOL: u8 = 0;
    pub const U8: u8 = 0;
    pub const CHAR: u8 = 0;
}

/// A vector of one primitive element kind. `tag` must be one of the
/// kinds `Tag::element_size` answers for.
#[derive(Debug)]
pub struct VecData {
    tag: Tag,
    refcount_enabled: bool,
    buf: RawBuf,
}

impl VecData {
    pub fn with_capacity(heap: Arc<ThreadHeap>, tag: Tag, capacity: usize) -> Self {
        let elem = tag
            .element_size()
            .unwrap_or_else(|| panic!("{tag} has no primitive element form"));
        VecData {
            tag,
            refcount_enabled: true,
            buf: RawBuf::with_capacity(heap, elem * capacity),
        }
    }

    pub fn from_bytes(heap: Arc<ThreadHeap>, tag: Tag, bytes: &[u8]) -> Self {
        VecData {
            tag,
            refcount_enabled: true,
            buf: RawBuf::from_bytes(heap, bytes),
        }
    }

    /// Construct a `refcount_enabled=no` vector over borrowed mmap bytes
    /// (`spec.md` §3.4, "Mmap-backed column objects have
    /// `refcount_enabled=no`"). The caller (a `MapFdData`) owns the
    /// mapping's lifetime; this copies the bytes into a heap buffer —
    /// the zero-copy mmap view itself lives in `MapFdData`, not here.
    pub fn from_bytes_no_refcount(heap: Arc<ThreadHeap>, tag: Tag, bytes: &[u8]) -> Self {
        let mut v = VecData::from_bytes(heap, tag, bytes);
        v.refcount_enabled = false;
        v
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn refcount_enabled(&self) -> bool {
        self.refcount_enabled
    }

    fn elem_size(&self) -> usize {
        self.tag.element_size().expect("primitive tag")
    }

    pub fn len(&self) -> usize {
        self.buf.len() / self.elem_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut_slice()
    }

    /// `spec.md` §4.3 `resize(v, n)`: grow (zero-filled) or shrink the
    /// logical length in place. Callers are responsible for the
    /// copy-on-write check (§3.4) before calling this on a shared vector.
    pub fn resize(&mut self, new_len: usize) {
        let elem = self.elem_size();
        self.buf.resize(new_len, elem);
    }

    pub fn push_raw(&mut self, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.elem_size());
        self.buf.extend_from_slice(bytes);
    }

    /// `spec.md` §4.3 `at_idx`: out-of-range reads return the typed
    /// null rather than panicking.
    pub fn at_idx_bytes(&self, i: usize) -> Vec<u8> {
        let elem = self.elem_size();
        if i < self.len() {
            self.as_bytes()[i * elem..(i + 1) * elem].to_vec()
        } else {
            self.null_bytes()
        }
    }

    fn null_bytes(&self) -> Vec<u8> {
        use Tag::*;
        match self.tag {
            Bool => vec![null::BOOL],
            U8 => vec![null::U8],
            Char => vec![null::CHAR],
            I16 => null::I16.to_le_bytes().to_vec(),
            I32 | Date => null::I32.to_le_bytes().to_vec(),
            I64 | Timestamp => null::I64.to_le_bytes().to_vec(),
            F64 => null::F64.to_le_bytes().to_vec(),
            // Symbol id 0 is the null symbol (`spec.md` §3.2/§4.2); the
            // zero-filled default arm below already produces that.
            Time => null::TIME.to_le_bytes().to_vec(),
            Guid => null::GUID.to_vec(),
            _ => vec![0; self.elem_size()],
        }
    }

    /// `spec.md` §4.3 `find_raw`: linear scan, returns `len()` if absent.
    pub fn find_raw(&self, needle: &[u8]) -> usize {
        let elem = self.elem_size();
        let n = self.len();
        for i in 0..n {
            if &self.as_bytes()[i * elem..(i + 1) * elem] == needle {
                return i;
            }
        }
        n
    }

    pub fn clone_data(&self) -> VecData {
        VecData {
            tag: self.tag,
            refcount_enabled: self.refcount_enabled,
            buf: self.buf.clone_buf(),
        }
    }

    pub fn as_i64_slice(&self) -> &[i64] {
        debug_assert_eq!(self.tag, Tag::I64);
        let bytes = self.as_bytes();
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const i64, bytes.len() / 8) }
    }

    pub fn as_f64_slice(&self) -> &[f64] {
        debug_assert_eq!(self.tag, Tag::F64);
        let bytes = self.as_bytes();
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const f64, bytes.len() / 8) }
    }

    pub fn push_i64(&mut self, v: i64) {
        self.push_raw(&v.to_le_bytes());
    }

    pub fn push_f64(&mut self, v: f64) {
        self.push_raw(&v.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Arc<ThreadHeap> {
        Arc::new(ThreadHeap::new())
    }

    #[test]
    fn push_and_read_i64() {
        let mut v = VecData::with_capacity(heap(), Tag::I64, 4);
        v.push_i64(10);
        v.push_i64(20);
        assert_eq!(v.as_i64_slice(), &[10, 20]);
    }

    #[test]
    fn out_of_range_returns_null() {
        let v = VecData::with_capacity(heap(), Tag::I64, 0);
        let bytes = v.at_idx_bytes(5);
        assert_eq!(i64::from_le_bytes(bytes.try_into().unwrap()), null::I64);
    }

    #[test]
    fn find_raw_returns_len_when_absent() {
        let mut v = VecData::with_capacity(heap(), Tag::I64, 4);
        v.push_i64(1);
        v.push_i64(2);
        assert_eq!(v.find_raw(&3i64.to_le_bytes()), 2);
        assert_eq!(v.find_raw(&2i64.to_le_bytes()), 1);
    }

    #[test]
    fn resize_grows_zero_filled() {
        let mut v = VecData::with_capacity(heap(), Tag::I32, 0);
        v.resize(3);
        assert_eq!(v.len(), 3);
        assert_eq!(i32::from_le_bytes(v.at_idx_bytes(0).try_into().unwrap()), 0);
    }
}
