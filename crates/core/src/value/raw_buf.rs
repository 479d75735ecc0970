//! A growable byte buffer backed by a [`ThreadHeap`], i.e. by the buddy
//! allocator rather than Rust's global allocator. This is the hot path
//! `spec.md` §4.1 sizes the allocator for: the contiguous element arrays
//! of primitive vectors and strings (`spec.md` §3.1 "Length + contiguous
//! element array").
//!
//! `RawBuf` owns raw bytes only; typed element access lives in
//! [`super::vecdata::VecData`].

use crate::alloc::ThreadHeap;
use std::sync::Arc;

pub struct RawBuf {
    heap: Arc<ThreadHeap>,
    ptr: *mut u8,
    len: usize,
    cap: usize,
}

// SAFETY: the raw pointer is only ever dereferenced while `self` is
// alive, and frees are routed back through `heap` (which is itself
// `Sync`) even from a foreign thread.
unsafe impl Send for RawBuf {}
unsafe impl Sync for RawBuf {}

impl RawBuf {
    pub fn with_capacity(heap: Arc<ThreadHeap>, cap: usize) -> Self {
        if cap == 0 {
            return RawBuf {
                heap,
                ptr: std::ptr::null_mut(),
                len: 0,
                cap: 0,
            };
        }
        let ptr = heap.alloc(cap);
        assert!(!ptr.is_null(), "buddy allocator OOM requesting {cap} bytes");
        RawBuf {
            heap,
            ptr,
            len: 0,
            cap,
        }
    }

    pub fn from_bytes(heap: Arc<ThreadHeap>, bytes: &[u8]) -> Self {
        let mut buf = RawBuf::with_capacity(heap, bytes.len());
        buf.extend_from_slice(bytes);
        buf
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.ptr.is_null() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.ptr.is_null() {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
        }
    }

    fn grow_to(&mut self, needed_cap: usize) {
        if needed_cap <= self.cap {
            return;
        }
        let new_cap = needed_cap.max(self.cap.max(64) * 2);
        let new_ptr = self.heap.realloc(self.ptr, self.len, new_cap);
        assert!(!new_ptr.is_null(), "buddy allocator OOM growing to {new_cap} bytes");
        self.ptr = new_ptr;
        self.cap = new_cap;
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.grow_to(self.len + bytes.len());
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(self.len), bytes.len());
        }
        self.len += bytes.len();
    }

    /// Resize the logical length, zero-filling on grow. Mirrors
    /// `spec.md` §4.3's `resize(v, n)`.
    pub fn resize(&mut self, new_len: usize, elem_size: usize) {
        let new_byte_len = new_len * elem_size;
        if new_byte_len > self.cap {
            self.grow_to(new_byte_len);
        }
        if new_byte_len > self.len {
            unsafe {
                std::ptr::write_bytes(self.ptr.add(self.len), 0, new_byte_len - self.len);
            }
        }
        self.len = new_byte_len;
    }

    pub fn clone_buf(&self) -> RawBuf {
        RawBuf::from_bytes(self.heap.clone(), self.as_slice())
    }
}

impl std::fmt::Debug for RawBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBuf")
            .field("len", &self.len)
            .field("cap", &self.cap)
            .finish()
    }
}

impl Drop for RawBuf {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            self.heap.free(self.ptr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Arc<ThreadHeap> {
        Arc::new(ThreadHeap::new())
    }

    #[test]
    fn push_and_read_back() {
        let mut buf = RawBuf::with_capacity(heap(), 8);
        buf.extend_from_slice(&[1, 2, 3, 4]);
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut buf = RawBuf::with_capacity(heap(), 1);
        for i in 0..500u32 {
            buf.extend_from_slice(&i.to_le_bytes());
        }
        assert_eq!(buf.len(), 500 * 4);
    }

    #[test]
    fn resize_zero_fills_growth() {
        let mut buf = RawBuf::with_capacity(heap(), 0);
        buf.resize(4, 1);
        assert_eq!(buf.as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn clone_is_independent() {
        let mut a = RawBuf::with_capacity(heap(), 4);
        a.extend_from_slice(&[9, 9]);
        let b = a.clone_buf();
        a.extend_from_slice(&[1]);
        assert_eq!(b.as_slice(), &[9, 9]);
        assert_eq!(a.as_slice(), &[9, 9, 1]);
    }
}
