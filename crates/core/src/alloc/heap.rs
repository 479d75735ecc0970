//! Per-thread heap wrapping a [`BuddyAllocator`], with a deferred-free
//! queue for values dropped from a foreign thread (`spec.md` §4.1, §5:
//! "drops executed on a foreign thread return blocks to that thread's
//! heap via a deferred free list").

use super::buddy::{BuddyAllocator, MemStat};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::thread::{self, ThreadId};

/// A heap owned by exactly one VM thread. Allocation and same-thread
/// frees go straight to the inner [`BuddyAllocator`] with no locking;
/// frees initiated from another thread are queued and drained the next
/// time this thread touches the heap.
pub struct ThreadHeap {
    owner: ThreadId,
    inner: RefCell<BuddyAllocator>,
    deferred: Mutex<Vec<usize>>,
}

impl Default for ThreadHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadHeap {
    pub fn new() -> Self {
        ThreadHeap {
            owner: thread::current().id(),
            inner: RefCell::new(BuddyAllocator::new()),
            deferred: Mutex::new(Vec::new()),
        }
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn is_owning_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    pub fn alloc(&self, n: usize) -> *mut u8 {
        debug_assert!(
            self.is_owning_thread(),
            "ThreadHeap::alloc called from a non-owning thread"
        );
        self.drain_deferred();
        self.inner.borrow_mut().alloc(n)
    }

    pub fn realloc(&self, p: *mut u8, old_len: usize, n: usize) -> *mut u8 {
        debug_assert!(
            self.is_owning_thread(),
            "ThreadHeap::realloc called from a non-owning thread"
        );
        self.drain_deferred();
        self.inner.borrow_mut().realloc(p, old_len, n)
    }

    /// Free a block owned by this heap, from any thread: on the owning
    /// thread this frees immediately, otherwise the pointer is queued
    /// via [`ThreadHeap::defer_free`] and reclaimed on the next
    /// same-thread heap operation.
    pub fn free(&self, p: *mut u8) {
        if self.is_owning_thread() {
            self.drain_deferred();
            self.inner.borrow_mut().free(p);
        } else {
            self.defer_free(p);
        }
    }

    /// Queue a pointer for freeing by the owning thread. Safe to call
    /// from any thread; the pointer must have been allocated by this
    /// same heap.
    pub fn defer_free(&self, p: *mut u8) {
        self.deferred.lock().push(p as usize);
    }

    fn drain_deferred(&self) {
        let mut pending = self.deferred.lock();
        if pending.is_empty() {
            return;
        }
        let mut allocator = self.inner.borrow_mut();
        for addr in pending.drain(..) {
            allocator.free(addr as *mut u8);
        }
    }

    pub fn gc(&self) {
        self.drain_deferred();
        self.inner.borrow_mut().gc();
    }

    pub fn stats(&self) -> MemStat {
        self.inner.borrow().stats()
    }
}

// SAFETY: `ThreadHeap` is shared only so other threads can call
// `defer_free` (which only ever touches the `Mutex`-guarded queue); the
// `RefCell`-guarded allocator itself is always accessed from its owning
// thread.
unsafe impl Sync for ThreadHeap {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_round_trip() {
        let heap = ThreadHeap::new();
        let p = heap.alloc(64);
        assert!(!p.is_null());
        heap.free(p);
    }

    #[test]
    fn deferred_free_is_drained_on_next_touch() {
        let heap = ThreadHeap::new();
        let p = heap.alloc(64);
        heap.defer_free(p);
        assert_eq!(heap.deferred.lock().len(), 1);
        // Any subsequent heap operation drains the queue.
        let _ = heap.alloc(32);
        assert_eq!(heap.deferred.lock().len(), 0);
    }
}
