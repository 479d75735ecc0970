//! Buddy allocator over mmap-backed pools (`spec.md` §4.1).
//!
//! Orders span `[MIN_ORDER, MAX_ORDER]`; each pool is `1 << MAX_ORDER`
//! bytes, reserved with an anonymous `mmap`. Requests whose rounded size
//! would exceed `MAX_ORDER` are satisfied by a direct, dedicated `mmap`
//! that `free` releases with `munmap` instead of returning to a freelist
//! — the "a direct mmap that is tracked as an additional pool" case from
//! `spec.md` §4.1.
//!
//! `MIN_ORDER = 6` (64 B) and `MAX_ORDER = 28` (256 MiB) follow
//! `examples/original_source/core/alloc.h` exactly, since `spec.md` §4.1
//! only gives an approximate upper bound ("`MAX_ORDER≈25`").
//!
//! Every allocation reserves a hidden [`BlockHeader`] immediately before
//! the pointer handed back to the caller, the same trick the original's
//! `realsize`/`node_t` pair uses: `free`/`realloc` recover the order (or
//! the oversized byte count) by reading just behind the pointer, with no
//! side table to keep in sync.
//!
//! This allocator is not internally synchronized — it is meant to be
//! owned by exactly one thread (see [`super::ThreadHeap`]), matching
//! `spec.md` §4.1's "per-thread heaps: each VM thread owns its own heap".

use std::ptr::{self, NonNull};

pub const MIN_ORDER: u32 = 6;
pub const MAX_ORDER: u32 = 28;
pub const MIN_ALLOC: usize = 1 << MIN_ORDER;
pub const MAX_ALLOC: usize = 1 << MAX_ORDER;
pub const POOL_SIZE: usize = 1 << MAX_ORDER;

const HEADER_SIZE: usize = std::mem::size_of::<BlockHeader>();

#[repr(C)]
#[derive(Clone, Copy)]
struct BlockHeader {
    /// `u8::MAX` marks an oversized, directly-mmap'd block; otherwise
    /// this is the buddy order the block was allocated at.
    order: u8,
    pool_index: u32,
    /// Total bytes of the backing mmap, valid only when `order == OVERSIZED`.
    mmap_size: u64,
}

const OVERSIZED: u8 = u8::MAX;

struct FreeNode {
    next: Option<NonNull<FreeNode>>,
}

struct Pool {
    base: *mut u8,
    /// Free-standing oversized allocations are also recorded as
    /// single-block "pools" so `gc` and `Drop` can munmap them uniformly.
    size: usize,
    /// `None` for an oversized pool (it is never split/coalesced).
    is_split_pool: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemStat {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

pub struct BuddyAllocator {
    pools: Vec<Pool>,
    freelist: [Option<NonNull<FreeNode>>; (MAX_ORDER + 1) as usize],
    avail: u64,
    used_bytes: u64,
}

unsafe fn mmap_anon(size: usize) -> *mut u8 {
    let ptr = libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
    );
    if ptr == libc::MAP_FAILED {
        ptr::null_mut()
    } else {
        ptr as *mut u8
    }
}

unsafe fn munmap_region(ptr: *mut u8, size: usize) {
    libc::munmap(ptr as *mut libc::c_void, size);
}

fn order_for(size: usize) -> u32 {
    let size = size.max(MIN_ALLOC);
    let mut order = MIN_ORDER;
    while (1usize << order) < size {
        order += 1;
    }
    order
}

impl Default for BuddyAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BuddyAllocator {
    pub fn new() -> Self {
        BuddyAllocator {
            pools: Vec::new(),
            freelist: [None; (MAX_ORDER + 1) as usize],
            avail: 0,
            used_bytes: 0,
        }
    }

    /// Allocate a zero-initialized block of at least `n` bytes, aligned
    /// to `HEADER_SIZE`. Returns null only once an oversized `mmap`
    /// itself fails (hard OOM, `spec.md` §4.1 "Failure semantics").
    pub fn alloc(&mut self, n: usize) -> *mut u8 {
        let total = n + HEADER_SIZE;
        let order = order_for(total);
        if order > MAX_ORDER {
            return self.alloc_oversized(total);
        }
        let block = self.pop_block(order);
        self.used_bytes += 1 << order;
        unsafe {
            let header = block as *mut BlockHeader;
            (*header).order = order as u8;
            (*header).pool_index = self.pool_index_of(block);
            (*header).mmap_size = 0;
            let payload = block.add(HEADER_SIZE);
            ptr::write_bytes(payload, 0, (1 << order) - HEADER_SIZE);
            payload
        }
    }

    fn alloc_oversized(&mut self, total: usize) -> *mut u8 {
        let page = page_size();
        let rounded = total.div_ceil(page) * page;
        let base = unsafe { mmap_anon(rounded) };
        if base.is_null() {
            return ptr::null_mut();
        }
        self.pools.push(Pool {
            base,
            size: rounded,
            is_split_pool: false,
        });
        self.used_bytes += rounded as u64;
        unsafe {
            let header = base as *mut BlockHeader;
            (*header).order = OVERSIZED;
            (*header).pool_index = (self.pools.len() - 1) as u32;
            (*header).mmap_size = rounded as u64;
            base.add(HEADER_SIZE)
        }
    }

    /// Grow or shrink a previously-allocated block. `old_len` is the
    /// caller-tracked logical length (payload bytes actually live);
    /// on grow, `min(old_len, n)` bytes are copied forward.
    pub fn realloc(&mut self, p: *mut u8, old_len: usize, n: usize) -> *mut u8 {
        if p.is_null() {
            return self.alloc(n);
        }
        let header = unsafe { &*(p.sub(HEADER_SIZE) as *const BlockHeader) };
        if header.order == OVERSIZED {
            let cap = header.mmap_size as usize - HEADER_SIZE;
            if n <= cap {
                return p;
            }
        } else {
            let cap = (1usize << header.order) - HEADER_SIZE;
            if order_for(n + HEADER_SIZE) <= header.order as u32 {
                return p;
            }
            debug_assert!(old_len <= cap);
        }
        let new_ptr = self.alloc(n);
        if !new_ptr.is_null() {
            let copy_len = old_len.min(n);
            unsafe { ptr::copy_nonoverlapping(p, new_ptr, copy_len) };
            self.free(p);
        }
        new_ptr
    }

    /// Return a block to the allocator, coalescing with its buddy
    /// whenever the buddy is itself free, recursively.
    pub fn free(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        let block = unsafe { p.sub(HEADER_SIZE) };
        let header = unsafe { *(block as *const BlockHeader) };
        if header.order == OVERSIZED {
            self.used_bytes -= header.mmap_size;
            unsafe { munmap_region(block, header.mmap_size as usize) };
            self.remove_pool(header.pool_index as usize);
            return;
        }
        self.used_bytes -= 1u64 << header.order;
        self.coalesce_and_push(block, header.order as u32, header.pool_index as usize);
    }

    fn coalesce_and_push(&mut self, mut block: *mut u8, mut order: u32, pool_index: usize) {
        while order < MAX_ORDER {
            let base = self.pools[pool_index].base;
            let offset = block as usize - base as usize;
            let buddy_offset = offset ^ (1usize << order);
            let buddy = unsafe { base.add(buddy_offset) };
            if !self.unlink_if_present(order, buddy) {
                break;
            }
            block = if (buddy as usize) < (block as usize) {
                buddy
            } else {
                block
            };
            order += 1;
        }
        self.push_free(order, block, pool_index);
    }

    fn unlink_if_present(&mut self, order: u32, target: *mut u8) -> bool {
        let idx = order as usize;
        let mut cur = self.freelist[idx];
        let mut prev: Option<NonNull<FreeNode>> = None;
        while let Some(node) = cur {
            if node.as_ptr() as *mut u8 == target {
                let next = unsafe { node.as_ref().next };
                match prev {
                    Some(mut p) => unsafe { p.as_mut().next = next },
                    None => self.freelist[idx] = next,
                }
                if self.freelist[idx].is_none() {
                    self.avail &= !(1 << order);
                }
                return true;
            }
            prev = cur;
            cur = unsafe { node.as_ref().next };
        }
        false
    }

    fn push_free(&mut self, order: u32, block: *mut u8, _pool_index: usize) {
        // While a block sits on a freelist its identity is the (order,
        // address) pair carried by the freelist array itself — no header
        // bookkeeping needs to survive here, so we just thread the
        // intrusive link through the block's own (otherwise unused)
        // first bytes. `alloc`/`split_down` rewrite the `BlockHeader`
        // fully before handing a block back out.
        unsafe {
            let node = block as *mut FreeNode;
            (*node).next = self.freelist[order as usize];
            self.freelist[order as usize] = NonNull::new(node);
        }
        self.avail |= 1 << order;
    }

    fn pop_block(&mut self, order: u32) -> *mut u8 {
        let mask = !0u64 << order;
        let candidates = self.avail & mask & ((1u64 << (MAX_ORDER + 1)) - 1);
        let found_order = if candidates == 0 {
            self.add_pool();
            MAX_ORDER
        } else {
            candidates.trailing_zeros()
        };
        let node = self.freelist[found_order as usize].unwrap();
        self.freelist[found_order as usize] = unsafe { node.as_ref().next };
        if self.freelist[found_order as usize].is_none() {
            self.avail &= !(1 << found_order);
        }
        let pool_index = self.pool_index_of(node.as_ptr() as *mut u8);
        self.split_down(node.as_ptr() as *mut u8, found_order, order, pool_index)
    }

    fn split_down(&mut self, mut block: *mut u8, mut have: u32, want: u32, pool_index: usize) -> *mut u8 {
        while have > want {
            have -= 1;
            let buddy = unsafe { block.add(1usize << have) };
            self.push_free(have, buddy, pool_index);
        }
        block
    }

    fn add_pool(&mut self) {
        let base = unsafe { mmap_anon(POOL_SIZE) };
        assert!(!base.is_null(), "buddy allocator: pool mmap failed (OOM)");
        self.pools.push(Pool {
            base,
            size: POOL_SIZE,
            is_split_pool: true,
        });
        let pool_index = self.pools.len() - 1;
        self.push_free(MAX_ORDER, base, pool_index);
    }

    fn pool_index_of(&self, p: *mut u8) -> u32 {
        for (i, pool) in self.pools.iter().enumerate() {
            let start = pool.base as usize;
            if (p as usize) >= start && (p as usize) < start + pool.size {
                return i as u32;
            }
        }
        panic!("buddy allocator: pointer does not belong to any tracked pool");
    }

    fn remove_pool(&mut self, index: usize) {
        // Oversized pools are removed eagerly on free; splittable pools
        // are only removed by `gc`. Swap-remove would invalidate other
        // pools' `pool_index`, so oversized pools are tombstoned instead.
        self.pools[index].size = 0;
    }

    /// Walk the top-order freelist and release any pool-sized free block
    /// back to the OS (`spec.md` §4.1 `gc()`).
    pub fn gc(&mut self) {
        let top = MAX_ORDER as usize;
        let mut cur = self.freelist[top];
        let mut prev: Option<NonNull<FreeNode>> = None;
        let mut freed_any = false;
        while let Some(node) = cur {
            let addr = node.as_ptr() as *mut u8;
            let pool_index = self.pool_index_of(addr);
            let is_whole_pool =
                self.pools[pool_index].is_split_pool && self.pools[pool_index].base == addr;
            let next = unsafe { node.as_ref().next };
            if is_whole_pool {
                match prev {
                    Some(mut p) => unsafe { p.as_mut().next = next },
                    None => self.freelist[top] = next,
                }
                unsafe { munmap_region(addr, POOL_SIZE) };
                self.pools[pool_index].size = 0;
                freed_any = true;
            } else {
                prev = cur;
            }
            cur = next;
        }
        if freed_any && self.freelist[top].is_none() {
            self.avail &= !(1 << top);
        }
    }

    pub fn stats(&self) -> MemStat {
        let total: u64 = self.pools.iter().map(|p| p.size as u64).sum();
        MemStat {
            total,
            used: self.used_bytes,
            free: total.saturating_sub(self.used_bytes),
        }
    }
}

impl Drop for BuddyAllocator {
    fn drop(&mut self) {
        for pool in &self.pools {
            if pool.size > 0 {
                unsafe { munmap_region(pool.base, pool.size) };
            }
        }
    }
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_zeroed_block() {
        let mut a = BuddyAllocator::new();
        let p = a.alloc(128);
        assert!(!p.is_null());
        unsafe {
            for i in 0..128 {
                assert_eq!(*p.add(i), 0);
            }
        }
        a.free(p);
    }

    #[test]
    fn free_then_alloc_reuses_block() {
        let mut a = BuddyAllocator::new();
        let p1 = a.alloc(100);
        a.free(p1);
        let p2 = a.alloc(100);
        assert_eq!(p1, p2, "freed block should be reused by the next same-size alloc");
        a.free(p2);
    }

    #[test]
    fn buddies_coalesce_back_to_parent_order() {
        let mut a = BuddyAllocator::new();
        // Two same-order neighbors should merge back into one pool-sized
        // free block once both are freed.
        let p1 = a.alloc(100);
        let p2 = a.alloc(100);
        a.free(p1);
        a.free(p2);
        let big = a.alloc(POOL_SIZE - HEADER_SIZE - 64);
        assert!(!big.is_null());
        a.free(big);
    }

    #[test]
    fn oversized_alloc_round_trips() {
        let mut a = BuddyAllocator::new();
        let p = a.alloc(MAX_ALLOC + 4096);
        assert!(!p.is_null());
        a.free(p);
    }

    #[test]
    fn realloc_grows_and_copies() {
        let mut a = BuddyAllocator::new();
        let p = a.alloc(8);
        unsafe {
            *p = 42;
        }
        let p2 = a.realloc(p, 8, 4096);
        assert!(!p2.is_null());
        unsafe {
            assert_eq!(*p2, 42);
        }
        a.free(p2);
    }

    #[test]
    fn stats_reflect_usage() {
        let mut a = BuddyAllocator::new();
        let before = a.stats();
        let p = a.alloc(1000);
        let during = a.stats();
        assert!(during.used > before.used);
        a.free(p);
    }
}
