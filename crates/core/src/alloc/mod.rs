//! The buddy allocator and the per-thread heap built on top of it
//! (`spec.md` §4.1).

mod buddy;
mod heap;

pub use buddy::{BuddyAllocator, MemStat, MAX_ALLOC, MAX_ORDER, MIN_ALLOC, MIN_ORDER, POOL_SIZE};
pub use heap::ThreadHeap;
