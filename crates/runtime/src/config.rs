//! Runtime configuration, passed explicitly at construction rather than
//! read from environment variables or a global — the embedding host
//! (`spec.md` §6) owns process configuration and hands the runtime
//! exactly what it needs, matching `examples/navicore-cem3`'s own
//! constructor-parameter style over implicit global config.

/// Tunables the embedding host may need to adjust per process
/// (`spec.md` §4.1 allocator sizing, §4.7 VM stack depth, §4.10 worker
/// pool size).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of OS threads in the worker pool (`spec.md` §4.10). `0`
    /// means "use the number of available cores".
    pub worker_threads: usize,
    /// Depth of `ps`/`rs` (`spec.md` §4.7's `VM_STACK_SIZE`).
    pub vm_stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            worker_threads: 0,
            vm_stack_size: 4096,
        }
    }
}

impl RuntimeConfig {
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            self.worker_threads
        }
    }
}
