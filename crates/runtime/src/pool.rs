//! Worker pool (`spec.md` §4.10): a fixed number of OS threads created
//! at startup, each owning its own VM and heap, executing tasks posted
//! by `pmap` (`spec.md` §4.9).
//!
//! `spec.md` §4.10 describes a `prepare`/`add_task`/`run` three-call
//! protocol over a shared per-run scratch array plus a CAS task
//! counter. `pmap` (its only real caller, per §4.9) always has every
//! task closure in hand before it needs to run any of them, so that
//! three-call protocol collapses here into one [`WorkerPool::run`]
//! call that takes the whole task list — the CAS-counter "acquire an
//! index, execute, publish by index" loop survives as `run`'s internal
//! dispatch, just without a separate `prepare`/`add_task` round trip
//! the caller would otherwise have to serialize against. Recorded as a
//! deliberate simplification in `DESIGN.md`.
//!
//! Grounded in `std::thread` + `parking_lot::Mutex`/`Condvar` rather
//! than `examples/navicore-cem3`'s own `pool.rs`/`scheduler.rs`, which
//! schedule `may` green-thread coroutines cooperatively onto a small
//! number of OS threads — the opposite of `spec.md` §5's "parallel OS
//! threads" / "one VM per worker thread" model, which needs genuine
//! thread-per-worker parallelism, not cooperative scheduling.

use parking_lot::{Condvar, Mutex};
use rayforce_core::value::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

type Task = Box<dyn FnOnce() -> Vec<Value> + Send>;

struct Shared {
    tasks: Mutex<Vec<Option<Task>>>,
    next: AtomicUsize,
    results: Mutex<Vec<Option<Vec<Value>>>>,
    remaining: AtomicUsize,
    generation: AtomicUsize,
    shutdown: AtomicBool,
    wake: Condvar,
    wake_lock: Mutex<()>,
    done: Condvar,
}

/// A fixed-size pool of worker threads (`spec.md` §4.10). Each worker
/// blocks on a condvar between runs; `run` publishes a batch of tasks,
/// wakes every worker, and blocks until all tasks in that batch (the
/// current "generation") have published a result.
pub struct WorkerPool {
    shared: Arc<Shared>,
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Arc<WorkerPool> {
        let worker_count = worker_count.max(1);
        let shared = Arc::new(Shared {
            tasks: Mutex::new(Vec::new()),
            next: AtomicUsize::new(0),
            results: Mutex::new(Vec::new()),
            remaining: AtomicUsize::new(0),
            generation: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            wake: Condvar::new(),
            wake_lock: Mutex::new(()),
            done: Condvar::new(),
        });
        for _ in 0..worker_count {
            let shared = shared.clone();
            std::thread::spawn(move || worker_loop(shared));
        }
        Arc::new(WorkerPool { shared, worker_count })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Run every task in `tasks` to completion, returning their results
    /// in submission order (`spec.md` §4.9 "concatenate partial results
    /// in submission order").
    pub fn run(&self, tasks: Vec<Task>) -> Vec<Vec<Value>> {
        let n = tasks.len();
        if n == 0 {
            return Vec::new();
        }
        {
            let mut guard = self.shared.tasks.lock();
            *guard = tasks.into_iter().map(Some).collect();
        }
        *self.shared.results.lock() = (0..n).map(|_| None).collect();
        self.shared.next.store(0, Ordering::SeqCst);
        self.shared.remaining.store(n, Ordering::SeqCst);
        self.shared.generation.fetch_add(1, Ordering::SeqCst);

        {
            let _lock = self.shared.wake_lock.lock();
            self.shared.wake.notify_all();
        }

        let mut done_lock = self.shared.wake_lock.lock();
        while self.shared.remaining.load(Ordering::SeqCst) > 0 {
            self.shared.done.wait(&mut done_lock);
        }
        drop(done_lock);

        self.shared.results.lock().drain(..).map(|r| r.unwrap_or_default()).collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let _lock = self.shared.wake_lock.lock();
        self.shared.wake.notify_all();
    }
}

/// One worker: acquire a task index via a CAS counter, run it, publish
/// the result by index, repeat until the counter reaches the batch
/// size, then sleep for the next generation (`spec.md` §4.10's "acquire
/// a task index via a compare-and-swap counter... loop until counter ≥
/// task-count; barrier").
fn worker_loop(shared: Arc<Shared>) {
    let heap = rayforce_core::alloc::ThreadHeap::new();
    let mut seen_generation = shared.generation.load(Ordering::SeqCst);
    loop {
        let mut lock = shared.wake_lock.lock();
        while !shared.shutdown.load(Ordering::SeqCst) && shared.generation.load(Ordering::SeqCst) == seen_generation {
            shared.wake.wait(&mut lock);
        }
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }
        seen_generation = shared.generation.load(Ordering::SeqCst);
        drop(lock);

        heap.gc(); // drain this thread's deferred-free queue before running a new task

        loop {
            let idx = shared.next.fetch_add(1, Ordering::SeqCst);
            let task = {
                let mut tasks = shared.tasks.lock();
                match tasks.get_mut(idx) {
                    Some(slot) => slot.take(),
                    None => break,
                }
            };
            let Some(task) = task else { break };
            let result = task();
            shared.results.lock()[idx] = Some(result);
            if shared.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                let _lock = shared.wake_lock.lock();
                shared.done.notify_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_preserves_submission_order() {
        let pool = WorkerPool::new(4);
        let tasks: Vec<Task> = (0..10)
            .map(|i| -> Task { Box::new(move || vec![Value::I64(i)]) })
            .collect();
        let results = pool.run(tasks);
        let flat: Vec<i64> = results.into_iter().flatten().map(|v| match v {
            Value::I64(n) => n,
            _ => unreachable!(),
        }).collect();
        assert_eq!(flat, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn pool_can_run_multiple_batches() {
        let pool = WorkerPool::new(2);
        let first = pool.run(vec![Box::new(|| vec![Value::I64(1)])]);
        let second = pool.run(vec![Box::new(|| vec![Value::I64(2)])]);
        assert!(matches!(first[0][0], Value::I64(1)));
        assert!(matches!(second[0][0], Value::I64(2)));
    }
}
