//! Persistent worker pool with atomic chunk dispensing.
//!
//! A fixed set of OS threads repeatedly executes a borrowed body over an
//! index range. Work is handed out in chunks through a single lock-free
//! fetch-add counter; the constructing (parent) thread participates in every
//! call and returns only when all workers are idle again.
//!
//! # Usage
//!
//! ```ignore
//! let pool = WorkerPool::new(8);
//! pool.call(
//!   |first, count| {
//!     for index in first..first + count {
//!       simulate_packet(index)?;
//!     }
//!     Ok(())
//!   },
//!   1_000_000,
//! )?;
//! ```
//!
//! The first error raised inside the body wins: the remaining chunks are
//! drained (every thread sees an empty dispenser on its next fetch) and the
//! error is rethrown from `call` once the pool is quiet. Panics inside the
//! body are caught at the thread boundary and surfaced the same way.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use crate::error::{Error, Result};

/// Chunks handed out per thread when `chunks_of_one` is off; empirical
/// load-balancing factor for photon-loop cost distributions.
const CHUNKS_PER_THREAD: usize = 8;

type Body<'a> = &'a (dyn Fn(usize, usize) -> Result<()> + Sync);

/// Work target published to the workers for one `call`.
///
/// The body reference is lifetime-erased; `call` guarantees it outlives every
/// use by blocking until all workers are idle.
#[derive(Clone, Copy)]
struct Task {
  body: Body<'static>,
  n: usize,
  chunk_size: usize,
}

struct PoolState {
  task: Option<Task>,
  /// Bumped once per `call`; workers compare against their last seen value.
  generation: u64,
  /// Workers still inside the current generation's work loop.
  active: usize,
  /// First error raised by any thread during the current call.
  error: Option<Error>,
  terminate: bool,
}

struct Shared {
  state: Mutex<PoolState>,
  /// Workers sleep here while idle.
  wake: Condvar,
  /// The parent sleeps here until `active` drops to zero.
  done: Condvar,
  /// Next chunk index to dispense.
  next_chunk: AtomicUsize,
  /// Chunk count for the current call; stored to zero to drain.
  chunk_limit: AtomicUsize,
  /// Stop flag checked at every chunk fetch.
  abort: AtomicBool,
}

/// Fixed-size pool of persistent worker threads.
///
/// The constructing thread owns the pool: it is the only thread allowed to
/// invoke [`call`](WorkerPool::call), and it takes part in the work itself.
pub struct WorkerPool {
  shared: Arc<Shared>,
  workers: Vec<JoinHandle<()>>,
  owner: ThreadId,
  thread_count: usize,
}

impl WorkerPool {
  /// Create a pool running on `thread_count` threads in total: this thread
  /// plus `thread_count - 1` spawned workers.
  pub fn new(thread_count: usize) -> Self {
    let thread_count = thread_count.max(1);
    let shared = Arc::new(Shared {
      state: Mutex::new(PoolState {
        task: None,
        generation: 0,
        active: 0,
        error: None,
        terminate: false,
      }),
      wake: Condvar::new(),
      done: Condvar::new(),
      next_chunk: AtomicUsize::new(0),
      chunk_limit: AtomicUsize::new(0),
      abort: AtomicBool::new(false),
    });

    let workers = (1..thread_count)
      .map(|index| {
        let shared = Arc::clone(&shared);
        thread::Builder::new()
          .name(format!("mcrt-worker-{index}"))
          .spawn(move || worker_loop(&shared))
          .expect("failed to spawn worker thread")
      })
      .collect();

    Self {
      shared,
      workers,
      owner: thread::current().id(),
      thread_count,
    }
  }

  /// Pool sized to the machine's available parallelism.
  pub fn with_available_parallelism() -> Self {
    let threads = thread::available_parallelism().map_or(1, |n| n.get());
    Self::new(threads)
  }

  /// Total number of threads participating in each call.
  pub fn thread_count(&self) -> usize {
    self.thread_count
  }

  /// Run `body(first_index, count)` over a partition of `[0, n)`.
  ///
  /// Blocks until every thread is idle again. Each index is covered by
  /// exactly one invocation. Returns the first error raised inside the body,
  /// after all threads have drained.
  ///
  /// # Panics
  /// Panics when invoked from a thread other than the one that constructed
  /// the pool.
  pub fn call<F>(&self, body: F, n: usize) -> Result<()>
  where
    F: Fn(usize, usize) -> Result<()> + Sync,
  {
    self.call_chunked(body, n, false)
  }

  /// Like [`call`](WorkerPool::call), with `chunks_of_one` forcing one index
  /// per chunk (for bodies with strongly uneven cost).
  pub fn call_chunked<F>(&self, body: F, n: usize, chunks_of_one: bool) -> Result<()>
  where
    F: Fn(usize, usize) -> Result<()> + Sync,
  {
    assert_eq!(
      thread::current().id(),
      self.owner,
      "WorkerPool::call must run on the thread that constructed the pool"
    );
    if n == 0 {
      return Ok(());
    }

    let num_chunks = if chunks_of_one {
      n
    } else {
      CHUNKS_PER_THREAD * self.thread_count
    };
    let chunk_size = n.div_ceil(num_chunks).max(1);

    // SAFETY: `call` does not return until every worker has gone idle, so the
    // lifetime-erased borrow below strictly outlives all uses of it.
    let local: Body<'_> = &body;
    let erased: Body<'static> = unsafe { std::mem::transmute(local) };
    let task = Task {
      body: erased,
      n,
      chunk_size,
    };

    // Reset the dispenser before the task becomes visible; workers only
    // start after the generation bump below.
    self.shared.abort.store(false, Ordering::Release);
    self.shared.next_chunk.store(0, Ordering::Release);
    self.shared.chunk_limit.store(num_chunks, Ordering::Release);

    {
      let mut state = self.shared.state.lock().unwrap();
      state.task = Some(task);
      state.generation += 1;
      state.active = self.workers.len();
      state.error = None;
    }
    self.shared.wake.notify_all();

    // The parent participates in its own call.
    run_chunks(&self.shared, task);

    let mut state = self.shared.state.lock().unwrap();
    while state.active > 0 {
      state = self.shared.done.wait(state).unwrap();
    }
    state.task = None;
    match state.error.take() {
      Some(error) => Err(error),
      None => Ok(()),
    }
  }
}

impl Drop for WorkerPool {
  fn drop(&mut self) {
    {
      let mut state = self.shared.state.lock().unwrap();
      state.terminate = true;
    }
    self.shared.wake.notify_all();
    for handle in self.workers.drain(..) {
      let _ = handle.join();
    }
  }
}

/// Per-worker state machine: idle on the condvar, work when a new generation
/// is published, terminate when the pool is dropped.
fn worker_loop(shared: &Shared) {
  let mut seen_generation = 0u64;
  let mut state = shared.state.lock().unwrap();
  loop {
    if state.terminate {
      return;
    }
    if state.generation != seen_generation {
      seen_generation = state.generation;
      if let Some(task) = state.task {
        drop(state);
        run_chunks(shared, task);

        state = shared.state.lock().unwrap();
        state.active -= 1;
        if state.active == 0 {
          shared.done.notify_one();
        }
        continue;
      }
    }
    state = shared.wake.wait(state).unwrap();
  }
}

/// Fetch-and-run chunks until the dispenser runs dry or a failure drains it.
fn run_chunks(shared: &Shared, task: Task) {
  loop {
    if shared.abort.load(Ordering::Acquire) {
      return;
    }
    let index = shared.next_chunk.fetch_add(1, Ordering::Relaxed);
    if index >= shared.chunk_limit.load(Ordering::Acquire) {
      return;
    }
    let first = index * task.chunk_size;
    if first >= task.n {
      return;
    }
    let count = task.chunk_size.min(task.n - first);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (task.body)(first, count)));
    match outcome {
      Ok(Ok(())) => {}
      Ok(Err(error)) => {
        record_failure(shared, error);
        return;
      }
      Err(payload) => {
        record_failure(shared, Error::WorkerPanic(panic_message(&payload)));
        return;
      }
    }
  }
}

/// First error wins; every later failure is discarded. Draining happens by
/// zeroing the chunk limit and raising the stop flag.
fn record_failure(shared: &Shared, error: Error) {
  {
    let mut state = shared.state.lock().unwrap();
    if state.error.is_none() {
      state.error = Some(error);
    }
  }
  shared.abort.store(true, Ordering::Release);
  shared.chunk_limit.store(0, Ordering::Release);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_owned()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "opaque panic payload".to_owned()
  }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod pool_test;
