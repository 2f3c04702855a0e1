use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use super::*;

#[test]
fn test_call_partitions_the_range_exactly_once() {
  let pool = WorkerPool::new(4);
  let chunks: Mutex<Vec<(usize, usize, thread::ThreadId)>> = Mutex::new(Vec::new());

  pool
    .call(
      |first, count| {
        chunks
          .lock()
          .unwrap()
          .push((first, count, thread::current().id()));
        Ok(())
      },
      100,
    )
    .unwrap();

  let chunks = chunks.into_inner().unwrap();

  // Disjoint cover of [0, 100).
  let mut visited = vec![false; 100];
  for &(first, count, _) in &chunks {
    for index in first..first + count {
      assert!(!visited[index], "index {index} dispatched twice");
      visited[index] = true;
    }
  }
  assert!(visited.iter().all(|&v| v));
  assert_eq!(chunks.iter().map(|c| c.1).sum::<usize>(), 100);

  // No more recording threads than pool threads.
  let threads: HashSet<_> = chunks.iter().map(|c| c.2).collect();
  assert!(threads.len() <= 4);
}

#[test]
fn test_zero_work_returns_immediately() {
  let pool = WorkerPool::new(4);
  let calls = AtomicUsize::new(0);
  pool
    .call(
      |_, _| {
        calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
      },
      0,
    )
    .unwrap();
  assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn test_chunks_of_one() {
  let pool = WorkerPool::new(3);
  let counts: Mutex<Vec<usize>> = Mutex::new(Vec::new());
  pool
    .call_chunked(
      |_, count| {
        counts.lock().unwrap().push(count);
        Ok(())
      },
      17,
      true,
    )
    .unwrap();
  let counts = counts.into_inner().unwrap();
  assert_eq!(counts.len(), 17);
  assert!(counts.iter().all(|&c| c == 1));
}

#[test]
fn test_first_error_wins_and_is_rethrown() {
  let pool = WorkerPool::new(4);
  let result = pool.call(
    |first, _| {
      if first >= 40 {
        Err(Error::InvalidConfiguration(format!("chunk at {first}")))
      } else {
        Ok(())
      }
    },
    100,
  );
  assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
}

#[test]
fn test_error_drains_remaining_chunks() {
  // With one-index chunks and a failure on the very first index, the drain
  // must leave most of the range undispatched (in-flight work may finish).
  let pool = WorkerPool::new(2);
  let dispatched = AtomicUsize::new(0);
  let result = pool.call_chunked(
    |first, _| {
      dispatched.fetch_add(1, Ordering::Relaxed);
      if first == 0 {
        Err(Error::NoMassDistribution)
      } else {
        std::thread::sleep(std::time::Duration::from_millis(1));
        Ok(())
      }
    },
    10_000,
    true,
  );
  assert!(result.is_err());
  assert!(dispatched.load(Ordering::Relaxed) < 10_000);
}

#[test]
fn test_body_panic_is_captured() {
  let pool = WorkerPool::new(4);
  let result = pool.call(
    |first, _| {
      if first == 0 {
        panic!("boom at chunk {first}");
      }
      Ok(())
    },
    64,
  );
  match result {
    Err(Error::WorkerPanic(message)) => assert!(message.contains("boom")),
    other => panic!("expected WorkerPanic, got {other:?}"),
  }
}

#[test]
fn test_pool_survives_failed_call() {
  let pool = WorkerPool::new(4);
  assert!(pool.call(|_, _| Err(Error::NoMassDistribution), 10).is_err());

  // The pool must be fully usable afterwards.
  let sum = AtomicUsize::new(0);
  pool
    .call(
      |first, count| {
        sum.fetch_add((first..first + count).sum::<usize>(), Ordering::Relaxed);
        Ok(())
      },
      1000,
    )
    .unwrap();
  assert_eq!(sum.load(Ordering::Relaxed), 999 * 1000 / 2);
}

#[test]
fn test_many_sequential_calls() {
  let pool = WorkerPool::new(4);
  for n in [1usize, 7, 32, 100, 1001] {
    let total = AtomicUsize::new(0);
    pool
      .call(
        |_, count| {
          total.fetch_add(count, Ordering::Relaxed);
          Ok(())
        },
        n,
      )
      .unwrap();
    assert_eq!(total.load(Ordering::Relaxed), n);
  }
}

#[test]
fn test_single_thread_pool_runs_on_parent() {
  let pool = WorkerPool::new(1);
  let parent = thread::current().id();
  let ran_on: Mutex<Vec<thread::ThreadId>> = Mutex::new(Vec::new());
  pool
    .call(
      |_, _| {
        ran_on.lock().unwrap().push(thread::current().id());
        Ok(())
      },
      5,
    )
    .unwrap();
  assert!(ran_on.into_inner().unwrap().iter().all(|&id| id == parent));
}

#[test]
fn test_call_from_foreign_thread_panics() {
  let pool = Arc::new(WorkerPool::new(2));
  let remote = Arc::clone(&pool);
  let handle = thread::spawn(move || remote.call(|_, _| Ok(()), 10));
  assert!(handle.join().is_err());
}
