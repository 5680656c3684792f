//! E5/E6 of the original testable-properties list: a mixed alloc/free
//! workload across many threads leaves every partition's `used` at zero,
//! and sustained alloc/free pressure on a single partition never hands the
//! same slot to two threads at once. The workload shape (many threads,
//! repeated short alloc-then-free cycles on one shared arena) follows
//! `examples/original_source/uslab_bench.c`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use uslab::Arena;

/// Lets `arena.rs`'s `debug!`/`warn!` lifecycle and out-of-memory logging
/// surface under `cargo test -- --nocapture`, the way
/// `examples/amoljassal-sis-kernel-showcase/crates/testing/src/lib.rs`'s
/// `setup_logging` wires `env_logger` into its own test crate.
fn init_logging() {
  let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn e5_concurrent_mixed_workload_drains_to_zero_used() {
  init_logging();
  const THREADS: usize = 8;
  const CYCLES: usize = 2_000;

  let arena = Arc::new(Arena::create_heap(8, (THREADS * CYCLES) as u64, 4).unwrap());
  let successes = Arc::new(AtomicUsize::new(0));
  let barrier = Arc::new(Barrier::new(THREADS));

  let handles: Vec<_> = (0..THREADS)
    .map(|_| {
      let arena = Arc::clone(&arena);
      let successes = Arc::clone(&successes);
      let barrier = Arc::clone(&barrier);
      thread::spawn(move || {
        barrier.wait();
        for _ in 0..CYCLES {
          if let Some(p) = arena.alloc() {
            successes.fetch_add(1, Ordering::Relaxed);
            arena.free(p.as_ptr());
          }
        }
      })
    })
    .collect();

  for h in handles {
    h.join().unwrap();
  }

  assert_eq!(successes.load(Ordering::Relaxed), THREADS * CYCLES);
  for i in 0..arena.npartitions() {
    assert_eq!(arena.used(i), 0, "partition {} leaked used-byte accounting", i);
  }

  Arc::try_unwrap(arena).ok().unwrap().destroy_heap();
}

#[test]
fn e6_aba_stress_never_double_hands_a_slot() {
  init_logging();
  const ITERATIONS: usize = 200_000;

  // A small pool on a single partition is exactly the shape that stresses
  // the generation counter: two threads racing the same partition's head
  // with allocations and frees interleaved tightly enough to make a stale
  // CAS plausible if the generation were not threaded through it.
  let arena = Arc::new(Arena::create_heap(8, 4, 1).unwrap());
  let outstanding: Arc<Mutex<HashSet<usize>>> = Arc::new(Mutex::new(HashSet::new()));
  let violations = Arc::new(AtomicUsize::new(0));

  let handles: Vec<_> = (0..2)
    .map(|_| {
      let arena = Arc::clone(&arena);
      let outstanding = Arc::clone(&outstanding);
      let violations = Arc::clone(&violations);
      thread::spawn(move || {
        for _ in 0..ITERATIONS {
          if let Some(p) = arena.alloc() {
            let addr = p.as_ptr() as usize;
            let fresh = outstanding.lock().unwrap().insert(addr);
            if !fresh {
              violations.fetch_add(1, Ordering::Relaxed);
            }
            outstanding.lock().unwrap().remove(&addr);
            arena.free(p.as_ptr());
          }
        }
      })
    })
    .collect();

  for h in handles {
    h.join().unwrap();
  }

  assert_eq!(
    violations.load(Ordering::Relaxed),
    0,
    "the same slot was observed outstanding to two threads simultaneously"
  );

  Arc::try_unwrap(arena).ok().unwrap().destroy_heap();
}
