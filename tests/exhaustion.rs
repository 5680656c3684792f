//! E3/E4 of the original testable-properties list: single-threaded
//! exhaustion is idempotent and recoverable, and cross-partition stealing
//! lets an arena hand out every slot before reporting out-of-memory.

use uslab::Arena;

#[test]
fn e3_exhaustion_and_recovery() {
  let arena = Arena::create_heap(8, 1, 1).unwrap();

  let q = arena.alloc().unwrap();
  assert!(arena.alloc().is_none());
  assert!(arena.alloc().is_none(), "exhaustion must be idempotent");

  arena.free(q.as_ptr());
  assert!(arena.alloc().is_some());

  arena.destroy_heap();
}

#[test]
fn e4_stealing_across_partitions() {
  let arena = Arena::create_heap(8, 2, 2).unwrap();

  let a = arena.alloc();
  let b = arena.alloc();
  assert!(a.is_some());
  assert!(b.is_some());
  assert_ne!(a.unwrap().as_ptr(), b.unwrap().as_ptr());

  assert!(arena.alloc().is_none());

  arena.destroy_heap();
}

#[test]
fn free_is_a_no_op_for_null() {
  let arena = Arena::create_heap(8, 1, 1).unwrap();
  arena.free(std::ptr::null_mut());
  assert!(arena.alloc().is_some());
  arena.destroy_heap();
}

#[test]
fn reset_affinity_does_not_affect_exhaustion_accounting() {
  let arena = Arena::create_heap(8, 2, 2).unwrap();
  let a = arena.alloc().unwrap();
  arena.reset_affinity();
  let b = arena.alloc().unwrap();
  assert_ne!(a.as_ptr(), b.as_ptr());
  assert!(arena.alloc().is_none());
  arena.destroy_heap();
}
