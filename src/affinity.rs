//! Per-caller partition affinity.
//!
//! A single caller-local slot caches the partition preferred by that caller,
//! set lazily on first use and sticky thereafter. The original C
//! implementation (`examples/original_source/uslab.c`) backs this with one
//! process-wide `__thread struct uslab_pt *uslab_pt`, which silently
//! misbehaves if a single thread ever touches two arenas (the second arena
//! inherits the first's cached partition pointer). This crate keys the
//! thread-local cache by the arena's identity instead, so the sticky
//! partition behavior holds per (thread, arena) rather than per thread
//! alone — see `DESIGN.md`.

use crate::partition::Partition;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;

thread_local! {
  static AFFINITY: RefCell<HashMap<usize, NonNull<Partition>>> = RefCell::new(HashMap::new());
}

/// Returns this thread's cached partition for the arena identified by
/// `arena_key`, if one has been set.
pub(crate) fn get(arena_key: usize) -> Option<NonNull<Partition>> {
  AFFINITY.with(|cache| cache.borrow().get(&arena_key).copied())
}

/// Sets this thread's cached partition for the arena identified by
/// `arena_key`. Never called by the allocator itself after the first
/// allocation; exposed so a caller can force reselection.
pub(crate) fn set(arena_key: usize, partition: NonNull<Partition>) {
  AFFINITY.with(|cache| {
    cache.borrow_mut().insert(arena_key, partition);
  });
}

/// Clears this thread's cached partition for the arena identified by
/// `arena_key`, so the next allocation re-derives one via round robin.
pub(crate) fn reset(arena_key: usize) {
  AFFINITY.with(|cache| {
    cache.borrow_mut().remove(&arena_key);
  });
}
