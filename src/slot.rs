//! The free entry header: the first machine word of any free slot.
//!
//! A slot's header word stores either the absolute address of the next free
//! slot, or zero — the "virgin" sentinel meaning "the slot immediately
//! after me has never been touched and is also free". Zero is safe as a
//! sentinel here because a real slot address is never zero (it always lies
//! within the mapped arena, which is never mapped at address 0).
//!
//! This is distinct from the partition's own packed `(generation, offset)`
//! head in `partition.rs`: that field never stores a raw pointer, so it has
//! no use for a zero sentinel of its own.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Reads the free-entry header word at `slot_addr`.
///
/// # Safety
/// `slot_addr` must point to a valid, readable `size_of::<usize>()`-aligned
/// word inside the arena's slot region.
#[inline]
pub(crate) unsafe fn read_next_free(slot_addr: usize) -> usize {
  (&*(slot_addr as *const AtomicUsize)).load(Ordering::Acquire)
}

/// Writes `value` into the free-entry header word at `slot_addr`.
///
/// # Safety
/// Same as [`read_next_free`], and the caller must own `slot_addr` (i.e. be
/// the thread that just won the CAS retiring it, or be about to publish it
/// via a free-side CAS).
#[inline]
pub(crate) unsafe fn write_next_free(slot_addr: usize, value: usize) {
  (&*(slot_addr as *const AtomicUsize)).store(value, Ordering::Release);
}
