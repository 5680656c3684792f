//! The partition descriptor: the unit of contention.
//!
//! The algorithm wants a single double-word CAS pairing `first_free` (a
//! pointer) with `generation` (a machine word). Stable Rust has no portable
//! 128-bit atomic, so the pair is instead packed into one `AtomicU64`: a
//! 32-bit generation and a 32-bit byte offset relative to the partition's
//! `base`. Packing a relative offset instead of a full pointer is what makes
//! this fit in a single machine word on 64-bit hosts; it bounds a single
//! partition to `u32::MAX` bytes, which `Arena::create_*` enforces at
//! construction time (see `DESIGN.md`).
//!
//! Zero happens to be exactly the correct initial value for a brand-new
//! partition: offset 0 is `base`, generation 0 is the starting generation.
//! That means a freshly zeroed backing (heap, anonymous map, or a newly
//! extended file) is already a valid empty partition with no explicit
//! initializing write — see `Arena::init_partitions`.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicIsize, AtomicU64, Ordering};

/// Packed `(generation, offset)` pair CASed as a single `u64`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Head {
  pub generation: u32,
  /// Byte offset from the partition's `base`. `size` (one past the last
  /// valid offset) is the exhaustion sentinel.
  pub offset: u32,
}

impl Head {
  #[inline]
  fn pack(self) -> u64 {
    (u64::from(self.generation) << 32) | u64::from(self.offset)
  }

  #[inline]
  fn unpack(bits: u64) -> Head {
    Head {
      generation: (bits >> 32) as u32,
      offset: bits as u32,
    }
  }
}

#[repr(C)]
pub(crate) struct PartitionRaw {
  head: AtomicU64,
  /// Observational: `+size_class` on alloc, `-size_class` on free.
  used: AtomicIsize,
  /// Start of this partition's slot range. Immutable after creation.
  pub base: usize,
  /// Partition extent in bytes. Immutable after creation. Bounded to
  /// `u32::MAX` by the packed `Head` representation.
  pub size: usize,
  /// Index of this partition in the arena's partition array.
  pub offset: usize,
}

/// A partition descriptor, padded to an exact cache line so adjacent
/// partitions in the descriptor array do not false-share.
pub(crate) type Partition = CachePadded<PartitionRaw>;

impl PartitionRaw {
  /// Sets the immutable layout fields. Called once at arena creation, for
  /// both a fresh partition and a reopened one (the values are recomputed
  /// identically either way once the header has been validated to agree);
  /// never touches `head` or `used`.
  pub(crate) fn init_layout(&mut self, base: usize, size: usize, offset: usize) {
    debug_assert!(size <= u32::MAX as usize, "partition exceeds 4 GiB");
    self.base = base;
    self.size = size;
    self.offset = offset;
  }

  #[inline]
  fn load_head(&self) -> Head {
    Head::unpack(self.head.load(Ordering::Acquire))
  }

  /// `first_free >= base + size`: no reclaimed slots and the bump pointer
  /// has reached the end of this partition's range.
  #[inline]
  pub(crate) fn is_exhausted(&self) -> bool {
    self.load_head().offset as usize >= self.size
  }

  #[inline]
  pub(crate) fn used(&self) -> isize {
    self.used.load(Ordering::Relaxed)
  }

  /// Attempts one allocation from this partition. Returns the allocated
  /// slot's offset from `base` on success, or `None` if the partition was
  /// (or became) exhausted — the caller is then responsible for stealing
  /// from another partition.
  ///
  /// `read_next_free` dereferences a candidate slot to read its free-entry
  /// header; it is injected so this module stays free of raw-pointer
  /// arithmetic (that lives in `slot.rs`, which knows about `size_class`).
  pub(crate) fn try_alloc(
    &self,
    size_class: usize,
    read_next_free: impl Fn(usize) -> usize,
  ) -> Option<usize> {
    loop {
      // Paired snapshot: generation observed no later than first_free.
      // Re-derived fresh on every retry, which doubles as the re-check of
      // exhaustion after a failed CAS.
      let original = self.load_head();
      if original.offset as usize >= self.size {
        return None;
      }

      let candidate = self.base + original.offset as usize;
      let next_free = read_next_free(candidate);

      let new_offset = if next_free == 0 {
        // Virgin continuation: the slot right after this one is also
        // free and has never been touched.
        original.offset as u64 + size_class as u64
      } else {
        (next_free - self.base) as u64
      };

      if new_offset > u32::MAX as u64 {
        // Can only happen if size_class math overruns the partition,
        // which `is_exhausted` above should already have caught.
        return None;
      }

      let updated = Head {
        generation: original.generation.wrapping_add(1),
        offset: new_offset as u32,
      };

      match self.head.compare_exchange_weak(
        original.pack(),
        updated.pack(),
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => {
          self.used.fetch_add(size_class as isize, Ordering::Relaxed);
          return Some(original.offset as usize);
        }
        Err(_) => continue,
      }
    }
  }

  /// Pushes `offset` onto this partition's freelist. `write_next_free`
  /// stores the dereferenced old head (an absolute address, or 0 for a
  /// still-virgin head) into the freed slot's header word.
  pub(crate) fn free(&self, offset: usize, size_class: usize, write_next_free: impl Fn(usize, usize)) {
    loop {
      let bits = self.head.load(Ordering::Acquire);
      let original = Head::unpack(bits);

      // The old head's reconstructed address, even when it equals
      // `base + size` (the past-end sentinel): that is itself a valid
      // "next" value to chain to, since the next allocator to read it
      // back will see a non-zero, already-exhausted continuation rather
      // than mistaking this slot for a fresh virgin one.
      let old_target = self.base + original.offset as usize;
      write_next_free(self.base + offset, old_target);

      let updated = Head {
        generation: original.generation,
        offset: offset as u32,
      };

      if self
        .head
        .compare_exchange_weak(bits, updated.pack(), Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
      {
        self.used.fetch_sub(size_class as isize, Ordering::Relaxed);
        return;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn head_pack_roundtrip() {
    let h = Head {
      generation: 0xDEAD_BEEF,
      offset: 0x1234_5678,
    };
    assert_eq!(Head::unpack(h.pack()), h);
  }

  #[test]
  fn zero_bits_is_base_generation_zero() {
    let h = Head::unpack(0);
    assert_eq!(h.generation, 0);
    assert_eq!(h.offset, 0);
  }
}
