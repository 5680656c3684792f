//! The arena descriptor and the public allocator surface.
//!
//! Layout of the backing region:
//!
//! ```text
//! [0, page)            arena header + padding
//! [page, 2*page)        partition descriptor array
//! [2*page, 2*page+N)    slot region, N = size_class * nelem
//! ```

use crate::affinity;
use crate::backing;
use crate::error::{Error, Result};
use crate::partition::Partition;
use crate::{page, slot};

use log::{debug, warn};
use std::alloc::Layout;
use std::mem;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

#[repr(C)]
struct ArenaHeader {
  size_class: usize,
  nelem: u64,
  npartitions: usize,
  slab_len: usize,
  page_size: usize,
  rr_counter: AtomicUsize,
}

/// The layout math shared by all three creation paths.
struct Layout_ {
  page: usize,
  partition_size: usize,
  slab_len: usize,
  total_len: usize,
}

impl Layout_ {
  fn compute(size_class: usize, nelem: u64, npartitions: usize) -> Result<Layout_> {
    if size_class < mem::size_of::<usize>() {
      return Err(Error::InvalidParameter(
        "size_class must be at least pointer-sized",
      ));
    }
    if nelem == 0 {
      return Err(Error::InvalidParameter("nelem must be at least 1"));
    }
    if npartitions == 0 {
      return Err(Error::InvalidParameter("npartitions must be at least 1"));
    }

    let nelem_usize =
      usize::try_from(nelem).map_err(|_| Error::InvalidParameter("nelem too large for this platform"))?;
    let slab_len = size_class
      .checked_mul(nelem_usize)
      .ok_or(Error::InvalidParameter("size_class * nelem overflows"))?;

    if slab_len % npartitions != 0 {
      return Err(Error::InvalidParameter(
        "npartitions must evenly divide size_class * nelem",
      ));
    }
    let partition_size = slab_len / npartitions;
    if partition_size == 0 {
      return Err(Error::InvalidParameter(
        "size_class * nelem / npartitions must be non-zero",
      ));
    }
    if partition_size > u32::MAX as usize {
      return Err(Error::InvalidParameter(
        "a single partition may not exceed 4 GiB (generation/offset packing)",
      ));
    }

    let page = page::size();
    let descriptor_bytes = npartitions
      .checked_mul(mem::size_of::<Partition>())
      .ok_or(Error::InvalidParameter("npartitions too large"))?;
    if descriptor_bytes > page {
      return Err(Error::InvalidParameter(
        "npartitions * sizeof(partition) must fit in one page",
      ));
    }

    let total_len = 2 * page + slab_len;
    Ok(Layout_ {
      page,
      partition_size,
      slab_len,
      total_len,
    })
  }
}

/// One arena: the backing region plus its partition array, the unit of
/// `create`/`destroy`.
///
/// Safe to share across threads: `alloc`/`free` take `&self` and do all
/// mutation through the partitions' atomics.
pub struct Arena {
  region: NonNull<u8>,
  total_len: usize,
  heap_layout: Option<Layout>,
}

unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
  /// Creates an arena backed by a zeroed block from the general allocator.
  pub fn create_heap(size_class: usize, nelem: u64, npartitions: usize) -> Result<Arena> {
    let info = Layout_::compute(size_class, nelem, npartitions)?;
    let (region, layout) = backing::heap::alloc(info.total_len, info.page)?;
    unsafe { Self::init_fresh(region, size_class, nelem, npartitions, &info) };
    debug!(
      "uslab: created heap-backed arena at {:p} ({} bytes, {} partitions)",
      region.as_ptr(),
      info.total_len,
      npartitions
    );
    Ok(Arena {
      region,
      total_len: info.total_len,
      heap_layout: Some(layout),
    })
  }

  /// Creates an arena backed by a private anonymous mapping, optionally at
  /// a caller-specified fixed virtual address.
  pub fn create_anonymous(
    base: Option<NonNull<u8>>,
    size_class: usize,
    nelem: u64,
    npartitions: usize,
  ) -> Result<Arena> {
    let info = Layout_::compute(size_class, nelem, npartitions)?;
    let region = backing::anon::map(base, info.total_len)?;
    unsafe { Self::init_fresh(region, size_class, nelem, npartitions, &info) };
    debug!(
      "uslab: created anonymous-mapped arena at {:p} ({} bytes, {} partitions)",
      region.as_ptr(),
      info.total_len,
      npartitions
    );
    Ok(Arena {
      region,
      total_len: info.total_len,
      heap_layout: None,
    })
  }

  /// Creates (or reopens) a file-backed arena at `path`, optionally at a
  /// caller-specified fixed virtual address.
  ///
  /// Reopening an existing file preserves its freelist state, including
  /// the absence from the freelist of slots that were outstanding when it
  /// was last unmapped.
  pub fn create_file<P: AsRef<Path>>(
    path: P,
    base: Option<NonNull<u8>>,
    size_class: usize,
    nelem: u64,
    npartitions: usize,
  ) -> Result<Arena> {
    let info = Layout_::compute(size_class, nelem, npartitions)?;
    let (region, freshly_created) = backing::file::map(path.as_ref(), base, info.total_len)?;
    unsafe { Self::init_or_validate(region, size_class, nelem, npartitions, &info, freshly_created)? };
    debug!(
      "uslab: {} file-backed arena at {:p} ({} bytes, {} partitions)",
      if freshly_created { "created" } else { "reopened" },
      region.as_ptr(),
      info.total_len,
      npartitions
    );
    Ok(Arena {
      region,
      total_len: info.total_len,
      heap_layout: None,
    })
  }

  /// Allocates one `size_class`-byte, `size_class`-aligned slot. Returns
  /// `None` if every partition in the arena is exhausted.
  pub fn alloc(&self) -> Option<NonNull<u8>> {
    let header = self.header();
    let npartitions = header.npartitions;
    let size_class = header.size_class;
    let arena_key = self.key();

    let mut partition = match affinity::get(arena_key) {
      Some(p) => p,
      None => {
        let idx = header.rr_counter.fetch_add(1, Ordering::Relaxed) % npartitions;
        let p = self.partition_ptr(idx);
        affinity::set(arena_key, p);
        p
      }
    };

    loop {
      let part = unsafe { partition.as_ref() };

      if let Some(slot_offset) = part.try_alloc(size_class, |addr| unsafe { slot::read_next_free(addr) }) {
        let ptr = (part.base + slot_offset) as *mut u8;
        return NonNull::new(ptr);
      }

      // Exhausted: steal starting at (offset + 1) mod npartitions. The
      // caller's affinity pointer is deliberately left untouched; the next
      // top-level call tries it again first.
      let start_offset = part.offset;
      let mut probe = (start_offset + 1) % npartitions;
      let mut found = None;
      while probe != start_offset {
        let candidate = self.partition_ptr(probe);
        if !unsafe { candidate.as_ref() }.is_exhausted() {
          found = Some(candidate);
          break;
        }
        probe = (probe + 1) % npartitions;
      }

      match found {
        Some(next) => partition = next,
        None => {
          warn!(
            "uslab: arena {:#x} is out of memory across all {} partitions",
            arena_key, npartitions
          );
          return None;
        }
      }
    }
  }

  /// Returns `ptr` to the partition that originally contained it. A null
  /// pointer is a no-op. Freeing a pointer not owned by this arena, or
  /// double-freeing, is undefined.
  pub fn free(&self, ptr: *mut u8) {
    if ptr.is_null() {
      return;
    }

    let header = self.header();
    let partition_size = header.slab_len / header.npartitions;
    let slot0 = self.slot_region_base();
    let addr = ptr as usize;
    let idx = (addr - slot0) / partition_size;

    let part = unsafe { self.partition_ptr(idx).as_ref() };
    let offset = addr - part.base;
    part.free(offset, header.size_class, |slot_addr, value| unsafe {
      slot::write_next_free(slot_addr, value)
    });
  }

  /// Clears this thread's cached affinity partition for this arena, so the
  /// next allocation re-derives one via round robin.
  pub fn reset_affinity(&self) {
    affinity::reset(self.key());
  }

  /// Releases a heap-backed arena's memory. Must be paired with
  /// [`Arena::create_heap`]; using it on a mapped arena is undefined.
  pub fn destroy_heap(self) {
    let layout = self
      .heap_layout
      .expect("uslab: destroy_heap called on an arena that was not heap-backed");
    unsafe { backing::heap::dealloc(self.region, layout) };
  }

  /// Unmaps a mapped (anonymous or file-backed) arena's backing region,
  /// including the header pages. Must be paired with
  /// [`Arena::create_anonymous`] or [`Arena::create_file`]; using it on a
  /// heap-backed arena is undefined.
  pub fn destroy_map(self) {
    unsafe { backing::anon::unmap(self.region, self.total_len) };
  }

  /// The fixed byte count of each slot in this arena.
  pub fn size_class(&self) -> usize {
    self.header().size_class
  }

  /// The total number of slots in this arena.
  pub fn nelem(&self) -> u64 {
    self.header().nelem
  }

  /// The number of partitions this arena's slot region is split into.
  pub fn npartitions(&self) -> usize {
    self.header().npartitions
  }

  /// Observational: the number of currently-allocated bytes in `partition`.
  pub fn used(&self, partition: usize) -> isize {
    unsafe { self.partition_ptr(partition).as_ref() }.used()
  }

  fn header(&self) -> &ArenaHeader {
    unsafe { &*(self.region.as_ptr() as *const ArenaHeader) }
  }

  fn key(&self) -> usize {
    self.region.as_ptr() as usize
  }

  fn partition_ptr(&self, idx: usize) -> NonNull<Partition> {
    let page = self.header().page_size;
    let base = unsafe { self.region.as_ptr().add(page) } as *mut Partition;
    unsafe { NonNull::new_unchecked(base.add(idx)) }
  }

  fn slot_region_base(&self) -> usize {
    self.region.as_ptr() as usize + 2 * self.header().page_size
  }

  /// Initializes a freshly-zeroed backing (heap, anonymous map, or a
  /// newly-extended file) as a brand-new arena.
  ///
  /// Only the header and the partitions' immutable layout fields
  /// (`base`/`size`/`offset`) need an explicit write: each partition's
  /// packed `(generation, offset)` head is already `0`, which is exactly
  /// the correct empty state (offset 0 is `base`), so there is nothing to
  /// write there.
  unsafe fn init_fresh(
    region: NonNull<u8>,
    size_class: usize,
    nelem: u64,
    npartitions: usize,
    info: &Layout_,
  ) {
    let header = region.as_ptr() as *mut ArenaHeader;
    header.write(ArenaHeader {
      size_class,
      nelem,
      npartitions,
      slab_len: info.slab_len,
      page_size: info.page,
      rr_counter: AtomicUsize::new(0),
    });

    Self::lay_out_partitions(region, npartitions, info);
  }

  /// Validates a reopened file's header against the caller-supplied
  /// parameters, then (re)computes every partition's layout fields to
  /// match the current mapping — without touching `head`/`used`, which
  /// must survive untouched from the previous session.
  unsafe fn init_or_validate(
    region: NonNull<u8>,
    size_class: usize,
    nelem: u64,
    npartitions: usize,
    info: &Layout_,
    freshly_created: bool,
  ) -> Result<()> {
    if freshly_created {
      Self::init_fresh(region, size_class, nelem, npartitions, info);
      return Ok(());
    }

    let header = &*(region.as_ptr() as *const ArenaHeader);
    if header.size_class != size_class
      || header.nelem != nelem
      || header.npartitions != npartitions
      || header.slab_len != info.slab_len
    {
      return Err(Error::ArenaMismatch(
        "stored arena header disagrees with the supplied parameters",
      ));
    }

    Self::lay_out_partitions(region, npartitions, info);
    Ok(())
  }

  unsafe fn lay_out_partitions(region: NonNull<u8>, npartitions: usize, info: &Layout_) {
    let slot0 = region.as_ptr().add(2 * info.page) as usize;
    let partitions_base = region.as_ptr().add(info.page) as *mut Partition;

    for i in 0..npartitions {
      let p = partitions_base.add(i);
      let base = slot0 + i * info.partition_size;
      (*p).init_layout(base, info.partition_size, i);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_size_class_smaller_than_a_pointer() {
    let err = Layout_::compute(1, 4, 1).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
  }

  #[test]
  fn rejects_zero_nelem_or_npartitions() {
    assert!(Layout_::compute(8, 0, 1).is_err());
    assert!(Layout_::compute(8, 4, 0).is_err());
  }

  #[test]
  fn rejects_npartitions_not_dividing_evenly() {
    let err = Layout_::compute(8, 3, 2).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
  }

  #[test]
  fn accepts_evenly_dividing_layout() {
    let info = Layout_::compute(8, 4, 2).unwrap();
    assert_eq!(info.slab_len, 32);
    assert_eq!(info.partition_size, 16);
    assert_eq!(info.total_len, 2 * info.page + 32);
  }

  #[test]
  fn heap_roundtrip_allocates_distinct_zeroed_slots() {
    let arena = Arena::create_heap(8, 4, 2).unwrap();
    let a = arena.alloc().unwrap();
    let b = arena.alloc().unwrap();
    assert_ne!(a.as_ptr(), b.as_ptr());

    let bytes = unsafe { std::slice::from_raw_parts(a.as_ptr(), 8) };
    assert!(bytes.iter().all(|&byte| byte == 0));

    arena.free(a.as_ptr());
    arena.free(b.as_ptr());
    arena.destroy_heap();
  }

  #[test]
  fn free_then_alloc_reuses_the_slot_lifo() {
    let arena = Arena::create_heap(8, 4, 1).unwrap();
    let a = arena.alloc().unwrap();
    let _b = arena.alloc().unwrap();
    arena.free(a.as_ptr());
    let c = arena.alloc().unwrap();
    assert_eq!(a.as_ptr(), c.as_ptr());
    arena.destroy_heap();
  }

  #[test]
  #[should_panic(expected = "not heap-backed")]
  fn destroy_heap_panics_on_a_mapped_arena() {
    let arena = Arena::create_anonymous(None, 8, 4, 1).unwrap();
    arena.destroy_heap();
  }
}
