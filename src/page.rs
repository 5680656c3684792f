//! Page-size helpers.
//!
//! The arena header occupies exactly one page and the partition descriptor
//! array occupies the page after it, regardless of how large the slot
//! region is. Page size is a runtime property of the host (commonly 4 KiB,
//! but not universally so), so it is queried once and cached.

use std::sync::atomic::{AtomicUsize, Ordering};

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Returns the operating system's page size, in bytes.
#[inline]
pub fn size() -> usize {
  let cached = PAGE_SIZE.load(Ordering::Relaxed);
  if cached != 0 {
    return cached;
  }

  let queried = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  let queried = if queried > 0 { queried as usize } else { 4096 };
  PAGE_SIZE.store(queried, Ordering::Relaxed);
  queried
}

/// Rounds `value` up to the next multiple of the page size.
#[inline]
pub fn ceil(value: usize) -> usize {
  let page = size();
  (value + page - 1) & !(page - 1)
}
