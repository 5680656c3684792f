//! Heap-backed arena: a zero-initialized block from the general allocator.

use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::io;
use std::ptr::NonNull;

/// Obtains a zeroed block of `total_len` bytes aligned to `align`
/// (the page size, so the layout is consistent with the mapped backings).
pub(crate) fn alloc(total_len: usize, align: usize) -> Result<(NonNull<u8>, Layout)> {
  let layout = Layout::from_size_align(total_len, align)
    .map_err(|_| Error::InvalidParameter("arena extent does not form a valid layout"))?;

  let ptr = unsafe { alloc::alloc_zeroed(layout) };
  let ptr = NonNull::new(ptr).ok_or_else(|| {
    Error::SystemCall(io::Error::new(io::ErrorKind::OutOfMemory, "heap allocation failed"))
  })?;

  Ok((ptr, layout))
}

/// Releases a block obtained from [`alloc`].
///
/// # Safety
/// `ptr` and `layout` must be exactly the pair returned by a prior call to
/// [`alloc`] on this arena; no outstanding reference into the region may
/// remain live afterwards.
pub(crate) unsafe fn dealloc(ptr: NonNull<u8>, layout: Layout) {
  alloc::dealloc(ptr.as_ptr(), layout);
}
