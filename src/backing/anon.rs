//! Anonymous-mapped arena: a private anonymous `mmap`, optionally at a
//! caller-specified fixed virtual address.

use crate::error::{Error, Result};
use std::io;
use std::ptr::{self, NonNull};

/// Maps `total_len` zero-initialized bytes, at `base` if given.
pub(crate) fn map(base: Option<NonNull<u8>>, total_len: usize) -> Result<NonNull<u8>> {
  let mut flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE;
  if base.is_some() {
    flags |= libc::MAP_FIXED;
  }
  let addr_hint = base.map_or(ptr::null_mut(), |b| b.as_ptr() as *mut libc::c_void);

  let mapped = unsafe {
    libc::mmap(
      addr_hint,
      total_len,
      libc::PROT_READ | libc::PROT_WRITE,
      flags,
      -1,
      0,
    )
  };

  if mapped == libc::MAP_FAILED {
    return Err(Error::SystemCall(io::Error::last_os_error()));
  }

  // SAFETY: a successful mmap never returns null.
  Ok(unsafe { NonNull::new_unchecked(mapped as *mut u8) })
}

/// Unmaps a mapped region. `munmap` does not care how the mapping was
/// established, so this is also used to tear down file-backed arenas.
///
/// # Safety
/// `ptr`/`len` must exactly match a prior successful mapping, with no
/// outstanding references into it.
pub(crate) unsafe fn unmap(ptr: NonNull<u8>, len: usize) {
  libc::munmap(ptr.as_ptr() as *mut libc::c_void, len);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn map_without_base_is_zeroed() {
    let ptr = map(None, 4096).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 4096) };
    assert!(bytes.iter().all(|&b| b == 0));
    unsafe { unmap(ptr, 4096) };
  }
}
