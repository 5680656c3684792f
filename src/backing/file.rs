//! File-backed arena: `mmap(MAP_SHARED)` over a regular file, extended to
//! exact size if it did not already exist.
//!
//! Mirrors `uslab_create_ramdisk` in `examples/original_source/uslab.c`:
//! create-and-extend only happens for a brand-new file; an existing file is
//! opened and mapped as-is, preserving whatever arena state is already on
//! disk. The extend step seeks to the last byte and writes a single zero
//! byte rather than calling `ftruncate`/`set_len`, matching the original's
//! portable sparse-grow technique.

use crate::error::{Error, Result};
use std::fs::OpenOptions;
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::io::{IntoRawFd, RawFd};
use std::path::Path;
use std::ptr::{self, NonNull};

/// Opens (creating if necessary) and maps `path` to exactly `total_len`
/// bytes at `base` if given. Returns the mapped region and whether the
/// file was freshly created by this call (as opposed to a reopen of an
/// existing one).
pub(crate) fn map(path: &Path, base: Option<NonNull<u8>>, total_len: usize) -> Result<(NonNull<u8>, bool)> {
  let existed = path.exists();

  let file = if existed {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let actual_len = file.metadata()?.len();
    if actual_len != total_len as u64 {
      return Err(Error::ArenaMismatch(
        "existing arena file size does not match the computed extent for these parameters",
      ));
    }
    file
  } else {
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .open(path)?;
    extend_sparse(&file, total_len)?;
    file
  };

  let mut flags = libc::MAP_SHARED;
  if base.is_some() {
    flags |= libc::MAP_FIXED;
  }
  let addr_hint = base.map_or(ptr::null_mut(), |b| b.as_ptr() as *mut libc::c_void);

  let fd = file.into_raw_fd();
  let mapped = unsafe {
    libc::mmap(
      addr_hint,
      total_len,
      libc::PROT_READ | libc::PROT_WRITE,
      flags,
      fd,
      0,
    )
  };
  let map_error = if mapped == libc::MAP_FAILED {
    Some(io::Error::last_os_error())
  } else {
    None
  };
  close_retrying_eintr(fd);

  if let Some(e) = map_error {
    return Err(Error::SystemCall(e));
  }

  // SAFETY: mapped is not MAP_FAILED at this point and mmap never returns
  // a null pointer on success.
  Ok((unsafe { NonNull::new_unchecked(mapped as *mut u8) }, !existed))
}

fn extend_sparse(file: &std::fs::File, total_len: usize) -> Result<()> {
  let mut file = file.try_clone()?;
  file.seek(SeekFrom::Start((total_len - 1) as u64))?;
  // write_all retries on ErrorKind::Interrupted internally, giving us the
  // portable EINTR-retry the original C implementation does by hand.
  file.write_all(&[0u8])?;
  Ok(())
}

fn close_retrying_eintr(fd: RawFd) {
  loop {
    let result = unsafe { libc::close(fd) };
    if result == 0 {
      break;
    }
    if io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
      break;
    }
  }
}
