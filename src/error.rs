use std::fmt;
use std::io;

/// The error type used throughout this crate.
///
/// Only the setup and teardown paths (`create_*`, `destroy_*`) ever produce
/// one of these; `alloc`/`free` stay on the hot path and never allocate or
/// format a string, so they report failure with a plain `Option`/`()`
/// instead.
#[derive(Debug)]
pub enum Error {
  /// A constructor argument was invalid (e.g. a zero-size partition, or a
  /// `size_class` smaller than a pointer).
  InvalidParameter(&'static str),
  /// A call into the operating system failed.
  SystemCall(io::Error),
  /// A file-backed arena was reopened with parameters that disagree with
  /// what is already recorded in the file's header.
  ArenaMismatch(&'static str),
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Error::InvalidParameter(what) => write!(f, "invalid parameter: {}", what),
      Error::SystemCall(e) => write!(f, "system call failed: {}", e),
      Error::ArenaMismatch(what) => write!(f, "arena layout mismatch: {}", what),
    }
  }
}

impl std::error::Error for Error {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Error::SystemCall(e) => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for Error {
  fn from(e: io::Error) -> Self {
    Error::SystemCall(e)
  }
}

/// A specialized [`Result`](std::result::Result) for this crate's setup and
/// teardown operations.
pub type Result<T> = std::result::Result<T, Error>;
