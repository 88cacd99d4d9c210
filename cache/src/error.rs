//! The error taxonomy surfaced to whatever pipeline framework embeds this
//! crate (see spec §7). Every fallible path in `cache` returns `CacheError`;
//! the outermost caller is expected to call [`CacheError::errno`] to get the
//! POSIX code it hands back to the kernel.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Path absent in both remote and local, or a concurrent delete raced us.
    #[error("path not found: {0}")]
    NotFound(String),

    /// Short read, failed fd duplication, or a non-recoverable remote error
    /// on a write path.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Operation called with a handle whose descriptor is absent.
    #[error("bad handle: {0}")]
    BadHandle(u64),

    /// Propagated from a local `open` that failed on permissions, after the
    /// read+chmod-to-0666 recovery attempt also failed.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Any other error surfaced by the downstream remote-store link, passed
    /// through unchanged.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The directory is not empty (`IsDirEmpty` / `rmdir`-style checks).
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// Configure()-time rejection of an invalid temp root.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CacheError {
    /// The POSIX errno this error should be reported as, per spec §7.
    pub fn errno(&self) -> i32 {
        match self {
            CacheError::NotFound(_) => libc::ENOENT,
            CacheError::Io(_) => libc::EIO,
            CacheError::BadHandle(_) => libc::EBADF,
            CacheError::Permission(_) => libc::EACCES,
            CacheError::Upstream(_) => libc::EIO,
            CacheError::NotEmpty(_) => libc::ENOTEMPTY,
            CacheError::Config(_) => libc::EINVAL,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
