//! Advisory (flock) locking on shadow-file descriptors (spec §4.2, §5).
//!
//! `SH` is held non-blocking for a handle's entire lifetime; the evictor and
//! the re-download path both attempt a non-blocking `EX` and give up
//! silently on contention rather than wait. Grounded on the `fs2`-based
//! lock guard in the pack's per-path lock module, simplified here to two
//! free functions since ownership of the lifetime already belongs to the
//! [`crate::handle::Handle`] / eviction call site, not to a guard type.

use fs2::FileExt;
use std::fs::File;
use std::io;

/// Attempts a non-blocking shared lock. Per I2, callers hold this for the
/// handle's entire lifetime and release it themselves before close.
pub fn try_lock_shared(file: &File) -> io::Result<bool> {
    match file.try_lock_shared() {
        Ok(()) => Ok(true),
        Err(e) if is_contended(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Attempts a non-blocking exclusive lock, used by the evictor and by the
/// OpenFile re-download path. `Ok(false)` means the file is in use and the
/// caller must abandon its eviction/re-download attempt.
pub fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    match file.try_lock_exclusive() {
        Ok(()) => Ok(true),
        Err(e) if is_contended(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn unlock(file: &File) -> io::Result<()> {
    file.unlock()
}

fn is_contended(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    #[test]
    fn shared_locks_do_not_conflict_with_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();

        let a = OpenOptions::new().read(true).open(&path).unwrap();
        let b = OpenOptions::new().read(true).open(&path).unwrap();

        assert!(try_lock_shared(&a).unwrap());
        assert!(try_lock_shared(&b).unwrap());
    }

    #[test]
    fn exclusive_lock_is_skipped_on_contention_not_errored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();

        let holder = OpenOptions::new().read(true).open(&path).unwrap();
        assert!(try_lock_shared(&holder).unwrap());

        let evictor = OpenOptions::new().read(true).open(&path).unwrap();
        assert!(!try_lock_exclusive(&evictor).unwrap());
    }
}
