//! Downstream contract: the remote-store client the cache delegates to as
//! `next` (spec §6). Mirrors the same filesystem operation contract the
//! cache itself exposes upstream, plus the two bulk byte-moving operations
//! that don't exist on the upstream side.

use crate::error::Result;
use async_trait::async_trait;
use fuser::FileAttr;
use std::fs::File;

#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: String,
    pub attr: FileAttr,
}

/// The next link in the pipeline (spec §2, §6). A thin `reqwest`-backed
/// implementation lives in the sibling `remote-store` crate; tests use an
/// in-memory mock of this trait instead of standing up a server.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_attr(&self, name: &str) -> Result<FileAttr>;
    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntryInfo>>;
    async fn is_dir_empty(&self, name: &str) -> Result<bool>;

    async fn create_file(&self, name: &str, mode: u32) -> Result<()>;
    async fn delete_file(&self, name: &str) -> Result<()>;
    async fn rename_file(&self, src: &str, dst: &str) -> Result<()>;
    async fn truncate_file(&self, name: &str, size: u64) -> Result<()>;
    async fn chmod(&self, name: &str, mode: u32) -> Result<()>;
    async fn chown(&self, name: &str, uid: u32, gid: u32) -> Result<()>;

    async fn delete_dir(&self, name: &str) -> Result<()>;
    async fn rename_dir(&self, src: &str, dst: &str) -> Result<()>;

    /// Downloads `count` bytes starting at `offset` into `local_file`.
    async fn copy_to_file(
        &self,
        name: &str,
        offset: u64,
        count: u64,
        local_file: &File,
    ) -> Result<()>;

    /// Uploads `local_file`'s full contents as the object named `name`.
    async fn copy_from_file(&self, name: &str, local_file: &File) -> Result<()>;
}

/// Returns `Some(CacheError)` to propagate, or `None` to swallow, the
/// result of a `next` call per spec §4.3.3. `recoverable` is true when a
/// later flush/upload can plausibly repair the remote-side absence (e.g. a
/// missed-chmod on a not-yet-uploaded file).
pub fn validate_storage_error(
    err: Option<&crate::error::CacheError>,
    create_empty_file: bool,
    local_exists: bool,
    recoverable: bool,
) -> Option<crate::error::CacheError> {
    let err = err?;

    if !err.is_not_found() {
        return Some(clone_error(err));
    }

    if create_empty_file {
        return Some(clone_error(err));
    }

    if !local_exists {
        return Some(clone_error(err));
    }

    if recoverable {
        None
    } else {
        Some(crate::error::CacheError::Io(std::io::Error::from_raw_os_error(
            libc::EIO,
        )))
    }
}

fn clone_error(err: &crate::error::CacheError) -> crate::error::CacheError {
    // `CacheError` isn't `Clone` (its `Io` variant wraps `std::io::Error`,
    // which isn't either); re-derive an equivalent error from the errno
    // instead of threading `Clone` through the whole taxonomy for this one
    // passthrough call site.
    match err {
        crate::error::CacheError::NotFound(p) => crate::error::CacheError::NotFound(p.clone()),
        crate::error::CacheError::BadHandle(h) => crate::error::CacheError::BadHandle(*h),
        crate::error::CacheError::Permission(p) => crate::error::CacheError::Permission(p.clone()),
        crate::error::CacheError::Upstream(m) => crate::error::CacheError::Upstream(m.clone()),
        crate::error::CacheError::NotEmpty(p) => crate::error::CacheError::NotEmpty(p.clone()),
        crate::error::CacheError::Config(m) => crate::error::CacheError::Config(m.clone()),
        crate::error::CacheError::Io(e) => match e.raw_os_error() {
            Some(code) => crate::error::CacheError::Io(std::io::Error::from_raw_os_error(code)),
            None => crate::error::CacheError::Io(std::io::Error::new(e.kind(), e.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    #[test]
    fn no_error_is_nil() {
        assert!(validate_storage_error(None, false, true, true).is_none());
    }

    #[test]
    fn not_found_with_no_local_copy_propagates() {
        let err = CacheError::NotFound("/a".into());
        let result = validate_storage_error(Some(&err), false, false, true);
        assert!(result.is_some());
    }

    #[test]
    fn not_found_with_local_copy_and_recoverable_is_swallowed() {
        let err = CacheError::NotFound("/a".into());
        let result = validate_storage_error(Some(&err), false, true, true);
        assert!(result.is_none());
    }

    #[test]
    fn not_found_with_local_copy_and_not_recoverable_is_eio() {
        let err = CacheError::NotFound("/a".into());
        let result = validate_storage_error(Some(&err), false, true, false).unwrap();
        assert_eq!(result.errno(), libc::EIO);
    }

    #[test]
    fn create_empty_file_mode_always_propagates_not_found() {
        let err = CacheError::NotFound("/a".into());
        let result = validate_storage_error(Some(&err), true, true, true);
        assert!(result.is_some());
    }

    #[test]
    fn other_errors_always_propagate() {
        let err = CacheError::Upstream("boom".into());
        let result = validate_storage_error(Some(&err), false, true, true);
        assert!(result.is_some());
    }
}
