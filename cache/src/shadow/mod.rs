//! Local shadow I/O (spec §2 item 3, §4.3).
//!
//! Safe wrappers around the local directory/file primitives the cache
//! component builds its operations out of, plus the timestamp/mode
//! replication helper invariant I4 depends on. Every function here takes a
//! `temp_root` and a logical path and does the `temp_root/logical_path`
//! join itself, so callers never hand-assemble a shadow path twice the same
//! way.

pub mod advisory;

use crate::error::{CacheError, Result};
use filetime::{set_file_times, FileTime};
use std::ffi::CString;
use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Joins the temp root and a logical path. The logical path is always
/// forward-slash-rooted at the mount (spec §3); `strip_prefix('/')` keeps
/// `Path::join` from treating it as absolute and discarding `temp_root`.
pub fn local_path(temp_root: &Path, logical_path: &str) -> PathBuf {
    temp_root.join(logical_path.trim_start_matches('/'))
}

pub fn stat(local: &Path) -> io::Result<Metadata> {
    fs::symlink_metadata(local)
}

pub fn exists(local: &Path) -> bool {
    local.try_exists().unwrap_or(false)
}

pub fn make_parent_dirs(local: &Path) -> io::Result<()> {
    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Opens (creating if needed) for a fresh write, truncating any stale
/// content — the shape `CreateFile` and the download path in `OpenFile`
/// both need.
pub fn create_truncate(local: &Path, mode: u32) -> io::Result<File> {
    make_parent_dirs(local)?;
    OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .mode(mode)
        .open(local)
}

pub fn open_write(local: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).open(local)
}

/// `OpenFile`'s permission-recovery path: retry a failed open after
/// chmod-ing the shadow file to 0666 (spec §4.3.2, §7).
pub fn open_write_with_permission_recovery(local: &Path) -> io::Result<File> {
    match open_write(local) {
        Ok(f) => Ok(f),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            chmod(local, 0o666)?;
            open_write(local)
        }
        Err(e) => Err(e),
    }
}

pub fn truncate(local: &Path, size: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(local)?;
    file.set_len(size)
}

pub fn chmod(local: &Path, mode: u32) -> io::Result<()> {
    fs::set_permissions(local, fs::Permissions::from_mode(mode))
}

pub fn chown(local: &Path, uid: u32, gid: u32) -> io::Result<()> {
    let c_path = CString::new(local.as_os_str().as_encoded_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))?;
    let ret = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

pub fn rename(from: &Path, to: &Path) -> io::Result<()> {
    make_parent_dirs(to)?;
    fs::rename(from, to)
}

pub fn remove_file(local: &Path) -> Result<()> {
    match fs::remove_file(local) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::Io(e)),
    }
}

pub fn remove_dir(local: &Path) -> Result<()> {
    match fs::remove_dir(local) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::Io(e)),
    }
}

/// Lists the immediate children of a local directory (non-recursive), used
/// by `ReadDir`'s local-overlay pass and `IsDirEmpty`.
pub fn list_dir(local: &Path) -> io::Result<Vec<fs::DirEntry>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(local)? {
        out.push(entry?);
    }
    Ok(out)
}

pub fn is_dir_empty_locally(local: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(local)?.next().is_none())
}

/// Walks `root` bottom-up, invoking `on_file`/`on_dir` for each descendant.
/// Used for recursive local invalidation (`DeleteDir`, `RenameDir`'s src
/// cleanup) and the startup/shutdown temp-directory wipe.
pub fn walk_and<F, D>(root: &Path, mut on_file: F, mut on_dir: D) -> io::Result<()>
where
    F: FnMut(&Path),
    D: FnMut(&Path),
{
    if !exists(root) {
        return Ok(());
    }
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.path() == root {
            continue;
        }
        if entry.file_type().is_dir() {
            on_dir(entry.path());
        } else {
            on_file(entry.path());
        }
    }
    Ok(())
}

/// Deletes everything under `root` without removing `root` itself, used by
/// `cleanup_on_start` and `Stop`.
pub fn wipe(root: &Path) -> io::Result<()> {
    walk_and(
        root,
        |f| {
            let _ = fs::remove_file(f);
        },
        |d| {
            let _ = fs::remove_dir(d);
        },
    )
}

/// Total size in bytes of every regular file under `root`, used by the
/// eviction engine's `max-size-mb` capacity check.
pub fn directory_size_bytes(root: &Path) -> u64 {
    if !exists(root) {
        return 0;
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Replicates remote mode and timestamps onto a freshly-downloaded shadow
/// file (invariant I4).
pub fn replicate_remote_attrs(
    local: &Path,
    mode: u32,
    atime: SystemTime,
    mtime: SystemTime,
) -> io::Result<()> {
    chmod(local, mode)?;
    set_file_times(
        local,
        FileTime::from_system_time(atime),
        FileTime::from_system_time(mtime),
    )
}
