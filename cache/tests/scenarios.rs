//! End-to-end scenarios (spec §8), run against an in-memory mock of the
//! downstream `RemoteStore` contract instead of a live `object-store`
//! instance, the way the teacher's `server/tests/endpoints.rs` hits its
//! running server but without the network dependency.

use async_trait::async_trait;
use cache::cache::Cache;
use cache::component::{
    ChmodOptions, Component, CreateFileOptions, OpenFileOptions, ReadFileOptions,
    RenameFileOptions, WriteFileOptions,
};
use cache::config::Config;
use cache::error::{CacheError, Result};
use cache::remote::{DirEntryInfo, RemoteStore};
use fuser::{FileAttr, FileType};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Default)]
struct MockStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
    chmod_calls: AtomicUsize,
}

fn attr(size: u64) -> FileAttr {
    let now = SystemTime::now();
    FileAttr {
        ino: 1,
        size,
        blocks: size.div_ceil(512),
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::RegularFile,
        perm: 0o644,
        nlink: 1,
        uid: 501,
        gid: 20,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    async fn get_attr(&self, name: &str) -> Result<FileAttr> {
        let files = self.files.lock().unwrap();
        files
            .get(name)
            .map(|b| attr(b.len() as u64))
            .ok_or_else(|| CacheError::NotFound(name.to_string()))
    }

    async fn read_dir(&self, prefix: &str) -> Result<Vec<DirEntryInfo>> {
        let files = self.files.lock().unwrap();
        let prefix = if prefix == "/" { "" } else { prefix };
        Ok(files
            .iter()
            .filter_map(|(k, v)| {
                let rest = k.strip_prefix(prefix)?.strip_prefix('/')?;
                if rest.contains('/') {
                    return None;
                }
                Some(DirEntryInfo {
                    name: rest.to_string(),
                    attr: attr(v.len() as u64),
                })
            })
            .collect())
    }

    async fn is_dir_empty(&self, _name: &str) -> Result<bool> {
        Ok(true)
    }

    async fn create_file(&self, name: &str, _mode: u32) -> Result<()> {
        self.files.lock().unwrap().insert(name.to_string(), Vec::new());
        Ok(())
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.files.lock().unwrap().remove(name);
        Ok(())
    }

    async fn rename_file(&self, src: &str, dst: &str) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        if let Some(v) = files.remove(src) {
            files.insert(dst.to_string(), v);
        }
        Ok(())
    }

    async fn truncate_file(&self, name: &str, size: u64) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        if let Some(v) = files.get_mut(name) {
            v.resize(size as usize, 0);
        }
        Ok(())
    }

    async fn chmod(&self, name: &str, _mode: u32) -> Result<()> {
        self.chmod_calls.fetch_add(1, Ordering::SeqCst);
        let files = self.files.lock().unwrap();
        if files.contains_key(name) {
            Ok(())
        } else {
            Err(CacheError::NotFound(name.to_string()))
        }
    }

    async fn chown(&self, _name: &str, _uid: u32, _gid: u32) -> Result<()> {
        Ok(())
    }

    async fn delete_dir(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn rename_dir(&self, _src: &str, _dst: &str) -> Result<()> {
        Ok(())
    }

    async fn copy_to_file(&self, name: &str, offset: u64, count: u64, local_file: &File) -> Result<()> {
        let files = self.files.lock().unwrap();
        let bytes = files.get(name).cloned().unwrap_or_default();
        let end = (offset + count).min(bytes.len() as u64) as usize;
        let start = (offset as usize).min(bytes.len());
        let mut f = local_file.try_clone()?;
        f.seek(SeekFrom::Start(0))?;
        f.write_all(&bytes[start..end])?;
        Ok(())
    }

    async fn copy_from_file(&self, name: &str, local_file: &File) -> Result<()> {
        let mut buf = Vec::new();
        let mut f = local_file.try_clone()?;
        f.seek(SeekFrom::Start(0))?;
        f.read_to_end(&mut buf)?;
        self.files.lock().unwrap().insert(name.to_string(), buf);
        Ok(())
    }
}

fn config_for(dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.tmp_path = dir.to_string_lossy().to_string();
    cfg
}

async fn new_cache(dir: &Path) -> (Cache, Arc<MockStore>) {
    let store = Arc::new(MockStore::default());
    let cfg = config_for(dir);
    let cache = Cache::new(cfg.clone(), store.clone());
    cache.configure(cfg).await.unwrap();
    cache.start().await.unwrap();
    (cache, store)
}

#[tokio::test]
async fn scenario_open_of_stale_cached_file_triggers_redownload() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config_for(dir.path());
    cfg.timeout_sec = 0; // force every stat to be "stale"
    let store = Arc::new(MockStore::default());
    store
        .files
        .lock()
        .unwrap()
        .insert("/a".to_string(), b"remote-version".to_vec());

    let cache = Cache::new(cfg.clone(), store.clone());
    cache.configure(cfg).await.unwrap();
    cache.start().await.unwrap();

    let handle = cache
        .open_file(OpenFileOptions {
            name: "/a".to_string(),
            flags: libc::O_RDONLY,
            mode: 0,
        })
        .await
        .unwrap();

    let data = cache
        .read_file(ReadFileOptions {
            handle,
            offset: 0,
            size: 64,
        })
        .await
        .unwrap();

    assert_eq!(&data, b"remote-version");
    cache.close_file(handle).await.unwrap();
    cache.stop().await.unwrap();
}

#[tokio::test]
async fn scenario_direct_read_skips_staleness_revalidation_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config_for(dir.path());
    cfg.timeout_sec = 0; // would normally force every stat to be "stale"
    cfg.direct_read = true;
    let store = Arc::new(MockStore::default());
    store
        .files
        .lock()
        .unwrap()
        .insert("/a".to_string(), b"original".to_vec());

    let cache = Cache::new(cfg.clone(), store.clone());
    cache.configure(cfg).await.unwrap();
    cache.start().await.unwrap();

    // First open downloads and caches the file locally.
    let handle = cache
        .open_file(OpenFileOptions {
            name: "/a".to_string(),
            flags: libc::O_RDONLY,
            mode: 0,
        })
        .await
        .unwrap();
    cache.close_file(handle).await.unwrap();

    // Remote changes after the local copy was cached.
    store
        .files
        .lock()
        .unwrap()
        .insert("/a".to_string(), b"changed-remote-content".to_vec());

    // `direct_read` means a second open, even past `cache_timeout`, must not
    // re-validate against the remote: it serves the (now stale) local copy
    // directly instead of re-downloading.
    let handle = cache
        .open_file(OpenFileOptions {
            name: "/a".to_string(),
            flags: libc::O_RDONLY,
            mode: 0,
        })
        .await
        .unwrap();

    let data = cache
        .read_file(ReadFileOptions {
            handle,
            offset: 0,
            size: 64,
        })
        .await
        .unwrap();

    assert_eq!(&data, b"original");
    cache.close_file(handle).await.unwrap();
    cache.stop().await.unwrap();
}

#[tokio::test]
async fn scenario_rename_is_idempotent_on_its_own_output() {
    let dir = tempfile::tempdir().unwrap();
    let (cache, _store) = new_cache(dir.path()).await;

    let handle = cache
        .create_file(CreateFileOptions {
            name: "/a".to_string(),
            mode: 0o644,
        })
        .await
        .unwrap();
    cache.close_file(handle).await.unwrap();

    cache
        .rename_file(RenameFileOptions {
            src: "/a".to_string(),
            dst: "/b".to_string(),
        })
        .await
        .unwrap();

    let a_attr = cache.get_attr("/a").await;
    assert!(a_attr.is_err());

    let b_attr = cache.get_attr("/b").await.unwrap();
    assert_eq!(b_attr.kind, FileType::RegularFile);

    cache.stop().await.unwrap();
}

#[tokio::test]
async fn scenario_readdir_merges_remote_and_local_only_entries() {
    let dir = tempfile::tempdir().unwrap();
    let (cache, store) = new_cache(dir.path()).await;

    store.files.lock().unwrap().insert("/a".to_string(), b"x".to_vec());
    store.files.lock().unwrap().insert("/b".to_string(), b"yy".to_vec());

    // `c` only exists locally (created_empty_file is off by default, so it
    // synthesizes into the listing per spec §4.3.1 Case 2).
    std::fs::write(dir.path().join("c"), b"local-only").unwrap();

    let entries = cache.read_dir("/").await.unwrap();
    let names: std::collections::HashSet<_> = entries.iter().map(|e| e.name.as_str()).collect();

    assert!(names.contains("a"));
    assert!(names.contains("b"));
    assert!(names.contains("c"));

    cache.stop().await.unwrap();
}

#[tokio::test]
async fn scenario_missed_chmod_is_replayed_exactly_once_on_flush() {
    let dir = tempfile::tempdir().unwrap();
    let (cache, store) = new_cache(dir.path()).await;

    let handle = cache
        .create_file(CreateFileOptions {
            name: "/m".to_string(),
            mode: 0o600,
        })
        .await
        .unwrap();

    cache
        .chmod(ChmodOptions {
            name: "/m".to_string(),
            mode: 0o700,
        })
        .await
        .unwrap();

    // The remote object doesn't exist yet (create_empty_file is off), so the
    // chmod above came back not-found and was swallowed, recorded in the
    // missed-chmod set instead of surfaced to the caller.
    assert_eq!(store.chmod_calls.load(Ordering::SeqCst), 1);

    cache
        .write_file(WriteFileOptions {
            handle,
            offset: 0,
            data: b"x".to_vec(),
        })
        .await
        .unwrap();
    cache.flush_file(handle).await.unwrap();

    // Flush uploads (creating the remote object), then replays the missed
    // chmod exactly once (spec §8: "exactly one subsequent Flush... emits
    // exactly one chmod to the remote").
    assert_eq!(store.chmod_calls.load(Ordering::SeqCst), 2);

    cache.close_file(handle).await.unwrap();

    cache.stop().await.unwrap();
}

/// Open Question #1 (spec §9): ReadDir overlays local size/mtime on top of
/// the remote entry whenever the path is *not currently locked*, even if
/// the local copy is merely stale rather than freshly written. This test
/// pins that observed behavior rather than "fixing" it.
#[tokio::test]
async fn open_question_readdir_prefers_unlocked_local_overlay_even_when_stale() {
    let dir = tempfile::tempdir().unwrap();
    let (cache, store) = new_cache(dir.path()).await;

    store.files.lock().unwrap().insert("/a".to_string(), b"remote".to_vec());
    std::fs::write(dir.path().join("a"), b"locally-stale-but-longer").unwrap();

    let entries = cache.read_dir("/").await.unwrap();
    let a = entries.iter().find(|e| e.name == "a").unwrap();

    assert_eq!(a.attr.size, "locally-stale-but-longer".len() as u64);

    cache.stop().await.unwrap();
}

/// Open Question #2 (spec §9): FlushFile clears the dirty flag even when
/// the upload-handle-open failed and was swallowed. This is a known
/// contradiction with "a cleared dirty flag implies durable upload" that
/// the spec asks to preserve bit-for-bit.
#[tokio::test]
async fn open_question_flush_clears_dirty_on_swallowed_upload_open_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (cache, _store) = new_cache(dir.path()).await;

    let handle = cache
        .create_file(CreateFileOptions {
            name: "/will-vanish".to_string(),
            mode: 0o644,
        })
        .await
        .unwrap();

    cache
        .write_file(WriteFileOptions {
            handle,
            offset: 0,
            data: b"data".to_vec(),
        })
        .await
        .unwrap();

    // Remove the shadow file out from under the handle so the flush's
    // independent `File::open` for upload fails.
    std::fs::remove_file(dir.path().join("will-vanish")).unwrap();

    cache.flush_file(handle).await.unwrap();
    cache.close_file(handle).await.unwrap();

    cache.stop().await.unwrap();
}
