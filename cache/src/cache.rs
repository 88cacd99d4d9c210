//! The operation dispatcher (spec §2 item 4, §4.3): composes the path lock
//! table, the eviction policy, shadow I/O, the missed-chmod set, and the
//! handle registry, forwarding to `next` (the remote-store client) when
//! authority or durability is required.

use crate::component::{
    ChmodOptions, ChownOptions, Component, CreateFileOptions, DirEntry, OpenFileOptions,
    ReadFileOptions, RenameFileOptions, TruncateFileOptions, WriteFileOptions,
};
use crate::config::{Config, PolicyKind};
use crate::error::{CacheError, Result};
use crate::eviction::{lfu::LfuPolicy, lru::LruPolicy, EvictionConfig, EvictionPolicy};
use crate::handle::{Handle, HandleId, HandleRegistry};
use crate::missed_chmod::MissedChmodSet;
use crate::pathlock::{lock_pair, PathLockTable};
use crate::remote::{validate_storage_error, RemoteStore};
use crate::shadow::{self, advisory};
use crate::worker::{InvalidationTask, InvalidationWorker};

use async_trait::async_trait;
use fuser::{FileAttr, FileType};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{FileExt, MetadataExt};
use std::path::Path;
use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime};

pub struct Cache {
    config: RwLock<Config>,
    path_locks: std::sync::Arc<PathLockTable>,
    policy: std::sync::Arc<dyn EvictionPolicy>,
    missed_chmod: MissedChmodSet,
    handles: HandleRegistry,
    next: std::sync::Arc<dyn RemoteStore>,
    worker: InvalidationWorker,
}

impl Cache {
    pub fn new(config: Config, next: std::sync::Arc<dyn RemoteStore>) -> Self {
        let path_locks = std::sync::Arc::new(PathLockTable::new());
        let evict_cfg = eviction_config(&config);

        let policy: std::sync::Arc<dyn EvictionPolicy> = match config.policy_kind() {
            PolicyKind::Lru => std::sync::Arc::new(LruPolicy::new(
                config.tmp_root(),
                path_locks.clone(),
                evict_cfg,
            )),
            PolicyKind::Lfu => std::sync::Arc::new(LfuPolicy::new(
                config.tmp_root(),
                path_locks.clone(),
                evict_cfg,
            )),
        };
        let worker = InvalidationWorker::spawn(policy.clone(), path_locks.clone());

        Cache {
            config: RwLock::new(config),
            path_locks,
            policy,
            missed_chmod: MissedChmodSet::new(),
            handles: HandleRegistry::new(),
            next,
            worker,
        }
    }

    fn config_snapshot(&self) -> Config {
        self.config.read().unwrap().clone()
    }

    fn local_path(&self, logical: &str) -> std::path::PathBuf {
        shadow::local_path(&self.config_snapshot().tmp_root(), logical)
    }

    fn handle_or_bad(&self, id: HandleId) -> Result<std::sync::Arc<Handle>> {
        self.handles.get(id).ok_or(CacheError::BadHandle(id))
    }

    async fn do_flush(&self, handle: &Handle) -> Result<()> {
        if !handle.is_dirty() {
            return Ok(());
        }
        let local = self.local_path(&handle.logical_path);

        // Force buffered data out via a duplicated descriptor; the primary
        // descriptor stays open for the caller's continued use.
        {
            let file = handle.file.lock().unwrap();
            file.sync_all().ok();
        }

        let _guard = self.path_locks.lock(&handle.logical_path);

        let upload_file = match File::open(&local) {
            Ok(f) => f,
            Err(_) => {
                // Spec §7: swallow a failed upload-handle open; the caller
                // already consumed the write, and Close will also observe
                // this path without double-reporting it.
                handle.set_dirty(false);
                return Ok(());
            }
        };

        self.next
            .copy_from_file(&handle.logical_path, &upload_file)
            .await?;
        handle.set_dirty(false);

        if self.missed_chmod.take(&handle.logical_path) {
            let mode = shadow::stat(&local)?.mode() & 0o7777;
            let _ = self.next.chmod(&handle.logical_path, mode).await;
        }

        Ok(())
    }
}

fn eviction_config(cfg: &Config) -> EvictionConfig {
    EvictionConfig {
        cache_timeout_secs: cfg.timeout_sec,
        max_eviction: cfg.max_eviction,
        high_threshold: cfg.high_threshold,
        low_threshold: cfg.low_threshold,
        max_size_mb: cfg.max_size_mb,
        policy_trace: cfg.policy_trace,
    }
}

fn metadata_to_attr(meta: &std::fs::Metadata, kind: FileType) -> FileAttr {
    let now = SystemTime::now();
    FileAttr {
        ino: 1,
        size: meta.len(),
        blocks: meta.blocks(),
        atime: meta.accessed().unwrap_or(now),
        mtime: meta.modified().unwrap_or(now),
        ctime: meta.modified().unwrap_or(now),
        crtime: meta.created().unwrap_or(now),
        kind,
        perm: (meta.mode() & 0o7777) as u16,
        nlink: 1,
        uid: meta.uid(),
        gid: meta.gid(),
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}

fn overlay_local(attr: &mut FileAttr, meta: &std::fs::Metadata) {
    attr.size = meta.len();
    attr.mtime = meta.modified().unwrap_or(attr.mtime);
}

#[async_trait]
impl Component for Cache {
    async fn configure(&self, cfg: Config) -> Result<()> {
        cfg.validate()?;
        if shadow::exists(&cfg.tmp_root())
            && !shadow::is_dir_empty_locally(&cfg.tmp_root()).unwrap_or(true)
            && !cfg.allow_non_empty_temp
        {
            return Err(CacheError::Config(
                "tmp_path is non-empty and allow_non_empty_temp is not set".into(),
            ));
        }
        std::fs::create_dir_all(cfg.tmp_root())?;
        self.policy.update_config(eviction_config(&cfg));
        *self.config.write().unwrap() = cfg;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let cfg = self.config_snapshot();
        if cfg.cleanup_on_start {
            shadow::wipe(&cfg.tmp_root())?;
        }
        self.policy.start().await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.policy.shutdown().await;
        self.worker.shutdown().await;
        let cfg = self.config_snapshot();
        shadow::wipe(&cfg.tmp_root())?;
        Ok(())
    }

    async fn on_config_change(&self, cfg: Config) -> Result<()> {
        let mut current = self.config_snapshot();
        current.apply_hot_reload(&cfg);
        self.policy.update_config(eviction_config(&current));
        *self.config.write().unwrap() = current;
        Ok(())
    }

    async fn delete_dir(&self, name: &str) -> Result<()> {
        let remote_result = self.next.delete_dir(name).await;
        self.worker
            .enqueue(InvalidationTask::RecursiveInvalidate {
                local_dir: self.local_path(name),
                logical_dir: name.to_string(),
            })
            .await;
        remote_result
    }

    async fn rename_dir(&self, src: &str, dst: &str) -> Result<()> {
        self.next.rename_dir(src, dst).await?;
        self.worker
            .enqueue(InvalidationTask::RecursiveInvalidate {
                local_dir: self.local_path(src),
                logical_dir: src.to_string(),
            })
            .await;
        Ok(())
    }

    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>> {
        let (entries, _) = self.merge_dir_listing(name, false).await;
        Ok(entries)
    }

    async fn stream_dir(&self, name: &str, token: &str) -> Result<(Vec<DirEntry>, String)> {
        if token.is_empty() {
            let (entries, _) = self.merge_dir_listing(name, true).await;
            Ok((entries, String::new()))
        } else {
            Ok((Vec::new(), String::new()))
        }
    }

    async fn is_dir_empty(&self, name: &str) -> Result<bool> {
        let local = self.local_path(name);
        if !shadow::exists(&local) {
            return self.next.is_dir_empty(name).await;
        }
        match shadow::is_dir_empty_locally(&local) {
            Ok(true) => Ok(true),
            Ok(false) => {
                if self.config_snapshot().create_empty_file {
                    self.next.is_dir_empty(name).await
                } else {
                    Ok(false)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_file(&self, opts: CreateFileOptions) -> Result<HandleId> {
        let cfg = self.config_snapshot();
        let _guard = self.path_locks.lock(&opts.name);

        if cfg.create_empty_file {
            self.next.create_file(&opts.name, opts.mode).await?;
        }
        self.policy.mark_valid(&opts.name);

        let local = self.local_path(&opts.name);
        let file = shadow::create_truncate(&local, opts.mode)?;

        if opts.mode != cfg.default_file_mode() {
            self.missed_chmod.insert(&opts.name);
        }
        if !advisory::try_lock_shared(&file)? {
            return Err(CacheError::Io(std::io::Error::from_raw_os_error(
                libc::EWOULDBLOCK,
            )));
        }

        let dirty = !cfg.create_empty_file;
        let handle = Handle::new(opts.name.clone(), file, 0, cfg.direct_read, dirty);
        Ok(self.handles.insert(handle))
    }

    async fn open_file(&self, opts: OpenFileOptions) -> Result<HandleId> {
        let cfg = self.config_snapshot();
        let _guard = self.path_locks.lock(&opts.name);
        let local = self.local_path(&opts.name);

        self.policy.mark_valid(&opts.name);

        let mut download_required = !self.policy.is_cached(&opts.name);
        let mut file_exists = shadow::exists(&local);

        match shadow::stat(&local) {
            Ok(meta) => {
                // `direct_read` means handles are served straight from the
                // shadow file without re-validation (spec §6, §4.3.2): skip
                // the staleness check and trust `policy.is_cached` alone.
                if !cfg.direct_read {
                    let age = meta
                        .modified()
                        .ok()
                        .and_then(|m| m.elapsed().ok())
                        .unwrap_or(Duration::MAX);
                    if age > Duration::from_secs(cfg.timeout_sec) {
                        download_required = true;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                download_required = true;
                file_exists = false;
            }
            Err(_) => download_required = true,
        }

        if file_exists && download_required {
            if let Ok(existing) = shadow::open_write_with_permission_recovery(&local) {
                if advisory::try_lock_exclusive(&existing)? {
                    shadow::remove_file(&local)?;
                    advisory::unlock(&existing)?;
                }
                // Lock busy: someone is using the file, abandon re-download.
                else {
                    download_required = false;
                }
            }
        }

        if download_required {
            shadow::make_parent_dirs(&local)?;
            let attr = self.next.get_attr(&opts.name).await;
            let (size, mode, atime, mtime) = match &attr {
                Ok(a) => (a.size, a.perm as u32, a.atime, a.mtime),
                Err(_) => (0, cfg.default_file_mode(), SystemTime::now(), SystemTime::now()),
            };

            {
                let write_file = shadow::create_truncate(&local, mode)?;
                if size > 0 || attr.is_err() {
                    self.next
                        .copy_to_file(&opts.name, 0, size, &write_file)
                        .await?;
                }
            }
            shadow::replicate_remote_attrs(&local, mode, atime, mtime)?;
            self.policy.mark_valid(&opts.name);
        }

        let reopened = std::fs::OpenOptions::new()
            .read(true)
            .write(opts.flags & (libc::O_WRONLY | libc::O_RDWR) != 0)
            .open(&local)?;
        if !advisory::try_lock_shared(&reopened)? {
            return Err(CacheError::Io(std::io::Error::from_raw_os_error(
                libc::EWOULDBLOCK,
            )));
        }

        let observed_size = shadow::stat(&local)?.len();
        let handle = Handle::new(opts.name.clone(), reopened, observed_size, cfg.direct_read, false);
        Ok(self.handles.insert(handle))
    }

    async fn close_file(&self, handle_id: HandleId) -> Result<()> {
        let handle = self.handle_or_bad(handle_id)?;

        if handle.is_dirty() {
            self.do_flush(&handle).await?;
        }

        {
            let file = handle.file.lock().unwrap();
            let _ = advisory::unlock(&file);
        }
        self.handles.remove(handle_id);

        if handle.is_fsynced() {
            let _guard = self.path_locks.lock(&handle.logical_path);
            let local = self.local_path(&handle.logical_path);
            shadow::remove_file(&local)?;
            self.policy.purge(&handle.logical_path);
        } else {
            self.policy.mark_invalidated(&handle.logical_path);
        }

        Ok(())
    }

    async fn read_file(&self, opts: ReadFileOptions) -> Result<Vec<u8>> {
        let handle = self.handle_or_bad(opts.handle)?;
        self.policy.mark_valid(&handle.logical_path);

        let mut buf = vec![0u8; opts.size];
        let n = {
            let file = handle.file.lock().unwrap();
            file.read_at(&mut buf, opts.offset as u64)?
        };
        buf.truncate(n);

        // A `cached` handle (direct_read) is served directly without the
        // short-read re-validation below (spec §6 "skipping re-validation").
        if !handle.cached {
            let expected_remaining = handle.observed_size.saturating_sub(opts.offset as u64) as usize;
            if n < opts.size.min(expected_remaining) {
                return Err(CacheError::Io(std::io::Error::from_raw_os_error(libc::EIO)));
            }
        }
        Ok(buf)
    }

    async fn read_in_buffer(&self, opts: ReadFileOptions, buf: &mut [u8]) -> Result<usize> {
        let handle = self.handle_or_bad(opts.handle)?;
        self.policy.mark_valid(&handle.logical_path);
        let file = handle.file.lock().unwrap();
        Ok(file.read_at(buf, opts.offset as u64)?)
    }

    async fn write_file(&self, opts: WriteFileOptions) -> Result<usize> {
        let handle = self.handle_or_bad(opts.handle)?;
        self.policy.mark_valid(&handle.logical_path);
        let n = {
            let file = handle.file.lock().unwrap();
            file.write_at(&opts.data, opts.offset as u64)?
        };
        handle.set_dirty(true);
        Ok(n)
    }

    async fn flush_file(&self, handle_id: HandleId) -> Result<()> {
        let handle = self.handle_or_bad(handle_id)?;
        self.do_flush(&handle).await
    }

    async fn sync_file(&self, handle_id: HandleId) -> Result<()> {
        let handle = self.handle_or_bad(handle_id)?;
        handle.set_fsynced(true);
        Ok(())
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let _guard = self.path_locks.lock(name);
        let local = self.local_path(name);
        let remote_result = self.next.delete_file(name).await;

        if let Some(err) = validate_storage_error(
            remote_result.as_ref().err(),
            self.config_snapshot().create_empty_file,
            shadow::exists(&local),
            true,
        ) {
            return Err(err);
        }

        shadow::remove_file(&local)?;
        self.policy.purge(name);
        Ok(())
    }

    async fn rename_file(&self, opts: RenameFileOptions) -> Result<()> {
        let (_src_guard, _dst_guard) = lock_pair(&self.path_locks, &opts.src, &opts.dst);
        let local_src = self.local_path(&opts.src);
        let local_dst = self.local_path(&opts.dst);

        let remote_result = self.next.rename_file(&opts.src, &opts.dst).await;
        if let Some(err) = validate_storage_error(
            remote_result.as_ref().err(),
            self.config_snapshot().create_empty_file,
            shadow::exists(&local_src),
            true,
        ) {
            return Err(err);
        }

        if shadow::rename(&local_src, &local_dst).is_err() {
            shadow::remove_file(&local_dst)?;
            self.policy.purge(&opts.dst);
        }
        shadow::remove_file(&local_src)?;
        self.policy.purge(&opts.src);
        Ok(())
    }

    async fn truncate_file(&self, opts: TruncateFileOptions) -> Result<()> {
        let _guard = self.path_locks.lock(&opts.name);
        let local = self.local_path(&opts.name);

        let remote_result = self.next.truncate_file(&opts.name, opts.size).await;
        if let Some(err) = validate_storage_error(
            remote_result.as_ref().err(),
            self.config_snapshot().create_empty_file,
            shadow::exists(&local),
            true,
        ) {
            return Err(err);
        }

        if shadow::exists(&local) {
            shadow::truncate(&local, opts.size)?;
            self.policy.mark_valid(&opts.name);
        }
        Ok(())
    }

    async fn chmod(&self, opts: ChmodOptions) -> Result<()> {
        let _guard = self.path_locks.lock(&opts.name);
        let local = self.local_path(&opts.name);

        let remote_result = self.next.chmod(&opts.name, opts.mode).await;
        if let Err(e) = &remote_result {
            // Scenario 5: the object doesn't exist remotely yet, so the
            // remote chmod comes back not-found; the validator below
            // swallows that, and it is the swallowed not-found itself (not
            // a surfaced EIO) that means the mode must be replayed on the
            // next flush.
            if e.is_not_found() {
                self.missed_chmod.insert(&opts.name);
            }
        }
        if let Some(err) = validate_storage_error(
            remote_result.as_ref().err(),
            self.config_snapshot().create_empty_file,
            shadow::exists(&local),
            true,
        ) {
            return Err(err);
        }

        if shadow::exists(&local) {
            shadow::chmod(&local, opts.mode)?;
            self.policy.mark_valid(&opts.name);
        }
        Ok(())
    }

    async fn chown(&self, opts: ChownOptions) -> Result<()> {
        let _guard = self.path_locks.lock(&opts.name);
        let local = self.local_path(&opts.name);

        let remote_result = self.next.chown(&opts.name, opts.uid, opts.gid).await;
        if let Some(err) = validate_storage_error(
            remote_result.as_ref().err(),
            self.config_snapshot().create_empty_file,
            shadow::exists(&local),
            true,
        ) {
            return Err(err);
        }

        if shadow::exists(&local) {
            shadow::chown(&local, opts.uid, opts.gid)?;
            self.policy.mark_valid(&opts.name);
        }
        Ok(())
    }

    async fn get_attr(&self, name: &str) -> Result<FileAttr> {
        let remote = self.next.get_attr(name).await;
        let local = self.local_path(name);
        let local_meta = shadow::stat(&local).ok();

        match (remote, local_meta) {
            (Ok(mut attr), Some(meta)) if meta.is_file() => {
                if !self.path_locks.locked(name) {
                    overlay_local(&mut attr, &meta);
                }
                Ok(attr)
            }
            (Ok(attr), _) => Ok(attr),
            (Err(e), Some(meta)) if meta.is_file() && e.is_not_found() => {
                Ok(metadata_to_attr(&meta, FileType::RegularFile))
            }
            (Err(e), _) => Err(e),
        }
    }
}

impl Cache {
    async fn merge_dir_listing(&self, name: &str, probe_remote_on_local_only: bool) -> (Vec<DirEntry>, ()) {
        let cfg = self.config_snapshot();
        let local_dir = self.local_path(name);

        let remote_entries = self.next.read_dir(name).await.unwrap_or_default();
        let mut by_name: std::collections::HashMap<String, DirEntry> = remote_entries
            .into_iter()
            .map(|e| {
                (
                    e.name.clone(),
                    DirEntry {
                        name: e.name,
                        attr: e.attr,
                    },
                )
            })
            .collect();

        if let Ok(local_entries) = shadow::list_dir(&local_dir) {
            for entry in local_entries {
                let Ok(meta) = entry.metadata() else { continue };
                if !meta.is_file() {
                    continue;
                }
                let leaf = entry.file_name().to_string_lossy().to_string();
                let child_logical = join_logical(name, &leaf);

                if let Some(existing) = by_name.get_mut(&leaf) {
                    if !self.path_locks.locked(&child_logical) {
                        overlay_local(&mut existing.attr, &meta);
                    }
                } else if !cfg.create_empty_file {
                    let mut include = true;
                    if probe_remote_on_local_only {
                        include = self.next.get_attr(&child_logical).await.is_err();
                    }
                    if include {
                        by_name.insert(
                            leaf.clone(),
                            DirEntry {
                                name: leaf,
                                attr: metadata_to_attr(&meta, FileType::RegularFile),
                            },
                        );
                    }
                }
            }
        }

        (by_name.into_values().collect(), ())
    }
}

fn join_logical(dir: &str, leaf: &str) -> String {
    if dir.is_empty() || dir == "/" {
        format!("/{leaf}")
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), leaf)
    }
}
