//! The timer-driven scan + disk-usage watcher shared by LRU and LFU
//! (spec §4.2). The two policies differ only in how they compute an
//! [`OrderKey`] on access; this engine owns the ticking task, the
//! timeout scan, and the high/low watermark sweep.

use super::{try_evict_file, EvictionConfig};
use crate::pathlock::PathLockTable;
use dashmap::{DashMap, DashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// A key an entry is ordered by for eviction purposes. Must also expose the
/// instant of last access so the timeout scan (which is policy-agnostic) can
/// use it without depending on the ordering semantics.
pub trait OrderKey: Ord + Copy + Send + Sync + 'static {
    fn touch(previous: Option<Self>) -> Self;
    fn last_access(&self) -> Instant;
}

impl OrderKey for Instant {
    fn touch(_previous: Option<Self>) -> Self {
        Instant::now()
    }
    fn last_access(&self) -> Instant {
        *self
    }
}

pub struct EvictionEngine<K: OrderKey> {
    temp_root: PathBuf,
    entries: DashMap<String, K>,
    invalidated: DashSet<String>,
    path_locks: Arc<PathLockTable>,
    config: Mutex<EvictionConfig>,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<K: OrderKey> EvictionEngine<K> {
    pub fn new(temp_root: PathBuf, path_locks: Arc<PathLockTable>, config: EvictionConfig) -> Self {
        EvictionEngine {
            temp_root,
            entries: DashMap::new(),
            invalidated: DashSet::new(),
            path_locks,
            config: Mutex::new(config),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn mark_valid(&self, local_path: &str) {
        let previous = self.entries.get(local_path).map(|e| *e);
        self.entries.insert(local_path.to_string(), K::touch(previous));
        self.invalidated.remove(local_path);
    }

    pub fn mark_invalidated(&self, local_path: &str) {
        self.invalidated.insert(local_path.to_string());
    }

    pub fn purge(&self, local_path: &str) {
        self.entries.remove(local_path);
        self.invalidated.remove(local_path);
    }

    pub fn is_cached(&self, local_path: &str) -> bool {
        self.entries.contains_key(local_path)
    }

    pub fn update_config(&self, cfg: EvictionConfig) {
        *self.config.lock().unwrap() = cfg;
    }

    fn config_snapshot(&self) -> EvictionConfig {
        *self.config.lock().unwrap()
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                if !engine.running.load(Ordering::SeqCst) {
                    break;
                }
                engine.tick();
            }
        });
        *self.task.lock().unwrap() = Some(handle);
    }

    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// One pass: purge entries explicitly marked invalidated, reap entries
    /// past `cache_timeout`, then sweep oldest-first if disk usage is above
    /// the high watermark.
    fn tick(&self) {
        let cfg = self.config_snapshot();

        let invalidated: Vec<String> = self.invalidated.iter().map(|e| e.key().clone()).collect();
        for path in invalidated {
            self.evict_one(&path, &cfg);
        }

        let timeout = Duration::from_secs(cfg.cache_timeout_secs);
        let now = Instant::now();
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|e| now.duration_since(e.value().last_access()) > timeout)
            .map(|e| e.key().clone())
            .collect();
        for path in stale {
            self.evict_one(&path, &cfg);
        }

        let usage = disk_usage_percent(&self.temp_root);
        let over_high_watermark = usage.is_some_and(|u| u > cfg.high_threshold);
        if over_high_watermark || self.over_capacity(&cfg) {
            self.sweep_to_low_watermark(&cfg);
        }
    }

    /// True when `max-size-mb` is configured and the shadow tree's total
    /// size exceeds it — the capacity eviction signal alongside the
    /// disk-usage-percentage watermarks (spec §2, §6 `max-size-mb`).
    fn over_capacity(&self, cfg: &EvictionConfig) -> bool {
        cfg.max_size_mb > 0
            && crate::shadow::directory_size_bytes(&self.temp_root) > cfg.max_size_mb * 1024 * 1024
    }

    fn under_low_watermark(&self, cfg: &EvictionConfig) -> bool {
        let usage_ok = disk_usage_percent(&self.temp_root).is_none_or(|u| u <= cfg.low_threshold);
        usage_ok && !self.over_capacity(cfg)
    }

    fn sweep_to_low_watermark(&self, cfg: &EvictionConfig) {
        let mut candidates: Vec<(String, K)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        candidates.sort_by_key(|(_, key)| *key);

        let mut processed = 0usize;
        for (path, _) in candidates {
            if processed >= cfg.max_eviction {
                break;
            }
            processed += 1;
            self.evict_one(&path, cfg);

            if self.under_low_watermark(cfg) {
                break;
            }
        }
    }

    fn evict_one(&self, local_path: &str, cfg: &EvictionConfig) {
        let full = crate::shadow::local_path(&self.temp_root, local_path);
        let _guard = self.path_locks.lock(local_path);
        match try_evict_file(&full) {
            Ok(true) => {
                self.entries.remove(local_path);
                self.invalidated.remove(local_path);
                if cfg.policy_trace {
                    tracing::debug!(path = local_path, "evicted shadow file");
                }
            }
            Ok(false) => {
                if cfg.policy_trace {
                    tracing::debug!(path = local_path, "skipped eviction, file in use");
                }
            }
            Err(e) => {
                tracing::warn!(path = local_path, error = %e, "eviction failed");
            }
        }
    }
}

fn disk_usage_percent(path: &Path) -> Option<f64> {
    use std::os::unix::ffi::OsStrExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return None;
    }
    if stat.f_blocks == 0 {
        return Some(0.0);
    }
    let used = stat.f_blocks.saturating_sub(stat.f_bfree) as f64;
    Some(used / stat.f_blocks as f64 * 100.0)
}
