//! Eviction policy (spec §2 item 2, §4.2).
//!
//! LRU and LFU are two small, cheap-to-clone ordering keys plugged into one
//! shared [`engine::EvictionEngine`] — composition, not inheritance over a
//! shared base, per the spec's own design note (§9 "Polymorphism over
//! eviction policies").

pub mod engine;
pub mod lfu;
pub mod lru;

use crate::error::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy)]
pub struct EvictionConfig {
    pub cache_timeout_secs: u64,
    pub max_eviction: usize,
    pub high_threshold: f64,
    pub low_threshold: f64,
    /// Soft cap on total shadow-tree size in megabytes (spec §2, §6
    /// `max-size-mb`). `0` means unset — capacity is driven by
    /// `high_threshold`/`low_threshold` disk-usage percentages alone.
    pub max_size_mb: u64,
    pub policy_trace: bool,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        EvictionConfig {
            cache_timeout_secs: 120,
            max_eviction: 5000,
            high_threshold: 80.0,
            low_threshold: 60.0,
            max_size_mb: 0,
            policy_trace: false,
        }
    }
}

/// The capability interface spec §4.2 describes. `mark_valid`/`is_cached`
/// are on the hot path and stay synchronous; `start`/`shutdown` own the
/// background tokio task and are naturally async.
#[async_trait]
pub trait EvictionPolicy: Send + Sync {
    async fn start(&self);
    async fn shutdown(&self);
    fn mark_valid(&self, local_path: &str);
    fn mark_invalidated(&self, local_path: &str);
    fn purge(&self, local_path: &str);
    fn is_cached(&self, local_path: &str) -> bool;
    fn update_config(&self, cfg: EvictionConfig);
}

/// Deletes a shadow file as part of eviction, skipping if its advisory lock
/// can't be obtained exclusively and non-blocking (I2). Implemented in
/// `engine.rs`; declared here so `lru`/`lfu` can refer to it without a
/// cyclic module dependency.
pub(crate) fn try_evict_file(local: &std::path::Path) -> Result<bool> {
    use crate::shadow::advisory;
    use std::fs::OpenOptions;

    let file = match OpenOptions::new().read(true).open(local) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    };
    if !advisory::try_lock_exclusive(&file)? {
        return Ok(false);
    }
    crate::shadow::remove_file(local)?;
    advisory::unlock(&file)?;
    Ok(true)
}
