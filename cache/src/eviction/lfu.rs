//! LFU eviction (spec §4.2 "LFU"): ordering key is access count with a
//! last-access tie-break.

use super::engine::{EvictionEngine, OrderKey};
use super::{EvictionConfig, EvictionPolicy};
use crate::pathlock::PathLockTable;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LfuKey {
    count: u64,
    last_access: Instant,
}

impl Ord for LfuKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| self.last_access.cmp(&other.last_access))
    }
}

impl PartialOrd for LfuKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl OrderKey for LfuKey {
    fn touch(previous: Option<Self>) -> Self {
        let count = previous.map(|p| p.count).unwrap_or(0) + 1;
        LfuKey {
            count,
            last_access: Instant::now(),
        }
    }

    fn last_access(&self) -> Instant {
        self.last_access
    }
}

pub struct LfuPolicy {
    engine: Arc<EvictionEngine<LfuKey>>,
}

impl LfuPolicy {
    pub fn new(temp_root: PathBuf, path_locks: Arc<PathLockTable>, config: EvictionConfig) -> Self {
        LfuPolicy {
            engine: Arc::new(EvictionEngine::new(temp_root, path_locks, config)),
        }
    }
}

#[async_trait]
impl EvictionPolicy for LfuPolicy {
    async fn start(&self) {
        self.engine.start();
    }

    async fn shutdown(&self) {
        self.engine.shutdown().await;
    }

    fn mark_valid(&self, local_path: &str) {
        self.engine.mark_valid(local_path);
    }

    fn mark_invalidated(&self, local_path: &str) {
        self.engine.mark_invalidated(local_path);
    }

    fn purge(&self, local_path: &str) {
        self.engine.purge(local_path);
    }

    fn is_cached(&self, local_path: &str) -> bool {
        self.engine.is_cached(local_path)
    }

    fn update_config(&self, cfg: EvictionConfig) {
        self.engine.update_config(cfg);
    }
}
