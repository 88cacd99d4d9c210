//! LRU eviction (spec §4.2 "LRU"): ordering key is simply last-access
//! instant.

use super::engine::EvictionEngine;
use super::{EvictionConfig, EvictionPolicy};
use crate::pathlock::PathLockTable;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub struct LruPolicy {
    engine: Arc<EvictionEngine<Instant>>,
}

impl LruPolicy {
    pub fn new(temp_root: PathBuf, path_locks: Arc<PathLockTable>, config: EvictionConfig) -> Self {
        LruPolicy {
            engine: Arc::new(EvictionEngine::new(temp_root, path_locks, config)),
        }
    }
}

#[async_trait]
impl EvictionPolicy for LruPolicy {
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
