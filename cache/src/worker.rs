//! Background recursive directory invalidation (spec §4.3.1, §9).
//!
//! `DeleteDir`/`RenameDir` post a task here instead of walking the shadow
//! tree inline, so the filesystem call that triggered them can return
//! promptly. The channel is bounded and drained (not dropped) on shutdown:
//! `Stop` closes the sender and awaits the worker, so no invalidation is
//! silently lost.

use crate::eviction::EvictionPolicy;
use crate::pathlock::PathLockTable;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 1024;

pub enum InvalidationTask {
    /// Recursively purge every regular-file descendant and remove every
    /// directory descendant of `local_dir` (both `DeleteDir` and the `src`
    /// side of a successful `RenameDir` use this). `logical_dir` is carried
    /// alongside so descendants can be reported to the policy by the same
    /// logical-path key every other call site uses, not the shadow-root-
    /// relative filesystem path `walk_and` sees.
    RecursiveInvalidate {
        local_dir: PathBuf,
        logical_dir: String,
    },
}

pub struct InvalidationWorker {
    sender: tokio::sync::Mutex<Option<mpsc::Sender<InvalidationTask>>>,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl InvalidationWorker {
    pub fn spawn(policy: Arc<dyn EvictionPolicy>, path_locks: Arc<PathLockTable>) -> Self {
        let (sender, mut receiver) = mpsc::channel(CHANNEL_CAPACITY);

        let handle = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                match task {
                    InvalidationTask::RecursiveInvalidate {
                        local_dir,
                        logical_dir,
                    } => {
                        run_recursive_invalidate(&local_dir, &logical_dir, &policy, &path_locks);
                    }
                }
            }
        });

        InvalidationWorker {
            sender: tokio::sync::Mutex::new(Some(sender)),
            handle: tokio::sync::Mutex::new(Some(handle)),
        }
    }

    /// Enqueues a task. Per spec, a remote failure on the triggering
    /// operation is not a reason to skip local cleanup, so this is called
    /// unconditionally by the caller regardless of the `next` result.
    pub async fn enqueue(&self, task: InvalidationTask) {
        let sender = self.sender.lock().await.clone();
        match sender {
            Some(sender) => {
                if sender.send(task).await.is_err() {
                    tracing::warn!("invalidation worker channel closed, dropping task");
                }
            }
            None => tracing::warn!("invalidation worker already shut down, dropping task"),
        }
    }

    /// Closes the channel and waits for the worker to drain everything
    /// already queued before returning.
    pub async fn shutdown(&self) {
        self.sender.lock().await.take();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

fn run_recursive_invalidate(
    local_dir: &std::path::Path,
    logical_dir: &str,
    policy: &Arc<dyn EvictionPolicy>,
    path_locks: &Arc<PathLockTable>,
) {
    let root = local_dir.to_path_buf();
    let result = crate::shadow::walk_and(
        &root,
        |file| {
            if let Some(logical) = logical_path_of(&root, logical_dir, file) {
                // Mirror `Cache::delete_file`: remove the shadow file and
                // purge the policy's record of it under the same path lock
                // (I5), so the directory removal below finds an empty tree
                // instead of failing with ENOTEMPTY.
                let _guard = path_locks.lock(&logical);
                if let Err(e) = crate::shadow::remove_file(file) {
                    tracing::warn!(path = %logical, error = %e, "failed to remove shadow file during invalidation");
                }
                policy.purge(&logical);
            }
        },
        |dir| {
            if let Err(e) = crate::shadow::remove_dir(dir) {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to remove shadow directory during invalidation");
            }
        },
    );
    if let Err(e) = result {
        tracing::warn!(?local_dir, error = %e, "recursive invalidation walk failed");
    }
}

/// Rebuilds the logical path a walked shadow file corresponds to, so the
/// policy sees the same key `Cache`'s operation handlers use for it.
fn logical_path_of(root: &std::path::Path, logical_dir: &str, file: &std::path::Path) -> Option<String> {
    let rel = file.strip_prefix(root).ok()?;
    let rel = rel.to_string_lossy();
    let dir = logical_dir.trim_end_matches('/');
    Some(format!("{dir}/{rel}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::{lru::LruPolicy, EvictionConfig};
    use crate::pathlock::PathLockTable;
    use std::fs;

    #[tokio::test]
    async fn recursive_invalidate_removes_files_purges_policy_and_removes_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("a/b");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("f"), b"x").unwrap();

        let path_locks = Arc::new(PathLockTable::new());
        let policy: Arc<dyn EvictionPolicy> = Arc::new(LruPolicy::new(
            dir.path().to_path_buf(),
            path_locks.clone(),
            EvictionConfig::default(),
        ));
        policy.mark_valid("/a/b/f");
        assert!(policy.is_cached("/a/b/f"));

        let worker = InvalidationWorker::spawn(policy.clone(), path_locks);
        worker
            .enqueue(InvalidationTask::RecursiveInvalidate {
                local_dir: dir.path().join("a"),
                logical_dir: "/a".to_string(),
            })
            .await;

        // Give the consumer task a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(!sub.join("f").exists(), "shadow file must be removed");
        assert!(!sub.exists(), "now-empty descendant directory must be removed");
        assert!(!dir.path().join("a").exists());
        assert!(!policy.is_cached("/a/b/f"), "policy record must be purged");
    }
}
