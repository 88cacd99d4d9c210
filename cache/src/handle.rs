//! Handle registry bridge (spec §2 item 5, §3 "Handle").
//!
//! Binds a local file descriptor and its bookkeeping flags to an opaque
//! token the front-end can hold across calls, the same role the teacher's
//! `OpenWriteFile` buffer played for in-flight writes — except here the
//! descriptor itself, not a byte buffer, is what's bound, since writes land
//! directly on the shadow file via `pwrite`.

use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

/// Opaque token handed back to the front-end in place of a raw descriptor.
pub type HandleId = u64;

pub struct Handle {
    pub logical_path: String,
    pub file: Mutex<File>,
    pub dirty: std::sync::atomic::AtomicBool,
    pub fsynced: std::sync::atomic::AtomicBool,
    pub cached: bool,
    pub observed_size: u64,
}

impl Handle {
    pub fn new(logical_path: String, file: File, observed_size: u64, cached: bool, dirty: bool) -> Self {
        Handle {
            logical_path,
            file: Mutex::new(file),
            dirty: std::sync::atomic::AtomicBool::new(dirty),
            fsynced: std::sync::atomic::AtomicBool::new(false),
            cached,
            observed_size,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn set_dirty(&self, value: bool) {
        self.dirty.store(value, Ordering::SeqCst);
    }

    pub fn is_fsynced(&self) -> bool {
        self.fsynced.load(Ordering::SeqCst)
    }

    pub fn set_fsynced(&self, value: bool) {
        self.fsynced.store(value, Ordering::SeqCst);
    }
}

/// Allocates and looks up handles by opaque id. The front-end only ever
/// sees the `HandleId`; the open descriptor lives here.
#[derive(Default)]
pub struct HandleRegistry {
    next_id: AtomicU64,
    handles: DashMap<HandleId, Arc<Handle>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        HandleRegistry {
            next_id: AtomicU64::new(1),
            handles: DashMap::new(),
        }
    }

    pub fn insert(&self, handle: Handle) -> HandleId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.handles.insert(id, Arc::new(handle));
        id
    }

    pub fn get(&self, id: HandleId) -> Option<Arc<Handle>> {
        self.handles.get(&id).map(|r| r.clone())
    }

    /// Removes and returns the handle, e.g. on `CloseFile`.
    pub fn remove(&self, id: HandleId) -> Option<Arc<Handle>> {
        self.handles.remove(&id).map(|(_, h)| h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tmp_file() -> File {
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(b"hello").unwrap();
        f
    }

    #[test]
    fn allocates_distinct_ids() {
        let registry = HandleRegistry::new();
        let a = registry.insert(Handle::new("/a".into(), tmp_file(), 5, false, false));
        let b = registry.insert(Handle::new("/b".into(), tmp_file(), 5, false, false));
        assert_ne!(a, b);
    }

    #[test]
    fn get_and_remove_round_trip() {
        let registry = HandleRegistry::new();
        let id = registry.insert(Handle::new("/a".into(), tmp_file(), 5, false, true));
        let h = registry.get(id).expect("handle present");
        assert!(h.is_dirty());
        assert_eq!(h.logical_path, "/a");

        let removed = registry.remove(id).expect("handle removed");
        assert_eq!(removed.logical_path, "/a");
        assert!(registry.get(id).is_none());
    }
}
