//! Per-path mutual exclusion (spec §4.1).
//!
//! Entries are created on first use and removed once their waiter count
//! drops to zero, the way the spec describes, but the public shape is an
//! RAII guard rather than a literal `lock`/`unlock` pair: a guard that
//! outlives the scope it was acquired in is exactly the bug this table
//! exists to prevent, and `std::sync::MutexGuard` can't be stored across
//! unrelated call boundaries anyway. Dropping the guard releases in the
//! same place a matching `unlock()` call would have.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

struct Entry {
    held: Mutex<bool>,
    cvar: Condvar,
    waiters: AtomicUsize,
}

impl Entry {
    fn new() -> Self {
        Entry {
            held: Mutex::new(false),
            cvar: Condvar::new(),
            waiters: AtomicUsize::new(0),
        }
    }
}

/// A reference-counted mapping from logical path to its mutex entry (I1).
#[derive(Default)]
pub struct PathLockTable {
    entries: DashMap<String, Arc<Entry>>,
}

/// Held while the owning [`PathLock`] guard is alive. Dropping it releases
/// the path and, if no other waiter is queued, removes the table entry.
pub struct PathLock<'a> {
    table: &'a PathLockTable,
    path: String,
    entry: Arc<Entry>,
}

impl PathLockTable {
    pub fn new() -> Self {
        PathLockTable {
            entries: DashMap::new(),
        }
    }

    /// Blocks until exclusive ownership of `path` is obtained.
    pub fn lock(&self, path: &str) -> PathLock<'_> {
        let entry = self
            .entries
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Entry::new()))
            .clone();
        entry.waiters.fetch_add(1, Ordering::SeqCst);

        let mut held = entry.held.lock().unwrap();
        while *held {
            held = entry.cvar.wait(held).unwrap();
        }
        *held = true;
        drop(held);

        PathLock {
            table: self,
            path: path.to_string(),
            entry,
        }
    }

    /// Non-blocking peek: true if some thread currently holds `path`'s lock.
    /// Advisory only — a `false` here can race with a concurrent `lock()`,
    /// which is exactly the allowance spec §4.1 makes for read-only callers
    /// like ReadDir/GetAttr.
    pub fn locked(&self, path: &str) -> bool {
        match self.entries.get(path) {
            Some(entry) => *entry.held.lock().unwrap(),
            None => false,
        }
    }
}

impl Drop for PathLock<'_> {
    fn drop(&mut self) {
        {
            let mut held = self.entry.held.lock().unwrap();
            *held = false;
        }
        self.entry.cvar.notify_one();

        if self.entry.waiters.fetch_sub(1, Ordering::SeqCst) == 1 {
            // We were the last waiter for this path. Another thread may have
            // raced in between the decrement above and this removal and
            // re-inserted a fresh entry already — only remove if the map
            // still points at our own entry.
            self.table
                .entries
                .remove_if(&self.path, |_, e| Arc::ptr_eq(e, &self.entry));
        }
    }
}

/// Acquires `src` then `dst` in a fixed lexicographic order, independent of
/// call-site argument order, to prevent the deadlock a rename's two-path
/// lock would otherwise risk (spec §4.3.2 RenameFile, §5).
pub fn lock_pair<'a>(
    table: &'a PathLockTable,
    a: &str,
    b: &str,
) -> (PathLock<'a>, PathLock<'a>) {
    if a <= b {
        let first = table.lock(a);
        let second = table.lock(b);
        (first, second)
    } else {
        let second = table.lock(b);
        let first = table.lock(a);
        (first, second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn single_owner_at_a_time() {
        let table = StdArc::new(PathLockTable::new());
        let t2 = table.clone();

        let order = StdArc::new(Mutex::new(Vec::new()));
        let order2 = order.clone();

        let guard = table.lock("/a");
        let handle = thread::spawn(move || {
            let _g = t2.lock("/a");
            order2.lock().unwrap().push("second");
        });

        thread::sleep(Duration::from_millis(50));
        order.lock().unwrap().push("first");
        drop(guard);
        handle.join().unwrap();

        let seen = order.lock().unwrap();
        assert_eq!(*seen, vec!["first", "second"]);
    }

    #[test]
    fn unrelated_paths_do_not_block_each_other() {
        let table = PathLockTable::new();
        let _a = table.lock("/a");
        // Must not deadlock: distinct paths are independent.
        let _b = table.lock("/b");
    }

    #[test]
    fn entry_is_removed_once_unheld() {
        let table = PathLockTable::new();
        {
            let _g = table.lock("/a");
            assert!(table.locked("/a"));
        }
        assert!(!table.locked("/a"));
        assert_eq!(table.entries.len(), 0);
    }

    #[test]
    fn locked_is_false_for_unknown_path() {
        let table = PathLockTable::new();
        assert!(!table.locked("/never-touched"));
    }

    #[test]
    fn lock_pair_orders_by_lexicographic_path_regardless_of_call_order() {
        let table = StdArc::new(PathLockTable::new());
        let t2 = table.clone();

        let (first, second) = lock_pair(&table, "/z", "/a");
        drop(first);
        drop(second);

        // Opposite call order must still serialize against a concurrent
        // lock_pair on the same two paths without deadlocking.
        let handle = thread::spawn(move || {
            let (_f, _s) = lock_pair(&t2, "/a", "/z");
        });
        handle.join().unwrap();
    }
}
