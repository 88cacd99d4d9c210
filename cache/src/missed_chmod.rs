//! The missed-chmod set (spec §3, §4.3.2 Chmod/FlushFile).
//!
//! Records logical paths whose desired mode could not be applied remotely
//! because the object didn't exist yet there. Replayed on the next
//! successful flush.

use dashmap::DashSet;

#[derive(Default)]
pub struct MissedChmodSet {
    paths: DashSet<String>,
}

impl MissedChmodSet {
    pub fn new() -> Self {
        MissedChmodSet {
            paths: DashSet::new(),
        }
    }

    pub fn insert(&self, path: &str) {
        self.paths.insert(path.to_string());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Removes `path` if present, returning whether it was there. Flush uses
    /// this to decide whether to replay a chmod and to clear the sentinel
    /// atomically with that decision.
    pub fn take(&self, path: &str) -> bool {
        self.paths.remove(path).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_clears_a_path() {
        let set = MissedChmodSet::new();
        assert!(!set.contains("/m"));
        set.insert("/m");
        assert!(set.contains("/m"));
        assert!(set.take("/m"));
        assert!(!set.contains("/m"));
    }

    #[test]
    fn take_on_absent_path_is_false_and_idempotent() {
        let set = MissedChmodSet::new();
        assert!(!set.take("/never"));
        set.insert("/m");
        assert!(set.take("/m"));
        assert!(!set.take("/m"));
    }
}
