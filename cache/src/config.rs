//! Configuration recognized by the cache component (spec §6).
//!
//! Mirrors the teacher's `client/src/config.rs` shape (a plain `Deserialize`
//! struct with a `Default` impl and a best-effort TOML loader) but carries
//! the full key set the cache actually reads, using kebab-case wire names
//! the way the rest of the gateway's config file is written.

use crate::error::{CacheError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Lru,
    Lfu,
}

impl PolicyKind {
    /// Unknown policy names fall back to LRU (spec §4.4).
    fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "lfu" => PolicyKind::Lfu,
            _ => PolicyKind::Lru,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Required temp-root directory. Empty until the caller fills it in;
    /// `Cache::configure` rejects an empty value.
    #[serde(rename = "path")]
    pub tmp_path: String,

    #[serde(rename = "policy")]
    pub policy: String,

    #[serde(rename = "timeout-sec")]
    pub timeout_sec: u64,

    #[serde(rename = "max-eviction")]
    pub max_eviction: usize,

    #[serde(rename = "max-size-mb")]
    pub max_size_mb: u64,

    #[serde(rename = "high-threshold")]
    pub high_threshold: f64,

    #[serde(rename = "low-threshold")]
    pub low_threshold: f64,

    #[serde(rename = "create-empty-file")]
    pub create_empty_file: bool,

    #[serde(rename = "allow-non-empty-temp")]
    pub allow_non_empty_temp: bool,

    #[serde(rename = "cleanup-on-start")]
    pub cleanup_on_start: bool,

    #[serde(rename = "policy-trace")]
    pub policy_trace: bool,

    #[serde(rename = "direct-read")]
    pub direct_read: bool,

    /// Implicit: supplied by the pipeline framework, not the user config file.
    #[serde(rename = "mount-path")]
    pub mount_path: String,

    /// Implicit: affects default permission bits (`Configure`, spec §4.4).
    #[serde(rename = "allow-other")]
    pub allow_other: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tmp_path: String::new(),
            policy: "lru".to_string(),
            timeout_sec: 120,
            max_eviction: 5000,
            max_size_mb: 0,
            high_threshold: 80.0,
            low_threshold: 60.0,
            create_empty_file: false,
            allow_non_empty_temp: false,
            cleanup_on_start: false,
            policy_trace: false,
            direct_read: false,
            mount_path: String::new(),
            allow_other: false,
        }
    }
}

impl Config {
    pub fn policy_kind(&self) -> PolicyKind {
        PolicyKind::from_name(&self.policy)
    }

    pub fn tmp_root(&self) -> PathBuf {
        PathBuf::from(&self.tmp_path)
    }

    /// Default permission bits for newly-downloaded files, per spec §4.4:
    /// "Decide default permission bits from the `allow_other` flag."
    pub fn default_file_mode(&self) -> u32 {
        if self.allow_other { 0o666 } else { 0o644 }
    }

    /// Validates the subset of spec §4.4's `Configure` rules that don't
    /// require touching the filesystem (that part is `Cache::configure`'s
    /// job, since it also needs to create the directory).
    pub fn validate(&self) -> Result<()> {
        if self.tmp_path.is_empty() {
            return Err(CacheError::Config("tmp_path must not be empty".into()));
        }
        if Path::new(&self.tmp_path) == Path::new(&self.mount_path) && !self.mount_path.is_empty()
        {
            return Err(CacheError::Config(
                "tmp_path must not equal mount_path".into(),
            ));
        }
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Config {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(?path, error = %e, "failed to read config file, using defaults");
                return Config::default();
            }
        };
        match toml::from_str(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(?path, error = %e, "failed to parse config file, using defaults");
                Config::default()
            }
        }
    }

    /// Only these fields are hot-reloadable (spec §4.4 `OnConfigChange`).
    pub fn apply_hot_reload(&mut self, new: &Config) {
        self.create_empty_file = new.create_empty_file;
        self.timeout_sec = new.timeout_sec;
        self.policy_trace = new.policy_trace;
        self.direct_read = new.direct_read;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_policy_name_falls_back_to_lru() {
        let mut cfg = Config::default();
        cfg.policy = "arc".to_string();
        assert_eq!(cfg.policy_kind(), PolicyKind::Lru);
    }

    #[test]
    fn empty_tmp_path_is_rejected() {
        let cfg = Config::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tmp_path_equal_to_mount_path_is_rejected() {
        let mut cfg = Config::default();
        cfg.tmp_path = "/mnt/cache".into();
        cfg.mount_path = "/mnt/cache".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn hot_reload_only_touches_allowed_fields() {
        let mut cfg = Config::default();
        cfg.tmp_path = "/tmp/cache".into();
        cfg.max_eviction = 42;

        let mut incoming = Config::default();
        incoming.tmp_path = "/should/not/apply".into();
        incoming.max_eviction = 999;
        incoming.create_empty_file = true;

        cfg.apply_hot_reload(&incoming);
        assert_eq!(cfg.tmp_path, "/tmp/cache");
        assert_eq!(cfg.max_eviction, 42);
        assert!(cfg.create_empty_file);
    }
}
