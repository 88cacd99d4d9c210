//! Local file cache component of a blob-storage FUSE gateway.
//!
//! Materialises remote objects as plain files under a local temp root so
//! POSIX read/write semantics run at local-disk latency while the remote
//! store stays authoritative. See [`cache::Cache`] for the operation
//! dispatcher and [`component::Component`]/[`remote::RemoteStore`] for the
//! upstream/downstream contracts it sits between.

pub mod cache;
pub mod component;
pub mod config;
pub mod error;
pub mod eviction;
pub mod handle;
pub mod missed_chmod;
pub mod pathlock;
pub mod remote;
pub mod shadow;
pub mod worker;

pub use cache::Cache;
pub use component::Component;
pub use config::Config;
pub use error::{CacheError, Result};
pub use remote::RemoteStore;
