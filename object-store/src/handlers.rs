//! HTTP handlers for the object-store backend, grounded on the teacher's
//! `server/src/handlers.rs`. `list_dir` reads the real directory (the
//! teacher's version returned a hardcoded stub); the rest follow the same
//! one-handler-per-operation shape, with `rename`/`chmod`/`chown` added so
//! `remote-store` has something real to call for the cache operations the
//! teacher's server never needed.

use axum::{body::Body, extract::Path, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path as StdPath, PathBuf};
use std::time::UNIX_EPOCH;

const DATA_ROOT: &str = "data";

fn data_path(rel: &str) -> PathBuf {
    StdPath::new(DATA_ROOT).join(rel.trim_start_matches('/'))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: String,
    pub size: u64,
    pub mtime: i64,
    pub perm: String,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub dst: String,
}

#[derive(Deserialize)]
pub struct ChmodRequest {
    pub mode: String,
}

#[derive(Deserialize)]
pub struct ChownRequest {
    pub uid: u32,
    pub gid: u32,
}

fn entry_for(path: &StdPath, name: &str) -> Option<RemoteEntry> {
    let meta = fs::metadata(path).ok()?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    #[cfg(unix)]
    let perm = {
        use std::os::unix::fs::PermissionsExt;
        format!("{:o}", meta.permissions().mode() & 0o777)
    };
    #[cfg(not(unix))]
    let perm = "644".to_string();

    Some(RemoteEntry {
        name: name.to_string(),
        kind: if meta.is_dir() { "directory" } else { "file" }.to_string(),
        size: meta.len(),
        mtime,
        perm,
    })
}

pub async fn get_file(Path(path): Path<String>) -> Result<Vec<u8>, StatusCode> {
    fs::read(data_path(&path)).map_err(|_| StatusCode::NOT_FOUND)
}

pub async fn put_file(Path(path): Path<String>, body: Body) -> StatusCode {
    let file_path = data_path(&path);
    if let Some(parent) = file_path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    }
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    match fs::write(&file_path, &bytes) {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn list_directory_contents(
    path: Option<Path<String>>,
) -> Result<Json<Vec<RemoteEntry>>, StatusCode> {
    let rel = path.map(|Path(p)| p).unwrap_or_default();
    let dir = data_path(&rel);

    let read_dir = fs::read_dir(&dir).map_err(|_| StatusCode::NOT_FOUND)?;
    let mut entries = Vec::new();
    for item in read_dir {
        let Ok(item) = item else { continue };
        let name = item.file_name().to_string_lossy().to_string();
        if let Some(entry) = entry_for(&item.path(), &name) {
            entries.push(entry);
        }
    }
    Ok(Json(entries))
}

pub async fn is_dir_empty(Path(path): Path<String>) -> Result<Json<bool>, StatusCode> {
    is_dir_empty_at(&path)
}

pub async fn is_dir_empty_root() -> Result<Json<bool>, StatusCode> {
    is_dir_empty_at("")
}

fn is_dir_empty_at(path: &str) -> Result<Json<bool>, StatusCode> {
    let dir = data_path(path);
    let mut read_dir = fs::read_dir(&dir).map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(read_dir.next().is_none()))
}

pub async fn mkdir(Path(path): Path<String>) -> StatusCode {
    match fs::create_dir_all(data_path(&path)) {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn delete_file(Path(path): Path<String>) -> StatusCode {
    let file_path = data_path(&path);
    match fs::metadata(&file_path) {
        Ok(meta) if meta.is_dir() => match fs::remove_dir_all(&file_path) {
            Ok(_) => StatusCode::OK,
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        Ok(_) => match fs::remove_file(&file_path) {
            Ok(_) => StatusCode::OK,
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        Err(_) => StatusCode::NOT_FOUND,
    }
}

pub async fn rename(Path(path): Path<String>, Json(req): Json<RenameRequest>) -> StatusCode {
    let from = data_path(&path);
    let to = data_path(&req.dst);
    if let Some(parent) = to.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match fs::rename(&from, &to) {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn truncate_file(
    Path(path): Path<String>,
    Json(req): Json<serde_json::Value>,
) -> StatusCode {
    let Some(size) = req.get("size").and_then(|v| v.as_u64()) else {
        return StatusCode::BAD_REQUEST;
    };
    let file_path = data_path(&path);
    let file = match fs::OpenOptions::new().write(true).open(&file_path) {
        Ok(f) => f,
        Err(_) => return StatusCode::NOT_FOUND,
    };
    match file.set_len(size) {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn chmod(Path(path): Path<String>, Json(req): Json<ChmodRequest>) -> StatusCode {
    let Ok(mode) = u32::from_str_radix(&req.mode, 8) else {
        return StatusCode::BAD_REQUEST;
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match fs::set_permissions(data_path(&path), fs::Permissions::from_mode(mode)) {
            Ok(_) => StatusCode::OK,
            Err(_) => StatusCode::NOT_FOUND,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = mode;
        StatusCode::OK
    }
}

pub async fn chown(Path(path): Path<String>, Json(_req): Json<ChownRequest>) -> StatusCode {
    // The object store is a single-tenant local directory; ownership has no
    // meaning here beyond acknowledging the call so the cache's Chown
    // operation has something to forward to.
    match fs::metadata(data_path(&path)) {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::NOT_FOUND,
    }
}
