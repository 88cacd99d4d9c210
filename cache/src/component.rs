//! Upstream contract (spec §6 "Upstream contract"). One method per spec
//! §4.3 operation, taking a plain option record instead of a FUSE kernel
//! request — translating kernel requests into these is the front-end's job
//! and out of scope here.

use crate::config::Config;
use crate::error::Result;
use crate::handle::HandleId;
use async_trait::async_trait;
use fuser::FileAttr;

pub struct CreateFileOptions {
    pub name: String,
    pub mode: u32,
}

pub struct OpenFileOptions {
    pub name: String,
    pub flags: i32,
    pub mode: u32,
}

pub struct ReadFileOptions {
    pub handle: HandleId,
    pub offset: i64,
    pub size: usize,
}

pub struct WriteFileOptions {
    pub handle: HandleId,
    pub offset: i64,
    pub data: Vec<u8>,
}

pub struct RenameFileOptions {
    pub src: String,
    pub dst: String,
}

pub struct TruncateFileOptions {
    pub name: String,
    pub size: u64,
}

pub struct ChmodOptions {
    pub name: String,
    pub mode: u32,
}

pub struct ChownOptions {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

pub struct DirEntry {
    pub name: String,
    pub attr: FileAttr,
}

/// The operation dispatcher contract every link in the pipeline implements
/// (spec §2). `Cache` implements this trait over its `next: Arc<dyn
/// RemoteStore>` delegate.
#[async_trait]
pub trait Component: Send + Sync {
    async fn configure(&self, cfg: Config) -> Result<()>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn on_config_change(&self, cfg: Config) -> Result<()>;

    async fn delete_dir(&self, name: &str) -> Result<()>;
    async fn rename_dir(&self, src: &str, dst: &str) -> Result<()>;
    async fn read_dir(&self, name: &str) -> Result<Vec<DirEntry>>;
    async fn stream_dir(&self, name: &str, token: &str) -> Result<(Vec<DirEntry>, String)>;
    async fn is_dir_empty(&self, name: &str) -> Result<bool>;

    async fn create_file(&self, opts: CreateFileOptions) -> Result<HandleId>;
    async fn open_file(&self, opts: OpenFileOptions) -> Result<HandleId>;
    async fn close_file(&self, handle: HandleId) -> Result<()>;
    async fn read_file(&self, opts: ReadFileOptions) -> Result<Vec<u8>>;
    async fn read_in_buffer(&self, opts: ReadFileOptions, buf: &mut [u8]) -> Result<usize>;
    async fn write_file(&self, opts: WriteFileOptions) -> Result<usize>;
    async fn flush_file(&self, handle: HandleId) -> Result<()>;
    async fn sync_file(&self, handle: HandleId) -> Result<()>;
    async fn delete_file(&self, name: &str) -> Result<()>;
    async fn rename_file(&self, opts: RenameFileOptions) -> Result<()>;
    async fn truncate_file(&self, opts: TruncateFileOptions) -> Result<()>;
    async fn chmod(&self, opts: ChmodOptions) -> Result<()>;
    async fn chown(&self, opts: ChownOptions) -> Result<()>;
    async fn get_attr(&self, name: &str) -> Result<FileAttr>;
}
