//! Filesystem contract consumed by version-control engines, and the bridge
//! that implements it on top of a [`FilesApi`] storage backend.
//!
//! Engines perform all of their byte I/O (working tree and control directory)
//! through [`EngineFs`]. [`StorageFs`] adapts the chunked, streaming storage
//! API to that contract: reads are merged into a single buffer, writes accept
//! text, bytes or chunk sequences, and operations the storage has no notion of
//! (symbolic links, permission bits) fail with [`FsError::Unsupported`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::storage::{ChunkStream, FileInfo, FileKind, FilesApi, StorageError};

/// Result type for filesystem contract operations
pub type Result<T> = std::result::Result<T, FsError>;

/// Placeholder permission bits reported for every entry
pub const DEFAULT_MODE: u32 = 0o644;

/// Errors raised by the filesystem contract
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("ENOENT: no such file or directory, '{0}'")]
    NotFound(String),

    #[error("EISDIR: not a regular file, '{0}'")]
    NotAFile(String),

    #[error("ENOTSUP: operation '{op}' is not supported, '{path}'")]
    Unsupported { op: &'static str, path: String },

    #[error("Read aborted: '{0}'")]
    Aborted(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl FsError {
    /// Conventional error code (`ENOENT`, `ENOTSUP`, ...)
    pub fn code(&self) -> &'static str {
        match self {
            FsError::NotFound(_) => "ENOENT",
            FsError::NotAFile(_) => "EISDIR",
            FsError::Unsupported { .. } => "ENOTSUP",
            FsError::Aborted(_) => "ABORT_ERR",
            FsError::Storage(StorageError::NotFound(_)) => "ENOENT",
            FsError::Storage(_) => "EIO",
        }
    }

    /// Whether the error signals a missing path
    pub fn is_not_found(&self) -> bool {
        self.code() == "ENOENT"
    }
}

/// Text encodings understood by [`EngineFs::read_file`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
}

/// Options for [`EngineFs::read_file`]
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Decode the content as text instead of returning raw bytes
    pub encoding: Option<Encoding>,
    /// Cooperative cancellation, checked once per chunk
    pub signal: Option<CancellationToken>,
}

impl ReadOptions {
    pub fn utf8() -> Self {
        Self {
            encoding: Some(Encoding::Utf8),
            signal: None,
        }
    }
}

/// Content returned by [`EngineFs::read_file`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Bytes(Bytes),
    Text(String),
}

impl FileContent {
    pub fn into_bytes(self) -> Bytes {
        match self {
            FileContent::Bytes(bytes) => bytes,
            FileContent::Text(text) => Bytes::from(text),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            FileContent::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            FileContent::Text(text) => text,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FileContent::Bytes(bytes) => bytes.is_empty(),
            FileContent::Text(text) => text.is_empty(),
        }
    }
}

/// A single unit of written content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Text(String),
    Bytes(Bytes),
}

impl Chunk {
    pub fn into_bytes(self) -> Bytes {
        match self {
            Chunk::Text(text) => Bytes::from(text),
            Chunk::Bytes(bytes) => bytes,
        }
    }
}

/// Content accepted by [`EngineFs::write_file`]
pub enum WriteData {
    Text(String),
    Bytes(Bytes),
    Chunks(Vec<Chunk>),
    Stream(BoxStream<'static, Chunk>),
}

impl WriteData {
    /// Normalize into the byte-chunk stream consumed by storage backends
    pub fn into_chunk_stream(self) -> ChunkStream {
        let chunks: BoxStream<'static, Chunk> = match self {
            WriteData::Text(text) => stream::iter(vec![Chunk::Text(text)]).boxed(),
            WriteData::Bytes(bytes) => stream::iter(vec![Chunk::Bytes(bytes)]).boxed(),
            WriteData::Chunks(chunks) => stream::iter(chunks).boxed(),
            WriteData::Stream(chunks) => chunks,
        };
        chunks.map(|chunk| Ok(chunk.into_bytes())).boxed()
    }
}

impl From<&str> for WriteData {
    fn from(text: &str) -> Self {
        WriteData::Text(text.to_string())
    }
}

impl From<String> for WriteData {
    fn from(text: String) -> Self {
        WriteData::Text(text)
    }
}

impl From<Vec<u8>> for WriteData {
    fn from(bytes: Vec<u8>) -> Self {
        WriteData::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for WriteData {
    fn from(bytes: Bytes) -> Self {
        WriteData::Bytes(bytes)
    }
}

/// Entry metadata in the shape engines expect from `stat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub kind: FileKind,
    pub mode: u32,
    pub size: u64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
    pub uid: u32,
    pub gid: u32,
    pub dev: u32,
    pub ino: Option<u64>,
}

impl Stat {
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_symbolic_link(&self) -> bool {
        false
    }
}

impl From<FileInfo> for Stat {
    fn from(info: FileInfo) -> Self {
        Self {
            kind: info.kind,
            mode: DEFAULT_MODE,
            size: info.size,
            mtime_ms: info.last_modified,
            ctime_ms: info.last_modified,
            uid: 1,
            gid: 1,
            dev: 1,
            ino: None,
        }
    }
}

/// Promise-style filesystem interface required by version-control engines
#[async_trait]
pub trait EngineFs: Send + Sync {
    async fn read_file(&self, path: &str, options: ReadOptions) -> Result<FileContent>;

    async fn write_file(&self, path: &str, data: WriteData) -> Result<()>;

    async fn unlink(&self, path: &str) -> Result<()>;

    async fn rmdir(&self, path: &str) -> Result<()>;

    /// Names of the immediate children of a directory
    async fn readdir(&self, path: &str) -> Result<Vec<String>>;

    async fn mkdir(&self, path: &str) -> Result<()>;

    async fn stat(&self, path: &str) -> Result<Stat>;

    async fn lstat(&self, path: &str) -> Result<Stat>;

    async fn readlink(&self, path: &str) -> Result<String>;

    async fn symlink(&self, target: &str, path: &str) -> Result<()>;

    async fn chmod(&self, path: &str, mode: u32) -> Result<()>;

    /// Whether `path` exists, recovering the not-found case locally
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// [`EngineFs`] implementation backed by a streaming storage backend
#[derive(Clone)]
pub struct StorageFs {
    files: Arc<dyn FilesApi>,
}

impl StorageFs {
    pub fn new(files: Arc<dyn FilesApi>) -> Self {
        Self { files }
    }

    /// Underlying storage backend
    pub fn files(&self) -> &Arc<dyn FilesApi> {
        &self.files
    }
}

#[async_trait]
impl EngineFs for StorageFs {
    async fn read_file(&self, path: &str, options: ReadOptions) -> Result<FileContent> {
        tracing::trace!("fs.read_file({})", path);
        let stat = self.stat(path).await?;
        if !stat.is_file() {
            return Err(FsError::NotAFile(path.to_string()));
        }

        let aborted = || options.signal.as_ref().is_some_and(|s| s.is_cancelled());
        if aborted() {
            return Err(FsError::Aborted(path.to_string()));
        }

        let mut chunks: Vec<Bytes> = Vec::new();
        let mut content = self.files.read(path);
        while let Some(chunk) = content.next().await {
            if aborted() {
                return Err(FsError::Aborted(path.to_string()));
            }
            chunks.push(chunk?);
        }

        let bytes = match chunks.len() {
            0 => Bytes::new(),
            1 => chunks.remove(0),
            _ => {
                let size = chunks.iter().map(Bytes::len).sum();
                let mut merged = BytesMut::with_capacity(size);
                for chunk in &chunks {
                    merged.extend_from_slice(chunk);
                }
                merged.freeze()
            }
        };

        match options.encoding {
            Some(Encoding::Utf8) => Ok(FileContent::Text(
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
            None => Ok(FileContent::Bytes(bytes)),
        }
    }

    async fn write_file(&self, path: &str, data: WriteData) -> Result<()> {
        tracing::trace!("fs.write_file({})", path);
        self.files.write(path, data.into_chunk_stream()).await?;
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<()> {
        tracing::trace!("fs.unlink({})", path);
        self.files.remove(path).await?;
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> Result<()> {
        tracing::trace!("fs.rmdir({})", path);
        self.files.remove(path).await?;
        Ok(())
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>> {
        tracing::trace!("fs.readdir({})", path);
        let mut names = Vec::new();
        let mut entries = self.files.list(path, Default::default());
        while let Some(entry) = entries.next().await {
            names.push(entry?.name);
        }
        Ok(names)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        // Directories are implied by the paths of the files written into them.
        tracing::trace!("fs.mkdir({})", path);
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Stat> {
        tracing::trace!("fs.stat({})", path);
        match self.files.stats(path).await? {
            Some(info) => Ok(Stat::from(info)),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    async fn lstat(&self, path: &str) -> Result<Stat> {
        self.stat(path).await
    }

    async fn readlink(&self, path: &str) -> Result<String> {
        tracing::trace!("fs.readlink({})", path);
        Err(FsError::Unsupported {
            op: "readlink",
            path: path.to_string(),
        })
    }

    async fn symlink(&self, target: &str, path: &str) -> Result<()> {
        tracing::trace!("fs.symlink({} -> {})", path, target);
        Err(FsError::Unsupported {
            op: "symlink",
            path: path.to_string(),
        })
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        tracing::trace!("fs.chmod({}, {:o})", path, mode);
        Err(FsError::Unsupported {
            op: "chmod",
            path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(FsError::NotFound("/a".into()).code(), "ENOENT");
        assert!(FsError::NotFound("/a".into()).is_not_found());
        assert!(FsError::Storage(StorageError::NotFound("/a".into())).is_not_found());
        let unsupported = FsError::Unsupported {
            op: "symlink",
            path: "/a".into(),
        };
        assert_eq!(unsupported.code(), "ENOTSUP");
        assert!(!unsupported.is_not_found());
    }

    #[test]
    fn test_stat_from_file_info() {
        let stat = Stat::from(FileInfo {
            name: "a.md".into(),
            path: "/a.md".into(),
            kind: FileKind::File,
            size: 11,
            last_modified: 1_700_000_000_000,
            content_type: None,
        });
        assert!(stat.is_file());
        assert!(!stat.is_directory());
        assert!(!stat.is_symbolic_link());
        assert_eq!(stat.mode, DEFAULT_MODE);
        assert_eq!(stat.size, 11);
        assert_eq!(stat.ctime_ms, stat.mtime_ms);
        assert_eq!((stat.uid, stat.gid), (1, 1));
        assert_eq!(stat.ino, None);
    }

    #[tokio::test]
    async fn test_write_data_normalization() {
        let data = WriteData::Chunks(vec![
            Chunk::Text("ab".into()),
            Chunk::Bytes(Bytes::from_static(b"cd")),
        ]);
        let chunks: Vec<Bytes> = data
            .into_chunk_stream()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")]);

        let single: Vec<Bytes> = WriteData::from("hello")
            .into_chunk_stream()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(single, vec![Bytes::from_static(b"hello")]);
    }
}
