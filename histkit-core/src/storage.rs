//! Storage backend abstraction
//!
//! The workflow never touches bytes on disk directly. Everything it persists
//! (working files, and through the filesystem bridge the engine's control
//! directory) goes through a [`FilesApi`] implementation: a chunked, streaming
//! API over a slash-separated virtual namespace.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Kind of a storage entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

/// Metadata describing a storage entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Last path segment
    pub name: String,
    /// Absolute, normalized path
    pub path: String,
    pub kind: FileKind,
    /// Content length in bytes (0 for directories)
    pub size: u64,
    /// Last modification time (Unix milliseconds)
    pub last_modified: i64,
    /// MIME type guessed from the file extension
    pub content_type: Option<String>,
}

impl FileInfo {
    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

/// Options for [`FilesApi::list`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Also yield entries of nested directories
    pub recursive: bool,
}

/// Stream of byte chunks
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// Stream of directory entries
pub type InfoStream = BoxStream<'static, Result<FileInfo>>;

/// Streaming file storage interface
///
/// Streams returned by `list` and `read` are lazy and own their state so
/// callers can hold them across await points without borrowing the backend.
#[async_trait]
pub trait FilesApi: Send + Sync {
    /// List entries of a directory. Listing a missing directory yields nothing.
    fn list(&self, path: &str, options: ListOptions) -> InfoStream;

    /// Read file content as a sequence of chunks
    fn read(&self, path: &str) -> ChunkStream;

    /// Replace file content, creating parent directories implicitly
    async fn write(&self, path: &str, content: ChunkStream) -> Result<()>;

    /// Remove a file or a whole directory tree. Returns `false` if absent.
    async fn remove(&self, path: &str) -> Result<bool>;

    /// Entry metadata, `None` when the path does not exist
    async fn stats(&self, path: &str) -> Result<Option<FileInfo>>;
}

/// Guess a MIME type from a file name
pub fn guess_content_type(name: &str) -> Option<String> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "md" | "markdown" => "text/markdown",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        _ => return None,
    };
    Some(mime.to_string())
}
