//! In-memory storage backend
//!
//! Files are kept in a sorted map keyed by their normalized absolute path.
//! Directories exist implicitly for every ancestor of a written file and are
//! recorded explicitly so that they survive the removal of their last file.
//! The root directory always exists.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt, TryStreamExt};
use histkit_core::path::{file_name, resolve_path};
use histkit_core::storage::{
    ChunkStream, FileInfo, FileKind, FilesApi, InfoStream, ListOptions, Result, StorageError,
    guess_content_type,
};
use tokio::sync::RwLock;

use crate::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Clone)]
struct MemFile {
    content: Bytes,
    last_modified: i64,
}

#[derive(Debug, Default)]
struct MemTree {
    files: BTreeMap<String, MemFile>,
    /// Directory path -> creation time (Unix milliseconds)
    dirs: BTreeMap<String, i64>,
}

fn normalize(path: &str) -> String {
    resolve_path(&["/", path])
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn child_prefix(dir: &str) -> String {
    if dir == "/" {
        "/".to_string()
    } else {
        format!("{}/", dir)
    }
}

impl MemTree {
    fn info(&self, path: &str) -> Option<FileInfo> {
        if let Some(file) = self.files.get(path) {
            let name = file_name(path);
            return Some(FileInfo {
                name: name.to_string(),
                path: path.to_string(),
                kind: FileKind::File,
                size: file.content.len() as u64,
                last_modified: file.last_modified,
                content_type: guess_content_type(name),
            });
        }
        let last_modified = if path == "/" {
            0
        } else {
            *self.dirs.get(path)?
        };
        Some(FileInfo {
            name: file_name(path).to_string(),
            path: path.to_string(),
            kind: FileKind::Directory,
            size: 0,
            last_modified,
            content_type: None,
        })
    }

    fn children(&self, dir: &str, recursive: bool) -> Vec<FileInfo> {
        let prefix = child_prefix(dir);
        let mut paths: Vec<&String> = self
            .dirs
            .keys()
            .chain(self.files.keys())
            .filter(|p| p.len() > prefix.len() && p.starts_with(&prefix))
            .filter(|p| recursive || !p[prefix.len()..].contains('/'))
            .collect();
        paths.sort();
        paths.into_iter().filter_map(|p| self.info(p)).collect()
    }

    fn insert(&mut self, path: String, content: Bytes) -> Result<()> {
        if path == "/" || self.dirs.contains_key(&path) {
            return Err(StorageError::Backend(format!("Is a directory: {}", path)));
        }
        let now = now_millis();
        let mut ancestor = path.as_str();
        while let Some(idx) = ancestor.rfind('/') {
            ancestor = &ancestor[..idx];
            if ancestor.is_empty() {
                break;
            }
            if self.files.contains_key(ancestor) {
                return Err(StorageError::NotADirectory(ancestor.to_string()));
            }
            self.dirs.entry(ancestor.to_string()).or_insert(now);
        }
        self.files.insert(
            path,
            MemFile {
                content,
                last_modified: now,
            },
        );
        Ok(())
    }

    fn remove(&mut self, path: &str) -> bool {
        if self.files.remove(path).is_some() {
            return true;
        }
        let is_dir = path == "/" || self.dirs.contains_key(path);
        if !is_dir {
            return false;
        }
        let prefix = child_prefix(path);
        self.files.retain(|p, _| !p.starts_with(&prefix));
        self.dirs.retain(|p, _| p != path && !p.starts_with(&prefix));
        true
    }
}

/// In-memory [`FilesApi`]
#[derive(Clone)]
pub struct MemFilesApi {
    tree: Arc<RwLock<MemTree>>,
    chunk_size: usize,
}

impl MemFilesApi {
    pub fn new() -> Self {
        Self {
            tree: Arc::new(RwLock::new(MemTree::default())),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create a backend seeded with `(path, content)` pairs
    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Result<Self>
    where
        P: AsRef<str>,
        C: Into<Bytes>,
    {
        let mut tree = MemTree::default();
        for (path, content) in files {
            tree.insert(normalize(path.as_ref()), content.into())?;
        }
        Ok(Self {
            tree: Arc::new(RwLock::new(tree)),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Split reads into chunks of at most `chunk_size` bytes
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Number of files currently stored
    pub async fn file_count(&self) -> usize {
        self.tree.read().await.files.len()
    }
}

impl Default for MemFilesApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FilesApi for MemFilesApi {
    fn list(&self, path: &str, options: ListOptions) -> InfoStream {
        let tree = self.tree.clone();
        let path = normalize(path);
        stream::once(async move {
            let tree = tree.read().await;
            Ok::<_, StorageError>(tree.children(&path, options.recursive))
        })
        .map_ok(|entries| stream::iter(entries.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    fn read(&self, path: &str) -> ChunkStream {
        let tree = self.tree.clone();
        let path = normalize(path);
        let chunk_size = self.chunk_size;
        stream::once(async move {
            let tree = tree.read().await;
            tree.files
                .get(&path)
                .map(|f| f.content.clone())
                .ok_or(StorageError::NotFound(path))
        })
        .map_ok(move |content| {
            let chunks: Vec<Result<Bytes>> = (0..content.len())
                .step_by(chunk_size)
                .map(|start| Ok(content.slice(start..(start + chunk_size).min(content.len()))))
                .collect();
            stream::iter(chunks)
        })
        .try_flatten()
        .boxed()
    }

    async fn write(&self, path: &str, mut content: ChunkStream) -> Result<()> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = content.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let path = normalize(path);
        tracing::trace!("mem.write({}, {} bytes)", path, buf.len());
        self.tree.write().await.insert(path, buf.freeze())
    }

    async fn remove(&self, path: &str) -> Result<bool> {
        let path = normalize(path);
        tracing::trace!("mem.remove({})", path);
        Ok(self.tree.write().await.remove(&path))
    }

    async fn stats(&self, path: &str) -> Result<Option<FileInfo>> {
        let path = normalize(path);
        Ok(self.tree.read().await.info(&path))
    }
}
