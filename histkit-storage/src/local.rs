//! Local-disk storage backend
//!
//! Maps the virtual absolute path space onto a root directory. Paths are
//! normalized before being joined to the root, so `..` can never escape it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt, TryStreamExt};
use histkit_core::path::{file_name, resolve_path};
use histkit_core::storage::{
    ChunkStream, FileInfo, FileKind, FilesApi, InfoStream, ListOptions, Result, StorageError,
    guess_content_type,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::DEFAULT_CHUNK_SIZE;

/// [`FilesApi`] over a directory of the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFilesApi {
    root: PathBuf,
    chunk_size: usize,
}

fn map_io(err: std::io::Error, path: &str) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::Io(err)
    }
}

fn file_info(path: &str, metadata: &std::fs::Metadata) -> FileInfo {
    let name = file_name(path);
    let last_modified = metadata
        .modified()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp_millis())
        .unwrap_or(0);
    let kind = if metadata.is_dir() {
        FileKind::Directory
    } else {
        FileKind::File
    };
    FileInfo {
        name: name.to_string(),
        path: path.to_string(),
        kind,
        size: if metadata.is_dir() { 0 } else { metadata.len() },
        last_modified,
        content_type: if metadata.is_dir() {
            None
        } else {
            guess_content_type(name)
        },
    }
}

/// Sorted entries of a single directory; a missing directory has none
async fn read_entries(root: &Path, dir: &str) -> Result<Vec<FileInfo>> {
    let target = root.join(dir.trim_start_matches('/'));
    let mut read_dir = match tokio::fs::read_dir(&target).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::Io(e)),
    };
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = resolve_path(&[dir, name.as_str()]);
        let metadata = entry.metadata().await?;
        entries.push(file_info(&path, &metadata));
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

impl LocalFilesApi {
    /// Serve the contents of `root`, creating it if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> (String, PathBuf) {
        let normalized = resolve_path(&["/", path]);
        let host = self.root.join(normalized.trim_start_matches('/'));
        (normalized, host)
    }
}

#[async_trait]
impl FilesApi for LocalFilesApi {
    fn list(&self, path: &str, options: ListOptions) -> InfoStream {
        let root = self.root.clone();
        let (dir, _) = self.host_path(path);
        stream::once(async move {
            let mut result = Vec::new();
            let mut pending = vec![dir];
            while let Some(dir) = pending.pop() {
                let entries = read_entries(&root, &dir).await?;
                if options.recursive {
                    pending.extend(
                        entries
                            .iter()
                            .rev()
                            .filter(|e| e.is_directory())
                            .map(|e| e.path.clone()),
                    );
                }
                result.extend(entries);
            }
            Ok::<_, StorageError>(result)
        })
        .map_ok(|entries| stream::iter(entries.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    fn read(&self, path: &str) -> ChunkStream {
        let (path, host) = self.host_path(path);
        let chunk_size = self.chunk_size;
        stream::once(async move {
            tokio::fs::File::open(&host)
                .await
                .map_err(|e| map_io(e, &path))
        })
        .map_ok(move |file| {
            stream::unfold(Some(file), move |file| async move {
                let mut file = file?;
                let mut buf = BytesMut::zeroed(chunk_size);
                match file.read(&mut buf).await {
                    Ok(0) => None,
                    Ok(n) => {
                        buf.truncate(n);
                        Some((Ok(buf.freeze()), Some(file)))
                    }
                    Err(e) => Some((Err(StorageError::Io(e)), None)),
                }
            })
        })
        .try_flatten()
        .boxed()
    }

    async fn write(&self, path: &str, mut content: ChunkStream) -> Result<()> {
        let (path, host) = self.host_path(path);
        tracing::trace!("local.write({})", path);
        if let Some(parent) = host.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(e, &path))?;
        }
        let mut file = tokio::fs::File::create(&host)
            .await
            .map_err(|e| map_io(e, &path))?;
        while let Some(chunk) = content.next().await {
            let chunk: Bytes = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<bool> {
        let (path, host) = self.host_path(path);
        tracing::trace!("local.remove({})", path);
        let metadata = match tokio::fs::metadata(&host).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(StorageError::Io(e)),
        };
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&host).await?;
        } else {
            tokio::fs::remove_file(&host).await?;
        }
        Ok(true)
    }

    async fn stats(&self, path: &str) -> Result<Option<FileInfo>> {
        let (path, host) = self.host_path(path);
        match tokio::fs::metadata(&host).await {
            Ok(metadata) => Ok(Some(file_info(&path, &metadata))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_stay_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let api = LocalFilesApi::open(dir.path()).unwrap();
        let (virtual_path, host) = api.host_path("../../etc/passwd");
        assert_eq!(virtual_path, "/etc/passwd");
        assert!(host.starts_with(dir.path()));
    }
}
