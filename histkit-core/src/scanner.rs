//! Dirty-file scanning
//!
//! Walks the working tree through the storage backend, one directory level at
//! a time, and asks the engine for the status of every file it meets. The
//! walk is a lazy stream: nothing is listed or queried until the consumer
//! pulls, and every call to [`DirtyFileScanner::scan`] starts from scratch.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::config::Workspace;
use crate::engine::{EngineContext, VcsEngine};
use crate::error::Result;
use crate::storage::{FileInfo, FileKind, FilesApi, InfoStream, ListOptions};

/// Caller predicate deciding whether an entry is visited.
/// Rejecting a directory prunes its whole subtree.
pub type ScanFilter = Arc<dyn Fn(&FileInfo) -> bool + Send + Sync>;

/// Status marker prefix of uncommitted changes
pub const DIRTY_MARKER: char = '*';

/// Whether an engine status code denotes an uncommitted change
pub fn is_dirty_status(status: &str) -> bool {
    status.starts_with(DIRTY_MARKER)
}

/// A scanned working-tree file and its engine status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Workspace-relative path
    pub path: String,
    /// Absolute storage path
    pub full_path: String,
    pub kind: FileKind,
    pub status: String,
}

impl ChangeRecord {
    pub fn is_dirty(&self) -> bool {
        is_dirty_status(&self.status)
    }
}

/// Maps raw storage state to change records
#[derive(Clone)]
pub struct DirtyFileScanner {
    files: Arc<dyn FilesApi>,
    engine: Arc<dyn VcsEngine>,
    ctx: EngineContext,
    workspace: Workspace,
}

struct Walk {
    levels: Vec<InfoStream>,
    scanner: DirtyFileScanner,
    filter: Option<ScanFilter>,
}

impl DirtyFileScanner {
    pub fn new(
        files: Arc<dyn FilesApi>,
        engine: Arc<dyn VcsEngine>,
        ctx: EngineContext,
        workspace: Workspace,
    ) -> Self {
        Self {
            files,
            engine,
            ctx,
            workspace,
        }
    }

    /// Stream the status of every accepted file, depth first.
    ///
    /// The control directory is skipped before `filter` is consulted;
    /// `None` accepts every entry.
    pub fn scan(&self, filter: Option<ScanFilter>) -> BoxStream<'static, Result<ChangeRecord>> {
        let root = self
            .files
            .list(self.workspace.work_dir(), ListOptions::default());
        let walk = Walk {
            levels: vec![root],
            scanner: self.clone(),
            filter,
        };

        stream::unfold(walk, |mut walk| async move {
            loop {
                let level = walk.levels.last_mut()?;
                let info = match level.next().await {
                    None => {
                        walk.levels.pop();
                        continue;
                    }
                    Some(Err(e)) => return Some((Err(e.into()), walk)),
                    Some(Ok(info)) => info,
                };

                if walk.scanner.workspace.is_control_path(&info.path) {
                    continue;
                }
                if let Some(filter) = &walk.filter {
                    if !filter(&info) {
                        continue;
                    }
                }
                if info.is_directory() {
                    let children = walk.scanner.files.list(&info.path, ListOptions::default());
                    walk.levels.push(children);
                    continue;
                }

                let path = walk.scanner.workspace.relative(&info.path);
                let record = walk
                    .scanner
                    .engine
                    .status(&walk.scanner.ctx, &path)
                    .await
                    .map(|status| ChangeRecord {
                        path,
                        full_path: info.path,
                        kind: info.kind,
                        status,
                    })
                    .map_err(Into::into);
                return Some((record, walk));
            }
        })
        .boxed()
    }

    /// Only the records with uncommitted changes
    pub fn dirty(&self, filter: Option<ScanFilter>) -> BoxStream<'static, Result<ChangeRecord>> {
        self.scan(filter)
            .try_filter(|record| futures::future::ready(record.is_dirty()))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_status() {
        for status in ["*added", "*modified", "*deleted", "*absent", "*unmodified"] {
            assert!(is_dirty_status(status), "{}", status);
        }
        for status in ["unmodified", "ignored", "added", "modified", "absent", ""] {
            assert!(!is_dirty_status(status), "{}", status);
        }
    }
}
