//! Object database stored under `<git_dir>/objects/<2>/<38>`
//!
//! Objects are written zstd-compressed through the engine filesystem
//! contract. Content addressing makes writes idempotent.

use std::collections::HashSet;
use std::sync::Arc;

use histkit_core::engine::{EngineError, Result};
use histkit_core::fs::{EngineFs, ReadOptions, WriteData};
use histkit_core::path::resolve_path;

use crate::object::{Commit, Object, ObjectId, Tree};

const COMPRESSION_LEVEL: i32 = 3;

#[derive(Clone)]
pub struct ObjectDb {
    fs: Arc<dyn EngineFs>,
    root: String,
}

impl ObjectDb {
    pub fn new(fs: Arc<dyn EngineFs>, git_dir: &str) -> Self {
        Self {
            fs,
            root: resolve_path(&[git_dir, "objects"]),
        }
    }

    fn object_path(&self, id: &ObjectId) -> String {
        let hex = id.to_hex();
        resolve_path(&[self.root.as_str(), &hex[..2], &hex[2..]])
    }

    pub async fn contains(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.fs.exists(&self.object_path(id)).await?)
    }

    /// Store an already framed object under its id
    pub async fn write_framed(&self, id: &ObjectId, framed: &[u8]) -> Result<()> {
        if self.contains(id).await? {
            return Ok(());
        }
        let compressed = zstd::encode_all(framed, COMPRESSION_LEVEL)
            .map_err(|e| EngineError::Backend(format!("Compression failed: {}", e)))?;
        self.fs
            .write_file(&self.object_path(id), WriteData::from(compressed))
            .await?;
        tracing::trace!("Stored object {} ({} bytes)", id, framed.len());
        Ok(())
    }

    pub async fn write(&self, object: &Object) -> Result<ObjectId> {
        let framed = object.frame()?;
        let id = ObjectId::from_framed(&framed);
        self.write_framed(&id, &framed).await?;
        Ok(id)
    }

    /// Framed bytes of an object, verified against its id
    pub async fn read_framed(&self, id: &ObjectId) -> Result<Vec<u8>> {
        let path = self.object_path(id);
        let compressed = match self.fs.read_file(&path, ReadOptions::default()).await {
            Ok(content) => content.into_bytes(),
            Err(e) if e.is_not_found() => {
                return Err(EngineError::NotFound(format!("object {}", id)));
            }
            Err(e) => return Err(e.into()),
        };
        let framed = zstd::decode_all(compressed.as_ref())
            .map_err(|e| EngineError::Corrupt(format!("Object {}: {}", id, e)))?;
        if ObjectId::from_framed(&framed) != *id {
            return Err(EngineError::Corrupt(format!("Object {} hash mismatch", id)));
        }
        Ok(framed)
    }

    pub async fn read(&self, id: &ObjectId) -> Result<Object> {
        Object::unframe(&self.read_framed(id).await?)
    }

    pub async fn read_commit(&self, id: &ObjectId) -> Result<Commit> {
        match self.read(id).await? {
            Object::Commit(commit) => Ok(commit),
            other => Err(EngineError::Corrupt(format!(
                "Expected commit {}, found {}",
                id,
                other.kind().as_str()
            ))),
        }
    }

    pub async fn read_tree(&self, id: &ObjectId) -> Result<Tree> {
        match self.read(id).await? {
            Object::Tree(tree) => Ok(tree),
            other => Err(EngineError::Corrupt(format!(
                "Expected tree {}, found {}",
                id,
                other.kind().as_str()
            ))),
        }
    }

    pub async fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        match self.read(id).await? {
            Object::Blob(data) => Ok(data),
            other => Err(EngineError::Corrupt(format!(
                "Expected blob {}, found {}",
                id,
                other.kind().as_str()
            ))),
        }
    }

    /// Tree of a commit
    pub async fn commit_tree(&self, id: &ObjectId) -> Result<Tree> {
        let commit = self.read_commit(id).await?;
        self.read_tree(&commit.tree).await
    }

    /// Every object reachable from `roots`, skipping (and not descending
    /// into) the ids in `exclude`.
    pub async fn reachable(
        &self,
        roots: &[ObjectId],
        exclude: &HashSet<ObjectId>,
    ) -> Result<Vec<ObjectId>> {
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut ordered = Vec::new();
        let mut pending: Vec<ObjectId> = roots.to_vec();
        while let Some(id) = pending.pop() {
            if exclude.contains(&id) || !seen.insert(id) {
                continue;
            }
            ordered.push(id);
            match self.read(&id).await? {
                Object::Commit(commit) => {
                    pending.push(commit.tree);
                    pending.extend(commit.parents);
                }
                Object::Tree(tree) => pending.extend(tree.entries.values().map(|e| e.id)),
                Object::Blob(_) => {}
            }
        }
        Ok(ordered)
    }

    /// Whether `ancestor` is reachable from `descendant` through parent links.
    /// Missing commits end the walk.
    pub async fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool> {
        let mut seen = HashSet::new();
        let mut pending = vec![*descendant];
        while let Some(id) = pending.pop() {
            if id == *ancestor {
                return Ok(true);
            }
            if !seen.insert(id) || !self.contains(&id).await? {
                continue;
            }
            pending.extend(self.read_commit(&id).await?.parents);
        }
        Ok(false)
    }
}
