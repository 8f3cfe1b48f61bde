//! References: `HEAD`, branches and remote-tracking branches
//!
//! Each ref is a small text file under the control directory holding a
//! 40-hex object id. `HEAD` either holds an id (detached) or a symbolic
//! `ref: refs/heads/<name>` line.

use std::sync::Arc;

use histkit_core::engine::{EngineError, Result};
use histkit_core::fs::{EngineFs, ReadOptions};
use histkit_core::path::resolve_path;

use crate::object::ObjectId;

pub const HEAD: &str = "HEAD";
pub const HEADS_PREFIX: &str = "refs/heads/";
pub const REMOTES_PREFIX: &str = "refs/remotes/";

const SYMREF_PREFIX: &str = "ref: ";

/// Content of `HEAD`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// Points to a (possibly unborn) branch ref
    Symbolic(String),
    Detached(ObjectId),
}

/// Fully qualified branch ref
pub fn branch_ref(name: &str) -> String {
    if name.starts_with(HEADS_PREFIX) {
        name.to_string()
    } else {
        format!("{}{}", HEADS_PREFIX, name)
    }
}

/// Ref of a remote-tracking branch
pub fn remote_ref(remote: &str, branch: &str) -> String {
    let branch = branch.strip_prefix(HEADS_PREFIX).unwrap_or(branch);
    format!("{}{}/{}", REMOTES_PREFIX, remote, branch)
}

/// Reject names that would escape the refs namespace
pub fn validate_ref_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('/')
        || name.ends_with('/')
        || name.split('/').any(|part| part.is_empty() || part == "." || part == "..")
        || name.chars().any(|c| c.is_whitespace() || "~^:?*[\\".contains(c));
    if invalid {
        return Err(EngineError::Backend(format!("Invalid ref name '{}'", name)));
    }
    Ok(())
}

#[derive(Clone)]
pub struct RefStore {
    fs: Arc<dyn EngineFs>,
    git_dir: String,
}

impl RefStore {
    pub fn new(fs: Arc<dyn EngineFs>, git_dir: &str) -> Self {
        Self {
            fs,
            git_dir: git_dir.to_string(),
        }
    }

    fn path(&self, name: &str) -> String {
        resolve_path(&[self.git_dir.as_str(), name])
    }

    async fn read_raw(&self, name: &str) -> Result<Option<String>> {
        match self.fs.read_file(&self.path(name), ReadOptions::utf8()).await {
            Ok(content) => Ok(Some(content.into_text().trim().to_string())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn head(&self) -> Result<Option<Head>> {
        let Some(raw) = self.read_raw(HEAD).await? else {
            return Ok(None);
        };
        match raw.strip_prefix(SYMREF_PREFIX) {
            Some(target) => Ok(Some(Head::Symbolic(target.trim().to_string()))),
            None => Ok(Some(Head::Detached(ObjectId::parse(&raw)?))),
        }
    }

    pub async fn set_head(&self, head: &Head) -> Result<()> {
        let content = match head {
            Head::Symbolic(target) => format!("{}{}\n", SYMREF_PREFIX, target),
            Head::Detached(id) => format!("{}\n", id),
        };
        self.fs.write_file(&self.path(HEAD), content.into()).await?;
        Ok(())
    }

    /// Object id a ref points to. `HEAD` is followed when symbolic.
    pub async fn read(&self, name: &str) -> Result<Option<ObjectId>> {
        if name == HEAD {
            return match self.head().await? {
                None => Ok(None),
                Some(Head::Detached(id)) => Ok(Some(id)),
                Some(Head::Symbolic(target)) => self.read_direct(&target).await,
            };
        }
        self.read_direct(name).await
    }

    /// Object id stored in a ref file, without following `HEAD`
    async fn read_direct(&self, name: &str) -> Result<Option<ObjectId>> {
        match self.read_raw(name).await? {
            Some(raw) => Ok(Some(ObjectId::parse(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn write(&self, name: &str, id: &ObjectId) -> Result<()> {
        validate_ref_name(name)?;
        tracing::trace!("ref {} -> {}", name, id);
        self.fs
            .write_file(&self.path(name), format!("{}\n", id).into())
            .await?;
        Ok(())
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.read_raw(name).await?.is_some())
    }

    /// Fully qualified names of the refs below `prefix`, sorted
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut pending = vec![prefix.trim_end_matches('/').to_string()];
        while let Some(dir) = pending.pop() {
            let entries = match self.fs.readdir(&self.path(&dir)).await {
                Ok(entries) => entries,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let name = format!("{}/{}", dir, entry);
                if self.fs.stat(&self.path(&name)).await?.is_directory() {
                    pending.push(name);
                } else {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// All refs below `prefix` with their targets
    pub async fn list_with_ids(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>> {
        let mut refs = Vec::new();
        for name in self.list(prefix).await? {
            if let Some(id) = self.read(&name).await? {
                refs.push((name, id));
            }
        }
        Ok(refs)
    }
}
