//! Staging area: workspace-relative path -> blob id, stored as JSON

use std::collections::BTreeMap;

use histkit_core::engine::{EngineError, Result};
use histkit_core::fs::{EngineFs, ReadOptions};
use histkit_core::path::resolve_path;
use serde::{Deserialize, Serialize};

use crate::object::{ObjectId, Tree, TreeEntry};

/// Mode recorded for every regular file
pub const FILE_MODE: u32 = 0o100644;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub entries: BTreeMap<String, ObjectId>,
}

fn index_path(git_dir: &str) -> String {
    resolve_path(&[git_dir, "index"])
}

impl Index {
    /// Load the index; a repository without one has an empty index
    pub async fn load(fs: &dyn EngineFs, git_dir: &str) -> Result<Self> {
        match fs.read_file(&index_path(git_dir), ReadOptions::utf8()).await {
            Ok(content) => serde_json::from_str(&content.into_text())
                .map_err(|e| EngineError::Corrupt(format!("Invalid index: {}", e))),
            Err(e) if e.is_not_found() => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, fs: &dyn EngineFs, git_dir: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Backend(format!("Failed to encode index: {}", e)))?;
        fs.write_file(&index_path(git_dir), data.into()).await?;
        Ok(())
    }

    pub fn from_tree(tree: &Tree) -> Self {
        Self {
            entries: tree
                .entries
                .iter()
                .map(|(path, entry)| (path.clone(), entry.id))
                .collect(),
        }
    }

    pub fn to_tree(&self) -> Tree {
        let mut tree = Tree::new();
        for (path, id) in &self.entries {
            tree.insert(
                path.clone(),
                TreeEntry {
                    id: *id,
                    mode: FILE_MODE,
                },
            );
        }
        tree
    }

    pub fn get(&self, path: &str) -> Option<&ObjectId> {
        self.entries.get(path)
    }
}
