//! Repository configuration (`<git_dir>/config`, JSON)

use std::collections::BTreeMap;

use histkit_core::engine::{EngineError, Result};
use histkit_core::fs::{EngineFs, ReadOptions};
use histkit_core::path::resolve_path;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSection {
    #[serde(default)]
    pub bare: bool,
    #[serde(default)]
    pub default_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSection {
    pub url: String,
}

/// Upstream of a local branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSection {
    pub remote: String,
    /// Fully qualified ref on the remote
    pub merge: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default)]
    pub core: CoreSection,
    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteSection>,
    #[serde(default)]
    pub branches: BTreeMap<String, BranchSection>,
}

pub fn config_path(git_dir: &str) -> String {
    resolve_path(&[git_dir, "config"])
}

impl RepoConfig {
    pub async fn load(fs: &dyn EngineFs, git_dir: &str) -> Result<Self> {
        match fs.read_file(&config_path(git_dir), ReadOptions::utf8()).await {
            Ok(content) => serde_json::from_str(&content.into_text())
                .map_err(|e| EngineError::Corrupt(format!("Invalid repository config: {}", e))),
            Err(e) if e.is_not_found() => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, fs: &dyn EngineFs, git_dir: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Backend(format!("Failed to encode config: {}", e)))?;
        fs.write_file(&config_path(git_dir), data.into()).await?;
        Ok(())
    }
}
