//! Workflow configuration
//!
//! [`HistoryConfig`] is the user-facing, serializable form (every field has a
//! default). It is resolved exactly once into an immutable [`Settings`] when a
//! [`crate::GitHistory`] is built.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::Author;
use crate::error::{HistoryError, Result};
use crate::path::{is_within, relative_to, resolve_path};

pub const DEFAULT_MAIN_BRANCH: &str = "main";
pub const DEFAULT_WORKING_BRANCH: &str = "private";
pub const DEFAULT_REMOTE_NAME: &str = "origin";
pub const DEFAULT_PLACEHOLDER: &str = ".gitkeep";

fn default_main_branch() -> String {
    DEFAULT_MAIN_BRANCH.to_string()
}

fn default_working_branch() -> String {
    DEFAULT_WORKING_BRANCH.to_string()
}

fn default_work_dir() -> String {
    "/".to_string()
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

fn default_remote_name() -> String {
    DEFAULT_REMOTE_NAME.to_string()
}

/// Remote server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_name")]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            name: default_remote_name(),
            url: None,
            username: None,
            password: None,
        }
    }
}

/// Serializable workflow configuration, stored as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    /// Shared branch
    #[serde(default = "default_main_branch")]
    pub main_branch: String,
    /// Per-user branch receiving saves
    #[serde(default = "default_working_branch")]
    pub working_branch: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    /// Control directory; `<work_dir>/.git` when unset
    #[serde(default)]
    pub git_dir: Option<String>,
    #[serde(default = "default_placeholder")]
    pub placeholder_file_name: String,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            user_name: None,
            user_email: None,
            main_branch: default_main_branch(),
            working_branch: default_working_branch(),
            work_dir: default_work_dir(),
            git_dir: None,
            placeholder_file_name: default_placeholder(),
            remote: None,
        }
    }
}

impl HistoryConfig {
    /// Load configuration from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .map_err(|e| HistoryError::ConfigFile(format!("Failed to read {:?}: {}", path, e)))?;
        serde_json::from_str(&data)
            .map_err(|e| HistoryError::ConfigFile(format!("Failed to parse {:?}: {}", path, e)))
    }

    /// Save configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| HistoryError::ConfigFile(e.to_string()))?;
        fs::write(&tmp_path, &data)
            .and_then(|_| fs::rename(&tmp_path, path))
            .map_err(|e| HistoryError::ConfigFile(format!("Failed to write {:?}: {}", path, e)))?;
        Ok(())
    }

    /// Validate and resolve into immutable settings
    pub fn resolve(&self) -> Result<Settings> {
        let user_name = self
            .user_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| HistoryError::Configuration("The user's name is not defined".into()))?;
        if self.working_branch.is_empty() {
            return Err(HistoryError::Configuration(
                "The user's branch is not defined".into(),
            ));
        }
        if self.main_branch.is_empty() {
            return Err(HistoryError::Configuration(
                "The shared branch is not defined".into(),
            ));
        }

        let remote = self.remote.clone().unwrap_or_default();
        Ok(Settings {
            workspace: Workspace::new(
                &self.work_dir,
                self.git_dir.as_deref(),
                &self.placeholder_file_name,
            ),
            author: Author {
                name: user_name.to_string(),
                email: self.user_email.clone().unwrap_or_default(),
            },
            main_branch: self.main_branch.clone(),
            working_branch: self.working_branch.clone(),
            remote_name: remote.name,
            remote_url: remote.url.filter(|u| !u.is_empty()),
        })
    }
}

/// Location of the working tree and the control directory in storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    work_dir: String,
    git_dir: String,
    placeholder_file_name: String,
}

impl Workspace {
    pub fn new(work_dir: &str, git_dir: Option<&str>, placeholder_file_name: &str) -> Self {
        let work_dir = resolve_path(&["/", work_dir]);
        let git_dir = match git_dir {
            Some(dir) => resolve_path(&["/", dir]),
            None => resolve_path(&[work_dir.as_str(), ".git"]),
        };
        Self {
            work_dir,
            git_dir,
            placeholder_file_name: placeholder_file_name.to_string(),
        }
    }

    pub fn work_dir(&self) -> &str {
        &self.work_dir
    }

    pub fn git_dir(&self) -> &str {
        &self.git_dir
    }

    pub fn placeholder_file_name(&self) -> &str {
        &self.placeholder_file_name
    }

    /// Absolute storage path of the placeholder file
    pub fn placeholder_path(&self) -> String {
        resolve_path(&[self.work_dir.as_str(), self.placeholder_file_name.as_str()])
    }

    /// Whether a storage path belongs to the control directory
    pub fn is_control_path(&self, path: &str) -> bool {
        is_within(&self.git_dir, path)
    }

    /// Workspace-relative form of an absolute storage path
    pub fn relative(&self, path: &str) -> String {
        relative_to(&self.work_dir, path)
    }
}

/// Configuration resolved once at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub workspace: Workspace,
    pub author: Author,
    pub main_branch: String,
    pub working_branch: String,
    pub remote_name: String,
    /// URL registered during repository creation
    pub remote_url: Option<String>,
}
