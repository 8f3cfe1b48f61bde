//! Version-control engine capability interface
//!
//! The workflow layer treats the engine as an opaque collaborator. Every call
//! carries an [`EngineContext`] with the filesystem contract the engine must
//! use for all of its I/O, the working and control directories, and the
//! author identity.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fs::{EngineFs, FsError};
use crate::transport::{AuthCallback, Transport, TransportError};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors reported by engines
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Checkout conflict: {} file(s) would be overwritten: {}", .0.len(), .0.join(", "))]
    CheckoutConflict(Vec<String>),

    #[error("Push rejected: {0}")]
    PushRejected(String),

    #[error("Corrupt object: {0}")]
    Corrupt(String),

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Engine error: {0}")]
    Backend(String),
}

/// Commit author / committer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// Per-call context passed to every engine operation
#[derive(Clone)]
pub struct EngineContext {
    /// Filesystem contract for all engine I/O
    pub fs: Arc<dyn EngineFs>,
    /// Working tree root (absolute)
    pub dir: String,
    /// Control directory (absolute)
    pub git_dir: String,
    pub author: Author,
}

/// Options for [`VcsEngine::branch`]
#[derive(Debug, Clone, Default)]
pub struct BranchOptions {
    /// Branch name
    pub reference: String,
    /// Start point (defaults to HEAD)
    pub object: Option<String>,
    /// Point HEAD at the new branch
    pub checkout: bool,
}

/// Options for [`VcsEngine::checkout`]
#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    /// Branch name, fully qualified ref or commit id
    pub reference: String,
    /// Overwrite uncommitted changes
    pub force: bool,
    /// Set up tracking of the remote branch with the same name
    pub track: bool,
    /// Remote used for tracking (defaults to "origin")
    pub remote: Option<String>,
}

/// Options for [`VcsEngine::commit`]
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    pub message: String,
    /// Ref to advance (defaults to the ref HEAD points to)
    pub reference: Option<String>,
}

/// Options for [`VcsEngine::fetch`]
#[derive(Clone)]
pub struct FetchOptions {
    pub url: String,
    /// Remote name under which tracking refs are written
    pub remote: String,
    /// Branch to fetch
    pub reference: String,
    pub single_branch: bool,
    pub auth: Option<AuthCallback>,
}

/// Options for [`VcsEngine::push`]
#[derive(Clone)]
pub struct PushOptions {
    pub url: String,
    pub remote: String,
    /// Local ref to push
    pub reference: String,
    /// Remote ref to update
    pub remote_ref: String,
    pub force: bool,
    pub auth: Option<AuthCallback>,
}

/// Outcome of a fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    /// Commit id of the fetched branch head, `None` if the branch is absent
    pub fetch_head: Option<String>,
    /// Number of objects written locally
    pub objects_received: usize,
}

/// Outcome of a push
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    pub ok: bool,
    /// Per-ref status messages
    pub refs: BTreeMap<String, String>,
    pub error: Option<String>,
}

/// Configured remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub remote: String,
    pub url: String,
}

/// Commit content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitData {
    pub message: String,
    pub tree: String,
    pub parent: Vec<String>,
    pub author: Author,
    /// Unix seconds
    pub timestamp: i64,
}

/// Entry of a commit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEntry {
    pub oid: String,
    pub commit: CommitData,
}

/// Engine capabilities consumed by the workflow
#[async_trait]
pub trait VcsEngine: Send + Sync {
    /// Create the repository structure in the control directory
    async fn init(&self, ctx: &EngineContext, default_branch: &str) -> Result<()>;

    /// Create a branch
    async fn branch(&self, ctx: &EngineContext, options: BranchOptions) -> Result<()>;

    /// Update the working tree (and HEAD) to a branch, ref or commit
    async fn checkout(&self, ctx: &EngineContext, options: CheckoutOptions) -> Result<()>;

    /// Record the index as a new commit, returning its id
    async fn commit(&self, ctx: &EngineContext, options: CommitOptions) -> Result<String>;

    /// Stage a workspace-relative path
    async fn add(&self, ctx: &EngineContext, filepath: &str) -> Result<()>;

    /// Commits reachable from `reference`, newest first
    async fn log(
        &self,
        ctx: &EngineContext,
        reference: &str,
        depth: Option<usize>,
    ) -> Result<Vec<CommitEntry>>;

    /// Name of the checked out branch, `None` when HEAD is detached
    async fn current_branch(&self, ctx: &EngineContext) -> Result<Option<String>>;

    /// Local branch names, sorted
    async fn list_branches(&self, ctx: &EngineContext) -> Result<Vec<String>>;

    async fn list_remotes(&self, ctx: &EngineContext) -> Result<Vec<RemoteEntry>>;

    /// Register a remote; `force` overwrites an existing one
    async fn add_remote(&self, ctx: &EngineContext, remote: &str, url: &str, force: bool) -> Result<()>;

    /// Status code of a workspace-relative path
    async fn status(&self, ctx: &EngineContext, filepath: &str) -> Result<String>;

    async fn is_ignored(&self, ctx: &EngineContext, filepath: &str) -> Result<bool>;

    async fn fetch(
        &self,
        ctx: &EngineContext,
        transport: &dyn Transport,
        options: FetchOptions,
    ) -> Result<FetchResult>;

    async fn push(
        &self,
        ctx: &EngineContext,
        transport: &dyn Transport,
        options: PushOptions,
    ) -> Result<PushResult>;

    /// Point a ref at a commit id
    async fn write_ref(&self, ctx: &EngineContext, reference: &str, value: &str, force: bool) -> Result<()>;

    /// Commit id a ref points to
    async fn resolve_ref(&self, ctx: &EngineContext, reference: &str) -> Result<String>;
}
