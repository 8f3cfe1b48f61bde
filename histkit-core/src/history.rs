//! Two-tier history workflow
//!
//! Notions:
//! - "working branch": the per-user branch where saves land
//! - "shared branch": the branch where everyone's work is integrated
//! - "save": record the dirty files of the workspace as a new commit
//! - "synchronize": mirror the shared branch from the remote server
//!
//! The repository is created lazily: every public operation first awaits
//! [`GitHistory::init`], which runs at most once per instance.

use std::sync::{Arc, RwLock};

use futures::stream::BoxStream;
use futures::TryStreamExt;
use tokio::sync::OnceCell;

use crate::config::{HistoryConfig, RemoteConfig, Settings, Workspace};
use crate::engine::{
    BranchOptions, CheckoutOptions, CommitEntry, CommitOptions, EngineContext, VcsEngine,
};
use crate::error::{HistoryError, Result};
use crate::fs::{EngineFs, StorageFs, WriteData};
use crate::remote::Credentials;
use crate::scanner::{ChangeRecord, DirtyFileScanner, ScanFilter};
use crate::storage::FilesApi;
use crate::transport::Transport;

/// Options for [`GitHistory::save_files`]
#[derive(Clone, Default)]
pub struct SaveOptions {
    /// Restricts which entries are considered
    pub filter: Option<ScanFilter>,
    /// Target branch (defaults to the current branch)
    pub branch_name: Option<String>,
    /// Summary line placed before the list of saved files
    pub message: Option<String>,
}

/// Outcome of [`GitHistory::save_files`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveResult {
    /// New commit id, `None` when there was nothing to save
    pub commit_id: Option<String>,
    /// Workspace-relative paths recorded in the commit, in scan order
    pub files: Vec<String>,
}

/// Builder validating the collaborators of a [`GitHistory`]
#[derive(Default)]
pub struct GitHistoryBuilder {
    engine: Option<Arc<dyn VcsEngine>>,
    transport: Option<Arc<dyn Transport>>,
    files: Option<Arc<dyn FilesApi>>,
    config: HistoryConfig,
}

impl GitHistoryBuilder {
    pub fn engine(mut self, engine: Arc<dyn VcsEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn files(mut self, files: Arc<dyn FilesApi>) -> Self {
        self.files = Some(files);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: HistoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.config.user_name = Some(name.into());
        self
    }

    pub fn user_email(mut self, email: impl Into<String>) -> Self {
        self.config.user_email = Some(email.into());
        self
    }

    pub fn work_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn git_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.git_dir = Some(dir.into());
        self
    }

    pub fn main_branch(mut self, name: impl Into<String>) -> Self {
        self.config.main_branch = name.into();
        self
    }

    pub fn working_branch(mut self, name: impl Into<String>) -> Self {
        self.config.working_branch = name.into();
        self
    }

    pub fn placeholder_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.placeholder_file_name = name.into();
        self
    }

    /// Remote registered when the repository is first created
    pub fn remote_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.get_or_insert_with(RemoteConfig::default).url = Some(url.into());
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        let remote = self.config.remote.get_or_insert_with(RemoteConfig::default);
        remote.username = Some(username.into());
        remote.password = Some(password.into());
        self
    }

    /// Validate collaborators and resolve the configuration
    pub fn build(self) -> Result<GitHistory> {
        let engine = self.engine.ok_or_else(|| {
            HistoryError::Configuration("The version-control engine is not defined".into())
        })?;
        let transport = self
            .transport
            .ok_or_else(|| HistoryError::Configuration("The transport is not defined".into()))?;
        let files = self
            .files
            .ok_or_else(|| HistoryError::Configuration("FilesApi is not defined".into()))?;
        let settings = self.config.resolve()?;

        let credentials = self.config.remote.as_ref().and_then(|remote| {
            remote.username.as_ref().map(|username| Credentials {
                username: username.clone(),
                password: remote.password.clone().unwrap_or_default(),
            })
        });

        let fs: Arc<dyn EngineFs> = Arc::new(StorageFs::new(files.clone()));
        let ctx = EngineContext {
            fs,
            dir: settings.workspace.work_dir().to_string(),
            git_dir: settings.workspace.git_dir().to_string(),
            author: settings.author.clone(),
        };
        let scanner = DirtyFileScanner::new(
            files.clone(),
            engine.clone(),
            ctx.clone(),
            settings.workspace.clone(),
        );

        Ok(GitHistory {
            settings,
            engine,
            transport,
            files,
            ctx,
            scanner,
            credentials: RwLock::new(credentials),
            initialized: OnceCell::new(),
        })
    }
}

/// Simplified history workflow over a single workspace
pub struct GitHistory {
    settings: Settings,
    engine: Arc<dyn VcsEngine>,
    pub(crate) transport: Arc<dyn Transport>,
    files: Arc<dyn FilesApi>,
    ctx: EngineContext,
    scanner: DirtyFileScanner,
    pub(crate) credentials: RwLock<Option<Credentials>>,
    initialized: OnceCell<()>,
}

impl GitHistory {
    pub fn builder() -> GitHistoryBuilder {
        GitHistoryBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn workspace(&self) -> &Workspace {
        &self.settings.workspace
    }

    pub fn work_dir(&self) -> &str {
        self.settings.workspace.work_dir()
    }

    pub fn git_dir(&self) -> &str {
        self.settings.workspace.git_dir()
    }

    pub fn main_branch(&self) -> &str {
        &self.settings.main_branch
    }

    pub fn working_branch(&self) -> &str {
        &self.settings.working_branch
    }

    /// Storage backend holding the workspace
    pub fn files(&self) -> &Arc<dyn FilesApi> {
        &self.files
    }

    /// Filesystem bridge handed to the engine
    pub fn fs(&self) -> &Arc<dyn EngineFs> {
        &self.ctx.fs
    }

    pub(crate) fn engine(&self) -> &Arc<dyn VcsEngine> {
        &self.engine
    }

    pub(crate) fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Materialize the repository. Runs once; concurrent callers share the
    /// in-flight initialization.
    pub async fn init(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| self.initialize())
            .await
            .map(|_| ())
    }

    async fn initialize(&self) -> Result<()> {
        let ctx = &self.ctx;
        let main_branch = self.settings.main_branch.as_str();
        tracing::debug!(
            "Initializing history in {} (control directory {})",
            ctx.dir,
            ctx.git_dir
        );

        let branches = self.engine.list_branches(ctx).await?;
        if branches.is_empty() {
            self.engine.init(ctx, main_branch).await?;
            self.engine
                .branch(
                    ctx,
                    BranchOptions {
                        reference: main_branch.to_string(),
                        object: None,
                        checkout: true,
                    },
                )
                .await?;

            // An empty tree cannot be committed, so seed it with a placeholder.
            let workspace = &self.settings.workspace;
            ctx.fs
                .write_file(&workspace.placeholder_path(), WriteData::Bytes(Default::default()))
                .await?;
            self.engine.add(ctx, workspace.placeholder_file_name()).await?;
            let commit_id = self
                .engine
                .commit(
                    ctx,
                    CommitOptions {
                        message: "Initial commit".to_string(),
                        reference: None,
                    },
                )
                .await?;
            tracing::info!("Created repository in {} ({})", ctx.git_dir, commit_id);

            if let Some(url) = &self.settings.remote_url {
                self.engine
                    .add_remote(ctx, &self.settings.remote_name, url, true)
                    .await?;
            }
        } else if !branches.iter().any(|b| b == main_branch) {
            self.engine
                .branch(
                    ctx,
                    BranchOptions {
                        reference: main_branch.to_string(),
                        object: None,
                        checkout: true,
                    },
                )
                .await?;
        }

        let working_branch = self.settings.working_branch.clone();
        self.switch_to_branch(&working_branch, true).await?;
        tracing::debug!("History ready on branch {}", working_branch);
        Ok(())
    }

    /// Force-checkout a branch, creating it from HEAD when `create` is set.
    /// Returns `false` if the branch is missing and was not created.
    async fn switch_to_branch(&self, branch: &str, create: bool) -> Result<bool> {
        let ctx = &self.ctx;
        let branches = self.engine.list_branches(ctx).await?;
        if !branches.iter().any(|b| b == branch) {
            if !create {
                return Ok(false);
            }
            self.engine
                .branch(
                    ctx,
                    BranchOptions {
                        reference: branch.to_string(),
                        object: None,
                        checkout: false,
                    },
                )
                .await?;
        }
        self.engine
            .checkout(
                ctx,
                CheckoutOptions {
                    reference: branch.to_string(),
                    force: true,
                    ..Default::default()
                },
            )
            .await?;
        Ok(true)
    }

    /// Commits of the current branch (or of HEAD when detached), newest first
    pub async fn get_log(&self) -> Result<Vec<CommitEntry>> {
        self.init().await?;
        let reference = self
            .engine
            .current_branch(&self.ctx)
            .await?
            .unwrap_or_else(|| "HEAD".to_string());
        Ok(self.engine.log(&self.ctx, &reference, None).await?)
    }

    pub async fn get_current_branch(&self) -> Result<Option<String>> {
        self.init().await?;
        Ok(self.engine.current_branch(&self.ctx).await?)
    }

    pub async fn get_branches(&self) -> Result<Vec<String>> {
        self.init().await?;
        Ok(self.engine.list_branches(&self.ctx).await?)
    }

    /// Status of every file of the workspace accepted by `filter`
    pub async fn get_files_status(
        &self,
        filter: Option<ScanFilter>,
    ) -> Result<BoxStream<'static, Result<ChangeRecord>>> {
        self.init().await?;
        Ok(self.scanner.scan(filter))
    }

    /// Whether an absolute storage path is excluded by ignore rules
    pub async fn is_ignored(&self, path: &str) -> Result<bool> {
        self.init().await?;
        let filepath = self.settings.workspace.relative(path);
        Ok(self.engine.is_ignored(&self.ctx, &filepath).await?)
    }

    /// Record all dirty files accepted by the filter as a new commit
    pub async fn save_files(&self, options: SaveOptions) -> Result<SaveResult> {
        self.init().await?;
        let ctx = &self.ctx;

        let branch = match options.branch_name.filter(|b| !b.is_empty()) {
            Some(branch) => branch,
            None => self
                .engine
                .current_branch(ctx)
                .await?
                .unwrap_or_else(|| self.settings.working_branch.clone()),
        };
        let reference = expand_ref(&branch);

        let mut files = Vec::new();
        let mut dirty = self.scanner.dirty(options.filter);
        while let Some(record) = dirty.try_next().await? {
            self.engine.add(ctx, &record.path).await?;
            files.push(record.path);
        }
        if files.is_empty() {
            tracing::debug!("Nothing to save on {}", reference);
            return Ok(SaveResult::default());
        }

        let message = compose_message(options.message.as_deref(), &files);
        let commit_id = self
            .engine
            .commit(
                ctx,
                CommitOptions {
                    message,
                    reference: Some(reference.clone()),
                },
            )
            .await?;

        // Keep the ref and HEAD in lock-step with the new commit.
        self.engine.write_ref(ctx, &reference, &commit_id, true).await?;
        self.engine
            .checkout(
                ctx,
                CheckoutOptions {
                    reference: reference.clone(),
                    force: true,
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!("Saved {} file(s) on {} as {}", files.len(), reference, commit_id);
        Ok(SaveResult {
            commit_id: Some(commit_id),
            files,
        })
    }

    /// Switch the working tree to a branch, ref or commit id.
    /// Uncommitted changes are overwritten.
    pub async fn checkout(&self, reference: &str) -> Result<()> {
        self.init().await?;
        tracing::debug!("Checking out {}", reference);
        self.engine
            .checkout(
                &self.ctx,
                CheckoutOptions {
                    reference: reference.to_string(),
                    force: true,
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// URL of the default remote, `None` if unset
    pub async fn get_remote_server_url(&self) -> Result<Option<String>> {
        self.init().await?;
        let remotes = self.engine.list_remotes(&self.ctx).await?;
        Ok(remotes
            .into_iter()
            .find(|r| r.remote == self.settings.remote_name)
            .map(|r| r.url))
    }

    /// Register (or overwrite) the URL of the default remote
    pub async fn set_remote_server_url(&self, url: &str) -> Result<String> {
        self.init().await?;
        self.engine
            .add_remote(&self.ctx, &self.settings.remote_name, url, true)
            .await?;
        tracing::debug!("Remote {} set to {}", self.settings.remote_name, url);
        Ok(url.to_string())
    }
}

/// Whether a string looks like a full commit id
pub fn is_object_id(value: &str) -> bool {
    value.len() == 40 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Expand a bare branch name into a fully qualified ref
pub fn expand_ref(name: &str) -> String {
    if is_object_id(name) || name.contains('/') || name == "HEAD" {
        name.to_string()
    } else {
        format!("refs/heads/{}", name)
    }
}

/// Commit message: optional summary, blank line, then one path per line
pub fn compose_message(message: Option<&str>, files: &[String]) -> String {
    let list = files.join("\n");
    match message.filter(|m| !m.is_empty()) {
        Some(message) => format!("{}\n\n{}", message, list),
        None => list,
    }
}
