//! Local repository operations
//!
//! A [`Repository`] is a cheap view over the state stored in the control
//! directory. It is opened per call from an [`EngineContext`] and keeps no
//! state of its own: every operation reads what it needs through the
//! filesystem contract.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use histkit_core::engine::{
    Author, BranchOptions, CheckoutOptions, CommitEntry, CommitOptions, EngineContext,
    EngineError, RemoteEntry, Result,
};
use histkit_core::fs::{EngineFs, ReadOptions};
use histkit_core::history::is_object_id;
use histkit_core::path::{is_within, parent, relative_to, resolve_path};

use crate::config::{BranchSection, CoreSection, RemoteSection, RepoConfig};
use crate::ignore::IgnoreRules;
use crate::index::Index;
use crate::object::{Commit, Object, ObjectId, Signature, Tree, blob_id};
use crate::odb::ObjectDb;
use crate::refs::{
    self, HEAD, HEADS_PREFIX, Head, REMOTES_PREFIX, RefStore, branch_ref, validate_ref_name,
};
use crate::status::{IGNORED, status_code};

pub const DEFAULT_REMOTE: &str = "origin";

pub struct Repository {
    pub(crate) fs: Arc<dyn EngineFs>,
    work_dir: String,
    git_dir: String,
    author: Author,
    pub(crate) odb: ObjectDb,
    pub(crate) refs: RefStore,
}

/// Qualify a ref given by the caller, leaving `HEAD` and `refs/...` intact
fn qualify(reference: &str) -> String {
    if reference == HEAD || reference.starts_with("refs/") {
        reference.to_string()
    } else {
        branch_ref(reference)
    }
}

impl Repository {
    pub fn open(ctx: &EngineContext) -> Self {
        Self {
            fs: ctx.fs.clone(),
            work_dir: ctx.dir.clone(),
            git_dir: ctx.git_dir.clone(),
            author: ctx.author.clone(),
            odb: ObjectDb::new(ctx.fs.clone(), &ctx.git_dir),
            refs: RefStore::new(ctx.fs.clone(), &ctx.git_dir),
        }
    }

    fn workdir_path(&self, filepath: &str) -> String {
        resolve_path(&[self.work_dir.as_str(), filepath])
    }

    async fn load_index(&self) -> Result<Index> {
        Index::load(self.fs.as_ref(), &self.git_dir).await
    }

    async fn save_index(&self, index: &Index) -> Result<()> {
        index.save(self.fs.as_ref(), &self.git_dir).await
    }

    pub(crate) async fn load_config(&self) -> Result<RepoConfig> {
        RepoConfig::load(self.fs.as_ref(), &self.git_dir).await
    }

    pub(crate) async fn save_config(&self, config: &RepoConfig) -> Result<()> {
        config.save(self.fs.as_ref(), &self.git_dir).await
    }

    /// Resolve a commit id, `HEAD`, a branch, a remote-tracking branch or a
    /// fully qualified ref
    pub async fn resolve(&self, reference: &str) -> Result<Option<ObjectId>> {
        if is_object_id(reference) {
            return Ok(Some(ObjectId::parse(reference)?));
        }
        if reference == HEAD {
            return self.refs.read(HEAD).await;
        }
        let mut candidates = Vec::new();
        if reference.starts_with("refs/") {
            candidates.push(reference.to_string());
        }
        candidates.push(format!("refs/{}", reference));
        candidates.push(branch_ref(reference));
        candidates.push(format!("{}{}", REMOTES_PREFIX, reference));
        for candidate in candidates {
            if validate_ref_name(&candidate).is_err() {
                continue;
            }
            if let Some(id) = self.refs.read(&candidate).await? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    async fn resolve_existing(&self, reference: &str) -> Result<ObjectId> {
        self.resolve(reference)
            .await?
            .ok_or_else(|| EngineError::NotFound(reference.to_string()))
    }

    /// Tree of HEAD, empty while the current branch is unborn
    async fn head_tree(&self) -> Result<Tree> {
        match self.refs.read(HEAD).await? {
            Some(id) => self.odb.commit_tree(&id).await,
            None => Ok(Tree::new()),
        }
    }

    /// Blob id of a working-directory file, `None` if absent or not a file
    async fn workdir_blob(&self, filepath: &str) -> Result<Option<ObjectId>> {
        let path = self.workdir_path(filepath);
        match self.fs.stat(&path).await {
            Ok(stat) if stat.is_file() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let content = self.fs.read_file(&path, ReadOptions::default()).await?;
        Ok(Some(blob_id(&content.into_bytes())))
    }

    pub async fn init(&self, default_branch: &str) -> Result<()> {
        if self.refs.head().await?.is_some() {
            tracing::debug!("Repository already exists in {}", self.git_dir);
            return Ok(());
        }
        let head = branch_ref(default_branch);
        validate_ref_name(&head)?;
        self.refs.set_head(&Head::Symbolic(head)).await?;
        let config = RepoConfig {
            core: CoreSection {
                bare: false,
                default_branch: default_branch.to_string(),
            },
            ..Default::default()
        };
        self.save_config(&config).await?;
        tracing::debug!("Initialized repository in {}", self.git_dir);
        Ok(())
    }

    /// Create a branch. On an unborn HEAD without an explicit start point
    /// only HEAD is moved; the ref appears with the first commit.
    pub async fn branch(&self, options: BranchOptions) -> Result<()> {
        let name = branch_ref(&options.reference);
        validate_ref_name(&name)?;
        if self.refs.exists(&name).await? {
            return Err(EngineError::AlreadyExists(options.reference));
        }
        let start = match &options.object {
            Some(object) => Some(self.resolve_existing(object).await?),
            None => self.refs.read(HEAD).await?,
        };
        if let Some(id) = start {
            self.refs.write(&name, &id).await?;
        }
        if options.checkout {
            self.refs.set_head(&Head::Symbolic(name)).await?;
        }
        Ok(())
    }

    pub async fn current_branch(&self) -> Result<Option<String>> {
        Ok(match self.refs.head().await? {
            Some(Head::Symbolic(target)) => Some(
                target
                    .strip_prefix(HEADS_PREFIX)
                    .unwrap_or(&target)
                    .to_string(),
            ),
            _ => None,
        })
    }

    pub async fn list_branches(&self) -> Result<Vec<String>> {
        Ok(self
            .refs
            .list(HEADS_PREFIX)
            .await?
            .into_iter()
            .filter_map(|name| name.strip_prefix(HEADS_PREFIX).map(String::from))
            .collect())
    }

    pub async fn list_remotes(&self) -> Result<Vec<RemoteEntry>> {
        let config = self.load_config().await?;
        Ok(config
            .remotes
            .into_iter()
            .map(|(remote, section)| RemoteEntry {
                remote,
                url: section.url,
            })
            .collect())
    }

    pub async fn add_remote(&self, remote: &str, url: &str, force: bool) -> Result<()> {
        let mut config = self.load_config().await?;
        if config.remotes.contains_key(remote) && !force {
            return Err(EngineError::AlreadyExists(format!("remote {}", remote)));
        }
        config.remotes.insert(
            remote.to_string(),
            RemoteSection {
                url: url.to_string(),
            },
        );
        self.save_config(&config).await
    }

    /// Files of a working-directory subtree, control directory excluded
    async fn collect_files(&self, dir: &str) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_string()];
        while let Some(dir) = pending.pop() {
            for name in self.fs.readdir(&dir).await? {
                let path = resolve_path(&[dir.as_str(), name.as_str()]);
                if is_within(&self.git_dir, &path) {
                    continue;
                }
                if self.fs.stat(&path).await?.is_directory() {
                    pending.push(path);
                } else {
                    files.push(relative_to(&self.work_dir, &path));
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Stage a file, every file of a directory, or the removal of a
    /// tracked file that no longer exists. Untracked ignored files are
    /// skipped.
    pub async fn add(&self, filepath: &str) -> Result<()> {
        let filepath = resolve_path(&[filepath]);
        let path = self.workdir_path(&filepath);
        let mut index = self.load_index().await?;

        let targets = match self.fs.stat(&path).await {
            Ok(stat) if stat.is_directory() => self.collect_files(&path).await?,
            Ok(_) => vec![filepath.clone()],
            Err(e) if e.is_not_found() => {
                if index.entries.remove(&filepath).is_none() {
                    return Err(EngineError::NotFound(filepath));
                }
                tracing::trace!("Staged removal of {}", filepath);
                return self.save_index(&index).await;
            }
            Err(e) => return Err(e.into()),
        };

        for target in targets {
            if index.get(&target).is_none() && self.is_ignored(&target).await? {
                tracing::debug!("Not staging ignored file {}", target);
                continue;
            }
            let content = self
                .fs
                .read_file(&self.workdir_path(&target), ReadOptions::default())
                .await?;
            let id = self
                .odb
                .write(&Object::Blob(content.into_bytes().to_vec()))
                .await?;
            tracing::trace!("Staged {} as {}", target, id);
            index.entries.insert(target, id);
        }
        self.save_index(&index).await
    }

    pub async fn commit(&self, options: CommitOptions) -> Result<String> {
        // `None` means HEAD is detached and moves itself
        let target = match options.reference.as_deref() {
            None | Some(HEAD) => match self.refs.head().await? {
                Some(Head::Symbolic(target)) => Some(target),
                Some(Head::Detached(_)) => None,
                None => return Err(EngineError::NotFound(HEAD.to_string())),
            },
            Some(reference) if is_object_id(reference) => {
                return Err(EngineError::Backend(format!(
                    "Cannot commit onto object id {}",
                    reference
                )));
            }
            Some(reference) => Some(qualify(reference)),
        };

        let parent = match &target {
            Some(target) => match self.refs.read(target).await? {
                Some(id) => Some(id),
                None => self.refs.read(HEAD).await?,
            },
            None => self.refs.read(HEAD).await?,
        };

        let index = self.load_index().await?;
        let tree_id = self.odb.write(&Object::Tree(index.to_tree())).await?;
        let commit = Commit::new(
            tree_id,
            parent.into_iter().collect(),
            Signature::now(&self.author),
            &options.message,
        );
        let id = self.odb.write(&Object::Commit(commit)).await?;

        match &target {
            Some(target) => self.refs.write(target, &id).await?,
            None => self.refs.set_head(&Head::Detached(id)).await?,
        }
        tracing::debug!(
            "Committed {} on {}",
            id,
            target.as_deref().unwrap_or(HEAD)
        );
        Ok(id.to_hex())
    }

    /// Commits reachable from `reference`, newest first
    pub async fn log(&self, reference: &str, depth: Option<usize>) -> Result<Vec<CommitEntry>> {
        let start = self.resolve_existing(reference).await?;
        let mut seen = HashSet::from([start]);
        let mut pending = vec![(start, self.odb.read_commit(&start).await?)];
        let mut entries = Vec::new();

        while depth.is_none_or(|d| entries.len() < d) {
            // Newest pending commit first; ties keep discovery order.
            let Some(next) = pending
                .iter()
                .enumerate()
                .max_by(|(ia, (_, a)), (ib, (_, b))| {
                    a.author.timestamp.cmp(&b.author.timestamp).then(ib.cmp(ia))
                })
                .map(|(i, _)| i)
            else {
                break;
            };
            let (id, commit) = pending.remove(next);
            for parent in &commit.parents {
                if seen.insert(*parent) && self.odb.contains(parent).await? {
                    pending.push((*parent, self.odb.read_commit(parent).await?));
                }
            }
            entries.push(CommitEntry {
                oid: id.to_hex(),
                commit: commit.to_data(),
            });
        }
        Ok(entries)
    }

    pub async fn is_ignored(&self, filepath: &str) -> Result<bool> {
        let path = self.workdir_path(filepath);
        if is_within(&self.git_dir, &path) {
            return Ok(true);
        }
        let is_dir = match self.fs.stat(&path).await {
            Ok(stat) => stat.is_directory(),
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e.into()),
        };
        let filepath = relative_to(&self.work_dir, &path);
        let rules = IgnoreRules::load(self.fs.as_ref(), &self.work_dir, &filepath).await?;
        Ok(rules.is_ignored(&filepath, is_dir))
    }

    pub async fn status(&self, filepath: &str) -> Result<String> {
        let filepath = resolve_path(&[filepath]);
        let head_tree = self.head_tree().await?;
        let index = self.load_index().await?;
        let head = head_tree.get(&filepath).map(|entry| &entry.id);
        let staged = index.get(&filepath);
        if head.is_none() && staged.is_none() && self.is_ignored(&filepath).await? {
            return Ok(IGNORED.to_string());
        }
        let workdir = self.workdir_blob(&filepath).await?;
        Ok(status_code(head, staged, workdir.as_ref()).to_string())
    }

    /// Paths whose uncommitted content a checkout of `target` would destroy
    async fn checkout_conflicts(&self, index: &Index, target: &Tree) -> Result<Vec<String>> {
        let paths: BTreeSet<&String> = index.entries.keys().chain(target.entries.keys()).collect();
        let mut conflicts = Vec::new();
        for path in paths {
            let staged = index.get(path);
            let wanted = target.get(path).map(|entry| &entry.id);
            if staged == wanted {
                continue;
            }
            let current = self.workdir_blob(path).await?;
            if current.as_ref() != staged && current.as_ref() != wanted {
                conflicts.push(path.clone());
            }
        }
        Ok(conflicts)
    }

    /// Remove the now empty directories between `path` and the working
    /// directory root
    async fn prune_empty_dirs(&self, path: &str) -> Result<()> {
        let mut current = parent(path);
        while let Some(dir) = current {
            if !is_within(&self.work_dir, &dir) || dir == self.work_dir {
                break;
            }
            if !self.fs.readdir(&dir).await?.is_empty() {
                break;
            }
            self.fs.rmdir(&dir).await?;
            current = parent(&dir);
        }
        Ok(())
    }

    pub async fn checkout(&self, options: CheckoutOptions) -> Result<()> {
        let reference = options.reference.as_str();
        let remote = options.remote.as_deref().unwrap_or(DEFAULT_REMOTE);

        let branch = if is_object_id(reference)
            || reference == HEAD
            || (reference.starts_with("refs/") && !reference.starts_with(HEADS_PREFIX))
        {
            None
        } else {
            Some(branch_ref(reference))
        };

        let mut target = None;
        if let Some(branch) = &branch {
            if let Some(id) = self.refs.read(branch).await? {
                target = Some((id, Head::Symbolic(branch.clone())));
            }
        }
        if target.is_none() && reference == HEAD {
            if let (Some(head), Some(id)) = (self.refs.head().await?, self.refs.read(HEAD).await?) {
                target = Some((id, head));
            }
        }
        if target.is_none() && branch.is_none() {
            if let Some(id) = self.resolve(reference).await? {
                target = Some((id, Head::Detached(id)));
            }
        }
        if target.is_none() {
            if let Some(branch) = &branch {
                // Create the local branch from its remote-tracking counterpart.
                if let Some(id) = self.refs.read(&refs::remote_ref(remote, branch)).await? {
                    self.refs.write(branch, &id).await?;
                    target = Some((id, Head::Symbolic(branch.clone())));
                }
            }
        }
        let Some((commit_id, head)) = target else {
            return Err(EngineError::NotFound(reference.to_string()));
        };

        let tree = self.odb.commit_tree(&commit_id).await?;
        let index = self.load_index().await?;
        if !options.force {
            let conflicts = self.checkout_conflicts(&index, &tree).await?;
            if !conflicts.is_empty() {
                return Err(EngineError::CheckoutConflict(conflicts));
            }
        }

        for path in index.entries.keys() {
            if tree.entries.contains_key(path) {
                continue;
            }
            let full_path = self.workdir_path(path);
            if self.fs.exists(&full_path).await? {
                self.fs.unlink(&full_path).await?;
                self.prune_empty_dirs(&full_path).await?;
            }
        }
        for (path, entry) in &tree.entries {
            if self.workdir_blob(path).await? == Some(entry.id) {
                continue;
            }
            let data = self.odb.read_blob(&entry.id).await?;
            self.fs.write_file(&self.workdir_path(path), data.into()).await?;
        }
        self.save_index(&Index::from_tree(&tree)).await?;
        self.refs.set_head(&head).await?;

        if let (true, Head::Symbolic(branch)) = (options.track, &head) {
            let name = branch.strip_prefix(HEADS_PREFIX).unwrap_or(branch).to_string();
            let mut config = self.load_config().await?;
            config.branches.insert(
                name,
                BranchSection {
                    remote: remote.to_string(),
                    merge: branch.clone(),
                },
            );
            self.save_config(&config).await?;
        }
        tracing::debug!("Checked out {} ({})", reference, commit_id);
        Ok(())
    }

    pub async fn write_ref(&self, reference: &str, value: &str, force: bool) -> Result<()> {
        if is_object_id(reference) {
            return Err(EngineError::Backend(format!("Invalid ref name '{}'", reference)));
        }
        let id = self.resolve_existing(value).await?;
        if reference == HEAD {
            return self.refs.set_head(&Head::Detached(id)).await;
        }
        let name = qualify(reference);
        if !force && self.refs.exists(&name).await? {
            return Err(EngineError::AlreadyExists(name));
        }
        self.refs.write(&name, &id).await
    }

    pub async fn resolve_ref(&self, reference: &str) -> Result<String> {
        Ok(self.resolve_existing(reference).await?.to_hex())
    }
}
