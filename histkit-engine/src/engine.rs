//! [`VcsEngine`] implementation of the reference engine

use async_trait::async_trait;
use histkit_core::engine::{
    BranchOptions, CheckoutOptions, CommitEntry, CommitOptions, EngineContext, FetchOptions,
    FetchResult, PushOptions, PushResult, RemoteEntry, Result, VcsEngine,
};
use histkit_core::transport::Transport;

use crate::repository::Repository;

/// Stateless engine: every call opens the repository described by its
/// context, so one instance can serve any number of workspaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefEngine;

impl RefEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VcsEngine for RefEngine {
    async fn init(&self, ctx: &EngineContext, default_branch: &str) -> Result<()> {
        Repository::open(ctx).init(default_branch).await
    }

    async fn branch(&self, ctx: &EngineContext, options: BranchOptions) -> Result<()> {
        Repository::open(ctx).branch(options).await
    }

    async fn checkout(&self, ctx: &EngineContext, options: CheckoutOptions) -> Result<()> {
        Repository::open(ctx).checkout(options).await
    }

    async fn commit(&self, ctx: &EngineContext, options: CommitOptions) -> Result<String> {
        Repository::open(ctx).commit(options).await
    }

    async fn add(&self, ctx: &EngineContext, filepath: &str) -> Result<()> {
        Repository::open(ctx).add(filepath).await
    }

    async fn log(
        &self,
        ctx: &EngineContext,
        reference: &str,
        depth: Option<usize>,
    ) -> Result<Vec<CommitEntry>> {
        Repository::open(ctx).log(reference, depth).await
    }

    async fn current_branch(&self, ctx: &EngineContext) -> Result<Option<String>> {
        Repository::open(ctx).current_branch().await
    }

    async fn list_branches(&self, ctx: &EngineContext) -> Result<Vec<String>> {
        Repository::open(ctx).list_branches().await
    }

    async fn list_remotes(&self, ctx: &EngineContext) -> Result<Vec<RemoteEntry>> {
        Repository::open(ctx).list_remotes().await
    }

    async fn add_remote(&self, ctx: &EngineContext, remote: &str, url: &str, force: bool) -> Result<()> {
        Repository::open(ctx).add_remote(remote, url, force).await
    }

    async fn status(&self, ctx: &EngineContext, filepath: &str) -> Result<String> {
        Repository::open(ctx).status(filepath).await
    }

    async fn is_ignored(&self, ctx: &EngineContext, filepath: &str) -> Result<bool> {
        Repository::open(ctx).is_ignored(filepath).await
    }

    async fn fetch(
        &self,
        ctx: &EngineContext,
        transport: &dyn Transport,
        options: FetchOptions,
    ) -> Result<FetchResult> {
        Repository::open(ctx).fetch(transport, options).await
    }

    async fn push(
        &self,
        ctx: &EngineContext,
        transport: &dyn Transport,
        options: PushOptions,
    ) -> Result<PushResult> {
        Repository::open(ctx).push(transport, options).await
    }

    async fn write_ref(&self, ctx: &EngineContext, reference: &str, value: &str, force: bool) -> Result<()> {
        Repository::open(ctx).write_ref(reference, value, force).await
    }

    async fn resolve_ref(&self, ctx: &EngineContext, reference: &str) -> Result<String> {
        Repository::open(ctx).resolve_ref(reference).await
    }
}
