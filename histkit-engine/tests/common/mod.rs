//! Shared helpers for the workflow tests
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use histkit_core::path::is_within;
use histkit_core::storage::{FilesApi, ListOptions};
use histkit_core::transport::Transport;
use histkit_core::{GitHistory, GitHistoryBuilder};
use histkit_engine::{RefEngine, RemoteHub};
use histkit_storage::MemFilesApi;

pub const HUB_URL: &str = "http://hub.local";

/// Builder with an engine, a transport and a user already set
pub fn builder(files: Arc<MemFilesApi>, transport: Arc<dyn Transport>) -> GitHistoryBuilder {
    GitHistory::builder()
        .engine(Arc::new(RefEngine::new()))
        .transport(transport)
        .files(files)
        .user_name("JohnSmith")
        .user_email("john.smith@foo.bar")
}

/// Transport for tests that never reach a server
pub fn offline() -> Arc<dyn Transport> {
    Arc::new(RemoteHub::new(HUB_URL, Arc::new(MemFilesApi::new())))
}

pub fn new_history(files: Arc<MemFilesApi>) -> GitHistory {
    builder(files, offline()).build().unwrap()
}

pub async fn write_files(files: &dyn FilesApi, entries: &[(&str, &str)]) {
    for (path, content) in entries {
        let chunks = stream::iter(vec![Ok(Bytes::from(content.to_string()))]).boxed();
        files.write(path, chunks).await.unwrap();
    }
}

pub async fn read_text(files: &dyn FilesApi, path: &str) -> Option<String> {
    files.stats(path).await.unwrap()?;
    let chunks: Vec<Bytes> = files.read(path).try_collect().await.unwrap();
    Some(String::from_utf8(chunks.concat()).unwrap())
}

/// Absolute path -> status of every scanned file
pub async fn statuses(history: &GitHistory) -> BTreeMap<String, String> {
    history
        .get_files_status(None)
        .await
        .unwrap()
        .map_ok(|record| (record.full_path, record.status))
        .try_collect()
        .await
        .unwrap()
}

/// Files of the working tree, control directory excluded
pub async fn workspace_files(history: &GitHistory) -> Vec<String> {
    let git_dir = history.git_dir().to_string();
    let entries: Vec<_> = history
        .files()
        .list(history.work_dir(), ListOptions { recursive: true })
        .try_collect()
        .await
        .unwrap();
    let mut files: Vec<String> = entries
        .into_iter()
        .filter(|info| info.is_file() && !is_within(&git_dir, &info.path))
        .map(|info| info.path)
        .collect();
    files.sort();
    files
}
