//! Workflow tests: initialization, saves, status and checkout

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{builder, new_history, offline, read_text, statuses, write_files};
use futures::TryStreamExt;
use histkit_core::storage::FilesApi;
use histkit_core::{FileInfo, FileKind, GitHistory, SaveOptions, SaveResult};
use histkit_engine::RefEngine;
use histkit_storage::MemFilesApi;

fn status_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(path, status)| (path.to_string(), status.to_string()))
        .collect()
}

#[tokio::test]
async fn test_builder_reports_missing_collaborators() {
    let files = Arc::new(MemFilesApi::new());

    let err = GitHistory::builder()
        .transport(offline())
        .files(files.clone())
        .user_name("JohnSmith")
        .build()
        .err()
        .unwrap();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("The version-control engine is not defined"));

    let err = GitHistory::builder()
        .engine(Arc::new(RefEngine::new()))
        .transport(offline())
        .user_name("JohnSmith")
        .build()
        .err()
        .unwrap();
    assert!(err.to_string().contains("FilesApi is not defined"));

    let err = GitHistory::builder()
        .engine(Arc::new(RefEngine::new()))
        .transport(offline())
        .files(files.clone())
        .build()
        .err()
        .unwrap();
    assert!(err.to_string().contains("The user's name is not defined"));

    let err = builder(files, offline()).working_branch("").build().err().unwrap();
    assert!(err.to_string().contains("The user's branch is not defined"));
}

#[tokio::test]
async fn test_directories() {
    let files = Arc::new(MemFilesApi::new());
    let history = new_history(files.clone());
    assert_eq!(history.work_dir(), "/");
    assert_eq!(history.git_dir(), "/.git");

    let history = builder(files.clone(), offline()).work_dir("/a/b/c").build().unwrap();
    assert_eq!(history.work_dir(), "/a/b/c");
    assert_eq!(history.git_dir(), "/a/b/c/.git");

    let history = builder(files.clone(), offline())
        .work_dir("a/b/c/")
        .git_dir(".xyz")
        .build()
        .unwrap();
    assert_eq!(history.work_dir(), "/a/b/c");
    assert_eq!(history.git_dir(), "/.xyz");
}

#[tokio::test]
async fn test_init_creates_control_directory() {
    let files = Arc::new(MemFilesApi::new());
    let history = builder(files.clone(), offline()).work_dir("/abc").build().unwrap();

    assert!(files.stats("/abc/.git").await.unwrap().is_none());
    history.init().await.unwrap();

    let dir = files.stats("/abc/.git").await.unwrap().unwrap();
    assert_eq!(dir.path, "/abc/.git");
    assert_eq!(dir.kind, FileKind::Directory);

    let config = files.stats("/abc/.git/config").await.unwrap().unwrap();
    assert_eq!(config.kind, FileKind::File);
    assert_eq!(config.path, "/abc/.git/config");

    // The placeholder seeds the first commit.
    let placeholder = files.stats("/abc/.gitkeep").await.unwrap().unwrap();
    assert_eq!(placeholder.size, 0);
}

#[tokio::test]
async fn test_init_creates_both_branches() {
    let history = new_history(Arc::new(MemFilesApi::new()));
    assert_eq!(history.get_branches().await.unwrap(), vec!["main", "private"]);
    assert_eq!(
        history.get_current_branch().await.unwrap().as_deref(),
        Some("private")
    );

    let log = history.get_log().await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].commit.message, "Initial commit\n");
    assert_eq!(log[0].commit.author.name, "JohnSmith");
    assert_eq!(log[0].commit.author.email, "john.smith@foo.bar");
    assert!(log[0].commit.parent.is_empty());
}

#[tokio::test]
async fn test_custom_branch_names() {
    let history = builder(Arc::new(MemFilesApi::new()), offline())
        .main_branch("shared")
        .working_branch("john-smith")
        .build()
        .unwrap();
    assert_eq!(
        history.get_branches().await.unwrap(),
        vec!["john-smith", "shared"]
    );
    assert_eq!(
        history.get_current_branch().await.unwrap().as_deref(),
        Some("john-smith")
    );
}

#[tokio::test]
async fn test_init_runs_once() {
    let files = Arc::new(MemFilesApi::new());
    let history = new_history(files.clone());
    let (a, b) = tokio::join!(history.init(), history.init());
    a.unwrap();
    b.unwrap();
    history.init().await.unwrap();
    assert_eq!(history.get_log().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reopening_keeps_history() {
    let files = Arc::new(MemFilesApi::new());
    let first = new_history(files.clone());
    write_files(files.as_ref(), &[("/abc.md", "abc")]).await;
    first.save_files(SaveOptions::default()).await.unwrap();

    let second = new_history(files.clone());
    let log = second.get_log().await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].commit.message, "abc.md\n");
    assert_eq!(second.get_branches().await.unwrap(), vec!["main", "private"]);
}

#[tokio::test]
async fn test_status_follows_save_and_modify() {
    let files = Arc::new(MemFilesApi::new());
    write_files(files.as_ref(), &[("/abc/index.md", "Hello world")]).await;
    let history = builder(files.clone(), offline())
        .work_dir("/abc")
        .git_dir("/abc/.git")
        .build()
        .unwrap();
    history.init().await.unwrap();

    let index = files.stats("/abc/index.md").await.unwrap().unwrap();
    assert_eq!(index.size, 11);
    assert_eq!(index.content_type.as_deref(), Some("text/markdown"));

    assert_eq!(
        statuses(&history).await,
        status_map(&[("/abc/.gitkeep", "unmodified"), ("/abc/index.md", "*added")])
    );

    let saved = history.save_files(SaveOptions::default()).await.unwrap();
    assert_eq!(saved.files, vec!["index.md"]);
    assert!(saved.commit_id.is_some());
    assert_eq!(
        history.get_current_branch().await.unwrap().as_deref(),
        Some("private")
    );
    assert_eq!(
        statuses(&history).await,
        status_map(&[("/abc/.gitkeep", "unmodified"), ("/abc/index.md", "unmodified")])
    );

    write_files(files.as_ref(), &[("/abc/index.md", "Hello world 123")]).await;
    assert_eq!(
        statuses(&history).await,
        status_map(&[("/abc/.gitkeep", "unmodified"), ("/abc/index.md", "*modified")])
    );

    history.save_files(SaveOptions::default()).await.unwrap();
    assert_eq!(
        statuses(&history).await,
        status_map(&[("/abc/.gitkeep", "unmodified"), ("/abc/index.md", "unmodified")])
    );
    assert_eq!(
        history.get_current_branch().await.unwrap().as_deref(),
        Some("private")
    );
    assert_eq!(history.get_log().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_save_message_lists_files() {
    let files = Arc::new(MemFilesApi::new());
    let history = new_history(files.clone());
    history.init().await.unwrap();
    write_files(files.as_ref(), &[("/abc.md", "abc"), ("/efg.md", "efg")]).await;

    let saved = history.save_files(SaveOptions::default()).await.unwrap();
    assert_eq!(saved.files, vec!["abc.md", "efg.md"]);

    let log = history.get_log().await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].commit.message, "abc.md\nefg.md\n");
    assert_eq!(Some(log[0].oid.clone()), saved.commit_id);
    assert_eq!(log[0].commit.parent, vec![log[1].oid.clone()]);

    write_files(files.as_ref(), &[("/abc.md", "abc 2")]).await;
    history
        .save_files(SaveOptions {
            message: Some("Update abc".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    let log = history.get_log().await.unwrap();
    assert_eq!(log[0].commit.message, "Update abc\n\nabc.md\n");
}

#[tokio::test]
async fn test_save_without_changes() {
    let history = new_history(Arc::new(MemFilesApi::new()));
    let saved = history.save_files(SaveOptions::default()).await.unwrap();
    assert_eq!(saved, SaveResult::default());
    assert_eq!(history.get_log().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_save_with_filter() {
    let files = Arc::new(MemFilesApi::new());
    let history = new_history(files.clone());
    write_files(
        files.as_ref(),
        &[("/docs/a.md", "a"), ("/docs/b.txt", "b"), ("/src/c.md", "c")],
    )
    .await;

    let saved = history
        .save_files(SaveOptions {
            filter: Some(Arc::new(|info: &FileInfo| {
                info.path.starts_with("/docs") && (info.is_directory() || info.name.ends_with(".md"))
            })),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(saved.files, vec!["docs/a.md"]);

    let status = statuses(&history).await;
    assert_eq!(status["/docs/a.md"], "unmodified");
    assert_eq!(status["/docs/b.txt"], "*added");
    assert_eq!(status["/src/c.md"], "*added");
}

#[tokio::test]
async fn test_ignored_files_are_not_saved() {
    let files = Arc::new(MemFilesApi::new());
    let history = new_history(files.clone());
    write_files(
        files.as_ref(),
        &[
            ("/.gitignore", "*.txt\n"),
            ("/a.txt", "ignored"),
            ("/abc.md", "abc"),
            ("/efg.md", "efg"),
        ],
    )
    .await;

    let status = statuses(&history).await;
    assert_eq!(status["/a.txt"], "ignored");
    assert_eq!(status["/abc.md"], "*added");
    assert!(history.is_ignored("/a.txt").await.unwrap());
    assert!(!history.is_ignored("/abc.md").await.unwrap());

    let saved = history.save_files(SaveOptions::default()).await.unwrap();
    assert_eq!(saved.files, vec![".gitignore", "abc.md", "efg.md"]);
    assert_eq!(statuses(&history).await["/a.txt"], "ignored");
}

#[tokio::test]
async fn test_custom_control_directory_is_not_scanned() {
    let files = Arc::new(MemFilesApi::new());
    let history = builder(files.clone(), offline()).git_dir("/.xyz").build().unwrap();
    write_files(files.as_ref(), &[("/abc.md", "abc")]).await;

    let records: Vec<_> = history
        .get_files_status(None)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(records.iter().all(|r| !r.full_path.starts_with("/.xyz")));
    assert!(files.stats("/.xyz/HEAD").await.unwrap().is_some());
    assert!(files.stats("/.git").await.unwrap().is_none());

    let saved = history.save_files(SaveOptions::default()).await.unwrap();
    assert_eq!(saved.files, vec!["abc.md"]);
}

#[tokio::test]
async fn test_checkout_restores_saved_versions() {
    let files = Arc::new(MemFilesApi::new());
    let history = new_history(files.clone());

    write_files(files.as_ref(), &[("/notes/today.md", "version 1")]).await;
    let first = history.save_files(SaveOptions::default()).await.unwrap();
    write_files(
        files.as_ref(),
        &[("/notes/today.md", "version 2"), ("/notes/extra.md", "extra")],
    )
    .await;
    history.save_files(SaveOptions::default()).await.unwrap();

    let first_id = first.commit_id.unwrap();
    history.checkout(&first_id).await.unwrap();
    assert_eq!(history.get_current_branch().await.unwrap(), None);
    assert_eq!(
        read_text(files.as_ref(), "/notes/today.md").await.as_deref(),
        Some("version 1")
    );
    assert_eq!(read_text(files.as_ref(), "/notes/extra.md").await, None);
    assert_eq!(history.get_log().await.unwrap()[0].oid, first_id);

    history.checkout("private").await.unwrap();
    assert_eq!(
        history.get_current_branch().await.unwrap().as_deref(),
        Some("private")
    );
    assert_eq!(
        read_text(files.as_ref(), "/notes/today.md").await.as_deref(),
        Some("version 2")
    );
    assert_eq!(
        read_text(files.as_ref(), "/notes/extra.md").await.as_deref(),
        Some("extra")
    );
}

#[tokio::test]
async fn test_checkout_discards_uncommitted_changes() {
    let files = Arc::new(MemFilesApi::new());
    let history = new_history(files.clone());
    write_files(files.as_ref(), &[("/abc.md", "saved")]).await;
    history.save_files(SaveOptions::default()).await.unwrap();

    write_files(files.as_ref(), &[("/abc.md", "draft")]).await;
    history.checkout("main").await.unwrap();
    assert_eq!(read_text(files.as_ref(), "/abc.md").await, None);

    history.checkout("private").await.unwrap();
    assert_eq!(
        read_text(files.as_ref(), "/abc.md").await.as_deref(),
        Some("saved")
    );
}

#[tokio::test]
async fn test_save_to_named_branch() {
    let files = Arc::new(MemFilesApi::new());
    let history = new_history(files.clone());
    write_files(files.as_ref(), &[("/draft.md", "draft")]).await;

    let saved = history
        .save_files(SaveOptions {
            branch_name: Some("drafts".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(saved.files, vec!["draft.md"]);
    assert_eq!(
        history.get_current_branch().await.unwrap().as_deref(),
        Some("drafts")
    );
    assert_eq!(
        history.get_branches().await.unwrap(),
        vec!["drafts", "main", "private"]
    );

    let log = history.get_log().await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].commit.message, "draft.md\n");
}

#[tokio::test]
async fn test_remote_url_configuration() {
    let history = new_history(Arc::new(MemFilesApi::new()));
    assert_eq!(history.get_remote_server_url().await.unwrap(), None);

    let url = "http://localhost:8180/myrepo.git";
    assert_eq!(history.set_remote_server_url(url).await.unwrap(), url);
    assert_eq!(
        history.get_remote_server_url().await.unwrap().as_deref(),
        Some(url)
    );

    let configured = builder(Arc::new(MemFilesApi::new()), offline())
        .remote_url(url)
        .build()
        .unwrap();
    assert_eq!(
        configured.get_remote_server_url().await.unwrap().as_deref(),
        Some(url)
    );
}

#[tokio::test]
async fn test_remote_operations_require_a_url() {
    let history = new_history(Arc::new(MemFilesApi::new()));
    let err = history.send_to_remote().await.unwrap_err();
    assert!(err.is_configuration());
    let err = history.sync_with_remote().await.unwrap_err();
    assert!(err.is_configuration());
}
