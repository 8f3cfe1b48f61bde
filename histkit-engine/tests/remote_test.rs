//! Push and synchronization through an in-process repository hub

mod common;

use std::sync::Arc;

use common::{HUB_URL, builder, read_text, workspace_files, write_files};
use histkit_core::{EngineError, GitHistory, HistoryError, SaveOptions};
use histkit_engine::RemoteHub;
use histkit_storage::MemFilesApi;

const REPO: &str = "team.git";

async fn new_hub() -> Arc<RemoteHub> {
    let hub = RemoteHub::new(HUB_URL, Arc::new(MemFilesApi::new())).with_credentials("admin", "admin");
    hub.create_repository(REPO, "main").await.unwrap();
    Arc::new(hub)
}

fn member(hub: &Arc<RemoteHub>, name: &str, files: Arc<MemFilesApi>) -> GitHistory {
    builder(files, hub.clone())
        .user_name(name)
        .remote_url(hub.url(REPO))
        .credentials("admin", "admin")
        .build()
        .unwrap()
}

/// Commit `files` directly on the shared branch and publish it
async fn publish(history: &GitHistory, files: &MemFilesApi, entries: &[(&str, &str)]) -> String {
    history.checkout(history.main_branch()).await.unwrap();
    write_files(files, entries).await;
    let saved = history.save_files(SaveOptions::default()).await.unwrap();
    let result = history.send_to_remote().await.unwrap();
    assert!(result.ok, "{:?}", result);
    saved.commit_id.unwrap()
}

#[tokio::test]
async fn test_remote_url_from_configuration() {
    let hub = new_hub().await;
    let alice = member(&hub, "alice", Arc::new(MemFilesApi::new()));
    assert_eq!(
        alice.get_remote_server_url().await.unwrap(),
        Some(format!("{}/{}", HUB_URL, REPO))
    );
}

#[tokio::test]
async fn test_push_working_branch() {
    let hub = new_hub().await;
    let files = Arc::new(MemFilesApi::new());
    let alice = member(&hub, "alice", files.clone());
    write_files(files.as_ref(), &[("/draft.md", "draft")]).await;
    let saved = alice.save_files(SaveOptions::default()).await.unwrap();

    let result = alice.send_to_remote().await.unwrap();
    assert!(result.ok);
    assert_eq!(
        result.refs.get("refs/heads/private").map(String::as_str),
        Some("ok")
    );
    assert_eq!(hub.branch_head(REPO, "private").await.unwrap(), saved.commit_id);

    // Pushing again is a no-op.
    let again = alice.send_to_remote().await.unwrap();
    assert!(again.ok);
    assert_eq!(
        again.refs.get("refs/heads/private").map(String::as_str),
        Some("up-to-date")
    );
}

#[tokio::test]
async fn test_sync_mirrors_shared_branch() {
    let hub = new_hub().await;
    let alice_files = Arc::new(MemFilesApi::new());
    let alice = member(&hub, "alice", alice_files.clone());
    let published = publish(&alice, &alice_files, &[("/hello.txt", "Hello")]).await;

    let bob_files = Arc::new(MemFilesApi::new());
    let bob = member(&hub, "bob", bob_files.clone());
    bob.sync_with_remote().await.unwrap();

    assert_eq!(
        bob.get_current_branch().await.unwrap().as_deref(),
        Some("main")
    );
    assert_eq!(workspace_files(&bob).await, vec!["/.gitkeep", "/hello.txt"]);
    assert_eq!(
        read_text(bob_files.as_ref(), "/hello.txt").await.as_deref(),
        Some("Hello")
    );

    let log = bob.get_log().await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].oid, published);
    assert_eq!(log[0].commit.message, "hello.txt\n");
    assert_eq!(log[0].commit.author.name, "alice");

    // Bob contributes on top of the shared branch.
    write_files(bob_files.as_ref(), &[("/toto.txt", "This is a TOTO file!")]).await;
    let saved = bob.save_files(SaveOptions::default()).await.unwrap();
    assert_eq!(saved.files, vec!["toto.txt"]);
    assert!(bob.send_to_remote().await.unwrap().ok);
    assert_eq!(hub.branch_head(REPO, "main").await.unwrap(), saved.commit_id);

    alice.sync_with_remote().await.unwrap();
    assert_eq!(
        read_text(alice_files.as_ref(), "/toto.txt").await.as_deref(),
        Some("This is a TOTO file!")
    );
    assert_eq!(alice.get_log().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_diverged_push_is_rejected_and_sync_discards_local_commits() {
    let hub = new_hub().await;
    let alice_files = Arc::new(MemFilesApi::new());
    let alice = member(&hub, "alice", alice_files.clone());
    publish(&alice, &alice_files, &[("/hello.txt", "Hello")]).await;

    let bob_files = Arc::new(MemFilesApi::new());
    let bob = member(&hub, "bob", bob_files.clone());
    bob.sync_with_remote().await.unwrap();
    write_files(bob_files.as_ref(), &[("/bob.md", "bob")]).await;
    bob.save_files(SaveOptions::default()).await.unwrap();
    assert!(bob.send_to_remote().await.unwrap().ok);

    write_files(alice_files.as_ref(), &[("/alice.md", "alice")]).await;
    alice.save_files(SaveOptions::default()).await.unwrap();
    let err = alice.send_to_remote().await.unwrap_err();
    assert!(matches!(
        err,
        HistoryError::Engine(EngineError::PushRejected(_))
    ));

    alice.sync_with_remote().await.unwrap();
    assert_eq!(
        workspace_files(&alice).await,
        vec!["/.gitkeep", "/bob.md", "/hello.txt"]
    );
    assert_eq!(read_text(alice_files.as_ref(), "/alice.md").await, None);
}

#[tokio::test]
async fn test_credentials_are_required() {
    let hub = new_hub().await;
    let alice_files = Arc::new(MemFilesApi::new());
    let alice = member(&hub, "alice", alice_files.clone());
    publish(&alice, &alice_files, &[("/hello.txt", "Hello")]).await;

    let carol = builder(Arc::new(MemFilesApi::new()), hub.clone())
        .user_name("carol")
        .remote_url(hub.url(REPO))
        .build()
        .unwrap();
    let err = carol.sync_with_remote().await.unwrap_err();
    assert!(err.to_string().contains("401"), "{}", err);

    carol.set_remote_credentials("admin", "wrong");
    assert!(carol.sync_with_remote().await.is_err());

    carol.set_remote_credentials("admin", "admin");
    carol.sync_with_remote().await.unwrap();
    assert_eq!(
        carol.get_current_branch().await.unwrap().as_deref(),
        Some("main")
    );
}

#[tokio::test]
async fn test_sync_with_unknown_repository_fails() {
    let hub = new_hub().await;
    let files = Arc::new(MemFilesApi::new());
    let history = builder(files, hub.clone())
        .remote_url(hub.url("missing.git"))
        .credentials("admin", "admin")
        .build()
        .unwrap();
    let err = history.sync_with_remote().await.unwrap_err();
    assert!(err.to_string().contains("404"), "{}", err);
}
