//! Engine filesystem contract over the in-memory backend

use std::sync::Arc;

use bytes::Bytes;
use histkit_core::fs::{Chunk, EngineFs, FileContent, FsError, ReadOptions, StorageFs, WriteData};
use histkit_storage::MemFilesApi;
use tokio_util::sync::CancellationToken;

fn bridge(files: MemFilesApi) -> StorageFs {
    StorageFs::new(Arc::new(files))
}

#[tokio::test]
async fn test_write_then_read() {
    let fs = bridge(MemFilesApi::new());
    fs.write_file("/docs/a.md", "Hello".into()).await.unwrap();

    let bytes = fs.read_file("/docs/a.md", ReadOptions::default()).await.unwrap();
    assert_eq!(bytes, FileContent::Bytes(Bytes::from_static(b"Hello")));

    let text = fs.read_file("/docs/a.md", ReadOptions::utf8()).await.unwrap();
    assert_eq!(text, FileContent::Text("Hello".to_string()));
}

#[tokio::test]
async fn test_write_chunks() {
    let fs = bridge(MemFilesApi::new());
    let data = WriteData::Chunks(vec![
        Chunk::Text("abc".to_string()),
        Chunk::Bytes(Bytes::from_static(b"def")),
    ]);
    fs.write_file("/a.txt", data).await.unwrap();
    let content = fs.read_file("/a.txt", ReadOptions::utf8()).await.unwrap();
    assert_eq!(content.into_text(), "abcdef");
}

#[tokio::test]
async fn test_chunked_reads_are_merged() {
    let files = MemFilesApi::with_files([("/big.txt", "0123456789abcdef")])
        .unwrap()
        .with_chunk_size(3);
    let fs = bridge(files);
    let content = fs.read_file("/big.txt", ReadOptions::default()).await.unwrap();
    assert_eq!(content.into_bytes(), Bytes::from_static(b"0123456789abcdef"));
}

#[tokio::test]
async fn test_empty_file() {
    let fs = bridge(MemFilesApi::new());
    fs.write_file("/empty", WriteData::Bytes(Bytes::new()))
        .await
        .unwrap();
    let content = fs.read_file("/empty", ReadOptions::default()).await.unwrap();
    assert!(content.is_empty());
    assert_eq!(fs.stat("/empty").await.unwrap().size, 0);
}

#[tokio::test]
async fn test_missing_paths() {
    let fs = bridge(MemFilesApi::new());
    let err = fs
        .read_file("/nope.md", ReadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::NotFound(_)));
    assert_eq!(err.code(), "ENOENT");

    let err = fs.stat("/nope.md").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!fs.exists("/nope.md").await.unwrap());
    assert!(fs.readdir("/nowhere").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reading_a_directory_fails() {
    let fs = bridge(MemFilesApi::with_files([("/dir/a.md", "a")]).unwrap());
    let err = fs.read_file("/dir", ReadOptions::default()).await.unwrap_err();
    assert!(matches!(err, FsError::NotAFile(_)));
}

#[tokio::test]
async fn test_cancelled_read_aborts() {
    let files = MemFilesApi::with_files([("/a.txt", "some content")])
        .unwrap()
        .with_chunk_size(4);
    let fs = bridge(files);
    let signal = CancellationToken::new();
    signal.cancel();
    let err = fs
        .read_file(
            "/a.txt",
            ReadOptions {
                encoding: None,
                signal: Some(signal),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::Aborted(_)));
    assert_eq!(err.code(), "ABORT_ERR");

    // A live token does not interfere.
    let content = fs
        .read_file(
            "/a.txt",
            ReadOptions {
                encoding: None,
                signal: Some(CancellationToken::new()),
            },
        )
        .await
        .unwrap();
    assert_eq!(content.into_text(), "some content");
}

#[tokio::test]
async fn test_cancelled_read_of_empty_file_aborts() {
    let fs = bridge(MemFilesApi::with_files([("/empty.txt", "")]).unwrap());
    let signal = CancellationToken::new();
    signal.cancel();
    let err = fs
        .read_file(
            "/empty.txt",
            ReadOptions {
                encoding: None,
                signal: Some(signal),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::Aborted(_)));
}

#[tokio::test]
async fn test_directory_operations() {
    let fs = bridge(
        MemFilesApi::with_files([("/dir/b.md", "b"), ("/dir/a.md", "a"), ("/dir/sub/c.md", "c")])
            .unwrap(),
    );
    assert_eq!(fs.readdir("/dir").await.unwrap(), vec!["a.md", "b.md", "sub"]);
    assert!(fs.stat("/dir/sub").await.unwrap().is_directory());
    assert!(fs.stat("/dir/a.md").await.unwrap().is_file());

    fs.mkdir("/other").await.unwrap();
    fs.unlink("/dir/a.md").await.unwrap();
    assert_eq!(fs.readdir("/dir").await.unwrap(), vec!["b.md", "sub"]);

    fs.rmdir("/dir/sub").await.unwrap();
    assert!(!fs.exists("/dir/sub/c.md").await.unwrap());
    assert_eq!(fs.readdir("/dir").await.unwrap(), vec!["b.md"]);
}

#[tokio::test]
async fn test_links_and_modes_are_unsupported() {
    let fs = bridge(MemFilesApi::with_files([("/a.md", "a")]).unwrap());
    let lstat = fs.lstat("/a.md").await.unwrap();
    assert!(lstat.is_file());
    assert!(!lstat.is_symbolic_link());

    for err in [
        fs.readlink("/a.md").await.unwrap_err(),
        fs.symlink("/a.md", "/b.md").await.unwrap_err(),
        fs.chmod("/a.md", 0o755).await.unwrap_err(),
    ] {
        assert_eq!(err.code(), "ENOTSUP");
    }
}
