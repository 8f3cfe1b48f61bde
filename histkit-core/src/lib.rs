//! histkit Core Library
//!
//! A two-tier history workflow (private working branch + shared branch)
//! layered over a pluggable version-control engine and a streaming
//! file-storage backend:
//! - Path normalization
//! - Storage, engine and transport capability traits
//! - Filesystem bridge exposing storage through the engine's fs contract
//! - Dirty-file scanning
//! - Branch lifecycle, saves, checkout and remote synchronization

pub mod config;
pub mod engine;
pub mod error;
pub mod fs;
pub mod history;
pub mod path;
pub mod remote;
pub mod scanner;
pub mod storage;
pub mod transport;

pub use config::{HistoryConfig, RemoteConfig, Settings, Workspace};
pub use engine::{
    Author, BranchOptions, CheckoutOptions, CommitData, CommitEntry, CommitOptions, EngineContext,
    EngineError, FetchOptions, FetchResult, PushOptions, PushResult, RemoteEntry, VcsEngine,
};
pub use error::{HistoryError, Result};
pub use fs::{Chunk, EngineFs, FileContent, FsError, ReadOptions, Stat, StorageFs, WriteData};
pub use history::{GitHistory, GitHistoryBuilder, SaveOptions, SaveResult};
pub use path::resolve_path;
pub use scanner::{ChangeRecord, DirtyFileScanner, ScanFilter};
pub use storage::{FileInfo, FileKind, FilesApi, ListOptions, StorageError};
pub use transport::{AuthCallback, HttpTransport, Transport, TransportError, TransportRequest, TransportResponse};
