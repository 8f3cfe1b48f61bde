//! Storage backends for histkit
//!
//! - [`MemFilesApi`]: in-memory tree, used by tests and sandboxes
//! - [`LocalFilesApi`]: a directory on the local disk

pub mod local;
pub mod memory;

pub use local::LocalFilesApi;
pub use memory::MemFilesApi;

/// Default size of the chunks yielded by `read`
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
