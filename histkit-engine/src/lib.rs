//! Reference version-control engine for histkit
//!
//! A compact content-addressed engine that keeps its whole state (objects,
//! refs, index, config) in the control directory and performs every byte of
//! I/O through the engine filesystem contract. It ships with an in-process
//! repository server, [`RemoteHub`], speaking the same wire protocol.

pub mod config;
pub mod engine;
pub mod ignore;
pub mod index;
pub mod object;
pub mod odb;
pub mod protocol;
pub mod refs;
pub mod remote;
pub mod repository;
pub mod server;
pub mod status;

pub use engine::RefEngine;
pub use object::{Commit, Object, ObjectId, ObjectKind, Tree};
pub use repository::Repository;
pub use server::{RemoteHub, RepositoryServer};
