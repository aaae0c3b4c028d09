//! # fos-core
//!
//! Core library for the file operation service (FOS): a horizontally
//! scalable request processor that manipulates files and directories
//! rooted at a single configured directory, coordinating concurrent
//! appends through an external lock coordinator.
//!
//! ## Subsystems
//!
//! - **Path safety** ([`path`]): lexical resolution and validation of
//!   caller-supplied paths so no operation ever escapes the root.
//! - **Distributed append locking** ([`lock`]): named leases with TTL,
//!   bounded retry, and guaranteed release.
//! - **File operations** ([`ops`]): the typed primitives exposed over
//!   the RPC surface (stat, list, create, delete, move, copy, read,
//!   append).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fos_core::lock::{LockClient, MemoryLockBackend};
//! use fos_core::ops::FileOps;
//! use fos_core::path::RootDir;
//!
//! let root = RootDir::new("/data".into()).unwrap();
//! let locks = LockClient::new(Arc::new(MemoryLockBackend::new()));
//! let ops = FileOps::new(root, locks);
//! let info = ops.stat("documents/report.txt").unwrap();
//! assert_eq!(info.path, "documents/report.txt");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod entry;
pub mod error;
pub mod lock;
pub mod ops;
pub mod path;

pub use entry::EntryInfo;
pub use error::FsError;
pub use ops::FileOps;
pub use path::RootDir;
