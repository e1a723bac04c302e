//! # wrapperfs-kernel
//!
//! Core of the wrapperfs passthrough filesystem.
//!
//! Every filesystem call a FUSE bridge receives lands here:
//! - [`Config`] holds the one immutable value, the base directory
//! - [`resolve`](mod@resolve) turns a virtual path into a host path under it
//! - [`Passthrough`] forwards each verb to the host and owns the
//!   descriptors produced by `open`/`create` until `release`
//!
//! Nothing in this crate knows about a particular FUSE binding. Bridges drive
//! it through the [`VfsOps`] trait.

pub mod config;
pub mod resolve;
pub mod vfs;

pub use config::{Config, ConfigError};
pub use vfs::{
    backends::Passthrough, DirEntry, EntrySink, FileAttr, FileHandle, FileHandleId, FileType,
    HandleTable, SetTimes, StatFs, Timestamp, VfsError, VfsOps, VfsResult,
};
