//! VFS backends.
//!
//! Backends implement [`VfsOps`](super::VfsOps) against some storage.

mod passthrough;

pub use passthrough::Passthrough;
