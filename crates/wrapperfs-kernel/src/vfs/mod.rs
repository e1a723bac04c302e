//! Passthrough VFS.
//!
//! Key components:
//!
//! - [`VfsOps`] - The verb table a bridge dispatches into
//! - [`Passthrough`] - Forwards every verb to the host under the base directory
//! - [`HandleTable`] - Owns the host descriptors behind open-file contexts
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: verbs take virtual paths exactly as the bridge
//!   hands them over. Inode bookkeeping stays in the bridge.
//! - **Descriptors never leave the table**: the bridge only ever sees a
//!   [`FileHandleId`]. Ids are not reused, so a stale id can't reach some
//!   other open file.
//! - **Errors are host errno values**: [`VfsError`] carries the errno of the
//!   failing host call unchanged.

pub mod backends;
mod error;
mod handles;
mod ops;
mod types;

pub use backends::Passthrough;
pub use error::{VfsError, VfsResult};
pub use handles::{FileHandle, HandleTable};
pub use ops::VfsOps;
pub use types::{
    DirEntry, EntrySink, FileAttr, FileHandleId, FileType, SetTimes, StatFs, Timestamp,
};
