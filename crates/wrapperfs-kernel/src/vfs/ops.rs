//! VFS operations trait.
//!
//! One method per filesystem verb a bridge can dispatch. Paths are virtual
//! paths exactly as the bridge received them: relative to the mounted root
//! and starting with `/`.

use std::ffi::OsStr;

use async_trait::async_trait;

use super::types::{EntrySink, FileAttr, FileHandleId, SetTimes, StatFs};
use super::VfsResult;

/// Core VFS operations trait.
///
/// Every method either succeeds or returns the errno of the host call that
/// failed. Nothing is retried.
#[async_trait]
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Lookup and listing
    // ========================================================================

    /// Get file attributes. Symlinks are followed.
    async fn getattr(&self, path: &OsStr) -> VfsResult<FileAttr>;

    /// Get file attributes of `path` itself. A symlink reports its own
    /// attributes, so this succeeds where [`getattr`](Self::getattr) fails
    /// on a dangling link.
    async fn getattr_nofollow(&self, path: &OsStr) -> VfsResult<FileAttr>;

    /// List a directory into `sink`: `.` and `..` first, then every entry the
    /// host reports.
    async fn readdir(&self, path: &OsStr, sink: &mut (dyn EntrySink + Send)) -> VfsResult<()>;

    /// Check access permission (`R_OK`/`W_OK`/`X_OK`/`F_OK` bits).
    async fn access(&self, path: &OsStr, mask: i32) -> VfsResult<()>;

    /// Get filesystem statistics for the host filesystem holding `path`.
    async fn statfs(&self, path: &OsStr) -> VfsResult<StatFs>;

    // ========================================================================
    // Open-file lifecycle
    // ========================================================================

    /// Open an existing file with the bridge's open flags.
    async fn open(&self, path: &OsStr, flags: i32) -> VfsResult<FileHandleId>;

    /// Create (or truncate) and open a file.
    async fn create(&self, path: &OsStr, mode: u32) -> VfsResult<FileHandleId>;

    /// Read up to `size` bytes at `offset`. Fewer bytes means end of data.
    async fn read(&self, fh: FileHandleId, offset: u64, size: u32) -> VfsResult<Vec<u8>>;

    /// Write `data` at `offset`. Returns the number of bytes written.
    async fn write(&self, fh: FileHandleId, offset: u64, data: &[u8]) -> VfsResult<u32>;

    /// Close the descriptor behind `fh`. The id is dead afterwards.
    async fn release(&self, fh: FileHandleId) -> VfsResult<()>;

    // ========================================================================
    // Metadata changes
    // ========================================================================

    /// Change permission bits.
    async fn chmod(&self, path: &OsStr, mode: u32) -> VfsResult<()>;

    /// Change owner and/or group. `None` leaves that id unchanged.
    async fn chown(&self, path: &OsStr, uid: Option<u32>, gid: Option<u32>) -> VfsResult<()>;

    /// Set access/modification times.
    async fn utimens(&self, path: &OsStr, times: SetTimes) -> VfsResult<()>;

    /// Truncate or extend a file to `size` bytes.
    async fn truncate(&self, path: &OsStr, size: u64) -> VfsResult<()>;

    // ========================================================================
    // Namespace changes
    // ========================================================================

    /// Create a directory.
    async fn mkdir(&self, path: &OsStr, mode: u32) -> VfsResult<()>;

    /// Remove a file.
    async fn unlink(&self, path: &OsStr) -> VfsResult<()>;

    /// Remove an empty directory.
    async fn rmdir(&self, path: &OsStr) -> VfsResult<()>;

    /// Rename a file or directory.
    async fn rename(&self, from: &OsStr, to: &OsStr) -> VfsResult<()>;

    /// Create a hard link at `newpath` to the existing `oldpath`.
    async fn link(&self, oldpath: &OsStr, newpath: &OsStr) -> VfsResult<()>;

    /// Create a symlink at `link` pointing to `target`.
    ///
    /// An absolute `target` lies outside the mount and is used verbatim; a
    /// relative one lies inside it and is re-based under the base directory.
    async fn symlink(&self, target: &OsStr, link: &OsStr) -> VfsResult<()>;
}
