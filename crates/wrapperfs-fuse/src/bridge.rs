//! fuse3 path-filesystem bridge.
//!
//! [`FuseBridge`] adapts any [`VfsOps`] implementation to fuse3's
//! [`PathFilesystem`]. fuse3 hands over `(parent, name)` pairs for namespace
//! verbs; the bridge joins them into virtual paths, dispatches, and turns the
//! kernel types back into fuse3 replies. Errors keep their host errno.

use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::os::unix::ffi::OsStrExt;

use bytes::Bytes;
use fuse3::path::prelude::*;
use fuse3::path::reply::{
    DirectoryEntry, DirectoryEntryPlus, FileAttr, ReplyAttr, ReplyCreated, ReplyData,
    ReplyDirectory, ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs, ReplyWrite,
};
use fuse3::{FileType, SetAttr};
use futures::stream::{self, Iter};
use tracing::{debug, info};
use wrapperfs_kernel as kernel;
use wrapperfs_kernel::{FileHandleId, SetTimes, VfsError, VfsOps};

use crate::constants::{MAX_WRITE, TTL};

/// fuse3 adapter over a VFS backend.
#[derive(Debug)]
pub struct FuseBridge<F> {
    ops: F,
}

impl<F: VfsOps> FuseBridge<F> {
    pub fn new(ops: F) -> Self {
        Self { ops }
    }

    /// The wrapped backend.
    pub fn ops(&self) -> &F {
        &self.ops
    }

    async fn entry(&self, path: &OsStr) -> fuse3::Result<ReplyEntry> {
        let attr = self.ops.getattr(path).await.map_err(errno)?;
        Ok(ReplyEntry {
            ttl: TTL,
            attr: file_attr(&attr),
        })
    }

    /// Apply attribute changes one host call at a time, in the order
    /// chmod, chown, truncate, utimens. The first failure stops the rest.
    async fn apply(&self, path: &OsStr, changes: &AttrChanges) -> Result<(), VfsError> {
        if let Some(mode) = changes.mode {
            self.ops.chmod(path, mode).await?;
        }
        if changes.uid.is_some() || changes.gid.is_some() {
            self.ops.chown(path, changes.uid, changes.gid).await?;
        }
        if let Some(size) = changes.size {
            self.ops.truncate(path, size).await?;
        }
        if !changes.times.is_empty() {
            self.ops.utimens(path, changes.times).await?;
        }
        Ok(())
    }

    /// Create and open `path`, then look it up.
    ///
    /// The new handle is released again if the lookup fails, so a failed
    /// create never leaks a descriptor.
    async fn create_at(&self, path: &OsStr, mode: u32) -> Result<(FileHandleId, kernel::FileAttr), VfsError> {
        let fh = self.ops.create(path, mode).await?;
        match self.ops.getattr(path).await {
            Ok(attr) => Ok((fh, attr)),
            Err(e) => {
                if let Err(release_err) = self.ops.release(fh).await {
                    debug!(%fh, error = %release_err, "release after failed create lookup");
                }
                Err(e)
            }
        }
    }

    /// Full listing of `path` with stable offsets, skipping the first
    /// `offset` entries.
    async fn listing(&self, path: &OsStr, offset: u64) -> Result<Vec<(i64, kernel::DirEntry)>, VfsError> {
        let mut entries: Vec<kernel::DirEntry> = Vec::new();
        self.ops.readdir(path, &mut entries).await?;
        Ok(numbered(entries, offset))
    }

    /// Attributes for one listed entry.
    ///
    /// Symlinks are followed like `lookup` does. A link whose target is gone
    /// reports its own attributes instead, and an entry that cannot be
    /// stat'ed at all keeps the type the listing gave it. Every listed entry
    /// gets an answer.
    async fn entry_attr(&self, path: &OsStr, kind: kernel::FileType) -> kernel::FileAttr {
        let err = match self.ops.getattr(path).await {
            Ok(attr) => return attr,
            Err(e) => e,
        };
        match self.ops.getattr_nofollow(path).await {
            Ok(attr) => attr,
            Err(nofollow_err) => {
                debug!(
                    path = ?path,
                    error = %err,
                    nofollow_error = %nofollow_err,
                    "entry attributes unknown"
                );
                kernel::FileAttr::of_kind(kind)
            }
        }
    }

    /// [`listing`](Self::listing) with attributes attached to each entry.
    async fn listing_plus(&self, parent: &OsStr, offset: u64) -> Result<Vec<DirectoryEntryPlus>, VfsError> {
        let listing = self.listing(parent, offset).await?;
        let mut entries = Vec::with_capacity(listing.len());
        for (offset, entry) in listing {
            let path = match entry.name.as_bytes() {
                b"." => parent.to_os_string(),
                b".." => parent_path(parent).to_os_string(),
                _ => child_path(parent, &entry.name),
            };
            let attr = self.entry_attr(&path, entry.kind).await;
            entries.push(DirectoryEntryPlus {
                kind: file_type(attr.kind),
                name: entry.name,
                offset,
                attr: file_attr(&attr),
                entry_ttl: TTL,
                attr_ttl: TTL,
            });
        }
        Ok(entries)
    }
}

/// Attribute changes requested by one `setattr`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct AttrChanges {
    mode: Option<u32>,
    uid: Option<u32>,
    gid: Option<u32>,
    size: Option<u64>,
    times: SetTimes,
}

impl From<&SetAttr> for AttrChanges {
    fn from(set_attr: &SetAttr) -> Self {
        Self {
            mode: set_attr.mode,
            uid: set_attr.uid,
            gid: set_attr.gid,
            size: set_attr.size,
            times: SetTimes {
                atime: set_attr.atime.map(|t| kernel::Timestamp::new(t.sec, t.nsec)),
                mtime: set_attr.mtime.map(|t| kernel::Timestamp::new(t.sec, t.nsec)),
            },
        }
    }
}

fn errno(err: VfsError) -> fuse3::Errno {
    fuse3::Errno::from(err.errno())
}

/// Join a parent virtual path and an entry name.
pub fn child_path(parent: &OsStr, name: &OsStr) -> OsString {
    let mut path = OsString::with_capacity(parent.len() + name.len() + 1);
    path.push(parent);
    if !parent.as_bytes().ends_with(b"/") {
        path.push("/");
    }
    path.push(name);
    path
}

/// Virtual path of the directory containing `path`.
fn parent_path(path: &OsStr) -> &OsStr {
    let bytes = path.as_bytes();
    match bytes.iter().rposition(|&b| b == b'/') {
        Some(0) | None => OsStr::new("/"),
        Some(i) => OsStr::from_bytes(&bytes[..i]),
    }
}

/// Number entries from 1 in listing order and drop the first `skip`.
///
/// An entry's offset is the one the kernel passes back to resume after it.
fn numbered(entries: Vec<kernel::DirEntry>, skip: u64) -> Vec<(i64, kernel::DirEntry)> {
    entries
        .into_iter()
        .zip(1i64..)
        .map(|(entry, offset)| (offset, entry))
        .skip(usize::try_from(skip).unwrap_or(usize::MAX))
        .collect()
}

pub(crate) fn file_type(kind: kernel::FileType) -> FileType {
    match kind {
        kernel::FileType::File => FileType::RegularFile,
        kernel::FileType::Directory => FileType::Directory,
        kernel::FileType::Symlink => FileType::Symlink,
        kernel::FileType::Fifo => FileType::NamedPipe,
        kernel::FileType::Socket => FileType::Socket,
        kernel::FileType::CharDevice => FileType::CharDevice,
        kernel::FileType::BlockDevice => FileType::BlockDevice,
    }
}

fn timestamp(t: kernel::Timestamp) -> fuse3::Timestamp {
    fuse3::Timestamp {
        sec: t.secs,
        nsec: t.nanos,
    }
}

pub(crate) fn file_attr(attr: &kernel::FileAttr) -> FileAttr {
    FileAttr {
        size: attr.size,
        blocks: attr.blocks,
        atime: timestamp(attr.atime),
        mtime: timestamp(attr.mtime),
        ctime: timestamp(attr.ctime),
        kind: file_type(attr.kind),
        perm: (attr.perm & 0o7777) as u16,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: attr.rdev as u32,
        blksize: attr.blksize,
    }
}

impl<F: VfsOps + 'static> PathFilesystem for FuseBridge<F> {
    async fn init(&self, _req: Request) -> fuse3::Result<ReplyInit> {
        info!("filesystem session started");
        Ok(ReplyInit {
            max_write: NonZeroU32::new(MAX_WRITE).unwrap_or(NonZeroU32::MIN),
        })
    }

    async fn destroy(&self, _req: Request) {
        info!("filesystem session ended");
    }

    async fn lookup(&self, _req: Request, parent: &OsStr, name: &OsStr) -> fuse3::Result<ReplyEntry> {
        self.entry(&child_path(parent, name)).await
    }

    async fn getattr(
        &self,
        _req: Request,
        path: Option<&OsStr>,
        _fh: Option<u64>,
        _flags: u32,
    ) -> fuse3::Result<ReplyAttr> {
        let path = path.ok_or_else(fuse3::Errno::new_not_exist)?;
        let attr = self.ops.getattr(path).await.map_err(errno)?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: file_attr(&attr),
        })
    }

    async fn setattr(
        &self,
        _req: Request,
        path: Option<&OsStr>,
        _fh: Option<u64>,
        set_attr: SetAttr,
    ) -> fuse3::Result<ReplyAttr> {
        let path = path.ok_or_else(fuse3::Errno::new_not_exist)?;
        self.apply(path, &AttrChanges::from(&set_attr))
            .await
            .map_err(errno)?;
        let attr = self.ops.getattr(path).await.map_err(errno)?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: file_attr(&attr),
        })
    }

    async fn symlink(
        &self,
        _req: Request,
        parent: &OsStr,
        name: &OsStr,
        link_path: &OsStr,
    ) -> fuse3::Result<ReplyEntry> {
        let link = child_path(parent, name);
        self.ops.symlink(link_path, &link).await.map_err(errno)?;
        self.entry(&link).await
    }

    async fn mkdir(
        &self,
        _req: Request,
        parent: &OsStr,
        name: &OsStr,
        mode: u32,
        _umask: u32,
    ) -> fuse3::Result<ReplyEntry> {
        let path = child_path(parent, name);
        self.ops.mkdir(&path, mode).await.map_err(errno)?;
        self.entry(&path).await
    }

    async fn unlink(&self, _req: Request, parent: &OsStr, name: &OsStr) -> fuse3::Result<()> {
        self.ops
            .unlink(&child_path(parent, name))
            .await
            .map_err(errno)
    }

    async fn rmdir(&self, _req: Request, parent: &OsStr, name: &OsStr) -> fuse3::Result<()> {
        self.ops
            .rmdir(&child_path(parent, name))
            .await
            .map_err(errno)
    }

    async fn rename(
        &self,
        _req: Request,
        origin_parent: &OsStr,
        origin_name: &OsStr,
        parent: &OsStr,
        name: &OsStr,
    ) -> fuse3::Result<()> {
        let from = child_path(origin_parent, origin_name);
        let to = child_path(parent, name);
        self.ops.rename(&from, &to).await.map_err(errno)
    }

    async fn link(
        &self,
        _req: Request,
        path: &OsStr,
        new_parent: &OsStr,
        new_name: &OsStr,
    ) -> fuse3::Result<ReplyEntry> {
        let new_path = child_path(new_parent, new_name);
        self.ops.link(path, &new_path).await.map_err(errno)?;
        self.entry(&new_path).await
    }

    async fn open(&self, _req: Request, path: &OsStr, flags: u32) -> fuse3::Result<ReplyOpen> {
        let fh = self.ops.open(path, flags as i32).await.map_err(errno)?;
        Ok(ReplyOpen {
            fh: fh.into(),
            flags: 0,
        })
    }

    async fn read(
        &self,
        _req: Request,
        _path: Option<&OsStr>,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> fuse3::Result<ReplyData> {
        let data = self
            .ops
            .read(FileHandleId(fh), offset, size)
            .await
            .map_err(errno)?;
        Ok(Bytes::from(data).into())
    }

    async fn write(
        &self,
        _req: Request,
        _path: Option<&OsStr>,
        fh: u64,
        offset: u64,
        data: &[u8],
        _write_flags: u32,
        _flags: u32,
    ) -> fuse3::Result<ReplyWrite> {
        let written = self
            .ops
            .write(FileHandleId(fh), offset, data)
            .await
            .map_err(errno)?;
        Ok(ReplyWrite { written })
    }

    async fn release(
        &self,
        _req: Request,
        _path: Option<&OsStr>,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> fuse3::Result<()> {
        self.ops.release(FileHandleId(fh)).await.map_err(errno)
    }

    async fn access(&self, _req: Request, path: &OsStr, mask: u32) -> fuse3::Result<()> {
        self.ops.access(path, mask as i32).await.map_err(errno)
    }

    async fn create(
        &self,
        _req: Request,
        parent: &OsStr,
        name: &OsStr,
        mode: u32,
        _flags: u32,
    ) -> fuse3::Result<ReplyCreated> {
        let path = child_path(parent, name);
        let (fh, attr) = self.create_at(&path, mode).await.map_err(errno)?;
        Ok(ReplyCreated {
            ttl: TTL,
            attr: file_attr(&attr),
            generation: 0,
            fh: fh.into(),
            flags: 0,
        })
    }

    // Directories carry no open state; readdir works from the path alone.
    async fn opendir(&self, _req: Request, _path: &OsStr, _flags: u32) -> fuse3::Result<ReplyOpen> {
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn releasedir(&self, _req: Request, _path: &OsStr, _fh: u64, _flags: u32) -> fuse3::Result<()> {
        Ok(())
    }

    type DirEntryStream<'a>
        = Iter<std::vec::IntoIter<fuse3::Result<DirectoryEntry>>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = Iter<std::vec::IntoIter<fuse3::Result<DirectoryEntryPlus>>>
    where
        Self: 'a;

    async fn readdir<'a>(
        &'a self,
        _req: Request,
        path: &'a OsStr,
        _fh: u64,
        offset: i64,
    ) -> fuse3::Result<ReplyDirectory<Self::DirEntryStream<'a>>> {
        let skip = u64::try_from(offset).unwrap_or(0);
        let entries: Vec<_> = self
            .listing(path, skip)
            .await
            .map_err(errno)?
            .into_iter()
            .map(|(offset, entry)| {
                Ok(DirectoryEntry {
                    kind: file_type(entry.kind),
                    name: entry.name,
                    offset,
                })
            })
            .collect();
        Ok(ReplyDirectory {
            entries: stream::iter(entries),
        })
    }

    async fn readdirplus<'a>(
        &'a self,
        _req: Request,
        parent: &'a OsStr,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> fuse3::Result<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
        let entries = self
            .listing_plus(parent, offset)
            .await
            .map_err(errno)?
            .into_iter()
            .map(Ok)
            .collect::<Vec<_>>();
        Ok(ReplyDirectoryPlus {
            entries: stream::iter(entries),
        })
    }

    async fn statfs(&self, _req: Request, path: &OsStr) -> fuse3::Result<ReplyStatFs> {
        let stat = self.ops.statfs(path).await.map_err(errno)?;
        Ok(ReplyStatFs {
            blocks: stat.blocks,
            bfree: stat.bfree,
            bavail: stat.bavail,
            files: stat.files,
            ffree: stat.ffree,
            bsize: stat.bsize,
            namelen: stat.namelen,
            frsize: stat.frsize,
        })
    }
}
