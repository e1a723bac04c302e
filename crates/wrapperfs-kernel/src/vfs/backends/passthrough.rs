//! Host passthrough backend.
//!
//! Every verb resolves its virtual path(s) under the base directory and
//! issues the matching POSIX call on the host. Host calls run on tokio's
//! blocking pool, so a slow disk never stalls the bridge's async workers.

use std::ffi::OsStr;
use std::fs::{DirBuilder, File, Permissions};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::fcntl::{OFlag, AT_FDCWD};
use nix::sys::stat::{utimensat, Mode, UtimensatFlags};
use nix::sys::time::TimeSpec;
use nix::unistd::AccessFlags;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::vfs::error::{HostResultExt, VfsError, VfsResult};
use crate::vfs::handles::{FileHandle, HandleTable};
use crate::vfs::ops::VfsOps;
use crate::vfs::types::{
    DirEntry, EntrySink, FileAttr, FileHandleId, FileType, SetTimes, StatFs, Timestamp,
};

/// Passthrough backend.
///
/// All operations are relative to the configured base directory. For
/// example, with a base of `/srv/data`, `getattr("/a/b.txt")` stats
/// `/srv/data/a/b.txt`.
///
/// The only state besides the shared [`Config`] is the table of open
/// descriptors.
#[derive(Debug)]
pub struct Passthrough {
    config: Arc<Config>,
    handles: HandleTable,
}

impl Passthrough {
    /// Create a backend over the given configuration.
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            handles: HandleTable::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open descriptors.
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    fn resolve(&self, path: &OsStr) -> PathBuf {
        self.config.resolve(path)
    }
}

/// Run a host call on the blocking pool.
async fn blocking<T, F>(op: &'static str, f: F) -> VfsResult<T>
where
    F: FnOnce() -> VfsResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => {
            warn!(op, error = %e, "host call did not complete");
            Err(VfsError::host(op, Errno::EIO))
        }
    }
}

/// Read every entry of a host directory.
///
/// The host's own `.` and `..` are not included. A mid-stream error ends the
/// listing early without failing it.
fn list_dir(dir: &Path) -> VfsResult<Vec<DirEntry>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).host_err("opendir")? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "directory stream ended early");
                break;
            }
        };
        let kind = entry_kind(entry.file_type(), &entry.path());
        entries.push(DirEntry::new(entry.file_name(), kind));
    }
    Ok(entries)
}

/// Type of a listed entry. When the directory stream carries no type, ask
/// the host with `lstat`; if that fails too, report a regular file.
fn entry_kind(file_type: std::io::Result<std::fs::FileType>, path: &Path) -> FileType {
    let err = match file_type {
        Ok(ft) => return ft.into(),
        Err(e) => e,
    };
    match std::fs::symlink_metadata(path) {
        Ok(meta) => meta.file_type().into(),
        Err(lstat_err) => {
            debug!(
                path = %path.display(),
                error = %err,
                lstat_error = %lstat_err,
                "entry type unknown, listing as regular file"
            );
            FileType::File
        }
    }
}

fn timespec(time: Option<Timestamp>) -> TimeSpec {
    match time {
        Some(t) => TimeSpec::new(t.secs as _, t.nanos as _),
        None => TimeSpec::UTIME_OMIT,
    }
}

#[async_trait]
impl VfsOps for Passthrough {
    #[instrument(name = "fs.getattr", level = "debug", skip(self), err(level = "debug"))]
    async fn getattr(&self, path: &OsStr) -> VfsResult<FileAttr> {
        let full = self.resolve(path);
        blocking("stat", move || {
            let meta = std::fs::metadata(&full).host_err("stat")?;
            Ok(FileAttr::from(&meta))
        })
        .await
    }

    #[instrument(name = "fs.getattr_nofollow", level = "debug", skip(self), err(level = "debug"))]
    async fn getattr_nofollow(&self, path: &OsStr) -> VfsResult<FileAttr> {
        let full = self.resolve(path);
        blocking("lstat", move || {
            let meta = std::fs::symlink_metadata(&full).host_err("lstat")?;
            Ok(FileAttr::from(&meta))
        })
        .await
    }

    #[instrument(name = "fs.readdir", level = "debug", skip(self, sink), err(level = "debug"))]
    async fn readdir(&self, path: &OsStr, sink: &mut (dyn EntrySink + Send)) -> VfsResult<()> {
        let full = self.resolve(path);
        let entries = blocking("opendir", move || list_dir(&full)).await?;

        sink.push(DirEntry::directory("."));
        sink.push(DirEntry::directory(".."));
        for entry in entries {
            sink.push(entry);
        }
        Ok(())
    }

    #[instrument(name = "fs.access", level = "debug", skip(self), err(level = "debug"))]
    async fn access(&self, path: &OsStr, mask: i32) -> VfsResult<()> {
        let full = self.resolve(path);
        let mode = AccessFlags::from_bits_retain(mask);
        blocking("access", move || nix::unistd::access(&full, mode).host_err("access")).await
    }

    #[instrument(name = "fs.statfs", level = "debug", skip(self), err(level = "debug"))]
    async fn statfs(&self, path: &OsStr) -> VfsResult<StatFs> {
        let full = self.resolve(path);
        blocking("statvfs", move || {
            let stat = nix::sys::statvfs::statvfs(&full).host_err("statvfs")?;
            Ok(StatFs {
                blocks: stat.blocks() as u64,
                bfree: stat.blocks_free() as u64,
                bavail: stat.blocks_available() as u64,
                files: stat.files() as u64,
                ffree: stat.files_free() as u64,
                bsize: stat.block_size() as u32,
                namelen: stat.name_max() as u32,
                frsize: stat.fragment_size() as u32,
            })
        })
        .await
    }

    #[instrument(name = "fs.open", level = "debug", skip(self), err(level = "debug"))]
    async fn open(&self, path: &OsStr, flags: i32) -> VfsResult<FileHandleId> {
        let full = self.resolve(path);
        let oflag = OFlag::from_bits_retain(flags) | OFlag::O_CLOEXEC;
        let handle = blocking("open", move || {
            let fd = nix::fcntl::open(&full, oflag, Mode::empty()).host_err("open")?;
            Ok(FileHandle::new(File::from(fd), full))
        })
        .await?;

        let fh = self.handles.insert(handle);
        debug!(%fh, "opened");
        Ok(fh)
    }

    #[instrument(name = "fs.create", level = "debug", skip(self), err(level = "debug"))]
    async fn create(&self, path: &OsStr, mode: u32) -> VfsResult<FileHandleId> {
        let full = self.resolve(path);
        // creat(2), but read-write so the same context can read back.
        let oflag = OFlag::O_CREAT | OFlag::O_TRUNC | OFlag::O_RDWR | OFlag::O_CLOEXEC;
        let mode = Mode::from_bits_truncate(mode);
        let handle = blocking("creat", move || {
            let fd = nix::fcntl::open(&full, oflag, mode).host_err("creat")?;
            Ok(FileHandle::new(File::from(fd), full))
        })
        .await?;

        let fh = self.handles.insert(handle);
        debug!(%fh, "created");
        Ok(fh)
    }

    #[instrument(name = "fs.read", level = "debug", skip(self), err(level = "debug"))]
    async fn read(&self, fh: FileHandleId, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let handle = self.handles.get(fh)?;
        blocking("pread", move || handle.read_at(offset, size)).await
    }

    #[instrument(
        name = "fs.write",
        level = "debug",
        skip(self, data),
        fields(len = data.len()),
        err(level = "debug")
    )]
    async fn write(&self, fh: FileHandleId, offset: u64, data: &[u8]) -> VfsResult<u32> {
        let handle = self.handles.get(fh)?;
        let data = data.to_vec();
        blocking("pwrite", move || handle.write_at(offset, &data)).await
    }

    #[instrument(name = "fs.release", level = "debug", skip(self), err(level = "debug"))]
    async fn release(&self, fh: FileHandleId) -> VfsResult<()> {
        let handle = self.handles.remove(fh)?;
        match Arc::try_unwrap(handle) {
            Ok(handle) => blocking("close", move || handle.close()).await,
            Err(in_flight) => {
                // A concurrent read/write still holds it; the descriptor closes
                // when that call drops its reference.
                debug!(path = %in_flight.path().display(), "release with I/O in flight");
                Ok(())
            }
        }
    }

    #[instrument(name = "fs.chmod", level = "debug", skip(self), err(level = "debug"))]
    async fn chmod(&self, path: &OsStr, mode: u32) -> VfsResult<()> {
        let full = self.resolve(path);
        blocking("chmod", move || {
            std::fs::set_permissions(&full, Permissions::from_mode(mode)).host_err("chmod")
        })
        .await
    }

    #[instrument(name = "fs.chown", level = "debug", skip(self), err(level = "debug"))]
    async fn chown(&self, path: &OsStr, uid: Option<u32>, gid: Option<u32>) -> VfsResult<()> {
        let full = self.resolve(path);
        blocking("chown", move || std::os::unix::fs::chown(&full, uid, gid).host_err("chown"))
            .await
    }

    #[instrument(name = "fs.utimens", level = "debug", skip(self), err(level = "debug"))]
    async fn utimens(&self, path: &OsStr, times: SetTimes) -> VfsResult<()> {
        let full = self.resolve(path);
        let atime = timespec(times.atime);
        let mtime = timespec(times.mtime);
        blocking("utimensat", move || {
            utimensat(AT_FDCWD, &full, &atime, &mtime, UtimensatFlags::FollowSymlink)
                .host_err("utimensat")
        })
        .await
    }

    #[instrument(name = "fs.truncate", level = "debug", skip(self), err(level = "debug"))]
    async fn truncate(&self, path: &OsStr, size: u64) -> VfsResult<()> {
        let full = self.resolve(path);
        let len = i64::try_from(size).map_err(|_| VfsError::host("truncate", Errno::EFBIG))?;
        blocking("truncate", move || {
            nix::unistd::truncate(&full, len as _).host_err("truncate")
        })
        .await
    }

    #[instrument(name = "fs.mkdir", level = "debug", skip(self), err(level = "debug"))]
    async fn mkdir(&self, path: &OsStr, mode: u32) -> VfsResult<()> {
        let full = self.resolve(path);
        blocking("mkdir", move || {
            DirBuilder::new().mode(mode).create(&full).host_err("mkdir")
        })
        .await
    }

    #[instrument(name = "fs.unlink", level = "debug", skip(self), err(level = "debug"))]
    async fn unlink(&self, path: &OsStr) -> VfsResult<()> {
        let full = self.resolve(path);
        blocking("unlink", move || std::fs::remove_file(&full).host_err("unlink")).await
    }

    #[instrument(name = "fs.rmdir", level = "debug", skip(self), err(level = "debug"))]
    async fn rmdir(&self, path: &OsStr) -> VfsResult<()> {
        let full = self.resolve(path);
        blocking("rmdir", move || std::fs::remove_dir(&full).host_err("rmdir")).await
    }

    #[instrument(name = "fs.rename", level = "debug", skip(self), err(level = "debug"))]
    async fn rename(&self, from: &OsStr, to: &OsStr) -> VfsResult<()> {
        let from = self.resolve(from);
        let to = self.resolve(to);
        blocking("rename", move || std::fs::rename(&from, &to).host_err("rename")).await
    }

    #[instrument(name = "fs.link", level = "debug", skip(self), err(level = "debug"))]
    async fn link(&self, oldpath: &OsStr, newpath: &OsStr) -> VfsResult<()> {
        let old = self.resolve(oldpath);
        let new = self.resolve(newpath);
        blocking("link", move || std::fs::hard_link(&old, &new).host_err("link")).await
    }

    #[instrument(name = "fs.symlink", level = "debug", skip(self), err(level = "debug"))]
    async fn symlink(&self, target: &OsStr, link: &OsStr) -> VfsResult<()> {
        let target = self.config.resolve_link_target(target);
        let link = self.resolve(link);
        blocking("symlink", move || {
            std::os::unix::fs::symlink(&target, &link).host_err("symlink")
        })
        .await
    }
}
