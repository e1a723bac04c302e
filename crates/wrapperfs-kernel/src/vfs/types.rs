//! Core VFS types.
//!
//! These mirror what a host `stat`/`readdir`/`statvfs` reports, without
//! committing to any particular bridge's wire types.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::fs::{FileTypeExt, MetadataExt};

/// Opaque id for one open-file context.
///
/// This is the only thing a bridge keeps between `open`/`create` and
/// `release`. The descriptor behind it stays in the [`HandleTable`].
///
/// [`HandleTable`]: super::HandleTable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandleId(pub u64);

impl fmt::Display for FileHandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<FileHandleId> for u64 {
    fn from(id: FileHandleId) -> Self {
        id.0
    }
}

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Named pipe.
    Fifo,
    /// Unix domain socket.
    Socket,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

impl From<std::fs::FileType> for FileType {
    fn from(ft: std::fs::FileType) -> Self {
        if ft.is_dir() {
            FileType::Directory
        } else if ft.is_symlink() {
            FileType::Symlink
        } else if ft.is_fifo() {
            FileType::Fifo
        } else if ft.is_socket() {
            FileType::Socket
        } else if ft.is_char_device() {
            FileType::CharDevice
        } else if ft.is_block_device() {
            FileType::BlockDevice
        } else {
            FileType::File
        }
    }
}

/// Seconds and nanoseconds since the Unix epoch. Seconds may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    fn from_stat(secs: i64, nanos: i64) -> Self {
        Self {
            secs,
            nanos: nanos.clamp(0, 999_999_999) as u32,
        }
    }
}

/// File attributes (metadata), as reported by host `stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttr {
    /// Host inode number.
    pub ino: u64,
    /// Size in bytes.
    pub size: u64,
    /// Allocated 512-byte blocks.
    pub blocks: u64,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
    /// File type.
    pub kind: FileType,
    /// Permission bits including setuid/setgid/sticky (e.g., 0o644).
    pub perm: u32,
    /// Number of hard links.
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    /// Device id for character and block devices.
    pub rdev: u64,
    /// Preferred I/O block size.
    pub blksize: u32,
}

impl FileAttr {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Attributes known only by type, for an entry the host listed but
    /// could not stat.
    pub fn of_kind(kind: FileType) -> Self {
        FileAttr {
            ino: 0,
            size: 0,
            blocks: 0,
            atime: Timestamp::default(),
            mtime: Timestamp::default(),
            ctime: Timestamp::default(),
            kind,
            perm: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: 0,
        }
    }
}

impl From<&std::fs::Metadata> for FileAttr {
    fn from(meta: &std::fs::Metadata) -> Self {
        FileAttr {
            ino: meta.ino(),
            size: meta.size(),
            blocks: meta.blocks(),
            atime: Timestamp::from_stat(meta.atime(), meta.atime_nsec()),
            mtime: Timestamp::from_stat(meta.mtime(), meta.mtime_nsec()),
            ctime: Timestamp::from_stat(meta.ctime(), meta.ctime_nsec()),
            kind: meta.file_type().into(),
            perm: meta.mode() & 0o7777,
            nlink: meta.nlink().try_into().unwrap_or(u32::MAX),
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev(),
            blksize: meta.blksize().try_into().unwrap_or(u32::MAX),
        }
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (not full path). Host names need not be UTF-8.
    pub name: OsString,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<OsString>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<OsString>) -> Self {
        Self::new(name, FileType::Directory)
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }
}

/// Receives directory entries in listing order.
///
/// This is the directory-entry buffering primitive a bridge supplies to
/// `readdir`.
pub trait EntrySink {
    fn push(&mut self, entry: DirEntry);
}

impl EntrySink for Vec<DirEntry> {
    fn push(&mut self, entry: DirEntry) {
        Vec::push(self, entry);
    }
}

/// Access and modification times to apply.
///
/// A `None` field leaves that time untouched on the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetTimes {
    pub atime: Option<Timestamp>,
    pub mtime: Option<Timestamp>,
}

impl SetTimes {
    /// Set both times.
    pub fn both(atime: Timestamp, mtime: Timestamp) -> Self {
        Self {
            atime: Some(atime),
            mtime: Some(mtime),
        }
    }

    /// Returns true if neither time is requested.
    pub fn is_empty(&self) -> bool {
        self.atime.is_none() && self.mtime.is_none()
    }
}

/// Filesystem statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatFs {
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Available blocks (to non-root).
    pub bavail: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Block size.
    pub bsize: u32,
    /// Maximum name length.
    pub namelen: u32,
    /// Fragment size.
    pub frsize: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert!(FileType::File.is_file());
        assert!(!FileType::File.is_dir());
        assert!(FileType::Directory.is_dir());
        assert!(FileType::Symlink.is_symlink());
    }

    #[test]
    fn test_attr_from_metadata() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"12345").unwrap();

        let attr = FileAttr::from(&std::fs::metadata(&path).unwrap());
        assert!(attr.is_file());
        assert_eq!(attr.size, 5);
        assert_eq!(attr.nlink, 1);

        let attr = FileAttr::from(&std::fs::metadata(dir.path()).unwrap());
        assert!(attr.is_dir());
    }

    #[test]
    fn test_attr_of_kind() {
        let attr = FileAttr::of_kind(FileType::Symlink);
        assert!(attr.kind.is_symlink());
        assert_eq!(attr.size, 0);
        assert_eq!(attr.nlink, 1);
    }

    #[test]
    fn test_vec_is_entry_sink() {
        let mut sink: Vec<DirEntry> = Vec::new();
        EntrySink::push(&mut sink, DirEntry::directory("."));
        EntrySink::push(&mut sink, DirEntry::new("a", FileType::File));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[1].name(), OsStr::new("a"));
    }

    #[test]
    fn test_set_times() {
        assert!(SetTimes::default().is_empty());
        let t = SetTimes::both(Timestamp::new(1, 0), Timestamp::new(2, 5));
        assert!(!t.is_empty());
        assert_eq!(t.mtime, Some(Timestamp::new(2, 5)));
    }
}
