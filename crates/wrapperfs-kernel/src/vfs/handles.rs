//! Open-file handles.
//!
//! A descriptor opened by `open`/`create` lives in a [`FileHandle`] inside the
//! [`HandleTable`] until `release` takes it out and closes it. Bridges only
//! ever hold the [`FileHandleId`].

use std::fs::File;
use std::os::fd::IntoRawFd;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::error::{HostResultExt, VfsError, VfsResult};
use super::types::FileHandleId;

/// One owned host descriptor. Not `Clone`: closing happens once, on
/// [`close`](Self::close) or drop.
#[derive(Debug)]
pub struct FileHandle {
    file: File,
    /// Host path the descriptor was opened from, for diagnostics.
    path: PathBuf,
}

impl FileHandle {
    pub fn new(file: File, path: PathBuf) -> Self {
        Self { file, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Positioned read. Returns fewer bytes than asked at end of data.
    pub fn read_at(&self, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let mut buf = vec![0u8; size as usize];
        let n = self.file.read_at(&mut buf, offset).host_err("pread")?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Positioned write. One host call; a short count is returned as is.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> VfsResult<u32> {
        let n = self.file.write_at(data, offset).host_err("pwrite")?;
        Ok(u32::try_from(n).unwrap_or(u32::MAX))
    }

    /// Close the descriptor, reporting the host `close` result.
    pub fn close(self) -> VfsResult<()> {
        let fd = self.file.into_raw_fd();
        nix::unistd::close(fd).host_err("close")
    }
}

/// Concurrent table of open handles.
///
/// Ids start at 1 and are never reused, so a bridge that releases twice gets
/// `EBADF` instead of closing some later file.
#[derive(Debug)]
pub struct HandleTable {
    next_id: AtomicU64,
    open: DashMap<FileHandleId, Arc<FileHandle>>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            open: DashMap::new(),
        }
    }

    /// Take ownership of a handle and return its id.
    pub fn insert(&self, handle: FileHandle) -> FileHandleId {
        let id = FileHandleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.open.insert(id, Arc::new(handle));
        id
    }

    /// Borrow an open handle for I/O.
    pub fn get(&self, id: FileHandleId) -> VfsResult<Arc<FileHandle>> {
        self.open
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(VfsError::BadHandle(id))
    }

    /// Remove a handle. Later `get`/`remove` calls for `id` fail with
    /// `BadHandle`.
    pub fn remove(&self, id: FileHandleId) -> VfsResult<Arc<FileHandle>> {
        self.open
            .remove(&id)
            .map(|(_, handle)| handle)
            .ok_or(VfsError::BadHandle(id))
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_rw(dir: &TempDir, name: &str) -> FileHandle {
        let path = dir.path().join(name);
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        FileHandle::new(file, path)
    }

    #[test]
    fn test_ids_are_not_reused() {
        let dir = TempDir::new().unwrap();
        let table = HandleTable::new();

        let a = table.insert(open_rw(&dir, "a"));
        table.remove(a).unwrap();
        let b = table.insert(open_rw(&dir, "b"));

        assert_eq!(a, FileHandleId(1));
        assert_ne!(a, b);
        assert!(matches!(table.get(a), Err(VfsError::BadHandle(id)) if id == a));
    }

    #[test]
    fn test_double_remove_leaves_others() {
        let dir = TempDir::new().unwrap();
        let table = HandleTable::new();

        let a = table.insert(open_rw(&dir, "a"));
        let b = table.insert(open_rw(&dir, "b"));

        table.remove(a).unwrap();
        assert!(table.remove(a).is_err());
        assert_eq!(table.len(), 1);

        let other = table.get(b).unwrap();
        assert_eq!(other.write_at(0, b"still open").unwrap(), 10);
    }

    #[test]
    fn test_read_write_at() {
        let dir = TempDir::new().unwrap();
        let handle = open_rw(&dir, "f");

        handle.write_at(0, b"hello world").unwrap();
        assert_eq!(handle.read_at(6, 5).unwrap(), b"world");
        assert_eq!(handle.read_at(6, 100).unwrap(), b"world");
        assert!(handle.read_at(100, 10).unwrap().is_empty());
        assert!(handle.path().ends_with("f"));
    }

    #[test]
    fn test_close() {
        let dir = TempDir::new().unwrap();
        let table = HandleTable::new();
        let id = table.insert(open_rw(&dir, "f"));

        let handle = Arc::try_unwrap(table.remove(id).unwrap()).unwrap();
        handle.close().unwrap();
        assert!(table.is_empty());
    }
}
