//! VFS error types.

use std::io;

use nix::errno::Errno;
use thiserror::Error;

use super::types::FileHandleId;

/// VFS error type.
///
/// Every variant maps to exactly one host errno, so a bridge can hand the
/// failure back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VfsError {
    /// A host call failed with the given errno.
    #[error("{op}: {} (errno {errno})", describe(.errno))]
    Host {
        /// Name of the host call, for diagnostics.
        op: &'static str,
        /// Positive errno as reported by the host.
        errno: i32,
    },

    /// Read, write or release against a handle that is not open.
    #[error("bad file handle: {0}")]
    BadHandle(FileHandleId),
}

impl VfsError {
    /// Create a Host error from an errno value.
    pub fn host(op: &'static str, errno: Errno) -> Self {
        Self::Host {
            op,
            errno: errno as i32,
        }
    }

    /// Create a Host error from a std I/O error.
    ///
    /// The raw OS error is kept verbatim. I/O errors that never came from
    /// the OS (none reach here from the passthrough) become `EIO`.
    pub fn from_io(op: &'static str, err: &io::Error) -> Self {
        Self::Host {
            op,
            errno: err.raw_os_error().unwrap_or(Errno::EIO as i32),
        }
    }

    /// Positive host errno.
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::Host { errno, .. } => *errno,
            VfsError::BadHandle(_) => Errno::EBADF as i32,
        }
    }

    /// The bridge return convention: the errno, negated.
    pub fn negated(&self) -> i32 {
        -self.errno()
    }
}

fn describe(errno: &i32) -> &'static str {
    Errno::from_raw(*errno).desc()
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

/// Attach the host call name to a failing host result.
pub(crate) trait HostResultExt<T> {
    fn host_err(self, op: &'static str) -> VfsResult<T>;
}

impl<T> HostResultExt<T> for io::Result<T> {
    fn host_err(self, op: &'static str) -> VfsResult<T> {
        self.map_err(|e| VfsError::from_io(op, &e))
    }
}

impl<T> HostResultExt<T> for nix::Result<T> {
    fn host_err(self, op: &'static str) -> VfsResult<T> {
        self.map_err(|errno| VfsError::host(op, errno))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_raw_errno() {
        let err = io::Error::from_raw_os_error(Errno::ENOENT as i32);
        let vfs = VfsError::from_io("stat", &err);
        assert_eq!(vfs.errno(), Errno::ENOENT as i32);
        assert_eq!(vfs.negated(), -(Errno::ENOENT as i32));
    }

    #[test]
    fn test_synthetic_io_error_is_eio() {
        let err = io::Error::other("not from the OS");
        assert_eq!(VfsError::from_io("read", &err).errno(), Errno::EIO as i32);
    }

    #[test]
    fn test_bad_handle_is_ebadf() {
        let err = VfsError::BadHandle(FileHandleId(7));
        assert_eq!(err.errno(), Errno::EBADF as i32);
        assert!(err.negated() < 0);
        assert_eq!(err.to_string(), "bad file handle: 7");
    }

    #[test]
    fn test_unknown_errno_passes_through() {
        // Not a value nix has a name for; must still survive untouched.
        let err = io::Error::from_raw_os_error(4095);
        assert_eq!(VfsError::from_io("open", &err).negated(), -4095);
    }

    #[test]
    fn test_nix_result_ext() {
        let res: nix::Result<()> = Err(Errno::EACCES);
        let err = res.host_err("access").unwrap_err();
        assert_eq!(
            err,
            VfsError::Host {
                op: "access",
                errno: Errno::EACCES as i32
            }
        );
        assert!(err.to_string().starts_with("access: "));
    }
}
