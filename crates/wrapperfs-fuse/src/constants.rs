//! Bridge configuration constants.

use std::time::Duration;

/// How long the kernel may cache attributes and directory entries.
pub const TTL: Duration = Duration::from_secs(1);

/// Largest single write the kernel may send, in bytes.
pub const MAX_WRITE: u32 = 128 * 1024;

/// Filesystem name shown in the mount table unless `-o fsname=` overrides it.
pub const DEFAULT_FS_NAME: &str = "wrapperfs";
