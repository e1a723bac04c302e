//! Startup configuration.
//!
//! The only setting is the base directory every virtual path is rooted
//! under. It is validated once, then shared read-only by every operation.

use std::ffi::{OsStr, OsString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::resolve;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No base directory was given.
    #[error("a base directory is required (--basedir)")]
    Missing,

    /// The base directory can't be reached on the host.
    #[error("base directory {}: {source}", .path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The base path exists but is not a directory.
    #[error("base directory {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

/// Immutable passthrough configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Canonical absolute base directory.
    base_dir: PathBuf,
    /// Concatenation prefix: `base_dir` without a trailing `/`.
    prefix: OsString,
}

impl Config {
    /// Validate `base_dir` and build the configuration.
    ///
    /// The directory is canonicalized, so a relative path given on the
    /// command line keeps pointing at the same place after the process
    /// changes directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let given: PathBuf = base_dir.into();
        if given.as_os_str().is_empty() {
            return Err(ConfigError::Missing);
        }

        let base_dir = dunce::canonicalize(&given).map_err(|source| {
            ConfigError::Inaccessible {
                path: given.clone(),
                source,
            }
        })?;

        let meta = std::fs::metadata(&base_dir).map_err(|source| ConfigError::Inaccessible {
            path: given.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(ConfigError::NotADirectory(given));
        }

        let prefix = trim_trailing_slashes(base_dir.as_os_str()).to_os_string();
        Ok(Self { base_dir, prefix })
    }

    /// The canonical base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Host path for a virtual path.
    pub fn resolve(&self, virtual_path: &OsStr) -> PathBuf {
        resolve::resolve(&self.prefix, virtual_path)
    }

    /// Host path for the target of a symlink being created.
    pub fn resolve_link_target(&self, target: &OsStr) -> PathBuf {
        resolve::resolve_link_target(&self.prefix, target)
    }
}

fn trim_trailing_slashes(path: &OsStr) -> &OsStr {
    let bytes = path.as_bytes();
    let end = bytes.iter().rposition(|&b| b != b'/').map_or(0, |i| i + 1);
    OsStr::from_bytes(&bytes[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing() {
        assert!(matches!(Config::new(""), Err(ConfigError::Missing)));
    }

    #[test]
    fn test_nonexistent_is_inaccessible() {
        let dir = TempDir::new().unwrap();
        let err = Config::new(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ConfigError::Inaccessible { .. }));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            Config::new(&file),
            Err(ConfigError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_base_is_canonical() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let config = Config::new(dir.path().join("sub/../sub/")).unwrap();
        let expected = dunce::canonicalize(dir.path().join("sub")).unwrap();
        assert_eq!(config.base_dir(), expected);
        assert_eq!(
            config.resolve(OsStr::new("/x")),
            expected.join("x")
        );
    }

    #[test]
    fn test_root_base() {
        let config = Config::new("/").unwrap();
        assert_eq!(config.base_dir(), Path::new("/"));
        assert_eq!(config.resolve(OsStr::new("/etc")), Path::new("/etc"));
        assert_eq!(
            config.resolve_link_target(OsStr::new("etc/hosts")),
            Path::new("/etc/hosts")
        );
    }

    #[test]
    fn test_trim_trailing_slashes() {
        assert_eq!(trim_trailing_slashes(OsStr::new("/a/b//")), "/a/b");
        assert_eq!(trim_trailing_slashes(OsStr::new("/")), "");
        assert_eq!(trim_trailing_slashes(OsStr::new("/a")), "/a");
    }
}
