//! Virtual path → host path translation.
//!
//! The bridge hands every path over relative to the mounted root, starting
//! with `/`. Translation is plain byte concatenation onto the base directory:
//! `..` and `.` are left for the host to interpret and nothing is checked for
//! existence.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

/// Concatenate `base` and `virtual_path` into a host path.
///
/// `base` is the concatenation prefix (no trailing `/`, empty for a base of
/// `/`). Never fails. The buffer is sized to the result, so arbitrarily long
/// paths are kept intact and left for the host to reject with `ENAMETOOLONG`.
pub fn resolve(base: &OsStr, virtual_path: &OsStr) -> PathBuf {
    let mut full = OsString::with_capacity(base.len() + virtual_path.len());
    full.push(base);
    full.push(virtual_path);
    PathBuf::from(full)
}

/// Translate the target of a symlink being created.
///
/// The bridge passes a target outside the mounted view as an absolute path
/// and one inside the view as a relative path. Absolute targets are kept
/// verbatim; relative ones are resolved like any virtual path, i.e.
/// `base + "/" + target`.
pub fn resolve_link_target(base: &OsStr, target: &OsStr) -> PathBuf {
    if target.as_bytes().first() == Some(&b'/') {
        return PathBuf::from(target);
    }

    let mut full = OsString::with_capacity(base.len() + 1 + target.len());
    full.push(base);
    full.push("/");
    full.push(target);
    PathBuf::from(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::ffi::OsStringExt;
    use std::path::Path;

    fn os(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[test]
    fn test_resolve_concatenates() {
        assert_eq!(
            resolve(os("/srv/data"), os("/a/b.txt")),
            Path::new("/srv/data/a/b.txt")
        );
    }

    #[test]
    fn test_resolve_root() {
        assert_eq!(resolve(os("/srv/data"), os("/")), Path::new("/srv/data/"));
        // A base of `/` contributes the empty prefix.
        assert_eq!(resolve(os(""), os("/etc")), Path::new("/etc"));
    }

    #[test]
    fn test_resolve_keeps_dot_segments() {
        let full = resolve(os("/srv/data"), os("/a/../../etc/./passwd"));
        assert_eq!(full.as_os_str(), os("/srv/data/a/../../etc/./passwd"));
    }

    #[test]
    fn test_resolve_non_utf8() {
        let name = OsString::from_vec(vec![b'/', 0xff, 0xfe, b'x']);
        let full = resolve(os("/base"), &name);
        assert_eq!(full.as_os_str().as_bytes(), b"/base/\xff\xfex");
    }

    #[test]
    fn test_resolve_long_path_not_truncated() {
        let long = format!("/{}", "d/".repeat(2048));
        let full = resolve(os("/base"), os(&long));
        assert_eq!(full.as_os_str().len(), "/base".len() + long.len());
    }

    #[test]
    fn test_link_target_absolute_verbatim() {
        assert_eq!(
            resolve_link_target(os("/srv/data"), os("/outside/target")),
            Path::new("/outside/target")
        );
    }

    #[test]
    fn test_link_target_relative_rebased() {
        assert_eq!(
            resolve_link_target(os("/srv/data"), os("rel/target")),
            Path::new("/srv/data/rel/target")
        );
        assert_eq!(
            resolve_link_target(os("/srv/data"), os("../up")),
            Path::new("/srv/data/../up")
        );
    }
}
