//! Mount option handling.
//!
//! Only the handful of `-o` options a passthrough mount needs are accepted;
//! anything else is rejected before mounting.

use std::str::FromStr;

use fuse3::MountOptions;
use thiserror::Error;

use crate::constants::DEFAULT_FS_NAME;

/// One `-o` mount option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOption {
    /// Let users other than the mounting one see the filesystem.
    AllowOther,
    /// Have the kernel enforce permission bits from `getattr`.
    DefaultPermissions,
    /// Name shown in the mount table.
    FsName(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MountOptionError {
    #[error("unsupported mount option `{0}` (expected allow_other, default_permissions or fsname=NAME)")]
    Unsupported(String),

    #[error("mount option `{0}` needs a value")]
    MissingValue(&'static str),
}

impl FromStr for MountOption {
    type Err = MountOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            None if s == "allow_other" => Ok(MountOption::AllowOther),
            None if s == "default_permissions" => Ok(MountOption::DefaultPermissions),
            None if s == "fsname" => Err(MountOptionError::MissingValue("fsname")),
            Some(("fsname", "")) => Err(MountOptionError::MissingValue("fsname")),
            Some(("fsname", name)) => Ok(MountOption::FsName(name.to_string())),
            _ => Err(MountOptionError::Unsupported(s.to_string())),
        }
    }
}

/// Effective settings after folding every `-o` option. Later options win.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings<'a> {
    fs_name: &'a str,
    allow_other: bool,
    default_permissions: bool,
}

impl<'a> Settings<'a> {
    fn fold(options: &'a [MountOption]) -> Self {
        let mut settings = Settings {
            fs_name: DEFAULT_FS_NAME,
            allow_other: false,
            default_permissions: false,
        };
        for option in options {
            match option {
                MountOption::AllowOther => settings.allow_other = true,
                MountOption::DefaultPermissions => settings.default_permissions = true,
                MountOption::FsName(name) => settings.fs_name = name.as_str(),
            }
        }
        settings
    }
}

/// Build fuse3 mount options for a mount owned by `uid`/`gid`.
pub fn mount_options(options: &[MountOption], uid: u32, gid: u32) -> MountOptions {
    let settings = Settings::fold(options);
    let mut mount_options = MountOptions::default();
    mount_options
        .fs_name(settings.fs_name)
        .uid(uid)
        .gid(gid)
        .allow_other(settings.allow_other)
        .default_permissions(settings.default_permissions);
    mount_options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_options() {
        assert_eq!("allow_other".parse::<MountOption>(), Ok(MountOption::AllowOther));
        assert_eq!(
            "default_permissions".parse::<MountOption>(),
            Ok(MountOption::DefaultPermissions)
        );
        assert_eq!(
            "fsname=data".parse::<MountOption>(),
            Ok(MountOption::FsName("data".to_string()))
        );
    }

    #[test]
    fn test_fsname_keeps_equals_in_value() {
        assert_eq!(
            "fsname=a=b".parse::<MountOption>(),
            Ok(MountOption::FsName("a=b".to_string()))
        );
    }

    #[test]
    fn test_fsname_needs_value() {
        assert_eq!(
            "fsname".parse::<MountOption>(),
            Err(MountOptionError::MissingValue("fsname"))
        );
        assert_eq!(
            "fsname=".parse::<MountOption>(),
            Err(MountOptionError::MissingValue("fsname"))
        );
    }

    #[test]
    fn test_unsupported_rejected() {
        for bad in ["ro", "allow_root", "allow_other=1", "", "debug"] {
            assert_eq!(
                bad.parse::<MountOption>(),
                Err(MountOptionError::Unsupported(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_error_message_lists_choices() {
        let err = "ro".parse::<MountOption>().unwrap_err();
        assert!(err.to_string().contains("allow_other"));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::fold(&[]);
        assert_eq!(settings.fs_name, DEFAULT_FS_NAME);
        assert!(!settings.allow_other);
        assert!(!settings.default_permissions);
    }

    #[test]
    fn test_last_fsname_wins() {
        let options = [
            MountOption::FsName("first".to_string()),
            MountOption::AllowOther,
            MountOption::FsName("second".to_string()),
        ];
        let settings = Settings::fold(&options);
        assert_eq!(settings.fs_name, "second");
        assert!(settings.allow_other);
        assert!(!settings.default_permissions);

        let _ = mount_options(&options, 1000, 1000);
    }
}
