//! FUSE front end for wrapperfs.
//!
//! Mounts a [`FuseBridge`] over a [`Passthrough`](wrapperfs_kernel::Passthrough)
//! backend so a host directory appears, unchanged, at the mount point.

pub mod bridge;
pub mod constants;
pub mod mount;

pub use bridge::FuseBridge;
pub use mount::{mount_options, MountOption, MountOptionError};
