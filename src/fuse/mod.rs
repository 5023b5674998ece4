//! FUSE mount of a remote share.
//!
//! Every kernel filesystem call on the mount point becomes one request to the
//! file server through a [`RemoteFs`](crate::client::RemoteFs) session that
//! lives as long as the mount.

mod inode;
#[cfg(feature = "fuse")]
mod filesystem;

pub use inode::{child_path, parent_of, InodeMap, ROOT_INO};
#[cfg(feature = "fuse")]
pub use filesystem::ShareFuse;

/// Mount the share at `mount_point` and serve it until unmounted.
#[cfg(feature = "fuse")]
pub fn mount<P: AsRef<std::path::Path>>(
    mount_point: P,
    config: &crate::config::ClientConfig,
) -> crate::error::Result<()> {
    use crate::client::RemoteFs;
    use crate::error::ShareError;
    use fuser::MountOption;
    use tracing::info;

    let fs = ShareFuse::new(RemoteFs::connect(config)?);

    let options = vec![
        MountOption::FSName("sharefs".to_string()),
        MountOption::DefaultPermissions,
    ];

    info!(mount_point = %mount_point.as_ref().display(), server = %config.server_url, "Mounting share");

    fuser::mount2(fs, mount_point, &options)
        .map_err(|e| ShareError::Internal(format!("Mount failed: {}", e)))
}
