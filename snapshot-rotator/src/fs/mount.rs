//! Mount point detection for the backup volume.

use nix::sys::stat::{lstat, stat, SFlag};
use std::path::Path;

/// True if `path` is the root of a mounted filesystem.
///
/// A path counts as a mount point when it lives on a different device than
/// its parent, or when it is its own parent (`/`). Missing paths and
/// symlinks are never mount points.
pub fn is_mount_point(path: &Path) -> bool {
    let own = match lstat(path) {
        Ok(st) => st,
        Err(_) => return false,
    };
    if SFlag::from_bits_truncate(own.st_mode) & SFlag::S_IFMT == SFlag::S_IFLNK {
        return false;
    }

    let parent = match stat(&path.join("..")) {
        Ok(st) => st,
        Err(_) => return false,
    };

    own.st_dev != parent.st_dev || own.st_ino == parent.st_ino
}
