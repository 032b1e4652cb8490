//! Mapping from channel names to files under the shared-memory root.

use std::io;
use std::path::{Path, PathBuf};

#[cfg(target_os = "linux")]
const SHM_ROOT: &str = "/dev/shm";
#[cfg(not(target_os = "linux"))]
const SHM_ROOT: &str = "/tmp";

/// The host's shared-memory root directory.
pub fn shm_root() -> &'static Path {
    Path::new(SHM_ROOT)
}

/// Path of the segment file backing channel `name`, optionally under a
/// namespace prefix.
pub fn channel_path(prefix: Option<&str>, name: &str) -> PathBuf {
    let mut path = shm_root().to_path_buf();
    if let Some(prefix) = prefix {
        path.push(prefix);
    }
    path.push(name);
    path
}

/// Create the parent directory of `path` if it does not exist yet.
pub fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_nests_under_root() {
        let p = channel_path(Some("testbed"), "camera_state");
        assert_eq!(p, shm_root().join("testbed").join("camera_state"));
    }

    #[test]
    fn no_prefix_lands_in_root() {
        let p = channel_path(None, "camera_state");
        assert_eq!(p, shm_root().join("camera_state"));
    }
}
