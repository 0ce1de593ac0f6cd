//! Free disk space queries for the download destination

use std::path::Path;

/// Reports free space on the volume holding a path
#[cfg_attr(test, mockall::automock)]
pub trait DiskSpace: Send + Sync {
    /// Bytes available to the current user on the volume holding `path`.
    fn available(&self, path: &Path) -> std::io::Result<u64>;
}

/// Native free-space query (`GetDiskFreeSpaceExW` / `statvfs`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDiskSpace;

impl DiskSpace for SystemDiskSpace {
    fn available(&self, path: &Path) -> std::io::Result<u64> {
        platform_available(path)
    }
}

#[cfg(windows)]
fn platform_available(path: &Path) -> std::io::Result<u64> {
    crate::install::windows::free_space(path)
}

#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn platform_available(path: &Path) -> std::io::Result<u64> {
    let stat = nix::sys::statvfs::statvfs(path)?;
    Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

#[cfg(not(any(windows, unix)))]
fn platform_available(_path: &Path) -> std::io::Result<u64> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "free space query not supported on this platform",
    ))
}
