//! Volume free-space query.

use std::io;
use std::path::Path;

use windows::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;
use windows::core::PCWSTR;

use super::utils::to_wide;

/// Bytes available to the caller on the volume holding `path`
pub(crate) fn free_space(path: &Path) -> io::Result<u64> {
    let wide = to_wide(path);
    let mut available: u64 = 0;

    unsafe {
        GetDiskFreeSpaceExW(
            PCWSTR::from_raw(wide.as_ptr()),
            Some(&mut available),
            None,
            None,
        )?;
    }

    Ok(available)
}
