//! Wide-string helpers for Win32 calls.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;

/// Longest registry key name, in UTF-16 units (including the terminator)
pub(super) const MAX_KEY_NAME: usize = 256;

/// Convert to a NUL-terminated UTF-16 string
#[inline]
pub(super) fn to_wide(s: impl AsRef<OsStr>) -> Vec<u16> {
    s.as_ref().encode_wide().chain(std::iter::once(0)).collect()
}

/// Decode a `REG_SZ` payload, dropping trailing terminators
pub(super) fn wide_bytes_to_string(data: &[u8]) -> String {
    let wide: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&wide)
        .trim_end_matches('\0')
        .to_string()
}
