//! RAII wrappers for Windows handles.

use windows::Win32::System::Registry::{HKEY, RegCloseKey};

/// RAII wrapper for Registry key handle
pub(super) struct RegistryHandle(pub(super) HKEY);

impl RegistryHandle {
    #[inline]
    pub(super) fn handle(&self) -> HKEY {
        self.0
    }
}

impl Drop for RegistryHandle {
    #[inline]
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = RegCloseKey(self.0);
            }
        }
    }
}
