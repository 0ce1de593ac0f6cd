//! Uninstall registry collaborator

use std::fmt;
use std::io;

/// Uninstall roots under `HKEY_LOCAL_MACHINE` (native view, then 32-bit view)
pub const UNINSTALL_ROOTS: [&str; 2] = [
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
    r"SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall",
];

/// Preferred uninstall command value
pub const QUIET_UNINSTALL_VALUE: &str = "QuietUninstallString";

/// Fallback uninstall command value
pub const UNINSTALL_VALUE: &str = "UninstallString";

/// A registry value the matcher knows how to compare
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryValue {
    String(String),
    Dword(u32),
}

impl fmt::Display for RegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryValue::String(s) => f.write_str(s),
            RegistryValue::Dword(n) => write!(f, "{n}"),
        }
    }
}

/// Read-only view of the local-machine hive.
///
/// Keys are paths relative to `HKEY_LOCAL_MACHINE`. Missing or inaccessible
/// keys and values surface as errors that callers treat as "skip".
#[cfg_attr(test, mockall::automock)]
pub trait UninstallRegistry: Send + Sync {
    /// Immediate subkey names of `root`.
    fn subkeys(&self, root: &str) -> io::Result<Vec<String>>;

    /// Value `name` of `key`.
    fn value(&self, key: &str, name: &str) -> io::Result<RegistryValue>;
}

/// The machine's registry
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRegistry;

#[cfg(windows)]
impl UninstallRegistry for NativeRegistry {
    fn subkeys(&self, root: &str) -> io::Result<Vec<String>> {
        super::windows::subkeys(root)
    }

    fn value(&self, key: &str, name: &str) -> io::Result<RegistryValue> {
        super::windows::value(key, name)
    }
}

// No registry here: every lookup finds nothing, so uninstall reports no match
#[cfg(not(windows))]
impl UninstallRegistry for NativeRegistry {
    fn subkeys(&self, root: &str) -> io::Result<Vec<String>> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no registry available for {root}"),
        ))
    }

    fn value(&self, key: &str, _name: &str) -> io::Result<RegistryValue> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no registry available for {key}"),
        ))
    }
}

/// Full path of `subkey` under `root`
#[inline]
pub fn subkey_path(root: &str, subkey: &str) -> String {
    format!(r"{root}\{subkey}")
}
