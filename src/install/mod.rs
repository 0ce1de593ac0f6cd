//! Payload installation
//!
//! Turns a downloaded payload into an installed program: unpack, find the
//! installer, remove matching prior installations, run the installer.
//!
//! ## Module Organization
//!
//! - `extract` - zip extraction with path-traversal protection
//! - `locate` - installer discovery inside a payload
//! - `uninstall` - registry-driven removal of prior installations
//! - `executor` - running the installer
//! - `registry` / `process` - collaborator seams for the registry and the shell
//! - `windows` - native Win32 registry and volume bindings

pub mod executor;
pub mod extract;
pub mod locate;
pub mod process;
pub mod registry;
pub mod uninstall;

#[cfg(target_os = "windows")]
pub(crate) mod windows;

pub use executor::install;
pub use extract::extract_zip;
pub use locate::{INSTALLER_EXTENSIONS, InstallerLocation, locate};
pub use process::{CommandOutput, CommandRunner, ShellRunner};
pub use registry::{NativeRegistry, RegistryValue, UNINSTALL_ROOTS, UninstallRegistry};
pub use uninstall::{MatchOutcome, UninstallSummary, uninstall_matching};
