//! Unattended update engine for third-party Windows applications.
//!
//! An [`Updater`] keeps a background download of the configured artifact
//! running and, when triggered, decides whether an update is needed, finds
//! the installer inside the payload, removes matching prior installations
//! and runs the installer.

pub mod cache;
pub mod config;
pub mod detection;
pub mod download;
pub mod error;
pub mod install;
pub mod orchestration;
pub mod state_machine;

pub use cache::{CacheDetails, CacheStore, InstanceIdentity};
pub use config::UpdaterConfig;
pub use detection::{ChangeReason, UpdateCheck, check_for_update, needs_update};
pub use error::{StartError, UpdateError};
pub use orchestration::{Collaborators, InstallReport, UpdateOutcome, Updater, UpdaterBuilder};
pub use state_machine::Phase;
