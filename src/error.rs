//! Error taxonomy for the update engine
//!
//! One enum per component, folded into [`UpdateError`] at the orchestration
//! boundary. Component-local recoverable conditions never reach these types;
//! they are logged where they happen.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::state_machine::Phase;

/// Boxed transport failure reported by an [`UpdateSource`](crate::download::UpdateSource).
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures of the download pipeline
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("server returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error(
        "not enough free space on {}: {available} bytes available, {required} bytes needed",
        .path.display()
    )]
    InsufficientSpace {
        path: PathBuf,
        available: u64,
        required: u64,
    },

    #[error("could not write download to {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "download of {url} stalled: no data for {}s after {bytes_downloaded} bytes",
        .idle.as_secs()
    )]
    Stalled {
        url: String,
        bytes_downloaded: u64,
        idle: Duration,
    },

    #[error("download cancelled")]
    Cancelled,
}

/// Failures while unpacking a zip payload
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("could not read archive {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("illegal file path in archive: {entry} resolves outside {}", .dest.display())]
    PathTraversal { entry: String, dest: PathBuf },

    #[error("could not extract {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while looking for the installer inside a payload
#[derive(Debug, Error)]
pub enum LocateError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("could not find installer at {}: {source}", .path.display())]
    NotAtConfiguredPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not find a file that resembles an installer in {}", .path.display())]
    NoInstaller { path: PathBuf },

    #[error("could not inspect {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Every matching installation failed to uninstall
#[derive(Debug, Error)]
#[error("encountered errors uninstalling programs: {}", .failures.join("; "))]
pub struct UninstallError {
    pub failures: Vec<String>,
}

/// The installer could not be run or exited unsuccessfully
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("could not launch installer {}: {source}", .installer.display())]
    Spawn {
        installer: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "encountered error installing program (exit code {}): {output}",
        exit_code(.code)
    )]
    Failed { code: Option<i32>, output: String },
}

/// Invalid or unreadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid address '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("registry_lookup_key and registry_lookup_value must be set together")]
    IncompleteRegistryLookup,

    #[error("installer_path must be relative, got {0}")]
    AbsoluteInstallerPath(String),

    #[error("installer_path must stay inside the payload, got {0}")]
    EscapingInstallerPath(String),

    #[error("could not read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

/// A failed orchestration run
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Locate(LocateError),

    #[error(transparent)]
    Uninstall(#[from] UninstallError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("update cancelled while {phase}")]
    Cancelled { phase: Phase },

    #[error("install worker failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<LocateError> for UpdateError {
    fn from(err: LocateError) -> Self {
        match err {
            LocateError::Extract(e) => UpdateError::Extract(e),
            other => UpdateError::Locate(other),
        }
    }
}

/// Failures while bringing up an [`Updater`](crate::orchestration::Updater)
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

fn exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}
