//! Change detection against the persisted cache record

use std::fmt;

use log::{debug, warn};

use crate::cache::CacheDetails;
use crate::config::UpdaterConfig;
use crate::download::UpdateSource;

/// Why an update is required
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    Forced,
    UrlChanged,
    /// The metadata probe failed or returned a non-success status
    ProbeFailed,
    LengthChanged,
    EtagChanged,
    /// The cached artifact was fetched but never installed
    NotInstalled,
}

impl ChangeReason {
    /// Whether a payload fetched for the current URL is still the artifact to install.
    ///
    /// Length and etag changes mean the remote artifact moved on after the
    /// payload was fetched.
    pub fn keeps_payload(self) -> bool {
        matches!(
            self,
            ChangeReason::Forced | ChangeReason::ProbeFailed | ChangeReason::NotInstalled
        )
    }
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ChangeReason::Forced => "force install is set",
            ChangeReason::UrlChanged => "download url changed",
            ChangeReason::ProbeFailed => "remote metadata unavailable",
            ChangeReason::LengthChanged => "content length changed",
            ChangeReason::EtagChanged => "etag changed",
            ChangeReason::NotInstalled => "cached download not installed",
        };
        f.write_str(text)
    }
}

/// Result of a change check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCheck {
    UpToDate,
    Required(ChangeReason),
}

impl UpdateCheck {
    #[inline]
    pub fn needs_update(self) -> bool {
        matches!(self, UpdateCheck::Required(_))
    }
}

impl fmt::Display for UpdateCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateCheck::UpToDate => f.write_str("no update needed"),
            UpdateCheck::Required(reason) => write!(f, "update required: {reason}"),
        }
    }
}

/// Decide whether the configured artifact must be fetched and installed.
///
/// Checks run in order and the first hit wins: force flag, URL, probe
/// failure, content length, etag, installed flag.
pub async fn check_for_update(
    source: &dyn UpdateSource,
    config: &UpdaterConfig,
    cached: &CacheDetails,
) -> UpdateCheck {
    let check = evaluate(source, config, cached).await;
    debug!("change check for {}: {check}", config.download_url);
    check
}

/// [`check_for_update`] reduced to a boolean
pub async fn needs_update(
    source: &dyn UpdateSource,
    config: &UpdaterConfig,
    cached: &CacheDetails,
) -> bool {
    check_for_update(source, config, cached).await.needs_update()
}

async fn evaluate(
    source: &dyn UpdateSource,
    config: &UpdaterConfig,
    cached: &CacheDetails,
) -> UpdateCheck {
    if config.force_install {
        return UpdateCheck::Required(ChangeReason::Forced);
    }

    if cached.download_url != config.download_url {
        return UpdateCheck::Required(ChangeReason::UrlChanged);
    }

    let remote = match source.head(&config.download_url).await {
        Ok(meta) if meta.is_success() => meta,
        Ok(meta) => {
            warn!(
                "metadata probe of {} returned HTTP {}",
                config.download_url, meta.status
            );
            return UpdateCheck::Required(ChangeReason::ProbeFailed);
        }
        Err(e) => {
            warn!("metadata probe of {} failed: {e}", config.download_url);
            return UpdateCheck::Required(ChangeReason::ProbeFailed);
        }
    };

    if remote.content_length.unwrap_or(0) != cached.content_length {
        return UpdateCheck::Required(ChangeReason::LengthChanged);
    }

    if remote.etag != cached.etag {
        return UpdateCheck::Required(ChangeReason::EtagChanged);
    }

    if !cached.installed {
        return UpdateCheck::Required(ChangeReason::NotInstalled);
    }

    UpdateCheck::UpToDate
}
