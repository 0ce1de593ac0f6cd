use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Update engine configuration (replaced wholesale on reconfigure).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    pub download_url: String,
    /// Where payloads are written; defaults to the per-instance cache directory.
    #[serde(default)]
    pub download_destination: Option<PathBuf>,
    /// Installer location relative to the extracted/downloaded directory.
    #[serde(default)]
    pub installer_path: Option<String>,
    #[serde(default)]
    pub install_args: Vec<String>,
    #[serde(default)]
    pub registry_lookup_key: Option<String>,
    #[serde(default)]
    pub registry_lookup_value: Option<String>,
    #[serde(default)]
    pub abort_on_uninstall_errors: bool,
    #[serde(default)]
    pub force_install: bool,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

impl UpdaterConfig {
    pub fn new(download_url: impl Into<String>) -> Self {
        Self {
            download_url: download_url.into(),
            ..Self::default()
        }
    }

    /// Check the URL, the registry lookup pair and the installer path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: self.download_url.clone(),
            reason,
        };
        let url = url::Url::parse(&self.download_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }

        if is_blank(&self.registry_lookup_key) != is_blank(&self.registry_lookup_value) {
            return Err(ConfigError::IncompleteRegistryLookup);
        }

        if let Some(installer) = self.installer_path.as_deref() {
            if Path::new(installer).has_root() {
                return Err(ConfigError::AbsoluteInstallerPath(installer.to_string()));
            }
            if !crate::install::locate::is_contained(installer) {
                return Err(ConfigError::EscapingInstallerPath(installer.to_string()));
            }
        }

        Ok(())
    }

    /// The registry lookup pair, when both halves are present.
    pub fn registry_lookup(&self) -> Option<(&str, &str)> {
        if is_blank(&self.registry_lookup_key) || is_blank(&self.registry_lookup_value) {
            return None;
        }
        Some((
            self.registry_lookup_key.as_deref()?,
            self.registry_lookup_value.as_deref()?,
        ))
    }

    /// Configured installer path, treating a blank value as unset.
    pub fn installer_path(&self) -> Option<&str> {
        self.installer_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
    }

    /// Load and validate a TOML (or `.json`) configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };
        let cfg: Self = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&raw).map_err(|e| parse_err(e.to_string()))?
        } else {
            toml::from_str(&raw).map_err(|e| parse_err(e.to_string()))?
        };

        cfg.validate()?;
        Ok(cfg)
    }
}
