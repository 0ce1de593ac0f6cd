//! Finding the installer inside a downloaded payload

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::{info, warn};

use super::extract::extract_zip;
use crate::error::LocateError;

/// Extensions that qualify a file as an installer
pub const INSTALLER_EXTENSIONS: [&str; 3] = ["exe", "msi", "bat"];

/// Extension of payloads that are unpacked before the search
pub const ARCHIVE_EXTENSION: &str = "zip";

/// The installer to run and the directory it was found in, if one was created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerLocation {
    pub installer: PathBuf,
    /// Directory to remove afterwards; `None` when the payload is the installer itself
    pub extracted_dir: Option<PathBuf>,
}

impl InstallerLocation {
    /// Remove the extracted directory, if any. Failures are logged.
    pub fn cleanup(&self) {
        if let Some(dir) = &self.extracted_dir {
            remove_dir_logged(dir);
        }
    }
}

/// Locate the installer for `payload`.
///
/// A zip is extracted next to itself first. A single file must carry an
/// installer extension. In a directory, `installer_path` is used when set;
/// otherwise the first installer-like regular file among the immediate
/// children, sorted by name, is taken. Subdirectories are never searched.
/// Any directory created here is removed again when no installer is found.
pub fn locate(payload: &Path, installer_path: Option<&str>) -> Result<InstallerLocation, LocateError> {
    let installer_path = installer_path.filter(|p| !p.trim().is_empty());

    if has_extension(payload, &[ARCHIVE_EXTENSION]) {
        let dest = payload.with_extension("");
        extract_zip(payload, &dest)?;

        let found = locate_in_dir(&dest, installer_path);
        if found.is_err() {
            remove_dir_logged(&dest);
        }
        return found.map(|installer| InstallerLocation {
            installer,
            extracted_dir: Some(dest),
        });
    }

    let meta = fs::metadata(payload).map_err(|source| LocateError::Io {
        path: payload.to_path_buf(),
        source,
    })?;

    if meta.is_dir() {
        let found = locate_in_dir(payload, installer_path);
        if found.is_err() {
            remove_dir_logged(payload);
        }
        return found.map(|installer| InstallerLocation {
            installer,
            extracted_dir: Some(payload.to_path_buf()),
        });
    }

    if has_extension(payload, &INSTALLER_EXTENSIONS) {
        info!("payload is the installer: {}", payload.display());
        Ok(InstallerLocation {
            installer: payload.to_path_buf(),
            extracted_dir: None,
        })
    } else {
        Err(LocateError::NoInstaller {
            path: payload.to_path_buf(),
        })
    }
}

fn locate_in_dir(dir: &Path, installer_path: Option<&str>) -> Result<PathBuf, LocateError> {
    match installer_path {
        Some(relative) => {
            let installer = dir.join(relative);
            let missing = |source| LocateError::NotAtConfiguredPath {
                path: installer.clone(),
                source,
            };
            if !is_contained(relative) {
                return Err(missing(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "path leaves the payload directory",
                )));
            }
            if !fs::metadata(&installer).map_err(missing)?.is_file() {
                return Err(missing(io::Error::other("not a regular file")));
            }
            info!("using configured installer {}", installer.display());
            Ok(installer)
        }
        None => {
            let installer = first_installer(dir)?;
            info!("found installer {}", installer.display());
            Ok(installer)
        }
    }
}

/// Whether `relative` names something beneath its base directory.
///
/// Both `/` and `\` count as separators, so `..` is caught on every host.
pub(crate) fn is_contained(relative: &str) -> bool {
    let path = Path::new(relative);
    let anchored = path
        .components()
        .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir));
    !anchored && !relative.split(['/', '\\']).any(|part| part == "..")
}

/// One-level scan: immediate regular files only, in name order
fn first_installer(dir: &Path) -> Result<PathBuf, LocateError> {
    let io_error = |source| LocateError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if entry.file_type().map_err(io_error)?.is_file() {
            candidates.push(entry.path());
        }
    }
    candidates.sort();

    candidates
        .into_iter()
        .find(|path| has_extension(path, &INSTALLER_EXTENSIONS))
        .ok_or_else(|| LocateError::NoInstaller {
            path: dir.to_path_buf(),
        })
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

fn remove_dir_logged(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        warn!("could not remove {}: {e}", dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::extract::tests::write_zip;

    #[test]
    fn nested_installer_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("payload");
        fs::create_dir_all(payload.join("sub")).unwrap();
        fs::write(payload.join("sub").join("app.exe"), b"MZ").unwrap();

        let err = locate(&payload, None).unwrap_err();
        assert!(matches!(err, LocateError::NoInstaller { .. }));
        assert!(!payload.exists());
    }

    #[test]
    fn top_level_installer_is_picked_over_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("payload");
        fs::create_dir_all(&payload).unwrap();
        fs::write(payload.join("setup.exe"), b"MZ").unwrap();
        fs::write(payload.join("README.md"), b"docs").unwrap();

        let location = locate(&payload, None).unwrap();
        assert_eq!(location.installer, payload.join("setup.exe"));
        assert_eq!(location.extracted_dir.as_deref(), Some(payload.as_path()));
    }

    #[test]
    fn candidates_are_taken_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("payload");
        fs::create_dir_all(payload.join("a.exe")).unwrap();
        fs::write(payload.join("z-setup.msi"), b"").unwrap();
        fs::write(payload.join("b-setup.EXE"), b"").unwrap();

        let location = locate(&payload, None).unwrap();
        assert_eq!(location.installer, payload.join("b-setup.EXE"));
    }

    #[test]
    fn zip_payload_is_extracted_and_configured_path_used() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("app.zip");
        write_zip(&archive, &[("pkg/install.bat", b"@echo off")]);

        let location = locate(&archive, Some("pkg/install.bat")).unwrap();
        let extracted = dir.path().join("app");
        assert_eq!(location.installer, extracted.join("pkg/install.bat"));
        assert_eq!(location.extracted_dir.as_deref(), Some(extracted.as_path()));
        assert!(location.installer.is_file());

        location.cleanup();
        assert!(!extracted.exists());
    }

    #[test]
    fn wrong_configured_path_removes_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("app.zip");
        write_zip(&archive, &[("pkg/install.bat", b"@echo off")]);

        let err = locate(&archive, Some("setup.exe")).unwrap_err();
        assert!(matches!(err, LocateError::NotAtConfiguredPath { .. }));
        assert!(!dir.path().join("app").exists());
    }

    #[test]
    fn configured_path_must_stay_inside_and_be_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("payload");
        fs::create_dir_all(payload.join("pkg")).unwrap();
        fs::write(dir.path().join("outside.exe"), b"MZ").unwrap();

        let err = locate(&payload, Some("../outside.exe")).unwrap_err();
        assert!(matches!(err, LocateError::NotAtConfiguredPath { .. }));
        assert!(!payload.exists());

        fs::create_dir_all(payload.join("pkg")).unwrap();
        let err = locate(&payload, Some("pkg")).unwrap_err();
        assert!(matches!(err, LocateError::NotAtConfiguredPath { .. }));
    }

    #[test]
    fn containment_checks_both_separators() {
        assert!(is_contained("pkg/setup.exe"));
        assert!(is_contained("pkg\\setup.exe"));
        assert!(is_contained("./setup..exe"));
        assert!(!is_contained("../setup.exe"));
        assert!(!is_contained("pkg\\..\\..\\setup.exe"));
        assert!(!is_contained("/setup.exe"));
    }

    #[test]
    fn single_file_needs_installer_extension() {
        let dir = tempfile::tempdir().unwrap();
        let msi = dir.path().join("Product.MSI");
        fs::write(&msi, b"").unwrap();
        let location = locate(&msi, None).unwrap();
        assert_eq!(location.installer, msi);
        assert_eq!(location.extracted_dir, None);

        let text = dir.path().join("notes.txt");
        fs::write(&text, b"").unwrap();
        assert!(matches!(
            locate(&text, None),
            Err(LocateError::NoInstaller { .. })
        ));
    }

    #[test]
    fn blank_installer_path_falls_back_to_scan() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        write_zip(&archive, &[("install.bat", b""), ("data/blob.bin", b"")]);

        let location = locate(&archive, Some("  ")).unwrap();
        assert_eq!(location.installer, dir.path().join("bundle").join("install.bat"));
    }
}
