//! All-or-nothing zip extraction
//!
//! Every entry must pass [`zip::read::ZipFile::enclosed_name`] and resolve
//! lexically under the destination before anything is written for it; an entry that lands outside (zip-slip) aborts the whole
//! extraction. On any failure the destination directory is removed.

use std::fs;
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};
use zip::ZipArchive;

use crate::error::ExtractError;

/// Extract `archive` into `dest`, creating it.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    info!("extracting {} to {}", archive.display(), dest.display());

    let result = extract_entries(archive, dest);
    if result.is_err() {
        if let Err(e) = fs::remove_dir_all(dest) {
            warn!(
                "could not remove partial extraction {}: {e}",
                dest.display()
            );
        }
    }
    result
}

fn extract_entries(archive_path: &Path, dest: &Path) -> Result<(), ExtractError> {
    let archive_error = |source| ExtractError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };

    fs::create_dir_all(dest).map_err(|source| ExtractError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    let file = fs::File::open(archive_path).map_err(|source| ExtractError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(archive_error)?;

    let root = lexical_clean(dest);
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(archive_error)?;
        let name = entry.name().to_string();

        // The archive's own check rejects absolute names and `..` escapes;
        // ours also treats `\` as a separator on every host.
        let target = entry
            .enclosed_name()
            .and_then(|_| entry_target(&root, &name))
            .ok_or_else(|| ExtractError::PathTraversal {
                entry: name.clone(),
                dest: dest.to_path_buf(),
            })?;
        let io_error = |source| ExtractError::Io {
            path: target.clone(),
            source,
        };

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(io_error)?;
            continue;
        }

        // Only a directory entry may resolve to the root itself
        if target == root {
            return Err(ExtractError::PathTraversal {
                entry: name,
                dest: dest.to_path_buf(),
            });
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut out = fs::File::create(&target).map_err(io_error)?;
        std::io::copy(&mut entry, &mut out).map_err(io_error)?;

        apply_mode(&target, entry.unix_mode()).map_err(io_error)?;

        debug!("extracted {}", target.display());
    }

    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> std::io::Result<()> {
    Ok(())
}

/// Where entry `name` lands under `root`, or `None` if it escapes.
///
/// Both `/` and `\` separate components; `..` is resolved lexically.
fn entry_target(root: &Path, name: &str) -> Option<PathBuf> {
    let mut target = root.to_path_buf();
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                if !target.pop() {
                    return None;
                }
            }
            part => target.push(part),
        }
    }
    target.starts_with(root).then_some(target)
}

/// Drop `.` components and fold `..` into their parent without touching the filesystem
fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(component);
                }
            }
            other => cleaned.push(other),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}
