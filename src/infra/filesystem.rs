//! Filesystem operations
//!
//! Handles directory creation, atomic file replacement and artifact linking.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Replace `path` with `content` atomically
///
/// The content is written to a temporary file in the same directory, synced,
/// and renamed over the target. Readers see either the old or the new file,
/// never a partial one.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), FilesystemError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    create_dir_all(parent)?;

    let write_error = |e: io::Error| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_error)?;
    tmp.write_all(content).map_err(write_error)?;
    tmp.as_file().sync_all().map_err(write_error)?;
    tmp.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}

/// Package name encoded in an artifact file name
///
/// Artifacts follow `name-version-release-arch<suffix>`. Returns `None` when
/// the file does not carry one of `suffixes`.
pub fn artifact_package_name<'a>(file_name: &'a str, suffixes: &[String]) -> Option<&'a str> {
    let stem = suffixes
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix.as_str()))?;

    let mut parts = stem.rsplitn(4, '-');
    let (Some(_arch), Some(_release), Some(_version), Some(name)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Some(stem);
    };
    Some(name)
}

/// Built artifacts of `pkgname` in `dir`, sorted by file name
pub fn find_artifacts(dir: &Path, pkgname: &str, suffixes: &[String]) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| artifact_package_name(name, suffixes))
                == Some(pkgname)
        })
        .map(|entry| entry.path())
        .collect();
    found.sort();
    found
}

/// Every artifact in `dir`, regardless of package name
pub fn find_all_artifacts(dir: &Path, suffixes: &[String]) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| artifact_package_name(name, suffixes).is_some())
        })
        .map(|entry| entry.path())
        .collect();
    found.sort();
    found
}

/// Link `artifact` into `destination`, copying when hard links are not possible
///
/// An artifact already published under the same name is left in place.
pub fn link_into(artifact: &Path, destination: &Path) -> Result<PathBuf, FilesystemError> {
    create_dir_all(destination)?;

    let file_name = artifact.file_name().ok_or_else(|| FilesystemError::Link {
        from: artifact.to_path_buf(),
        to: destination.to_path_buf(),
        error: "artifact path has no file name".to_string(),
    })?;
    let target = destination.join(file_name);

    let link_error = |e: io::Error| FilesystemError::Link {
        from: artifact.to_path_buf(),
        to: target.clone(),
        error: e.to_string(),
    };

    match std::fs::hard_link(artifact, &target) {
        Ok(()) => Ok(target),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            tracing::debug!(artifact = %target.display(), "artifact already published");
            Ok(target)
        }
        Err(_) => match std::fs::copy(artifact, &target) {
            Ok(_) => Ok(target),
            Err(e) => Err(link_error(e)),
        },
    }
}
