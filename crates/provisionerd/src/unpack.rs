// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Defensive extraction of job source archives.
//!
//! Archives come from the control plane but ultimately from users, so
//! every entry path is normalised and checked against the work
//! directory before anything touches disk.

use std::io::Read;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Component, Path, PathBuf};

use tar::EntryType;
use thiserror::Error;
use tracing::debug;

/// Largest file a single tar entry may produce (10 MiB).
pub(crate) const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Mode applied when the archive records none.
const DEFAULT_MODE: u32 = 0o600;

/// Extraction failures. Each message is forwarded verbatim to the
/// control plane as the job cancellation cause.
#[derive(Debug, Error)]
pub(crate) enum UnpackError {
    #[error("read project source archive: {0}")]
    Archive(std::io::Error),

    #[error("tar attempts to target relative upper directory")]
    PathEscape,

    #[error("mkdir {path:?}: {source}")]
    Mkdir { path: PathBuf, source: std::io::Error },

    #[error("create file {path:?}: {source}")]
    Create { path: PathBuf, source: std::io::Error },

    #[error("copy file {path:?}: {source}")]
    Copy { path: PathBuf, source: std::io::Error },

    #[error("file {path:?} of {size} bytes exceeds the 10 MiB cap")]
    FileTooLarge { path: PathBuf, size: u64 },
}

/// Extract a tar-formatted archive into `dir`.
///
/// Directory and regular-file entries are materialised; everything else
/// (symlinks, devices, hard links) is skipped. Entry paths must stay
/// inside `dir` after lexical normalisation.
pub(crate) fn extract(archive: &[u8], dir: &Path) -> Result<(), UnpackError> {
    let mut archive = tar::Archive::new(archive);
    for entry in archive.entries().map_err(UnpackError::Archive)? {
        let mut entry = entry.map_err(UnpackError::Archive)?;
        let name = entry.path().map_err(UnpackError::Archive)?.into_owned();
        let path = sanitized_path(dir, &name)?;

        let mode = match entry.header().mode().map_err(UnpackError::Archive)? {
            0 => DEFAULT_MODE,
            mode => mode,
        };

        match entry.header().entry_type() {
            EntryType::Directory => {
                std::fs::DirBuilder::new()
                    .recursive(true)
                    .mode(mode)
                    .create(&path)
                    .map_err(|source| UnpackError::Mkdir { path: path.clone(), source })?;
                debug!(path = %path.display(), "extracted directory");
            }
            EntryType::Regular => {
                let size = entry.size();
                if size > MAX_FILE_SIZE {
                    return Err(UnpackError::FileTooLarge { path, size });
                }
                let mut file = std::fs::OpenOptions::new()
                    .create(true)
                    .truncate(true)
                    .write(true)
                    .mode(mode)
                    .open(&path)
                    .map_err(|source| UnpackError::Create { path: path.clone(), source })?;
                let written = std::io::copy(&mut entry.by_ref().take(MAX_FILE_SIZE), &mut file)
                    .map_err(|source| UnpackError::Copy { path: path.clone(), source })?;
                debug!(size_bytes = written, path = %path.display(), mode, "extracted file");
            }
            // Symlinks, devices, and hard links are not permitted.
            _ => {}
        }
    }
    Ok(())
}

/// Join `name` onto `root` and normalise it lexically. The result must
/// keep `root` as a prefix; anything else is a traversal attempt.
fn sanitized_path(root: &Path, name: &Path) -> Result<PathBuf, UnpackError> {
    let mut path = root.to_path_buf();
    for component in name.components() {
        match component {
            // Absolute entry names are jailed under the root.
            Component::CurDir | Component::RootDir => {}
            Component::Prefix(_) => return Err(UnpackError::PathEscape),
            Component::ParentDir => {
                path.pop();
            }
            Component::Normal(part) => path.push(part),
        }
    }
    if path.starts_with(root) {
        Ok(path)
    } else {
        Err(UnpackError::PathEscape)
    }
}

#[cfg(test)]
#[path = "unpack_tests.rs"]
mod tests;
