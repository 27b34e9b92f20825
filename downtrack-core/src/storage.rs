//! Destination directory checks performed at submit time.
//!
//! The tracker needs one guarantee from the filesystem before it hands a
//! request to the backend: the destination's parent directory exists (or can
//! be created) and is writable right now. Everything else about storage is
//! the backend's problem.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while preparing a destination's parent directory.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The destination path has no parent directory component.
    #[error("destination {path} has no parent directory")]
    NoParent {
        /// The destination that was checked.
        path: PathBuf,
    },

    /// The parent directory does not exist and could not be created.
    #[error("cannot create directory {path}: {source}")]
    Create {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The parent directory exists but is not writable at call time.
    #[error("directory {path} is not writable")]
    NotWritable {
        /// The directory that failed the writability check.
        path: PathBuf,
    },
}

/// Ensures the parent directory of `destination` exists and is writable.
///
/// Creates missing intermediate directories. Returns the parent directory
/// path on success.
///
/// # Errors
///
/// Returns [`StorageError::NoParent`] if the path has no parent component,
/// [`StorageError::Create`] if directory creation fails, and
/// [`StorageError::NotWritable`] if the directory exists but the storage
/// medium rejects writes (e.g. read-only mount).
pub fn ensure_writable_parent(destination: &Path) -> Result<PathBuf, StorageError> {
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        // A bare filename targets the current directory.
        Some(_) => PathBuf::from("."),
        None => {
            return Err(StorageError::NoParent {
                path: destination.to_path_buf(),
            });
        }
    };

    std::fs::create_dir_all(&parent).map_err(|source| StorageError::Create {
        path: parent.clone(),
        source,
    })?;

    if !is_writable(&parent) {
        return Err(StorageError::NotWritable { path: parent });
    }

    Ok(parent)
}

/// Checks whether `dir` accepts writes right now.
///
/// Permission bits alone miss read-only mounts and full devices, so this
/// probes with a short-lived marker file.
fn is_writable(dir: &Path) -> bool {
    let probe = dir.join(format!(".downtrack-probe-{}", std::process::id()));
    match std::fs::File::create(&probe) {
        Ok(file) => {
            drop(file);
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
