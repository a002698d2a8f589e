//! Store lock artifact handling
//!
//! A store at `dir/name.db` is guarded by `dir/.name.db.lock`. The lock is
//! created when a handle opens the store and removed when it is dropped. A
//! process that dies without dropping its handle leaves the file behind, and
//! the store refuses to open while it exists, so [`clear_stale_lock`] removes
//! it before opening.
//!
//! Clearing assumes no other live process holds the store. Concurrent access
//! from several processes is not detected.

use crate::error::{RagError, Result};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Path of the lock artifact guarding `store_path`
pub fn lock_path_for<P: AsRef<Path>>(store_path: P) -> Result<PathBuf> {
    let absolute = std::path::absolute(store_path.as_ref()).map_err(|e| {
        RagError::StoreUnavailable(format!(
            "Failed to resolve store path {}: {}",
            store_path.as_ref().display(),
            e
        ))
    })?;

    let file_name = absolute.file_name().ok_or_else(|| {
        RagError::StoreUnavailable(format!("Store path has no file name: {}", absolute.display()))
    })?;

    let lock_name = format!(".{}.lock", file_name.to_string_lossy());
    Ok(match absolute.parent() {
        Some(dir) => dir.join(lock_name),
        None => PathBuf::from(lock_name),
    })
}

/// Remove a lock artifact left by a previous process. Returns whether one was found.
pub fn clear_stale_lock<P: AsRef<Path>>(store_path: P) -> Result<bool> {
    let lock_path = lock_path_for(store_path)?;
    if !lock_path.is_file() {
        return Ok(false);
    }

    std::fs::remove_file(&lock_path).map_err(|e| {
        RagError::StoreUnavailable(format!(
            "Failed to remove stale lock {}: {}",
            lock_path.display(),
            e
        ))
    })?;
    log::warn!("Removed stale store lock {}", lock_path.display());
    Ok(true)
}

/// Lock artifact held for the lifetime of an open store
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Create the lock file; fails if one already exists
    pub fn acquire<P: AsRef<Path>>(store_path: P) -> Result<Self> {
        let path = lock_path_for(store_path)?;
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                log::debug!("Acquired store lock {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(RagError::StoreUnavailable(
                format!("Store is locked: {}", path.display()),
            )),
            Err(e) => Err(RagError::StoreUnavailable(format!(
                "Failed to create lock {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to release store lock {}: {}", self.path.display(), e);
        }
    }
}
