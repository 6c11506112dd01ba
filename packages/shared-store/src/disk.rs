//! Disk-backed shared store.
//!
//! Each key is one file in a root directory, which lets unrelated OS
//! processes share state. There is no change feed; processes using this
//! store must poll.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::{SharedStore, StoreError};

/// A store keeping one file per key under `root`.
///
/// Writes land in a uniquely named temporary sibling file first and are
/// then renamed over the key's file, so readers only ever see complete values.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: PathBuf) -> Result<DiskStore, StoreError> {
        let attr = fs::metadata(&root).map_err(|error| StoreError::RootPathInvalid {
            path: root.clone(),
            message: error.to_string(),
        })?;

        if !attr.is_dir() {
            return Err(StoreError::RootPathInvalid {
                path: root,
                message: "root path must be a directory".to_string(),
            });
        }

        if attr.permissions().readonly() {
            return Err(StoreError::RootPathInvalid {
                path: root,
                message: "root directory must be writable".to_string(),
            });
        }

        match root.canonicalize() {
            Ok(root) => Ok(DiskStore { root }),
            Err(error) => Err(StoreError::RootPathInvalid {
                path: root,
                message: error.to_string(),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_to_file_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() {
            return Err(StoreError::invalid_key(key, "key must not be empty"));
        }
        if key.starts_with('.') {
            return Err(StoreError::invalid_key(key, "key must not start with '.'"));
        }
        if key.contains(['/', '\\', '\0']) {
            return Err(StoreError::invalid_key(
                key,
                "path separators are not allowed",
            ));
        }
        Ok(self.root.join(key))
    }
}

impl SharedStore for DiskStore {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let file_path = self.key_to_file_path(key)?;
        tracing::trace!(path = %file_path.display(), "reading");
        match fs::read_to_string(&file_path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let file_path = self.key_to_file_path(key)?;
        tracing::trace!(path = %file_path.display(), "writing");

        // Temp names start with '.', so they never collide with a valid key,
        // and each writer gets its own.
        let mut f = NamedTempFile::new_in(&self.root)?;
        f.write_all(value.as_bytes())?;
        f.as_file().sync_all()?;
        f.persist(&file_path).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let file_path = self.key_to_file_path(key)?;
        match fs::remove_file(&file_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
