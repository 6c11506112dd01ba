//! Error types for the shared store layer.
//!
//! Errors at this level are transport-focused. Malformed stored values are
//! not an error here: the store only moves opaque strings.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a [`SharedStore`](crate::SharedStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Generic I/O failure of the backing medium.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The key cannot be represented by this store.
    #[error("invalid key {key:?}: {message}")]
    InvalidKey { key: String, message: String },

    /// The root of a disk-backed store is unusable.
    #[error("invalid store root {}: {message}", .path.display())]
    RootPathInvalid { path: PathBuf, message: String },
}

impl StoreError {
    pub(crate) fn invalid_key(key: &str, message: impl Into<String>) -> Self {
        StoreError::InvalidKey {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn error_display() {
        let e = StoreError::invalid_key("a/b", "path separators are not allowed");
        let display = format!("{}", e);
        assert!(display.contains("a/b"));
        assert!(display.contains("path separators"));

        let e = StoreError::RootPathInvalid {
            path: PathBuf::from("/nope"),
            message: "missing".to_string(),
        };
        assert!(format!("{}", e).contains("/nope"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StoreError = io_err.into();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(StdError::source(&err).is_some());
    }
}
