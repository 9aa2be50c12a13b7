//! # Error Types
//!
//! This module defines the error types used throughout the library.
//! All operations return [`Result<T, CryptionError>`](CryptionError).
//!
//! Only [`CryptionError::Config`] is fatal for a whole batch. Every other
//! variant is caught at the per-task boundary of a drain loop and recorded in
//! the [`BatchReport`](crate::dispatcher::BatchReport) with its [`ErrorKind`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The error type for all queue, cipher and dispatcher operations.
#[derive(Error, Debug)]
pub enum CryptionError {
    /// Missing or too-short key, or an invalid dispatcher configuration.
    ///
    /// Raised before any file is touched.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error while reading or writing a task's file, or while talking to
    /// an OS queue primitive (shared memory, semaphores).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally invalid input:
    /// - ciphertext file shorter than one IV
    /// - malformed serialized task descriptor
    #[error("Format error: {0}")]
    Format(String),

    /// Ciphertext failed validation on decrypt (bad padding, or a length that
    /// is not a positive multiple of the block size).
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// A worker thread or process could not be created.
    #[error("Spawn error: {0}")]
    Spawn(String),
}

impl CryptionError {
    /// The coarse category of this error, as reported in batch results.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptionError::Config(_) => ErrorKind::Config,
            CryptionError::Io(_) => ErrorKind::Io,
            CryptionError::Format(_) => ErrorKind::Format,
            CryptionError::Integrity(_) => ErrorKind::Integrity,
            CryptionError::Spawn(_) => ErrorKind::Spawn,
        }
    }

    /// `true` for errors that abort a batch before any task runs.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, CryptionError::Config(_))
    }
}

/// Serializable error category carried by [`TaskFailure`](crate::dispatcher::TaskFailure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Config,
    Io,
    Format,
    Integrity,
    Spawn,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Io => "IOError",
            ErrorKind::Format => "FormatError",
            ErrorKind::Integrity => "IntegrityError",
            ErrorKind::Spawn => "SpawnError",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(CryptionError::Config("x".into()).kind(), ErrorKind::Config);
        assert_eq!(
            CryptionError::Io(std::io::Error::other("x")).kind(),
            ErrorKind::Io
        );
        assert_eq!(CryptionError::Format("x".into()).kind(), ErrorKind::Format);
        assert_eq!(
            CryptionError::Integrity("x".into()).kind(),
            ErrorKind::Integrity
        );
        assert_eq!(CryptionError::Spawn("x".into()).kind(), ErrorKind::Spawn);
    }

    #[test]
    fn only_config_is_fatal() {
        assert!(CryptionError::Config("short key".into()).is_fatal());
        assert!(!CryptionError::Format("short file".into()).is_fatal());
        assert!(!CryptionError::Spawn("fork".into()).is_fatal());
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&ErrorKind::Integrity).unwrap();
        assert_eq!(json, "\"integrity\"");
        assert_eq!(ErrorKind::Format.to_string(), "FormatError");
    }
}
