//! Error handling for sled backend
//!
//! Sled failures are logged in full and reported to blob handles as a
//! [`ResultCode`] plus the error text.

use std::fmt;
use std::path::PathBuf;

use crate::error::ResultCode;

/// Sled-specific error wrapper
#[derive(Debug)]
pub enum SledBlobError {
    /// Sled database error
    Sled(sled::Error),

    /// Filesystem error while preparing the database directory
    Io(std::io::Error),

    /// `create_if_missing` was off and nothing exists at the path
    Missing(PathBuf),
}

impl SledBlobError {
    /// Status code reported to blob handles for this error.
    pub fn code(&self) -> ResultCode {
        match self {
            SledBlobError::Sled(err) => match err {
                sled::Error::Io(_) => ResultCode::IoErr,
                sled::Error::Corruption { .. } => ResultCode::Corrupt,
                sled::Error::CollectionNotFound(_) => ResultCode::Error,
                sled::Error::Unsupported(_) => ResultCode::Misuse,
                _ => ResultCode::Internal,
            },
            SledBlobError::Io(_) => ResultCode::IoErr,
            SledBlobError::Missing(_) => ResultCode::CantOpen,
        }
    }
}

impl fmt::Display for SledBlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SledBlobError::Sled(e) => write!(f, "Sled database error: {}", e),
            SledBlobError::Io(e) => write!(f, "IO error: {}", e),
            SledBlobError::Missing(path) => {
                write!(f, "No sled database at {}", path.display())
            }
        }
    }
}

impl std::error::Error for SledBlobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SledBlobError::Sled(e) => Some(e),
            SledBlobError::Io(e) => Some(e),
            SledBlobError::Missing(_) => None,
        }
    }
}

impl From<sled::Error> for SledBlobError {
    fn from(err: sled::Error) -> Self {
        SledBlobError::Sled(err)
    }
}

impl From<std::io::Error> for SledBlobError {
    fn from(err: std::io::Error) -> Self {
        SledBlobError::Io(err)
    }
}
