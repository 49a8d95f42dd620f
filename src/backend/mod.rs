//! Backend abstraction layer for blob I/O
//!
//! This module defines the narrow interface a storage engine must implement so
//! that [`Blob`](crate::blob::Blob) handles can read and write its blobs
//! incrementally. Implementations live in [`crate::databases`].

use std::fmt;
use std::ops::Range;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::{BlobError, ResultCode};
use crate::placeholder::BlobValue;

/// Result of a backend call: success, or the failure it reported.
pub type BackendStatus<T = ()> = Result<T, BackendFailure>;

/// A failed backend call. The message travels with the code, so concurrent
/// failures on other handles cannot replace it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    pub code: ResultCode,
    pub message: String,
}

impl BackendFailure {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<(ResultCode, String)> for BackendFailure {
    fn from((code, message): (ResultCode, String)) -> Self {
        Self::new(code, message)
    }
}

impl From<BackendFailure> for BlobError {
    fn from(failure: BackendFailure) -> Self {
        BlobError::backend(failure.code, failure.message)
    }
}

/// Location of a single blob: one column of one row of a table.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize, Deserialize,
)]
pub struct BlobTarget {
    pub table: String,
    pub column: String,
    pub rowid: i64,
}

impl BlobTarget {
    pub fn new(table: impl Into<String>, column: impl Into<String>, rowid: i64) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            rowid,
        }
    }

    /// Storage key used by the on-disk backends.
    pub(crate) fn to_key(&self) -> Vec<u8> {
        // Encoding a struct of strings and integers into a Vec cannot fail.
        bincode::encode_to_vec(self, bincode::config::standard()).unwrap_or_default()
    }
}

impl fmt::Display for BlobTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}[{}]", self.table, self.column, self.rowid)
    }
}

/// Checks an access of `len` bytes at `offset` against a stored blob of
/// `stored` bytes that was `expected` bytes long when its handle was opened.
///
/// Returns the byte range to copy, or the status code and message a backend
/// should report.
pub(crate) fn checked_range(
    target: &BlobTarget,
    stored: usize,
    expected: i32,
    offset: i32,
    len: usize,
) -> Result<Range<usize>, (ResultCode, String)> {
    if i32::try_from(stored).ok() != Some(expected) {
        return Err((ResultCode::Abort, format!("blob {target} was modified")));
    }
    let start = usize::try_from(offset)
        .map_err(|_| (ResultCode::Error, "negative blob offset".to_string()))?;
    let end = start
        .checked_add(len)
        .filter(|end| *end <= stored)
        .ok_or_else(|| (ResultCode::Error, "blob access out of range".to_string()))?;
    Ok(start..end)
}

/// Operations a storage engine exposes for incremental blob I/O.
///
/// A handle returned by [`open`](Self::open) addresses a blob whose length is
/// fixed for the life of the handle. All offsets are 32-bit signed, matching
/// the engine's addressing width.
///
/// Calls may block the calling thread for the duration of the underlying
/// I/O; no other guarantee is implied.
pub trait BlobBackend: Send + Sync + 'static {
    type Handle: Send + 'static;

    /// Stores `value` at `target`, replacing any existing blob.
    fn insert(&self, target: &BlobTarget, value: BlobValue) -> BackendStatus;

    /// Opens an I/O session on an existing blob.
    fn open(&self, target: &BlobTarget, writeable: bool) -> BackendStatus<Self::Handle>;

    /// Length in bytes of the blob behind `handle`.
    fn bytes(&self, handle: &Self::Handle) -> i32;

    /// Fills `buf` from the blob starting at `offset`.
    fn read(&self, handle: &Self::Handle, buf: &mut [u8], offset: i32) -> BackendStatus;

    /// Writes all of `data` into the blob starting at `offset`.
    fn write(&self, handle: &mut Self::Handle, data: &[u8], offset: i32) -> BackendStatus;

    /// Releases the session. The handle is released even when an error is
    /// reported.
    fn close(&self, handle: Self::Handle) -> BackendStatus;
}

/// Backend operations, for logging and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BackendOp {
    Insert,
    Open,
    Read,
    Write,
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_distinguish_targets() {
        let a = BlobTarget::new("files", "data", 1);
        let b = BlobTarget::new("files", "data", 2);
        let c = BlobTarget::new("files", "thumb", 1);
        assert_ne!(a.to_key(), b.to_key());
        assert_ne!(a.to_key(), c.to_key());
        assert_eq!(a.to_key(), a.clone().to_key());
    }

    #[test]
    fn range_checks() {
        let target = BlobTarget::new("t", "c", 1);
        assert_eq!(checked_range(&target, 10, 10, 2, 3), Ok(2..5));
        assert_eq!(checked_range(&target, 10, 10, 10, 0), Ok(10..10));
        assert_eq!(checked_range(&target, 10, 10, 8, 3).unwrap_err().0, ResultCode::Error);
        assert_eq!(checked_range(&target, 10, 10, -1, 1).unwrap_err().0, ResultCode::Error);
        assert_eq!(checked_range(&target, 12, 10, 0, 1).unwrap_err().0, ResultCode::Abort);
    }

    #[test]
    fn target_display() {
        assert_eq!(BlobTarget::new("t", "c", 7).to_string(), "t.c[7]");
        assert_eq!(BackendOp::Close.to_string(), "close");
    }

    #[test]
    fn failure_keeps_its_message() {
        let failure = BackendFailure::from((ResultCode::Busy, "row locked".to_string()));
        assert_eq!(
            BlobError::from(failure),
            BlobError::Backend {
                code: ResultCode::Busy,
                message: "row locked".to_string(),
            }
        );

        let blank = BlobError::from(BackendFailure::new(ResultCode::Full, ""));
        assert_eq!(blank.to_string(), "Full: database or disk is full");
    }
}
