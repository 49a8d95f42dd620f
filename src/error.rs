use std::io;

use strum::{AsRefStr, Display, EnumIter, FromRepr};
use thiserror::Error;

pub type BlobResult<T> = Result<T, BlobError>;

/// Non-success status codes reported by a storage backend.
///
/// The numbering follows the SQLite primary result codes so that codes
/// coming from SQLite-compatible engines can be carried through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter, FromRepr)]
#[repr(i32)]
pub enum ResultCode {
    Error = 1,
    Internal = 2,
    Perm = 3,
    Abort = 4,
    Busy = 5,
    Locked = 6,
    NoMem = 7,
    ReadOnly = 8,
    Interrupt = 9,
    IoErr = 10,
    Corrupt = 11,
    NotFound = 12,
    Full = 13,
    CantOpen = 14,
    Protocol = 15,
    Empty = 16,
    Schema = 17,
    TooBig = 18,
    Constraint = 19,
    Mismatch = 20,
    Misuse = 21,
    NoLfs = 22,
    Auth = 23,
    Format = 24,
    Range = 25,
    NotADb = 26,
}

impl ResultCode {
    /// Numeric value of the code as the backend reports it.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Canonical description, used when the backend has no error text.
    pub fn description(self) -> &'static str {
        match self {
            ResultCode::Error => "SQL logic error",
            ResultCode::Internal => "internal logic error",
            ResultCode::Perm => "access permission denied",
            ResultCode::Abort => "query aborted",
            ResultCode::Busy => "database is locked",
            ResultCode::Locked => "database table is locked",
            ResultCode::NoMem => "out of memory",
            ResultCode::ReadOnly => "attempt to write a readonly database",
            ResultCode::Interrupt => "interrupted",
            ResultCode::IoErr => "disk I/O error",
            ResultCode::Corrupt => "database disk image is malformed",
            ResultCode::NotFound => "unknown operation",
            ResultCode::Full => "database or disk is full",
            ResultCode::CantOpen => "unable to open database file",
            ResultCode::Protocol => "locking protocol",
            ResultCode::Empty => "table contains no data",
            ResultCode::Schema => "database schema has changed",
            ResultCode::TooBig => "string or blob too big",
            ResultCode::Constraint => "constraint failed",
            ResultCode::Mismatch => "datatype mismatch",
            ResultCode::Misuse => "bad parameter or other API misuse",
            ResultCode::NoLfs => "large file support is disabled",
            ResultCode::Auth => "authorization denied",
            ResultCode::Format => "auxiliary database format error",
            ResultCode::Range => "column index out of range",
            ResultCode::NotADb => "file is not a database",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Range(String),

    #[error("{0}")]
    Overflow(String),

    #[error("I/O operation on closed blob")]
    Closed,

    #[error("The connection has been closed")]
    ConnectionClosed,

    #[error("Blob is already in use by another operation")]
    InUse,

    #[error("{code}: {message}")]
    Backend { code: ResultCode, message: String },
}

impl BlobError {
    /// Builds a backend error, falling back to the code's description when
    /// the backend supplied no text.
    pub fn backend(code: ResultCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            code.description().to_string()
        } else {
            message
        };
        BlobError::Backend { code, message }
    }

    /// The backend status code, if this error came from the backend.
    pub fn result_code(&self) -> Option<ResultCode> {
        match self {
            BlobError::Backend { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<BlobError> for io::Error {
    fn from(err: BlobError) -> Self {
        let kind = match &err {
            BlobError::InvalidArgument(_) | BlobError::Range(_) | BlobError::Overflow(_) => {
                io::ErrorKind::InvalidInput
            }
            BlobError::Closed | BlobError::ConnectionClosed => io::ErrorKind::NotConnected,
            BlobError::InUse => io::ErrorKind::WouldBlock,
            BlobError::Backend {
                code: ResultCode::ReadOnly | ResultCode::Perm | ResultCode::Auth,
                ..
            } => io::ErrorKind::PermissionDenied,
            BlobError::Backend {
                code: ResultCode::NotFound,
                ..
            } => io::ErrorKind::NotFound,
            BlobError::Backend { .. } => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn result_codes_round_trip_through_repr() {
        for code in ResultCode::iter() {
            assert_eq!(ResultCode::from_repr(code.code()), Some(code));
        }
        assert_eq!(ResultCode::from_repr(0), None);
    }

    #[test]
    fn empty_backend_message_uses_description() {
        let err = BlobError::backend(ResultCode::TooBig, "");
        assert_eq!(err.to_string(), "TooBig: string or blob too big");

        let err = BlobError::backend(ResultCode::Abort, "blob row was deleted");
        assert_eq!(err.result_code(), Some(ResultCode::Abort));
        assert_eq!(err.to_string(), "Abort: blob row was deleted");
    }

    #[test]
    fn closed_message_matches_file_semantics() {
        assert_eq!(BlobError::Closed.to_string(), "I/O operation on closed blob");
    }

    #[test]
    fn io_error_kinds() {
        let err: io::Error = BlobError::InUse.into();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        let err: io::Error = BlobError::Range("past end".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let err: io::Error = BlobError::backend(ResultCode::ReadOnly, "").into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
