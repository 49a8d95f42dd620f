//! Error handling for the redb backend
//!
//! Wraps redb's error types so they can be logged with full detail and then
//! reported to blob handles as a [`ResultCode`].

use thiserror::Error;

use crate::error::ResultCode;

#[derive(Error, Debug)]
pub enum RedbBlobError {
    #[error("Redb Database Error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Redb Transaction Error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Redb Table Error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Redb Storage Error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Redb Commit Error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl RedbBlobError {
    /// Status code reported to blob handles for this error.
    pub fn code(&self) -> ResultCode {
        match self {
            RedbBlobError::Database(redb::DatabaseError::DatabaseAlreadyOpen) => ResultCode::Busy,
            RedbBlobError::Database(_) => ResultCode::CantOpen,
            RedbBlobError::Transaction(_) => ResultCode::Busy,
            RedbBlobError::Table(redb::TableError::TableDoesNotExist(_)) => ResultCode::Error,
            RedbBlobError::Table(_) => ResultCode::Schema,
            RedbBlobError::Storage(redb::StorageError::Corrupted(_)) => ResultCode::Corrupt,
            RedbBlobError::Storage(redb::StorageError::ValueTooLarge(_)) => ResultCode::TooBig,
            RedbBlobError::Storage(_) | RedbBlobError::Commit(_) | RedbBlobError::Io(_) => {
                ResultCode::IoErr
            }
        }
    }
}
