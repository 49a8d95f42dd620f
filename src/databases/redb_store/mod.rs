//! Redb-backed blob storage.
//!
//! Blobs live in a single redb table keyed by the bincode encoding of their
//! [`BlobTarget`]. Every incremental write runs in its own write transaction
//! and is committed before the call returns, so a handle never buffers data.
//!
//! ```no_run
//! use netabase_blob::prelude::*;
//!
//! let backend = RedbBackend::open("blobs.redb")?;
//! let conn = Connection::new(backend);
//! let target = BlobTarget::new("media", "content", 7);
//! conn.insert(&target, SizePlaceholder::new(1 << 20)?)?;
//!
//! let blob = conn.blob_open(&target, true)?;
//! blob.write(b"chunk one")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::backend::{BackendFailure, BackendStatus, BlobBackend, BlobTarget, checked_range};
use crate::config::FileConfig;
use crate::error::ResultCode;
use crate::placeholder::BlobValue;

pub use error::RedbBlobError;

pub struct RedbBackend {
    db: Database,
    config: FileConfig,
}

#[derive(Debug)]
pub struct RedbHandle {
    target: BlobTarget,
    key: Vec<u8>,
    length: i32,
    writeable: bool,
}

impl RedbBackend {
    /// Open (creating if needed) a redb blob store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RedbBlobError> {
        Self::with_config(FileConfig::new(path.as_ref()))
    }

    pub fn with_config(config: FileConfig) -> Result<Self, RedbBlobError> {
        if config.truncate && config.path.exists() {
            std::fs::remove_file(&config.path)?;
        }
        let db = if config.create_if_missing {
            Database::create(&config.path)?
        } else {
            Database::open(&config.path)?
        };

        if !config.read_only {
            let txn = db.begin_write()?;
            txn.open_table(table_definition(&config.table_name))?;
            txn.commit()?;
        }

        log::debug!(
            "redb blob store opened at {} (table {})",
            config.path.display(),
            config.table_name
        );
        Ok(Self { db, config })
    }

    /// Get direct access to the underlying redb database
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Current contents of the blob at `target`.
    pub fn contents(&self, target: &BlobTarget) -> Result<Option<Vec<u8>>, RedbBlobError> {
        self.with_stored(&target.to_key(), |stored| stored.map(<[u8]>::to_vec))
    }

    /// Deletes the row at `target`; open handles on it start failing.
    pub fn remove(&self, target: &BlobTarget) -> Result<bool, RedbBlobError> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(self.table())?;
            table.remove(target.to_key().as_slice())?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    fn table(&self) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
        table_definition(&self.config.table_name)
    }

    /// Runs `f` on the stored bytes at `key` without copying them out of
    /// the read transaction.
    fn with_stored<R>(
        &self,
        key: &[u8],
        f: impl FnOnce(Option<&[u8]>) -> R,
    ) -> Result<R, RedbBlobError> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(self.table()) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(f(None)),
            Err(e) => return Err(e.into()),
        };
        let guard = table.get(key)?;
        Ok(f(guard.as_ref().map(|guard| guard.value())))
    }

    fn store(&self, key: &[u8], value: &[u8]) -> Result<(), RedbBlobError> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(self.table())?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn fail(&self, code: ResultCode, message: impl Into<String>) -> BackendFailure {
        let failure = BackendFailure::new(code, message);
        log::debug!("redb backend: {code}: {}", failure.message);
        failure
    }

    fn fail_with(&self, err: RedbBlobError) -> BackendFailure {
        log::warn!("redb backend error: {err}");
        self.fail(err.code(), err.to_string())
    }

    fn read_only(&self) -> BackendFailure {
        self.fail(ResultCode::ReadOnly, ResultCode::ReadOnly.description())
    }

    fn deleted(&self, handle: &RedbHandle) -> BackendFailure {
        self.fail(ResultCode::Abort, format!("blob {} was deleted", handle.target))
    }
}

impl BlobBackend for RedbBackend {
    type Handle = RedbHandle;

    fn insert(&self, target: &BlobTarget, value: BlobValue) -> BackendStatus {
        if self.config.read_only {
            return Err(self.read_only());
        }
        self.store(&target.to_key(), &value.into_bytes())
            .map_err(|e| self.fail_with(e))
    }

    fn open(&self, target: &BlobTarget, writeable: bool) -> BackendStatus<RedbHandle> {
        if writeable && self.config.read_only {
            return Err(self.read_only());
        }
        let key = target.to_key();
        let stored = self
            .with_stored(&key, |stored| stored.map(<[u8]>::len))
            .map_err(|e| self.fail_with(e))?;
        let Some(stored) = stored else {
            return Err(self.fail(ResultCode::Error, format!("no such rowid: {}", target.rowid)));
        };
        let length = i32::try_from(stored)
            .map_err(|_| self.fail(ResultCode::TooBig, ResultCode::TooBig.description()))?;
        Ok(RedbHandle {
            target: target.clone(),
            key,
            length,
            writeable,
        })
    }

    fn bytes(&self, handle: &RedbHandle) -> i32 {
        handle.length
    }

    fn read(&self, handle: &RedbHandle, buf: &mut [u8], offset: i32) -> BackendStatus {
        self.with_stored(&handle.key, |stored| {
            let stored = stored.ok_or_else(|| self.deleted(handle))?;
            let range =
                checked_range(&handle.target, stored.len(), handle.length, offset, buf.len())
                    .map_err(|(code, message)| self.fail(code, message))?;
            buf.copy_from_slice(&stored[range]);
            Ok(())
        })
        .map_err(|e| self.fail_with(e))?
    }

    fn write(&self, handle: &mut RedbHandle, data: &[u8], offset: i32) -> BackendStatus {
        if !handle.writeable || self.config.read_only {
            return Err(self.fail(ResultCode::ReadOnly, "blob was opened read-only"));
        }
        let txn = self.db.begin_write().map_err(|e| self.fail_with(e.into()))?;
        {
            let mut table = txn
                .open_table(self.table())
                .map_err(|e| self.fail_with(e.into()))?;
            let current = table
                .get(handle.key.as_slice())
                .map_err(|e| self.fail_with(e.into()))?
                .map(|guard| guard.value().to_vec());
            let Some(mut stored) = current else {
                return Err(self.deleted(handle));
            };
            let range =
                checked_range(&handle.target, stored.len(), handle.length, offset, data.len())
                    .map_err(|(code, message)| self.fail(code, message))?;
            stored[range].copy_from_slice(data);
            table
                .insert(handle.key.as_slice(), stored.as_slice())
                .map_err(|e| self.fail_with(e.into()))?;
        }
        txn.commit().map_err(|e| self.fail_with(e.into()))
    }

    fn close(&self, handle: RedbHandle) -> BackendStatus {
        log::trace!("redb backend: releasing handle on {}", handle.target);
        Ok(())
    }
}

fn table_definition(name: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(name)
}
