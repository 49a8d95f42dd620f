//! Blob storage on top of the [sled](https://docs.rs/sled) embedded database.
//!
//! All blobs live in one sled tree, keyed by the bincode encoding of their
//! [`BlobTarget`]. Incremental writes splice the new bytes into the stored
//! value with a compare-and-swap, so a write racing another writer on the
//! same blob fails with [`ResultCode::Busy`] instead of losing data.
//!
//! # Examples
//!
//! ```rust
//! use netabase_blob::prelude::*;
//!
//! let conn = Connection::new(SledBackend::temp()?);
//! let target = BlobTarget::new("notes", "body", 1);
//! conn.insert(&target, SizePlaceholder::new(5)?)?;
//!
//! let blob = conn.blob_open(&target, true)?;
//! blob.write(b"hello")?;
//! blob.seek(0, Whence::Start)?;
//! assert_eq!(blob.read(-1)?, b"hello");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;

use std::path::Path;

use crate::backend::{BackendFailure, BackendStatus, BlobBackend, BlobTarget, checked_range};
use crate::config::FileConfig;
use crate::error::ResultCode;
use crate::placeholder::BlobValue;

pub use error::SledBlobError;

pub struct SledBackend {
    db: sled::Db,
    tree: sled::Tree,
    config: FileConfig,
}

#[derive(Debug)]
pub struct SledHandle {
    target: BlobTarget,
    key: Vec<u8>,
    length: i32,
    writeable: bool,
}

impl SledBackend {
    /// Open (creating if needed) a sled blob store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SledBlobError> {
        Self::with_config(FileConfig::new(path.as_ref()))
    }

    pub fn with_config(config: FileConfig) -> Result<Self, SledBlobError> {
        if config.truncate && config.path.exists() {
            std::fs::remove_dir_all(&config.path)?;
        }
        if !config.create_if_missing && !config.path.exists() {
            return Err(SledBlobError::Missing(config.path.clone()));
        }
        let db = sled::Config::new().path(&config.path).open()?;
        Self::from_db(db, config)
    }

    /// A store that is deleted when dropped.
    pub fn temp() -> Result<Self, SledBlobError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, FileConfig::new(""))
    }

    fn from_db(db: sled::Db, config: FileConfig) -> Result<Self, SledBlobError> {
        let tree = db.open_tree(&config.table_name)?;
        log::debug!("sled blob store opened (tree {})", config.table_name);
        Ok(Self { db, tree, config })
    }

    /// Get direct access to the underlying sled database
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Current contents of the blob at `target`.
    pub fn contents(&self, target: &BlobTarget) -> Result<Option<Vec<u8>>, SledBlobError> {
        Ok(self.tree.get(target.to_key())?.map(|value| value.to_vec()))
    }

    /// Deletes the row at `target`; open handles on it start failing.
    pub fn remove(&self, target: &BlobTarget) -> Result<bool, SledBlobError> {
        Ok(self.tree.remove(target.to_key())?.is_some())
    }

    fn flush(&self) -> Result<(), SledBlobError> {
        if self.config.use_fsync {
            self.tree.flush()?;
        }
        Ok(())
    }

    fn fail(&self, code: ResultCode, message: impl Into<String>) -> BackendFailure {
        let failure = BackendFailure::new(code, message);
        log::debug!("sled backend: {code}: {}", failure.message);
        failure
    }

    fn fail_with(&self, err: SledBlobError) -> BackendFailure {
        log::warn!("sled backend error: {err}");
        self.fail(err.code(), err.to_string())
    }

    fn read_only(&self) -> BackendFailure {
        self.fail(ResultCode::ReadOnly, ResultCode::ReadOnly.description())
    }

    fn deleted(&self, handle: &SledHandle) -> BackendFailure {
        self.fail(
            ResultCode::Abort,
            format!("blob {} was deleted", handle.target),
        )
    }
}

impl BlobBackend for SledBackend {
    type Handle = SledHandle;

    fn insert(&self, target: &BlobTarget, value: BlobValue) -> BackendStatus {
        if self.config.read_only {
            return Err(self.read_only());
        }
        self.tree
            .insert(target.to_key(), value.into_bytes())
            .map_err(|e| self.fail_with(e.into()))?;
        self.flush().map_err(|e| self.fail_with(e))
    }

    fn open(&self, target: &BlobTarget, writeable: bool) -> BackendStatus<SledHandle> {
        if writeable && self.config.read_only {
            return Err(self.read_only());
        }
        let key = target.to_key();
        let stored = self
            .tree
            .get(&key)
            .map_err(|e| self.fail_with(e.into()))?
            .ok_or_else(|| {
                self.fail(ResultCode::Error, format!("no such rowid: {}", target.rowid))
            })?;
        let length = i32::try_from(stored.len())
            .map_err(|_| self.fail(ResultCode::TooBig, ResultCode::TooBig.description()))?;
        Ok(SledHandle {
            target: target.clone(),
            key,
            length,
            writeable,
        })
    }

    fn bytes(&self, handle: &SledHandle) -> i32 {
        handle.length
    }

    fn read(&self, handle: &SledHandle, buf: &mut [u8], offset: i32) -> BackendStatus {
        let stored = self
            .tree
            .get(&handle.key)
            .map_err(|e| self.fail_with(e.into()))?
            .ok_or_else(|| self.deleted(handle))?;
        let range = checked_range(&handle.target, stored.len(), handle.length, offset, buf.len())
            .map_err(|(code, message)| self.fail(code, message))?;
        buf.copy_from_slice(&stored[range]);
        Ok(())
    }

    fn write(&self, handle: &mut SledHandle, data: &[u8], offset: i32) -> BackendStatus {
        if !handle.writeable || self.config.read_only {
            return Err(self.fail(ResultCode::ReadOnly, "blob was opened read-only"));
        }
        let current = self
            .tree
            .get(&handle.key)
            .map_err(|e| self.fail_with(e.into()))?
            .ok_or_else(|| self.deleted(handle))?;
        let range = checked_range(&handle.target, current.len(), handle.length, offset, data.len())
            .map_err(|(code, message)| self.fail(code, message))?;

        let mut updated = current.to_vec();
        updated[range].copy_from_slice(data);
        let swapped = self
            .tree
            .compare_and_swap(&handle.key, Some(current), Some(updated))
            .map_err(|e| self.fail_with(e.into()))?;
        if swapped.is_err() {
            return Err(self.fail(
                ResultCode::Busy,
                format!("blob {} changed during write", handle.target),
            ));
        }
        self.flush().map_err(|e| self.fail_with(e))
    }

    fn close(&self, handle: SledHandle) -> BackendStatus {
        log::trace!("sled backend: releasing handle on {}", handle.target);
        Ok(())
    }
}
