//! In-process blob backend.
//!
//! Keeps every blob in a `HashMap` behind an `RwLock`. Besides serving as a
//! lightweight backend it supports one-shot fault injection per operation, so
//! error paths that a real engine only hits under I/O failure can be driven
//! deterministically.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backend::{
    BackendFailure, BackendOp, BackendStatus, BlobBackend, BlobTarget, checked_range,
};
use crate::config::MemoryConfig;
use crate::error::ResultCode;
use crate::placeholder::BlobValue;

pub struct MemoryBackend {
    config: MemoryConfig,
    blobs: RwLock<HashMap<BlobTarget, Vec<u8>>>,
    faults: Mutex<HashMap<BackendOp, ResultCode>>,
}

#[derive(Debug)]
pub struct MemoryHandle {
    target: BlobTarget,
    length: i32,
    writeable: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            blobs: RwLock::new(HashMap::with_capacity(config.initial_capacity)),
            faults: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Makes the next call of `op` fail with `code`.
    pub fn inject_fault(&self, op: BackendOp, code: ResultCode) {
        lock(&self.faults).insert(op, code);
    }

    /// Current contents of the blob at `target`.
    pub fn contents(&self, target: &BlobTarget) -> Option<Vec<u8>> {
        self.read_blobs().get(target).cloned()
    }

    /// Deletes the row at `target`; open handles on it start failing.
    pub fn remove(&self, target: &BlobTarget) -> bool {
        self.write_blobs().remove(target).is_some()
    }

    pub fn len(&self) -> usize {
        self.read_blobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fail(&self, code: ResultCode, message: impl Into<String>) -> BackendFailure {
        let failure = BackendFailure::new(code, message);
        log::debug!("memory backend: {code}: {}", failure.message);
        failure
    }

    fn check_fault(&self, op: BackendOp) -> BackendStatus {
        let injected = lock(&self.faults).remove(&op);
        match injected {
            Some(code) => Err(self.fail(code, format!("injected {op} fault"))),
            None => Ok(()),
        }
    }

    /// Validates that the row behind `handle` still holds the blob it was
    /// opened on and that `[offset, offset + len)` lies inside it.
    fn check_range(
        &self,
        stored: Option<&Vec<u8>>,
        handle: &MemoryHandle,
        offset: i32,
        len: usize,
    ) -> BackendStatus<Range<usize>> {
        let Some(stored) = stored else {
            return Err(self.fail(
                ResultCode::Abort,
                format!("blob {} was deleted", handle.target),
            ));
        };
        checked_range(&handle.target, stored.len(), handle.length, offset, len)
            .map_err(|(code, message)| self.fail(code, message))
    }

    fn read_blobs(&self) -> RwLockReadGuard<'_, HashMap<BlobTarget, Vec<u8>>> {
        self.blobs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_blobs(&self) -> RwLockWriteGuard<'_, HashMap<BlobTarget, Vec<u8>>> {
        self.blobs.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobBackend for MemoryBackend {
    type Handle = MemoryHandle;

    fn insert(&self, target: &BlobTarget, value: BlobValue) -> BackendStatus {
        self.check_fault(BackendOp::Insert)?;
        if self.config.read_only {
            return Err(self.fail(ResultCode::ReadOnly, ResultCode::ReadOnly.description()));
        }
        self.write_blobs().insert(target.clone(), value.into_bytes());
        Ok(())
    }

    fn open(&self, target: &BlobTarget, writeable: bool) -> BackendStatus<MemoryHandle> {
        self.check_fault(BackendOp::Open)?;
        if writeable && self.config.read_only {
            return Err(self.fail(ResultCode::ReadOnly, ResultCode::ReadOnly.description()));
        }
        let blobs = self.read_blobs();
        let Some(stored) = blobs.get(target) else {
            return Err(self.fail(ResultCode::Error, format!("no such rowid: {}", target.rowid)));
        };
        let length = i32::try_from(stored.len())
            .map_err(|_| self.fail(ResultCode::TooBig, ResultCode::TooBig.description()))?;
        Ok(MemoryHandle {
            target: target.clone(),
            length,
            writeable,
        })
    }

    fn bytes(&self, handle: &MemoryHandle) -> i32 {
        handle.length
    }

    fn read(&self, handle: &MemoryHandle, buf: &mut [u8], offset: i32) -> BackendStatus {
        self.check_fault(BackendOp::Read)?;
        let blobs = self.read_blobs();
        let range = self.check_range(blobs.get(&handle.target), handle, offset, buf.len())?;
        if let Some(stored) = blobs.get(&handle.target) {
            buf.copy_from_slice(&stored[range]);
        }
        Ok(())
    }

    fn write(&self, handle: &mut MemoryHandle, data: &[u8], offset: i32) -> BackendStatus {
        self.check_fault(BackendOp::Write)?;
        if !handle.writeable {
            return Err(self.fail(ResultCode::ReadOnly, "blob was opened read-only"));
        }
        let mut blobs = self.write_blobs();
        let range = self.check_range(blobs.get(&handle.target), handle, offset, data.len())?;
        if let Some(stored) = blobs.get_mut(&handle.target) {
            stored[range].copy_from_slice(data);
        }
        Ok(())
    }

    fn close(&self, handle: MemoryHandle) -> BackendStatus {
        log::trace!("memory backend: releasing handle on {}", handle.target);
        drop(handle);
        self.check_fault(BackendOp::Close)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::SizePlaceholder;

    fn target() -> BlobTarget {
        BlobTarget::new("files", "data", 1)
    }

    #[test]
    fn insert_open_read_write() {
        let backend = MemoryBackend::new();
        backend.insert(&target(), BlobValue::from(b"hello".to_vec())).unwrap();

        let mut handle = backend.open(&target(), true).unwrap();
        assert_eq!(backend.bytes(&handle), 5);

        backend.write(&mut handle, b"J", 0).unwrap();
        let mut buf = [0u8; 5];
        backend.read(&handle, &mut buf, 0).unwrap();
        assert_eq!(&buf, b"Jello");
        backend.close(handle).unwrap();
    }

    #[test]
    fn zeroed_insert() {
        let backend = MemoryBackend::new();
        let placeholder = SizePlaceholder::new(4).unwrap();
        backend.insert(&target(), placeholder.into()).unwrap();
        assert_eq!(backend.contents(&target()), Some(vec![0; 4]));
    }

    #[test]
    fn missing_row() {
        let backend = MemoryBackend::new();
        assert_eq!(
            backend.open(&target(), false).unwrap_err(),
            BackendFailure::new(ResultCode::Error, "no such rowid: 1")
        );
    }

    #[test]
    fn read_only_handle_rejects_writes() {
        let backend = MemoryBackend::new();
        backend.insert(&target(), BlobValue::from(vec![0u8; 3])).unwrap();
        let mut handle = backend.open(&target(), false).unwrap();
        assert_eq!(backend.write(&mut handle, b"x", 0).unwrap_err().code, ResultCode::ReadOnly);
    }

    #[test]
    fn deleted_row_aborts_io() {
        let backend = MemoryBackend::new();
        backend.insert(&target(), BlobValue::from(vec![1u8; 3])).unwrap();
        let handle = backend.open(&target(), false).unwrap();
        assert!(backend.remove(&target()));

        let mut buf = [0u8; 1];
        assert_eq!(backend.read(&handle, &mut buf, 0).unwrap_err().code, ResultCode::Abort);
    }

    #[test]
    fn injected_faults_fire_once() {
        let backend = MemoryBackend::new();
        backend.insert(&target(), BlobValue::from(vec![1u8; 3])).unwrap();
        backend.inject_fault(BackendOp::Read, ResultCode::IoErr);

        let handle = backend.open(&target(), false).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(
            backend.read(&handle, &mut buf, 0),
            Err(BackendFailure::new(ResultCode::IoErr, "injected read fault"))
        );
        assert_eq!(backend.read(&handle, &mut buf, 0), Ok(()));
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let backend = MemoryBackend::new();
        backend.insert(&target(), BlobValue::from(vec![1u8; 3])).unwrap();
        let handle = backend.open(&target(), false).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(backend.read(&handle, &mut buf, 0).unwrap_err().code, ResultCode::Error);
    }
}
