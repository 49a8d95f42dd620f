//! The owning connection for blob handles.
//!
//! A [`Connection`] wraps a [`BlobBackend`] and tracks every [`Blob`] opened
//! through it as a dependent. Closing (or dropping) the connection
//! force-closes all handles that are still open, so no handle can touch the
//! backend after its connection has gone.
//!
//! ```
//! use netabase_blob::prelude::*;
//!
//! let conn = Connection::new(MemoryBackend::new());
//! let target = BlobTarget::new("files", "data", 1);
//! conn.insert(&target, SizePlaceholder::new(16)?)?;
//!
//! let blob = conn.blob_open(&target, true)?;
//! blob.write(b"header")?;
//! assert_eq!(blob.tell()?, 6);
//!
//! conn.close();
//! assert!(blob.is_closed());
//! # Ok::<(), BlobError>(())
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::backend::{BlobBackend, BlobTarget};
use crate::blob::Blob;
use crate::config::ConnectionConfig;
use crate::dependents::{Dependent, DependentId, DependentRegistry};
use crate::error::{BlobError, BlobResult, ResultCode};
use crate::placeholder::BlobValue;

pub struct Connection<B: BlobBackend> {
    shared: Arc<ConnectionShared<B>>,
}

/// State shared between a connection and the handles it opened. Handles
/// hold a strong reference so the backend outlives them while they are open.
pub(crate) struct ConnectionShared<B: BlobBackend> {
    backend: B,
    config: ConnectionConfig,
    dependents: DependentRegistry,
    closed: AtomicBool,
}

impl<B: BlobBackend> ConnectionShared<B> {
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn allocate_dependent_id(&self) -> DependentId {
        self.dependents.allocate_id()
    }

    pub(crate) fn register_dependent(&self, id: DependentId, dependent: Weak<dyn Dependent>) {
        log::trace!("[{}] registering {id}", self.config.name);
        self.dependents.register(id, dependent);
    }

    pub(crate) fn remove_dependent(&self, id: DependentId) -> bool {
        log::trace!("[{}] removing {id}", self.config.name);
        self.dependents.remove(id)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> BlobResult<()> {
        if self.is_closed() {
            return Err(BlobError::ConnectionClosed);
        }
        Ok(())
    }
}

impl<B: BlobBackend> Connection<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, ConnectionConfig::default())
    }

    pub fn with_config(backend: B, config: ConnectionConfig) -> Self {
        log::debug!("[{}] connection opened", config.name);
        Self {
            shared: Arc::new(ConnectionShared {
                backend,
                config,
                dependents: DependentRegistry::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Stores a blob at `target`. Pass a
    /// [`SizePlaceholder`](crate::placeholder::SizePlaceholder) to reserve
    /// zeroed space for later incremental writes.
    pub fn insert(&self, target: &BlobTarget, value: impl Into<BlobValue>) -> BlobResult<()> {
        self.shared.ensure_open()?;
        let value = value.into();
        let max = self.shared.config.max_blob_size;
        if i32::try_from(value.len()).map_or(true, |len| len > max) {
            return Err(BlobError::backend(ResultCode::TooBig, ""));
        }
        self.shared
            .backend
            .insert(target, value)
            .map_err(BlobError::from)
    }

    /// Opens an incremental I/O handle on the blob at `target`.
    ///
    /// The handle is registered as a dependent of this connection until it
    /// is closed.
    pub fn blob_open(&self, target: &BlobTarget, writeable: bool) -> BlobResult<Blob<B>> {
        self.shared.ensure_open()?;
        let native = self
            .shared
            .backend
            .open(target, writeable)?;
        let blob = Blob::new(Arc::clone(&self.shared), native);
        log::debug!(
            "[{}] opened {} on {target} (writeable: {writeable})",
            self.shared.config.name,
            blob.id()
        );

        // A close racing this open may have taken its dependent snapshot
        // before the handle was registered.
        if self.shared.is_closed() {
            blob.close(true)?;
            return Err(BlobError::ConnectionClosed);
        }
        Ok(blob)
    }

    pub fn dependent_count(&self) -> usize {
        self.shared.dependents.len()
    }

    pub fn has_dependent(&self, id: DependentId) -> bool {
        self.shared.dependents.contains(id)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Closes the connection, force-closing every handle still open on it.
    /// Backend errors from those closes are discarded. Calling `close` again
    /// is a no-op.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dependents = self.shared.dependents.snapshot();
        log::debug!(
            "[{}] closing connection, force-closing {} dependent(s)",
            self.shared.config.name,
            dependents.len()
        );
        for (id, weak) in dependents {
            match weak.upgrade() {
                Some(dependent) => dependent.force_close(),
                // Already being dropped; its destructor deregisters it.
                None => log::trace!("[{}] {id} already gone", self.shared.config.name),
            }
        }
    }
}

impl<B: BlobBackend> Drop for Connection<B> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<B: BlobBackend> fmt::Debug for Connection<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.shared.config.name)
            .field("closed", &self.is_closed())
            .field("dependents", &self.shared.dependents)
            .finish()
    }
}
