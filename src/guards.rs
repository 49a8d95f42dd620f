//! Single-owner guard for blob handle state.
//!
//! Every public operation on a [`Blob`](crate::blob::Blob) holds a
//! [`GuardToken`] for its whole duration. Acquisition never waits: a second
//! caller arriving while an operation is in flight gets
//! [`BlobError::InUse`] instead of racing the first one on the offset or the
//! native handle. The token releases the guard when dropped, so the guard is
//! cleared on every exit path, including early returns through `?`.
//!
//! The owning connection is the one caller allowed to wait
//! ([`ConcurrencyGuard::wait`]): a forced close during teardown must not
//! interleave with an operation already running on another thread, and it
//! must finish with the handle closed.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, TryLockError};

use crate::error::{BlobError, BlobResult};

pub struct ConcurrencyGuard<T> {
    state: Mutex<T>,
}

/// Proof that the guard is held. Dereferences to the guarded state.
pub struct GuardToken<'a, T> {
    inner: MutexGuard<'a, T>,
}

impl<T> ConcurrencyGuard<T> {
    pub fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Marks the guard held, failing with [`BlobError::InUse`] if it already is.
    pub fn acquire(&self) -> BlobResult<GuardToken<'_, T>> {
        match self.state.try_lock() {
            Ok(inner) => Ok(GuardToken { inner }),
            Err(TryLockError::WouldBlock) => Err(BlobError::InUse),
            // A panic inside a backend call must not wedge the handle forever.
            Err(TryLockError::Poisoned(poisoned)) => Ok(GuardToken {
                inner: poisoned.into_inner(),
            }),
        }
    }

    /// Blocks until any in-flight operation releases the guard.
    pub(crate) fn wait(&self) -> GuardToken<'_, T> {
        let inner = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        GuardToken { inner }
    }

    pub fn is_held(&self) -> bool {
        matches!(self.state.try_lock(), Err(TryLockError::WouldBlock))
    }

    /// Exclusive access through `&mut self`; no other holder can exist.
    pub(crate) fn get_mut(&mut self) -> &mut T {
        self.state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Deref for GuardToken<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for GuardToken<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: fmt::Debug> fmt::Debug for GuardToken<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GuardToken").field(&*self.inner).finish()
    }
}
