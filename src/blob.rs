//! Incremental I/O on a single fixed-size blob.
//!
//! A [`Blob`] behaves like a file whose size can never change: it keeps a
//! cursor that [`read`](Blob::read) and [`write`](Blob::write) advance, and
//! [`seek`](Blob::seek) moves within `[0, length]`. Writing past the end is an
//! error; to store a large blob, reserve the space first with a
//! [`SizePlaceholder`](crate::placeholder::SizePlaceholder) and fill it in
//! pieces.
//!
//! Every operation holds the handle's [`ConcurrencyGuard`] for its whole
//! duration, so two threads sharing one handle get [`BlobError::InUse`]
//! instead of corrupting the cursor.
//!
//! Handles are dependents of the [`Connection`](crate::connection::Connection)
//! that opened them. They close when:
//!
//! - [`close`](Blob::close) is called (repeat calls are no-ops),
//! - a [`scoped`](Blob::scoped) block ends,
//! - the owning connection closes,
//! - the handle is dropped; backend errors are then logged, not returned.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use strum::{Display, FromRepr};

use crate::backend::BlobBackend;
use crate::connection::ConnectionShared;
use crate::dependents::{Dependent, DependentId};
use crate::error::{BlobError, BlobResult};
use crate::guards::{ConcurrencyGuard, GuardToken};

/// Reference point for [`Blob::seek`]. Defaults to [`Whence::Start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, FromRepr)]
#[repr(i32)]
pub enum Whence {
    /// Relative to the start of the blob
    #[default]
    Start = 0,
    /// Relative to the current offset
    Current = 1,
    /// Relative to the end of the blob
    End = 2,
}

impl TryFrom<i32> for Whence {
    type Error = BlobError;

    fn try_from(value: i32) -> BlobResult<Self> {
        Whence::from_repr(value).ok_or_else(|| {
            BlobError::InvalidArgument("whence parameter should be 0, 1 or 2".to_string())
        })
    }
}

/// What to do with a backend error reported while closing.
///
/// The handle is released and closed in every mode; only the reporting of
/// the backend's status differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum CloseMode {
    /// Return the error to the caller.
    #[default]
    Raise,
    /// Discard the error.
    Suppress,
    /// Log the error without returning it. Used when nobody is left to
    /// receive it, such as a handle being dropped.
    SuppressAndLogUnraisable,
}

impl From<bool> for CloseMode {
    /// `force = true` ignores errors during close.
    fn from(force: bool) -> Self {
        if force {
            CloseMode::Suppress
        } else {
            CloseMode::Raise
        }
    }
}

/// An open (or closed) incremental I/O session on one blob.
pub struct Blob<B: BlobBackend> {
    shared: Arc<BlobShared<B>>,
}

struct BlobShared<B: BlobBackend> {
    id: DependentId,
    state: ConcurrencyGuard<BlobState<B>>,
    /// Mirrors `state.native.is_none()`; readable without the guard.
    closed: AtomicBool,
}

/// `native` and `connection` are both present while open and both absent
/// once closed. `offset` always lies in `[0, length]`.
struct BlobState<B: BlobBackend> {
    native: Option<B::Handle>,
    connection: Option<Arc<ConnectionShared<B>>>,
    offset: i32,
}

const OUT_OF_RANGE: &str =
    "The resulting offset would be less than zero or past the end of the blob";

impl<B: BlobBackend> Blob<B> {
    /// Wraps a freshly opened native handle and registers it with its
    /// connection.
    pub(crate) fn new(connection: Arc<ConnectionShared<B>>, native: B::Handle) -> Self {
        let id = connection.allocate_dependent_id();
        let shared = Arc::new(BlobShared {
            id,
            state: ConcurrencyGuard::new(BlobState {
                native: Some(native),
                connection: Some(Arc::clone(&connection)),
                offset: 0,
            }),
            closed: AtomicBool::new(false),
        });
        let dependent: Weak<dyn Dependent> = Arc::<BlobShared<B>>::downgrade(&shared);
        connection.register_dependent(id, dependent);
        Self { shared }
    }

    pub fn id(&self) -> DependentId {
        self.shared.id
    }

    /// Whether the handle has been closed. Never blocks and never fails,
    /// even while another operation is in flight.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Whether an operation is in flight on this handle right now.
    pub fn is_in_use(&self) -> bool {
        self.shared.state.is_held()
    }

    /// Size of the blob in bytes.
    pub fn length(&self) -> BlobResult<i32> {
        let state = self.acquire()?;
        let (native, connection) = state.open()?;
        Ok(connection.backend().bytes(native))
    }

    /// Current offset.
    pub fn tell(&self) -> BlobResult<i32> {
        let state = self.acquire()?;
        state.open()?;
        Ok(state.offset)
    }

    /// Moves the offset to `offset` relative to `whence`.
    ///
    /// Fails with [`BlobError::Range`] if the result would be negative or
    /// past the end of the blob; the offset is unchanged on failure.
    pub fn seek(&self, offset: i64, whence: Whence) -> BlobResult<()> {
        let mut state = self.acquire()?;
        let (native, connection) = state.open()?;
        let length = i64::from(connection.backend().bytes(native));
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => i64::from(state.offset),
            Whence::End => length,
        };
        let target = base
            .checked_add(offset)
            .filter(|target| (0..=length).contains(target))
            .ok_or_else(|| BlobError::Range(OUT_OF_RANGE.to_string()))?;
        // Bounded by `length`, which is itself an i32.
        state.offset = target as i32;
        Ok(())
    }

    /// Reads up to `count` bytes from the current offset.
    ///
    /// A negative `count` reads everything that remains. Reading at the end
    /// of the blob, or with `count == 0`, returns an empty vector rather
    /// than an error.
    pub fn read(&self, count: i64) -> BlobResult<Vec<u8>> {
        let mut state = self.acquire()?;
        let wanted = state.clamp(count)?;
        if wanted == 0 {
            return Ok(Vec::new());
        }
        let mut buffer = vec![0u8; wanted];
        state.read_into(&mut buffer)?;
        Ok(buffer)
    }

    /// Reads everything from the current offset to the end.
    pub fn read_remaining(&self) -> BlobResult<Vec<u8>> {
        self.read(-1)
    }

    /// Fills as much of `buf` as the blob has left and returns the number of
    /// bytes read. Returns `0` at the end of the blob.
    pub fn read_into(&self, buf: &mut [u8]) -> BlobResult<usize> {
        let mut state = self.acquire()?;
        let count = i64::try_from(buf.len()).unwrap_or(i64::MAX);
        let wanted = state.clamp(count)?;
        if wanted == 0 {
            return Ok(0);
        }
        state.read_into(&mut buf[..wanted])?;
        Ok(wanted)
    }

    /// Writes all of `data` at the current offset and advances past it.
    ///
    /// Blobs cannot grow: if the data would run past the end the call fails
    /// with [`BlobError::Range`] and nothing is written.
    pub fn write(&self, data: impl AsRef<[u8]>) -> BlobResult<()> {
        let data = data.as_ref();
        let mut state = self.acquire()?;
        let offset = state.offset;
        let BlobState {
            native: Some(native),
            connection: Some(connection),
            ..
        } = &mut *state
        else {
            return Err(BlobError::Closed);
        };

        let end = i32::try_from(data.len())
            .ok()
            .and_then(|len| offset.checked_add(len))
            .ok_or_else(|| BlobError::Overflow("Data is too large (integer wrap)".to_string()))?;
        if end > connection.backend().bytes(native) {
            return Err(BlobError::Range(
                "Data would go beyond end of blob".to_string(),
            ));
        }

        connection.backend().write(native, data, offset)?;
        state.offset = end;
        Ok(())
    }

    /// Closes the handle. Accepts a [`CloseMode`] or the legacy `force`
    /// flag (`true` suppresses errors).
    ///
    /// The native handle is always released and the handle always ends up
    /// closed; `mode` only decides whether a backend error is returned.
    /// Closing a closed handle succeeds.
    pub fn close(&self, mode: impl Into<CloseMode>) -> BlobResult<()> {
        let mut state = self.shared.state.acquire()?;
        self.shared.close_state(&mut state, mode.into())
    }

    /// Start of scoped use. Fails if the handle is closed.
    pub fn enter(&self) -> BlobResult<&Self> {
        let state = self.acquire()?;
        state.open()?;
        Ok(self)
    }

    /// End of scoped use: closes the handle, returning any close error.
    /// `Ok(false)` means errors raised inside the scope are not swallowed.
    pub fn exit(&self) -> BlobResult<bool> {
        let mut state = self.acquire()?;
        state.open()?;
        self.shared.close_state(&mut state, CloseMode::Raise)?;
        Ok(false)
    }

    /// Runs `f` with this handle and closes it afterwards, whether or not
    /// `f` failed.
    ///
    /// If both `f` and the close fail, the error from `f` is returned and
    /// the close error is logged.
    pub fn scoped<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<BlobError>,
    {
        self.enter()?;
        let result = f(self);
        let closed = self.close(CloseMode::Raise);
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                log::warn!(
                    "{} failed to close after an error in its scope: {close_err}",
                    self.shared.id
                );
                Err(err)
            }
        }
    }

    fn acquire(&self) -> BlobResult<GuardToken<'_, BlobState<B>>> {
        self.shared.state.acquire()
    }
}

impl<B: BlobBackend> BlobState<B> {
    fn open(&self) -> BlobResult<(&B::Handle, &ConnectionShared<B>)> {
        match (&self.native, &self.connection) {
            (Some(native), Some(connection)) => Ok((native, connection)),
            _ => Err(BlobError::Closed),
        }
    }

    /// Number of bytes a read of `count` would return from here.
    fn clamp(&self, count: i64) -> BlobResult<usize> {
        let (native, connection) = self.open()?;
        let remaining = connection.backend().bytes(native) - self.offset;
        let wanted = if count < 0 {
            i64::from(remaining)
        } else {
            count.min(i64::from(remaining))
        };
        Ok(wanted as usize)
    }

    /// Reads exactly `buf.len()` bytes at the offset, advancing only on
    /// success.
    fn read_into(&mut self, buf: &mut [u8]) -> BlobResult<()> {
        let (native, connection) = self.open()?;
        connection.backend().read(native, buf, self.offset)?;
        let length = connection.backend().bytes(native);
        // `buf` was clamped to the bytes remaining, so this stays <= length.
        self.offset += buf.len() as i32;
        debug_assert!(self.offset <= length);
        Ok(())
    }

    fn close(&mut self, id: DependentId, mode: CloseMode) -> BlobResult<()> {
        let mut outcome = Ok(());

        if let (Some(native), Some(connection)) = (self.native.take(), self.connection.as_deref())
        {
            // The backend releases the handle even when it reports an error.
            if let Err(failure) = connection.backend().close(native) {
                let err = BlobError::from(failure);
                match mode {
                    CloseMode::Raise => outcome = Err(err),
                    CloseMode::Suppress => {
                        log::trace!("[{}] ignoring close error on {id}: {err}", connection.name())
                    }
                    CloseMode::SuppressAndLogUnraisable => log::error!(
                        target: "netabase_blob::unraisable",
                        "[{}] error closing {id}: {err}",
                        connection.name()
                    ),
                }
            }
            log::debug!("[{}] closed {id}", connection.name());
        }

        // Deregister before letting go of the connection, which may be the
        // last reference keeping it alive.
        if let Some(connection) = self.connection.take() {
            connection.remove_dependent(id);
            drop(connection);
        }

        outcome
    }
}

impl<B: BlobBackend> BlobShared<B> {
    /// Closes `state` (which must be this handle's, under its guard) and
    /// publishes the closed flag.
    fn close_state(&self, state: &mut BlobState<B>, mode: CloseMode) -> BlobResult<()> {
        let outcome = state.close(self.id, mode);
        self.closed.store(true, Ordering::Release);
        outcome
    }
}

impl<B: BlobBackend> Dependent for BlobShared<B> {
    fn force_close(&self) {
        let mut state = self.state.wait();
        let _ = self.close_state(&mut state, CloseMode::Suppress);
    }
}

impl<B: BlobBackend> Drop for BlobShared<B> {
    fn drop(&mut self) {
        let id = self.id;
        let _ = self
            .state
            .get_mut()
            .close(id, CloseMode::SuppressAndLogUnraisable);
    }
}

impl<B: BlobBackend> fmt::Debug for Blob<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("id", &self.shared.id)
            .field("in_use", &self.is_in_use())
            .finish_non_exhaustive()
    }
}

impl<B: BlobBackend> io::Read for &Blob<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Blob::read_into(self, buf)?)
    }
}

impl<B: BlobBackend> io::Read for Blob<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &*self, buf)
    }
}

impl<B: BlobBackend> io::Write for &Blob<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Blob::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<B: BlobBackend> io::Write for Blob<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<B: BlobBackend> io::Seek for &Blob<B> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            io::SeekFrom::Start(offset) => {
                let offset = i64::try_from(offset)
                    .map_err(|_| BlobError::Range(OUT_OF_RANGE.to_string()))?;
                (offset, Whence::Start)
            }
            io::SeekFrom::Current(offset) => (offset, Whence::Current),
            io::SeekFrom::End(offset) => (offset, Whence::End),
        };
        Blob::seek(self, offset, whence)?;
        Ok(Blob::tell(self)? as u64)
    }
}

impl<B: BlobBackend> io::Seek for Blob<B> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        io::Seek::seek(&mut &*self, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOp, BlobTarget};
    use crate::connection::Connection;
    use crate::databases::memory_store::MemoryBackend;
    use crate::error::ResultCode;
    use assert_matches::assert_matches;

    fn open(len: usize) -> (Connection<MemoryBackend>, Blob<MemoryBackend>) {
        let conn = Connection::new(MemoryBackend::new());
        let target = BlobTarget::new("t", "c", 1);
        conn.insert(&target, vec![0u8; len]).unwrap();
        let blob = conn.blob_open(&target, true).unwrap();
        (conn, blob)
    }

    #[test]
    fn whence_from_int() {
        assert_eq!(Whence::try_from(0).unwrap(), Whence::Start);
        assert_eq!(Whence::try_from(1).unwrap(), Whence::Current);
        assert_eq!(Whence::try_from(2).unwrap(), Whence::End);
        assert_eq!(Whence::default(), Whence::Start);
        assert_matches!(Whence::try_from(3), Err(BlobError::InvalidArgument(_)));
        assert_matches!(Whence::try_from(-1), Err(BlobError::InvalidArgument(_)));
    }

    #[test]
    fn close_mode_from_force_flag() {
        assert_eq!(CloseMode::from(false), CloseMode::Raise);
        assert_eq!(CloseMode::from(true), CloseMode::Suppress);
        assert_eq!(CloseMode::default(), CloseMode::Raise);
    }

    #[test]
    fn operations_fail_while_guard_held() {
        let (_conn, blob) = open(10);
        blob.seek(3, Whence::Start).unwrap();

        let token = blob.shared.state.acquire().unwrap();
        assert!(blob.is_in_use());
        assert_matches!(blob.read(-1), Err(BlobError::InUse));
        assert_matches!(blob.write(b"x"), Err(BlobError::InUse));
        assert_matches!(blob.seek(0, Whence::Start), Err(BlobError::InUse));
        assert_matches!(blob.length(), Err(BlobError::InUse));
        assert_matches!(blob.tell(), Err(BlobError::InUse));
        assert_matches!(blob.close(false), Err(BlobError::InUse));
        assert_matches!(blob.enter(), Err(BlobError::InUse));
        // State inspection still answers while an operation holds the guard.
        assert!(!blob.is_closed());
        drop(token);

        assert!(!blob.is_in_use());
        assert_eq!(blob.tell().unwrap(), 3);
    }

    #[test]
    fn read_clamps_and_advances() {
        let (conn, blob) = open(10);
        let target = BlobTarget::new("t", "c", 1);
        conn.insert(&target, (0u8..10).collect::<Vec<_>>()).unwrap();
        let blob2 = conn.blob_open(&target, false).unwrap();
        drop(blob);

        assert_eq!(blob2.read(4).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(blob2.read(100).unwrap(), vec![4, 5, 6, 7, 8, 9]);
        assert_eq!(blob2.tell().unwrap(), 10);
        assert!(blob2.read(5).unwrap().is_empty());
    }

    #[test]
    fn failed_read_leaves_offset() {
        let (conn, blob) = open(10);
        blob.seek(2, Whence::Start).unwrap();
        conn.backend().inject_fault(BackendOp::Read, ResultCode::IoErr);

        let err = blob.read(4).unwrap_err();
        assert_eq!(err.result_code(), Some(ResultCode::IoErr));
        assert_eq!(blob.tell().unwrap(), 2);
    }

    #[test]
    fn close_error_still_closes() {
        let (conn, blob) = open(4);
        conn.backend().inject_fault(BackendOp::Close, ResultCode::IoErr);

        let err = blob.close(CloseMode::Raise).unwrap_err();
        assert_eq!(err.result_code(), Some(ResultCode::IoErr));
        assert!(blob.is_closed());
        assert!(!conn.has_dependent(blob.id()));
        blob.close(CloseMode::Raise).unwrap();
    }

    #[test]
    fn exit_on_closed_handle_fails() {
        let (_conn, blob) = open(4);
        assert!(!blob.exit().unwrap());
        assert_matches!(blob.exit(), Err(BlobError::Closed));
        assert_matches!(blob.enter(), Err(BlobError::Closed));
    }
}
