//! Prelude module for convenient imports.
//!
//! ```rust
//! use netabase_blob::prelude::*;
//! ```

pub use crate::backend::{BackendFailure, BackendOp, BlobBackend, BlobTarget};
pub use crate::blob::{Blob, CloseMode, Whence};
pub use crate::config::{ConnectionConfig, FileConfig, MemoryConfig};
pub use crate::connection::Connection;
pub use crate::dependents::DependentId;
pub use crate::error::{BlobError, BlobResult, ResultCode};
pub use crate::placeholder::{BlobValue, SizePlaceholder};

pub use crate::databases::memory_store::MemoryBackend;

#[cfg(feature = "redb")]
pub use crate::databases::redb_store::{RedbBackend, RedbBlobError};

#[cfg(feature = "sled")]
pub use crate::databases::sled_store::{SledBackend, SledBlobError};
