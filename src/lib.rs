//! # Netabase Blob
//!
//! Incremental, random-access I/O on fixed-size blobs kept inside an
//! embedded storage engine.
//!
//! ## Features
//!
//! - **File-like handles**: [`Blob`](blob::Blob) reads, writes, seeks and
//!   tells over a byte range whose size never changes
//! - **Size placeholders**: reserve zeroed space with
//!   [`SizePlaceholder`](placeholder::SizePlaceholder), then fill it in pieces
//! - **Safe teardown**: closing a [`Connection`](connection::Connection)
//!   force-closes every handle opened through it
//! - **Misuse detection**: concurrent calls on one handle fail fast with
//!   [`BlobError::InUse`](error::BlobError::InUse)
//! - **Backends**: in-memory, Redb and Sled
//!
//! ## Quick Start
//!
//! ```rust
//! use netabase_blob::prelude::*;
//!
//! let conn = Connection::new(MemoryBackend::new());
//! let target = BlobTarget::new("files", "content", 1);
//!
//! // Reserve 100 zero bytes, then write into them.
//! conn.insert(&target, SizePlaceholder::new(100)?)?;
//! let blob = conn.blob_open(&target, true)?;
//! blob.write(b"abab")?;
//! assert_eq!(blob.tell()?, 4);
//!
//! blob.seek(0, Whence::Start)?;
//! assert_eq!(blob.read(4)?, b"abab");
//!
//! blob.seek(100, Whence::Start)?;
//! assert!(blob.read(-1)?.is_empty());
//! blob.close(CloseMode::Raise)?;
//! # Ok::<(), BlobError>(())
//! ```

pub mod backend;
pub mod blob;
pub mod config;
pub mod connection;
pub mod databases;
pub mod dependents;
pub mod error;
pub mod guards;
pub mod placeholder;
pub mod prelude;
