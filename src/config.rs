//! Configuration for connections and storage backends.
//!
//! Follows the builder pattern via `typed-builder`; every config also has a
//! plain constructor with the defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Default upper bound on a single blob, matching SQLite's default
/// `SQLITE_MAX_LENGTH`.
pub const DEFAULT_MAX_BLOB_SIZE: i32 = 1_000_000_000;

/// Options for a [`Connection`](crate::connection::Connection).
///
/// # Examples
///
/// ```
/// use netabase_blob::config::ConnectionConfig;
///
/// let config = ConnectionConfig::builder()
///     .name("media")
///     .max_blob_size(64 * 1024 * 1024)
///     .build();
/// assert_eq!(config.max_blob_size, 64 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Serialize, Deserialize)]
#[builder(doc)]
pub struct ConnectionConfig {
    /// Name used in log output
    #[builder(default = "main".to_string(), setter(into))]
    pub name: String,

    /// Largest blob, in bytes, that `insert` accepts
    #[builder(default = DEFAULT_MAX_BLOB_SIZE)]
    pub max_blob_size: i32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
        }
    }
}

/// Configuration for file-based backends (Sled, Redb).
///
/// # Examples
///
/// ```
/// use netabase_blob::config::FileConfig;
///
/// let config = FileConfig::builder()
///     .path("/data/blobs.redb")
///     .table_name("attachments")
///     .build();
/// assert!(config.create_if_missing);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Serialize, Deserialize)]
#[builder(doc)]
pub struct FileConfig {
    /// Path to the database file or directory
    #[builder(setter(into))]
    pub path: PathBuf,

    /// Table (redb) or tree (sled) holding the blobs
    #[builder(default = "blobs".to_string(), setter(into))]
    pub table_name: String,

    /// Whether to create the database if it doesn't exist
    #[builder(default = true)]
    pub create_if_missing: bool,

    /// Whether to remove an existing database before opening
    #[builder(default = false)]
    pub truncate: bool,

    /// Reject every write and insert
    #[builder(default = false)]
    pub read_only: bool,

    /// Flush to disk after each write (sled only; redb commits are durable)
    #[builder(default = true)]
    pub use_fsync: bool,
}

impl FileConfig {
    /// Create a basic configuration with just a path
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            table_name: "blobs".to_string(),
            create_if_missing: true,
            truncate: false,
            read_only: false,
            use_fsync: true,
        }
    }
}

/// Configuration for the in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Serialize, Deserialize)]
#[builder(doc)]
pub struct MemoryConfig {
    /// Initial capacity hint for the blob map
    #[builder(default = 64)]
    pub initial_capacity: usize,

    /// Reject every write and insert
    #[builder(default = false)]
    pub read_only: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            read_only: false,
        }
    }
}
