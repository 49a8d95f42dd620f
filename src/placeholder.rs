//! Size placeholders ("zeroblobs") and the values a backend can store.
//!
//! A blob's size is fixed once it exists, so writing a large blob
//! incrementally starts by reserving the space. [`SizePlaceholder`] asks the
//! backend for `N` zero bytes without materialising them in the caller:
//!
//! ```
//! use netabase_blob::placeholder::SizePlaceholder;
//!
//! let reserve = SizePlaceholder::new(100_000_000)?;
//! assert_eq!(reserve.length(), 100_000_000);
//! assert!(SizePlaceholder::new(-1).is_err());
//! # Ok::<(), netabase_blob::error::BlobError>(())
//! ```

use std::fmt;
use std::str::FromStr;

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::error::{BlobError, BlobResult};

/// An immutable request to reserve `length()` zero bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PlaceholderFields", into = "PlaceholderFields")]
pub struct SizePlaceholder {
    size: i32,
}

/// The only accepted serialized form: `{ "size": N }`.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlaceholderFields {
    size: i64,
}

impl SizePlaceholder {
    /// Creates a placeholder for `size` bytes.
    ///
    /// Negative sizes are rejected with [`BlobError::InvalidArgument`]. Sizes
    /// beyond the backend's 32-bit signed addressing fail with
    /// [`BlobError::Overflow`].
    pub fn new(size: i64) -> BlobResult<Self> {
        if size < 0 {
            return Err(BlobError::InvalidArgument(
                "zeroblob size must be >= 0".to_string(),
            ));
        }
        let size = i32::try_from(size).map_err(|_| {
            BlobError::Overflow(format!("zeroblob size must be <= {}", i32::MAX))
        })?;
        Ok(Self { size })
    }

    /// Size of the placeholder in bytes.
    pub fn length(&self) -> i32 {
        self.size
    }

    /// Materialises the zero bytes. Backends call this when storing.
    pub(crate) fn to_zeroed(self) -> Vec<u8> {
        vec![0u8; self.size as usize]
    }
}

impl TryFrom<i64> for SizePlaceholder {
    type Error = BlobError;

    fn try_from(size: i64) -> BlobResult<Self> {
        Self::new(size)
    }
}

impl TryFrom<PlaceholderFields> for SizePlaceholder {
    type Error = BlobError;

    fn try_from(fields: PlaceholderFields) -> BlobResult<Self> {
        Self::new(fields.size)
    }
}

impl From<SizePlaceholder> for PlaceholderFields {
    fn from(placeholder: SizePlaceholder) -> Self {
        PlaceholderFields {
            size: placeholder.size as i64,
        }
    }
}

impl FromStr for SizePlaceholder {
    type Err = BlobError;

    fn from_str(s: &str) -> BlobResult<Self> {
        let size = s.trim().parse::<i64>().map_err(|e| {
            BlobError::InvalidArgument(format!("invalid zeroblob size {s:?}: {e}"))
        })?;
        Self::new(size)
    }
}

impl fmt::Display for SizePlaceholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zeroblob({})", self.size)
    }
}

/// A value a backend can store as a blob.
#[derive(Debug, Clone, PartialEq, Eq, From)]
pub enum BlobValue {
    Bytes(Vec<u8>),
    Zeroed(SizePlaceholder),
}

impl BlobValue {
    /// Number of bytes the stored blob will occupy.
    pub fn len(&self) -> usize {
        match self {
            BlobValue::Bytes(bytes) => bytes.len(),
            BlobValue::Zeroed(placeholder) => placeholder.length() as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        match self {
            BlobValue::Bytes(bytes) => bytes,
            BlobValue::Zeroed(placeholder) => placeholder.to_zeroed(),
        }
    }
}

impl From<&[u8]> for BlobValue {
    fn from(bytes: &[u8]) -> Self {
        BlobValue::Bytes(bytes.to_vec())
    }
}
