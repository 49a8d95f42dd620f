// Common test utilities and helpers
#![allow(dead_code)]

use netabase_blob::prelude::*;

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn target(rowid: i64) -> BlobTarget {
    BlobTarget::new("files", "content", rowid)
}

/// A memory-backed connection holding one zeroed blob of `len` bytes at
/// `target(1)`.
pub fn memory_connection(len: i64) -> Connection<MemoryBackend> {
    init_logging();
    let conn = Connection::new(MemoryBackend::new());
    conn.insert(&target(1), SizePlaceholder::new(len).unwrap())
        .unwrap();
    conn
}

/// Bytes `0, 1, 2, ...` wrapping at 256.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}
