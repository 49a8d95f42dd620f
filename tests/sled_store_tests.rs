#![cfg(feature = "sled")]

mod common;

use assert_matches::assert_matches;
use common::*;
use netabase_blob::prelude::*;
use tempfile::TempDir;

#[test]
fn test_sled_round_trip() {
    init_logging();
    let conn = Connection::new(SledBackend::temp().unwrap());
    conn.insert(&target(1), SizePlaceholder::new(16).unwrap()).unwrap();

    let blob = conn.blob_open(&target(1), true).unwrap();
    blob.seek(-4, Whence::End).unwrap();
    blob.write(b"tail").unwrap();
    assert_eq!(blob.tell().unwrap(), 16);

    blob.seek(0, Whence::Start).unwrap();
    let all = blob.read(-1).unwrap();
    assert_eq!(&all[12..], b"tail");
    assert!(all[..12].iter().all(|b| *b == 0));
}

#[test]
fn test_sled_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("blobs.sled");
    {
        let conn = Connection::new(SledBackend::open(&path).unwrap());
        conn.insert(&target(2), pattern(10)).unwrap();
        let blob = conn.blob_open(&target(2), true).unwrap();
        blob.seek(9, Whence::Start).unwrap();
        blob.write([0xFF]).unwrap();
    }

    let conn = Connection::new(SledBackend::open(&path).unwrap());
    let blob = conn.blob_open(&target(2), false).unwrap();
    let mut expected = pattern(10);
    expected[9] = 0xFF;
    assert_eq!(blob.read(-1).unwrap(), expected);
}

#[test]
fn test_sled_missing_row() {
    let conn = Connection::new(SledBackend::temp().unwrap());
    let err = conn.blob_open(&target(4), true).unwrap_err();
    assert_eq!(
        err,
        BlobError::Backend {
            code: ResultCode::Error,
            message: "no such rowid: 4".to_string(),
        }
    );
    assert_eq!(err.to_string(), "Error: no such rowid: 4");
}

#[test]
fn test_sled_open_without_create_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent");
    let config = FileConfig::builder()
        .path(&path)
        .create_if_missing(false)
        .build();

    let err = SledBackend::with_config(config).err().unwrap();
    assert_matches!(err, SledBlobError::Missing(ref p) if *p == path);
    assert_eq!(err.code(), ResultCode::CantOpen);
}

#[test]
fn test_sled_truncate_discards_data() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("blobs.sled");
    {
        let backend = SledBackend::open(&path).unwrap();
        Connection::new(backend).insert(&target(1), pattern(4)).unwrap();
    }

    let config = FileConfig::builder().path(&path).truncate(true).build();
    let backend = SledBackend::with_config(config).unwrap();
    assert_eq!(backend.contents(&target(1)).unwrap(), None);
}

#[test]
fn test_sled_read_only_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("blobs.sled");
    {
        let conn = Connection::new(SledBackend::open(&path).unwrap());
        conn.insert(&target(1), pattern(4)).unwrap();
    }

    let config = FileConfig::builder().path(&path).read_only(true).build();
    let conn = Connection::new(SledBackend::with_config(config).unwrap());
    assert_eq!(
        conn.blob_open(&target(1), true).unwrap_err().result_code(),
        Some(ResultCode::ReadOnly)
    );
    let blob = conn.blob_open(&target(1), false).unwrap();
    assert_eq!(blob.read(-1).unwrap(), pattern(4));

    // Rewind so the write is in range and reaches the backend.
    blob.seek(0, Whence::Start).unwrap();
    assert_eq!(
        blob.write(b"z").unwrap_err().result_code(),
        Some(ResultCode::ReadOnly)
    );
    assert_eq!(blob.tell().unwrap(), 0);
}

#[test]
fn test_sled_modified_length_aborts_handle() {
    let conn = Connection::new(SledBackend::temp().unwrap());
    conn.insert(&target(1), pattern(8)).unwrap();
    let blob = conn.blob_open(&target(1), true).unwrap();

    // Replacing the row with a different size invalidates the open handle.
    conn.insert(&target(1), pattern(3)).unwrap();
    assert_matches!(
        blob.read(1),
        Err(BlobError::Backend { code: ResultCode::Abort, ref message }) if message.contains("modified")
    );

    assert!(conn.backend().remove(&target(1)).unwrap());
    assert_matches!(
        blob.write(b"x"),
        Err(BlobError::Backend { code: ResultCode::Abort, ref message }) if message.contains("deleted")
    );
}

#[test]
fn test_sled_handles_share_rows() {
    let conn = Connection::new(SledBackend::temp().unwrap());
    conn.insert(&target(1), SizePlaceholder::new(6).unwrap()).unwrap();

    let writer = conn.blob_open(&target(1), true).unwrap();
    let reader = conn.blob_open(&target(1), false).unwrap();
    writer.write(b"shared").unwrap();
    assert_eq!(reader.read(-1).unwrap(), b"shared");
    assert_eq!(conn.dependent_count(), 2);
}
