use super::*;

#[test]
fn payloads_round_trip() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["bin"])?;
    let large: Vec<u8> = (0..200_000u32).map(|i| (i % 7) as u8).collect();
    for payload in [&b""[..], &b"a"[..], &b"hello world"[..], large.as_slice()] {
        let hash = db.put_data("bin", payload)?;
        assert_eq!(hash, hash_bytes(HashAlgorithm::Sha256, payload));
        assert!(db.exists(&hash)?);
        assert_eq!(db.get_data(&hash)?, payload);
    }
    assert_eq!(db.count_data()?, 4);
    Ok(())
}

#[test]
fn repeated_put_leaves_one_file_and_one_record() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js"])?;
    let first = db.put_data("js", b"console.log(1)")?;
    let recorded = db.get_record(&first)?;
    let second = db.put_data("js", b"console.log(1)")?;
    assert_eq!(first, second);
    assert_eq!(db.count_data()?, 1);
    assert_eq!(db.check()?.files, 1);
    assert_eq!(db.get_record(&second)?, recorded);
    Ok(())
}

#[test]
fn dedup_keeps_first_category() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["a", "b"])?;
    let in_a = db.put_data("a", b"shared")?;
    let in_b = db.put_data("b", b"shared")?;
    assert_eq!(in_a, in_b);
    assert_eq!(db.get_record(&in_a)?.category, "a");
    assert_eq!(db.count_data()?, 1);
    Ok(())
}

#[test]
fn delete_removes_record_and_file() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js"])?;
    let hash = db.put_data("js", b"to be removed")?;
    let path = payload_path(&db, &hash)?;
    assert!(path.is_file());

    db.delete_data(&hash)?;
    assert!(!db.exists(&hash)?);
    assert!(!path.exists());
    let err = db.get_data(&hash).unwrap_err();
    assert_eq!(
        store_err(&err),
        &StoreError::NotFound {
            digest: hash.to_hex()
        }
    );
    let err = db.delete_data(&hash).unwrap_err();
    assert!(matches!(store_err(&err), StoreError::NotFound { .. }));

    // Content can be stored again after deletion.
    assert_eq!(db.put_data("js", b"to be removed")?, hash);
    assert_eq!(db.get_data(&hash)?, b"to be removed");
    Ok(())
}

#[test]
fn delete_tolerates_already_missing_file() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js"])?;
    let hash = db.put_data("js", b"gone early")?;
    fs::remove_file(payload_path(&db, &hash)?)?;
    db.delete_data(&hash)?;
    assert!(!db.exists(&hash)?);
    Ok(())
}

#[test]
fn unknown_category_writes_nothing() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js"])?;
    let err = db.put_data("css", b"body {}").unwrap_err();
    assert_eq!(
        store_err(&err),
        &StoreError::UnknownCategory("css".to_string())
    );
    assert_eq!(db.count_data()?, 0);
    assert!(tree(&db.config().data_dir())?.is_empty());
    Ok(())
}

#[test]
fn put_file_streams_into_store() -> Result<()> {
    let (temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["bin"])?;
    let payload: Vec<u8> = (0..(STREAM_CHUNK_SIZE + 4096))
        .map(|i| (i % 241) as u8)
        .collect();
    let source = temp.path().join("upload.bin");
    fs::write(&source, &payload)?;

    let hash = db.put_file("bin", &source)?;
    assert_eq!(hash, hash_bytes(HashAlgorithm::Sha256, &payload));
    assert_eq!(db.get_record(&hash)?.byte_size, payload.len() as u64);
    assert_eq!(db.get_data(&hash)?, payload);

    assert_eq!(db.put_data("bin", &payload)?, hash);
    assert_eq!(db.count_data()?, 1);

    let err = db
        .put_file("bin", &temp.path().join("missing.bin"))
        .unwrap_err();
    assert!(matches!(store_err(&err), StoreError::Io(_)));
    Ok(())
}

#[test]
fn streamed_write_rejects_changed_content() -> Result<()> {
    let (_temp, db) = new_db(DEFAULT_DIR_DEPTH)?;
    let blobs = &db.store()?.blobs;
    let expected = hash_bytes(HashAlgorithm::Sha256, b"original");
    let err = blobs
        .write_stream(&expected, HashAlgorithm::Sha256, &b"modified"[..])
        .unwrap_err();
    assert!(matches!(
        store_err(&err),
        StoreError::DigestMismatch { expected: e, .. } if *e == expected.to_hex()
    ));
    assert!(!blobs.exists(&expected)?);
    assert!(tree(blobs.root())?
        .iter()
        .all(|path| !path.to_string_lossy().ends_with(PARTIAL_SUFFIX)));
    Ok(())
}

#[test]
fn put_many_returns_hashes_in_order() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js", "css"])?;
    let items = [
        PutItem {
            category: "js",
            data: b"one",
            timestamp: None,
        },
        PutItem {
            category: "css",
            data: b"two",
            timestamp: None,
        },
    ];
    let hashes = db.put_many(items)?;
    assert_eq!(
        hashes,
        vec![
            hash_bytes(HashAlgorithm::Sha256, b"one"),
            hash_bytes(HashAlgorithm::Sha256, b"two"),
        ]
    );

    let failing = [
        PutItem {
            category: "js",
            data: b"three",
            timestamp: None,
        },
        PutItem {
            category: "img",
            data: b"four",
            timestamp: None,
        },
        PutItem {
            category: "js",
            data: b"five",
            timestamp: None,
        },
    ];
    let err = db.put_many(failing).unwrap_err();
    assert_eq!(
        store_err(&err),
        &StoreError::UnknownCategory("img".to_string())
    );
    assert!(db.exists(&hash_bytes(HashAlgorithm::Sha256, b"three"))?);
    assert!(!db.exists(&hash_bytes(HashAlgorithm::Sha256, b"five"))?);
    Ok(())
}

#[test]
fn explicit_timestamp_is_kept_at_microsecond_precision() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js"])?;
    let hash = db.put_data_at(
        "js",
        b"dated",
        Some(datetime!(2024-01-02 03:04:05.123456789 UTC)),
    )?;
    let record = db.get_record(&hash)?;
    assert_eq!(record.timestamp, datetime!(2024-01-02 03:04:05.123456 UTC));
    assert_eq!(record.category, "js");
    assert_eq!(record.byte_size, 5);
    assert_eq!(record.digest, hash);
    Ok(())
}

#[test]
fn default_timestamp_is_now() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js"])?;
    let before = OffsetDateTime::now_utc() - time::Duration::seconds(1);
    let hash = db.put_data("js", b"fresh")?;
    let after = OffsetDateTime::now_utc() + time::Duration::seconds(1);
    let timestamp = db.get_record(&hash)?.timestamp;
    assert!(before <= timestamp && timestamp <= after, "{timestamp}");
    Ok(())
}

#[test]
fn open_data_streams_payload() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["txt"])?;
    let hash = db.put_data("txt", b"streamed back")?;
    let mut reader = db.open_data(&hash)?;
    assert_eq!(reader.record().digest, hash);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    assert_eq!(bytes, b"streamed back");
    Ok(())
}

#[cfg(unix)]
#[test]
fn payload_files_are_read_only() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js"])?;
    let hash = db.put_data("js", b"immutable")?;
    let mode = fs::metadata(payload_path(&db, &hash)?)?.permissions().mode();
    assert_eq!(mode & 0o222, 0, "payload should not be writable: {mode:o}");
    Ok(())
}

#[test]
fn failed_index_insert_removes_fresh_payload() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js"])?;
    let hash = hash_bytes(HashAlgorithm::Sha256, b"racing");
    let store = db.store_mut()?;
    assert!(store.blobs.write(&hash, b"racing")?);
    let err = store.record(&hash, "nope", None, 6, true).unwrap_err();
    assert_eq!(
        store_err(&err),
        &StoreError::UnknownCategory("nope".to_string())
    );
    assert!(!store.blobs.exists(&hash)?);
    Ok(())
}
