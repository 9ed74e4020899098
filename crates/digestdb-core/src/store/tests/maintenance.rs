use super::*;

/// Drop the index record behind the engine's back, leaving the payload.
fn forget_record(db: &mut DigestDb, hash: &ContentHash) -> Result<()> {
    db.store_mut()?.index.delete_digest_record(hash)
}

#[test]
fn consistent_store_reports_clean() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js"])?;
    db.put_data("js", b"one")?;
    db.put_data("js", b"two")?;
    let report = db.check()?;
    assert!(report.is_consistent(), "{report:?}");
    assert_eq!(report.records, 2);
    assert_eq!(report.files, 2);
    assert_eq!(report.partials, 0);
    Ok(())
}

#[test]
fn orphans_are_reported_and_can_be_adopted() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js", "css"])?;
    let kept = db.put_data("js", b"kept")?;
    let orphan = db.put_data("js", b"orphaned")?;
    forget_record(&mut db, &orphan)?;

    assert_eq!(db.orphaned_files()?, vec![orphan.clone()]);
    let report = db.check()?;
    assert!(!report.is_consistent());
    assert_eq!(report.records, 1);
    assert_eq!(report.files, 2);
    assert_eq!(report.orphaned_files, vec![orphan.clone()]);
    assert!(report.missing_files.is_empty());

    let stamp = datetime!(2023-07-01 12:00:00 UTC);
    let record = db.adopt_orphan("css", &orphan, Some(stamp))?;
    assert_eq!(record.category, "css");
    assert_eq!(record.timestamp, stamp);
    assert_eq!(record.byte_size, 8);
    assert!(db.check()?.is_consistent());
    assert_eq!(db.get_data(&orphan)?, b"orphaned");

    // Adopting an indexed digest returns its record unchanged.
    let existing = db.adopt_orphan("css", &kept, None)?;
    assert_eq!(existing.category, "js");
    Ok(())
}

#[test]
fn adopt_verifies_payload_contents() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js"])?;
    let claimed = hash_bytes(HashAlgorithm::Sha256, b"what the name says");
    let path = payload_path(&db, &claimed)?;
    fs::create_dir_all(path.parent().context("payload has a parent")?)?;
    fs::write(&path, b"something else")?;

    let err = db.adopt_orphan("js", &claimed, None).unwrap_err();
    assert!(matches!(
        store_err(&err),
        StoreError::DigestMismatch { expected, .. } if *expected == claimed.to_hex()
    ));
    assert!(!db.exists(&claimed)?);

    let err = db.adopt_orphan("img", &claimed, None).unwrap_err();
    assert_eq!(
        store_err(&err),
        &StoreError::UnknownCategory("img".to_string())
    );

    let absent = hash_bytes(HashAlgorithm::Sha256, b"absent");
    let err = db.adopt_orphan("js", &absent, None).unwrap_err();
    assert!(matches!(store_err(&err), StoreError::NotFound { .. }));
    Ok(())
}

#[test]
fn scan_ignores_foreign_files() -> Result<()> {
    let (_temp, db) = new_db(DEFAULT_DIR_DEPTH)?;
    let data_dir = db.config().data_dir();
    fs::write(data_dir.join("README"), b"not a payload")?;
    fs::write(data_dir.join("abcd"), b"hex but too short")?;
    assert!(db.orphaned_files()?.is_empty());
    assert_eq!(db.check()?.files, 0);
    Ok(())
}

#[test]
fn missing_files_are_listed() -> Result<()> {
    let (_temp, mut db) = db_with_categories(1, &["js"])?;
    let present = db.put_data("js", b"present")?;
    let lost = db.put_data("js", b"lost")?;
    fs::remove_file(payload_path(&db, &lost)?)?;

    assert_eq!(db.missing_files()?, vec![lost.clone()]);
    let report = db.check()?;
    assert_eq!(report.missing_files, vec![lost]);
    assert_eq!(report.records, 2);
    assert_eq!(report.files, 1);
    assert!(db.exists(&present)?);
    Ok(())
}

#[test]
fn sweep_removes_partial_writes_only() -> Result<()> {
    let (_temp, mut db) = db_with_categories(DEFAULT_DIR_DEPTH, &["js"])?;
    let hash = db.put_data("js", b"complete")?;
    let shard = db.config().data_dir().join("ab");
    fs::create_dir_all(&shard)?;
    fs::write(shard.join(".tmp1234.partial"), b"half")?;
    fs::write(shard.join(".tmp5678.partial"), b"")?;

    assert_eq!(db.check()?.partials, 2);
    assert_eq!(db.sweep_partials()?, 2);
    assert_eq!(db.sweep_partials()?, 0);
    assert_eq!(db.check()?.partials, 0);
    assert_eq!(db.get_data(&hash)?, b"complete");
    Ok(())
}

#[test]
fn prune_removes_emptied_shards_but_keeps_root() -> Result<()> {
    let (_temp, mut db) = db_with_categories(2, &["js"])?;
    let kept = db.put_data("js", b"kept")?;
    let removed = db.put_data("js", b"removed")?;
    let removed_path = payload_path(&db, &removed)?;
    db.delete_data(&removed)?;
    let removed_shard = removed_path.parent().context("payload has a parent")?;
    assert!(removed_shard.is_dir(), "delete leaves directories in place");

    let pruned = db.prune_empty_shards()?;
    assert!(pruned >= 1, "expected at least one shard pruned");
    assert!(!removed_shard.exists());
    assert!(db.config().data_dir().is_dir());
    assert_eq!(db.get_data(&kept)?, b"kept");
    assert_eq!(db.prune_empty_shards()?, 0);
    Ok(())
}

#[test]
fn adopt_reports_unreadable_payload_as_io() -> Result<()> {
    let (_temp, mut db) = db_with_categories(1, &["js"])?;
    let hash = hash_bytes(HashAlgorithm::Sha256, b"behind a file");
    let shard = payload_path(&db, &hash)?
        .parent()
        .context("payload has a parent")?
        .to_path_buf();
    fs::write(&shard, b"a file where the shard directory belongs")?;

    let err = db.adopt_orphan("js", &hash, None).unwrap_err();
    assert!(matches!(store_err(&err), StoreError::Io(_)));
    assert!(!db.exists(&hash)?);
    Ok(())
}

#[test]
fn check_counts_agree_with_scans() -> Result<()> {
    let (_temp, mut db) = db_with_categories(2, &["js"])?;
    let mut orphans = Vec::new();
    for i in 0..4 {
        let hash = db.put_data("js", format!("entry {i}").as_bytes())?;
        if i % 2 == 0 {
            forget_record(&mut db, &hash)?;
            orphans.push(hash);
        }
    }
    orphans.sort();
    fs::write(db.config().data_dir().join("notes.txt"), b"ignored")?;

    let report = db.check()?;
    assert_eq!(report.files, 4);
    assert_eq!(report.records, 2);
    assert_eq!(report.orphaned_files, orphans);
    assert_eq!(report.orphaned_files, db.orphaned_files()?);
    assert!(report.missing_files.is_empty());
    Ok(())
}
