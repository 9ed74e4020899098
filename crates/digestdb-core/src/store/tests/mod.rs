//! Store unit tests, split by topic.

use super::*;
use std::collections::BTreeSet;
use tempfile::{tempdir, TempDir};
use time::macros::datetime;

mod basics;
mod maintenance;

fn config_for(temp: &TempDir, depth: usize) -> StoreConfig {
    StoreConfig::new(temp.path()).with_dir_depth(depth)
}

fn new_db(depth: usize) -> Result<(TempDir, DigestDb)> {
    let temp = tempdir()?;
    let mut db = DigestDb::new(config_for(&temp, depth));
    db.open()?;
    Ok((temp, db))
}

/// Open store with the given categories already registered.
fn db_with_categories(depth: usize, labels: &[&str]) -> Result<(TempDir, DigestDb)> {
    let (temp, mut db) = new_db(depth)?;
    for label in labels {
        db.put_category(label, None)?;
    }
    Ok((temp, db))
}

fn store_err(err: &anyhow::Error) -> &StoreError {
    err.downcast_ref::<StoreError>()
        .unwrap_or_else(|| panic!("expected a StoreError, got {err:#}"))
}

fn payload_path(db: &DigestDb, hash: &ContentHash) -> Result<PathBuf> {
    Ok(db
        .config()
        .data_dir()
        .join(shard_path(hash, db.config().dir_depth())?))
}

/// Every path below `root`, relative to it.
fn tree(root: &Path) -> Result<BTreeSet<PathBuf>> {
    let mut paths = BTreeSet::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        paths.insert(entry.path().strip_prefix(root)?.to_path_buf());
    }
    Ok(paths)
}

#[cfg(unix)]
fn make_writable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(perms.mode() | 0o200);
        let _ = fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn make_writable(path: &Path) {
    if let Ok(metadata) = fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_readonly(false);
        let _ = fs::set_permissions(path, perms);
    }
}
