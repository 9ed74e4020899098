//! Consistency reporting and explicit maintenance passes. Nothing here runs
//! implicitly and nothing deletes payloads that the index does not know about.

use super::*;

use walkdir::WalkDir;

impl DigestDb {
    /// Payload files with no index record (left behind by interrupted puts
    /// or deletes), sorted by digest.
    pub fn orphaned_files(&self) -> Result<Vec<ContentHash>> {
        let store = self.store()?;
        let on_disk = payload_hashes(store.blobs.root(), self.config.hash())?;
        unindexed(store, on_disk)
    }

    /// Index records whose payload file is absent.
    pub fn missing_files(&self) -> Result<Vec<ContentHash>> {
        let store = self.store()?;
        let mut missing = Vec::new();
        for record in store.index.query(&DigestQuery::all()) {
            let record = record.map_err(io_error)?;
            if !store.blobs.exists(&record.digest).map_err(io_error)? {
                missing.push(record.digest);
            }
        }
        Ok(missing)
    }

    /// Compare the index against the payload tree without changing either.
    pub fn check(&self) -> Result<ConsistencyReport> {
        let store = self.store()?;
        let on_disk = payload_hashes(store.blobs.root(), self.config.hash())?;
        let files = on_disk.len() as u64;
        let report = ConsistencyReport {
            records: store.index.count_digests().map_err(io_error)?,
            files,
            orphaned_files: unindexed(store, on_disk)?,
            missing_files: self.missing_files()?,
            partials: partial_files(store.blobs.root())?.len() as u64,
        };
        if !report.is_consistent() {
            warn!(
                orphaned = report.orphaned_files.len(),
                missing = report.missing_files.len(),
                "index and payload tree disagree"
            );
        }
        Ok(report)
    }

    /// Index a payload file that exists on disk without a record, after
    /// verifying that its contents hash to `hash`.
    pub fn adopt_orphan(
        &mut self,
        category: &str,
        hash: &ContentHash,
        timestamp: Option<OffsetDateTime>,
    ) -> Result<DigestRecord> {
        let algorithm = self.config.hash();
        let store = self.store_mut()?;
        if let Some(existing) = store.index.digest_record(hash).map_err(io_error)? {
            return Ok(existing);
        }
        if store.index.category(category).map_err(io_error)?.is_none() {
            return Err(StoreError::UnknownCategory(category.to_string()).into());
        }
        let file = store.blobs.open_file(hash).map_err(io_error)?;
        let (actual, size) = hash_reader(algorithm, file).map_err(io_error)?;
        if &actual != hash {
            return Err(StoreError::DigestMismatch {
                expected: hash.to_hex(),
                actual: actual.to_hex(),
            }
            .into());
        }
        let timestamp = index_precision(timestamp.unwrap_or_else(OffsetDateTime::now_utc))?;
        store
            .index
            .put_digest_record(hash, category, timestamp, size)
            .map_err(io_error)?;
        info!(digest = %hash, category, "orphaned payload adopted");
        store.index.get_digest_record(hash).map_err(io_error)
    }

    /// Delete `*.partial` files left by writes that never completed.
    pub fn sweep_partials(&mut self) -> Result<u64> {
        let store = self.store_mut()?;
        let mut removed = 0;
        for path in partial_files(store.blobs.root())? {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove partial {}", path.display()))
                .map_err(io_error)?;
            removed += 1;
        }
        if removed > 0 {
            info!(removed, "partial payloads swept");
        }
        Ok(removed)
    }

    /// Remove empty shard directories, deepest first. The payload root itself
    /// is kept.
    pub fn prune_empty_shards(&mut self) -> Result<u64> {
        let store = self.store_mut()?;
        let mut removed = 0;
        for entry in WalkDir::new(store.blobs.root())
            .min_depth(1)
            .contents_first(true)
        {
            let entry = entry
                .context("failed to walk payload directory")
                .map_err(io_error)?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let path = entry.path();
            let is_empty = fs::read_dir(path)
                .with_context(|| format!("failed to list {}", path.display()))
                .map_err(io_error)?
                .next()
                .is_none();
            if is_empty {
                fs::remove_dir(path)
                    .with_context(|| format!("failed to remove {}", path.display()))
                    .map_err(io_error)?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "empty shard directories pruned");
        }
        Ok(removed)
    }
}

fn unindexed(store: &OpenStore, hashes: Vec<ContentHash>) -> Result<Vec<ContentHash>> {
    let mut orphans = Vec::new();
    for hash in hashes {
        if !store.index.contains(&hash).map_err(io_error)? {
            orphans.push(hash);
        }
    }
    orphans.sort();
    Ok(orphans)
}

/// Every file under `root` whose name is a hex digest of the configured length.
fn payload_hashes(root: &Path, algorithm: HashAlgorithm) -> Result<Vec<ContentHash>> {
    let mut hashes = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry
            .context("failed to walk payload directory")
            .map_err(io_error)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        match ContentHash::from_hex(name) {
            Ok(hash) if hash.len() == algorithm.digest_len() => hashes.push(hash),
            _ => debug!(path = %entry.path().display(), "skipping non-payload file"),
        }
    }
    Ok(hashes)
}

fn partial_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut partials = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry
            .context("failed to walk payload directory")
            .map_err(io_error)?;
        if entry.file_type().is_file()
            && entry.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX)
        {
            partials.push(entry.into_path());
        }
    }
    Ok(partials)
}
