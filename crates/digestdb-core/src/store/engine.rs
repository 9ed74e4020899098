//! Store lifecycle and the public put/get/exists/delete/query surface.
//!
//! Ordering rule for the mutating paths: `put` writes the payload before the
//! record, `delete` removes the record before the payload. An interrupted
//! operation can leave an orphaned file, never a record without a file.

use super::*;

/// One entry for [`DigestDb::put_many`].
#[derive(Clone, Copy, Debug)]
pub struct PutItem<'a> {
    pub category: &'a str,
    pub data: &'a [u8],
    pub timestamp: Option<OffsetDateTime>,
}

/// Streaming handle over a stored payload.
#[derive(Debug)]
pub struct BlobReader {
    record: DigestRecord,
    file: File,
}

impl BlobReader {
    #[must_use]
    pub fn record(&self) -> &DigestRecord {
        &self.record
    }
}

impl Read for BlobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl DigestDb {
    /// Create a closed engine; no disk access happens until [`DigestDb::open`].
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self { config, open: None }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        if self.open.is_some() {
            EngineState::Open
        } else {
            EngineState::Closed
        }
    }

    /// Acquire the root lock, then open the index and payload directory.
    ///
    /// # Errors
    ///
    /// `LockHeld` when another engine owns the root, `RootUnavailable` when
    /// the root is missing, `InvalidDepth` for a depth beyond the digest
    /// length, and `Io`/`IncompatibleFormat` when the index cannot be used.
    /// Anything acquired before the failure is released again.
    pub fn open(&mut self) -> Result<()> {
        if self.open.is_some() {
            return Ok(());
        }
        self.config.validate()?;
        let root = self.config.root();
        match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(StoreError::RootUnavailable {
                    path: root.display().to_string(),
                    reason: "not a directory".to_string(),
                }
                .into())
            }
            Err(err) => {
                return Err(StoreError::RootUnavailable {
                    path: root.display().to_string(),
                    reason: err.to_string(),
                }
                .into())
            }
        }

        let lock = RootLock::acquire(&self.config.lock_path()).map_err(io_error)?;
        let index = match MetadataIndex::open(&self.config.index_path(), self.config.hash()) {
            Ok(index) => index,
            Err(err) => {
                release_after_failed_open(lock);
                return Err(io_error(err));
            }
        };
        let blobs = match BlobStore::open(self.config.data_dir(), self.config.dir_depth()) {
            Ok(blobs) => blobs,
            Err(err) => {
                if let Err(close_err) = index.close() {
                    warn!(err = %close_err, "failed to close index after failed open");
                }
                release_after_failed_open(lock);
                return Err(io_error(err));
            }
        };

        info!(
            root = %root.display(),
            depth = self.config.dir_depth(),
            algorithm = %self.config.hash(),
            "store opened"
        );
        self.open = Some(OpenStore { lock, index, blobs });
        Ok(())
    }

    /// Release the index and then the lock. Closing a closed engine is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(OpenStore { lock, index, .. }) = self.open.take() else {
            return Ok(());
        };
        let closed = index.close();
        lock.release()?;
        closed?;
        info!(root = %self.config.root().display(), "store closed");
        Ok(())
    }

    pub(super) fn store(&self) -> Result<&OpenStore> {
        self.open.as_ref().ok_or_else(|| StoreError::NotOpen.into())
    }

    pub(super) fn store_mut(&mut self) -> Result<&mut OpenStore> {
        self.open.as_mut().ok_or_else(|| StoreError::NotOpen.into())
    }

    pub fn put_category(&mut self, label: &str, description: Option<&str>) -> Result<()> {
        let store = self.store_mut()?;
        store
            .index
            .put_category(label, description)
            .map_err(io_error)?;
        debug!(category = label, "category added");
        Ok(())
    }

    pub fn get_category(&self, label: &str) -> Result<Category> {
        self.store()?.index.get_category(label).map_err(io_error)
    }

    /// List categories, optionally filtered by exact label and/or a
    /// description substring.
    pub fn query_categories(
        &self,
        label: Option<&str>,
        description_contains: Option<&str>,
    ) -> Result<Vec<Category>> {
        self.store()?
            .index
            .query_categories(label, description_contains)
            .map_err(io_error)
    }

    pub fn count_categories(&self) -> Result<u64> {
        self.store()?.index.count_categories().map_err(io_error)
    }

    /// Remove a category; refused with `CategoryInUse` while records point at it.
    pub fn delete_category(&mut self, label: &str) -> Result<()> {
        self.store_mut()?
            .index
            .delete_category(label)
            .map_err(io_error)?;
        debug!(category = label, "category removed");
        Ok(())
    }

    /// Store `data` under `category`, returning its digest. Storing bytes that
    /// are already present returns the existing digest and changes nothing.
    pub fn put_data(&mut self, category: &str, data: &[u8]) -> Result<ContentHash> {
        self.put_data_at(category, data, None)
    }

    /// [`DigestDb::put_data`] with an explicit creation timestamp.
    pub fn put_data_at(
        &mut self,
        category: &str,
        data: &[u8],
        timestamp: Option<OffsetDateTime>,
    ) -> Result<ContentHash> {
        let algorithm = self.config.hash();
        let store = self.store_mut()?;
        let hash = hash_bytes(algorithm, data);
        if store.index.contains(&hash).map_err(io_error)? {
            debug!(digest = %hash, "dedup hit");
            return Ok(hash);
        }
        require_category(&store.index, category)?;

        let written = store.blobs.write(&hash, data).map_err(io_error)?;
        store.record(&hash, category, timestamp, data.len() as u64, written)?;
        debug!(digest = %hash, category, bytes = data.len(), "payload stored");
        Ok(hash)
    }

    /// Store several payloads in order, stopping at the first failure.
    pub fn put_many<'a, I>(&mut self, items: I) -> Result<Vec<ContentHash>>
    where
        I: IntoIterator<Item = PutItem<'a>>,
    {
        items
            .into_iter()
            .map(|item| self.put_data_at(item.category, item.data, item.timestamp))
            .collect()
    }

    /// Store the contents of the file at `path` without buffering it whole.
    pub fn put_file(&mut self, category: &str, path: &Path) -> Result<ContentHash> {
        self.put_file_at(category, path, None)
    }

    /// [`DigestDb::put_file`] with an explicit creation timestamp.
    pub fn put_file_at(
        &mut self,
        category: &str,
        path: &Path,
        timestamp: Option<OffsetDateTime>,
    ) -> Result<ContentHash> {
        let algorithm = self.config.hash();
        let store = self.store_mut()?;
        let (hash, size) = hash_file(algorithm, path).map_err(io_error)?;
        if store.index.contains(&hash).map_err(io_error)? {
            debug!(digest = %hash, path = %path.display(), "dedup hit");
            return Ok(hash);
        }
        require_category(&store.index, category)?;

        let file = File::open(path)
            .with_context(|| format!("failed to reopen {}", path.display()))
            .map_err(io_error)?;
        let written = store
            .blobs
            .write_stream(&hash, algorithm, file)
            .map_err(io_error)?;
        store.record(&hash, category, timestamp, size, written)?;
        debug!(digest = %hash, category, bytes = size, path = %path.display(), "file stored");
        Ok(hash)
    }

    /// Presence according to the index, the source of truth.
    pub fn exists(&self, hash: &ContentHash) -> Result<bool> {
        self.store()?.index.contains(hash).map_err(io_error)
    }

    pub fn get_record(&self, hash: &ContentHash) -> Result<DigestRecord> {
        self.store()?.index.get_digest_record(hash).map_err(io_error)
    }

    /// Read a payload. A record whose file is missing or has the wrong size
    /// is reported as `CorruptionDetected`, never as `NotFound`.
    pub fn get_data(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        let store = self.store()?;
        let record = store.index.get_digest_record(hash).map_err(io_error)?;
        let bytes = store
            .blobs
            .read(hash)
            .map_err(|err| corruption_if_missing(hash, err))?;
        if bytes.len() as u64 != record.byte_size {
            return Err(size_corruption(hash, record.byte_size, bytes.len() as u64));
        }
        Ok(bytes)
    }

    /// Streaming counterpart of [`DigestDb::get_data`].
    pub fn open_data(&self, hash: &ContentHash) -> Result<BlobReader> {
        let store = self.store()?;
        let record = store.index.get_digest_record(hash).map_err(io_error)?;
        let file = store
            .blobs
            .open_file(hash)
            .map_err(|err| corruption_if_missing(hash, err))?;
        let actual = file
            .metadata()
            .with_context(|| format!("failed to stat payload for {hash}"))
            .map_err(io_error)?
            .len();
        if actual != record.byte_size {
            return Err(size_corruption(hash, record.byte_size, actual));
        }
        Ok(BlobReader { record, file })
    }

    /// Delete the record, then its payload.
    pub fn delete_data(&mut self, hash: &ContentHash) -> Result<()> {
        let store = self.store_mut()?;
        store.index.delete_digest_record(hash).map_err(io_error)?;
        match store.blobs.delete(hash) {
            Ok(()) => {}
            Err(err) if matches!(store_error(&err), Some(StoreError::NotFound { .. })) => {
                warn!(digest = %hash, "record deleted but its payload was already missing");
            }
            Err(err) => return Err(io_error(err)),
        }
        debug!(digest = %hash, "payload deleted");
        Ok(())
    }

    /// Lazily iterate the records matching `query`. Only the index is read.
    pub fn query_data(&self, query: &DigestQuery) -> Result<RecordCursor<'_>> {
        Ok(self.store()?.index.query(query))
    }

    pub fn count_data(&self) -> Result<u64> {
        self.store()?.index.count_digests().map_err(io_error)
    }
}

impl OpenStore {
    /// Insert the record for a payload that is already on disk. A payload
    /// written by this call is removed again if the insert fails.
    pub(super) fn record(
        &mut self,
        hash: &ContentHash,
        category: &str,
        timestamp: Option<OffsetDateTime>,
        size: u64,
        written: bool,
    ) -> Result<()> {
        let inserted = index_precision(timestamp.unwrap_or_else(OffsetDateTime::now_utc))
            .and_then(|ts| self.index.put_digest_record(hash, category, ts, size));
        if let Err(err) = inserted {
            if written {
                if let Err(cleanup) = self.blobs.delete(hash) {
                    warn!(digest = %hash, %cleanup, "failed to remove payload after index error");
                }
            }
            return Err(io_error(err));
        }
        Ok(())
    }
}

impl Drop for DigestDb {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(%err, "failed to close store");
        }
    }
}

fn require_category(index: &MetadataIndex, category: &str) -> Result<()> {
    if index.has_category(category).map_err(io_error)? {
        Ok(())
    } else {
        Err(StoreError::UnknownCategory(category.to_string()).into())
    }
}

fn corruption_if_missing(hash: &ContentHash, err: anyhow::Error) -> anyhow::Error {
    if matches!(store_error(&err), Some(StoreError::NotFound { .. })) {
        warn!(digest = %hash, "record present but payload file is missing");
        StoreError::CorruptionDetected {
            digest: hash.to_hex(),
            detail: "payload file is missing".to_string(),
        }
        .into()
    } else {
        io_error(err)
    }
}

fn size_corruption(hash: &ContentHash, expected: u64, actual: u64) -> anyhow::Error {
    warn!(digest = %hash, expected, actual, "payload size disagrees with record");
    StoreError::CorruptionDetected {
        digest: hash.to_hex(),
        detail: format!("payload is {actual} bytes, record says {expected}"),
    }
    .into()
}

/// Drop the lock taken by an `open` that failed later on. The open error is
/// what the caller sees, so a release failure is only logged.
fn release_after_failed_open(lock: RootLock) {
    if let Err(err) = lock.release() {
        warn!(%err, "failed to release lock after failed open");
    }
}
