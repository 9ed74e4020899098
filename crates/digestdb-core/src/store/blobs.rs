//! Payload files under the sharded directory tree.

use super::*;

#[derive(Clone, Debug)]
pub(crate) struct BlobStore {
    root: PathBuf,
    depth: usize,
}

impl BlobStore {
    /// Ensure the payload root exists. Shard directories are only created on
    /// the write path.
    pub(crate) fn open(root: PathBuf, depth: usize) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create payload directory {}", root.display()))?;
        Ok(Self { root, depth })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn path_for(&self, hash: &ContentHash) -> Result<PathBuf> {
        Ok(self.root.join(shard_path(hash, self.depth)?))
    }

    /// Write `bytes` under `hash`. Returns `false` when the payload was
    /// already present and left untouched.
    pub(crate) fn write(&self, hash: &ContentHash, bytes: &[u8]) -> Result<bool> {
        let dest = self.path_for(hash)?;
        if dest.exists() {
            debug!(digest = %hash, "payload already present");
            return Ok(false);
        }
        let mut tmp = self.partial_for(&dest)?;
        tmp.write_all(bytes)
            .with_context(|| format!("failed to write partial payload {}", tmp.path().display()))?;
        self.commit(tmp, &dest)?;
        Ok(true)
    }

    /// Stream `reader` into place under `hash`, re-hashing on the way. The
    /// partial file is discarded if the stream does not hash to `hash`.
    pub(crate) fn write_stream<R: Read>(
        &self,
        hash: &ContentHash,
        algorithm: HashAlgorithm,
        reader: R,
    ) -> Result<bool> {
        let dest = self.path_for(hash)?;
        if dest.exists() {
            debug!(digest = %hash, "payload already present");
            return Ok(false);
        }
        let mut tmp = self.partial_for(&dest)?;
        let mut hashing = HashingReader::new(reader, algorithm);
        io::copy(&mut hashing, &mut tmp)
            .with_context(|| format!("failed to stream partial payload {}", tmp.path().display()))?;
        let (actual, bytes) = hashing.finish();
        if &actual != hash {
            return Err(StoreError::DigestMismatch {
                expected: hash.to_hex(),
                actual: actual.to_hex(),
            }
            .into());
        }
        self.commit(tmp, &dest)?;
        debug!(digest = %hash, bytes, "payload streamed");
        Ok(true)
    }

    fn partial_for(&self, dest: &Path) -> Result<tempfile::NamedTempFile> {
        let parent = dest.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create shard directory {}", parent.display()))?;
        tempfile::Builder::new()
            .prefix(".")
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(parent)
            .with_context(|| format!("failed to create partial payload in {}", parent.display()))
    }

    fn commit(&self, tmp: tempfile::NamedTempFile, dest: &Path) -> Result<()> {
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("failed to flush partial payload {}", tmp.path().display()))?;
        tmp.persist(dest).map_err(|err| err.error).with_context(|| {
            format!("failed to move payload into place at {}", dest.display())
        })?;
        if let Some(parent) = dest.parent() {
            fsync_dir(parent).ok();
        }
        remove_write_permissions(dest)?;
        Ok(())
    }

    pub(crate) fn read(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        let path = self.path_for(hash)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                digest: hash.to_hex(),
            }
            .into()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read payload {}", path.display()))
            }
        }
    }

    pub(crate) fn open_file(&self, hash: &ContentHash) -> Result<File> {
        let path = self.path_for(hash)?;
        match File::open(&path) {
            Ok(file) => Ok(file),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                digest: hash.to_hex(),
            }
            .into()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to open payload {}", path.display()))
            }
        }
    }

    /// Filesystem-only presence check, independent of the index.
    pub(crate) fn exists(&self, hash: &ContentHash) -> Result<bool> {
        Ok(self.path_for(hash)?.is_file())
    }

    /// Remove the payload file. Emptied shard directories are left in place.
    pub(crate) fn delete(&self, hash: &ContentHash) -> Result<()> {
        let path = self.path_for(hash)?;
        #[cfg(not(unix))]
        clear_readonly(&path);
        match fs::remove_file(&path) {
            Ok(()) => {
                if let Some(parent) = path.parent() {
                    fsync_dir(parent).ok();
                }
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                digest: hash.to_hex(),
            }
            .into()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to delete payload {}", path.display()))
            }
        }
    }
}

#[cfg(not(unix))]
fn clear_readonly(path: &Path) {
    if let Ok(metadata) = fs::metadata(path) {
        let mut perms = metadata.permissions();
        if perms.readonly() {
            perms.set_readonly(false);
            let _ = fs::set_permissions(path, perms);
        }
    }
}
