//! Exclusive-access marker guarding a store root across processes.

use super::*;

#[derive(Debug)]
pub(crate) struct RootLock {
    path: PathBuf,
    file: Option<File>,
}

impl RootLock {
    /// Atomically create the marker at `path`. An existing marker is never
    /// taken over, whether its owner is alive or crashed.
    pub(crate) fn acquire(path: &Path) -> Result<Self> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let live = marker_is_held(path);
                return Err(StoreError::LockHeld {
                    path: path.display().to_string(),
                    live,
                }
                .into());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create lock marker {}", path.display()))
            }
        };

        let owner = writeln!(file, "{}", std::process::id()).and_then(|()| file.sync_all());
        if let Err(err) = owner {
            let _ = fs::remove_file(path);
            return Err(err)
                .with_context(|| format!("failed to write lock marker {}", path.display()));
        }
        if let Err(err) = file.try_lock_exclusive() {
            // The marker alone still excludes other openers.
            warn!(path = %path.display(), %err, "advisory lock on marker unavailable");
        }
        debug!(path = %path.display(), "store lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    pub(crate) fn release(mut self) -> Result<()> {
        self.release_marker()
    }

    fn release_marker(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let _ = FileExt::unlock(&file);
        drop(file);
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "lock marker vanished while held");
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to remove lock marker {}", self.path.display())
                })
            }
        }
        debug!(path = %self.path.display(), "store lock released");
        Ok(())
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        if let Err(err) = self.release_marker() {
            warn!(%err, "failed to release store lock");
        }
    }
}

/// Whether a process currently holds the advisory lock on an existing marker.
fn marker_is_held(path: &Path) -> bool {
    let Ok(file) = OpenOptions::new().read(true).open(path) else {
        return false;
    };
    match FileExt::try_lock_shared(&file) {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            false
        }
        Err(err) if err.kind() == ErrorKind::WouldBlock => true,
        #[cfg(windows)]
        Err(err) if matches!(err.raw_os_error(), Some(32 | 33)) => true,
        Err(_) => false,
    }
}
