use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind, Read, Write},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use fs4::FileExt;
use rusqlite::{
    params, params_from_iter, types::Value, Connection, OptionalExtension, TransactionBehavior,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;

pub const LOCK_FILENAME: &str = ".digestdb.lock";
pub const DEFAULT_DIR_DEPTH: usize = 3;
const PARTIAL_SUFFIX: &str = ".partial";
const STREAM_CHUNK_SIZE: usize = 1 << 20;
const QUERY_PAGE_SIZE: usize = 256;
const FORMAT_VERSION: u32 = 1;
const META_KEY_FORMAT_VERSION: &str = "format_version";
const META_KEY_HASH_ALGORITHM: &str = "hash_algorithm";
const META_KEY_CREATED_BY: &str = "created_by_version";
const DIGESTDB_VERSION: &str = env!("CARGO_PKG_VERSION");

mod blobs;
mod engine;
mod hashing;
mod index;
mod lock;
mod maintenance;
mod shard;

pub use engine::{BlobReader, PutItem};
pub use hashing::{hash_bytes, hash_file, hash_reader, ContentHash, HashAlgorithm};
pub use index::RecordCursor;
pub use shard::shard_path;

use blobs::BlobStore;
use hashing::HashingReader;
use index::MetadataIndex;
use lock::RootLock;

/// Errors surfaced by the store.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("[DD801] store is already open: lock marker {path} {}", lock_holder(.live))]
    LockHeld { path: String, live: bool },
    #[error("[DD802] store root {path} is unavailable: {reason}")]
    RootUnavailable { path: String, reason: String },
    #[error("[DD803] store is not open")]
    NotOpen,
    #[error("[DD804] directory depth {depth} exceeds the digest length of {max} bytes")]
    InvalidDepth { depth: usize, max: usize },
    #[error("[DD805] unknown hash algorithm '{0}'")]
    UnknownAlgorithm(String),
    #[error("[DD806] invalid digest '{0}'")]
    InvalidDigest(String),
    #[error("[DD810] category '{0}' already exists")]
    DuplicateLabel(String),
    #[error("[DD811] category '{0}' does not exist")]
    UnknownCategory(String),
    #[error("[DD812] category '{0}' not found")]
    CategoryNotFound(String),
    #[error("[DD813] category '{label}' is still referenced by {records} record(s)")]
    CategoryInUse { label: String, records: u64 },
    #[error("[DD820] digest {digest} not found")]
    NotFound { digest: String },
    #[error("[DD830] digest {digest} is corrupt: {detail}")]
    CorruptionDetected { digest: String, detail: String },
    #[error("[DD831] digest mismatch (expected {expected}, found {actual})")]
    DigestMismatch { expected: String, actual: String },
    #[error("[DD840] index format incompatible for {key}: expected {expected}, found {found}")]
    IncompatibleFormat {
        key: String,
        expected: String,
        found: String,
    },
    #[error("[DD841] index metadata is missing required key '{0}'")]
    MissingMeta(String),
    #[error("[DD850] storage I/O failed: {0}")]
    Io(String),
}

impl StoreError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::LockHeld { .. } => "DD801",
            Self::RootUnavailable { .. } => "DD802",
            Self::NotOpen => "DD803",
            Self::InvalidDepth { .. } => "DD804",
            Self::UnknownAlgorithm(_) => "DD805",
            Self::InvalidDigest(_) => "DD806",
            Self::DuplicateLabel(_) => "DD810",
            Self::UnknownCategory(_) => "DD811",
            Self::CategoryNotFound(_) => "DD812",
            Self::CategoryInUse { .. } => "DD813",
            Self::NotFound { .. } => "DD820",
            Self::CorruptionDetected { .. } => "DD830",
            Self::DigestMismatch { .. } => "DD831",
            Self::IncompatibleFormat { .. } => "DD840",
            Self::MissingMeta(_) => "DD841",
            Self::Io(_) => "DD850",
        }
    }

    /// Whether the failure stems from caller input or store state rather than
    /// from the environment.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            Self::CorruptionDetected { .. }
                | Self::DigestMismatch { .. }
                | Self::IncompatibleFormat { .. }
                | Self::MissingMeta(_)
                | Self::Io(_)
        )
    }
}

fn lock_holder(live: &bool) -> &'static str {
    if *live {
        "is held by a running process"
    } else {
        "was left behind by an unclean shutdown; remove it once no process is using the store"
    }
}

/// Named group used to partition stored digests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    pub description: Option<String>,
}

/// Metadata persisted for one stored blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DigestRecord {
    pub digest: ContentHash,
    pub category: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub byte_size: u64,
}

/// Conjunctive filters applied by [`DigestDb::query_data`]. Unset filters
/// match everything; `since` is inclusive and `until` exclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DigestQuery {
    pub category: Option<String>,
    pub since: Option<OffsetDateTime>,
    pub until: Option<OffsetDateTime>,
}

impl DigestQuery {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn in_category(mut self, label: impl Into<String>) -> Self {
        self.category = Some(label.into());
        self
    }

    #[must_use]
    pub fn since(mut self, timestamp: OffsetDateTime) -> Self {
        self.since = Some(timestamp);
        self
    }

    #[must_use]
    pub fn until(mut self, timestamp: OffsetDateTime) -> Self {
        self.until = Some(timestamp);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Closed,
    Open,
}

/// Read-only summary of index/payload agreement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub records: u64,
    pub files: u64,
    pub orphaned_files: Vec<ContentHash>,
    pub missing_files: Vec<ContentHash>,
    pub partials: u64,
}

impl ConsistencyReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.orphaned_files.is_empty() && self.missing_files.is_empty()
    }
}

/// Storage engine pairing the metadata index with the sharded blob tree.
///
/// An instance is single-threaded: mutating operations take `&mut self`, so
/// sharing one engine across threads requires wrapping it in a `Mutex`.
pub struct DigestDb {
    config: StoreConfig,
    open: Option<OpenStore>,
}

struct OpenStore {
    lock: RootLock,
    index: MetadataIndex,
    blobs: BlobStore,
}

impl fmt::Debug for DigestDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestDb")
            .field("root", &self.config.root())
            .field("state", &self.state())
            .finish()
    }
}

fn io_error(err: anyhow::Error) -> anyhow::Error {
    if err.is::<StoreError>() {
        err
    } else {
        StoreError::Io(format!("{err:#}")).into()
    }
}

fn store_error(err: &anyhow::Error) -> Option<&StoreError> {
    err.downcast_ref::<StoreError>()
}

fn fsync_dir(dir: &Path) -> Result<()> {
    let file = File::open(dir)?;
    file.sync_all()?;
    Ok(())
}

fn remove_write_permissions(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = perms.mode();
        let new_mode = mode & !0o222;
        if mode != new_mode {
            perms.set_mode(new_mode);
            fs::set_permissions(path, perms)?;
        }
    }
    #[cfg(not(unix))]
    {
        if !perms.readonly() {
            perms.set_readonly(true);
            fs::set_permissions(path, perms)?;
        }
    }
    Ok(())
}

fn timestamp_to_micros(timestamp: OffsetDateTime) -> Result<i64> {
    let micros = timestamp.unix_timestamp_nanos() / 1_000;
    i64::try_from(micros).context("timestamp out of range for the index")
}

fn micros_to_timestamp(micros: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .context("index holds an out-of-range timestamp")
}

/// Drop sub-microsecond precision so stored and returned timestamps agree.
fn index_precision(timestamp: OffsetDateTime) -> Result<OffsetDateTime> {
    micros_to_timestamp(timestamp_to_micros(timestamp)?)
}

#[cfg(test)]
mod tests;
