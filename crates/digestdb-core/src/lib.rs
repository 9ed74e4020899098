//! Content-addressed blob storage backed by a SQLite metadata index and a
//! hash-sharded payload directory tree.

pub mod config;
mod store;

pub use crate::config::StoreConfig;
pub use crate::store::{
    hash_bytes, hash_file, hash_reader, shard_path, BlobReader, Category, ConsistencyReport,
    ContentHash, DigestDb, DigestQuery, DigestRecord, EngineState, HashAlgorithm, PutItem,
    RecordCursor, StoreError, DEFAULT_DIR_DEPTH, LOCK_FILENAME,
};
