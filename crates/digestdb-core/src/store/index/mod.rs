//! Metadata index.
//!
//! A SQLite database holding category definitions and one record per stored
//! digest. The code is split by responsibility (connection/schema/meta,
//! categories, digest records, queries).

use super::*;

mod categories;
mod connection;
mod digests;
mod meta;
mod query;
mod schema;

pub use query::RecordCursor;

pub(crate) struct MetadataIndex {
    conn: Connection,
    path: PathBuf,
}

impl MetadataIndex {
    /// Open or create the index at `path`, refusing files written with a
    /// different format or hash algorithm.
    pub(crate) fn open(path: &Path, algorithm: HashAlgorithm) -> Result<Self> {
        let mut conn = connection::open_connection(path)?;
        schema::init_schema(&conn)?;
        meta::ensure_meta(&mut conn, algorithm)?;
        debug!(path = %path.display(), algorithm = %algorithm, "metadata index ready");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub(crate) fn close(self) -> Result<()> {
        let path = self.path;
        self.conn
            .close()
            .map_err(|(_, err)| err)
            .with_context(|| format!("failed to close index {}", path.display()))
    }
}
