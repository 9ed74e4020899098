//! Digest record helpers (insert/lookup/delete).

use super::super::*;

/// Raw row as stored; converted by [`record_from_row`].
pub(super) type RawRecord = (Vec<u8>, String, i64, i64);

pub(super) const RECORD_COLUMNS: &str = "digest, category_label, timestamp, byte_size";

pub(super) fn raw_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

pub(super) fn record_from_row(raw: RawRecord) -> Result<DigestRecord> {
    let (digest, category, timestamp, byte_size) = raw;
    Ok(DigestRecord {
        digest: ContentHash::from_bytes(digest),
        category,
        timestamp: micros_to_timestamp(timestamp)?,
        byte_size: byte_size as u64,
    })
}

impl MetadataIndex {
    /// Insert a record for `hash`. Returns `false` without touching the
    /// existing row when the digest is already indexed.
    pub(crate) fn put_digest_record(
        &mut self,
        hash: &ContentHash,
        category: &str,
        timestamp: OffsetDateTime,
        byte_size: u64,
    ) -> Result<bool> {
        let micros = timestamp_to_micros(timestamp)?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start digest transaction")?;
        let known_category = tx
            .query_row(
                "SELECT 1 FROM categories WHERE label = ?1 LIMIT 1",
                params![category],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !known_category {
            return Err(StoreError::UnknownCategory(category.to_string()).into());
        }
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO digests(digest, category_label, timestamp, byte_size) \
             VALUES (?1, ?2, ?3, ?4)",
            params![hash.as_bytes(), category, micros, byte_size as i64],
        )?;
        tx.commit()?;
        Ok(inserted > 0)
    }

    pub(crate) fn digest_record(&self, hash: &ContentHash) -> Result<Option<DigestRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM digests WHERE digest = ?1"),
                params![hash.as_bytes()],
                raw_record,
            )
            .optional()?;
        raw.map(record_from_row).transpose()
    }

    pub(crate) fn get_digest_record(&self, hash: &ContentHash) -> Result<DigestRecord> {
        self.digest_record(hash)?.ok_or_else(|| {
            StoreError::NotFound {
                digest: hash.to_hex(),
            }
            .into()
        })
    }

    pub(crate) fn contains(&self, hash: &ContentHash) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM digests WHERE digest = ?1 LIMIT 1",
                params![hash.as_bytes()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub(crate) fn delete_digest_record(&mut self, hash: &ContentHash) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM digests WHERE digest = ?1", params![hash.as_bytes()])?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                digest: hash.to_hex(),
            }
            .into());
        }
        Ok(())
    }

    pub(crate) fn count_digests(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM digests", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
