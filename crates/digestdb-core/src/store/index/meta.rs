//! Meta table initialization + version enforcement.

use super::super::*;

pub(super) fn ensure_meta(conn: &mut Connection, algorithm: HashAlgorithm) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to start index meta transaction")?;
    tx.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params![META_KEY_FORMAT_VERSION, FORMAT_VERSION.to_string()],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params![META_KEY_HASH_ALGORITHM, algorithm.name()],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params![META_KEY_CREATED_BY, DIGESTDB_VERSION],
    )?;
    tx.commit()?;

    enforce_meta_value(
        conn,
        META_KEY_FORMAT_VERSION,
        &FORMAT_VERSION.to_string(),
    )?;
    // Digests of different algorithms cannot share one shard tree.
    enforce_meta_value(conn, META_KEY_HASH_ALGORITHM, algorithm.name())?;
    Ok(())
}

fn meta_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = ?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map_err(Into::into)
}

fn enforce_meta_value(conn: &Connection, key: &str, expected: &str) -> Result<()> {
    let value = meta_value(conn, key)?.ok_or_else(|| StoreError::MissingMeta(key.to_string()))?;
    if value != expected {
        return Err(StoreError::IncompatibleFormat {
            key: key.to_string(),
            expected: expected.to_string(),
            found: value,
        }
        .into());
    }
    Ok(())
}
