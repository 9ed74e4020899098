//! Index schema initialization (SQLite DDL).

use super::super::*;

pub(super) fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS categories (
            label TEXT PRIMARY KEY,
            description TEXT
        );
        CREATE TABLE IF NOT EXISTS digests (
            digest BLOB PRIMARY KEY,
            category_label TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            byte_size INTEGER NOT NULL,
            FOREIGN KEY(category_label) REFERENCES categories(label)
        );
        CREATE INDEX IF NOT EXISTS digests_by_category
            ON digests(category_label, timestamp);
        "#,
    )
    .context("failed to initialize index schema")?;
    Ok(())
}
