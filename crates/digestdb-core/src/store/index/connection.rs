//! SQLite connection setup.

use super::super::*;

pub(super) fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open index at {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL for index")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys for index")?;
    conn.busy_timeout(Duration::from_secs(10))
        .context("failed to set busy timeout for index")?;
    Ok(conn)
}
