//! Category table helpers.

use super::super::*;

impl MetadataIndex {
    pub(crate) fn put_category(&mut self, label: &str, description: Option<&str>) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start category transaction")?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO categories(label, description) VALUES (?1, ?2)",
            params![label, description],
        )?;
        if inserted == 0 {
            return Err(StoreError::DuplicateLabel(label.to_string()).into());
        }
        tx.commit()?;
        Ok(())
    }

    pub(crate) fn category(&self, label: &str) -> Result<Option<Category>> {
        self.conn
            .query_row(
                "SELECT label, description FROM categories WHERE label = ?1",
                params![label],
                |row| {
                    Ok(Category {
                        label: row.get(0)?,
                        description: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub(crate) fn get_category(&self, label: &str) -> Result<Category> {
        self.category(label)?
            .ok_or_else(|| StoreError::CategoryNotFound(label.to_string()).into())
    }

    pub(crate) fn has_category(&self, label: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM categories WHERE label = ?1 LIMIT 1",
                params![label],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Categories matching an exact label and/or a description substring.
    pub(crate) fn query_categories(
        &self,
        label: Option<&str>,
        description_contains: Option<&str>,
    ) -> Result<Vec<Category>> {
        let mut sql = String::from("SELECT label, description FROM categories WHERE 1 = 1");
        let mut values: Vec<Value> = Vec::new();
        if let Some(label) = label {
            values.push(Value::Text(label.to_string()));
            sql.push_str(&format!(" AND label = ?{}", values.len()));
        }
        if let Some(needle) = description_contains {
            values.push(Value::Text(needle.to_string()));
            sql.push_str(&format!(" AND instr(description, ?{}) > 0", values.len()));
        }
        sql.push_str(" ORDER BY label ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok(Category {
                label: row.get(0)?,
                description: row.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    pub(crate) fn count_categories(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Remove a category nothing references any more.
    pub(crate) fn delete_category(&mut self, label: &str) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start category transaction")?;
        let records: i64 = tx.query_row(
            "SELECT COUNT(*) FROM digests WHERE category_label = ?1",
            params![label],
            |row| row.get(0),
        )?;
        if records > 0 {
            return Err(StoreError::CategoryInUse {
                label: label.to_string(),
                records: records as u64,
            }
            .into());
        }
        let deleted = tx.execute("DELETE FROM categories WHERE label = ?1", params![label])?;
        if deleted == 0 {
            return Err(StoreError::CategoryNotFound(label.to_string()).into());
        }
        tx.commit()?;
        Ok(())
    }
}
