//! Lazy, paged record queries.

use super::super::*;
use super::digests::{raw_record, record_from_row, RECORD_COLUMNS};

/// Iterator over the records matching a [`DigestQuery`], in digest order.
///
/// Rows are fetched a page at a time using the last digest seen as the
/// resume key, so memory use is bounded regardless of result size. The
/// cursor borrows the engine, which keeps writers out until it is dropped.
pub struct RecordCursor<'a> {
    conn: &'a Connection,
    query: DigestQuery,
    page_size: usize,
    after: Option<Vec<u8>>,
    page: std::vec::IntoIter<DigestRecord>,
    exhausted: bool,
}

impl MetadataIndex {
    pub(crate) fn query(&self, query: &DigestQuery) -> RecordCursor<'_> {
        self.query_paged(query, QUERY_PAGE_SIZE)
    }

    pub(crate) fn query_paged(&self, query: &DigestQuery, page_size: usize) -> RecordCursor<'_> {
        RecordCursor {
            conn: &self.conn,
            query: query.clone(),
            page_size: page_size.max(1),
            after: None,
            page: Vec::new().into_iter(),
            exhausted: false,
        }
    }
}

impl RecordCursor<'_> {
    fn fetch_page(&mut self) -> Result<Vec<DigestRecord>> {
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM digests WHERE 1 = 1");
        let mut values: Vec<Value> = Vec::new();
        if let Some(category) = &self.query.category {
            values.push(Value::Text(category.clone()));
            sql.push_str(&format!(" AND category_label = ?{}", values.len()));
        }
        if let Some(since) = self.query.since {
            values.push(Value::Integer(timestamp_to_micros(since)?));
            sql.push_str(&format!(" AND timestamp >= ?{}", values.len()));
        }
        if let Some(until) = self.query.until {
            values.push(Value::Integer(timestamp_to_micros(until)?));
            sql.push_str(&format!(" AND timestamp < ?{}", values.len()));
        }
        if let Some(after) = &self.after {
            values.push(Value::Blob(after.clone()));
            sql.push_str(&format!(" AND digest > ?{}", values.len()));
        }
        values.push(Value::Integer(self.page_size as i64));
        sql.push_str(&format!(" ORDER BY digest ASC LIMIT ?{}", values.len()));

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let raw = stmt
            .query_map(params_from_iter(values.iter()), raw_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(record_from_row).collect()
    }
}

impl Iterator for RecordCursor<'_> {
    type Item = Result<DigestRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.page.next() {
                return Some(Ok(record));
            }
            if self.exhausted {
                return None;
            }
            match self.fetch_page() {
                Ok(records) => {
                    if records.len() < self.page_size {
                        self.exhausted = true;
                    }
                    if let Some(last) = records.last() {
                        self.after = Some(last.digest.as_bytes().to_vec());
                    }
                    self.page = records.into_iter();
                }
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
