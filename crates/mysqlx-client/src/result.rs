//! Results of executed statements.
//!
//! Every result wraps the [`ResponseStream`] of its request. Rows are
//! decoded lazily as they are fetched, so a malformed field fails only the
//! fetch that reached it. Counters such as the affected row count arrive as
//! notices after the last row and are complete once the result is drained.

use std::sync::Arc;

use futures_core::Stream;
use mysqlx_protocol::{ProtocolError, Warning};
use mysqlx_types::{DbDoc, TypeError};

use crate::error::{Error, Result};
use crate::notice::Notices;
use crate::row::{Column, Row};
use crate::stream::{ResponseStream, ResponseUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Rows,
    SetDone { more: bool },
    Finished,
}

/// Walks the result sets of one response.
#[derive(Debug)]
struct Cursor {
    stream: ResponseStream,
    columns: Arc<[Column]>,
    state: CursorState,
}

impl Cursor {
    async fn open(stream: ResponseStream) -> Result<Self> {
        let mut cursor = Self {
            stream,
            columns: Arc::from(Vec::new()),
            state: CursorState::Finished,
        };
        cursor.start_set().await?;
        Ok(cursor)
    }

    /// Read the head of a result set.
    async fn start_set(&mut self) -> Result<bool> {
        match self.stream.next_unit().await? {
            Some(ResponseUnit::Columns(columns)) => {
                self.columns = columns.into();
                self.state = CursorState::Rows;
                Ok(true)
            }
            Some(ResponseUnit::ResultSetDone { more }) => {
                self.columns = Arc::from(Vec::new());
                self.state = CursorState::SetDone { more };
                if !more {
                    self.finish().await?;
                }
                Ok(true)
            }
            Some(ResponseUnit::Row(_)) => Err(out_of_order("column metadata", "Row")),
            None => {
                self.state = CursorState::Finished;
                Ok(false)
            }
        }
    }

    async fn next_row(&mut self) -> Result<Option<mysqlx_protocol::Row>> {
        if self.state != CursorState::Rows {
            return Ok(None);
        }
        match self.stream.next_unit().await? {
            Some(ResponseUnit::Row(row)) => Ok(Some(row)),
            Some(ResponseUnit::ResultSetDone { more: true }) => {
                self.state = CursorState::SetDone { more: true };
                Ok(None)
            }
            Some(ResponseUnit::ResultSetDone { more: false }) => {
                // Read the trailing notices and release the session.
                self.finish().await?;
                Ok(None)
            }
            Some(ResponseUnit::Columns(_)) => {
                Err(out_of_order("row or fetch done", "ColumnMetaData"))
            }
            None => {
                self.state = CursorState::Finished;
                Ok(None)
            }
        }
    }

    /// Skip what is left of the current set and move to the next one.
    async fn next_set(&mut self) -> Result<bool> {
        while self.next_row().await?.is_some() {}
        match self.state {
            CursorState::SetDone { more: true } => self.start_set().await,
            _ => Ok(false),
        }
    }

    async fn finish(&mut self) -> Result<()> {
        self.state = CursorState::Finished;
        self.stream.drain().await
    }

    fn notices(&self) -> &Notices {
        self.stream.notices()
    }
}

fn out_of_order(expected: &'static str, received: &str) -> Error {
    Error::Protocol(ProtocolError::UnexpectedMessage {
        expected,
        received: received.to_string(),
    })
}

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteResult {
    notices: Notices,
}

impl ExecuteResult {
    pub(crate) fn from_notices(notices: Notices) -> Self {
        Self { notices }
    }

    pub(crate) async fn collect(stream: ResponseStream) -> Result<Self> {
        Ok(Self::from_notices(stream.finish().await?))
    }

    /// Number of documents or rows the statement changed.
    #[must_use]
    pub fn affected_items_count(&self) -> u64 {
        self.notices.rows_affected.unwrap_or(0)
    }

    /// Auto-increment value generated by an insert.
    #[must_use]
    pub fn auto_increment_value(&self) -> Option<u64> {
        self.notices.last_insert_id
    }

    /// `_id` values the server generated, in input order.
    #[must_use]
    pub fn generated_ids(&self) -> &[String] {
        &self.notices.generated_ids
    }

    /// Warnings raised by the statement.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.notices.warnings
    }

    /// Number of warnings.
    #[must_use]
    pub fn warnings_count(&self) -> usize {
        self.notices.warnings_count()
    }

    /// Every notice the server attached.
    #[must_use]
    pub fn notices(&self) -> &Notices {
        &self.notices
    }
}

/// Documents returned by a find.
///
/// ```rust,ignore
/// let mut result = books.find(Some("pages > 100")).execute().await?;
/// while let Some(doc) = result.fetch_one().await? {
///     println!("{}", doc.get("title").unwrap());
/// }
/// ```
#[derive(Debug)]
pub struct DocResult {
    cursor: Cursor,
}

impl DocResult {
    pub(crate) async fn open(stream: ResponseStream) -> Result<Self> {
        Ok(Self {
            cursor: Cursor::open(stream).await?,
        })
    }

    /// Next document, `None` once the result is exhausted.
    pub async fn fetch_one(&mut self) -> Result<Option<DbDoc>> {
        let Some(row) = self.cursor.next_row().await? else {
            return Ok(None);
        };
        let field = row.fields.first().ok_or(TypeError::IndexOutOfRange {
            index: 0,
            len: row.fields.len(),
        })?;
        Ok(Some(mysqlx_types::decode::decode_document(field)?))
    }

    /// Every remaining document.
    pub async fn fetch_all(&mut self) -> Result<Vec<DbDoc>> {
        let mut docs = Vec::new();
        while let Some(doc) = self.fetch_one().await? {
            docs.push(doc);
        }
        Ok(docs)
    }

    /// Warnings received so far. Complete once the result is exhausted.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.cursor.notices().warnings
    }

    /// Number of warnings received so far.
    #[must_use]
    pub fn warnings_count(&self) -> usize {
        self.cursor.notices().warnings_count()
    }

    /// Discard the remaining documents. Later fetches return `None`.
    pub async fn close(&mut self) -> Result<()> {
        self.cursor.finish().await
    }

    /// Turn the result into a stream of documents.
    pub fn into_stream(self) -> impl Stream<Item = Result<DbDoc>> {
        futures_util::stream::try_unfold(self, |mut result| async move {
            Ok::<_, Error>(result.fetch_one().await?.map(|doc| (doc, result)))
        })
    }
}

/// Rows returned by a table select.
#[derive(Debug)]
pub struct RowResult {
    cursor: Cursor,
}

impl RowResult {
    pub(crate) async fn open(stream: ResponseStream) -> Result<Self> {
        Ok(Self {
            cursor: Cursor::open(stream).await?,
        })
    }

    /// Column metadata of the result set.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.cursor.columns
    }

    /// Column labels in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.cursor.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.cursor.columns.len()
    }

    /// Next row, `None` once the result is exhausted.
    pub async fn fetch_one(&mut self) -> Result<Option<Row>> {
        fetch_row(&mut self.cursor).await
    }

    /// Every remaining row.
    pub async fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Warnings received so far.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.cursor.notices().warnings
    }

    /// Number of warnings received so far.
    #[must_use]
    pub fn warnings_count(&self) -> usize {
        self.cursor.notices().warnings_count()
    }

    /// Discard the remaining rows.
    pub async fn close(&mut self) -> Result<()> {
        self.cursor.finish().await
    }

    /// Turn the result into a stream of rows.
    pub fn into_stream(self) -> impl Stream<Item = Result<Row>> {
        futures_util::stream::try_unfold(self, |mut result| async move {
            Ok::<_, Error>(result.fetch_one().await?.map(|row| (row, result)))
        })
    }
}

async fn fetch_row(cursor: &mut Cursor) -> Result<Option<Row>> {
    let Some(raw) = cursor.next_row().await? else {
        return Ok(None);
    };
    Ok(Some(Row::decode(raw, Arc::clone(&cursor.columns))?))
}

/// Result of a raw SQL statement.
///
/// A statement may produce several result sets; [`SqlResult::next_result`]
/// moves between them. Statements without a result set report counters
/// only.
#[derive(Debug)]
pub struct SqlResult {
    cursor: Cursor,
}

impl SqlResult {
    pub(crate) async fn open(stream: ResponseStream) -> Result<Self> {
        Ok(Self {
            cursor: Cursor::open(stream).await?,
        })
    }

    /// Whether the current result set has columns.
    #[must_use]
    pub fn has_data(&self) -> bool {
        !self.cursor.columns.is_empty()
    }

    /// Column metadata of the current result set.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.cursor.columns
    }

    /// Column labels of the current result set.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.cursor.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Next row of the current result set.
    pub async fn fetch_one(&mut self) -> Result<Option<Row>> {
        fetch_row(&mut self.cursor).await
    }

    /// Every remaining row of the current result set.
    pub async fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Move to the next result set. Returns `false` when there is none.
    pub async fn next_result(&mut self) -> Result<bool> {
        self.cursor.next_set().await
    }

    /// Rows the statement changed. Complete once the result is drained.
    #[must_use]
    pub fn affected_items_count(&self) -> u64 {
        self.cursor.notices().rows_affected.unwrap_or(0)
    }

    /// Auto-increment value generated by the statement.
    #[must_use]
    pub fn auto_increment_value(&self) -> Option<u64> {
        self.cursor.notices().last_insert_id
    }

    /// Warnings received so far.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.cursor.notices().warnings
    }

    /// Number of warnings received so far.
    #[must_use]
    pub fn warnings_count(&self) -> usize {
        self.cursor.notices().warnings_count()
    }

    /// Discard every remaining result set.
    pub async fn close(&mut self) -> Result<()> {
        self.cursor.finish().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mysqlx_protocol::{Notice, SessionStateParam, WarningLevel};

    #[test]
    fn test_execute_result_counters() {
        let mut notices = Notices::default();
        notices.record(Notice::state_changed(
            SessionStateParam::RowsAffected,
            vec![2u64.into()],
        ));
        notices.record(Notice::state_changed(
            SessionStateParam::GeneratedDocumentIds,
            vec!["a1".into(), "a2".into()],
        ));
        notices.record(Notice::warning(WarningLevel::Note, 1287, "deprecated"));

        let result = ExecuteResult::from_notices(notices);
        assert_eq!(result.affected_items_count(), 2);
        assert_eq!(result.generated_ids(), ["a1", "a2"]);
        assert_eq!(result.warnings_count(), 1);
        assert_eq!(result.warnings()[0].code, 1287);
        assert_eq!(result.auto_increment_value(), None);
    }

    #[test]
    fn test_empty_execute_result() {
        let result = ExecuteResult::default();
        assert_eq!(result.affected_items_count(), 0);
        assert!(result.generated_ids().is_empty());
    }
}
