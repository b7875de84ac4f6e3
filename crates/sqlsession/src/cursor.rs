//! Cursors over result sets.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sqlsession_pool::{Recycle, ValueArena};
use sqlsession_types::SqlValue;

use crate::db::Shared;
use crate::driver::RowSource;
use crate::error::{Error, Resource, Result};
use crate::row::{Column, Row};

/// Recyclable part of a cursor.
pub(crate) struct CursorState {
    /// `None` once the result set is exhausted.
    source: Option<Box<dyn RowSource>>,
    columns: Arc<[Column]>,
    arena: Weak<Mutex<ValueArena>>,
    /// Raw values of the row being read, reused across rows.
    buffer: Vec<SqlValue>,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            source: None,
            columns: Arc::from(Vec::new()),
            arena: Weak::new(),
            buffer: Vec::new(),
        }
    }
}

impl Recycle for CursorState {
    fn recycle(&mut self) {
        self.source = None;
        self.columns = Arc::from(Vec::new());
        self.arena = Weak::new();
        self.buffer.clear();
    }
}

impl CursorState {
    /// Scan the buffered row into slots borrowed from the arena.
    fn fill_row(&self) -> Result<Row> {
        if self.buffer.len() != self.columns.len() {
            return Err(Error::driver(format!(
                "driver returned {} values for {} columns",
                self.buffer.len(),
                self.columns.len()
            )));
        }

        let arena = self.arena.upgrade().ok_or(Error::Closed(Resource::Arena))?;
        let mut arena = arena.lock();
        let values = self
            .columns
            .iter()
            .zip(&self.buffer)
            .map(|(column, value)| {
                let slot = arena.acquire_kind(column.kind())?;
                slot.scan(value)?;
                Ok(slot)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Row::new(Arc::clone(&self.columns), values))
    }
}

/// Rows of a query, read one at a time.
///
/// Each fetched [`Row`] scans into slots borrowed from the session tree's
/// arena, so rows stay readable until the root session closes.
pub struct Cursor {
    state: Option<Box<CursorState>>,
    shared: Arc<Shared>,
}

impl Cursor {
    pub(crate) fn new(
        shared: Arc<Shared>,
        source: Box<dyn RowSource>,
        columns: Arc<[Column]>,
        arena: Weak<Mutex<ValueArena>>,
    ) -> Self {
        let mut state = shared.cursors.get_or_else(Box::default);
        state.source = Some(source);
        state.columns = columns;
        state.arena = arena;
        Self {
            state: Some(state),
            shared,
        }
    }

    /// Column metadata; empty once closed.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        match &self.state {
            Some(state) => &state.columns,
            None => &[],
        }
    }

    /// Fetch the next row, or `None` when the result set is exhausted.
    pub async fn fetch_one(&mut self) -> Result<Option<Row>> {
        let state = self.state.as_mut().ok_or(Error::Closed(Resource::Cursor))?;
        let CursorState { source, buffer, .. } = &mut **state;
        let Some(rows) = source.as_mut() else {
            return Ok(None);
        };

        let more = rows.next_row(buffer).await.map_err(Error::Driver)?;
        if !more {
            let closed = rows.close().await.map_err(Error::Driver);
            *source = None;
            closed?;
            return Ok(None);
        }

        let row = state.fill_row()?;
        self.shared.metrics.record_rows(1);
        Ok(Some(row))
    }

    /// Fetch every remaining row and close the cursor.
    pub async fn fetch_all(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one().await? {
            rows.push(row);
        }
        self.close().await?;
        Ok(rows)
    }

    /// Release the result set. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };
        let result = match state.source.take() {
            Some(mut source) => source.close().await.map_err(Error::Driver),
            None => Ok(()),
        };
        self.shared.cursors.put(state);
        result
    }

    /// Whether [`Cursor::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.is_none()
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.shared.cursors.put(state);
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("columns", &self.columns())
            .field("closed", &self.is_closed())
            .finish()
    }
}
