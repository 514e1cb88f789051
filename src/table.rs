//! TableLens Interface and In-Memory Tables
//!
//! A TableLens is a row/column addressable grid of cells. Every filter in this
//! crate consumes a `TableLens` and is itself a `TableLens`, so lenses chain
//! without limit.
//!
//! # Row counts
//!
//! A table whose rows are still arriving (or still being scanned) reports a
//! negative row count: `-(rows_known) - 1`. Once the table is final the count
//! is the exact, non-negative number of rows. `more_rows(r)` blocks until row
//! `r` exists or the table is known to end before it.
//!
//! # Examples
//!
//! ```
//! use tablelens::{CellValue, MemoryTable, TableLens};
//!
//! let table = MemoryTable::new(vec![
//!     vec!["name".into(), "score".into()],
//!     vec!["Alice".into(), 92.into()],
//!     vec!["Bob".into(), 85.into()],
//! ]);
//!
//! assert_eq!(table.row_count(), 3);
//! assert_eq!(table.header_row_count(), 1);
//! assert_eq!(table.get_object(1, 0), CellValue::from("Alice"));
//! assert!(table.get_object(9, 9).is_null());
//! ```

use crate::changeset::{ChangeListener, ChangeListeners, TableChangeEvent};
use crate::crosstab::CrossTabFilter;
use crate::descriptor::TableDataDescriptor;
use crate::grouped::GroupedTable;
use crate::sorted::SortedTable;
use crate::value::CellValue;
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};

/// A row/column addressable grid of cells.
pub trait TableLens: Send + Sync {
    /// Number of rows; negative (`-(known) - 1`) while the table is still growing
    fn row_count(&self) -> i64;

    fn col_count(&self) -> usize;

    fn header_row_count(&self) -> usize {
        1
    }

    fn header_col_count(&self) -> usize {
        0
    }

    fn trailer_row_count(&self) -> usize {
        0
    }

    fn trailer_col_count(&self) -> usize {
        0
    }

    /// Block until `row` is available. Returns false if the table ends before it.
    fn more_rows(&self, row: usize) -> bool;

    /// Value at (row, col); `Null` when out of range
    fn get_object(&self, row: usize, col: usize) -> CellValue;

    fn is_null(&self, row: usize, col: usize) -> bool {
        self.get_object(row, col).is_null()
    }

    fn get_double(&self, row: usize, col: usize) -> Option<f64> {
        self.get_object(row, col).to_number()
    }

    /// Overwrite a cell. Tables that do not store values ignore the call.
    fn set_object(&self, _row: usize, _col: usize, _value: CellValue) {}

    /// Stable identifier of a column, independent of its header text
    fn column_identifier(&self, _col: usize) -> Option<String> {
        None
    }

    /// Discard derived state
    fn invalidate(&self) {}

    /// Release resources, cascading upstream
    fn dispose(&self) {}

    fn add_change_listener(&self, listener: Weak<dyn ChangeListener>);

    fn as_filter(&self) -> Option<&dyn TableFilter> {
        None
    }

    fn as_grouped(&self) -> Option<&dyn GroupedTable> {
        None
    }

    fn as_sorted(&self) -> Option<&dyn SortedTable> {
        None
    }

    fn as_cancellable(&self) -> Option<&dyn CancellableTable> {
        None
    }

    fn as_crosstab(&self) -> Option<&CrossTabFilter> {
        None
    }

    fn as_descriptor(&self) -> Option<&dyn TableDataDescriptor> {
        None
    }
}

/// A lens that presents a transformed view of exactly one upstream table.
pub trait TableFilter: TableLens {
    /// The immediate upstream table
    fn table(&self) -> &Arc<dyn TableLens>;

    /// Upstream row for a row of this filter, or `None` when there is none
    fn base_row_index(&self, row: usize) -> Option<usize>;

    /// Upstream column for a column of this filter, or `None` when there is none
    fn base_col_index(&self, col: usize) -> Option<usize>;
}

/// A table whose long-running row production can be aborted cooperatively.
pub trait CancellableTable {
    fn cancel(&self);

    fn is_cancelled(&self) -> bool;
}

/// Encode a row count using the growing-table convention.
pub fn encode_row_count(known: usize, complete: bool) -> i64 {
    if complete {
        known as i64
    } else {
        -(known as i64) - 1
    }
}

/// Decode a row count into (rows known so far, is final).
pub fn decode_row_count(count: i64) -> (usize, bool) {
    if count >= 0 {
        (count as usize, true)
    } else {
        ((-count - 1) as usize, false)
    }
}

/// Drive a table to completion and return its final row count.
pub fn resolve_row_count(table: &dyn TableLens) -> usize {
    loop {
        let (known, complete) = decode_row_count(table.row_count());
        if complete {
            return known;
        }
        if !table.more_rows(known) {
            return decode_row_count(table.row_count()).0;
        }
    }
}

/// Text of the first header row for `col`, falling back to the column identifier.
pub fn header_text(table: &dyn TableLens, col: usize) -> Option<String> {
    if table.header_row_count() > 0 {
        let value = table.get_object(0, col);
        if !value.is_null() {
            return Some(value.to_string());
        }
    }
    table.column_identifier(col)
}

struct MemoryState {
    rows: Vec<Vec<CellValue>>,
    complete: bool,
}

/// Base table over rows held in memory.
///
/// A table built with `new` is complete. A table built with `streaming` starts
/// with only its header row; rows are added with `append_row` and become visible
/// to readers blocked in `more_rows` immediately. `finish` marks it final.
pub struct MemoryTable {
    state: Mutex<MemoryState>,
    ready: Condvar,
    col_count: usize,
    header_rows: usize,
    header_cols: usize,
    trailer_rows: usize,
    trailer_cols: usize,
    identifiers: Vec<Option<String>>,
    listeners: ChangeListeners,
}

impl MemoryTable {
    /// A complete table; the first row is the header row.
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self::build(rows, col_count, true)
    }

    /// A growing table that initially holds just `header`.
    pub fn streaming(header: Vec<CellValue>) -> Self {
        let col_count = header.len();
        Self::build(vec![header], col_count, false)
    }

    fn build(rows: Vec<Vec<CellValue>>, col_count: usize, complete: bool) -> Self {
        MemoryTable {
            state: Mutex::new(MemoryState { rows, complete }),
            ready: Condvar::new(),
            col_count,
            header_rows: 1,
            header_cols: 0,
            trailer_rows: 0,
            trailer_cols: 0,
            identifiers: Vec::new(),
            listeners: ChangeListeners::new(),
        }
    }

    pub fn with_header_rows(mut self, count: usize) -> Self {
        self.header_rows = count;
        self
    }

    pub fn with_header_cols(mut self, count: usize) -> Self {
        self.header_cols = count;
        self
    }

    pub fn with_trailer_rows(mut self, count: usize) -> Self {
        self.trailer_rows = count;
        self
    }

    pub fn with_trailer_cols(mut self, count: usize) -> Self {
        self.trailer_cols = count;
        self
    }

    pub fn with_identifiers(mut self, identifiers: Vec<&str>) -> Self {
        self.identifiers = identifiers.into_iter().map(|s| Some(s.to_string())).collect();
        self
    }

    /// Convert into a shareable handle
    pub fn into_lens(self) -> Arc<dyn TableLens> {
        Arc::new(self)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a row to a streaming table and wake blocked readers.
    /// Rows appended after `finish` are ignored.
    pub fn append_row(&self, row: Vec<CellValue>) {
        let mut state = self.lock();
        if state.complete {
            log::warn!("append_row on a finished table ignored");
            return;
        }
        state.rows.push(row);
        self.ready.notify_all();
    }

    /// Mark a streaming table as final
    pub fn finish(&self) {
        let mut state = self.lock();
        state.complete = true;
        self.ready.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        self.lock().complete
    }
}

impl TableLens for MemoryTable {
    fn row_count(&self) -> i64 {
        let state = self.lock();
        encode_row_count(state.rows.len(), state.complete)
    }

    fn col_count(&self) -> usize {
        self.col_count
    }

    fn header_row_count(&self) -> usize {
        self.header_rows
    }

    fn header_col_count(&self) -> usize {
        self.header_cols
    }

    fn trailer_row_count(&self) -> usize {
        self.trailer_rows
    }

    fn trailer_col_count(&self) -> usize {
        self.trailer_cols
    }

    fn more_rows(&self, row: usize) -> bool {
        let mut state = self.lock();
        while row >= state.rows.len() && !state.complete {
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        row < state.rows.len()
    }

    fn get_object(&self, row: usize, col: usize) -> CellValue {
        self.lock()
            .rows
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or(CellValue::Null)
    }

    fn set_object(&self, row: usize, col: usize, value: CellValue) {
        {
            let mut state = self.lock();
            let Some(cells) = state.rows.get_mut(row) else {
                return;
            };
            if col >= self.col_count {
                return;
            }
            if cells.len() <= col {
                cells.resize(col + 1, CellValue::Null);
            }
            cells[col] = value;
        }
        self.listeners.fire(TableChangeEvent::data_changed(row, col));
    }

    fn column_identifier(&self, col: usize) -> Option<String> {
        self.identifiers.get(col).cloned().flatten()
    }

    fn invalidate(&self) {
        self.listeners.fire(TableChangeEvent::invalidated());
    }

    fn dispose(&self) {
        self.finish();
    }

    fn add_change_listener(&self, listener: Weak<dyn ChangeListener>) {
        self.listeners.add(listener);
    }
}

impl std::fmt::Debug for MemoryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryTable")
            .field("rows", &state.rows.len())
            .field("cols", &self.col_count)
            .field("complete", &state.complete)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a complete table from string/number literals
    pub fn table(rows: Vec<Vec<CellValue>>) -> Arc<dyn TableLens> {
        Arc::new(MemoryTable::new(rows))
    }

    /// Read a whole row as values
    pub fn row_values(table: &dyn TableLens, row: usize) -> Vec<CellValue> {
        (0..table.col_count()).map(|c| table.get_object(row, c)).collect()
    }
}
