//! Column remapping filters
//!
//! `ColumnMapFilter` presents a permutation/subset of the upstream columns.
//! `map[c]` is the upstream column shown at column `c`; `None` shows an empty
//! column. Rows are untouched.
//!
//! # Header handling
//!
//! - Duplicate names in header row 0 are disambiguated with `.1`, `.2`, ...
//!   suffixes; the first occurrence keeps its name. Lower header rows are
//!   passed through as-is.
//! - `set_object(0, c, v)` pins a header value for column `c`. A pinned cell
//!   never consults the upstream again.
//!
//! # Examples
//!
//! ```
//! use tablelens::{CellValue, ColumnMapFilter, MemoryTable, TableFilter, TableLens};
//! use std::sync::Arc;
//!
//! let base: Arc<dyn TableLens> = Arc::new(MemoryTable::new(vec![
//!     vec!["A".into(), "B".into(), "C".into()],
//!     vec![1.into(), 2.into(), 3.into()],
//! ]));
//! let filter = ColumnMapFilter::new(base, vec![Some(2), Some(0)]);
//!
//! assert_eq!(filter.col_count(), 2);
//! assert_eq!(filter.get_object(0, 0), CellValue::from("C"));
//! assert_eq!(filter.base_col_index(1), Some(0));
//! ```

use crate::changeset::{ChangeListener, ChangeListeners, TableChangeEvent};
use crate::error::{LensError, Result};
use crate::grouped::GroupedTable;
use crate::sorted::{Comparer, SortedTable};
use crate::table::{TableFilter, TableLens};
use crate::value::CellValue;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Mutex, PoisonError, Weak};

pub struct ColumnMapFilter {
    table: Arc<dyn TableLens>,
    map: Vec<Option<usize>>,
    /// Disambiguated header row 0, built on first use
    headers: Mutex<Option<Arc<Vec<CellValue>>>>,
    pinned: Mutex<FxHashMap<usize, CellValue>>,
    listeners: ChangeListeners,
}

impl ColumnMapFilter {
    pub fn new(table: Arc<dyn TableLens>, map: Vec<Option<usize>>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let listener: Weak<dyn ChangeListener> = weak.clone();
            table.add_change_listener(listener);
            ColumnMapFilter {
                table,
                map,
                headers: Mutex::new(None),
                pinned: Mutex::new(FxHashMap::default()),
                listeners: ChangeListeners::new(),
            }
        })
    }

    /// Show the upstream columns in the given order
    pub fn with_columns(table: Arc<dyn TableLens>, cols: &[usize]) -> Arc<Self> {
        Self::new(table, cols.iter().map(|&c| Some(c)).collect())
    }

    pub fn map(&self) -> &[Option<usize>] {
        &self.map
    }

    fn base_col(&self, col: usize) -> Option<usize> {
        self.map.get(col).copied().flatten()
    }

    /// Filter column showing upstream column `base`
    pub fn find_col(&self, base: usize) -> Option<usize> {
        self.map.iter().position(|m| *m == Some(base))
    }

    fn pinned(&self, col: usize) -> Option<CellValue> {
        self.pinned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&col)
            .cloned()
    }

    fn header_row(&self) -> Arc<Vec<CellValue>> {
        let mut guard = self.headers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(headers) = guard.as_ref() {
            return headers.clone();
        }

        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut row = Vec::with_capacity(self.map.len());
        for col in 0..self.map.len() {
            let value = match self.base_col(col) {
                Some(base) => self.table.get_object(0, base),
                None => CellValue::Null,
            };
            if value.is_null() {
                row.push(value);
                continue;
            }

            let name = value.to_string();
            if seen.insert(name.clone()) {
                row.push(value);
                continue;
            }

            let mut n = 1;
            let unique = loop {
                let candidate = format!("{}.{}", name, n);
                if seen.insert(candidate.clone()) {
                    break candidate;
                }
                n += 1;
            };
            row.push(CellValue::String(unique));
        }

        let row = Arc::new(row);
        *guard = Some(row.clone());
        row
    }

    fn reset(&self) {
        *self.headers.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl TableLens for ColumnMapFilter {
    fn row_count(&self) -> i64 {
        self.table.row_count()
    }

    fn col_count(&self) -> usize {
        self.map.len()
    }

    fn header_row_count(&self) -> usize {
        self.table.header_row_count()
    }

    fn header_col_count(&self) -> usize {
        let base_headers = self.table.header_col_count();
        self.map
            .iter()
            .take_while(|m| m.is_some_and(|b| b < base_headers))
            .count()
    }

    fn trailer_row_count(&self) -> usize {
        self.table.trailer_row_count()
    }

    fn trailer_col_count(&self) -> usize {
        let base_count = self.table.col_count();
        let base_trailers = self.table.trailer_col_count();
        self.map
            .iter()
            .rev()
            .take_while(|m| m.is_some_and(|b| b + base_trailers >= base_count && b < base_count))
            .count()
    }

    fn more_rows(&self, row: usize) -> bool {
        self.table.more_rows(row)
    }

    fn get_object(&self, row: usize, col: usize) -> CellValue {
        if col >= self.map.len() {
            return CellValue::Null;
        }
        if row == 0 {
            if let Some(value) = self.pinned(col) {
                return value;
            }
            if self.table.header_row_count() > 0 {
                return self.header_row().get(col).cloned().unwrap_or_default();
            }
        }
        match self.base_col(col) {
            Some(base) => self.table.get_object(row, base),
            None => CellValue::Null,
        }
    }

    fn is_null(&self, row: usize, col: usize) -> bool {
        if col >= self.map.len() {
            return true;
        }
        if row == 0 {
            if let Some(value) = self.pinned(col) {
                return value.is_null();
            }
        }
        match self.base_col(col) {
            Some(base) => self.table.is_null(row, base),
            None => true,
        }
    }

    fn get_double(&self, row: usize, col: usize) -> Option<f64> {
        if row == 0 {
            return self.get_object(row, col).to_number();
        }
        self.base_col(col)
            .and_then(|base| self.table.get_double(row, base))
    }

    fn set_object(&self, row: usize, col: usize, value: CellValue) {
        if col >= self.map.len() {
            return;
        }
        if row == 0 {
            self.pinned
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(col, value);
            self.listeners.fire(TableChangeEvent::data_changed(row, col));
            return;
        }
        if let Some(base) = self.base_col(col) {
            self.table.set_object(row, base, value);
        }
    }

    fn column_identifier(&self, col: usize) -> Option<String> {
        self.base_col(col)
            .and_then(|base| self.table.column_identifier(base))
    }

    fn invalidate(&self) {
        self.reset();
        self.listeners.fire(TableChangeEvent::invalidated());
    }

    fn dispose(&self) {
        self.table.dispose();
    }

    fn add_change_listener(&self, listener: Weak<dyn ChangeListener>) {
        self.listeners.add(listener);
    }

    fn as_filter(&self) -> Option<&dyn TableFilter> {
        Some(self)
    }

    fn as_sorted(&self) -> Option<&dyn SortedTable> {
        self.table.as_sorted().map(|_| self as &dyn SortedTable)
    }
}

impl TableFilter for ColumnMapFilter {
    fn table(&self) -> &Arc<dyn TableLens> {
        &self.table
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        Some(row)
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        self.base_col(col)
    }
}

/// Sort columns translated through the column map; removed columns are dropped.
impl SortedTable for ColumnMapFilter {
    fn sort_cols(&self) -> Vec<usize> {
        let Some(sorted) = self.table.as_sorted() else {
            return Vec::new();
        };
        sorted
            .sort_cols()
            .into_iter()
            .filter_map(|base| self.find_col(base))
            .collect()
    }

    fn is_ascending(&self) -> Vec<bool> {
        let Some(sorted) = self.table.as_sorted() else {
            return Vec::new();
        };
        sorted
            .sort_cols()
            .into_iter()
            .zip(sorted.is_ascending())
            .filter(|(base, _)| self.find_col(*base).is_some())
            .map(|(_, asc)| asc)
            .collect()
    }

    fn comparer(&self, col: usize) -> Option<Comparer> {
        let base = self.base_col(col)?;
        self.table.as_sorted()?.comparer(base)
    }
}

impl ChangeListener for ColumnMapFilter {
    fn table_changed(&self, event: &TableChangeEvent) {
        if event.shifts_indices() {
            self.invalidate();
            return;
        }
        self.reset();
        self.listeners.fire(*event);
    }
}

/// Column map over a grouped table that keeps the grouping visible.
///
/// Column-indexed queries translate through the map and return the neutral
/// value (`false` / `None`) for any column outside it.
pub struct GroupedColumnMapFilter {
    inner: Arc<ColumnMapFilter>,
    listeners: ChangeListeners,
}

impl GroupedColumnMapFilter {
    pub fn new(table: Arc<dyn TableLens>, map: Vec<Option<usize>>) -> Result<Arc<Self>> {
        if table.as_grouped().is_none() {
            return Err(LensError::InvalidDefinition(
                "grouped column map requires a grouped table".to_string(),
            ));
        }

        let inner = ColumnMapFilter::new(table, map);
        Ok(Arc::new_cyclic(|weak: &Weak<Self>| {
            let listener: Weak<dyn ChangeListener> = weak.clone();
            inner.add_change_listener(listener);
            GroupedColumnMapFilter {
                inner,
                listeners: ChangeListeners::new(),
            }
        }))
    }

    fn grouped(&self) -> Option<&dyn GroupedTable> {
        self.inner.table.as_grouped()
    }

    pub fn map(&self) -> &[Option<usize>] {
        self.inner.map()
    }
}

impl TableLens for GroupedColumnMapFilter {
    fn row_count(&self) -> i64 {
        self.inner.row_count()
    }

    fn col_count(&self) -> usize {
        self.inner.col_count()
    }

    fn header_row_count(&self) -> usize {
        self.inner.header_row_count()
    }

    fn header_col_count(&self) -> usize {
        self.inner.header_col_count()
    }

    fn trailer_row_count(&self) -> usize {
        self.inner.trailer_row_count()
    }

    fn trailer_col_count(&self) -> usize {
        self.inner.trailer_col_count()
    }

    fn more_rows(&self, row: usize) -> bool {
        self.inner.more_rows(row)
    }

    fn get_object(&self, row: usize, col: usize) -> CellValue {
        self.inner.get_object(row, col)
    }

    fn is_null(&self, row: usize, col: usize) -> bool {
        self.inner.is_null(row, col)
    }

    fn set_object(&self, row: usize, col: usize, value: CellValue) {
        self.inner.set_object(row, col, value);
    }

    fn column_identifier(&self, col: usize) -> Option<String> {
        self.inner.column_identifier(col)
    }

    fn invalidate(&self) {
        self.inner.invalidate();
    }

    fn dispose(&self) {
        self.inner.dispose();
    }

    fn add_change_listener(&self, listener: Weak<dyn ChangeListener>) {
        self.listeners.add(listener);
    }

    fn as_filter(&self) -> Option<&dyn TableFilter> {
        Some(self)
    }

    fn as_grouped(&self) -> Option<&dyn GroupedTable> {
        Some(self)
    }

    fn as_sorted(&self) -> Option<&dyn SortedTable> {
        self.inner.as_sorted()
    }
}

impl TableFilter for GroupedColumnMapFilter {
    fn table(&self) -> &Arc<dyn TableLens> {
        self.inner.table()
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        Some(row)
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        self.inner.base_col(col)
    }
}

impl GroupedTable for GroupedColumnMapFilter {
    fn group_col_count(&self) -> usize {
        self.grouped().map_or(0, |g| g.group_col_count())
    }

    fn is_group_column(&self, col: usize) -> bool {
        match (self.grouped(), self.inner.base_col(col)) {
            (Some(g), Some(base)) => g.is_group_column(base),
            _ => false,
        }
    }

    fn group_col_level(&self, col: usize) -> Option<usize> {
        let base = self.inner.base_col(col)?;
        self.grouped()?.group_col_level(base)
    }

    fn group_level(&self, row: usize) -> Option<usize> {
        self.grouped()?.group_level(row)
    }

    fn summary_level(&self, row: usize) -> Option<usize> {
        self.grouped()?.summary_level(row)
    }

    fn has_grand_summary(&self) -> bool {
        self.grouped().is_some_and(|g| g.has_grand_summary())
    }

    fn is_group_header_cell(&self, row: usize, col: usize) -> bool {
        match (self.grouped(), self.inner.base_col(col)) {
            (Some(g), Some(base)) => g.is_group_header_cell(row, base),
            _ => false,
        }
    }
}

impl ChangeListener for GroupedColumnMapFilter {
    fn table_changed(&self, event: &TableChangeEvent) {
        self.listeners.fire(*event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouped::test_support::two_level;
    use crate::sorted::{SortFilter, SortKey};
    use crate::table::test_support::table;
    use crate::table::MemoryTable;

    fn abc() -> Arc<dyn TableLens> {
        table(vec![
            vec!["A".into(), "B".into(), "C".into()],
            vec![1.into(), 2.into(), 3.into()],
            vec![4.into(), 5.into(), 6.into()],
        ])
    }

    #[test]
    fn test_column_map_scenario() {
        let filter = ColumnMapFilter::new(abc(), vec![Some(2), Some(0)]);
        assert_eq!(filter.col_count(), 2);
        assert_eq!(filter.get_object(0, 0), CellValue::from("C"));
        assert_eq!(filter.get_object(0, 1), CellValue::from("A"));
        assert_eq!(filter.base_col_index(0), Some(2));
        assert_eq!(filter.base_col_index(1), Some(0));
        assert_eq!(filter.get_object(2, 0), CellValue::Int(6));
    }

    #[test]
    fn test_index_inversion() {
        let base = abc();
        let filter = ColumnMapFilter::new(base.clone(), vec![Some(1), None, Some(1), Some(0)]);
        for r in 1..3 {
            for c in 0..filter.col_count() {
                match (filter.base_row_index(r), filter.base_col_index(c)) {
                    (Some(br), Some(bc)) => {
                        assert_eq!(filter.get_object(r, c), base.get_object(br, bc))
                    }
                    _ => assert!(filter.get_object(r, c).is_null()),
                }
            }
        }
    }

    #[test]
    fn test_out_of_range_column_is_neutral() {
        let filter = ColumnMapFilter::new(abc(), vec![Some(0)]);
        assert!(filter.get_object(1, 5).is_null());
        assert!(filter.is_null(1, 5));
        assert_eq!(filter.base_col_index(5), None);
        assert_eq!(filter.get_double(1, 7), None);
    }

    #[test]
    fn test_upstream_changes_refresh_headers() {
        use crate::changeset::TableChange;

        struct Log(Mutex<Vec<TableChange>>);
        impl ChangeListener for Log {
            fn table_changed(&self, event: &TableChangeEvent) {
                self.0.lock().unwrap().push(event.change);
            }
        }

        let base = abc();
        let filter = ColumnMapFilter::new(base.clone(), vec![Some(2), Some(0)]);
        let log = Arc::new(Log(Mutex::new(Vec::new())));
        filter.add_change_listener(Arc::downgrade(&log) as Weak<dyn ChangeListener>);
        assert_eq!(filter.get_object(0, 0), CellValue::from("C"));

        base.set_object(0, 2, CellValue::from("Z"));
        assert_eq!(filter.get_object(0, 0), CellValue::from("Z"));
        assert!(matches!(log.0.lock().unwrap()[..], [TableChange::DataChanged { .. }]));

        base.invalidate();
        assert_eq!(log.0.lock().unwrap().last(), Some(&TableChange::Invalidated));
        assert_eq!(filter.get_object(0, 1), CellValue::from("A"));
    }

    #[test]
    fn test_out_of_range_header_is_null() {
        let filter = ColumnMapFilter::new(abc(), vec![Some(0), Some(1)]);
        filter.set_object(0, 5, CellValue::from("Ghost"));
        assert!(filter.is_null(0, 5));
        assert!(filter.get_object(0, 5).is_null());
        assert!(filter.is_null(0, 2));
        assert!(!filter.is_null(0, 1));
    }

    #[test]
    fn test_duplicate_headers_get_suffix() {
        let base: Arc<dyn TableLens> = Arc::new(
            MemoryTable::new(vec![
                vec!["x".into(), "y".into()],
                vec!["x".into(), "y".into()],
                vec![1.into(), 2.into()],
            ])
            .with_header_rows(2),
        );
        let filter = ColumnMapFilter::new(base, vec![Some(0), Some(1), Some(0), Some(0)]);
        let header: Vec<_> = (0..4).map(|c| filter.get_object(0, c).to_string()).collect();
        assert_eq!(header, vec!["x", "y", "x.1", "x.2"]);

        // second header row is not deduplicated
        let second: Vec<_> = (0..4).map(|c| filter.get_object(1, c).to_string()).collect();
        assert_eq!(second, vec!["x", "y", "x", "x"]);
    }

    #[test]
    fn test_pinned_header_short_circuits() {
        let base = abc();
        let filter = ColumnMapFilter::new(base.clone(), vec![Some(0), Some(1)]);
        filter.set_object(0, 1, CellValue::from("Renamed"));
        assert_eq!(filter.get_object(0, 1), CellValue::from("Renamed"));
        assert_eq!(base.get_object(0, 1), CellValue::from("B"));

        filter.set_object(0, 0, CellValue::Null);
        assert!(filter.is_null(0, 0));
        assert!(!base.is_null(0, 0));

        filter.set_object(1, 0, CellValue::Int(10));
        assert_eq!(base.get_object(1, 0), CellValue::Int(10));
    }

    #[test]
    fn test_sort_columns_translate_through_map() {
        let sorted = SortFilter::new(
            abc(),
            vec![SortKey::descending(2), SortKey::ascending(1), SortKey::ascending(0)],
        );
        let filter = ColumnMapFilter::new(sorted, vec![Some(0), Some(2)]);
        let as_sorted = filter.as_sorted().unwrap();
        assert_eq!(as_sorted.sort_cols(), vec![1, 0]);
        assert_eq!(as_sorted.is_ascending(), vec![false, true]);
        assert!(as_sorted.comparer(0).is_none());

        let plain = ColumnMapFilter::new(abc(), vec![Some(0)]);
        assert!(plain.as_sorted().is_none());
    }

    #[test]
    fn test_header_col_count() {
        let base: Arc<dyn TableLens> = Arc::new(
            MemoryTable::new(vec![vec!["h".into(), "a".into(), "b".into()]])
                .with_header_cols(1),
        );
        let filter = ColumnMapFilter::new(base.clone(), vec![Some(0), Some(2)]);
        assert_eq!(filter.header_col_count(), 1);
        let moved = ColumnMapFilter::new(base, vec![Some(2), Some(0)]);
        assert_eq!(moved.header_col_count(), 0);
    }

    #[test]
    fn test_grouped_column_map_bounds() {
        let grouped: Arc<dyn TableLens> = Arc::new(two_level());
        let filter = GroupedColumnMapFilter::new(grouped, vec![Some(2), Some(1)]).unwrap();
        assert_eq!(filter.group_col_count(), 2);
        assert!(!filter.is_group_column(0));
        assert!(filter.is_group_column(1));
        assert_eq!(filter.group_col_level(1), Some(1));
        assert!(filter.is_group_header_cell(3, 1));

        // outside the map
        assert!(!filter.is_group_column(9));
        assert_eq!(filter.group_col_level(9), None);
        assert!(!filter.is_group_header_cell(3, 9));

        assert_eq!(filter.group_first_row(4, 1), Some(3));

        let plain = GroupedColumnMapFilter::new(abc(), vec![Some(0)]);
        assert!(plain.is_err());
    }
}
