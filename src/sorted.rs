//! Sorted tables
//!
//! `SortedTable` is the capability a lens exposes when its data rows are in a
//! known order. Column remapping filters read it to translate sort columns
//! through their own column map.
//!
//! `SortFilter` is the concrete sorted lens: header and trailer rows stay in
//! place, data rows are stably sorted on one or more keys.

use crate::changeset::{ChangeListener, ChangeListeners, TableChangeEvent};
use crate::table::{resolve_row_count, TableFilter, TableLens};
use crate::value::CellValue;
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Custom ordering for one sort column
pub type Comparer = Arc<dyn Fn(&CellValue, &CellValue) -> Ordering + Send + Sync>;

/// A lens whose data rows are ordered on a set of columns.
pub trait SortedTable {
    /// Sort columns, primary first
    fn sort_cols(&self) -> Vec<usize>;

    /// Ascending flag for each entry of `sort_cols`
    fn is_ascending(&self) -> Vec<bool>;

    /// Custom comparer for a sort column, if one was supplied
    fn comparer(&self, col: usize) -> Option<Comparer>;
}

/// Sort order specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending order (smallest first)
    Ascending,
    /// Descending order (largest first)
    Descending,
}

/// A single sort key: a column, an order and an optional comparer
#[derive(Clone)]
pub struct SortKey {
    pub col: usize,
    pub order: SortOrder,
    pub comparer: Option<Comparer>,
}

impl SortKey {
    pub fn ascending(col: usize) -> Self {
        SortKey {
            col,
            order: SortOrder::Ascending,
            comparer: None,
        }
    }

    pub fn descending(col: usize) -> Self {
        SortKey {
            col,
            order: SortOrder::Descending,
            comparer: None,
        }
    }

    /// Replace the natural value ordering for this key
    pub fn with_comparer(mut self, comparer: Comparer) -> Self {
        self.comparer = Some(comparer);
        self
    }

    fn compare(&self, a: &CellValue, b: &CellValue) -> Ordering {
        let base = match &self.comparer {
            Some(cmp) => cmp(a, b),
            None => a.compare(b),
        };
        match self.order {
            SortOrder::Ascending => base,
            SortOrder::Descending => base.reverse(),
        }
    }
}

impl fmt::Debug for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortKey")
            .field("col", &self.col)
            .field("order", &self.order)
            .field("comparer", &self.comparer.is_some())
            .finish()
    }
}

/// Lens presenting the upstream's data rows in sorted order.
///
/// The row index is built on first access, which drains the upstream table.
pub struct SortFilter {
    table: Arc<dyn TableLens>,
    keys: Vec<SortKey>,
    /// Sorted index: index[row] = upstream row
    index: Mutex<Option<Arc<Vec<usize>>>>,
    listeners: ChangeListeners,
}

impl SortFilter {
    pub fn new(table: Arc<dyn TableLens>, keys: Vec<SortKey>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let listener: Weak<dyn ChangeListener> = weak.clone();
            table.add_change_listener(listener);
            SortFilter {
                table,
                keys,
                index: Mutex::new(None),
                listeners: ChangeListeners::new(),
            }
        })
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.keys
    }

    fn sorted_index(&self) -> Arc<Vec<usize>> {
        let mut guard = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = guard.as_ref() {
            return index.clone();
        }

        let index = Arc::new(self.build_index());
        *guard = Some(index.clone());
        index
    }

    fn build_index(&self) -> Vec<usize> {
        let table = self.table.as_ref();
        let count = resolve_row_count(table);
        let headers = table.header_row_count().min(count);
        let trailers = table.trailer_row_count().min(count - headers);
        let data_end = count - trailers;

        // Fetch sort values once per row
        let mut data: Vec<(usize, Vec<CellValue>)> = (headers..data_end)
            .map(|r| (r, self.keys.iter().map(|k| table.get_object(r, k.col)).collect()))
            .collect();

        data.sort_by(|(_, a), (_, b)| {
            for (i, key) in self.keys.iter().enumerate() {
                let cmp = key.compare(&a[i], &b[i]);
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        });

        log::debug!("sorted {} data rows on {} keys", data.len(), self.keys.len());

        (0..headers)
            .chain(data.into_iter().map(|(r, _)| r))
            .chain(data_end..count)
            .collect()
    }

    fn reset(&self) {
        *self.index.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl TableLens for SortFilter {
    fn row_count(&self) -> i64 {
        self.sorted_index().len() as i64
    }

    fn col_count(&self) -> usize {
        self.table.col_count()
    }

    fn header_row_count(&self) -> usize {
        self.table.header_row_count()
    }

    fn header_col_count(&self) -> usize {
        self.table.header_col_count()
    }

    fn trailer_row_count(&self) -> usize {
        self.table.trailer_row_count()
    }

    fn trailer_col_count(&self) -> usize {
        self.table.trailer_col_count()
    }

    fn more_rows(&self, row: usize) -> bool {
        row < self.sorted_index().len()
    }

    fn get_object(&self, row: usize, col: usize) -> CellValue {
        match self.base_row_index(row) {
            Some(base) => self.table.get_object(base, col),
            None => CellValue::Null,
        }
    }

    fn set_object(&self, row: usize, col: usize, value: CellValue) {
        if let Some(base) = self.base_row_index(row) {
            self.table.set_object(base, col, value);
        }
    }

    fn column_identifier(&self, col: usize) -> Option<String> {
        self.table.column_identifier(col)
    }

    fn invalidate(&self) {
        self.reset();
        self.listeners.fire(TableChangeEvent::invalidated());
    }

    fn dispose(&self) {
        self.reset();
        self.table.dispose();
    }

    fn add_change_listener(&self, listener: Weak<dyn ChangeListener>) {
        self.listeners.add(listener);
    }

    fn as_filter(&self) -> Option<&dyn TableFilter> {
        Some(self)
    }

    fn as_sorted(&self) -> Option<&dyn SortedTable> {
        Some(self)
    }
}

impl TableFilter for SortFilter {
    fn table(&self) -> &Arc<dyn TableLens> {
        &self.table
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        self.sorted_index().get(row).copied()
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        (col < self.table.col_count()).then_some(col)
    }
}

impl SortedTable for SortFilter {
    fn sort_cols(&self) -> Vec<usize> {
        self.keys.iter().map(|k| k.col).collect()
    }

    fn is_ascending(&self) -> Vec<bool> {
        self.keys
            .iter()
            .map(|k| k.order == SortOrder::Ascending)
            .collect()
    }

    fn comparer(&self, col: usize) -> Option<Comparer> {
        self.keys
            .iter()
            .find(|k| k.col == col)
            .and_then(|k| k.comparer.clone())
    }
}

impl ChangeListener for SortFilter {
    fn table_changed(&self, _event: &TableChangeEvent) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::test_support::{row_values, table};
    use crate::table::MemoryTable;

    fn scores() -> Arc<dyn TableLens> {
        table(vec![
            vec!["name".into(), "score".into()],
            vec!["Bob".into(), 85.into()],
            vec!["Alice".into(), 92.into()],
            vec!["Carol".into(), CellValue::Null],
            vec!["Dave".into(), 85.into()],
        ])
    }

    #[test]
    fn test_sort_ascending_is_stable() {
        let sorted = SortFilter::new(scores(), vec![SortKey::ascending(1)]);
        assert_eq!(sorted.row_count(), 5);
        assert_eq!(sorted.get_object(0, 0), CellValue::from("name"));
        // nulls sort first, ties keep upstream order
        assert_eq!(sorted.get_object(1, 0), CellValue::from("Carol"));
        assert_eq!(sorted.get_object(2, 0), CellValue::from("Bob"));
        assert_eq!(sorted.get_object(3, 0), CellValue::from("Dave"));
        assert_eq!(sorted.get_object(4, 0), CellValue::from("Alice"));
    }

    #[test]
    fn test_sort_descending_with_base_index() {
        let base = scores();
        let sorted = SortFilter::new(base.clone(), vec![SortKey::descending(1)]);
        assert_eq!(sorted.get_object(1, 0), CellValue::from("Alice"));
        assert_eq!(sorted.base_row_index(1), Some(2));

        for r in 0..5 {
            let b = sorted.base_row_index(r).unwrap();
            assert_eq!(row_values(&*sorted, r), row_values(base.as_ref(), b));
        }
        assert_eq!(sorted.base_row_index(5), None);
    }

    #[test]
    fn test_trailer_rows_stay_in_place() {
        let base: Arc<dyn TableLens> = Arc::new(
            MemoryTable::new(vec![
                vec!["n".into()],
                vec![3.into()],
                vec![1.into()],
                vec![2.into()],
                vec![6.into()],
            ])
            .with_trailer_rows(1),
        );
        let sorted = SortFilter::new(base, vec![SortKey::ascending(0)]);
        let values: Vec<_> = (0..5).map(|r| sorted.get_object(r, 0)).collect();
        assert_eq!(
            values,
            vec!["n".into(), 1.into(), 2.into(), 3.into(), CellValue::Int(6)]
        );
    }

    #[test]
    fn test_custom_comparer() {
        let by_len: Comparer = Arc::new(|a: &CellValue, b: &CellValue| {
            a.to_string().len().cmp(&b.to_string().len())
        });
        let sorted = SortFilter::new(scores(), vec![SortKey::ascending(0).with_comparer(by_len)]);
        assert_eq!(sorted.get_object(1, 0), CellValue::from("Bob"));
        assert_eq!(sorted.get_object(4, 0), CellValue::from("Carol"));
        assert!(sorted.comparer(0).is_some());
        assert!(sorted.comparer(1).is_none());
        assert_eq!(sorted.sort_cols(), vec![0]);
        assert_eq!(sorted.is_ascending(), vec![true]);
    }

    #[test]
    fn test_upstream_change_resorts() {
        let base = Arc::new(MemoryTable::new(vec![
            vec!["n".into()],
            vec![1.into()],
            vec![2.into()],
        ]));
        let lens: Arc<dyn TableLens> = base.clone();
        let sorted = SortFilter::new(lens, vec![SortKey::descending(0)]);
        assert_eq!(sorted.get_object(1, 0), CellValue::Int(2));

        base.set_object(1, 0, CellValue::Int(5));
        assert_eq!(sorted.get_object(1, 0), CellValue::Int(5));
    }
}
