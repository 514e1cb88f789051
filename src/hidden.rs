//! Hidden row/column filter
//!
//! Presents the upstream table minus a set of hidden rows and columns. The
//! visible index lists are built on first access and rebuilt after an
//! invalidate; both are strictly increasing, so the forward and inverse
//! translations are exact.

use crate::changeset::{ChangeListener, ChangeListeners, TableChange, TableChangeEvent};
use crate::table::{resolve_row_count, TableFilter, TableLens};
use crate::value::CellValue;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, Weak};

#[derive(Debug)]
struct Visible {
    rows: Vec<usize>,
    cols: Vec<usize>,
    header_rows: usize,
    header_cols: usize,
    trailer_rows: usize,
    trailer_cols: usize,
}

pub struct HiddenRowColFilter {
    table: Arc<dyn TableLens>,
    hidden_rows: BTreeSet<usize>,
    hidden_cols: BTreeSet<usize>,
    visible: Mutex<Option<Arc<Visible>>>,
    listeners: ChangeListeners,
}

impl HiddenRowColFilter {
    pub fn new(
        table: Arc<dyn TableLens>,
        hidden_rows: BTreeSet<usize>,
        hidden_cols: BTreeSet<usize>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let listener: Weak<dyn ChangeListener> = weak.clone();
            table.add_change_listener(listener);
            HiddenRowColFilter {
                table,
                hidden_rows,
                hidden_cols,
                visible: Mutex::new(None),
                listeners: ChangeListeners::new(),
            }
        })
    }

    pub fn hidden_rows(&self) -> &BTreeSet<usize> {
        &self.hidden_rows
    }

    pub fn hidden_cols(&self) -> &BTreeSet<usize> {
        &self.hidden_cols
    }

    fn visible(&self) -> Arc<Visible> {
        let mut guard = self.visible.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(visible) = guard.as_ref() {
            return visible.clone();
        }

        let table = self.table.as_ref();
        let row_count = resolve_row_count(table);
        let col_count = table.col_count();
        let rows = Self::keep(0..row_count, &self.hidden_rows);
        let cols = Self::keep(0..col_count, &self.hidden_cols);

        let header_rows = Self::count_in(&rows, 0, table.header_row_count());
        let trailer_rows = Self::count_in(
            &rows,
            row_count.saturating_sub(table.trailer_row_count()),
            row_count,
        );
        let header_cols = Self::count_in(&cols, 0, table.header_col_count());
        let trailer_cols = Self::count_in(
            &cols,
            col_count.saturating_sub(table.trailer_col_count()),
            col_count,
        );

        log::debug!(
            "hidden filter: {} of {} rows, {} of {} columns visible",
            rows.len(),
            row_count,
            cols.len(),
            col_count
        );

        let visible = Arc::new(Visible {
            rows,
            cols,
            header_rows,
            header_cols,
            trailer_rows,
            trailer_cols,
        });
        *guard = Some(visible.clone());
        visible
    }

    fn keep(range: std::ops::Range<usize>, hidden: &BTreeSet<usize>) -> Vec<usize> {
        range.filter(|i| !hidden.contains(i)).collect()
    }

    /// Number of visible entries in [from, to)
    fn count_in(visible: &[usize], from: usize, to: usize) -> usize {
        visible.iter().filter(|&&i| i >= from && i < to).count()
    }

    /// Filter row showing upstream row `base`, if it is visible
    pub fn row_of(&self, base: usize) -> Option<usize> {
        self.visible().rows.binary_search(&base).ok()
    }

    /// Filter column showing upstream column `base`, if it is visible
    pub fn col_of(&self, base: usize) -> Option<usize> {
        self.visible().cols.binary_search(&base).ok()
    }

    fn reset(&self) {
        *self.visible.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl TableLens for HiddenRowColFilter {
    fn row_count(&self) -> i64 {
        self.visible().rows.len() as i64
    }

    fn col_count(&self) -> usize {
        self.visible().cols.len()
    }

    fn header_row_count(&self) -> usize {
        self.visible().header_rows
    }

    fn header_col_count(&self) -> usize {
        self.visible().header_cols
    }

    fn trailer_row_count(&self) -> usize {
        self.visible().trailer_rows
    }

    fn trailer_col_count(&self) -> usize {
        self.visible().trailer_cols
    }

    fn more_rows(&self, row: usize) -> bool {
        row < self.visible().rows.len()
    }

    fn get_object(&self, row: usize, col: usize) -> CellValue {
        match (self.base_row_index(row), self.base_col_index(col)) {
            (Some(r), Some(c)) => self.table.get_object(r, c),
            _ => CellValue::Null,
        }
    }

    fn set_object(&self, row: usize, col: usize, value: CellValue) {
        if let (Some(r), Some(c)) = (self.base_row_index(row), self.base_col_index(col)) {
            self.table.set_object(r, c, value);
        }
    }

    fn column_identifier(&self, col: usize) -> Option<String> {
        self.base_col_index(col)
            .and_then(|c| self.table.column_identifier(c))
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
}

impl TableFilter for HiddenRowColFilter {
    fn table(&self) -> &Arc<dyn TableLens> {
        &self.table
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        self.visible().rows.get(row).copied()
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        self.visible().cols.get(col).copied()
    }
}

impl ChangeListener for HiddenRowColFilter {
    fn table_changed(&self, event: &TableChangeEvent) {
        match event.change {
            TableChange::DataChanged { row, col } => {
                if let (Some(r), Some(c)) = (self.row_of(row), self.col_of(col)) {
                    self.listeners.fire(TableChangeEvent::data_changed(r, c));
                }
            }
            TableChange::Invalidated => self.invalidate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MemoryTable;

    fn grid() -> Arc<dyn TableLens> {
        let rows: Vec<Vec<CellValue>> = (0..6)
            .map(|r| (0..4).map(|c| CellValue::Int(r * 10 + c)).collect())
            .collect();
        Arc::new(
            MemoryTable::new(rows)
                .with_header_rows(2)
                .with_trailer_rows(1)
                .with_header_cols(1),
        )
    }

    #[test]
    fn test_hidden_rows_and_cols() {
        let filter = HiddenRowColFilter::new(
            grid(),
            BTreeSet::from([1, 3]),
            BTreeSet::from([0, 2]),
        );
        assert_eq!(filter.row_count(), 4);
        assert_eq!(filter.col_count(), 2);
        assert_eq!(filter.header_row_count(), 1);
        assert_eq!(filter.header_col_count(), 0);
        assert_eq!(filter.trailer_row_count(), 1);
        assert_eq!(filter.get_object(1, 0), CellValue::Int(21));
        assert_eq!(filter.get_object(2, 1), CellValue::Int(43));
        assert!(filter.get_object(4, 0).is_null());
    }

    #[test]
    fn test_base_indices_are_exact_inverses() {
        let base = grid();
        let filter = HiddenRowColFilter::new(base.clone(), BTreeSet::from([2, 5]), BTreeSet::from([1]));
        for r in 0..filter.row_count() as usize {
            let br = filter.base_row_index(r).unwrap();
            assert_eq!(filter.row_of(br), Some(r));
            for c in 0..filter.col_count() {
                let bc = filter.base_col_index(c).unwrap();
                assert_eq!(filter.col_of(bc), Some(c));
                assert_eq!(filter.get_object(r, c), base.get_object(br, bc));
            }
        }
        assert_eq!(filter.row_of(2), None);
        assert_eq!(filter.trailer_row_count(), 0);
    }

    #[test]
    fn test_rebuilt_after_invalidate() {
        let base = Arc::new(MemoryTable::streaming(vec!["n".into()]));
        base.append_row(vec![1.into()]);
        base.append_row(vec![2.into()]);
        base.finish();
        let lens: Arc<dyn TableLens> = base.clone();

        let filter = HiddenRowColFilter::new(lens, BTreeSet::from([1]), BTreeSet::new());
        assert_eq!(filter.row_count(), 2);
        assert_eq!(filter.get_object(1, 0), CellValue::Int(2));

        base.set_object(2, 0, CellValue::Int(7));
        assert_eq!(filter.get_object(1, 0), CellValue::Int(7));

        filter.invalidate();
        assert_eq!(filter.row_count(), 2);
    }
}
