//! Incremental condition filter
//!
//! `ConditionFilter` scans its upstream lazily, one row at a time, and keeps
//! the upstream rows its predicate accepts in an append-only `RowMap`.
//!
//! # Scan lifecycle
//!
//! ```text
//! Uninitialized --first access--> Scanning --upstream ends--> Complete
//!       ^                            |
//!       +-------- invalidate --------+
//! ```
//!
//! - While scanning, `row_count()` is `-(accepted) - 1`; once complete it is the
//!   exact accepted count and never changes until the next invalidate.
//! - The scan cursor sits behind its own lock, so overlapping `more_rows` calls
//!   never scan the same upstream row twice. Readers of already accepted rows
//!   only take the row map's read lock and are never held up by a scan.
//! - `cancel()` stops the scan at the next row boundary without rolling back
//!   accepted rows. A completed filter ignores it.
//!
//! Header rows map onto themselves and never block. Upstream trailer rows are
//! scanned like any other row; the filter has no trailer rows of its own.

use crate::changeset::{ChangeListener, ChangeListeners, TableChangeEvent};
use crate::rowmap::RowMap;
use crate::table::{encode_row_count, CancellableTable, TableFilter, TableLens};
use crate::value::CellValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

/// Decides whether an upstream row is kept.
pub trait RowPredicate: Send + Sync {
    fn accept(&self, table: &dyn TableLens, row: usize) -> bool;
}

impl<F> RowPredicate for F
where
    F: Fn(&dyn TableLens, usize) -> bool + Send + Sync,
{
    fn accept(&self, table: &dyn TableLens, row: usize) -> bool {
        self(table, row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanPhase {
    Uninitialized,
    Scanning,
    Complete,
}

#[derive(Debug)]
struct ScanState {
    /// Next upstream row to test
    cursor: usize,
    phase: ScanPhase,
}

pub struct ConditionFilter {
    table: Arc<dyn TableLens>,
    predicate: Arc<dyn RowPredicate>,
    scan: Mutex<ScanState>,
    rowmap: RwLock<RowMap>,
    initialized: AtomicBool,
    complete: AtomicBool,
    cancelled: AtomicBool,
    listeners: ChangeListeners,
}

impl ConditionFilter {
    pub fn new(table: Arc<dyn TableLens>, predicate: Arc<dyn RowPredicate>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let listener: Weak<dyn ChangeListener> = weak.clone();
            table.add_change_listener(listener);
            ConditionFilter {
                table,
                predicate,
                scan: Mutex::new(ScanState {
                    cursor: 0,
                    phase: ScanPhase::Uninitialized,
                }),
                rowmap: RwLock::new(RowMap::new()),
                initialized: AtomicBool::new(false),
                complete: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                listeners: ChangeListeners::new(),
            }
        })
    }

    /// Filter with a closure predicate
    pub fn with_fn<F>(table: Arc<dyn TableLens>, predicate: F) -> Arc<Self>
    where
        F: Fn(&dyn TableLens, usize) -> bool + Send + Sync + 'static,
    {
        Self::new(table, Arc::new(predicate))
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Snapshot of the accepted upstream rows, header rows included
    pub fn accepted_rows(&self) -> Vec<usize> {
        self.ensure_init();
        self.read_map().iter().collect()
    }

    fn lock_scan(&self) -> MutexGuard<'_, ScanState> {
        self.scan.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, RowMap> {
        self.rowmap.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, RowMap> {
        self.rowmap.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn known_rows(&self) -> usize {
        self.read_map().len()
    }

    fn ensure_init(&self) {
        if !self.initialized.load(Ordering::Acquire) {
            let mut scan = self.lock_scan();
            self.check_init(&mut scan);
        }
    }

    /// Reset the row map to the header rows and park the cursor after them.
    fn check_init(&self, scan: &mut ScanState) {
        if scan.phase != ScanPhase::Uninitialized {
            return;
        }

        let headers = self.table.header_row_count();
        self.write_map().truncate_to_headers(headers);
        scan.cursor = headers;
        scan.phase = ScanPhase::Scanning;
        self.complete.store(false, Ordering::Release);
        self.initialized.store(true, Ordering::Release);
        log::debug!("condition filter scan started after {} header rows", headers);
    }

    /// Advance the scan until `row` is accepted, upstream ends or cancel is seen.
    fn scan_to(&self, row: usize) {
        let mut scan = self.lock_scan();
        self.check_init(&mut scan);

        while scan.phase == ScanPhase::Scanning && self.known_rows() <= row {
            if self.cancelled.load(Ordering::Acquire) {
                log::debug!("condition filter scan cancelled at upstream row {}", scan.cursor);
                break;
            }

            let cursor = scan.cursor;
            if !self.table.more_rows(cursor) {
                self.write_map().seal();
                scan.phase = ScanPhase::Complete;
                self.complete.store(true, Ordering::Release);
                log::debug!(
                    "condition filter scan complete: {} rows accepted",
                    self.known_rows()
                );
                break;
            }

            if self.predicate.accept(self.table.as_ref(), cursor) {
                log::trace!("accepted upstream row {}", cursor);
                self.write_map().push(cursor);
            }
            scan.cursor += 1;
        }
    }

    fn reset(&self) {
        let mut scan = self.lock_scan();
        scan.phase = ScanPhase::Uninitialized;
        scan.cursor = 0;
        self.initialized.store(false, Ordering::Release);
        self.complete.store(false, Ordering::Release);
        self.cancelled.store(false, Ordering::Release);
        self.write_map().truncate_to_headers(0);
    }
}

impl TableLens for ConditionFilter {
    fn row_count(&self) -> i64 {
        self.ensure_init();
        encode_row_count(self.known_rows(), self.is_complete())
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
        0
    }

    fn trailer_col_count(&self) -> usize {
        self.table.trailer_col_count()
    }

    fn more_rows(&self, row: usize) -> bool {
        self.ensure_init();
        if row < self.known_rows() {
            return true;
        }
        if self.is_complete() {
            return false;
        }
        self.scan_to(row);
        row < self.known_rows()
    }

    fn get_object(&self, row: usize, col: usize) -> CellValue {
        match self.base_row_index(row) {
            Some(base) => self.table.get_object(base, col),
            None => CellValue::Null,
        }
    }

    fn is_null(&self, row: usize, col: usize) -> bool {
        match self.base_row_index(row) {
            Some(base) => self.table.is_null(base, col),
            None => true,
        }
    }

    fn get_double(&self, row: usize, col: usize) -> Option<f64> {
        self.base_row_index(row)
            .and_then(|base| self.table.get_double(base, col))
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
        log::debug!("condition filter invalidated");
        self.listeners.fire(TableChangeEvent::invalidated());
    }

    fn dispose(&self) {
        self.cancel();
        self.table.dispose();
    }

    fn add_change_listener(&self, listener: Weak<dyn ChangeListener>) {
        self.listeners.add(listener);
    }

    fn as_filter(&self) -> Option<&dyn TableFilter> {
        Some(self)
    }

    fn as_cancellable(&self) -> Option<&dyn CancellableTable> {
        Some(self)
    }
}

impl TableFilter for ConditionFilter {
    fn table(&self) -> &Arc<dyn TableLens> {
        &self.table
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        if !self.more_rows(row) {
            return None;
        }
        self.read_map().get(row)
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        (col < self.table.col_count()).then_some(col)
    }
}

impl CancellableTable for ConditionFilter {
    fn cancel(&self) {
        if self.is_complete() {
            return;
        }
        self.cancelled.store(true, Ordering::Release);
        if let Some(upstream) = self.table.as_cancellable() {
            upstream.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl ChangeListener for ConditionFilter {
    fn table_changed(&self, _event: &TableChangeEvent) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{decode_row_count, MemoryTable};
    use std::thread;
    use std::time::Duration;

    fn numbers(n: i64) -> Arc<dyn TableLens> {
        let mut rows = vec![vec![CellValue::from("n")]];
        rows.extend((0..n).map(|i| vec![CellValue::Int(i)]));
        Arc::new(MemoryTable::new(rows))
    }

    fn even(table: &dyn TableLens, row: usize) -> bool {
        table.get_object(row, 0).as_i64().is_some_and(|v| v % 2 == 0)
    }

    #[test]
    fn test_filters_rows() {
        let filter = ConditionFilter::with_fn(numbers(10), even);
        assert_eq!(filter.get_object(0, 0), CellValue::from("n"));
        assert_eq!(filter.get_object(1, 0), CellValue::Int(0));
        assert_eq!(filter.get_object(3, 0), CellValue::Int(4));
        assert_eq!(filter.base_row_index(3), Some(5));
        assert!(filter.more_rows(5));
        assert!(!filter.more_rows(6));
        assert_eq!(filter.row_count(), 6);
        assert!(filter.is_complete());
        assert!(filter.get_object(6, 0).is_null());
    }

    #[test]
    fn test_header_rows_do_not_scan() {
        let filter = ConditionFilter::with_fn(numbers(10), even);
        assert!(filter.more_rows(0));
        assert_eq!(filter.row_count(), -2);
        assert_eq!(filter.accepted_rows(), vec![0]);
    }

    #[test]
    fn test_monotonic_scan() {
        let filter = ConditionFilter::with_fn(numbers(50), |t: &dyn TableLens, r: usize| {
            t.get_object(r, 0).as_i64().is_some_and(|v| v % 3 != 0)
        });

        let mut last_known = 0;
        for k in 0..60 {
            filter.more_rows(k);
            let (known, _) = decode_row_count(filter.row_count());
            assert!(known >= last_known);
            last_known = known;
        }

        let accepted = filter.accepted_rows();
        assert!(accepted.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_row_count_sentinel() {
        let filter = ConditionFilter::with_fn(numbers(20), even);
        filter.more_rows(3);
        let count = filter.row_count();
        assert!(count < 0);
        assert_eq!((-count - 1) as usize, filter.accepted_rows().len());

        filter.more_rows(1000);
        assert_eq!(filter.row_count(), 11);
        filter.more_rows(2000);
        assert_eq!(filter.row_count(), 11);
    }

    #[test]
    fn test_streaming_upstream_across_threads() {
        let base = Arc::new(MemoryTable::streaming(vec!["n".into()]));
        let lens: Arc<dyn TableLens> = base.clone();
        let filter = ConditionFilter::with_fn(lens, even);

        let producer = {
            let base = base.clone();
            thread::spawn(move || {
                for i in 0..40 {
                    base.append_row(vec![CellValue::Int(i)]);
                    if i % 10 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
                base.finish();
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let filter = filter.clone();
                thread::spawn(move || {
                    let mut last = 0;
                    for k in 0..25 {
                        filter.more_rows(k);
                        let (known, _) = decode_row_count(filter.row_count());
                        assert!(known >= last);
                        last = known;
                    }
                })
            })
            .collect();

        producer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }

        assert!(!filter.more_rows(21));
        assert_eq!(filter.row_count(), 21);
        let accepted = filter.accepted_rows();
        assert_eq!(accepted.len(), 21);
        assert!(accepted.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_cancel_stops_scan() {
        let base = Arc::new(MemoryTable::streaming(vec!["n".into()]));
        for i in 0..3 {
            base.append_row(vec![CellValue::Int(i)]);
        }
        let lens: Arc<dyn TableLens> = base.clone();
        let filter = ConditionFilter::with_fn(lens, |_: &dyn TableLens, _: usize| true);

        let consumer = {
            let filter = filter.clone();
            thread::spawn(move || filter.more_rows(100))
        };

        thread::sleep(Duration::from_millis(20));
        filter.cancel();
        // wake the blocked upstream read
        base.append_row(vec![CellValue::Int(3)]);

        assert!(!consumer.join().unwrap());
        assert!(filter.is_cancelled());
        assert!(!filter.is_complete());
        assert!(filter.row_count() < 0);
        base.finish();
    }

    #[test]
    fn test_cancel_ignored_once_complete() {
        let filter = ConditionFilter::with_fn(numbers(4), even);
        filter.more_rows(100);
        filter.cancel();
        assert!(!filter.is_cancelled());
        assert_eq!(filter.row_count(), 3);
    }

    #[test]
    fn test_cancel_propagates_upstream() {
        let inner = ConditionFilter::with_fn(numbers(100), even);
        let outer = ConditionFilter::with_fn(inner.clone(), |_: &dyn TableLens, _: usize| true);
        outer.more_rows(2);
        outer.cancel();
        assert!(outer.is_cancelled());
        assert!(inner.is_cancelled());
    }

    #[test]
    fn test_invalidate_rescans() {
        let base = Arc::new(MemoryTable::new(vec![
            vec!["n".into()],
            vec![1.into()],
            vec![2.into()],
        ]));
        let lens: Arc<dyn TableLens> = base.clone();
        let filter = ConditionFilter::with_fn(lens, even);
        assert_eq!(filter.row_count(), -2);
        filter.more_rows(10);
        assert_eq!(filter.row_count(), 2);

        // upstream change triggers a rescan
        base.set_object(1, 0, CellValue::Int(4));
        assert!(!filter.is_complete());
        filter.more_rows(10);
        assert_eq!(filter.row_count(), 3);
        assert_eq!(filter.get_object(1, 0), CellValue::Int(4));
    }
}
