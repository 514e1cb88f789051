//! Grouped table navigation
//!
//! A grouped table interleaves data rows with group-header rows and summary
//! rows, each tagged with a nesting level (0 = outermost group column).
//! Implementors classify rows; the boundary queries and span merging are
//! derived from that classification alone:
//! - `group_first_row` scans backward to the start of the group at a level
//! - `group_last_row` scans forward to the end of the group at a level
//! - `SpanCache` merges a group cell down over the rows of its group

use crate::cache::CacheMap;
use crate::table::{decode_row_count, TableLens};

/// Row and column classification of a grouped lens.
pub trait GroupedTable: TableLens {
    /// Number of group columns (nesting depth)
    fn group_col_count(&self) -> usize;

    fn is_group_column(&self, col: usize) -> bool;

    /// Nesting level of a group column
    fn group_col_level(&self, col: usize) -> Option<usize>;

    /// Outermost level whose group starts at `row`, if `row` is a group header
    fn group_level(&self, row: usize) -> Option<usize>;

    /// Level summarized by `row`, if `row` is a summary row
    fn summary_level(&self, row: usize) -> Option<usize>;

    /// True if the last data row is a grand total
    fn has_grand_summary(&self) -> bool;

    /// True if the cell shows the value of a group column for its group
    fn is_group_header_cell(&self, row: usize, col: usize) -> bool;

    fn is_group_header_row(&self, row: usize) -> bool {
        self.group_level(row).is_some()
    }

    fn is_summary_row(&self, row: usize) -> bool {
        self.summary_level(row).is_some()
    }

    /// Levels whose groups start (group header) or end (summary) at `row`
    fn group_levels_at(&self, row: usize) -> Vec<usize> {
        if let Some(level) = self.group_level(row) {
            (level..self.group_col_count()).collect()
        } else if let Some(level) = self.summary_level(row) {
            vec![level]
        } else {
            Vec::new()
        }
    }

    /// Inclusive range of rows that may belong to a group.
    ///
    /// Excludes header rows, trailer rows and the grand-total row.
    fn group_row_range(&self) -> Option<(usize, usize)> {
        loop {
            let (known, complete) = decode_row_count(self.row_count());
            if complete || !self.more_rows(known) {
                break;
            }
        }

        let count = decode_row_count(self.row_count()).0;
        let start = self.header_row_count();
        let mut end = count.saturating_sub(self.trailer_row_count());
        if self.has_grand_summary() {
            end = end.saturating_sub(1);
        }
        (end > start).then(|| (start, end - 1))
    }

    /// First row of the group at `level` that contains `row`
    fn group_first_row(&self, row: usize, level: usize) -> Option<usize> {
        let (start, end) = self.group_row_range()?;
        if row < start || row > end {
            return None;
        }

        let mut r = row;
        loop {
            if self.group_level(r).is_some_and(|g| g <= level) {
                return Some(r);
            }
            if r == start {
                return Some(r);
            }
            // a shallower summary above closes the previous group
            if self.summary_level(r - 1).is_some_and(|s| s <= level) {
                return Some(r);
            }
            r -= 1;
        }
    }

    /// Last row of the group at `level` that contains `row`
    fn group_last_row(&self, row: usize, level: usize) -> Option<usize> {
        let (start, end) = self.group_row_range()?;
        if row < start || row > end {
            return None;
        }

        for r in row..=end {
            if self.summary_level(r) == Some(level) {
                return Some(r);
            }
            if r > row && self.group_level(r).is_some_and(|g| g <= level) {
                return Some(r - 1);
            }
        }
        Some(end)
    }
}

/// Merged-cell region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub width: usize,
    pub height: usize,
}

/// Cache of group-cell spans keyed by (col, row).
///
/// Cleared wholesale when the owning table invalidates.
#[derive(Debug, Default)]
pub struct SpanCache {
    spans: CacheMap<(usize, usize), Span>,
}

impl SpanCache {
    pub fn new() -> Self {
        SpanCache {
            spans: CacheMap::new(),
        }
    }

    /// Span of the group cell at (row, col), or `None` if the cell does not merge.
    pub fn span<T: GroupedTable + ?Sized>(&self, table: &T, row: usize, col: usize) -> Option<Span> {
        self.spans
            .get_or_compute((col, row), || Self::compute(table, row, col))
    }

    fn compute<T: GroupedTable + ?Sized>(table: &T, row: usize, col: usize) -> Option<Span> {
        if !table.is_group_header_cell(row, col) {
            return None;
        }
        let level = table.group_col_level(col)?;
        // the merged cell covers the group down to its closing summary row
        let last = table.group_last_row(row, level)?;
        let height = last.checked_sub(row)? + 1;

        log::trace!("span at ({}, {}) = {}", row, col, height);
        Some(Span { width: 1, height })
    }

    pub fn clear(&self) {
        self.spans.clear();
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}
