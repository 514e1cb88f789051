//! Group filter
//!
//! `GroupFilter` turns an upstream sorted on its group columns into a grouped
//! table: detail rows interleaved with group headers, per-level summary rows
//! and an optional grand total. The layout is built on first access and
//! rebuilt after the upstream changes.
//!
//! ```text
//! in place                       separate headers
//! header                         header
//! East  A  10   (level 0 start)  East            (group header, level 0)
//!       B  20                          A  10
//! East     30   (summary 0)            B  20
//! West  A   5                    East     30     (summary 0)
//! West      5                    ...
//!          35   (grand total)
//! ```
//!
//! Group-column cells are only filled where a group starts; every other row
//! reads `Null` there and consumers recover the value through
//! `base_row_index`.

use crate::changeset::{ChangeListener, ChangeListeners, TableChangeEvent};
use crate::descriptor::{
    MetaInfo, MetaInfoCache, MetaInfoSource, PathKind, TableDataDescriptor, TableDataPath,
};
use crate::error::{LensError, Result};
use crate::formula::{create_formula, raw_result, Formula, FormulaSpec, PercentageType};
use crate::grouped::{GroupedTable, Span, SpanCache};
use crate::table::{header_text, resolve_row_count, TableFilter, TableLens};
use crate::value::CellValue;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// A column summarized by a formula on every summary row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryColumn {
    pub col: usize,
    pub formula: FormulaSpec,
}

impl SummaryColumn {
    pub fn new(col: usize, formula: FormulaSpec) -> Self {
        SummaryColumn { col, formula }
    }
}

/// Layout options for a group filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupOptions {
    /// Show group values on the first detail row instead of separate header rows
    pub in_place_headers: bool,
    /// Levels that get summary rows; `None` summarizes every level
    pub summary_levels: Option<Vec<usize>>,
    pub grand_total: bool,
    /// Merge group cells down over their group
    pub merge_group_cells: bool,
}

impl Default for GroupOptions {
    fn default() -> Self {
        GroupOptions {
            in_place_headers: true,
            summary_levels: None,
            grand_total: true,
            merge_group_cells: true,
        }
    }
}

impl GroupOptions {
    fn summarizes(&self, level: usize) -> bool {
        self.summary_levels
            .as_ref()
            .map_or(true, |levels| levels.contains(&level))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Row {
    Header(usize),
    /// Separate header row for the group at `level` starting at upstream row `base`
    GroupHeader { level: usize, base: usize },
    /// `starts` is the outermost level whose group starts here (in-place mode)
    Detail { base: usize, starts: Option<usize> },
    /// `group` indexes the accumulation records of the layout build
    Summary { level: usize, group: usize, values: Vec<CellValue> },
    GrandTotal { values: Vec<CellValue> },
    Trailer(usize),
}

/// Accumulation state of one group while the layout is built
struct GroupRecord {
    level: usize,
    /// First upstream row of the group
    first: usize,
    parent: Option<usize>,
    formulas: Vec<Box<dyn Formula>>,
}

#[derive(Debug)]
struct Layout {
    rows: Vec<Row>,
}

pub struct GroupFilter {
    table: Arc<dyn TableLens>,
    group_cols: Vec<usize>,
    summaries: Vec<SummaryColumn>,
    prototypes: Vec<Box<dyn Formula>>,
    options: GroupOptions,
    layout: Mutex<Option<Arc<Layout>>>,
    spans: SpanCache,
    meta: MetaInfoCache,
    listeners: ChangeListeners,
}

impl GroupFilter {
    pub fn new(
        table: Arc<dyn TableLens>,
        group_cols: Vec<usize>,
        summaries: Vec<SummaryColumn>,
        options: GroupOptions,
    ) -> Result<Arc<Self>> {
        Self::with_meta_source(table, group_cols, summaries, options, None)
    }

    /// Like `new`, with format and drill-down lookups for the data paths
    pub fn with_meta_source(
        table: Arc<dyn TableLens>,
        group_cols: Vec<usize>,
        summaries: Vec<SummaryColumn>,
        options: GroupOptions,
        source: Option<Arc<dyn MetaInfoSource>>,
    ) -> Result<Arc<Self>> {
        let cols = table.col_count();
        for &col in &group_cols {
            if col >= cols {
                return Err(LensError::InvalidDefinition(format!(
                    "group column {} out of range for {} columns",
                    col, cols
                )));
            }
        }

        let mut prototypes = Vec::with_capacity(summaries.len());
        for summary in &summaries {
            if summary.col >= cols {
                return Err(LensError::IndexOutOfRange {
                    index: summary.col,
                    len: cols,
                });
            }
            let formula = create_formula(&summary.formula)?;
            if let Some(f2) = formula.as_formula2() {
                if let Some(&bad) = f2.secondary_columns().iter().find(|&&c| c >= cols) {
                    return Err(LensError::IndexOutOfRange {
                        index: bad,
                        len: cols,
                    });
                }
            }
            prototypes.push(formula);
        }

        Ok(Arc::new_cyclic(|weak: &Weak<Self>| {
            let listener: Weak<dyn ChangeListener> = weak.clone();
            table.add_change_listener(listener);
            GroupFilter {
                table,
                group_cols,
                summaries,
                prototypes,
                options,
                layout: Mutex::new(None),
                spans: SpanCache::new(),
                meta: MetaInfoCache::new(source),
                listeners: ChangeListeners::new(),
            }
        }))
    }

    pub fn group_cols(&self) -> &[usize] {
        &self.group_cols
    }

    pub fn options(&self) -> &GroupOptions {
        &self.options
    }

    /// Merged region of a group cell; `None` when the cell does not merge
    pub fn span(&self, row: usize, col: usize) -> Option<Span> {
        if !self.options.merge_group_cells {
            return None;
        }
        self.spans.span(self, row, col)
    }

    fn layout(&self) -> Arc<Layout> {
        let mut guard = self.layout.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(layout) = guard.as_ref() {
            return layout.clone();
        }
        let layout = Arc::new(self.build_layout());
        *guard = Some(layout.clone());
        layout
    }

    fn row(&self, row: usize) -> Option<Row> {
        self.layout().rows.get(row).cloned()
    }

    fn build_layout(&self) -> Layout {
        let table = self.table.as_ref();
        let count = resolve_row_count(table);
        let headers = table.header_row_count().min(count);
        let trailers = table.trailer_row_count().min(count - headers);
        let data_end = count - trailers;
        let depth = self.group_cols.len();

        let mut rows: Vec<Row> = (0..headers).map(Row::Header).collect();
        let mut records: Vec<GroupRecord> = Vec::new();
        // record index of the open group at each level
        let mut open: Vec<usize> = Vec::new();
        let mut grand = self.prototypes.clone();
        let mut previous: Option<Vec<CellValue>> = None;

        for base in headers..data_end {
            let key: Vec<CellValue> = self
                .group_cols
                .iter()
                .map(|&c| table.get_object(base, c))
                .collect();
            let split = match &previous {
                _ if depth == 0 => None,
                None => Some(0),
                Some(prev) => prev.iter().zip(&key).position(|(a, b)| a != b),
            };

            if let Some(level) = split {
                self.close_groups(level, &mut open, &records, &mut rows);
                for l in level..depth {
                    open.push(records.len());
                    records.push(GroupRecord {
                        level: l,
                        first: base,
                        parent: l.checked_sub(1).and_then(|p| open.get(p).copied()),
                        formulas: self.prototypes.clone(),
                    });
                    if !self.options.in_place_headers {
                        rows.push(Row::GroupHeader { level: l, base });
                    }
                }
            }
            let starts = if self.options.in_place_headers { split } else { None };
            rows.push(Row::Detail { base, starts });

            let inputs = self.summary_inputs(table, base);
            for &idx in &open {
                feed(&mut records[idx].formulas, &inputs);
            }
            feed(&mut grand, &inputs);
            previous = Some(key);
        }
        self.close_groups(0, &mut open, &records, &mut rows);

        let grand_raw: Vec<Option<f64>> = grand.iter().map(|f| raw_result(f.as_ref())).collect();
        for row in rows.iter_mut() {
            if let Row::Summary { level, group, values } = row {
                let record = &records[*group];
                let parent_raw: Vec<Option<f64>> = match record.parent {
                    Some(p) => records[p].formulas.iter().map(|f| raw_result(f.as_ref())).collect(),
                    None => grand_raw.clone(),
                };
                *values = self.summary_values(
                    Some((*level, record.first)),
                    &record.formulas,
                    &parent_raw,
                    &grand_raw,
                );
            }
        }

        if self.options.grand_total {
            let values = self.summary_values(None, &grand, &grand_raw, &grand_raw);
            rows.push(Row::GrandTotal { values });
        }
        rows.extend((data_end..count).map(Row::Trailer));

        log::debug!(
            "grouped {} upstream rows into {} rows ({} groups)",
            data_end - headers,
            rows.len(),
            records.len()
        );
        Layout { rows }
    }

    /// Close the open groups at `level` and deeper, innermost first
    fn close_groups(
        &self,
        level: usize,
        open: &mut Vec<usize>,
        records: &[GroupRecord],
        rows: &mut Vec<Row>,
    ) {
        while open.len() > level {
            let Some(idx) = open.pop() else { break };
            let record_level = records[idx].level;
            if self.options.summarizes(record_level) {
                rows.push(Row::Summary {
                    level: record_level,
                    group: idx,
                    values: Vec::new(),
                });
            }
        }
    }

    /// Values each summary formula folds for one upstream row
    fn summary_inputs(&self, table: &dyn TableLens, base: usize) -> Vec<Vec<CellValue>> {
        self.summaries
            .iter()
            .zip(&self.prototypes)
            .map(|(summary, proto)| {
                let mut values = vec![table.get_object(base, summary.col)];
                if let Some(f2) = proto.as_formula2() {
                    values.extend(f2.secondary_columns().iter().map(|&c| table.get_object(base, c)));
                }
                values
            })
            .collect()
    }

    /// Cells of a summary row. `label` is (level, first upstream row) for group
    /// summaries and `None` for the grand total.
    fn summary_values(
        &self,
        label: Option<(usize, usize)>,
        formulas: &[Box<dyn Formula>],
        parent_raw: &[Option<f64>],
        grand_raw: &[Option<f64>],
    ) -> Vec<CellValue> {
        let mut values = vec![CellValue::Null; self.table.col_count()];
        if let Some((level, first)) = label {
            for &col in self.group_cols.iter().take(level + 1) {
                values[col] = self.table.get_object(first, col);
            }
        }

        for (i, (summary, formula)) in self.summaries.iter().zip(formulas).enumerate() {
            let mut formula = formula.clone();
            if let Some(pct) = formula.as_percentage_mut() {
                let total = match pct.percentage_type() {
                    PercentageType::None => None,
                    PercentageType::Group => parent_raw.get(i).copied().flatten(),
                    PercentageType::GrandTotal => grand_raw.get(i).copied().flatten(),
                };
                if let Some(total) = total {
                    pct.set_total(total);
                }
            }
            values[summary.col] = formula.result().unwrap_or_default();
        }
        values
    }

    fn reset(&self) {
        *self.layout.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.spans.clear();
        self.meta.clear();
    }

    fn col_name(&self, col: usize) -> String {
        header_text(self, col).unwrap_or_else(|| format!("Column [{}]", col))
    }
}

fn feed(formulas: &mut [Box<dyn Formula>], inputs: &[Vec<CellValue>]) {
    for (formula, values) in formulas.iter_mut().zip(inputs) {
        formula.add_pair(values);
    }
}

impl TableLens for GroupFilter {
    fn row_count(&self) -> i64 {
        self.layout().rows.len() as i64
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
        row < self.layout().rows.len()
    }

    fn get_object(&self, row: usize, col: usize) -> CellValue {
        let Some(kind) = self.row(row) else {
            return CellValue::Null;
        };
        match kind {
            Row::Header(base) | Row::Trailer(base) => self.table.get_object(base, col),
            Row::GroupHeader { level, base } => {
                if self.group_col_level(col) == Some(level) {
                    self.table.get_object(base, col)
                } else {
                    CellValue::Null
                }
            }
            Row::Detail { base, .. } => {
                if self.is_group_column(col) && !self.is_group_header_cell(row, col) {
                    CellValue::Null
                } else {
                    self.table.get_object(base, col)
                }
            }
            Row::Summary { values, .. } | Row::GrandTotal { values } => {
                values.get(col).cloned().unwrap_or_default()
            }
        }
    }

    fn set_object(&self, row: usize, col: usize, value: CellValue) {
        if let Some(Row::Header(base) | Row::Detail { base, .. } | Row::Trailer(base)) = self.row(row) {
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

    fn as_grouped(&self) -> Option<&dyn GroupedTable> {
        Some(self)
    }

    fn as_descriptor(&self) -> Option<&dyn TableDataDescriptor> {
        Some(self)
    }
}

impl TableFilter for GroupFilter {
    fn table(&self) -> &Arc<dyn TableLens> {
        &self.table
    }

    fn base_row_index(&self, row: usize) -> Option<usize> {
        match self.row(row)? {
            Row::Header(base) | Row::Trailer(base) => Some(base),
            Row::GroupHeader { base, .. } | Row::Detail { base, .. } => Some(base),
            Row::Summary { .. } | Row::GrandTotal { .. } => None,
        }
    }

    fn base_col_index(&self, col: usize) -> Option<usize> {
        (col < self.table.col_count()).then_some(col)
    }
}

impl GroupedTable for GroupFilter {
    fn group_col_count(&self) -> usize {
        self.group_cols.len()
    }

    fn is_group_column(&self, col: usize) -> bool {
        self.group_cols.contains(&col)
    }

    fn group_col_level(&self, col: usize) -> Option<usize> {
        self.group_cols.iter().position(|&c| c == col)
    }

    fn group_level(&self, row: usize) -> Option<usize> {
        match self.row(row)? {
            Row::GroupHeader { level, .. } => Some(level),
            Row::Detail { starts, .. } => starts,
            _ => None,
        }
    }

    fn summary_level(&self, row: usize) -> Option<usize> {
        match self.row(row)? {
            Row::Summary { level, .. } => Some(level),
            _ => None,
        }
    }

    fn has_grand_summary(&self) -> bool {
        self.options.grand_total
    }

    fn is_group_header_cell(&self, row: usize, col: usize) -> bool {
        let Some(col_level) = self.group_col_level(col) else {
            return false;
        };
        match self.row(row) {
            Some(Row::GroupHeader { level, .. }) => col_level == level,
            Some(Row::Detail { starts: Some(start), .. }) => col_level >= start,
            _ => false,
        }
    }
}

impl TableDataDescriptor for GroupFilter {
    fn cell_data_path(&self, row: usize, col: usize) -> TableDataPath {
        if col >= self.col_count() {
            return TableDataPath::invalid();
        }
        let row_path = self.row_data_path(row);
        if row_path.is_invalid() {
            return row_path;
        }
        let mut path = TableDataPath::new(row_path.kind, vec![self.col_name(col)]);
        path.level = row_path.level;
        if row_path.kind == PathKind::Detail && self.is_group_header_cell(row, col) {
            path.kind = PathKind::GroupHeader;
            path.level = self.group_col_level(col);
        }
        path
    }

    fn row_data_path(&self, row: usize) -> TableDataPath {
        let Some(kind) = self.row(row) else {
            return TableDataPath::invalid();
        };
        match kind {
            Row::Header(_) => TableDataPath::new(PathKind::Header, Vec::new()),
            Row::GroupHeader { level, .. } => {
                TableDataPath::new(PathKind::GroupHeader, Vec::new()).with_level(level)
            }
            Row::Detail { .. } => TableDataPath::new(PathKind::Detail, Vec::new()),
            Row::Summary { level, .. } => {
                TableDataPath::new(PathKind::Summary, Vec::new()).with_level(level)
            }
            Row::GrandTotal { .. } => TableDataPath::new(PathKind::GrandTotal, Vec::new()),
            Row::Trailer(_) => TableDataPath::new(PathKind::Trailer, Vec::new()),
        }
    }

    fn col_data_path(&self, col: usize) -> TableDataPath {
        if col >= self.col_count() {
            return TableDataPath::invalid();
        }
        let name = vec![self.col_name(col)];
        match self.group_col_level(col) {
            Some(level) => TableDataPath::new(PathKind::GroupHeader, name).with_level(level),
            None => TableDataPath::new(PathKind::Detail, name),
        }
    }

    fn meta_info(&self, path: &TableDataPath) -> Option<MetaInfo> {
        self.meta.get(path)
    }
}

impl ChangeListener for GroupFilter {
    fn table_changed(&self, _event: &TableChangeEvent) {
        self.invalidate();
    }
}

impl std::fmt::Debug for GroupFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupFilter")
            .field("group_cols", &self.group_cols)
            .field("summaries", &self.summaries)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorted::{SortFilter, SortKey};
    use crate::table::test_support::{row_values, table};
    use crate::table::MemoryTable;

    fn sales() -> Arc<dyn TableLens> {
        table(vec![
            vec!["region".into(), "product".into(), "amount".into()],
            vec!["East".into(), "A".into(), 10.into()],
            vec!["East".into(), "A".into(), 15.into()],
            vec!["East".into(), "B".into(), 20.into()],
            vec!["West".into(), "A".into(), 5.into()],
        ])
    }

    fn sum_of(col: usize) -> SummaryColumn {
        SummaryColumn::new(col, FormulaSpec::new("Sum"))
    }

    #[test]
    fn test_in_place_layout() {
        let grouped =
            GroupFilter::new(sales(), vec![0], vec![sum_of(2)], GroupOptions::default()).unwrap();

        // header, 3 East details, East summary, West detail, West summary, grand
        assert_eq!(grouped.row_count(), 8);
        assert_eq!(grouped.get_object(1, 0), CellValue::from("East"));
        assert!(grouped.get_object(2, 0).is_null());
        assert_eq!(grouped.get_object(2, 1), CellValue::from("A"));
        assert_eq!(
            row_values(&*grouped, 4),
            vec!["East".into(), CellValue::Null, CellValue::Double(45.0)]
        );
        assert_eq!(grouped.get_object(5, 0), CellValue::from("West"));
        assert_eq!(grouped.get_object(7, 2), CellValue::Double(50.0));
        assert!(grouped.get_object(7, 0).is_null());

        assert_eq!(grouped.group_level(1), Some(0));
        assert_eq!(grouped.group_level(2), None);
        assert_eq!(grouped.summary_level(4), Some(0));
        assert_eq!(grouped.base_row_index(3), Some(3));
        assert_eq!(grouped.base_row_index(4), None);
        assert_eq!(grouped.base_row_index(7), None);
    }

    #[test]
    fn test_navigation_and_spans() {
        let grouped =
            GroupFilter::new(sales(), vec![0], vec![sum_of(2)], GroupOptions::default()).unwrap();
        assert_eq!(grouped.group_row_range(), Some((1, 6)));
        assert_eq!(grouped.group_first_row(3, 0), Some(1));
        assert_eq!(grouped.group_last_row(2, 0), Some(4));
        assert_eq!(grouped.group_first_row(6, 0), Some(5));
        assert_eq!(grouped.span(1, 0), Some(Span { width: 1, height: 4 }));
        assert_eq!(grouped.span(5, 0), Some(Span { width: 1, height: 2 }));
        assert_eq!(grouped.span(2, 0), None);
        assert_eq!(grouped.span(1, 2), None);

        let flat = GroupFilter::new(
            sales(),
            vec![0],
            vec![],
            GroupOptions {
                merge_group_cells: false,
                ..GroupOptions::default()
            },
        )
        .unwrap();
        assert_eq!(flat.span(1, 0), None);
    }

    #[test]
    fn test_separate_headers_two_levels() {
        let options = GroupOptions {
            in_place_headers: false,
            summary_levels: Some(vec![0]),
            grand_total: false,
            merge_group_cells: true,
        };
        let count = SummaryColumn::new(2, FormulaSpec::new("Count"));
        let grouped = GroupFilter::new(sales(), vec![0, 1], vec![count], options).unwrap();

        // H, G0 East, G1 A, D, D, G1 B, D, S0 East, G0 West, G1 A, D, S0 West
        assert_eq!(grouped.row_count(), 12);
        assert_eq!(grouped.group_level(1), Some(0));
        assert_eq!(grouped.group_level(2), Some(1));
        assert_eq!(grouped.get_object(1, 0), CellValue::from("East"));
        assert!(grouped.get_object(1, 1).is_null());
        assert_eq!(grouped.get_object(5, 1), CellValue::from("B"));
        assert!(grouped.get_object(3, 0).is_null());
        assert_eq!(grouped.get_object(3, 2), CellValue::Int(10));
        assert_eq!(
            row_values(&*grouped, 7),
            vec!["East".into(), CellValue::Null, CellValue::Int(3)]
        );
        assert_eq!(grouped.get_object(11, 2), CellValue::Int(1));
        assert!(!grouped.has_grand_summary());

        assert_eq!(grouped.group_first_row(6, 0), Some(1));
        assert_eq!(grouped.group_last_row(6, 0), Some(7));
        assert_eq!(grouped.group_first_row(6, 1), Some(5));
        assert_eq!(grouped.base_row_index(5), Some(3));
    }

    #[test]
    fn test_percentage_of_parent_and_grand_total() {
        let pct_grand = SummaryColumn::new(
            2,
            FormulaSpec::new("Sum").with_percentage(PercentageType::GrandTotal),
        );
        let grouped =
            GroupFilter::new(sales(), vec![0], vec![pct_grand], GroupOptions::default()).unwrap();
        assert_eq!(grouped.get_double(4, 2), Some(0.9));
        assert_eq!(grouped.get_double(6, 2), Some(0.1));
        assert_eq!(grouped.get_double(7, 2), Some(1.0));

        let pct_group = SummaryColumn::new(
            2,
            FormulaSpec::new("Sum").with_percentage(PercentageType::Group),
        );
        let nested =
            GroupFilter::new(sales(), vec![0, 1], vec![pct_group], GroupOptions::default())
                .unwrap();
        // East/A (25) of East (45)
        let east_a = (0..nested.row_count() as usize)
            .find(|&r| nested.summary_level(r) == Some(1))
            .unwrap();
        let share = nested.get_double(east_a, 2).unwrap();
        assert!((share - 25.0 / 45.0).abs() < 1e-12);
    }

    #[test]
    fn test_groups_sorted_upstream() {
        let unsorted = table(vec![
            vec!["team".into(), "points".into()],
            vec!["red".into(), 3.into()],
            vec!["blue".into(), 4.into()],
            vec!["red".into(), 5.into()],
        ]);
        let sorted = SortFilter::new(unsorted, vec![SortKey::ascending(0)]);
        let grouped = GroupFilter::new(
            sorted,
            vec![0],
            vec![SummaryColumn::new(1, FormulaSpec::new("Average"))],
            GroupOptions::default(),
        )
        .unwrap();

        assert_eq!(grouped.get_object(1, 0), CellValue::from("blue"));
        assert_eq!(grouped.get_object(2, 1), CellValue::Double(4.0));
        assert_eq!(grouped.get_object(3, 0), CellValue::from("red"));
        assert_eq!(grouped.get_object(5, 1), CellValue::Double(4.0));
        assert_eq!(grouped.get_object(6, 1), CellValue::Double(4.0));
    }

    #[test]
    fn test_upstream_change_rebuilds_layout() {
        let base = Arc::new(MemoryTable::new(vec![
            vec!["k".into(), "v".into()],
            vec!["a".into(), 1.into()],
            vec!["a".into(), 2.into()],
        ]));
        let lens: Arc<dyn TableLens> = base.clone();
        let grouped =
            GroupFilter::new(lens, vec![0], vec![sum_of(1)], GroupOptions::default()).unwrap();
        assert_eq!(grouped.get_object(3, 1), CellValue::Double(3.0));

        base.set_object(2, 1, CellValue::Int(10));
        assert_eq!(grouped.get_object(3, 1), CellValue::Double(11.0));
    }

    #[test]
    fn test_data_paths() {
        let grouped =
            GroupFilter::new(sales(), vec![0], vec![sum_of(2)], GroupOptions::default()).unwrap();
        let desc = grouped.as_descriptor().unwrap();

        assert_eq!(desc.row_data_path(0).kind, PathKind::Header);
        assert_eq!(
            desc.cell_data_path(1, 0),
            TableDataPath::new(PathKind::GroupHeader, vec!["region".into()]).with_level(0)
        );
        assert_eq!(desc.cell_data_path(1, 2).kind, PathKind::Detail);
        assert_eq!(
            desc.cell_data_path(4, 2),
            TableDataPath::new(PathKind::Summary, vec!["amount".into()]).with_level(0)
        );
        assert_eq!(desc.cell_data_path(7, 2).kind, PathKind::GrandTotal);
        assert!(desc.cell_data_path(8, 0).is_invalid());
        assert_eq!(desc.col_data_path(0).level, Some(0));
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(matches!(
            GroupFilter::new(sales(), vec![5], vec![], GroupOptions::default()),
            Err(LensError::InvalidDefinition(_))
        ));
        assert!(matches!(
            GroupFilter::new(
                sales(),
                vec![0],
                vec![SummaryColumn::new(2, FormulaSpec::new("Geomean"))],
                GroupOptions::default()
            ),
            Err(LensError::UnknownFormula(_))
        ));
        assert!(matches!(
            GroupFilter::new(
                sales(),
                vec![0],
                vec![SummaryColumn::new(2, FormulaSpec::new("First").with_secondary(9))],
                GroupOptions::default()
            ),
            Err(LensError::IndexOutOfRange { index: 9, len: 3 })
        ));
    }

    #[test]
    fn test_options_from_json() {
        let options: GroupOptions =
            serde_json::from_str(r#"{"in_place_headers": false, "summary_levels": [1]}"#).unwrap();
        assert!(!options.in_place_headers);
        assert!(options.grand_total);
        assert!(options.summarizes(1));
        assert!(!options.summarizes(0));
    }
}
