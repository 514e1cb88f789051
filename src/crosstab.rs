//! Crosstab (pivot) tables
//!
//! A `CrossTabFilter` aggregates its upstream over row dimensions and column
//! dimensions. Each axis is addressed by `Tuple`s of dimension values,
//! outermost first; a shorter tuple is a subtotal of the tuples it prefixes
//! and the empty tuple is the axis grand total. One data cell is addressed by
//! a `Pair` of row tuple, column tuple and aggregate index.
//!
//! ```text
//!              quarter                       header rows: one per column dimension
//! region       Q1     Q2     Grand Total     (+ one for aggregate names side by side)
//! East         15     20     35
//! West          7            7               absent pair reads Null
//! Grand Total  22     20     42
//! ```
//!
//! With several aggregates the aggregates either sit side by side under each
//! column tuple or are stacked beside each row tuple.

use crate::changeset::{ChangeListener, ChangeListeners, TableChangeEvent};
use crate::descriptor::{PathKind, TableDataDescriptor, TableDataPath};
use crate::error::{LensError, Result};
use crate::formula::{create_formula, raw_result, Formula, FormulaSpec, PercentageType};
use crate::table::{header_text, resolve_row_count, TableFilter, TableLens};
use crate::value::CellValue;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

pub const TOTAL_LABEL: &str = "Total";
pub const GRAND_TOTAL_LABEL: &str = "Grand Total";

/// Dimension values along one crosstab axis, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tuple(pub SmallVec<[CellValue; 4]>);

impl Tuple {
    pub fn new(values: impl IntoIterator<Item = CellValue>) -> Self {
        Tuple(values.into_iter().collect())
    }

    /// The grand-total tuple of an axis
    pub fn grand() -> Self {
        Tuple(SmallVec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_grand(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[CellValue] {
        &self.0
    }

    pub fn get(&self, level: usize) -> Option<&CellValue> {
        self.0.get(level)
    }

    /// The first `len` values
    pub fn prefix(&self, len: usize) -> Tuple {
        Tuple(self.0.iter().take(len).cloned().collect())
    }

    pub fn is_prefix_of(&self, other: &Tuple) -> bool {
        self.len() <= other.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// Layout order: values compare level by level, and a tuple sorts after
    /// every tuple it prefixes, so subtotals follow their details and the grand
    /// tuple comes last.
    pub fn compare(&self, other: &Tuple) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.compare(b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        other.len().cmp(&self.len())
    }
}

/// Key of one crosstab data cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub row: Tuple,
    pub col: Tuple,
    pub aggregate: usize,
}

impl Pair {
    pub fn new(row: Tuple, col: Tuple, aggregate: usize) -> Self {
        Pair {
            row,
            col,
            aggregate,
        }
    }
}

/// An aggregated column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossTabAggregate {
    pub col: usize,
    pub formula: FormulaSpec,
    /// Header text; defaults to `Formula(column)`
    #[serde(default)]
    pub header: Option<String>,
}

impl CrossTabAggregate {
    pub fn new(col: usize, formula: FormulaSpec) -> Self {
        CrossTabAggregate {
            col,
            formula,
            header: None,
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossTabOptions {
    /// Subtotal rows for outer row dimensions
    pub row_totals: bool,
    /// Subtotal columns for outer column dimensions
    pub col_totals: bool,
    /// Grand-total row and column
    pub grand_total: bool,
    /// Lay several aggregates out horizontally instead of stacking them
    pub summary_side_by_side: bool,
}

impl Default for CrossTabOptions {
    fn default() -> Self {
        CrossTabOptions {
            row_totals: true,
            col_totals: true,
            grand_total: true,
            summary_side_by_side: true,
        }
    }
}

/// Declares two dimension values interchangeable, e.g. a merged date and
/// the date part it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePartCell {
    pub merged: CellValue,
    pub part: CellValue,
}

impl MergePartCell {
    pub fn new(merged: impl Into<CellValue>, part: impl Into<CellValue>) -> Self {
        MergePartCell {
            merged: merged.into(),
            part: part.into(),
        }
    }
}

/// One row or column of the data area: a tuple and, on the axis that carries
/// the aggregates, the aggregate index
type Slot = (usize, Option<usize>);

#[derive(Debug, Default)]
struct Layout {
    row_tuples: Vec<Tuple>,
    col_tuples: Vec<Tuple>,
    row_slots: Vec<Slot>,
    col_slots: Vec<Slot>,
    values: FxHashMap<Pair, CellValue>,
}

/// Where a cell of the crosstab sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Corner,
    ColHeader(Slot),
    RowHeader(Slot),
    Data(Slot, Slot),
}

pub struct CrossTabFilter {
    table: Arc<dyn TableLens>,
    row_dims: Vec<usize>,
    col_dims: Vec<usize>,
    aggregates: Vec<CrossTabAggregate>,
    prototypes: Vec<Box<dyn Formula>>,
    options: CrossTabOptions,
    merge_parts: RwLock<Vec<MergePartCell>>,
    layout: Mutex<Option<Arc<Layout>>>,
    listeners: ChangeListeners,
}

impl CrossTabFilter {
    pub fn new(
        table: Arc<dyn TableLens>,
        row_dims: Vec<usize>,
        col_dims: Vec<usize>,
        aggregates: Vec<CrossTabAggregate>,
        options: CrossTabOptions,
    ) -> Result<Arc<Self>> {
        if aggregates.is_empty() {
            return Err(LensError::InvalidDefinition(
                "crosstab needs at least one aggregate".to_string(),
            ));
        }
        let cols = table.col_count();
        let in_range = |col: usize| {
            if col < cols {
                Ok(())
            } else {
                Err(LensError::IndexOutOfRange {
                    index: col,
                    len: cols,
                })
            }
        };
        for &col in row_dims.iter().chain(&col_dims) {
            in_range(col)?;
        }

        let mut prototypes = Vec::with_capacity(aggregates.len());
        for aggregate in &aggregates {
            in_range(aggregate.col)?;
            let formula = create_formula(&aggregate.formula)?;
            if let Some(f2) = formula.as_formula2() {
                for &col in f2.secondary_columns() {
                    in_range(col)?;
                }
            }
            prototypes.push(formula);
        }

        Ok(Arc::new_cyclic(|weak: &Weak<Self>| {
            let listener: Weak<dyn ChangeListener> = weak.clone();
            table.add_change_listener(listener);
            CrossTabFilter {
                table,
                row_dims,
                col_dims,
                aggregates,
                prototypes,
                options,
                merge_parts: RwLock::new(Vec::new()),
                layout: Mutex::new(None),
                listeners: ChangeListeners::new(),
            }
        }))
    }

    /// Register interchangeable dimension values used by equivalence lookups
    pub fn set_merge_parts(&self, parts: Vec<MergePartCell>) {
        *self.merge_parts.write().unwrap_or_else(PoisonError::into_inner) = parts;
    }

    pub fn options(&self) -> &CrossTabOptions {
        &self.options
    }

    pub fn row_dim_count(&self) -> usize {
        self.row_dims.len()
    }

    pub fn col_dim_count(&self) -> usize {
        self.col_dims.len()
    }

    pub fn aggregate_count(&self) -> usize {
        self.aggregates.len()
    }

    fn has_aggregate_row(&self) -> bool {
        self.options.summary_side_by_side && (self.aggregates.len() > 1 || self.col_dims.is_empty())
    }

    fn has_aggregate_col(&self) -> bool {
        !self.options.summary_side_by_side && (self.aggregates.len() > 1 || self.row_dims.is_empty())
    }

    fn dim_name(&self, col: usize) -> String {
        header_text(self.table.as_ref(), col).unwrap_or_else(|| format!("Column [{}]", col))
    }

    pub fn row_dim_headers(&self) -> Vec<String> {
        self.row_dims.iter().map(|&c| self.dim_name(c)).collect()
    }

    pub fn col_dim_headers(&self) -> Vec<String> {
        self.col_dims.iter().map(|&c| self.dim_name(c)).collect()
    }

    pub fn aggregate_headers(&self) -> Vec<String> {
        (0..self.aggregates.len())
            .map(|i| self.aggregate_header(i))
            .collect()
    }

    fn aggregate_header(&self, index: usize) -> String {
        let Some(aggregate) = self.aggregates.get(index) else {
            return String::new();
        };
        match &aggregate.header {
            Some(header) => header.clone(),
            None => format!(
                "{}({})",
                self.prototypes[index].display_name(),
                self.dim_name(aggregate.col)
            ),
        }
    }

    /// Aggregate value stored for a pair; `None` if the pair does not exist
    pub fn pair_value(&self, pair: &Pair) -> Option<CellValue> {
        self.layout().values.get(pair).cloned()
    }

    /// Row tuple of a data row
    pub fn row_tuple(&self, row: usize) -> Option<Tuple> {
        let layout = self.layout();
        let slot = row
            .checked_sub(self.header_row_count())
            .and_then(|i| layout.row_slots.get(i))?;
        layout.row_tuples.get(slot.0).cloned()
    }

    /// Column tuple of a data column
    pub fn col_tuple(&self, col: usize) -> Option<Tuple> {
        let layout = self.layout();
        let slot = col
            .checked_sub(self.header_col_count())
            .and_then(|i| layout.col_slots.get(i))?;
        layout.col_tuples.get(slot.0).cloned()
    }

    /// Aggregate shown at a data cell
    pub fn aggregate_index(&self, row: usize, col: usize) -> Option<usize> {
        match self.region(row, col)? {
            Region::Data(r, c) => r.1.or(c.1),
            _ => None,
        }
    }

    /// The registered counterpart of a value, if any
    fn equivalent_value(&self, value: &CellValue) -> Option<CellValue> {
        let parts = self.merge_parts.read().unwrap_or_else(PoisonError::into_inner);
        parts.iter().find_map(|cell| {
            if &cell.merged == value {
                Some(cell.part.clone())
            } else if &cell.part == value {
                Some(cell.merged.clone())
            } else {
                None
            }
        })
    }

    /// The tuple with its first interchangeable value substituted
    fn equivalent_tuple(&self, tuple: &Tuple) -> Option<Tuple> {
        let (level, replacement) = tuple
            .values()
            .iter()
            .enumerate()
            .find_map(|(i, v)| self.equivalent_value(v).map(|e| (i, e)))?;
        let mut equivalent = tuple.clone();
        equivalent.0[level] = replacement;
        Some(equivalent)
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

    /// A full tuple and the totals it contributes to
    fn prefixes(full: &Tuple, subtotals: bool, grand: bool) -> Vec<Tuple> {
        let depth = full.len();
        let mut tuples = vec![full.clone()];
        if subtotals {
            tuples.extend((1..depth).rev().map(|len| full.prefix(len)));
        }
        if grand && depth > 0 {
            tuples.push(Tuple::grand());
        }
        tuples
    }

    fn build_layout(&self) -> Layout {
        let table = self.table.as_ref();
        let count = resolve_row_count(table);
        let headers = table.header_row_count().min(count);
        let trailers = table.trailer_row_count().min(count - headers);

        let mut accumulators: FxHashMap<(Tuple, Tuple), Vec<Box<dyn Formula>>> =
            FxHashMap::default();
        let mut row_set: FxHashSet<Tuple> = FxHashSet::default();
        let mut col_set: FxHashSet<Tuple> = FxHashSet::default();

        for base in headers..count - trailers {
            let row_full = Tuple::new(self.row_dims.iter().map(|&c| table.get_object(base, c)));
            let col_full = Tuple::new(self.col_dims.iter().map(|&c| table.get_object(base, c)));
            // every total is accumulated; the options only choose which are shown
            let rows = Self::prefixes(&row_full, true, true);
            let cols = Self::prefixes(&col_full, true, true);

            let inputs: Vec<Vec<CellValue>> = self
                .aggregates
                .iter()
                .zip(&self.prototypes)
                .map(|(aggregate, proto)| {
                    let mut values = vec![table.get_object(base, aggregate.col)];
                    if let Some(f2) = proto.as_formula2() {
                        values.extend(
                            f2.secondary_columns().iter().map(|&c| table.get_object(base, c)),
                        );
                    }
                    values
                })
                .collect();

            for r in &rows {
                for c in &cols {
                    let formulas = accumulators
                        .entry((r.clone(), c.clone()))
                        .or_insert_with(|| self.prototypes.clone());
                    for (formula, values) in formulas.iter_mut().zip(&inputs) {
                        formula.add_pair(values);
                    }
                }
            }
            row_set.extend(Self::prefixes(
                &row_full,
                self.options.row_totals,
                self.options.grand_total,
            ));
            col_set.extend(Self::prefixes(
                &col_full,
                self.options.col_totals,
                self.options.grand_total,
            ));
        }

        let mut values = FxHashMap::default();
        for ((r, c), formulas) in &accumulators {
            if !row_set.contains(r) || !col_set.contains(c) {
                continue;
            }
            for (i, formula) in formulas.iter().enumerate() {
                let mut formula = formula.clone();
                if let Some(pct) = formula.as_percentage_mut() {
                    let total_key = match pct.percentage_type() {
                        PercentageType::None => None,
                        PercentageType::Group => Some((r.prefix(r.len().saturating_sub(1)), c.clone())),
                        PercentageType::GrandTotal => Some((Tuple::grand(), Tuple::grand())),
                    };
                    let total = total_key
                        .and_then(|key| accumulators.get(&key))
                        .and_then(|totals| raw_result(totals[i].as_ref()));
                    if let Some(total) = total {
                        pct.set_total(total);
                    }
                }
                values.insert(
                    Pair::new(r.clone(), c.clone(), i),
                    formula.result().unwrap_or_default(),
                );
            }
        }

        let mut row_tuples: Vec<Tuple> = row_set.into_iter().collect();
        row_tuples.sort_by(Tuple::compare);
        let mut col_tuples: Vec<Tuple> = col_set.into_iter().collect();
        col_tuples.sort_by(Tuple::compare);

        let k = self.aggregates.len();
        let side_by_side = self.options.summary_side_by_side;
        let slots = |tuples: &[Tuple], carries: bool| -> Vec<Slot> {
            if carries {
                (0..tuples.len())
                    .flat_map(|t| (0..k).map(move |a| (t, Some(a))))
                    .collect()
            } else {
                (0..tuples.len()).map(|t| (t, None)).collect()
            }
        };
        let row_slots = slots(&row_tuples, !side_by_side);
        let col_slots = slots(&col_tuples, side_by_side);

        log::debug!(
            "crosstab populated {} pairs over {} x {} tuples",
            values.len(),
            row_tuples.len(),
            col_tuples.len()
        );
        Layout {
            row_tuples,
            col_tuples,
            row_slots,
            col_slots,
            values,
        }
    }

    fn region(&self, row: usize, col: usize) -> Option<Region> {
        let layout = self.layout();
        let (hr, hc) = (self.header_row_count(), self.header_col_count());
        if row >= hr + layout.row_slots.len() || col >= hc + layout.col_slots.len() {
            return None;
        }
        let region = match (row < hr, col < hc) {
            (true, true) => Region::Corner,
            (true, false) => Region::ColHeader(layout.col_slots[col - hc]),
            (false, true) => Region::RowHeader(layout.row_slots[row - hr]),
            (false, false) => Region::Data(layout.row_slots[row - hr], layout.col_slots[col - hc]),
        };
        Some(region)
    }

    fn axis_label(tuple: &Tuple, level: usize) -> CellValue {
        match tuple.get(level) {
            Some(value) => value.clone(),
            None if level == tuple.len() && tuple.is_grand() => GRAND_TOTAL_LABEL.into(),
            None if level == tuple.len() => TOTAL_LABEL.into(),
            None => CellValue::Null,
        }
    }

    fn data_pair(&self, layout: &Layout, r: Slot, c: Slot) -> Pair {
        Pair::new(
            layout.row_tuples[r.0].clone(),
            layout.col_tuples[c.0].clone(),
            r.1.or(c.1).unwrap_or(0),
        )
    }

    fn is_grand_row(&self, tuple: &Tuple) -> bool {
        tuple.is_grand() && !self.row_dims.is_empty()
    }

    fn is_grand_col(&self, tuple: &Tuple) -> bool {
        tuple.is_grand() && !self.col_dims.is_empty()
    }

    fn reset(&self) {
        *self.layout.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl TableLens for CrossTabFilter {
    fn row_count(&self) -> i64 {
        (self.header_row_count() + self.layout().row_slots.len()) as i64
    }

    fn col_count(&self) -> usize {
        self.header_col_count() + self.layout().col_slots.len()
    }

    fn header_row_count(&self) -> usize {
        self.col_dims.len() + usize::from(self.has_aggregate_row())
    }

    fn header_col_count(&self) -> usize {
        self.row_dims.len() + usize::from(self.has_aggregate_col())
    }

    fn more_rows(&self, row: usize) -> bool {
        (row as i64) < self.row_count()
    }

    fn get_object(&self, row: usize, col: usize) -> CellValue {
        let Some(region) = self.region(row, col) else {
            return CellValue::Null;
        };
        let layout = self.layout();
        match region {
            Region::Corner => {
                if row + 1 == self.header_row_count() && col < self.row_dims.len() {
                    self.dim_name(self.row_dims[col]).into()
                } else {
                    CellValue::Null
                }
            }
            Region::ColHeader((t, agg)) => {
                if row < self.col_dims.len() {
                    Self::axis_label(&layout.col_tuples[t], row)
                } else {
                    self.aggregate_header(agg.unwrap_or(0)).into()
                }
            }
            Region::RowHeader((t, agg)) => {
                if col < self.row_dims.len() {
                    Self::axis_label(&layout.row_tuples[t], col)
                } else {
                    self.aggregate_header(agg.unwrap_or(0)).into()
                }
            }
            Region::Data(r, c) => layout
                .values
                .get(&self.data_pair(&layout, r, c))
                .cloned()
                .unwrap_or_default(),
        }
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

    fn as_crosstab(&self) -> Option<&CrossTabFilter> {
        Some(self)
    }

    fn as_descriptor(&self) -> Option<&dyn TableDataDescriptor> {
        Some(self)
    }
}

impl TableFilter for CrossTabFilter {
    fn table(&self) -> &Arc<dyn TableLens> {
        &self.table
    }

    /// Crosstab rows aggregate many upstream rows
    fn base_row_index(&self, _row: usize) -> Option<usize> {
        None
    }

    /// Row-header columns map to their dimension column
    fn base_col_index(&self, col: usize) -> Option<usize> {
        self.row_dims.get(col).copied()
    }
}

impl TableDataDescriptor for CrossTabFilter {
    fn cell_data_path(&self, row: usize, col: usize) -> TableDataPath {
        let Some(region) = self.region(row, col) else {
            return TableDataPath::invalid();
        };
        let layout = self.layout();
        match region {
            Region::Corner => {
                if row + 1 == self.header_row_count() && col < self.row_dims.len() {
                    TableDataPath::new(PathKind::Header, vec![self.dim_name(self.row_dims[col])])
                } else {
                    TableDataPath::new(PathKind::Header, Vec::new())
                }
            }
            Region::ColHeader((t, agg)) => {
                header_cell_path(&layout.col_tuples[t], row, &self.col_dim_headers(), || {
                    self.aggregate_header(agg.unwrap_or(0))
                })
            }
            Region::RowHeader((t, agg)) => {
                header_cell_path(&layout.row_tuples[t], col, &self.row_dim_headers(), || {
                    self.aggregate_header(agg.unwrap_or(0))
                })
            }
            Region::Data(r, c) => {
                let row_tuple = &layout.row_tuples[r.0];
                let col_tuple = &layout.col_tuples[c.0];
                let aggregate = self.aggregate_header(r.1.or(c.1).unwrap_or(0));
                let row_partial = row_tuple.len() < self.row_dims.len();
                let col_partial = col_tuple.len() < self.col_dims.len();

                if !row_partial && !col_partial {
                    return TableDataPath::new(PathKind::Detail, vec![aggregate]);
                }

                let row_part: Vec<String> = if row_partial {
                    self.row_dim_headers().into_iter().take(row_tuple.len()).collect()
                } else {
                    Vec::new()
                };
                let col_part: Vec<String> = if col_partial {
                    self.col_dim_headers().into_iter().take(col_tuple.len()).collect()
                } else {
                    Vec::new()
                };
                let path = if self.options.summary_side_by_side {
                    col_part.into_iter().chain([aggregate]).chain(row_part).collect()
                } else {
                    row_part.into_iter().chain(col_part).chain([aggregate]).collect()
                };

                if self.is_grand_row(row_tuple) || self.is_grand_col(col_tuple) {
                    TableDataPath::new(PathKind::GrandTotal, path)
                } else {
                    let partial = if row_partial { row_tuple.len() } else { col_tuple.len() };
                    TableDataPath::new(PathKind::Summary, path).with_level(partial - 1)
                }
            }
        }
    }

    fn row_data_path(&self, row: usize) -> TableDataPath {
        if row < self.header_row_count() {
            return TableDataPath::new(PathKind::Header, Vec::new());
        }
        let Some(tuple) = self.row_tuple(row) else {
            return TableDataPath::invalid();
        };
        axis_path(&tuple, self.row_dim_headers(), self.is_grand_row(&tuple))
    }

    fn col_data_path(&self, col: usize) -> TableDataPath {
        if col < self.header_col_count() {
            return match self.row_dim_headers().get(col) {
                Some(name) => TableDataPath::new(PathKind::Header, vec![name.clone()]),
                None => TableDataPath::new(PathKind::Header, Vec::new()),
            };
        }
        let Some(tuple) = self.col_tuple(col) else {
            return TableDataPath::invalid();
        };
        axis_path(&tuple, self.col_dim_headers(), self.is_grand_col(&tuple))
    }
}

/// Path of a dimension-label or aggregate-label header cell
fn header_cell_path(
    tuple: &Tuple,
    level: usize,
    dims: &[String],
    aggregate: impl FnOnce() -> String,
) -> TableDataPath {
    if level >= dims.len() {
        return TableDataPath::new(PathKind::Header, vec![aggregate()]);
    }
    if level < tuple.len() {
        TableDataPath::new(PathKind::GroupHeader, vec![dims[level].clone()]).with_level(level)
    } else if level == tuple.len() {
        let label = if tuple.is_grand() { GRAND_TOTAL_LABEL } else { TOTAL_LABEL };
        TableDataPath::new(PathKind::Header, vec![label.to_string()])
    } else {
        TableDataPath::new(PathKind::Header, Vec::new())
    }
}

/// Path of a whole data row or column
fn axis_path(tuple: &Tuple, dims: Vec<String>, grand: bool) -> TableDataPath {
    let depth = dims.len();
    let path: Vec<String> = dims.into_iter().take(tuple.len()).collect();
    if grand {
        TableDataPath::new(PathKind::GrandTotal, path)
    } else if tuple.len() < depth {
        TableDataPath::new(PathKind::Summary, path).with_level(tuple.len() - 1)
    } else {
        TableDataPath::new(PathKind::Detail, path)
    }
}

impl ChangeListener for CrossTabFilter {
    fn table_changed(&self, _event: &TableChangeEvent) {
        self.invalidate();
    }
}

impl std::fmt::Debug for CrossTabFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossTabFilter")
            .field("row_dims", &self.row_dims)
            .field("col_dims", &self.col_dims)
            .field("aggregates", &self.aggregates)
            .field("options", &self.options)
            .finish()
    }
}

/// Value and key lookups over a crosstab's cells.
pub struct CrossTabFilterUtil;

impl CrossTabFilterUtil {
    /// Stored value of (row tuple, column tuple, aggregate).
    ///
    /// When the pair is absent and `check_equivalence` is set, each tuple gets
    /// its first interchangeable value substituted (see `MergePartCell`) and
    /// the lookup is retried once. `None` means the pair does not exist.
    pub fn get_value(
        crosstab: &CrossTabFilter,
        row_tuple: &Tuple,
        col_tuple: &Tuple,
        aggregate: usize,
        check_equivalence: bool,
    ) -> Option<CellValue> {
        let pair = Pair::new(row_tuple.clone(), col_tuple.clone(), aggregate);
        if let Some(value) = crosstab.pair_value(&pair) {
            return Some(value);
        }
        if !check_equivalence {
            return None;
        }

        let row_equivalent = crosstab.equivalent_tuple(row_tuple);
        let col_equivalent = crosstab.equivalent_tuple(col_tuple);
        if row_equivalent.is_none() && col_equivalent.is_none() {
            return None;
        }
        log::trace!("retrying crosstab lookup with equivalent tuples");
        Self::get_value(
            crosstab,
            row_equivalent.as_ref().unwrap_or(row_tuple),
            col_equivalent.as_ref().unwrap_or(col_tuple),
            aggregate,
            false,
        )
    }

    /// Dimension names and aggregate headers mapped to their values at a data
    /// cell. Total cells carry every aggregate, detail cells only their own.
    pub fn get_key_value_pairs(
        crosstab: &CrossTabFilter,
        row: usize,
        col: usize,
    ) -> Option<FxHashMap<String, CellValue>> {
        let Region::Data(r, c) = crosstab.region(row, col)? else {
            return None;
        };
        let layout = crosstab.layout();
        let row_tuple = &layout.row_tuples[r.0];
        let col_tuple = &layout.col_tuples[c.0];

        let mut pairs = FxHashMap::default();
        for (name, value) in crosstab.row_dim_headers().into_iter().zip(row_tuple.values()) {
            pairs.insert(name, value.clone());
        }
        for (name, value) in crosstab.col_dim_headers().into_iter().zip(col_tuple.values()) {
            pairs.insert(name, value.clone());
        }

        let own = r.1.or(c.1).unwrap_or(0);
        let visible: Vec<usize> = if Self::is_summary_cell(crosstab, row, col) {
            (0..crosstab.aggregate_count()).collect()
        } else {
            vec![own]
        };
        for aggregate in visible {
            let pair = Pair::new(row_tuple.clone(), col_tuple.clone(), aggregate);
            let value = layout.values.get(&pair).cloned().unwrap_or_default();
            pairs.insert(crosstab.aggregate_header(aggregate), value);
        }
        Some(pairs)
    }

    /// True for data cells in a grand-total row or column
    pub fn is_grand_total(crosstab: &CrossTabFilter, row: usize, col: usize) -> bool {
        match (crosstab.row_tuple(row), crosstab.col_tuple(col)) {
            (Some(r), Some(c)) => crosstab.is_grand_row(&r) || crosstab.is_grand_col(&c),
            _ => false,
        }
    }

    /// True for data cells on any total row or column, grand totals included
    pub fn is_summary_cell(crosstab: &CrossTabFilter, row: usize, col: usize) -> bool {
        match (crosstab.row_tuple(row), crosstab.col_tuple(col)) {
            (Some(r), Some(c)) => {
                r.len() < crosstab.row_dim_count() || c.len() < crosstab.col_dim_count()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::test_support::{row_values, table};

    fn sales() -> Arc<dyn TableLens> {
        table(vec![
            vec!["region".into(), "product".into(), "quarter".into(), "amount".into()],
            vec!["East".into(), "A".into(), "Q1".into(), 10.into()],
            vec!["East".into(), "A".into(), "Q2".into(), 20.into()],
            vec!["East".into(), "B".into(), "Q1".into(), 5.into()],
            vec!["West".into(), "A".into(), "Q1".into(), 7.into()],
        ])
    }

    fn sum_amount() -> CrossTabAggregate {
        CrossTabAggregate::new(3, FormulaSpec::new("Sum"))
    }

    fn count_amount() -> CrossTabAggregate {
        CrossTabAggregate::new(3, FormulaSpec::new("Count"))
    }

    fn region_by_quarter() -> Arc<CrossTabFilter> {
        CrossTabFilter::new(sales(), vec![0], vec![2], vec![sum_amount()], CrossTabOptions::default())
            .unwrap()
    }

    fn d(v: f64) -> CellValue {
        CellValue::Double(v)
    }

    #[test]
    fn test_tuple_ordering() {
        let east_a = Tuple::new(["East".into(), "A".into()]);
        let east = Tuple::new(["East".into()]);
        let west_a = Tuple::new(["West".into(), "A".into()]);
        let mut tuples = vec![Tuple::grand(), west_a.clone(), east.clone(), east_a.clone()];
        tuples.sort_by(Tuple::compare);
        assert_eq!(tuples, vec![east_a.clone(), east.clone(), west_a, Tuple::grand()]);

        assert!(east.is_prefix_of(&east_a));
        assert!(Tuple::grand().is_prefix_of(&east));
        assert_eq!(east_a.prefix(1), east);
        assert_ne!(east, Tuple::new(["east".into()]));
    }

    #[test]
    fn test_single_aggregate_layout() {
        let ct = region_by_quarter();
        assert_eq!(ct.header_row_count(), 1);
        assert_eq!(ct.header_col_count(), 1);
        assert_eq!(ct.row_count(), 4);
        assert_eq!(ct.col_count(), 4);

        assert_eq!(
            row_values(&*ct, 0),
            vec!["region".into(), "Q1".into(), "Q2".into(), GRAND_TOTAL_LABEL.into()]
        );
        assert_eq!(row_values(&*ct, 1), vec!["East".into(), d(15.0), d(20.0), d(35.0)]);
        assert_eq!(row_values(&*ct, 2), vec!["West".into(), d(7.0), CellValue::Null, d(7.0)]);
        assert_eq!(
            row_values(&*ct, 3),
            vec![GRAND_TOTAL_LABEL.into(), d(22.0), d(20.0), d(42.0)]
        );
        assert!(ct.get_object(4, 0).is_null());
    }

    #[test]
    fn test_stacked_aggregates_with_subtotals() {
        let options = CrossTabOptions {
            summary_side_by_side: false,
            ..CrossTabOptions::default()
        };
        let ct = CrossTabFilter::new(
            sales(),
            vec![0, 1],
            vec![2],
            vec![sum_amount(), count_amount()],
            options,
        )
        .unwrap();

        assert_eq!(ct.header_row_count(), 1);
        assert_eq!(ct.header_col_count(), 3);
        // (East,A) (East,B) (East) (West,A) (West) () each with two aggregates
        assert_eq!(ct.row_count(), 13);
        assert_eq!(ct.col_count(), 6);
        assert_eq!(
            ct.aggregate_headers(),
            vec!["Sum(amount)".to_string(), "Count(amount)".to_string()]
        );

        assert_eq!(
            row_values(&*ct, 1),
            vec!["East".into(), "A".into(), "Sum(amount)".into(), d(10.0), d(20.0), d(30.0)]
        );
        assert_eq!(
            row_values(&*ct, 2),
            vec![
                "East".into(),
                "A".into(),
                "Count(amount)".into(),
                CellValue::Int(1),
                CellValue::Int(1),
                CellValue::Int(2)
            ]
        );
        assert_eq!(
            row_values(&*ct, 5),
            vec!["East".into(), TOTAL_LABEL.into(), "Sum(amount)".into(), d(15.0), d(20.0), d(35.0)]
        );
        assert_eq!(ct.row_tuple(5), Some(Tuple::new(["East".into()])));
        assert_eq!(ct.aggregate_index(6, 3), Some(1));
        assert_eq!(ct.get_object(11, 5), d(42.0));
        assert_eq!(ct.get_object(12, 5), CellValue::Int(4));
    }

    #[test]
    fn test_data_paths() {
        let options = CrossTabOptions {
            summary_side_by_side: false,
            ..CrossTabOptions::default()
        };
        let stacked =
            CrossTabFilter::new(sales(), vec![0, 1], vec![2], vec![sum_amount()], options).unwrap();

        // rows: header, (East,A), (East,B), (East), (West,A), (West), ()
        assert_eq!(
            stacked.cell_data_path(1, 2),
            TableDataPath::new(PathKind::Detail, vec!["Sum(amount)".into()])
        );
        assert_eq!(
            stacked.cell_data_path(3, 2),
            TableDataPath::new(PathKind::Summary, vec!["region".into(), "Sum(amount)".into()])
                .with_level(0)
        );
        assert_eq!(
            stacked.cell_data_path(6, 2),
            TableDataPath::new(PathKind::GrandTotal, vec!["Sum(amount)".into()])
        );
        assert_eq!(
            stacked.cell_data_path(3, 4),
            TableDataPath::new(PathKind::GrandTotal, vec!["region".into(), "Sum(amount)".into()])
        );
        assert_eq!(stacked.cell_data_path(1, 0).kind, PathKind::GroupHeader);
        assert_eq!(
            stacked.cell_data_path(3, 1),
            TableDataPath::new(PathKind::Header, vec![TOTAL_LABEL.into()])
        );
        assert_eq!(stacked.cell_data_path(0, 1).path, vec!["product".to_string()]);
        assert!(stacked.cell_data_path(7, 0).is_invalid());
        assert_eq!(stacked.row_data_path(3).kind, PathKind::Summary);
        assert_eq!(stacked.col_data_path(4).kind, PathKind::GrandTotal);

        let side_by_side = CrossTabFilter::new(
            sales(),
            vec![0, 1],
            vec![2],
            vec![sum_amount()],
            CrossTabOptions::default(),
        )
        .unwrap();
        // the aggregate header folds in after the column part of the path
        assert_eq!(
            side_by_side.cell_data_path(3, 4).path,
            vec!["Sum(amount)".to_string(), "region".to_string()]
        );
    }

    #[test]
    fn test_key_value_pairs() {
        let ct = CrossTabFilter::new(
            sales(),
            vec![0],
            vec![2],
            vec![sum_amount(), count_amount()],
            CrossTabOptions::default(),
        )
        .unwrap();
        // header rows: quarter, aggregate names; data columns alternate Sum, Count
        assert_eq!(ct.header_row_count(), 2);
        assert_eq!(ct.get_object(1, 1), CellValue::from("Sum(amount)"));

        let detail = CrossTabFilterUtil::get_key_value_pairs(&ct, 2, 1).unwrap();
        assert_eq!(detail.get("region"), Some(&"East".into()));
        assert_eq!(detail.get("quarter"), Some(&"Q1".into()));
        assert_eq!(detail.get("Sum(amount)"), Some(&d(15.0)));
        assert!(!detail.contains_key("Count(amount)"));

        // grand total column shows every aggregate
        let total = CrossTabFilterUtil::get_key_value_pairs(&ct, 2, 5).unwrap();
        assert!(!total.contains_key("quarter"));
        assert_eq!(total.get("Sum(amount)"), Some(&d(35.0)));
        assert_eq!(total.get("Count(amount)"), Some(&CellValue::Int(3)));
        assert!(CrossTabFilterUtil::is_grand_total(&ct, 2, 5));
        assert!(CrossTabFilterUtil::is_summary_cell(&ct, 2, 5));
        assert!(!CrossTabFilterUtil::is_summary_cell(&ct, 2, 1));

        assert!(CrossTabFilterUtil::get_key_value_pairs(&ct, 0, 1).is_none());
    }

    #[test]
    fn test_equivalent_tuple_lookup() {
        let ct = CrossTabFilter::new(
            table(vec![
                vec!["month".into(), "quarter".into(), "amount".into()],
                vec!["Mar".into(), "Q1".into(), 4.into()],
                vec!["Apr".into(), "Q2".into(), 6.into()],
            ]),
            vec![0],
            vec![1],
            vec![CrossTabAggregate::new(2, FormulaSpec::new("Sum"))],
            CrossTabOptions::default(),
        )
        .unwrap();
        ct.set_merge_parts(vec![MergePartCell::new("Mar", 3)]);

        let month = Tuple::new([CellValue::Int(3)]);
        let q1 = Tuple::new(["Q1".into()]);
        assert_eq!(CrossTabFilterUtil::get_value(&ct, &month, &q1, 0, false), None);
        assert_eq!(CrossTabFilterUtil::get_value(&ct, &month, &q1, 0, true), Some(d(4.0)));
        let stored = Tuple::new(["Mar".into()]);
        assert_eq!(
            CrossTabFilterUtil::get_value(&ct, &stored, &q1, 0, true),
            CrossTabFilterUtil::get_value(&ct, &month, &q1, 0, true)
        );
        // no pair even after substitution
        let q2 = Tuple::new(["Q2".into()]);
        assert_eq!(CrossTabFilterUtil::get_value(&ct, &month, &q2, 0, true), None);
    }

    #[test]
    fn test_percentage_of_grand_total() {
        let ct = CrossTabFilter::new(
            sales(),
            vec![0],
            vec![],
            vec![CrossTabAggregate::new(
                3,
                FormulaSpec::new("Sum").with_percentage(PercentageType::GrandTotal),
            )],
            CrossTabOptions::default(),
        )
        .unwrap();
        // no column dimensions: one header row naming the aggregate
        assert_eq!(ct.header_row_count(), 1);
        assert_eq!(ct.col_count(), 2);
        assert_eq!(ct.get_object(0, 1), CellValue::from("Sum(amount)"));
        assert_eq!(ct.get_double(1, 1), Some(35.0 / 42.0));
        assert_eq!(ct.get_double(3, 1), Some(1.0));
    }

    #[test]
    fn test_group_percentage_without_row_totals() {
        let pct = CrossTabAggregate::new(
            3,
            FormulaSpec::new("Sum").with_percentage(PercentageType::Group),
        );
        let shown = CrossTabFilter::new(
            sales(),
            vec![0, 1],
            vec![2],
            vec![pct.clone()],
            CrossTabOptions::default(),
        )
        .unwrap();
        let hidden = CrossTabFilter::new(
            sales(),
            vec![0, 1],
            vec![2],
            vec![pct],
            CrossTabOptions {
                row_totals: false,
                ..CrossTabOptions::default()
            },
        )
        .unwrap();

        let q1 = Tuple::new(["Q1".into()]);
        let east_a = Tuple::new(["East".into(), "A".into()]);
        let east_b = Tuple::new(["East".into(), "B".into()]);
        let west_a = Tuple::new(["West".into(), "A".into()]);
        for ct in [&shown, &hidden] {
            assert_eq!(CrossTabFilterUtil::get_value(ct, &east_a, &q1, 0, false), Some(d(10.0 / 15.0)));
            assert_eq!(CrossTabFilterUtil::get_value(ct, &east_b, &q1, 0, false), Some(d(5.0 / 15.0)));
            assert_eq!(CrossTabFilterUtil::get_value(ct, &west_a, &q1, 0, false), Some(d(1.0)));
        }
        // the parent subtotal feeds the percentage but is not laid out
        let east = Tuple::new(["East".into()]);
        assert!(CrossTabFilterUtil::get_value(&shown, &east, &q1, 0, false).is_some());
        assert_eq!(CrossTabFilterUtil::get_value(&hidden, &east, &q1, 0, false), None);
        assert!(hidden.row_count() < shown.row_count());
    }

    #[test]
    fn test_grand_percentage_without_grand_total() {
        let ct = CrossTabFilter::new(
            sales(),
            vec![0],
            vec![],
            vec![CrossTabAggregate::new(
                3,
                FormulaSpec::new("Sum").with_percentage(PercentageType::GrandTotal),
            )],
            CrossTabOptions {
                grand_total: false,
                ..CrossTabOptions::default()
            },
        )
        .unwrap();
        // header, East, West
        assert_eq!(ct.row_count(), 3);
        assert_eq!(ct.get_object(1, 0), CellValue::from("East"));
        assert_eq!(ct.get_double(1, 1), Some(35.0 / 42.0));
        assert_eq!(ct.get_double(2, 1), Some(7.0 / 42.0));
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(matches!(
            CrossTabFilter::new(sales(), vec![0], vec![2], vec![], CrossTabOptions::default()),
            Err(LensError::InvalidDefinition(_))
        ));
        assert!(matches!(
            CrossTabFilter::new(
                sales(),
                vec![7],
                vec![2],
                vec![sum_amount()],
                CrossTabOptions::default()
            ),
            Err(LensError::IndexOutOfRange { index: 7, len: 4 })
        ));
    }
}
