//! Streaming aggregate formulas
//!
//! A formula folds values one at a time and produces its aggregate on demand.
//! Every formula here is one of two shapes:
//!
//! - `Aggregate<A>` wraps a single-column `Accumulator` (sum, median, ...)
//! - `Paired<A>` wraps a `PairAccumulator` that folds a primary value together
//!   with a value from a secondary column (correlation, weighted average, ...)
//!
//! Both shapes share the no-data rules: null values and the per-type null
//! sentinels are skipped, unparsable strings are skipped by numeric formulas,
//! and an empty formula reports no result unless a default result was
//! requested, in which case it reports zero.
//!
//! # Examples
//!
//! ```
//! use tablelens::formula::{Formula, MedianFormula, SumFormula};
//! use tablelens::CellValue;
//!
//! let mut sum = SumFormula::new();
//! for v in [1.0, 2.0, 3.0] {
//!     sum.add_double(v);
//! }
//! assert_eq!(sum.double_result(), Some(6.0));
//!
//! let mut median = MedianFormula::new();
//! for v in ["1", "2", "3", "4"] {
//!     median.add_value(&CellValue::from(v));
//! }
//! assert_eq!(median.double_result(), Some(2.5));
//! ```

mod basic;
mod factory;
mod pair;
mod stat;

pub use basic::{
    Average, AverageFormula, Concat, ConcatFormula, Count, CountFormula, DistinctCount,
    DistinctCountFormula, Max, MaxFormula, Min, MinFormula, Product, ProductFormula, Sum,
    SumFormula, SumSquares, SumSquaresFormula,
};
pub use factory::{create_formula, FormulaSpec};
pub use pair::{
    Correlation, CorrelationFormula, Covariance, CovarianceFormula, First, FirstFormula, Last,
    LastFormula, WeightedAverage, WeightedAverageFormula,
};
pub use stat::{
    percentile_sorted, Median, MedianFormula, Mode, ModeFormula, NthLargest, NthLargestFormula,
    NthMostFrequent, NthMostFrequentFormula, NthSmallest, NthSmallestFormula, Percentile,
    PercentileFormula, PopulationStandardDeviationFormula, PopulationVarianceFormula, Spread,
    StandardDeviationFormula, VarianceFormula,
};

use crate::value::CellValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Double value meaning "no data"
pub const NULL_DOUBLE: f64 = -f64::MAX;

/// Long value meaning "no data"
pub const NULL_LONG: i64 = i64::MIN;

/// Integer value meaning "no data"
pub const NULL_INTEGER: i32 = i32::MIN;

/// True for nulls and for values carrying a null sentinel
pub fn is_no_data(value: &CellValue) -> bool {
    match value {
        CellValue::Null => true,
        CellValue::Double(v) => *v == NULL_DOUBLE || v.is_nan(),
        CellValue::Int(v) => *v == NULL_LONG,
        _ => false,
    }
}

/// An aggregate that folds values one at a time.
pub trait Formula: Send + Sync + fmt::Debug {
    /// Return to the empty state
    fn reset(&mut self);

    /// Fold one value. Nulls and null sentinels are ignored.
    fn add_value(&mut self, value: &CellValue);

    fn add_double(&mut self, value: f64) {
        if value != NULL_DOUBLE && !value.is_nan() {
            self.add_value(&CellValue::Double(value));
        }
    }

    fn add_long(&mut self, value: i64) {
        if value != NULL_LONG {
            self.add_value(&CellValue::Int(value));
        }
    }

    fn add_int(&mut self, value: i32) {
        if value != NULL_INTEGER {
            self.add_value(&CellValue::Int(value as i64));
        }
    }

    /// Fold a primary value together with its secondary column values
    fn add_pair(&mut self, values: &[CellValue]) {
        if let Some(primary) = values.first() {
            self.add_value(primary);
        }
    }

    /// Current aggregate, or `None` when there is no result
    fn result(&self) -> Option<CellValue>;

    fn double_result(&self) -> Option<f64> {
        self.result().and_then(|v| v.to_number())
    }

    fn is_null(&self) -> bool {
        self.result().is_none()
    }

    /// Report zero instead of no result when nothing was accumulated
    fn set_default_result(&mut self, default: bool);

    fn is_default_result(&self) -> bool;

    fn name(&self) -> &'static str;

    fn display_name(&self) -> String {
        self.name().to_string()
    }

    fn clone_formula(&self) -> Box<dyn Formula>;

    fn as_formula2(&self) -> Option<&dyn Formula2> {
        None
    }

    fn as_percentage(&self) -> Option<&dyn PercentageFormula> {
        None
    }

    fn as_percentage_mut(&mut self) -> Option<&mut dyn PercentageFormula> {
        None
    }
}

impl Clone for Box<dyn Formula> {
    fn clone(&self) -> Self {
        self.clone_formula()
    }
}

/// A formula that pairs its primary column with secondary columns.
pub trait Formula2: Formula {
    fn secondary_columns(&self) -> &[usize];
}

/// What a percentage result is relative to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PercentageType {
    #[default]
    None,
    Group,
    GrandTotal,
}

/// A formula whose result can be expressed as a fraction of a total.
pub trait PercentageFormula {
    fn percentage_type(&self) -> PercentageType;

    fn set_percentage_type(&mut self, kind: PercentageType);

    /// Total the raw result is divided by
    fn set_total(&mut self, total: f64);

    fn total(&self) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Percentage {
    kind: PercentageType,
    total: Option<f64>,
}

/// Result of a formula with any percentage setting ignored
pub fn raw_result(formula: &dyn Formula) -> Option<f64> {
    let mut raw = formula.clone_formula();
    if let Some(pct) = raw.as_percentage_mut() {
        pct.set_percentage_type(PercentageType::None);
    }
    raw.double_result()
}

/// Apply the default-result and percentage rules to a raw result.
fn finish(
    raw: Option<CellValue>,
    default: CellValue,
    default_result: bool,
    percentage: &Percentage,
) -> Option<CellValue> {
    let Some(raw) = raw else {
        return default_result.then_some(default);
    };
    if percentage.kind == PercentageType::None {
        return Some(raw);
    }
    let Some(n) = raw.to_number() else {
        return Some(raw);
    };
    match percentage.total {
        Some(total) if total != 0.0 && total.is_finite() => Some(CellValue::Double(n / total)),
        _ => default_result.then_some(default),
    }
}

// ============================================================================
// Single-column formulas
// ============================================================================

/// Fold state of a single-column formula.
pub trait Accumulator: Clone + fmt::Debug + Send + Sync + 'static {
    const NAME: &'static str;

    /// False for formulas whose result is not a quantity
    const PERCENTAGE: bool = true;

    /// Fold one non-null value
    fn add(&mut self, value: &CellValue);

    fn clear(&mut self);

    /// Raw result, `None` when there is none
    fn value(&self) -> Option<CellValue>;

    fn default_value(&self) -> CellValue {
        CellValue::Double(0.0)
    }

    fn display_name(&self) -> String {
        Self::NAME.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct Aggregate<A> {
    acc: A,
    default_result: bool,
    percentage: Percentage,
}

impl<A: Accumulator + Default> Aggregate<A> {
    pub fn new() -> Self {
        Self::from_accumulator(A::default())
    }
}

impl<A: Accumulator + Default> Default for Aggregate<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Accumulator> Aggregate<A> {
    pub fn from_accumulator(acc: A) -> Self {
        Aggregate {
            acc,
            default_result: false,
            percentage: Percentage::default(),
        }
    }

    pub fn accumulator(&self) -> &A {
        &self.acc
    }
}

impl<A: Accumulator> Formula for Aggregate<A> {
    fn reset(&mut self) {
        self.acc.clear();
    }

    fn add_value(&mut self, value: &CellValue) {
        if !is_no_data(value) {
            self.acc.add(value);
        }
    }

    fn result(&self) -> Option<CellValue> {
        finish(
            self.acc.value(),
            self.acc.default_value(),
            self.default_result,
            &self.percentage,
        )
    }

    fn set_default_result(&mut self, default: bool) {
        self.default_result = default;
    }

    fn is_default_result(&self) -> bool {
        self.default_result
    }

    fn name(&self) -> &'static str {
        A::NAME
    }

    fn display_name(&self) -> String {
        self.acc.display_name()
    }

    fn clone_formula(&self) -> Box<dyn Formula> {
        Box::new(self.clone())
    }

    fn as_percentage(&self) -> Option<&dyn PercentageFormula> {
        if A::PERCENTAGE {
            Some(self)
        } else {
            None
        }
    }

    fn as_percentage_mut(&mut self) -> Option<&mut dyn PercentageFormula> {
        if A::PERCENTAGE {
            Some(self)
        } else {
            None
        }
    }
}

impl<A: Accumulator> PercentageFormula for Aggregate<A> {
    fn percentage_type(&self) -> PercentageType {
        self.percentage.kind
    }

    fn set_percentage_type(&mut self, kind: PercentageType) {
        self.percentage.kind = kind;
    }

    fn set_total(&mut self, total: f64) {
        self.percentage.total = Some(total);
    }

    fn total(&self) -> Option<f64> {
        self.percentage.total
    }
}

// ============================================================================
// Two-column formulas
// ============================================================================

/// Fold state of a formula over (primary, secondary) pairs.
pub trait PairAccumulator: Clone + fmt::Debug + Send + Sync + 'static {
    const NAME: &'static str;

    const PERCENTAGE: bool = true;

    /// Fold one pair; the primary value is never null
    fn add(&mut self, primary: &CellValue, secondary: &CellValue);

    fn clear(&mut self);

    fn value(&self) -> Option<CellValue>;

    fn default_value(&self) -> CellValue {
        CellValue::Double(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct Paired<A> {
    acc: A,
    secondary: [usize; 1],
    default_result: bool,
    percentage: Percentage,
}

impl<A: PairAccumulator + Default> Paired<A> {
    /// Pair the primary column with `secondary_col`
    pub fn new(secondary_col: usize) -> Self {
        Paired {
            acc: A::default(),
            secondary: [secondary_col],
            default_result: false,
            percentage: Percentage::default(),
        }
    }
}

impl<A: PairAccumulator> Formula for Paired<A> {
    fn reset(&mut self) {
        self.acc.clear();
    }

    /// A value without its secondary column pairs with null
    fn add_value(&mut self, value: &CellValue) {
        self.add_pair(&[value.clone(), CellValue::Null]);
    }

    fn add_pair(&mut self, values: &[CellValue]) {
        let Some(primary) = values.first() else {
            return;
        };
        if is_no_data(primary) {
            return;
        }
        let secondary = values.get(1).cloned().unwrap_or_default();
        self.acc.add(primary, &secondary);
    }

    fn result(&self) -> Option<CellValue> {
        finish(
            self.acc.value(),
            self.acc.default_value(),
            self.default_result,
            &self.percentage,
        )
    }

    fn set_default_result(&mut self, default: bool) {
        self.default_result = default;
    }

    fn is_default_result(&self) -> bool {
        self.default_result
    }

    fn name(&self) -> &'static str {
        A::NAME
    }

    fn clone_formula(&self) -> Box<dyn Formula> {
        Box::new(self.clone())
    }

    fn as_formula2(&self) -> Option<&dyn Formula2> {
        Some(self)
    }

    fn as_percentage(&self) -> Option<&dyn PercentageFormula> {
        if A::PERCENTAGE {
            Some(self)
        } else {
            None
        }
    }

    fn as_percentage_mut(&mut self) -> Option<&mut dyn PercentageFormula> {
        if A::PERCENTAGE {
            Some(self)
        } else {
            None
        }
    }
}

impl<A: PairAccumulator> Formula2 for Paired<A> {
    fn secondary_columns(&self) -> &[usize] {
        &self.secondary
    }
}

impl<A: PairAccumulator> PercentageFormula for Paired<A> {
    fn percentage_type(&self) -> PercentageType {
        self.percentage.kind
    }

    fn set_percentage_type(&mut self, kind: PercentageType) {
        self.percentage.kind = kind;
    }

    fn set_total(&mut self, total: f64) {
        self.percentage.total = Some(total);
    }

    fn total(&self) -> Option<f64> {
        self.percentage.total
    }
}
