//! Counting, summing and extreme-value formulas.

use super::{Accumulator, Aggregate};
use crate::value::{parse_number, CellValue};
use rustc_hash::FxHashSet;
use std::cmp::Ordering;

pub type SumFormula = Aggregate<Sum>;
pub type CountFormula = Aggregate<Count>;
pub type DistinctCountFormula = Aggregate<DistinctCount>;
pub type AverageFormula = Aggregate<Average>;
pub type MaxFormula = Aggregate<Max>;
pub type MinFormula = Aggregate<Min>;
pub type ProductFormula = Aggregate<Product>;
pub type ConcatFormula = Aggregate<Concat>;
pub type SumSquaresFormula = Aggregate<SumSquares>;

/// Numeric form of a value for order-based formulas.
///
/// Numbers and dates are kept as they are so dates stay dates; strings that
/// parse become doubles; anything else is skipped.
pub(crate) fn comparable_number(value: &CellValue) -> Option<CellValue> {
    match value {
        CellValue::Int(_) | CellValue::Double(_) | CellValue::Date(_) => Some(value.clone()),
        CellValue::String(s) => parse_number(s).map(CellValue::Double),
        CellValue::Bool(_) => value.to_number().map(CellValue::Double),
        CellValue::Null => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sum {
    sum: f64,
    count: u64,
}

impl Accumulator for Sum {
    const NAME: &'static str = "Sum";

    fn add(&mut self, value: &CellValue) {
        if let Some(v) = value.to_number() {
            self.sum += v;
            self.count += 1;
        }
    }

    fn clear(&mut self) {
        *self = Sum::default();
    }

    fn value(&self) -> Option<CellValue> {
        (self.count > 0).then_some(CellValue::Double(self.sum))
    }
}

/// Counts non-null values of any kind
#[derive(Debug, Clone, Default)]
pub struct Count {
    count: i64,
}

impl Accumulator for Count {
    const NAME: &'static str = "Count";

    fn add(&mut self, _value: &CellValue) {
        self.count += 1;
    }

    fn clear(&mut self) {
        self.count = 0;
    }

    fn value(&self) -> Option<CellValue> {
        (self.count > 0).then_some(CellValue::Int(self.count))
    }

    fn default_value(&self) -> CellValue {
        CellValue::Int(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DistinctCount {
    seen: FxHashSet<CellValue>,
}

impl Accumulator for DistinctCount {
    const NAME: &'static str = "DistinctCount";

    fn add(&mut self, value: &CellValue) {
        if !self.seen.contains(value) {
            self.seen.insert(value.clone());
        }
    }

    fn clear(&mut self) {
        self.seen.clear();
    }

    fn value(&self) -> Option<CellValue> {
        (!self.seen.is_empty()).then(|| CellValue::Int(self.seen.len() as i64))
    }

    fn default_value(&self) -> CellValue {
        CellValue::Int(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Average {
    sum: f64,
    count: u64,
}

impl Accumulator for Average {
    const NAME: &'static str = "Average";

    fn add(&mut self, value: &CellValue) {
        if let Some(v) = value.to_number() {
            self.sum += v;
            self.count += 1;
        }
    }

    fn clear(&mut self) {
        *self = Average::default();
    }

    fn value(&self) -> Option<CellValue> {
        (self.count > 0).then(|| CellValue::Double(self.sum / self.count as f64))
    }
}

fn keep_extreme(best: &mut Option<CellValue>, value: &CellValue, wanted: Ordering) {
    let Some(candidate) = comparable_number(value) else {
        return;
    };
    match best {
        Some(current) if candidate.compare(current) != wanted => {}
        _ => *best = Some(candidate),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Max {
    best: Option<CellValue>,
}

impl Accumulator for Max {
    const NAME: &'static str = "Max";

    fn add(&mut self, value: &CellValue) {
        keep_extreme(&mut self.best, value, Ordering::Greater);
    }

    fn clear(&mut self) {
        self.best = None;
    }

    fn value(&self) -> Option<CellValue> {
        self.best.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Min {
    best: Option<CellValue>,
}

impl Accumulator for Min {
    const NAME: &'static str = "Min";

    fn add(&mut self, value: &CellValue) {
        keep_extreme(&mut self.best, value, Ordering::Less);
    }

    fn clear(&mut self) {
        self.best = None;
    }

    fn value(&self) -> Option<CellValue> {
        self.best.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Product {
    product: Option<f64>,
}

impl Accumulator for Product {
    const NAME: &'static str = "Product";

    fn add(&mut self, value: &CellValue) {
        if let Some(v) = value.to_number() {
            self.product = Some(self.product.map_or(v, |p| p * v));
        }
    }

    fn clear(&mut self) {
        self.product = None;
    }

    fn value(&self) -> Option<CellValue> {
        self.product.map(CellValue::Double)
    }
}

/// Joins the text of every value with `", "`
#[derive(Debug, Clone, Default)]
pub struct Concat {
    parts: Vec<String>,
}

impl Accumulator for Concat {
    const NAME: &'static str = "Concat";
    const PERCENTAGE: bool = false;

    fn add(&mut self, value: &CellValue) {
        self.parts.push(value.to_string());
    }

    fn clear(&mut self) {
        self.parts.clear();
    }

    fn value(&self) -> Option<CellValue> {
        (!self.parts.is_empty()).then(|| CellValue::String(self.parts.join(", ")))
    }

    fn default_value(&self) -> CellValue {
        CellValue::String(String::new())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SumSquares {
    sum: f64,
    count: u64,
}

impl Accumulator for SumSquares {
    const NAME: &'static str = "SumSquares";

    fn add(&mut self, value: &CellValue) {
        if let Some(v) = value.to_number() {
            self.sum += v * v;
            self.count += 1;
        }
    }

    fn clear(&mut self) {
        *self = SumSquares::default();
    }

    fn value(&self) -> Option<CellValue> {
        (self.count > 0).then_some(CellValue::Double(self.sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Formula, NULL_DOUBLE, NULL_INTEGER, NULL_LONG};

    #[test]
    fn test_sum_identity() {
        let mut sum = SumFormula::new();
        sum.add_double(100.0);
        sum.reset();
        for x in [1, 2, 3] {
            sum.add_value(&CellValue::Int(x));
        }
        assert_eq!(sum.double_result(), Some(6.0));
    }

    #[test]
    fn test_count_ignores_null_sentinels() {
        let mut count = CountFormula::new();
        count.add_value(&CellValue::from("a"));
        count.add_double(NULL_DOUBLE);
        count.add_long(NULL_LONG);
        count.add_int(NULL_INTEGER);
        count.add_value(&CellValue::Null);
        count.add_value(&CellValue::Double(NULL_DOUBLE));
        assert_eq!(count.result(), Some(CellValue::Int(1)));
    }

    #[test]
    fn test_average_default_result() {
        let mut avg = AverageFormula::new();
        avg.set_default_result(false);
        assert_eq!(avg.result(), None);
        assert!(avg.is_null());

        avg.set_default_result(true);
        assert_eq!(avg.result(), Some(CellValue::Double(0.0)));
        assert!(avg.is_default_result());
    }

    #[test]
    fn test_numeric_formulas_skip_unparsable_strings() {
        let mut avg = AverageFormula::new();
        for v in ["10", "abc", " 20 ", ""] {
            avg.add_value(&CellValue::from(v));
        }
        assert_eq!(avg.double_result(), Some(15.0));

        let mut max = MaxFormula::new();
        for v in ["3", "x", "12", "1,000"] {
            max.add_value(&CellValue::from(v));
        }
        assert_eq!(max.double_result(), Some(1000.0));
    }

    #[test]
    fn test_min_max_keep_dates() {
        let mut min = MinFormula::new();
        min.add_value(&CellValue::Date(300));
        min.add_value(&CellValue::Date(100));
        min.add_value(&CellValue::Date(200));
        assert_eq!(min.result(), Some(CellValue::Date(100)));
    }

    #[test]
    fn test_distinct_count_and_product() {
        let mut distinct = DistinctCountFormula::new();
        for v in ["a", "b", "a", "c", "b"] {
            distinct.add_value(&CellValue::from(v));
        }
        assert_eq!(distinct.result(), Some(CellValue::Int(3)));

        let mut product = ProductFormula::new();
        product.add_int(2);
        product.add_double(2.5);
        product.add_value(&CellValue::from("nope"));
        assert_eq!(product.double_result(), Some(5.0));
    }

    #[test]
    fn test_concat_and_sum_squares() {
        let mut concat = ConcatFormula::new();
        concat.add_value(&CellValue::from("x"));
        concat.add_value(&CellValue::Int(2));
        assert_eq!(concat.result(), Some(CellValue::from("x, 2")));
        assert!(concat.as_percentage().is_none());

        let mut squares = SumSquaresFormula::new();
        squares.add_int(3);
        squares.add_int(4);
        assert_eq!(squares.double_result(), Some(25.0));
    }
}
