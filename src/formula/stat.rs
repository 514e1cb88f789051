//! Order statistics, frequency and dispersion formulas.

use super::basic::comparable_number;
use super::{Accumulator, Aggregate};
use crate::value::CellValue;
use rustc_hash::FxHashMap;

pub type MedianFormula = Aggregate<Median>;
pub type ModeFormula = Aggregate<Mode>;
pub type PercentileFormula = Aggregate<Percentile>;
pub type NthLargestFormula = Aggregate<NthLargest>;
pub type NthSmallestFormula = Aggregate<NthSmallest>;
pub type NthMostFrequentFormula = Aggregate<NthMostFrequent>;
pub type VarianceFormula = Aggregate<Spread<true, false>>;
pub type PopulationVarianceFormula = Aggregate<Spread<false, false>>;
pub type StandardDeviationFormula = Aggregate<Spread<true, true>>;
pub type PopulationStandardDeviationFormula = Aggregate<Spread<false, true>>;

/// Linear-interpolation percentile of sorted values; `percentile` is in [0, 100].
pub fn percentile_sorted(sorted: &[f64], percentile: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    if percentile <= 0.0 {
        return Some(sorted[0]);
    }
    if percentile >= 100.0 {
        return Some(sorted[sorted.len() - 1]);
    }

    let rank = (percentile / 100.0) * (sorted.len() as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        Some(sorted[lo])
    } else {
        let w = rank - lo as f64;
        Some(sorted[lo] + (sorted[hi] - sorted[lo]) * w)
    }
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

#[derive(Debug, Clone, Default)]
pub struct Median {
    values: Vec<f64>,
}

impl Accumulator for Median {
    const NAME: &'static str = "Median";

    fn add(&mut self, value: &CellValue) {
        if let Some(v) = value.to_number() {
            self.values.push(v);
        }
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn value(&self) -> Option<CellValue> {
        percentile_sorted(&sorted_copy(&self.values), 50.0).map(CellValue::Double)
    }
}

#[derive(Debug, Clone)]
pub struct Percentile {
    p: f64,
    values: Vec<f64>,
}

impl Percentile {
    /// `p` is a percentage in [0, 100]
    pub fn new(p: f64) -> Self {
        Percentile {
            p,
            values: Vec::new(),
        }
    }

    pub fn p(&self) -> f64 {
        self.p
    }
}

impl Accumulator for Percentile {
    const NAME: &'static str = "Percentile";

    fn add(&mut self, value: &CellValue) {
        if let Some(v) = value.to_number() {
            self.values.push(v);
        }
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn value(&self) -> Option<CellValue> {
        percentile_sorted(&sorted_copy(&self.values), self.p).map(CellValue::Double)
    }

    fn display_name(&self) -> String {
        format!("{}({})", Self::NAME, CellValue::Double(self.p))
    }
}

impl PercentileFormula {
    pub fn with_percentile(p: f64) -> Self {
        Self::from_accumulator(Percentile::new(p))
    }
}

/// Values in first-seen order with their frequencies
#[derive(Debug, Clone, Default)]
struct Frequencies {
    counts: FxHashMap<CellValue, usize>,
    order: Vec<CellValue>,
}

impl Frequencies {
    fn add(&mut self, value: &CellValue) {
        match self.counts.get_mut(value) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(value.clone(), 1);
                self.order.push(value.clone());
            }
        }
    }

    fn clear(&mut self) {
        self.counts.clear();
        self.order.clear();
    }

    /// Values by descending frequency; ties keep first-seen order
    fn ranked(&self) -> Vec<&CellValue> {
        let mut ranked: Vec<&CellValue> = self.order.iter().collect();
        ranked.sort_by_key(|v| std::cmp::Reverse(self.counts.get(*v).copied().unwrap_or(0)));
        ranked
    }
}

/// Most frequent value; ties go to the value seen first
#[derive(Debug, Clone, Default)]
pub struct Mode {
    freq: Frequencies,
}

impl Accumulator for Mode {
    const NAME: &'static str = "Mode";
    const PERCENTAGE: bool = false;

    fn add(&mut self, value: &CellValue) {
        self.freq.add(value);
    }

    fn clear(&mut self) {
        self.freq.clear();
    }

    fn value(&self) -> Option<CellValue> {
        self.freq.ranked().first().map(|v| (*v).clone())
    }
}

/// n-th most frequent value, 1-based
#[derive(Debug, Clone)]
pub struct NthMostFrequent {
    n: usize,
    freq: Frequencies,
}

impl NthMostFrequent {
    pub fn new(n: usize) -> Self {
        NthMostFrequent {
            n,
            freq: Frequencies::default(),
        }
    }
}

impl Accumulator for NthMostFrequent {
    const NAME: &'static str = "NthMostFrequent";
    const PERCENTAGE: bool = false;

    fn add(&mut self, value: &CellValue) {
        self.freq.add(value);
    }

    fn clear(&mut self) {
        self.freq.clear();
    }

    fn value(&self) -> Option<CellValue> {
        let index = self.n.checked_sub(1)?;
        self.freq.ranked().get(index).map(|v| (*v).clone())
    }

    fn display_name(&self) -> String {
        format!("{}({})", Self::NAME, self.n)
    }
}

impl NthMostFrequentFormula {
    pub fn with_n(n: usize) -> Self {
        Self::from_accumulator(NthMostFrequent::new(n))
    }
}

/// n-th largest value, 1-based; duplicates occupy separate ranks
#[derive(Debug, Clone)]
pub struct NthLargest {
    n: usize,
    values: Vec<CellValue>,
}

impl NthLargest {
    pub fn new(n: usize) -> Self {
        NthLargest {
            n,
            values: Vec::new(),
        }
    }
}

impl Accumulator for NthLargest {
    const NAME: &'static str = "NthLargest";

    fn add(&mut self, value: &CellValue) {
        if let Some(v) = comparable_number(value) {
            self.values.push(v);
        }
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn value(&self) -> Option<CellValue> {
        let index = self.n.checked_sub(1)?;
        let mut sorted: Vec<&CellValue> = self.values.iter().collect();
        sorted.sort_by(|a, b| b.compare(a));
        sorted.get(index).map(|v| (*v).clone())
    }

    fn display_name(&self) -> String {
        format!("{}({})", Self::NAME, self.n)
    }
}

impl NthLargestFormula {
    pub fn with_n(n: usize) -> Self {
        Self::from_accumulator(NthLargest::new(n))
    }
}

/// n-th smallest value, 1-based; duplicates occupy separate ranks
#[derive(Debug, Clone)]
pub struct NthSmallest {
    n: usize,
    values: Vec<CellValue>,
}

impl NthSmallest {
    pub fn new(n: usize) -> Self {
        NthSmallest {
            n,
            values: Vec::new(),
        }
    }
}

impl Accumulator for NthSmallest {
    const NAME: &'static str = "NthSmallest";

    fn add(&mut self, value: &CellValue) {
        if let Some(v) = comparable_number(value) {
            self.values.push(v);
        }
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn value(&self) -> Option<CellValue> {
        let index = self.n.checked_sub(1)?;
        let mut sorted: Vec<&CellValue> = self.values.iter().collect();
        sorted.sort_by(|a, b| a.compare(b));
        sorted.get(index).map(|v| (*v).clone())
    }

    fn display_name(&self) -> String {
        format!("{}({})", Self::NAME, self.n)
    }
}

impl NthSmallestFormula {
    pub fn with_n(n: usize) -> Self {
        Self::from_accumulator(NthSmallest::new(n))
    }
}

/// Variance and standard deviation using Welford's algorithm.
///
/// `SAMPLE` divides by n - 1 (and needs two values), otherwise by n.
/// `ROOT` takes the square root of the variance.
#[derive(Debug, Clone, Default)]
pub struct Spread<const SAMPLE: bool, const ROOT: bool> {
    count: u64,
    mean: f64,
    m2: f64,
}

impl<const SAMPLE: bool, const ROOT: bool> Accumulator for Spread<SAMPLE, ROOT> {
    const NAME: &'static str = match (SAMPLE, ROOT) {
        (true, false) => "Variance",
        (false, false) => "PopulationVariance",
        (true, true) => "StandardDeviation",
        (false, true) => "PopulationStandardDeviation",
    };

    fn add(&mut self, value: &CellValue) {
        let Some(v) = value.to_number() else {
            return;
        };
        self.count += 1;
        let delta = v - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = v - self.mean;
        self.m2 += delta * delta2;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn value(&self) -> Option<CellValue> {
        let divisor = if SAMPLE {
            self.count.checked_sub(1)?
        } else {
            self.count
        };
        if divisor == 0 {
            return None;
        }
        let variance = self.m2 / divisor as f64;
        Some(CellValue::Double(if ROOT { variance.sqrt() } else { variance }))
    }
}
