//! Formulas over a primary column paired with a secondary column.

use super::basic::comparable_number;
use super::{PairAccumulator, Paired};
use crate::value::CellValue;

pub type CorrelationFormula = Paired<Correlation>;
pub type CovarianceFormula = Paired<Covariance>;
pub type WeightedAverageFormula = Paired<WeightedAverage>;
pub type FirstFormula = Paired<First>;
pub type LastFormula = Paired<Last>;

fn both_numbers(x: &CellValue, y: &CellValue) -> Option<(f64, f64)> {
    Some((x.to_number()?, y.to_number()?))
}

/// Running co-moments of (x, y) pairs
#[derive(Debug, Clone, Default)]
struct CoMoments {
    count: u64,
    mean_x: f64,
    mean_y: f64,
    m2_x: f64,
    m2_y: f64,
    c_xy: f64,
}

impl CoMoments {
    fn add(&mut self, x: f64, y: f64) {
        self.count += 1;
        let n = self.count as f64;
        let dx = x - self.mean_x;
        self.mean_x += dx / n;
        let dy = y - self.mean_y;
        self.mean_y += dy / n;
        self.m2_x += dx * (x - self.mean_x);
        self.m2_y += dy * (y - self.mean_y);
        self.c_xy += dx * (y - self.mean_y);
    }
}

/// Pearson correlation of primary against secondary
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    moments: CoMoments,
}

impl PairAccumulator for Correlation {
    const NAME: &'static str = "Correlation";

    fn add(&mut self, primary: &CellValue, secondary: &CellValue) {
        if let Some((x, y)) = both_numbers(primary, secondary) {
            self.moments.add(x, y);
        }
    }

    fn clear(&mut self) {
        self.moments = CoMoments::default();
    }

    fn value(&self) -> Option<CellValue> {
        let m = &self.moments;
        if m.count < 2 {
            return None;
        }
        let denom = (m.m2_x * m.m2_y).sqrt();
        if denom == 0.0 {
            return None;
        }
        Some(CellValue::Double(m.c_xy / denom))
    }
}

/// Population covariance of primary and secondary
#[derive(Debug, Clone, Default)]
pub struct Covariance {
    moments: CoMoments,
}

impl PairAccumulator for Covariance {
    const NAME: &'static str = "Covariance";

    fn add(&mut self, primary: &CellValue, secondary: &CellValue) {
        if let Some((x, y)) = both_numbers(primary, secondary) {
            self.moments.add(x, y);
        }
    }

    fn clear(&mut self) {
        self.moments = CoMoments::default();
    }

    fn value(&self) -> Option<CellValue> {
        let m = &self.moments;
        (m.count > 0).then(|| CellValue::Double(m.c_xy / m.count as f64))
    }
}

/// Average of primary values weighted by the secondary column
#[derive(Debug, Clone, Default)]
pub struct WeightedAverage {
    weighted: f64,
    weights: f64,
    count: u64,
}

impl PairAccumulator for WeightedAverage {
    const NAME: &'static str = "WeightedAverage";

    fn add(&mut self, primary: &CellValue, secondary: &CellValue) {
        if let Some((v, w)) = both_numbers(primary, secondary) {
            self.weighted += v * w;
            self.weights += w;
            self.count += 1;
        }
    }

    fn clear(&mut self) {
        *self = WeightedAverage::default();
    }

    fn value(&self) -> Option<CellValue> {
        if self.count == 0 || self.weights == 0.0 {
            return None;
        }
        Some(CellValue::Double(self.weighted / self.weights))
    }
}

/// Keeps the primary value whose ordering key wins; ties keep the earlier value
fn keep_ordered(
    slot: &mut Option<(CellValue, CellValue)>,
    primary: &CellValue,
    key: &CellValue,
    wanted: std::cmp::Ordering,
) {
    let Some(key) = comparable_number(key).or_else(|| (!key.is_null()).then(|| key.clone())) else {
        return;
    };
    match slot {
        Some((_, current)) if key.compare(current) != wanted => {}
        _ => *slot = Some((primary.clone(), key)),
    }
}

/// Primary value at the smallest secondary (ordering) value
#[derive(Debug, Clone, Default)]
pub struct First {
    best: Option<(CellValue, CellValue)>,
}

impl PairAccumulator for First {
    const NAME: &'static str = "First";
    const PERCENTAGE: bool = false;

    fn add(&mut self, primary: &CellValue, secondary: &CellValue) {
        keep_ordered(&mut self.best, primary, secondary, std::cmp::Ordering::Less);
    }

    fn clear(&mut self) {
        self.best = None;
    }

    fn value(&self) -> Option<CellValue> {
        self.best.as_ref().map(|(v, _)| v.clone())
    }
}

/// Primary value at the largest secondary (ordering) value
#[derive(Debug, Clone, Default)]
pub struct Last {
    best: Option<(CellValue, CellValue)>,
}

impl PairAccumulator for Last {
    const NAME: &'static str = "Last";
    const PERCENTAGE: bool = false;

    fn add(&mut self, primary: &CellValue, secondary: &CellValue) {
        keep_ordered(&mut self.best, primary, secondary, std::cmp::Ordering::Greater);
    }

    fn clear(&mut self) {
        self.best = None;
    }

    fn value(&self) -> Option<CellValue> {
        self.best.as_ref().map(|(v, _)| v.clone())
    }
}
