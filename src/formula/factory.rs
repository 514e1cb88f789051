//! Formula construction from declarative specs.

use super::basic::{
    AverageFormula, ConcatFormula, CountFormula, DistinctCountFormula, MaxFormula, MinFormula,
    ProductFormula, SumFormula, SumSquaresFormula,
};
use super::pair::{
    CorrelationFormula, CovarianceFormula, FirstFormula, LastFormula, WeightedAverageFormula,
};
use super::stat::{
    MedianFormula, ModeFormula, NthLargestFormula, NthMostFrequentFormula, NthSmallestFormula,
    PercentileFormula, PopulationStandardDeviationFormula, PopulationVarianceFormula,
    StandardDeviationFormula, VarianceFormula,
};
use super::{Formula, PercentageType};
use crate::error::{LensError, Result};
use serde::{Deserialize, Serialize};

/// Declarative formula definition.
///
/// ```
/// use tablelens::formula::{create_formula, FormulaSpec};
///
/// let spec: FormulaSpec = serde_json::from_str(r#"{"name": "Percentile", "param": 90}"#).unwrap();
/// let formula = create_formula(&spec).unwrap();
/// assert_eq!(formula.display_name(), "Percentile(90)");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaSpec {
    pub name: String,
    /// Percentile (0-100) or rank n, for the formulas that take one
    #[serde(default)]
    pub param: Option<f64>,
    /// Secondary column for two-column formulas
    #[serde(default)]
    pub secondary: Option<usize>,
    #[serde(default)]
    pub percentage: PercentageType,
    #[serde(default)]
    pub default_result: bool,
}

impl FormulaSpec {
    pub fn new(name: impl Into<String>) -> Self {
        FormulaSpec {
            name: name.into(),
            param: None,
            secondary: None,
            percentage: PercentageType::None,
            default_result: false,
        }
    }

    pub fn with_param(mut self, param: f64) -> Self {
        self.param = Some(param);
        self
    }

    pub fn with_secondary(mut self, col: usize) -> Self {
        self.secondary = Some(col);
        self
    }

    pub fn with_percentage(mut self, kind: PercentageType) -> Self {
        self.percentage = kind;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Single,
    WithParam,
    WithSecondary,
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn arity(name: &str) -> Option<Arity> {
    let arity = match name {
        "sum" | "count" | "distinctcount" | "average" | "avg" | "max" | "min" | "product"
        | "concat" | "median" | "mode" | "variance" | "populationvariance" | "standarddeviation"
        | "populationstandarddeviation" | "sumsquares" => Arity::Single,
        "percentile" | "nthlargest" | "nthsmallest" | "nthmostfrequent" => Arity::WithParam,
        "correlation" | "covariance" | "weightedaverage" | "first" | "last" => {
            Arity::WithSecondary
        }
        _ => return None,
    };
    Some(arity)
}

fn rank(spec: &FormulaSpec) -> Result<usize> {
    match spec.param {
        Some(n) if n >= 1.0 && n.fract() == 0.0 => Ok(n as usize),
        other => Err(LensError::FormulaConstruction(format!(
            "{} needs a positive whole rank, got {:?}",
            spec.name, other
        ))),
    }
}

/// Build a formula, validating its name and arguments.
pub fn create_formula(spec: &FormulaSpec) -> Result<Box<dyn Formula>> {
    let key = normalize(&spec.name);
    let arity = arity(&key).ok_or_else(|| LensError::UnknownFormula(spec.name.clone()))?;

    if arity == Arity::WithSecondary && spec.secondary.is_none() {
        return Err(LensError::FormulaConstruction(format!(
            "{} needs a secondary column",
            spec.name
        )));
    }
    if arity != Arity::WithSecondary && spec.secondary.is_some() {
        return Err(LensError::FormulaConstruction(format!(
            "{} does not take a secondary column",
            spec.name
        )));
    }
    if arity != Arity::WithParam && spec.param.is_some() {
        return Err(LensError::FormulaConstruction(format!(
            "{} does not take a parameter",
            spec.name
        )));
    }

    let secondary = spec.secondary.unwrap_or_default();
    let mut formula: Box<dyn Formula> = match key.as_str() {
        "sum" => Box::new(SumFormula::new()),
        "count" => Box::new(CountFormula::new()),
        "distinctcount" => Box::new(DistinctCountFormula::new()),
        "average" | "avg" => Box::new(AverageFormula::new()),
        "max" => Box::new(MaxFormula::new()),
        "min" => Box::new(MinFormula::new()),
        "product" => Box::new(ProductFormula::new()),
        "concat" => Box::new(ConcatFormula::new()),
        "median" => Box::new(MedianFormula::new()),
        "mode" => Box::new(ModeFormula::new()),
        "variance" => Box::new(VarianceFormula::new()),
        "populationvariance" => Box::new(PopulationVarianceFormula::new()),
        "standarddeviation" => Box::new(StandardDeviationFormula::new()),
        "populationstandarddeviation" => Box::new(PopulationStandardDeviationFormula::new()),
        "sumsquares" => Box::new(SumSquaresFormula::new()),
        "percentile" => match spec.param {
            Some(p) if (0.0..=100.0).contains(&p) => Box::new(PercentileFormula::with_percentile(p)),
            other => {
                return Err(LensError::FormulaConstruction(format!(
                    "Percentile needs a percentage in [0, 100], got {:?}",
                    other
                )))
            }
        },
        "nthlargest" => Box::new(NthLargestFormula::with_n(rank(spec)?)),
        "nthsmallest" => Box::new(NthSmallestFormula::with_n(rank(spec)?)),
        "nthmostfrequent" => Box::new(NthMostFrequentFormula::with_n(rank(spec)?)),
        "correlation" => Box::new(CorrelationFormula::new(secondary)),
        "covariance" => Box::new(CovarianceFormula::new(secondary)),
        "weightedaverage" => Box::new(WeightedAverageFormula::new(secondary)),
        "first" => Box::new(FirstFormula::new(secondary)),
        "last" => Box::new(LastFormula::new(secondary)),
        _ => return Err(LensError::UnknownFormula(spec.name.clone())),
    };

    formula.set_default_result(spec.default_result);
    if spec.percentage != PercentageType::None {
        match formula.as_percentage_mut() {
            Some(pct) => pct.set_percentage_type(spec.percentage),
            None => {
                return Err(LensError::FormulaConstruction(format!(
                    "{} does not support percentages",
                    spec.name
                )))
            }
        }
    }

    log::trace!("created formula {}", formula.display_name());
    Ok(formula)
}
