//! Cell values flowing through table lenses.
//!
//! A `CellValue` is the dynamically-typed content of one table cell. Lenses never
//! coerce values on the way through; coercion happens at the edges (condition
//! comparison, formula accumulation) through `to_number` and `compare`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Cell value enum to support multiple types
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    /// Days since 1970-01-01
    Date(i32),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Best-effort numeric view of the value.
    ///
    /// Strings are trimmed and thousands separators dropped before parsing;
    /// anything that still does not parse yields `None`.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            CellValue::Null => None,
            CellValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Double(v) => {
                if v.is_nan() {
                    None
                } else {
                    Some(*v)
                }
            }
            CellValue::Date(v) => Some(*v as f64),
            CellValue::String(s) => parse_number(s),
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Int(_) | CellValue::Double(_) | CellValue::Date(_))
    }

    fn kind_rank(&self) -> u8 {
        match self {
            CellValue::Null => 0,
            CellValue::Bool(_) => 1,
            CellValue::Int(_) | CellValue::Double(_) | CellValue::Date(_) => 2,
            CellValue::String(_) => 3,
        }
    }

    /// Total order used by sorting, tuple ordering and condition comparison.
    ///
    /// Nulls sort first. Numbers (including dates) compare numerically across
    /// representations. A numeric value compared against a string that parses
    /// as a number compares numerically; otherwise values of different kinds
    /// order by kind.
    pub fn compare(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::Null, CellValue::Null) => Ordering::Equal,
            (CellValue::Null, _) => Ordering::Less,
            (_, CellValue::Null) => Ordering::Greater,
            (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
            (CellValue::Int(a), CellValue::Int(b)) => a.cmp(b),
            (CellValue::Date(a), CellValue::Date(b)) => a.cmp(b),
            (CellValue::String(a), CellValue::String(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => cmp_f64(a.to_number(), b.to_number()),
            (a, CellValue::String(s)) if a.is_numeric() => match parse_number(s) {
                Some(n) => cmp_f64(a.to_number(), Some(n)),
                None => a.kind_rank().cmp(&other.kind_rank()),
            },
            (CellValue::String(s), b) if b.is_numeric() => match parse_number(s) {
                Some(n) => cmp_f64(Some(n), b.to_number()),
                None => self.kind_rank().cmp(&b.kind_rank()),
            },
            (a, b) => a.kind_rank().cmp(&b.kind_rank()),
        }
    }

    /// Loose equality: numeric values are equal when their numbers are equal.
    pub fn loose_eq(&self, other: &CellValue) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

fn cmp_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}

/// Parse a number leniently: surrounding whitespace and `,` grouping are ignored.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        return if v.is_nan() { None } else { Some(v) };
    }
    if trimmed.contains(',') {
        let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
        return cleaned.parse::<f64>().ok().filter(|v| !v.is_nan());
    }
    None
}

fn normalized_bits(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellValue::Null, CellValue::Null) => true,
            (CellValue::Bool(a), CellValue::Bool(b)) => a == b,
            (CellValue::Int(a), CellValue::Int(b)) => a == b,
            (CellValue::Double(a), CellValue::Double(b)) => normalized_bits(*a) == normalized_bits(*b),
            (CellValue::String(a), CellValue::String(b)) => a == b,
            (CellValue::Date(a), CellValue::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for CellValue {}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Null => {}
            CellValue::Bool(v) => v.hash(state),
            CellValue::Int(v) => v.hash(state),
            CellValue::Double(v) => normalized_bits(*v).hash(state),
            CellValue::String(v) => v.hash(state),
            CellValue::Date(v) => v.hash(state),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(v) => write!(f, "{}", v),
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::Double(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{}", *v as i64)
                } else {
                    write!(f, "{}", v)
                }
            }
            CellValue::String(v) => f.write_str(v),
            CellValue::Date(days) => {
                let (y, m, d) = ymd_from_days(*days);
                write!(f, "{:04}-{:02}-{:02}", y, m, d)
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::String(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::String(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Int(v as i64)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Double(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Days since epoch for a civil date (proleptic Gregorian).
pub fn days_from_ymd(year: i32, month: u32, day: u32) -> i32 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u32;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe as i32 - 719_468
}

/// Inverse of `days_from_ymd`.
pub fn ymd_from_days(days: i32) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i32 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_to_number_best_effort() {
        assert_eq!(CellValue::from("  42 ").to_number(), Some(42.0));
        assert_eq!(CellValue::from("1,250.5").to_number(), Some(1250.5));
        assert_eq!(CellValue::from("abc").to_number(), None);
        assert_eq!(CellValue::Bool(true).to_number(), Some(1.0));
        assert_eq!(CellValue::Null.to_number(), None);
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(CellValue::Int(2).compare(&CellValue::Double(2.0)), Ordering::Equal);
        assert_eq!(CellValue::Int(2).compare(&CellValue::from("10")), Ordering::Less);
        assert_eq!(CellValue::Null.compare(&CellValue::Int(-5)), Ordering::Less);
        assert_eq!(CellValue::from("b").compare(&CellValue::from("a")), Ordering::Greater);
    }

    #[test]
    fn test_hash_normalizes_zero() {
        let mut set = HashSet::new();
        set.insert(CellValue::Double(0.0));
        assert!(set.contains(&CellValue::Double(-0.0)));
        assert!(!set.contains(&CellValue::Int(0)));
    }

    #[test]
    fn test_date_round_trip_and_display() {
        let days = days_from_ymd(2024, 2, 29);
        assert_eq!(ymd_from_days(days), (2024, 2, 29));
        assert_eq!(CellValue::Date(days).to_string(), "2024-02-29");
        assert_eq!(days_from_ymd(1970, 1, 1), 0);
    }

    #[test]
    fn test_deserialize_untagged() {
        let values: Vec<CellValue> = serde_json::from_str(r#"[null, true, 3, 2.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                CellValue::Null,
                CellValue::Bool(true),
                CellValue::Int(3),
                CellValue::Double(2.5),
                CellValue::from("x"),
            ]
        );
    }
}
