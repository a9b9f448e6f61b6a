//! Row outcomes and the building blocks entity validators are made of.

use crate::persistence::NewRecord;
use crate::table::{CellValue, RawRow};

/// Separator used when a row's reasons are shown as one string.
pub const REASON_SEPARATOR: &str = "; ";

/// Preview evaluates every rule; commit stops at the first failing one.
/// Both modes report the same first reason for a given row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Exhaustive,
    FirstError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Accepted { row: RawRow, record: NewRecord },
    Rejected { row: RawRow, reasons: Vec<String> },
}

impl RowOutcome {
    pub fn row(&self) -> &RawRow {
        match self {
            RowOutcome::Accepted { row, .. } | RowOutcome::Rejected { row, .. } => row,
        }
    }

    pub fn row_number(&self) -> usize {
        self.row().number
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, RowOutcome::Accepted { .. })
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            RowOutcome::Accepted { .. } => &[],
            RowOutcome::Rejected { reasons, .. } => reasons,
        }
    }

    /// Reasons joined for display, in validation order.
    pub fn message(&self) -> String {
        self.reasons().join(REASON_SEPARATOR)
    }
}

/// Rejection reasons for one row.
#[derive(Debug)]
pub struct Reasons {
    mode: ValidationMode,
    list: Vec<String>,
}

impl Reasons {
    pub fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            list: Vec::new(),
        }
    }

    pub fn push(&mut self, reason: impl Into<String>) {
        if !self.done() {
            self.list.push(reason.into());
        }
    }

    /// True once nothing more needs to be checked for this row.
    pub fn done(&self) -> bool {
        self.mode == ValidationMode::FirstError && !self.list.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.list
    }
}

/// Result of checking an optional non-negative numeric cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberCheck<T> {
    Absent,
    Value(T),
    Invalid,
    Negative,
}

impl<T: Default> NumberCheck<T> {
    /// The checked value, with absent cells defaulting to zero.
    pub fn value_or_default(self) -> Option<T> {
        match self {
            NumberCheck::Absent => Some(T::default()),
            NumberCheck::Value(v) => Some(v),
            NumberCheck::Invalid | NumberCheck::Negative => None,
        }
    }
}

fn cell_as_f64(cell: &CellValue) -> Option<f64> {
    let value = match cell {
        CellValue::Int(i) => *i as f64,
        CellValue::Float(f) => *f,
        CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
        CellValue::Empty | CellValue::Bool(_) => return None,
    };
    value.is_finite().then_some(value)
}

/// Optional decimal: blank is absent, otherwise a finite float >= 0.
pub fn non_negative_decimal(cell: Option<&CellValue>) -> NumberCheck<f64> {
    let Some(cell) = cell.filter(|c| !c.is_blank()) else {
        return NumberCheck::Absent;
    };
    match cell_as_f64(cell) {
        None => NumberCheck::Invalid,
        Some(v) if v < 0.0 => NumberCheck::Negative,
        Some(v) => NumberCheck::Value(v),
    }
}

/// Optional integer: parsed as a float then truncated toward zero ("5.0" -> 5).
pub fn non_negative_integer(cell: Option<&CellValue>) -> NumberCheck<i32> {
    let Some(cell) = cell.filter(|c| !c.is_blank()) else {
        return NumberCheck::Absent;
    };
    let Some(truncated) = cell_as_f64(cell).map(f64::trunc) else {
        return NumberCheck::Invalid;
    };
    if truncated < i32::MIN as f64 || truncated > i32::MAX as f64 {
        return NumberCheck::Invalid;
    }
    if truncated < 0.0 {
        NumberCheck::Negative
    } else {
        NumberCheck::Value(truncated as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_first_error_mode_keeps_only_first() {
        let mut reasons = Reasons::new(ValidationMode::FirstError);
        reasons.push("a");
        assert!(reasons.done());
        reasons.push("b");
        assert_eq!(reasons.into_vec(), vec!["a"]);
    }

    #[test]
    fn test_exhaustive_mode_keeps_all() {
        let mut reasons = Reasons::new(ValidationMode::Exhaustive);
        reasons.push("a");
        reasons.push("b");
        assert!(!reasons.done());
        assert_eq!(reasons.into_vec(), vec!["a", "b"]);
    }

    #[test]
    fn test_decimal_absent() {
        assert_eq!(non_negative_decimal(None), NumberCheck::Absent);
        assert_eq!(non_negative_decimal(Some(&CellValue::Empty)), NumberCheck::Absent);
        assert_eq!(non_negative_decimal(Some(&text("   "))), NumberCheck::Absent);
    }

    #[test]
    fn test_decimal_values() {
        assert_eq!(non_negative_decimal(Some(&text("100"))), NumberCheck::Value(100.0));
        assert_eq!(non_negative_decimal(Some(&text(" 15.5 "))), NumberCheck::Value(15.5));
        assert_eq!(non_negative_decimal(Some(&CellValue::Int(3))), NumberCheck::Value(3.0));
        assert_eq!(non_negative_decimal(Some(&text("0"))), NumberCheck::Value(0.0));
    }

    #[test]
    fn test_decimal_rejections() {
        assert_eq!(non_negative_decimal(Some(&text("-50"))), NumberCheck::Negative);
        assert_eq!(non_negative_decimal(Some(&text("abc"))), NumberCheck::Invalid);
        assert_eq!(non_negative_decimal(Some(&text("inf"))), NumberCheck::Invalid);
        assert_eq!(non_negative_decimal(Some(&text("NaN"))), NumberCheck::Invalid);
        assert_eq!(non_negative_decimal(Some(&CellValue::Bool(true))), NumberCheck::Invalid);
    }

    #[test]
    fn test_integer_truncates() {
        assert_eq!(non_negative_integer(Some(&text("5.0"))), NumberCheck::Value(5));
        assert_eq!(non_negative_integer(Some(&text("7.9"))), NumberCheck::Value(7));
        assert_eq!(non_negative_integer(Some(&CellValue::Float(10.0))), NumberCheck::Value(10));
        // -0.5 truncates to zero, which is not negative
        assert_eq!(non_negative_integer(Some(&text("-0.5"))), NumberCheck::Value(0));
    }

    #[test]
    fn test_integer_rejections() {
        assert_eq!(non_negative_integer(Some(&text("-3"))), NumberCheck::Negative);
        assert_eq!(non_negative_integer(Some(&text("diez"))), NumberCheck::Invalid);
        assert_eq!(non_negative_integer(Some(&text("1e12"))), NumberCheck::Invalid);
    }

    #[test]
    fn test_value_or_default() {
        assert_eq!(NumberCheck::<f64>::Absent.value_or_default(), Some(0.0));
        assert_eq!(NumberCheck::Value(4).value_or_default(), Some(4));
        assert_eq!(NumberCheck::<i32>::Invalid.value_or_default(), None);
    }
}
