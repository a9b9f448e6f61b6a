//! Commit summaries and the human-readable status line.

use serde::ser::Serializer;
use serde::Serialize;

use crate::table::RawRow;

/// Row reference in reports: a row number, `"-"` for accepted rows in a
/// preview, or `"N/A"` for errors not tied to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowMarker {
    Row(usize),
    Accepted,
    NotApplicable,
}

impl Serialize for RowMarker {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowMarker::Row(n) => serializer.serialize_u64(*n as u64),
            RowMarker::Accepted => serializer.serialize_str("-"),
            RowMarker::NotApplicable => serializer.serialize_str("N/A"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub total_rows: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped_duplicates: usize,
    pub errored: usize,
}

impl CommitSummary {
    /// created + updated + skipped + errored must account for every row.
    pub fn is_balanced(&self) -> bool {
        self.created + self.updated + self.skipped_duplicates + self.errored == self.total_rows
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub row: RowMarker,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<RawRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReport {
    pub summary: CommitSummary,
    pub errors: Vec<RowError>,
    pub message: String,
}

impl CommitReport {
    pub fn new(noun: &str, summary: CommitSummary, errors: Vec<RowError>) -> Self {
        Self {
            message: summary_message(noun, &summary),
            summary,
            errors,
        }
    }
}

pub fn summary_message(noun: &str, summary: &CommitSummary) -> String {
    match (summary.created > 0, summary.errored > 0) {
        (true, true) => format!(
            "Created {} {}. Found {} errors.",
            summary.created, noun, summary.errored
        ),
        (true, false) => format!("Created {} {} successfully.", summary.created, noun),
        (false, true) => format!(
            "No {} could be loaded. {} errors found.",
            noun, summary.errored
        ),
        (false, false) => "No valid data found to process.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(total: usize, created: usize, errored: usize) -> CommitSummary {
        CommitSummary {
            total_rows: total,
            created,
            errored,
            ..Default::default()
        }
    }

    #[test]
    fn test_message_templates() {
        assert_eq!(
            summary_message("products", &summary(3, 2, 1)),
            "Created 2 products. Found 1 errors."
        );
        assert_eq!(
            summary_message("products", &summary(2, 2, 0)),
            "Created 2 products successfully."
        );
        assert_eq!(
            summary_message("products", &summary(2, 0, 2)),
            "No products could be loaded. 2 errors found."
        );
        assert_eq!(
            summary_message("products", &summary(0, 0, 0)),
            "No valid data found to process."
        );
    }

    #[test]
    fn test_balance() {
        assert!(summary(3, 2, 1).is_balanced());
        assert!(!summary(3, 1, 1).is_balanced());
    }

    #[test]
    fn test_row_marker_serialization() {
        assert_eq!(serde_json::to_string(&RowMarker::Row(4)).unwrap(), "4");
        assert_eq!(serde_json::to_string(&RowMarker::Accepted).unwrap(), r#""-""#);
        assert_eq!(serde_json::to_string(&RowMarker::NotApplicable).unwrap(), r#""N/A""#);
    }

    #[test]
    fn test_synthetic_error_omits_data() {
        let error = RowError {
            row: RowMarker::NotApplicable,
            error: "boom".to_string(),
            data: None,
        };
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"row":"N/A","error":"boom"}"#
        );
    }
}
