//! Preview and commit passes over one staged file.
//!
//! Both passes parse, normalize columns, build a fresh reference index and
//! validate every row. Preview stops there. Commit collects accepted records,
//! writes them with one bulk insert inside one transaction, and turns any
//! persistence failure into a rolled-back report instead of an error.

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::entity::EntityLoader;
use crate::error::{IngestError, Result};
use crate::persistence::{NewRecord, PersistenceError, PersistenceStore};
use crate::reference::{ReferenceIndex, SeenKeys};
use crate::summary::{CommitReport, CommitSummary, RowError, RowMarker};
use crate::table::{read_table, FileFormat, RawRow, Table};
use crate::validate::{RowOutcome, ValidationMode, REASON_SEPARATOR};

/// One line of a preview, in file order. `error` is empty for accepted rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewRow {
    pub success: bool,
    pub data: RawRow,
    pub row: RowMarker,
    pub error: String,
}

impl From<RowOutcome> for PreviewRow {
    fn from(outcome: RowOutcome) -> Self {
        match outcome {
            RowOutcome::Accepted { row, .. } => PreviewRow {
                success: true,
                data: row,
                row: RowMarker::Accepted,
                error: String::new(),
            },
            RowOutcome::Rejected { row, reasons } => PreviewRow {
                success: false,
                row: RowMarker::Row(row.number),
                error: reasons.join(REASON_SEPARATOR),
                data: row,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub rows: Vec<PreviewRow>,
    pub has_errors: bool,
}

impl Preview {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Parse on the blocking pool; workbook decoding can take a while.
pub async fn parse_off_thread(content: Vec<u8>, filename: String) -> Result<Table> {
    FileFormat::from_filename(&filename)?;
    tokio::task::spawn_blocking(move || read_table(&content, &filename))
        .await
        .map_err(|e| IngestError::Internal(format!("parser task failed: {}", e)))?
}

/// Validate every row exhaustively against an already built index.
pub fn preview_rows(loader: &dyn EntityLoader, rows: Vec<RawRow>, index: &ReferenceIndex) -> Preview {
    let mut seen = SeenKeys::new();
    let rows: Vec<PreviewRow> = rows
        .into_iter()
        .map(|row| {
            loader
                .validate_row(row, index, &mut seen, ValidationMode::Exhaustive)
                .into()
        })
        .collect();
    let has_errors = rows.iter().any(|r| !r.success);
    Preview { rows, has_errors }
}

/// Dry run: nothing is written.
#[instrument(skip_all, fields(entity = %loader.entity(), filename = %filename))]
pub async fn preview_file(
    loader: &dyn EntityLoader,
    store: &dyn PersistenceStore,
    content: Vec<u8>,
    filename: &str,
) -> Result<Preview> {
    let table = parse_off_thread(content, filename.to_string()).await?;
    let rows = table.normalized(loader.column_map());
    if rows.is_empty() {
        return Err(IngestError::EmptyFile);
    }

    let index = ReferenceIndex::build(store, loader.entity()).await?;
    let preview = preview_rows(loader, rows, &index);
    info!(
        rows = preview.row_count(),
        has_errors = preview.has_errors,
        "preview rendered"
    );
    Ok(preview)
}

#[derive(Default)]
struct Tally {
    records: Vec<NewRecord>,
    errors: Vec<RowError>,
}

impl Tally {
    fn push(mut self, outcome: RowOutcome) -> Self {
        match outcome {
            RowOutcome::Accepted { record, .. } => self.records.push(record),
            RowOutcome::Rejected { row, reasons } => self.errors.push(RowError {
                row: RowMarker::Row(row.number),
                error: reasons.join(REASON_SEPARATOR),
                data: Some(row),
            }),
        }
        self
    }
}

/// Validate in first-error mode and persist every accepted row, or none.
#[instrument(skip_all, fields(entity = %loader.entity(), filename = %filename))]
pub async fn commit_file(
    loader: &dyn EntityLoader,
    store: &dyn PersistenceStore,
    content: Vec<u8>,
    filename: &str,
) -> Result<CommitReport> {
    let table = parse_off_thread(content, filename.to_string()).await?;
    let rows = table.normalized(loader.column_map());
    let noun = loader.noun();
    let total_rows = rows.len();

    if rows.is_empty() {
        return Ok(CommitReport::new(noun, CommitSummary::default(), Vec::new()));
    }

    let index = match ReferenceIndex::build(store, loader.entity()).await {
        Ok(index) => index,
        Err(e) => return Ok(rolled_back(noun, total_rows, Vec::new(), &e)),
    };

    let mut seen = SeenKeys::new();
    let tally = rows.into_iter().fold(Tally::default(), |tally, row| {
        tally.push(loader.validate_row(row, &index, &mut seen, ValidationMode::FirstError))
    });

    let created = if tally.records.is_empty() {
        0
    } else {
        match persist(store, &tally.records).await {
            Ok(written) => written,
            Err(e) => {
                return Ok(rolled_back(noun, total_rows, tally.errors, &IngestError::from(e)))
            }
        }
    };

    let summary = CommitSummary {
        total_rows,
        created,
        updated: 0,
        skipped_duplicates: 0,
        errored: total_rows - created,
    };
    info!(
        total = summary.total_rows,
        created = summary.created,
        errored = summary.errored,
        "commit finished"
    );
    Ok(CommitReport::new(noun, summary, tally.errors))
}

/// One transaction, one bulk insert. Rolled back on insert failure; a
/// failed commit leaves nothing behind either.
async fn persist(
    store: &dyn PersistenceStore,
    records: &[NewRecord],
) -> std::result::Result<usize, PersistenceError> {
    let mut tx = store.begin().await?;
    match tx.bulk_insert(records).await {
        Ok(written) => {
            tx.commit().await?;
            Ok(written as usize)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}

fn rolled_back(
    noun: &str,
    total_rows: usize,
    mut errors: Vec<RowError>,
    cause: &IngestError,
) -> CommitReport {
    warn!(error = %cause, "commit rolled back");
    let error = match cause {
        // Every persisted code was checked during validation, so a collision
        // means it was written after the reference index was read.
        IngestError::Persistence(PersistenceError::UniqueViolation(detail)) => format!(
            "Commit rolled back: a code was saved by another load while this file was being validated ({}). No rows were saved.",
            detail
        ),
        other => format!("Commit rolled back, no rows were saved: {}", other),
    };
    errors.push(RowError {
        row: RowMarker::NotApplicable,
        error,
        data: None,
    });
    let summary = CommitSummary {
        total_rows,
        errored: total_rows,
        ..Default::default()
    };
    CommitReport::new(noun, summary, errors)
}
