use thiserror::Error;

use crate::persistence::PersistenceError;

/// Failures that abort a pass before any per-row outcome exists.
///
/// Validation rejections are never represented here: they are data and travel
/// inside previews and commit reports.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unsupported format '{0}'. Use CSV, XLS or XLSX.")]
    UnsupportedFormat(String),

    #[error("Could not read file: {0}")]
    Malformed(String),

    #[error("The file is empty.")]
    EmptyFile,

    #[error("Invalid filename '{0}'")]
    InvalidFilename(String),

    #[error("File is {size} bytes, limit is {limit}")]
    FileTooLarge { size: usize, limit: usize },

    #[error("Entity type '{0}' is not supported")]
    UnsupportedEntity(String),

    #[error("Staged file not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// True for errors caused by the uploaded input itself rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::UnsupportedFormat(_)
                | IngestError::Malformed(_)
                | IngestError::EmptyFile
                | IngestError::InvalidFilename(_)
                | IngestError::FileTooLarge { .. }
                | IngestError::UnsupportedEntity(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
