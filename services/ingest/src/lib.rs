//! Bulk load engine (carga masiva).
//!
//! Turns an uploaded CSV/XLS/XLSX file into per-row outcomes for one entity
//! type, then either previews them or persists the accepted rows in a single
//! transaction.
//!
//! Phases:
//! - upload: stage the bytes under a fresh `carga_id`
//! - render: validate every rule on every row, write nothing
//! - commit: re-validate against fresh reference data, bulk insert, summarize

pub mod commit;
pub mod config;
pub mod entity;
pub mod error;
pub mod normalize;
pub mod persistence;
pub mod pipeline;
pub mod reference;
pub mod session;
pub mod storage;
pub mod summary;
pub mod table;
pub mod validate;

pub use commit::{Preview, PreviewRow};
pub use config::{Config, StorageKind};
pub use entity::{EntityLoader, EntityRegistry, EntityType, ProductLoader};
pub use error::{IngestError, Result};
pub use persistence::memory::MemoryStore;
pub use persistence::postgres::PgStore;
pub use persistence::{PersistenceError, PersistenceStore};
pub use pipeline::Ingestor;
pub use session::IngestionSession;
pub use storage::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use summary::{CommitReport, CommitSummary, RowError, RowMarker};
