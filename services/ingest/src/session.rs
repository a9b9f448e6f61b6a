//! Upload sessions: one staged file per `carga_id`.
//!
//! A session is created by `stage` and never mutated. Later phases address the
//! file by (entity prefix, carga_id, filename); there is no expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::entity::EntityType;
use crate::error::{IngestError, Result};
use crate::storage::BlobStore;
use crate::table::FileFormat;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionSession {
    pub carga_id: Uuid,
    pub entity: EntityType,
    pub filename: String,
    /// Blob store key of the staged bytes.
    pub storage_path: String,
    /// Where the backend actually put them (file path, memory:// URL).
    pub locator: String,
    pub content_hash: String,
    pub size_bytes: usize,
    pub staged_at: DateTime<Utc>,
}

pub fn staging_key(prefix: &str, carga_id: Uuid, filename: &str) -> String {
    format!("{}/{}/{}", prefix.trim_end_matches('/'), carga_id, filename)
}

/// Reject names that could address anything outside their session folder.
pub fn check_filename(filename: &str) -> Result<&str> {
    let name = filename.trim();
    let unsafe_name = name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.chars().any(char::is_control);
    if unsafe_name {
        Err(IngestError::InvalidFilename(filename.to_string()))
    } else {
        Ok(name)
    }
}

/// Malformed ids can never have been issued, so they are simply not found.
pub fn parse_carga_id(carga_id: &str) -> Result<Uuid> {
    Uuid::parse_str(carga_id.trim())
        .map_err(|_| IngestError::NotFound(format!("carga_id '{}'", carga_id)))
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct SessionStore {
    blobs: Arc<dyn BlobStore>,
}

impl SessionStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    pub async fn stage(
        &self,
        entity: EntityType,
        prefix: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<IngestionSession> {
        let filename = check_filename(filename)?;
        FileFormat::from_filename(filename)?;

        let carga_id = Uuid::new_v4();
        let storage_path = staging_key(prefix, carga_id, filename);
        let locator = self.blobs.put(&storage_path, bytes).await?;
        let session = IngestionSession {
            carga_id,
            entity,
            filename: filename.to_string(),
            storage_path,
            locator,
            content_hash: content_hash(bytes),
            size_bytes: bytes.len(),
            staged_at: Utc::now(),
        };
        info!(
            carga_id = %session.carga_id,
            entity = %entity,
            size = session.size_bytes,
            hash = %session.content_hash,
            "file staged"
        );
        Ok(session)
    }

    pub async fn fetch(&self, prefix: &str, carga_id: &str, filename: &str) -> Result<Vec<u8>> {
        let key = self.key(prefix, carga_id, filename)?;
        self.blobs.get(&key).await
    }

    /// Remove a staged file; false if there was nothing to remove.
    pub async fn discard(&self, prefix: &str, carga_id: &str, filename: &str) -> Result<bool> {
        let key = self.key(prefix, carga_id, filename)?;
        self.blobs.delete(&key).await
    }

    fn key(&self, prefix: &str, carga_id: &str, filename: &str) -> Result<String> {
        let carga_id = parse_carga_id(carga_id)?;
        let filename = check_filename(filename)?;
        Ok(staging_key(prefix, carga_id, filename))
    }
}
