//! The three phases wired together: upload, render, commit.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::commit::{commit_file, preview_file, Preview};
use crate::entity::{EntityRegistry, EntityType};
use crate::error::{IngestError, Result};
use crate::persistence::PersistenceStore;
use crate::session::{IngestionSession, SessionStore};
use crate::storage::BlobStore;
use crate::summary::CommitReport;

pub struct Ingestor {
    sessions: SessionStore,
    store: Arc<dyn PersistenceStore>,
    registry: EntityRegistry,
    max_file_size: usize,
}

impl Ingestor {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        store: Arc<dyn PersistenceStore>,
        registry: EntityRegistry,
        max_file_size: usize,
    ) -> Self {
        Self {
            sessions: SessionStore::new(blobs),
            store,
            registry,
            max_file_size,
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Stage a file and open a session for it.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        entity: EntityType,
        filename: &str,
        bytes: &[u8],
    ) -> Result<IngestionSession> {
        let registration = self.registry.get(entity)?;
        if bytes.is_empty() {
            return Err(IngestError::EmptyFile);
        }
        if bytes.len() > self.max_file_size {
            return Err(IngestError::FileTooLarge {
                size: bytes.len(),
                limit: self.max_file_size,
            });
        }
        self.sessions
            .stage(entity, &registration.storage_prefix, filename, bytes)
            .await
    }

    /// Dry-run validation of a staged file.
    pub async fn render(&self, entity: EntityType, carga_id: &str, filename: &str) -> Result<Preview> {
        let registration = self.registry.get(entity)?;
        let content = self
            .sessions
            .fetch(&registration.storage_prefix, carga_id, filename)
            .await?;
        preview_file(registration.loader.as_ref(), self.store.as_ref(), content, filename).await
    }

    /// Re-validate a staged file and persist its accepted rows.
    pub async fn commit(
        &self,
        entity: EntityType,
        carga_id: &str,
        filename: &str,
    ) -> Result<CommitReport> {
        let registration = self.registry.get(entity)?;
        let content = self
            .sessions
            .fetch(&registration.storage_prefix, carga_id, filename)
            .await?;
        let report =
            commit_file(registration.loader.as_ref(), self.store.as_ref(), content, filename).await?;
        info!(carga_id, entity = %entity, message = %report.message, "carga committed");
        Ok(report)
    }

    /// Drop a staged upload. NotFound when nothing was staged under that name.
    pub async fn discard(&self, entity: EntityType, carga_id: &str, filename: &str) -> Result<()> {
        let registration = self.registry.get(entity)?;
        let removed = self
            .sessions
            .discard(&registration.storage_prefix, carga_id, filename)
            .await?;
        if removed {
            Ok(())
        } else {
            Err(IngestError::NotFound(format!("{}/{}", carga_id, filename)))
        }
    }
}
