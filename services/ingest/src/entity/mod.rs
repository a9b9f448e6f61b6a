//! Entity types and the registry that routes each one to its loader.

pub mod producto;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::normalize::ColumnMap;
use crate::reference::{ReferenceIndex, SeenKeys};
use crate::table::RawRow;
use crate::validate::{RowOutcome, ValidationMode};

pub use producto::ProductLoader;

/// Entity tags accepted in upload/render/commit routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Productos,
    Proveedores,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Productos => "productos",
            EntityType::Proveedores => "proveedores",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "productos" => Ok(EntityType::Productos),
            "proveedores" => Ok(EntityType::Proveedores),
            other => Err(IngestError::UnsupportedEntity(other.to_string())),
        }
    }
}

/// Validation rules for one entity type.
pub trait EntityLoader: Send + Sync {
    fn entity(&self) -> EntityType;

    /// Plural noun used in summary messages ("products").
    fn noun(&self) -> &'static str;

    /// Header overrides applied before the generic flattening rule.
    fn column_map(&self) -> &ColumnMap;

    /// Validate one normalized row. Only `seen` is mutated.
    fn validate_row(
        &self,
        row: RawRow,
        index: &ReferenceIndex,
        seen: &mut SeenKeys,
        mode: ValidationMode,
    ) -> RowOutcome;
}

pub struct Registration {
    pub loader: Arc<dyn EntityLoader>,
    pub storage_prefix: String,
}

/// Entity tag -> loader and staging prefix.
#[derive(Default)]
pub struct EntityRegistry {
    entries: HashMap<EntityType, Registration>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every loader this crate ships.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ProductLoader::new()), "uploads/productos");
        registry
    }

    pub fn register(&mut self, loader: Arc<dyn EntityLoader>, storage_prefix: impl Into<String>) {
        self.entries.insert(
            loader.entity(),
            Registration {
                loader,
                storage_prefix: storage_prefix.into(),
            },
        );
    }

    pub fn get(&self, entity: EntityType) -> Result<&Registration> {
        self.entries
            .get(&entity)
            .ok_or_else(|| IngestError::UnsupportedEntity(entity.to_string()))
    }

    pub fn entities(&self) -> Vec<EntityType> {
        let mut entities: Vec<EntityType> = self.entries.keys().copied().collect();
        entities.sort_by_key(|e| e.as_str());
        entities
    }
}
