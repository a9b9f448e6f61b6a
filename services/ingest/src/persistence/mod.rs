//! Persistence seam.
//!
//! The engine needs four things from a database: active reference records,
//! active business keys, keys held by inactive records, and one transaction
//! holding a single bulk insert.
//! `postgres` is the production backend, `memory` the in-process one used by
//! tests and dry runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::entity::EntityType;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PersistenceError::UniqueViolation(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                PersistenceError::Unavailable(err.to_string())
            }
            _ => PersistenceError::Database(err.to_string()),
        }
    }
}

/// An active lookup record: identifier plus its display key (e.g. a category name).
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRecord {
    pub id: i32,
    pub key: String,
}

/// A validated product ready for insertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProduct {
    pub codigo: String,
    pub nombre: String,
    pub descripcion: Option<String>,
    pub categoria_id: i32,
    pub precio: f64,
    pub stock: i32,
}

impl NewProduct {
    /// Column widths of the `productos` table, in characters.
    pub const CODIGO_MAX: usize = 50;
    pub const NOMBRE_MAX: usize = 200;
    pub const DESCRIPCION_MAX: usize = 500;

    /// First text column wider than the table allows: (column, limit).
    pub fn oversized_field(&self) -> Option<(&'static str, usize)> {
        let too_long = |value: &str, max: usize| value.chars().count() > max;
        if too_long(&self.codigo, Self::CODIGO_MAX) {
            Some(("codigo", Self::CODIGO_MAX))
        } else if too_long(&self.nombre, Self::NOMBRE_MAX) {
            Some(("nombre", Self::NOMBRE_MAX))
        } else if self
            .descripcion
            .as_deref()
            .is_some_and(|d| too_long(d, Self::DESCRIPCION_MAX))
        {
            Some(("descripcion", Self::DESCRIPCION_MAX))
        } else {
            None
        }
    }
}

/// Structured record produced by an accepted row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NewRecord {
    Product(NewProduct),
}

impl NewRecord {
    pub fn business_key(&self) -> &str {
        match self {
            NewRecord::Product(p) => &p.codigo,
        }
    }
}

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Active lookup records the entity's reference field resolves against.
    async fn active_references(
        &self,
        entity: EntityType,
    ) -> Result<Vec<ReferenceRecord>, PersistenceError>;

    /// Business keys of active records already persisted for the entity.
    async fn active_keys(&self, entity: EntityType) -> Result<Vec<String>, PersistenceError>;

    /// Business keys held by inactive records. They still occupy the unique
    /// constraint, so a file cannot reuse them.
    async fn retired_keys(&self, entity: EntityType) -> Result<Vec<String>, PersistenceError>;

    /// Open the transaction that brackets one commit pass.
    async fn begin(&self) -> Result<Box<dyn PersistenceTx>, PersistenceError>;
}

#[async_trait]
pub trait PersistenceTx: Send {
    /// Insert every record in one operation; returns the number of rows written.
    async fn bulk_insert(&mut self, records: &[NewRecord]) -> Result<u64, PersistenceError>;

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError>;

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError>;
}
