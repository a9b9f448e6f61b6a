//! In-process persistence store.
//!
//! Mirrors the Postgres tables closely enough to exercise the engine: an
//! `estado` flag per record, a unique `codigo`, the table's column widths,
//! and transactions that only become visible on commit. Uniqueness is re-checked at commit time so two
//! overlapping passes behave like they would against the real constraint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{NewProduct, NewRecord, PersistenceError, PersistenceStore, PersistenceTx, ReferenceRecord};
use crate::entity::EntityType;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCategory {
    pub id: i32,
    pub nombre: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredProduct {
    pub id: i32,
    pub product: NewProduct,
    pub active: bool,
}

#[derive(Debug, Default)]
struct State {
    categories: Vec<StoredCategory>,
    products: Vec<StoredProduct>,
    next_id: i32,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn has_code(&self, codigo: &str) -> bool {
        self.products.iter().any(|p| p.product.codigo == codigo)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    fail_next_insert: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_category(&self, nombre: &str, active: bool) -> i32 {
        let mut state = self.state();
        let id = state.next_id();
        state.categories.push(StoredCategory {
            id,
            nombre: nombre.to_string(),
            active,
        });
        id
    }

    pub fn add_product(&self, codigo: &str, nombre: &str, categoria_id: i32, active: bool) -> i32 {
        let mut state = self.state();
        let id = state.next_id();
        state.products.push(StoredProduct {
            id,
            product: NewProduct {
                codigo: codigo.to_string(),
                nombre: nombre.to_string(),
                descripcion: None,
                categoria_id,
                precio: 0.0,
                stock: 0,
            },
            active,
        });
        id
    }

    /// Make the next `bulk_insert` fail as if the database had rejected it.
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    pub fn products(&self) -> Vec<StoredProduct> {
        self.state().products.clone()
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn active_references(
        &self,
        entity: EntityType,
    ) -> Result<Vec<ReferenceRecord>, PersistenceError> {
        match entity {
            EntityType::Productos => Ok(self
                .state()
                .categories
                .iter()
                .filter(|c| c.active)
                .map(|c| ReferenceRecord {
                    id: c.id,
                    key: c.nombre.clone(),
                })
                .collect()),
            other => Err(PersistenceError::Unavailable(format!(
                "no reference table for '{}'",
                other
            ))),
        }
    }

    async fn active_keys(&self, entity: EntityType) -> Result<Vec<String>, PersistenceError> {
        match entity {
            EntityType::Productos => Ok(self
                .state()
                .products
                .iter()
                .filter(|p| p.active)
                .map(|p| p.product.codigo.clone())
                .collect()),
            other => Err(PersistenceError::Unavailable(format!(
                "no table for '{}'",
                other
            ))),
        }
    }

    async fn retired_keys(&self, entity: EntityType) -> Result<Vec<String>, PersistenceError> {
        match entity {
            EntityType::Productos => Ok(self
                .state()
                .products
                .iter()
                .filter(|p| !p.active)
                .map(|p| p.product.codigo.clone())
                .collect()),
            other => Err(PersistenceError::Unavailable(format!(
                "no table for '{}'",
                other
            ))),
        }
    }

    async fn begin(&self) -> Result<Box<dyn PersistenceTx>, PersistenceError> {
        Ok(Box::new(MemoryTx {
            store: self.clone(),
            pending: Vec::new(),
        }))
    }
}

struct MemoryTx {
    store: MemoryStore,
    pending: Vec<NewProduct>,
}

#[async_trait]
impl PersistenceTx for MemoryTx {
    async fn bulk_insert(&mut self, records: &[NewRecord]) -> Result<u64, PersistenceError> {
        if self.store.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(PersistenceError::Database("injected insert failure".to_string()));
        }

        let state = self.store.state();
        for record in records {
            let NewRecord::Product(product) = record;
            if let Some((column, max)) = product.oversized_field() {
                return Err(PersistenceError::Database(format!(
                    "value too long for productos.{} (max {} characters)",
                    column, max
                )));
            }
            let in_batch = self.pending.iter().any(|p| p.codigo == product.codigo);
            if in_batch || state.has_code(&product.codigo) {
                return Err(PersistenceError::UniqueViolation(format!(
                    "productos.codigo '{}'",
                    product.codigo
                )));
            }
            self.pending.push(product.clone());
        }
        Ok(records.len() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        let MemoryTx { store, pending } = *self;
        let mut state = store.state();
        if let Some(taken) = pending.iter().find(|p| state.has_code(&p.codigo)) {
            return Err(PersistenceError::UniqueViolation(format!(
                "productos.codigo '{}'",
                taken.codigo
            )));
        }
        for product in pending {
            let id = state.next_id();
            state.products.push(StoredProduct {
                id,
                product,
                active: true,
            });
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        Ok(())
    }
}
