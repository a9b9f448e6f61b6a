//! PostgreSQL backend (sqlx).
//!
//! Tables:
//! - categorias: reference records, `estado = 1` means active
//! - productos: product entity, `codigo` is the unique business key

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{PgPool, QueryBuilder, Transaction};
use tracing::info;

use super::{NewProduct, NewRecord, PersistenceError, PersistenceStore, PersistenceTx, ReferenceRecord};
use crate::entity::EntityType;

/// Rows per INSERT statement. 7 binds per row keeps each statement far
/// below the 65535 bind-parameter limit.
const INSERT_CHUNK: usize = 5_000;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categorias (
        id SERIAL PRIMARY KEY,
        nombre VARCHAR(100) NOT NULL UNIQUE,
        descripcion VARCHAR(255),
        estado INTEGER NOT NULL DEFAULT 1,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    // Text widths must match the NewProduct::*_MAX constants.
    r#"
    CREATE TABLE IF NOT EXISTS productos (
        id SERIAL PRIMARY KEY,
        codigo VARCHAR(50) NOT NULL UNIQUE,
        nombre VARCHAR(200) NOT NULL,
        descripcion VARCHAR(500),
        categoria_id INTEGER NOT NULL REFERENCES categorias(id),
        precio DOUBLE PRECISION NOT NULL DEFAULT 0,
        stock INTEGER NOT NULL DEFAULT 0,
        estado INTEGER NOT NULL DEFAULT 1,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

/// Sample categories: (nombre, descripcion)
const SAMPLE_CATEGORIES: &[(&str, &str)] = &[
    ("ELECTRÓNICA", "Productos electrónicos"),
    ("ALIMENTOS", "Productos alimenticios"),
    ("ROPA", "Prendas de vestir"),
    ("HOGAR", "Artículos para el hogar"),
    ("DEPORTES", "Artículos deportivos"),
];

/// Sample products: (codigo, nombre, descripcion, categoria, precio, stock)
const SAMPLE_PRODUCTS: &[(&str, &str, &str, &str, f64, i32)] = &[
    ("PROD001", "Laptop HP 15", "Laptop HP 15 pulgadas, Intel i5, 8GB RAM", "ELECTRÓNICA", 2500.0, 10),
    ("PROD002", "Mouse Logitech", "Mouse inalámbrico Logitech MX Master 3", "ELECTRÓNICA", 350.0, 50),
];

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert the sample categories and products, skipping any already present.
    /// Returns (categories inserted, products inserted).
    pub async fn seed_samples(&self) -> Result<(u64, u64), PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let mut categories = 0;
        for &(nombre, descripcion) in SAMPLE_CATEGORIES {
            categories += sqlx::query(
                "INSERT INTO categorias (nombre, descripcion) VALUES ($1, $2) ON CONFLICT (nombre) DO NOTHING",
            )
            .bind(nombre)
            .bind(descripcion)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        let mut products = 0;
        for &(codigo, nombre, descripcion, categoria, precio, stock) in SAMPLE_PRODUCTS {
            products += sqlx::query(
                r#"
                INSERT INTO productos (codigo, nombre, descripcion, categoria_id, precio, stock)
                SELECT $1, $2, $3, c.id, $5, $6 FROM categorias c WHERE c.nombre = $4
                ON CONFLICT (codigo) DO NOTHING
                "#,
            )
            .bind(codigo)
            .bind(nombre)
            .bind(descripcion)
            .bind(categoria)
            .bind(precio)
            .bind(stock)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        info!(categories, products, "sample data seeded");
        Ok((categories, products))
    }
}

#[async_trait]
impl PersistenceStore for PgStore {
    async fn active_references(
        &self,
        entity: EntityType,
    ) -> Result<Vec<ReferenceRecord>, PersistenceError> {
        match entity {
            EntityType::Productos => {
                let rows: Vec<(i32, String)> =
                    sqlx::query_as("SELECT id, nombre FROM categorias WHERE estado = 1")
                        .fetch_all(&self.pool)
                        .await?;
                Ok(rows
                    .into_iter()
                    .map(|(id, key)| ReferenceRecord { id, key })
                    .collect())
            }
            other => Err(PersistenceError::Unavailable(format!(
                "no reference table for '{}'",
                other
            ))),
        }
    }

    async fn active_keys(&self, entity: EntityType) -> Result<Vec<String>, PersistenceError> {
        match entity {
            EntityType::Productos => {
                let rows: Vec<(String,)> =
                    sqlx::query_as("SELECT codigo FROM productos WHERE estado = 1")
                        .fetch_all(&self.pool)
                        .await?;
                Ok(rows.into_iter().map(|(codigo,)| codigo).collect())
            }
            other => Err(PersistenceError::Unavailable(format!(
                "no table for '{}'",
                other
            ))),
        }
    }

    async fn retired_keys(&self, entity: EntityType) -> Result<Vec<String>, PersistenceError> {
        match entity {
            EntityType::Productos => {
                let rows: Vec<(String,)> =
                    sqlx::query_as("SELECT codigo FROM productos WHERE estado <> 1")
                        .fetch_all(&self.pool)
                        .await?;
                Ok(rows.into_iter().map(|(codigo,)| codigo).collect())
            }
            other => Err(PersistenceError::Unavailable(format!(
                "no table for '{}'",
                other
            ))),
        }
    }

    async fn begin(&self) -> Result<Box<dyn PersistenceTx>, PersistenceError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn insert_products(&mut self, products: &[&NewProduct]) -> Result<u64, PersistenceError> {
        let mut written = 0;
        for chunk in products.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO productos (codigo, nombre, descripcion, categoria_id, precio, stock, estado) ",
            );
            builder.push_values(chunk, |mut row, p| {
                row.push_bind(p.codigo.clone())
                    .push_bind(p.nombre.clone())
                    .push_bind(p.descripcion.clone())
                    .push_bind(p.categoria_id)
                    .push_bind(p.precio)
                    .push_bind(p.stock)
                    .push_bind(1_i32);
            });
            written += builder.build().execute(&mut *self.tx).await?.rows_affected();
        }
        Ok(written)
    }
}

#[async_trait]
impl PersistenceTx for PgTx {
    async fn bulk_insert(&mut self, records: &[NewRecord]) -> Result<u64, PersistenceError> {
        let products: Vec<&NewProduct> = records
            .iter()
            .map(|record| match record {
                NewRecord::Product(p) => p,
            })
            .collect();
        if products.is_empty() {
            return Ok(0);
        }
        self.insert_products(&products).await
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
