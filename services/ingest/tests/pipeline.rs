use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ingest::persistence::{NewProduct, NewRecord, PersistenceTx, ReferenceRecord};
use ingest::{
    EntityRegistry, EntityType, IngestError, Ingestor, MemoryBlobStore, MemoryStore,
    PersistenceError, PersistenceStore, RowMarker,
};

const HEADER: &str = "CÓDIGO,NOMBRE,DESCRIPCIÓN,CATEGORÍA,PRECIO,STOCK\n";

struct Fixture {
    ingestor: Ingestor,
    store: MemoryStore,
}

fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let electronics = store.add_category("ELECTRÓNICA", true);
    store.add_category("ALIMENTOS", true);
    store.add_category("ROPA", true);
    store.add_category("DESCONTINUADA", false);
    store.add_product("PROD001", "Laptop HP 15", electronics, true);

    let ingestor = Ingestor::new(
        Arc::new(MemoryBlobStore::new()),
        Arc::new(store.clone()),
        EntityRegistry::with_defaults(),
        1024 * 1024,
    );
    Fixture { ingestor, store }
}

fn csv(body: &str) -> Vec<u8> {
    format!("{}{}", HEADER, body).into_bytes()
}

async fn stage(f: &Fixture, content: &[u8]) -> String {
    f.ingestor
        .upload(EntityType::Productos, "productos.csv", content)
        .await
        .unwrap()
        .carga_id
        .to_string()
}

#[tokio::test]
async fn scenario_a_single_valid_row() {
    let f = fixture();
    let id = stage(&f, &csv("PROD100,Teclado,Mecánico,ELECTRÓNICA,100,10\n")).await;

    let report = f
        .ingestor
        .commit(EntityType::Productos, &id, "productos.csv")
        .await
        .unwrap();
    assert_eq!(report.summary.total_rows, 1);
    assert_eq!(report.summary.created, 1);
    assert_eq!(report.summary.errored, 0);
    assert!(report.errors.is_empty());
    assert_eq!(report.message, "Created 1 products successfully.");

    let saved = f.store.products();
    let product = &saved.last().unwrap().product;
    assert_eq!(product.codigo, "PROD100");
    assert_eq!(product.precio, 100.0);
    assert_eq!(product.stock, 10);
    assert_eq!(product.descripcion.as_deref(), Some("Mecánico"));
}

#[tokio::test]
async fn scenario_b_duplicate_key_in_file() {
    let f = fixture();
    let id = stage(
        &f,
        &csv("PROD200,Uno,,ALIMENTOS,5,1\nprod200,Dos,,ALIMENTOS,6,2\n"),
    )
    .await;

    let report = f
        .ingestor
        .commit(EntityType::Productos, &id, "productos.csv")
        .await
        .unwrap();
    assert_eq!(report.summary.created, 1);
    assert_eq!(report.summary.errored, 1);
    assert_eq!(report.errors[0].row, RowMarker::Row(3));
    assert!(report.errors[0].error.contains("duplicated in the file"));
    assert_eq!(report.message, "Created 1 products. Found 1 errors.");
}

#[tokio::test]
async fn scenario_c_unknown_category() {
    let f = fixture();
    let before = f.store.products().len();
    let id = stage(&f, &csv("PROD300,Camisa,,JUGUETES,10,1\n")).await;

    let report = f
        .ingestor
        .commit(EntityType::Productos, &id, "productos.csv")
        .await
        .unwrap();
    assert_eq!(report.summary.created, 0);
    assert!(report.errors[0].error.contains("does not exist"));
    assert_eq!(f.store.products().len(), before);
}

#[tokio::test]
async fn inactive_category_does_not_resolve() {
    let f = fixture();
    let id = stage(&f, &csv("PROD301,Camisa,,DESCONTINUADA,10,1\n")).await;
    let preview = f
        .ingestor
        .render(EntityType::Productos, &id, "productos.csv")
        .await
        .unwrap();
    assert!(preview.rows[0].error.contains("does not exist"));
}

#[tokio::test]
async fn scenario_d_negative_price() {
    let f = fixture();
    let id = stage(&f, &csv("PROD400,Pan,,ALIMENTOS,-50,1\n")).await;

    let preview = f
        .ingestor
        .render(EntityType::Productos, &id, "productos.csv")
        .await
        .unwrap();
    assert!(preview.has_errors);
    assert_eq!(preview.rows[0].error, "PRECIO cannot be negative.");

    let report = f
        .ingestor
        .commit(EntityType::Productos, &id, "productos.csv")
        .await
        .unwrap();
    assert_eq!(report.summary.created, 0);
    assert_eq!(report.errors[0].error, "PRECIO cannot be negative.");
}

#[tokio::test]
async fn scenario_e_header_only() {
    let f = fixture();
    let id = stage(&f, &csv("")).await;

    let report = f
        .ingestor
        .commit(EntityType::Productos, &id, "productos.csv")
        .await
        .unwrap();
    assert_eq!(report.summary.total_rows, 0);
    assert_eq!(report.summary.created, 0);
    assert_eq!(report.summary.errored, 0);
    assert_eq!(report.message, "No valid data found to process.");

    let err = f
        .ingestor
        .render(EntityType::Productos, &id, "productos.csv")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::EmptyFile));
}

#[tokio::test]
async fn conservation_holds_for_mixed_file() {
    let f = fixture();
    let id = stage(
        &f,
        &csv(concat!(
            "PROD500,Uno,,ROPA,1,1\n",
            "PROD001,Existente,,ROPA,1,1\n",
            ",Sin codigo,,ROPA,1,1\n",
            "PROD501,Dos,,ROPA,abc,1\n",
            "PROD502,Tres,,ROPA,1,-4\n",
            "PROD500,Repetido,,ROPA,1,1\n",
            "PROD503,Cuatro,,ROPA,2.5,7.9\n",
        )),
    )
    .await;

    let report = f
        .ingestor
        .commit(EntityType::Productos, &id, "productos.csv")
        .await
        .unwrap();
    let s = report.summary;
    assert_eq!(s.total_rows, 7);
    assert_eq!(s.created, 2);
    assert_eq!(s.errored, 5);
    assert_eq!(s.total_rows, s.created + s.updated + s.skipped_duplicates + s.errored);
    let rows: Vec<RowMarker> = report.errors.iter().map(|e| e.row).collect();
    assert_eq!(
        rows,
        vec![RowMarker::Row(3), RowMarker::Row(4), RowMarker::Row(5), RowMarker::Row(6), RowMarker::Row(7)]
    );
    assert!(report.errors.iter().all(|e| e.data.is_some()));
}

#[tokio::test]
async fn preview_is_repeatable_and_writes_nothing() {
    let f = fixture();
    let before = f.store.products().len();
    let id = stage(&f, &csv("PROD600,Uno,,ROPA,1,1\nPROD600,Dos,,NADA,x,y\n")).await;

    let first = f.ingestor.render(EntityType::Productos, &id, "productos.csv").await.unwrap();
    let second = f.ingestor.render(EntityType::Productos, &id, "productos.csv").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.row_count(), 2);
    assert_eq!(first.rows[0].row, RowMarker::Accepted);
    assert_eq!(
        first.rows[1].error,
        concat!(
            "CODIGO 'PROD600' is duplicated in the file.; ",
            "CATEGORIA 'NADA' does not exist in the database.; ",
            "PRECIO must be a valid number.; ",
            "STOCK must be a valid integer."
        )
    );
    assert_eq!(f.store.products().len(), before);
}

#[tokio::test]
async fn committed_keys_round_trip() {
    let f = fixture();
    let before = f.store.active_keys(EntityType::Productos).await.unwrap();
    let id = stage(&f, &csv("K1,Uno,,ROPA,1,1\nK2,Dos,,ROPA,1,1\nK3,,,ROPA,1,1\n")).await;

    let report = f.ingestor.commit(EntityType::Productos, &id, "productos.csv").await.unwrap();
    assert_eq!(report.summary.created, 2);

    let mut added: Vec<String> = f
        .store
        .active_keys(EntityType::Productos)
        .await
        .unwrap()
        .into_iter()
        .filter(|k| !before.contains(k))
        .collect();
    added.sort();
    assert_eq!(added, vec!["K1", "K2"]);
}

#[tokio::test]
async fn second_commit_of_same_file_finds_existing_keys() {
    let f = fixture();
    let id = stage(&f, &csv("K9,Uno,,ROPA,1,1\n")).await;

    let first = f.ingestor.commit(EntityType::Productos, &id, "productos.csv").await.unwrap();
    assert_eq!(first.summary.created, 1);

    let second = f.ingestor.commit(EntityType::Productos, &id, "productos.csv").await.unwrap();
    assert_eq!(second.summary.created, 0);
    assert!(second.errors[0].error.contains("already exists"));
}

#[tokio::test]
async fn injected_insert_failure_rolls_back() {
    let f = fixture();
    let before = f.store.products().len();
    let id = stage(&f, &csv("R1,Uno,,ROPA,1,1\nR2,Dos,,ROPA,1,1\n")).await;

    f.store.fail_next_insert();
    let report = f.ingestor.commit(EntityType::Productos, &id, "productos.csv").await.unwrap();
    assert_eq!(report.summary.created, 0);
    assert_eq!(report.summary.errored, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].row, RowMarker::NotApplicable);
    assert_eq!(f.store.products().len(), before);
}

/// Commits a competing insert the moment the pass opens its transaction,
/// i.e. after the reference snapshot was taken.
struct RacingStore {
    inner: MemoryStore,
    racer: Mutex<Option<NewRecord>>,
}

#[async_trait]
impl PersistenceStore for RacingStore {
    async fn active_references(
        &self,
        entity: EntityType,
    ) -> Result<Vec<ReferenceRecord>, PersistenceError> {
        self.inner.active_references(entity).await
    }

    async fn active_keys(&self, entity: EntityType) -> Result<Vec<String>, PersistenceError> {
        self.inner.active_keys(entity).await
    }

    async fn retired_keys(&self, entity: EntityType) -> Result<Vec<String>, PersistenceError> {
        self.inner.retired_keys(entity).await
    }

    async fn begin(&self) -> Result<Box<dyn PersistenceTx>, PersistenceError> {
        let racer = self.racer.lock().unwrap().take();
        if let Some(record) = racer {
            let mut tx = self.inner.begin().await?;
            tx.bulk_insert(&[record]).await?;
            tx.commit().await?;
        }
        self.inner.begin().await
    }
}

#[tokio::test]
async fn concurrent_insert_hits_unique_backstop() {
    let store = MemoryStore::new();
    let ropa = store.add_category("ROPA", true);
    let racing = RacingStore {
        inner: store.clone(),
        racer: Mutex::new(Some(NewRecord::Product(NewProduct {
            codigo: "RACE1".to_string(),
            nombre: "Otro".to_string(),
            descripcion: None,
            categoria_id: ropa,
            precio: 0.0,
            stock: 0,
        }))),
    };
    let ingestor = Ingestor::new(
        Arc::new(MemoryBlobStore::new()),
        Arc::new(racing),
        EntityRegistry::with_defaults(),
        1024,
    );

    let session = ingestor
        .upload(EntityType::Productos, "p.csv", &csv("RACE1,Uno,,ROPA,1,1\nRACE2,Dos,,ROPA,1,1\n"))
        .await
        .unwrap();
    let report = ingestor
        .commit(EntityType::Productos, &session.carga_id.to_string(), "p.csv")
        .await
        .unwrap();

    assert_eq!(report.summary.created, 0);
    assert_eq!(report.summary.errored, 2);
    let last = report.errors.last().unwrap();
    assert_eq!(last.row, RowMarker::NotApplicable);
    assert!(last.error.contains("saved by another load"));

    // Only the competing insert survived.
    let codes: Vec<String> = store.products().into_iter().map(|p| p.product.codigo).collect();
    assert_eq!(codes, vec!["RACE1"]);
}

#[tokio::test]
async fn spreadsheet_loads_end_to_end() {
    let f = fixture();
    let workbook = include_bytes!("fixtures/productos.xlsx");
    let session = f
        .ingestor
        .upload(EntityType::Productos, "productos.xlsx", workbook)
        .await
        .unwrap();
    let id = session.carga_id.to_string();

    let preview = f
        .ingestor
        .render(EntityType::Productos, &id, "productos.xlsx")
        .await
        .unwrap();
    // Sheet row 3 is empty and the second sheet is never read.
    assert_eq!(preview.row_count(), 3);
    let columns: Vec<&str> = preview.rows[0].data.columns().collect();
    assert_eq!(columns, vec!["codigo", "nombre", "categoria", "precio", "stock"]);

    let report = f
        .ingestor
        .commit(EntityType::Productos, &id, "productos.xlsx")
        .await
        .unwrap();
    assert_eq!(report.summary.total_rows, 3);
    assert_eq!(report.summary.created, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].row, RowMarker::Row(4));
    assert_eq!(report.errors[0].error, "PRECIO cannot be negative.");

    let codes: Vec<String> = f.store.products().into_iter().map(|p| p.product.codigo).collect();
    assert!(codes.contains(&"1001".to_string()));
    assert!(codes.contains(&"PROD021".to_string()));
    assert!(!codes.contains(&"NO_LEER".to_string()));
}

#[tokio::test]
async fn unsupported_and_unreadable_files() {
    let f = fixture();
    let err = f
        .ingestor
        .upload(EntityType::Productos, "productos.pdf", b"%PDF")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::UnsupportedFormat(_)));

    let session = f
        .ingestor
        .upload(EntityType::Productos, "productos.xlsx", b"not a workbook")
        .await
        .unwrap();
    let err = f
        .ingestor
        .render(EntityType::Productos, &session.carga_id.to_string(), "productos.xlsx")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Malformed(_)));
}

#[tokio::test]
async fn upload_limits() {
    let f = fixture();
    let big = vec![b'a'; f.ingestor.max_file_size() + 1];
    assert!(matches!(
        f.ingestor.upload(EntityType::Productos, "p.csv", &big).await,
        Err(IngestError::FileTooLarge { .. })
    ));
    assert!(matches!(
        f.ingestor.upload(EntityType::Productos, "p.csv", b"").await,
        Err(IngestError::EmptyFile)
    ));
    assert!(matches!(
        f.ingestor.upload(EntityType::Productos, "../p.csv", b"x").await,
        Err(IngestError::InvalidFilename(_))
    ));
    assert!(matches!(
        f.ingestor.upload(EntityType::Proveedores, "p.csv", b"x").await,
        Err(IngestError::UnsupportedEntity(_))
    ));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let f = fixture();
    for id in ["not-a-uuid", "3f2b8c1e-9d4a-4c1b-8e7f-0a1b2c3d4e5f"] {
        assert!(matches!(
            f.ingestor.commit(EntityType::Productos, id, "productos.csv").await,
            Err(IngestError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn discard_removes_staged_file() {
    let f = fixture();
    let id = stage(&f, &csv("D1,Uno,,ROPA,1,1\n")).await;
    f.ingestor.discard(EntityType::Productos, &id, "productos.csv").await.unwrap();
    assert!(matches!(
        f.ingestor.render(EntityType::Productos, &id, "productos.csv").await,
        Err(IngestError::NotFound(_))
    ));
    assert!(matches!(
        f.ingestor.discard(EntityType::Productos, &id, "productos.csv").await,
        Err(IngestError::NotFound(_))
    ));
}
