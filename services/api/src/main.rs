//! API Service - Bulk load (carga masiva) endpoints
//!
//! Endpoints:
//! - GET /health - Health check
//! - POST /api/v1/carga-masiva/upload/{entity} - Stage a file (multipart `file`)
//! - POST /api/v1/carga-masiva/render/{entity} - Preview validation (form `carga_id`, `filename`)
//! - POST /api/v1/carga-masiva/commit/{entity} - Validate and persist
//! - DELETE /api/v1/carga-masiva/{entity}/{carga_id}/{filename} - Discard a staged file

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use ingest::{
    storage, CommitReport, Config, EntityRegistry, EntityType, IngestError, IngestionSession,
    Ingestor, PgStore, PreviewRow,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
struct AppState {
    ingestor: Arc<Ingestor>,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct IndexResponse {
    service: &'static str,
    version: &'static str,
    entities: Vec<EntityType>,
}

/// Every endpoint answers `{code, message, data}`.
#[derive(Serialize)]
struct Envelope<T: Serialize> {
    code: u16,
    message: String,
    data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            code: StatusCode::OK.as_u16(),
            message: message.into(),
            data: Some(data),
        })
    }
}

#[derive(Serialize)]
struct RenderResponse {
    code: u16,
    message: String,
    data: Vec<PreviewRow>,
    has_errors: bool,
    row_count: usize,
}

// ============================================================================
// Errors
// ============================================================================

enum ApiError {
    Ingest(IngestError),
    BadRequest(String),
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        ApiError::Ingest(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Ingest(IngestError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Ingest(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Ingest(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Ingest(err) => err.to_string(),
            ApiError::BadRequest(message) => message,
        };
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %message, "request failed");
        }
        let body = Envelope::<()> {
            code: status.as_u16(),
            message,
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Query params
// ============================================================================

#[derive(Deserialize)]
struct UserQuery {
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct StagedFileForm {
    carga_id: String,
    filename: String,
}

fn parse_entity(entity: &str) -> ApiResult<EntityType> {
    Ok(entity.parse::<EntityType>()?)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Json<Envelope<IndexResponse>> {
    Envelope::ok(
        "Carga masiva API",
        IndexResponse {
            service: "carga-masiva",
            version: env!("CARGO_PKG_VERSION"),
            entities: state.ingestor.registry().entities(),
        },
    )
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
    Query(params): Query<UserQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<Envelope<IngestionSession>>> {
    let entity = parse_entity(&entity)?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("The 'file' field has no filename".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Could not read upload: {}", e)))?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".to_string()))?;

    let session = state.ingestor.upload(entity, &filename, &bytes).await?;
    info!(
        user_id = params.user_id.as_deref().unwrap_or("-"),
        carga_id = %session.carga_id,
        filename = %session.filename,
        "upload staged"
    );
    Ok(Envelope::ok("File uploaded successfully", session))
}

async fn render_handler(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
    Query(params): Query<UserQuery>,
    Form(form): Form<StagedFileForm>,
) -> ApiResult<Json<RenderResponse>> {
    let entity = parse_entity(&entity)?;
    let preview = state
        .ingestor
        .render(entity, &form.carga_id, &form.filename)
        .await?;
    info!(
        user_id = params.user_id.as_deref().unwrap_or("-"),
        carga_id = %form.carga_id,
        rows = preview.row_count(),
        "preview served"
    );

    let row_count = preview.row_count();
    let message = if preview.has_errors {
        "Validation finished with errors"
    } else {
        "Validation finished without errors"
    };
    Ok(Json(RenderResponse {
        code: StatusCode::OK.as_u16(),
        message: message.to_string(),
        has_errors: preview.has_errors,
        row_count,
        data: preview.rows,
    }))
}

async fn commit_handler(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
    Query(params): Query<UserQuery>,
    Form(form): Form<StagedFileForm>,
) -> ApiResult<Json<Envelope<CommitReport>>> {
    let entity = parse_entity(&entity)?;
    let report = state
        .ingestor
        .commit(entity, &form.carga_id, &form.filename)
        .await?;
    info!(
        user_id = params.user_id.as_deref().unwrap_or("-"),
        carga_id = %form.carga_id,
        created = report.summary.created,
        errored = report.summary.errored,
        "commit served"
    );
    Ok(Envelope::ok(report.message.clone(), report))
}

async fn discard_handler(
    State(state): State<Arc<AppState>>,
    Path((entity, carga_id, filename)): Path<(String, String, String)>,
) -> ApiResult<Json<Envelope<()>>> {
    let entity = parse_entity(&entity)?;
    state.ingestor.discard(entity, &carga_id, &filename).await?;
    Ok(Envelope::ok("Staged file removed", ()))
}

// ============================================================================
// Router
// ============================================================================

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

fn app(ingestor: Arc<Ingestor>, cors_origins: &[String]) -> Router {
    // Multipart framing needs a little room beyond the file itself.
    let body_limit = ingestor.max_file_size() + 64 * 1024;
    let state = Arc::new(AppState { ingestor });

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/v1/carga-masiva/upload/:entity", post(upload_handler))
        .route("/api/v1/carga-masiva/render/:entity", post(render_handler))
        .route("/api/v1/carga-masiva/commit/:entity", post(commit_handler))
        .route(
            "/api/v1/carga-masiva/:entity/:carga_id/:filename",
            delete(discard_handler),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    let db_url = config.require_db_url()?;

    println!("=== Carga Masiva API ===");
    println!("Storage: {:?} ({})", config.storage, config.upload_dir.display());
    println!("Connecting to database...");

    let store = PgStore::connect(db_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;

    println!("Database connected");

    let ingestor = Arc::new(Ingestor::new(
        storage::from_config(&config),
        Arc::new(store),
        EntityRegistry::with_defaults(),
        config.max_file_size,
    ));
    let app = app(ingestor, &config.cors_origins);

    println!("API listening on http://{}", config.api_bind);
    println!("\nEndpoints:");
    println!("  GET    /health");
    println!("  POST   /api/v1/carga-masiva/upload/{{entity}}?user_id=");
    println!("  POST   /api/v1/carga-masiva/render/{{entity}}?user_id=");
    println!("  POST   /api/v1/carga-masiva/commit/{{entity}}?user_id=");
    println!("  DELETE /api/v1/carga-masiva/{{entity}}/{{carga_id}}/{{filename}}");

    let listener = tokio::net::TcpListener::bind(&config.api_bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
