//! JSON HTTP binding for the archive engine.
//!
//! The server keeps the current index in memory. `POST /scan` builds a new
//! snapshot off to the side, persists it, then swaps it in; searches that
//! started earlier finish against the snapshot they began with.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version and index size) |
//! | `GET`  | `/categories` | Full category tree |
//! | `GET`  | `/categories/{label}/children` | Sub-categories of one node |
//! | `POST` | `/search` | `{name?, id?, category?}` search |
//! | `POST` | `/scan` | Rescan the import root and publish |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_query", "message": "..." } }
//! ```
//!
//! Error codes: `invalid_query` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dossier_core::store::{InMemoryIndex, IndexStore};
use dossier_core::{IndexSnapshot, QueryEngine, ScanError, SearchOutcome, SearchSession, ScanWarning};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::categories::{category_children, category_tree, CategoryView};
use crate::config::Config;
use crate::metadata::MetadataLookup;
use crate::progress::NoProgress;
use crate::scan::{scan_archive, ScanOptions};
use crate::search::{engine_for, metadata_root, SearchRequest};
use crate::sqlite_index::SqliteIndex;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    index: Arc<InMemoryIndex>,
    /// Persistent copy of the index; absent in tests.
    store: Option<SqliteIndex>,
    engine: Arc<QueryEngine>,
    lookup: MetadataLookup,
    scan_lock: Arc<tokio::sync::Mutex<()>>,
    cancel: CancellationToken,
}

impl AppState {
    /// State backed by the configured database, preloaded with its index.
    pub async fn load(config: &Config, cancel: CancellationToken) -> anyhow::Result<Self> {
        let store = SqliteIndex::connect(config).await?;
        let snapshot = store.snapshot().await?;
        let mut state = Self::in_memory(config, snapshot, cancel);
        state.store = Some(store);
        Ok(state)
    }

    /// State over a fixed snapshot with no database behind it.
    pub fn in_memory(config: &Config, snapshot: IndexSnapshot, cancel: CancellationToken) -> Self {
        Self {
            config: Arc::new(config.clone()),
            index: Arc::new(InMemoryIndex::with_snapshot(snapshot)),
            store: None,
            engine: Arc::new(engine_for(config)),
            lookup: MetadataLookup::from_config(config),
            scan_lock: Arc::new(tokio::sync::Mutex::new(())),
            cancel,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/categories", get(handle_categories))
        .route("/categories/{label}/children", get(handle_children))
        .route("/search", post(handle_search))
        .route("/scan", post(handle_scan))
        .layer(cors)
        .with_state(state)
}

/// Serve until `cancel` fires.
pub async fn run_server(config: &Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::load(config, cancel.clone()).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "dossier server listening");
    println!("Dossier server listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn invalid_query(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "invalid_query",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    files: usize,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let snapshot = state
        .index
        .snapshot()
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        files: snapshot.files().len(),
    }))
}

// ============ GET /categories ============

async fn handle_categories(State(state): State<AppState>) -> Json<Vec<CategoryView>> {
    Json(category_tree(state.engine.taxonomy()))
}

async fn handle_children(
    State(state): State<AppState>,
    Path(label): Path<String>,
) -> Result<Json<Vec<CategoryView>>, AppError> {
    category_children(state.engine.taxonomy(), &label)
        .map(Json)
        .map_err(|e| not_found(e.to_string()))
}

// ============ POST /search ============

async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchOutcome>, AppError> {
    request
        .validate()
        .map_err(|e| invalid_query(e.to_string()))?;
    let query = request
        .to_query(state.engine.taxonomy())
        .map_err(|e| not_found(e.to_string()))?;

    let snapshot = state
        .index
        .snapshot()
        .await
        .map_err(|e| internal(e.to_string()))?;
    let import_root = metadata_root(&state.config, &snapshot, None)
        .ok_or_else(|| not_found("no import root known; run a scan first"))?;

    let session = SearchSession { import_root, query };
    let outcome = state
        .engine
        .search(&snapshot, &session, &state.lookup)
        .await
        .map_err(|e| invalid_query(e.to_string()))?;
    Ok(Json(outcome))
}

// ============ POST /scan ============

#[derive(Debug, Default, Deserialize)]
struct ScanRequest {
    #[serde(default)]
    root: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ScanResponse {
    root: PathBuf,
    persons: usize,
    files: usize,
    warnings: Vec<ScanWarning>,
}

async fn handle_scan(
    State(state): State<AppState>,
    body: Option<Json<ScanRequest>>,
) -> Result<Json<ScanResponse>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let _guard = state.scan_lock.lock().await;

    let current = state
        .index
        .snapshot()
        .await
        .map_err(|e| internal(e.to_string()))?;
    let root = request
        .root
        .or_else(|| state.config.archive.root.clone())
        .or_else(|| current.root().map(|p| p.to_path_buf()))
        .ok_or_else(|| not_found("no import root configured"))?;

    let options = ScanOptions::new(&state.config, &root).map_err(|e| internal(e.to_string()))?;
    let report = match scan_archive(&options, &NoProgress, &state.cancel).await {
        Ok(report) => report,
        Err(e @ ScanError::RootMissing(_)) => return Err(not_found(e.to_string())),
        Err(e) => {
            warn!(root = %root.display(), error = %e, "scan failed");
            return Err(internal(e.to_string()));
        }
    };

    if let Some(store) = &state.store {
        store
            .publish(&report.snapshot, &report.warnings)
            .await
            .map_err(|e| internal(e.to_string()))?;
    }
    state
        .index
        .publish(&report.snapshot, &report.warnings)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(ScanResponse {
        root,
        persons: report.snapshot.persons().len(),
        files: report.snapshot.files().len(),
        warnings: report.warnings,
    }))
}
