//! JSON HTTP API.
//!
//! Exposes alert analysis, raw matching and collection management over
//! axum. One [`AlertService`] is built at startup and shared by every
//! handler, so the result cache and collection handles live for the whole
//! process.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/v1/alerts/analyze` | Answer one alert |
//! | `POST`   | `/v1/alerts/match` | Ranked matches without generation |
//! | `POST`   | `/v1/documents` | Add documents to a collection |
//! | `GET`    | `/v1/collections/{tenant}/{agent}` | Collection stats |
//! | `DELETE` | `/v1/collections/{tenant}/{agent}` | Drop a collection |
//! | `POST`   | `/v1/cache/clear` | Drop every cached match result |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "text must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `store_unavailable` (503), `internal` (500).
//! Store failures never leak their underlying message to the client.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use runbook_harness_core::models::{CollectionKey, MatchResult, MatchType, StoredDocument};
use runbook_harness_core::StoreError;

use crate::analyze::AlertService;
use crate::config::Config;
use crate::stats::{collection_stats, CollectionStats};

#[derive(Clone)]
struct AppState {
    service: Arc<AlertService>,
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let service = Arc::new(AlertService::from_config(config).await?);
    let app = router(service);

    info!(bind = %bind_addr, agents = config.agents.len(), "server starting");
    println!("rbh server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the application router around a shared service.
pub fn router(service: Arc<AlertService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/v1/alerts/analyze", post(handle_analyze))
        .route("/v1/alerts/match", post(handle_match))
        .route("/v1/documents", post(handle_add_documents))
        .route(
            "/v1/collections/{tenant}/{agent}",
            get(handle_collection_stats).delete(handle_drop_collection),
        )
        .route("/v1/cache/clear", post(handle_cache_clear))
        .layer(cors)
        .with_state(AppState { service })
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

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Logs the store failure and returns a 503 without its details.
fn store_unavailable(err: &StoreError) -> AppError {
    error!(error = %err, "document store failure");
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "store_unavailable".to_string(),
        message: "document store is unavailable".to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /v1/alerts/analyze ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    tenant_id: u64,
    agent_id: u64,
    text: String,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    success: bool,
    response: String,
    match_type: Option<MatchType>,
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let key = CollectionKey::new(req.tenant_id, req.agent_id);
    let outcome = state
        .service
        .analyze(key, &req.text)
        .await
        .map_err(|e| store_unavailable(&e))?;

    Ok(Json(AnalyzeResponse {
        success: outcome.success,
        response: outcome.response,
        match_type: outcome.match_type,
    }))
}

// ============ POST /v1/alerts/match ============

#[derive(Deserialize)]
struct MatchRequest {
    tenant_id: u64,
    agent_id: u64,
    text: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct MatchResponse {
    results: Vec<MatchResult>,
}

async fn handle_match(
    State(state): State<AppState>,
    Json(req): Json<MatchRequest>,
) -> Result<Json<MatchResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    if req.k == Some(0) {
        return Err(bad_request("k must be >= 1"));
    }

    let key = CollectionKey::new(req.tenant_id, req.agent_id);
    let results = state
        .service
        .find_matches(key, &req.text, req.k)
        .await
        .map_err(|e| store_unavailable(&e))?;

    Ok(Json(MatchResponse { results }))
}

// ============ POST /v1/documents ============

#[derive(Deserialize)]
struct DocumentInput {
    id: String,
    text: String,
    filename: String,
    #[serde(default)]
    file_type: String,
}

#[derive(Deserialize)]
struct AddDocumentsRequest {
    tenant_id: u64,
    agent_id: u64,
    documents: Vec<DocumentInput>,
}

#[derive(Serialize)]
struct AddDocumentsResponse {
    added: bool,
}

async fn handle_add_documents(
    State(state): State<AppState>,
    Json(req): Json<AddDocumentsRequest>,
) -> Result<Json<AddDocumentsResponse>, AppError> {
    if req.documents.is_empty() {
        return Err(bad_request("documents must not be empty"));
    }
    if let Some(d) = req
        .documents
        .iter()
        .find(|d| d.id.trim().is_empty() || d.text.trim().is_empty())
    {
        return Err(bad_request(format!(
            "document '{}' must have a non-empty id and text",
            d.filename
        )));
    }

    let uploaded_at = chrono::Utc::now().to_rfc3339();
    let documents: Vec<StoredDocument> = req
        .documents
        .into_iter()
        .map(|d| StoredDocument {
            id: d.id,
            text: d.text,
            filename: d.filename,
            file_type: d.file_type,
            uploaded_at: uploaded_at.clone(),
        })
        .collect();

    let key = CollectionKey::new(req.tenant_id, req.agent_id);
    let added = state.service.add_documents(key, &documents).await;
    Ok(Json(AddDocumentsResponse { added }))
}

// ============ /v1/collections/{tenant}/{agent} ============

async fn handle_collection_stats(
    State(state): State<AppState>,
    Path((tenant, agent)): Path<(u64, u64)>,
) -> Result<Json<CollectionStats>, AppError> {
    let key = CollectionKey::new(tenant, agent);
    let stats = collection_stats(&state.service, key)
        .await
        .map_err(|e| match e.downcast_ref::<StoreError>() {
            Some(store) => store_unavailable(store),
            None => internal("failed to read collection stats"),
        })?;
    Ok(Json(stats))
}

#[derive(Serialize)]
struct DropResponse {
    dropped: bool,
}

async fn handle_drop_collection(
    State(state): State<AppState>,
    Path((tenant, agent)): Path<(u64, u64)>,
) -> Json<DropResponse> {
    let dropped = state
        .service
        .drop_collection(CollectionKey::new(tenant, agent))
        .await;
    Json(DropResponse { dropped })
}

// ============ POST /v1/cache/clear ============

#[derive(Serialize)]
struct CacheClearResponse {
    cleared: usize,
}

async fn handle_cache_clear(State(state): State<AppState>) -> Json<CacheClearResponse> {
    let cleared = state.service.cache().clear();
    Json(CacheClearResponse { cleared })
}
