//! JSON HTTP API over the storage orchestrator.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/documents` | Store a document |
//! | `GET`    | `/documents?user_id=` | List stored documents |
//! | `DELETE` | `/documents?user_id=` | Clear stored documents |
//! | `POST`   | `/search` | Ranked search |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `configuration` (500),
//! `storage_unavailable` (503).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use docvault_core::error::StorageError;

use crate::config::{Config, MAX_QUERY_TOP_K};
use crate::storage::{ClearReport, DocumentListing, DocumentStorage, SearchResponse, StoreOutcome};

#[derive(Clone)]
struct AppState {
    storage: Arc<DocumentStorage>,
    default_top_k: usize,
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let storage = Arc::new(DocumentStorage::from_config(config).await?);
    let app = build_router(storage, config.retrieval.default_top_k);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "docvault API listening");
    println!("docvault API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router without binding, so callers can serve it on their own
/// listener.
pub fn build_router(storage: Arc<DocumentStorage>, default_top_k: usize) -> Router {
    let state = AppState {
        storage,
        default_top_k,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/documents",
            post(handle_store).get(handle_list).delete(handle_clear),
        )
        .route("/search", post(handle_search))
        .layer(cors)
        .with_state(state)
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

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        error!(error = %err, "storage operation failed");
        let (status, code) = if err.is_configuration() {
            (StatusCode::INTERNAL_SERVER_ERROR, "configuration")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
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

// ============ /documents ============

#[derive(Deserialize)]
struct StoreRequest {
    file_name: String,
    #[serde(default = "default_file_type")]
    file_type: String,
    content: String,
    #[serde(default)]
    user_id: String,
}

fn default_file_type() -> String {
    "text/plain".to_string()
}

async fn handle_store(
    State(state): State<AppState>,
    Json(req): Json<StoreRequest>,
) -> Result<Json<StoreOutcome>, AppError> {
    if req.file_name.trim().is_empty() {
        return Err(bad_request("file_name must not be empty"));
    }
    let outcome = state
        .storage
        .store_document(&req.file_name, &req.file_type, &req.content, &req.user_id)
        .await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: Option<String>,
}

impl UserQuery {
    fn user(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|u| !u.is_empty())
    }
}

async fn handle_list(
    State(state): State<AppState>,
    Query(q): Query<UserQuery>,
) -> Result<Json<DocumentListing>, AppError> {
    Ok(Json(state.storage.list_user_documents(q.user()).await?))
}

async fn handle_clear(
    State(state): State<AppState>,
    Query(q): Query<UserQuery>,
) -> Result<Json<ClearReport>, AppError> {
    Ok(Json(state.storage.clear_user_documents(q.user()).await?))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    top_k: Option<usize>,
    user_id: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let top_k = req.top_k.unwrap_or(state.default_top_k);
    if top_k == 0 || top_k > MAX_QUERY_TOP_K {
        return Err(bad_request(format!(
            "top_k must be between 1 and {}",
            MAX_QUERY_TOP_K
        )));
    }
    let user = req.user_id.as_deref().filter(|u| !u.is_empty());
    Ok(Json(
        state.storage.search_documents(&req.query, top_k, user).await?,
    ))
}
