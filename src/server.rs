//! HTTP API server.
//!
//! Exposes the scripture corpus over axum:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/bible/v1/versions` | List versions visible to the caller |
//! | `GET`  | `/api/bible/v1/search?q=&version=&top=` | Hybrid verse search |
//! | `GET`  | `/api/bible/v1/version/{id}` | Stream full version content (SSE) |
//! | `GET`  | `/api/bible/v1/vectors/{id}` | Stream raw embeddings (binary) |
//!
//! Capabilities arrive in the `X-Permissions` header (comma-separated,
//! set by upstream middleware) and are parsed once per request into an
//! immutable [`Capabilities`] value. Access is validated before the
//! embedding call and before the first frame of any stream, so a denied
//! request does no retrieval work at all.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "forbidden", "message": "access denied for version BST" } }
//! ```
//!
//! Error codes: `bad_request` (400), `forbidden` (403), `not_found` (404),
//! `upstream_error` / `retrieval_error` / `dimension_mismatch` /
//! `internal` (500).

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::access::{AccessFilter, Capabilities};
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{Result, ScriptoriumError};
use crate::fusion;
use crate::models::{FusedResult, VersionSummary};
use crate::retrieval;
use crate::stream::{self, ContentFrame};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub embedder: Arc<dyn Embedder>,
    pub access: AccessFilter,
}

impl AppState {
    pub fn new(config: Config, pool: SqlitePool, embedder: Arc<dyn Embedder>) -> Self {
        let access = AccessFilter::new(config.access.public_versions.clone());
        Self {
            config: Arc::new(config),
            pool,
            embedder,
            access,
        }
    }
}

/// Build the full application router for the given state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/bible/v1/versions", get(handle_versions))
        .route("/api/bible/v1/search", get(handle_search))
        .route("/api/bible/v1/version/{version_id}", get(handle_version_content))
        .route("/api/bible/v1/vectors/{version_id}", get(handle_version_vectors))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on the configured bind address.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);

    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), pool, embedder);
    let app = router(state);

    tracing::info!(bind = %bind_addr, "scripture API listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Parse the caller's capability set from the permissions header.
fn capabilities(headers: &HeaderMap) -> Capabilities {
    Capabilities::from_header(
        headers
            .get("x-permissions")
            .and_then(|v| v.to_str().ok()),
    )
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

// ============ GET /api/bible/v1/versions ============

async fn handle_versions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<VersionSummary>>> {
    let caps = capabilities(&headers);

    let rows = sqlx::query("SELECT id, code, name, updated_at FROM versions ORDER BY id ASC")
        .fetch_all(&state.pool)
        .await?;

    let versions = rows
        .iter()
        .map(|row| VersionSummary {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
            updated_at: row.get("updated_at"),
        })
        .filter(|v| state.access.can_access(&caps, &v.code))
        .collect();

    Ok(Json(versions))
}

// ============ GET /api/bible/v1/search ============

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    version: Option<String>,
    top: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<FusedResult>>> {
    let query = params
        .q
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ScriptoriumError::validation("query (q) is required"))?;
    let version = params
        .version
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ScriptoriumError::validation("version is required"))?;

    let top = match params.top {
        None => state.config.retrieval.default_top,
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|t| *t > 0)
            .ok_or_else(|| ScriptoriumError::validation("top must be a positive integer"))?,
    };

    // Access is checked before the embedding call and before any query.
    let caps = capabilities(&headers);
    state.access.validate(&caps, &version)?;

    let query_embedding = state.embedder.embed(&query).await?;

    let (vector_hits, keyword_hits) = retrieval::search_version(
        &state.pool,
        &query,
        &query_embedding,
        &version,
        top,
        &state.config.retrieval,
    )
    .await?;

    let results = fusion::fuse(vector_hits, keyword_hits, top as usize);
    tracing::debug!(
        query = %query,
        version = %version,
        results = results.len(),
        "hybrid search complete"
    );

    Ok(Json(results))
}

// ============ GET /api/bible/v1/version/{id} ============

async fn handle_version_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(version_id): Path<String>,
) -> Result<Response> {
    let id: i64 = version_id
        .parse()
        .map_err(|_| ScriptoriumError::validation("invalid version_id parameter"))?;

    let version = stream::fetch_version(&state.pool, id)
        .await?
        .ok_or_else(|| ScriptoriumError::not_found(format!("version {} not found", id)))?;

    let caps = capabilities(&headers);
    state.access.validate(&caps, &version.code)?;

    tracing::info!(version_id = id, code = %version.code, "starting content stream");

    let rx = stream::stream_content(state.pool.clone(), version, &state.config.stream);
    let frames =
        ReceiverStream::new(rx).map(|frame| Ok::<Event, Infallible>(content_event(&frame)));

    Ok(Sse::new(frames).into_response())
}

fn content_event(frame: &ContentFrame) -> Event {
    match serde_json::to_string(frame) {
        Ok(data) => Event::default().data(data),
        Err(_) => Event::default()
            .data(r#"{"type":"error","message":"frame serialization failed"}"#),
    }
}

// ============ GET /api/bible/v1/vectors/{id} ============

async fn handle_version_vectors(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(version_id): Path<String>,
) -> Result<Response> {
    let id: i64 = version_id
        .parse()
        .map_err(|_| ScriptoriumError::validation("invalid version_id parameter"))?;

    let version = stream::fetch_version(&state.pool, id)
        .await?
        .ok_or_else(|| ScriptoriumError::not_found(format!("version {} not found", id)))?;

    let caps = capabilities(&headers);
    state.access.validate(&caps, &version.code)?;

    // Resolve the corpus-wide dimension and reject corruption while a
    // structured error is still possible (no bytes written yet).
    let configured = state.config.embedding.dims;
    let stored = stream::first_record_dims(&state.pool, id).await?;
    let dims = match (configured, stored) {
        (Some(expected), Some(actual)) if expected != actual => {
            return Err(ScriptoriumError::DimensionMismatch { expected, actual });
        }
        (Some(expected), _) => expected,
        (None, Some(actual)) => actual,
        (None, None) => {
            // Nothing embedded for this version — empty stream.
            return Ok((
                [(header::CONTENT_TYPE, "application/octet-stream")],
                Body::empty(),
            )
                .into_response());
        }
    };

    tracing::info!(version_id = id, code = %version.code, dims, "starting vector stream");

    let rx = stream::stream_vectors(state.pool.clone(), id, dims, &state.config.stream);
    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        body,
    )
        .into_response())
}
