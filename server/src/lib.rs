use anyhow::Result;
use arrowreg_core::{IndexStats, RetrievalError, RetrievalService, SearchOptions, SearchResult, SourceInfo};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 50;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub k: Option<usize>,
    /// Comma-separated document ids to restrict the search to.
    pub sources: Option<String>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub id: String,
    pub document_id: String,
    pub heading: String,
    pub text: String,
    pub bm25_score: f32,
    pub cosine_score: f32,
    pub fused_score: f32,
    pub confidence: u8,
    pub citation: String,
    pub url: Option<String>,
}

impl From<SearchResult> for SearchHit {
    fn from(r: SearchResult) -> Self {
        Self {
            id: r.section.id,
            document_id: r.section.document_id,
            heading: r.section.heading,
            text: r.section.text,
            bm25_score: r.bm25_score,
            cosine_score: r.cosine_score,
            fused_score: r.fused_score,
            confidence: r.confidence,
            citation: r.citation.text,
            url: r.citation.url,
        }
    }
}

#[derive(Deserialize)]
pub struct AddDocumentRequest {
    pub path: PathBuf,
    pub document_id: String,
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RetrievalService>,
    pub admin_token: Option<String>,
}

type ApiError = (StatusCode, String);

/// Build the router around an already-initialized service.
pub fn build_app(service: Arc<RetrievalService>) -> Result<Router> {
    let admin_token = std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty());
    Ok(router(AppState { service, admin_token }))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/stats", get(stats_handler))
        .route("/documents", get(list_documents).post(add_document))
        .route("/documents/:document_id", delete(remove_document))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn parse_sources(raw: Option<&str>) -> Option<Vec<String>> {
    let ids: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if ids.is_empty() { None } else { Some(ids) }
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let options = SearchOptions {
        max_results: params.k.map(|k| k.clamp(1, MAX_K)),
        sources: parse_sources(params.sources.as_deref()),
    };
    let service = state.service.clone();
    let query = params.q.clone();
    let results = tokio::task::spawn_blocking(move || service.search(&query, &options))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("search task failed: {e}")))?;

    let hits: Vec<SearchHit> = results.into_iter().map(SearchHit::from).collect();
    Ok(Json(SearchResponse {
        query: params.q,
        took_s: start.elapsed().as_secs_f64(),
        total_hits: hits.len(),
        results: hits,
    }))
}

async fn stats_handler(State(state): State<AppState>) -> Json<IndexStats> {
    Json(state.service.stats())
}

async fn list_documents(State(state): State<AppState>) -> Json<Vec<SourceInfo>> {
    Json(state.service.documents())
}

// --- Admin endpoints ---
async fn add_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AddDocumentRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    authorize(&state, &headers)?;
    let service = state.service.clone();
    let document_id = req.document_id.clone();
    let added = tokio::task::spawn_blocking(move || service.add_document(&req.path, &req.document_id))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("add task failed: {e}")))?
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "document_id": document_id, "sections": added }))))
}

async fn remove_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers)?;
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || service.remove_document(&document_id))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("remove task failed: {e}")))?
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

fn error_response(err: RetrievalError) -> ApiError {
    let status = match &err {
        RetrievalError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
        RetrievalError::DuplicateDocument(_) => StatusCode::CONFLICT,
        RetrievalError::Io { .. } | RetrievalError::Json { .. } | RetrievalError::Config(_) => StatusCode::BAD_REQUEST,
        RetrievalError::Embedding(_) => StatusCode::BAD_GATEWAY,
    };
    tracing::warn!(status = status.as_u16(), error = %err, "admin request failed");
    (status, err.to_string())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
