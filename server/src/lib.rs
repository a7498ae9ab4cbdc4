use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use simdex::{EngineConfig, SearchEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct AddDocument {
    pub id: String,
    pub features: Vec<String>,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: Vec<String>,
    #[serde(default = "default_max")]
    pub max: usize,
}
fn default_max() -> usize { 20 }

#[derive(Deserialize)]
pub struct SnapshotRequest {
    pub path: PathBuf,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub total_hits: usize,
    pub took_s: f64,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
}

#[derive(Serialize)]
pub struct SizeResponse {
    pub size: u64,
}

/// Mutations take the write lock; size, searches and save share the read lock.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RwLock<SearchEngine>>,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(engine: SearchEngine, admin_token: Option<String>) -> Self {
        Self { engine: Arc::new(RwLock::new(engine)), admin_token }
    }
}

/// Build the application from a config, optionally restoring a snapshot.
/// The admin token comes from `ADMIN_TOKEN`.
pub fn build_app(config: EngineConfig, snapshot: Option<PathBuf>) -> Result<Router> {
    let mut engine = SearchEngine::new(config);
    if let Some(path) = snapshot {
        engine.load(&path).with_context(|| format!("loading snapshot {}", path.display()))?;
    }
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    Ok(router(AppState::new(engine, admin_token)))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
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
        .route("/size", get(size_handler))
        .route("/documents", post(add_handler))
        .route("/documents/:id", delete(delete_handler))
        .route("/clear", post(clear_handler))
        .route("/search/document", post(search_document_handler))
        .route("/search/feature", post(search_feature_handler))
        .route("/admin/save", post(save_handler))
        .route("/admin/load", post(load_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn size_handler(State(state): State<AppState>) -> Json<SizeResponse> {
    Json(SizeResponse { size: state.engine.read().size() })
}

pub async fn add_handler(State(state): State<AppState>, Json(doc): Json<AddDocument>) -> Result<Json<SizeResponse>, ApiError> {
    if doc.id.is_empty() || doc.features.iter().all(|f| f.is_empty()) {
        return Err((StatusCode::BAD_REQUEST, "document needs an id and at least one feature".into()));
    }
    let mut engine = state.engine.write();
    engine.add_document(&doc.id, &doc.features);
    Ok(Json(SizeResponse { size: engine.size() }))
}

pub async fn delete_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SizeResponse>, ApiError> {
    let mut engine = state.engine.write();
    if !engine.contains(&id) {
        return Err((StatusCode::NOT_FOUND, format!("unknown document '{id}'")));
    }
    engine.delete_document(&id);
    Ok(Json(SizeResponse { size: engine.size() }))
}

pub async fn clear_handler(State(state): State<AppState>) -> Json<SizeResponse> {
    let mut engine = state.engine.write();
    engine.clear();
    tracing::info!("cleared engine");
    Json(SizeResponse { size: engine.size() })
}

pub async fn search_document_handler(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let results = state.engine.read().search_by_document(&req.query, req.max);
    Json(to_response(results, start))
}

pub async fn search_feature_handler(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let results = state.engine.read().search_by_feature(&req.query, req.max);
    Json(to_response(results, start))
}

fn to_response(results: Vec<(String, f64)>, start: std::time::Instant) -> SearchResponse {
    let results: Vec<SearchHit> = results.into_iter().map(|(id, score)| SearchHit { id, score }).collect();
    SearchResponse { total_hits: results.len(), took_s: start.elapsed().as_secs_f64(), results }
}

// --- Admin endpoints ---
async fn save_handler(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<SnapshotRequest>) -> Result<Json<SizeResponse>, ApiError> {
    authorize(&state, &headers)?;
    let engine = state.engine.clone();
    let size = tokio::task::spawn_blocking(move || {
        let engine = engine.read();
        engine.save(&req.path).map(|_| engine.size())
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(snapshot_error)?;
    Ok(Json(SizeResponse { size }))
}

async fn load_handler(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<SnapshotRequest>) -> Result<Json<SizeResponse>, ApiError> {
    authorize(&state, &headers)?;
    let engine = state.engine.clone();
    let size = tokio::task::spawn_blocking(move || {
        // read the file without holding the lock, then swap under the write lock
        let mut loaded = SearchEngine::new(engine.read().config().clone());
        loaded.load(&req.path)?;
        let mut engine = engine.write();
        *engine = loaded;
        Ok::<_, simdex::Error>(engine.size())
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(snapshot_error)?;
    Ok(Json(SizeResponse { size }))
}

fn snapshot_error(err: simdex::Error) -> ApiError {
    tracing::warn!(error = %err, "snapshot operation failed");
    let status = match &err {
        simdex::Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        e if e.is_corruption() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
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
