use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use recipe_core::error::{IndexLoadError, SearchError};
use recipe_core::executor::{EmptyQueryResult, QueryExecutor, QueryRequest, SearchHit};
use recipe_core::index::DocMeta;
use recipe_core::persist::{load_index, read_current, IndexPaths};
use recipe_core::{Metric, SearchConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub metric: Option<String>,
    pub k: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    /// JSON filter object.
    pub filters: Option<String>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub metric: Metric,
    pub took_ms: f64,
    pub total_hits: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty: Option<EmptyQueryResult>,
    pub results: Vec<SearchHit>,
}

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<QueryExecutor>,
    pub paths: IndexPaths,
    pub config: SearchConfig,
    pub admin_token: Option<String>,
}

impl AppState {
    /// Load the published generation if there is one. A missing index is not
    /// fatal: searches answer 503 until `/admin/reload` succeeds.
    pub fn open(index_dir: impl Into<PathBuf>, config: SearchConfig, admin_token: Option<String>) -> Result<Self> {
        let paths = IndexPaths::new(index_dir.into());
        let executor = config.executor();
        match load_index(&paths) {
            Ok(index) => {
                executor.swap(index);
            }
            Err(IndexLoadError::NotBuilt(root)) => {
                tracing::warn!(root = %root.display(), "no index published yet, serving 503 until reload");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Self { executor: Arc::new(executor), paths, config, admin_token })
    }
}

#[derive(Debug)]
pub enum ApiError {
    IndexNotBuilt,
    MalformedFilter(String),
    BadRequest(String),
    NotFound,
    Unauthorized(&'static str),
    Internal(String),
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::IndexNotBuilt => ApiError::IndexNotBuilt,
            SearchError::Filter(f) => ApiError::MalformedFilter(f.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::IndexNotBuilt => (StatusCode::SERVICE_UNAVAILABLE, "index_not_built", "index not built".to_owned()),
            ApiError::MalformedFilter(m) => (StatusCode::BAD_REQUEST, "malformed_filter", m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, "bad_request", m),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not_found", "no such document".to_owned()),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.to_owned()),
            ApiError::Internal(m) => {
                tracing::error!(error = %m, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", m)
            }
        };
        (status, Json(serde_json::json!({ "error": code, "message": message }))).into_response()
    }
}

/// `config` falls back to the `SEARCH_CONFIG` env var, then to defaults.
pub fn build_app(index_dir: PathBuf, config: Option<PathBuf>) -> Result<Router> {
    let config_path = config.or_else(|| std::env::var_os("SEARCH_CONFIG").map(PathBuf::from));
    let config = SearchConfig::load_or_default(config_path.as_deref())?;
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let state = AppState::open(index_dir, config, admin_token)?;
    Ok(router(state))
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
        .route("/health", get(health_handler))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/admin/reload", post(reload_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let num_docs = state.executor.snapshot().map(|i| i.num_docs());
    Json(serde_json::json!({
        "status": "ok",
        "index_loaded": num_docs.is_some(),
        "num_docs": num_docs,
    }))
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let metric = match params.metric.as_deref() {
        None | Some("") => Metric::default(),
        Some(m) => m.parse().map_err(ApiError::BadRequest)?,
    };
    let mut request = QueryRequest::new(params.q.clone())
        .metric(metric)
        .top_k(params.k.unwrap_or(state.config.default_top_k))
        .offset(params.offset);
    if let Some(text) = params.filters.as_deref() {
        request = request.filter_json(text).map_err(|e| ApiError::MalformedFilter(e.to_string()))?;
    }

    let results = state.executor.execute(&request)?;
    let took_ms = start.elapsed().as_secs_f64() * 1000.0;
    tracing::info!(query = %params.q, %metric, total_hits = results.total_hits, took_ms, "search");
    Ok(Json(SearchResponse {
        query: params.q,
        metric,
        took_ms,
        total_hits: results.total_hits,
        empty: results.empty,
        results: results.hits,
    }))
}

/// Looks up by external id first, then by numeric doc id.
pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<String>) -> Result<Json<DocMeta>, ApiError> {
    let index = state.executor.snapshot().ok_or(ApiError::IndexNotBuilt)?;
    index
        .doc_by_external_id(&doc_id)
        .or_else(|| doc_id.parse().ok().and_then(|id| index.doc(id)))
        .cloned()
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// Load the generation `CURRENT` now names and swap it in. On failure the
/// index being served is left as it was.
async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let paths = state.paths.clone();
    let loaded = tokio::task::spawn_blocking(move || -> Result<_, IndexLoadError> {
        let generation = read_current(&paths)?;
        Ok((generation, load_index(&paths)?))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    let (generation, index) = match loaded {
        Ok(v) => v,
        Err(IndexLoadError::NotBuilt(_)) => return Err(ApiError::IndexNotBuilt),
        Err(e) => return Err(ApiError::Internal(e.to_string())),
    };
    let num_docs = index.num_docs();
    state.executor.swap(index);
    tracing::info!(?generation, num_docs, "index reloaded");
    Ok(Json(serde_json::json!({ "generation": generation, "num_docs": num_docs })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::Unauthorized("ADMIN_TOKEN not set")),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("invalid admin token"))
    }
}
