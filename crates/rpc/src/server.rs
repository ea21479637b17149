use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use kvscope_registry::{RegistryError, StoreHandle, StoreRegistry};
use kvscope_storage::{parse_limit, scan_page, PageRequest, StorageError};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Upper bound on request bodies unless configured otherwise.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<StoreRegistry>,
    pub start_time: Instant,
    pub req_count: Arc<AtomicUsize>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self {
            registry,
            start_time: Instant::now(),
            req_count: Arc::new(AtomicUsize::new(0)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn store(&self, name: &str) -> Result<StoreHandle, ApiError> {
        self.registry.get(name).map_err(ApiError::from)
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    stores: usize,
    uptime_secs: u64,
    req_total: u64,
}

#[derive(Debug, Serialize)]
struct KeysResponse {
    keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct KeyValueResponse {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SetKeyRequest {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct KeysQuery {
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoreParams {
    name: String,
}

#[derive(Debug, Deserialize)]
struct KeyParams {
    name: String,
    key: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

/// Error returned by every handler. `code` is stable and lets clients tell
/// apart failures that share a status, such as an unknown store and a
/// missing key.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, code: &'static str, message: S) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }

    fn key_not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, "key_not_found", message)
    }

    fn engine_failure<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "engine_failure", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            error: self.message,
            code: self.code,
        });
        (self.status, payload).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match &err {
            RegistryError::NotFound { .. } => {
                Self::new(StatusCode::NOT_FOUND, "store_not_found", err.to_string())
            }
            RegistryError::NameConflict { .. } => {
                Self::new(StatusCode::CONFLICT, "name_conflict", err.to_string())
            }
            RegistryError::InvalidName { .. } => Self::invalid_input(err.to_string()),
            RegistryError::OpenFailure { .. } => Self::engine_failure(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        warn!("storage failure: {}", err);
        Self::engine_failure(format!("storage failure: {err}"))
    }
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let listener = bind_listener(addr).await?;
    serve(state, listener, std::future::pending()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(state: AppState, listener: tokio::net::TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(local) = listener.local_addr() {
        info!("kvscope HTTP server listening on {}", local);
    }
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server terminated unexpectedly")
}

pub async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {addr}"))
    }
}

pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.max_body_bytes;
    let shared: SharedState = Arc::new(state);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/dbs", get(handle_list_stores))
        .route("/api/db/:name/keys", get(handle_get_keys))
        .route(
            "/api/db/:name/key",
            get(handle_get_empty_key).post(handle_set_key),
        )
        .route(
            "/api/db/:name/key/",
            get(handle_get_empty_key).post(handle_set_key),
        )
        .route(
            "/api/db/:name/key/*key",
            get(handle_get_key)
                .delete(handle_delete_key)
                .post(handle_set_key),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let req_total = state.record_request();
    Json(HealthResponse {
        status: "ok",
        stores: state.registry.len(),
        uptime_secs: state.uptime_seconds(),
        req_total,
    })
}

async fn handle_list_stores(State(state): State<SharedState>) -> Json<Vec<String>> {
    state.record_request();
    Json(state.registry.names())
}

async fn handle_get_keys(
    State(state): State<SharedState>,
    params: Result<AxumPath<StoreParams>, PathRejection>,
    query: Result<Query<KeysQuery>, QueryRejection>,
) -> Result<Json<KeysResponse>, ApiError> {
    state.record_request();
    let AxumPath(params) = params.map_err(|err| ApiError::invalid_input(err.body_text()))?;
    let Query(query) = query.map_err(|err| ApiError::invalid_input(err.body_text()))?;
    let store = state.store(&params.name)?;

    let request = PageRequest::new()
        .with_start_key(query.start.unwrap_or_default())
        .with_prefix(query.prefix.unwrap_or_default())
        .with_limit(parse_limit(query.limit.as_deref()));

    let page = scan_page(store.as_ref(), &request)?;
    debug!(
        store = %params.name,
        returned = page.keys.len(),
        "served key page"
    );

    Ok(Json(KeysResponse {
        keys: page.keys.iter().map(|k| lossy(k)).collect(),
        next_key: page.next_key.as_deref().map(lossy),
    }))
}

async fn handle_get_key(
    State(state): State<SharedState>,
    params: Result<AxumPath<KeyParams>, PathRejection>,
) -> Result<Json<KeyValueResponse>, ApiError> {
    state.record_request();
    let AxumPath(params) =
        params.map_err(|err| ApiError::invalid_input(format!("invalid key in URL path: {}", err.body_text())))?;
    read_key(&state, &params.name, params.key)
}

/// A key route without a key segment reads the empty key.
async fn handle_get_empty_key(
    State(state): State<SharedState>,
    params: Result<AxumPath<StoreParams>, PathRejection>,
) -> Result<Json<KeyValueResponse>, ApiError> {
    state.record_request();
    let AxumPath(params) = params.map_err(|err| ApiError::invalid_input(err.body_text()))?;
    read_key(&state, &params.name, String::new())
}

fn read_key(state: &AppState, name: &str, key: String) -> Result<Json<KeyValueResponse>, ApiError> {
    let store = state.store(name)?;
    let value = store
        .get(key.as_bytes())?
        .ok_or_else(|| ApiError::key_not_found("key not found"))?;

    Ok(Json(KeyValueResponse {
        key,
        value: lossy(&value),
    }))
}

async fn handle_delete_key(
    State(state): State<SharedState>,
    params: Result<AxumPath<KeyParams>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    state.record_request();
    let AxumPath(params) =
        params.map_err(|err| ApiError::invalid_input(format!("invalid key in URL path: {}", err.body_text())))?;
    let store = state.store(&params.name)?;

    store.delete(params.key.as_bytes())?;
    Ok(StatusCode::NO_CONTENT)
}

/// The key is taken from the body; a key segment in the URL is ignored.
async fn handle_set_key(
    State(state): State<SharedState>,
    params: Result<AxumPath<StoreParams>, PathRejection>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    state.record_request();
    let AxumPath(params) = params.map_err(|err| ApiError::invalid_input(err.body_text()))?;
    let store = state.store(&params.name)?;

    let payload: SetKeyRequest = serde_json::from_slice(&body)
        .map_err(|err| ApiError::invalid_input(format!("invalid JSON body: {err}")))?;
    if payload.key.is_empty() {
        return Err(ApiError::invalid_input("key must not be empty"));
    }

    store.put(payload.key.as_bytes(), payload.value.as_bytes())?;
    Ok(StatusCode::CREATED)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
