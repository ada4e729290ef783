use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Map, Value};
use tabinfer_model::{FeatureRow, Model, Predictor};
use tabinfer_store::{find_row, ReferenceStore};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const NO_ROW_MESSAGE: &str = "No data found for the provided ID";

/// Static description of the loaded model, reported by `/health`
#[derive(Clone, Debug, Serialize)]
pub struct ModelInfo {
    pub hash: String,
    pub trees: usize,
    pub features: usize,
}

impl ModelInfo {
    pub fn from_model(model: &Model) -> Result<Self> {
        Ok(Self {
            hash: model.hash_hex().context("failed to hash model")?,
            trees: model.num_trees(),
            features: model.num_features(),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<dyn Predictor>,
    pub store: Arc<dyn ReferenceStore>,
    pub model_info: ModelInfo,
    pub start_time: Instant,
    pub req_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        store: Arc<dyn ReferenceStore>,
        model_info: ModelInfo,
    ) -> Self {
        Self {
            predictor,
            store,
            model_info,
            start_time: Instant::now(),
            req_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn score(&self, row: &FeatureRow) -> Result<Vec<f64>, ApiError> {
        self.predictor
            .predict(std::slice::from_ref(row))
            .map_err(|err| ApiError::bad_request(err.to_string()))
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct PredictionResponse {
    prediction: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct LookupPredictionResponse {
    id: i64,
    prediction: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model_hash: String,
    trees: usize,
    features: usize,
    uptime_secs: u64,
    req_total: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        warn!(status = %self.status, error = %self.message, "request failed");
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

/// Bind the listener and serve until Ctrl-C
pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let listener = bind_listener(addr).await?;
    serve(listener, state, shutdown_signal()).await
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

/// Serve requests on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: tokio::net::TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(local) = listener.local_addr() {
        info!("inference service listening on {local}");
    }
    let app = build_router(Arc::new(state));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server terminated unexpectedly")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/predict", post(handle_predict))
        .route("/predict_from_db/:id", get(handle_predict_from_db))
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_predict(
    State(state): State<SharedState>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    state.record_request();
    let Json(body) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let row =
        FeatureRow::from_json_object(&body).map_err(|err| ApiError::bad_request(err.to_string()))?;
    let prediction = state.score(&row)?;

    debug!(features = row.len(), ?prediction, "scored request body");
    Ok(Json(PredictionResponse { prediction }))
}

async fn handle_predict_from_db(
    State(state): State<SharedState>,
    AxumPath(raw_id): AxumPath<String>,
) -> Result<Json<LookupPredictionResponse>, ApiError> {
    state.record_request();
    let id = parse_row_id(&raw_id)?;

    let store = state.store.clone();
    let rows = tokio::task::spawn_blocking(move || store.load_all())
        .await
        .map_err(|err| ApiError::bad_request(format!("reference store task failed: {err}")))?
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let row = find_row(&rows, id).ok_or_else(|| ApiError::not_found(NO_ROW_MESSAGE))?;
    let prediction = state.score(&row.features)?;

    debug!(id, ?prediction, "scored reference row");
    Ok(Json(LookupPredictionResponse { id, prediction }))
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let req_total = state.record_request();
    Json(HealthResponse {
        status: "ok",
        model_hash: state.model_info.hash.clone(),
        trees: state.model_info.trees,
        features: state.model_info.features,
        uptime_secs: state.uptime_seconds(),
        req_total,
    })
}

async fn handle_not_found() -> ApiError {
    ApiError::not_found("Not Found")
}

/// Row identifiers are non-negative decimal integers; anything else
/// addresses no row.
fn parse_row_id(raw: &str) -> Result<i64, ApiError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::not_found(format!("invalid row identifier: {raw}")));
    }
    raw.parse::<i64>()
        .map_err(|_| ApiError::not_found(format!("invalid row identifier: {raw}")))
}
