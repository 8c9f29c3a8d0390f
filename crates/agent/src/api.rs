//! HTTP API: health, metrics, forecasting, allocation and training

use carecast_lib::{
    forecast::{ModelStore, PredictionOutcome, Regressor, TrainingReport},
    health::{ComponentStatus, HealthRegistry},
    observability::{CoreMetrics, StructuredLogger},
    AllocationConstraints, AllocationResult, DemandForecaster, Error, JsonModelStore,
    ModelRegistry, PredictedDemand, StaffAllocation, StaffOptimizer, TimeSeriesRecord,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: CoreMetrics,
    pub logger: StructuredLogger,
    pub registry: Arc<ModelRegistry>,
    pub forecaster: DemandForecaster,
    pub optimizer: Arc<StaffOptimizer>,
    pub store: Option<JsonModelStore>,
    pub horizons: Vec<u32>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: CoreMetrics,
        logger: StructuredLogger,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            logger,
            forecaster: DemandForecaster::new(Arc::clone(&registry)),
            registry,
            optimizer: Arc::new(StaffOptimizer::default()),
            store: None,
            horizons: carecast_lib::DEFAULT_HORIZONS.to_vec(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_store(mut self, store: JsonModelStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_horizons(mut self, horizons: Vec<u32>) -> Self {
        self.horizons = horizons;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_optimizer(mut self, optimizer: StaffOptimizer) -> Self {
        self.optimizer = Arc::new(optimizer);
        self
    }
}

/// Handler error mapped onto an HTTP status with a JSON body
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Persistence(String),
    Timeout(Duration),
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(_) => ApiError::Validation(err.to_string()),
            Error::Persistence(_) => ApiError::Persistence(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Persistence(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
            ApiError::Timeout(limit) => (
                StatusCode::GATEWAY_TIMEOUT,
                format!("request exceeded {}s and was abandoned", limit.as_secs()),
            ),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Run blocking work on the blocking pool under the request timeout.
/// On timeout the work keeps running detached, so it must not have side
/// effects that outlive a failed request.
async fn run_blocking<T, F>(timeout: Duration, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> carecast_lib::Result<T> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(work)).await {
        Err(_) => Err(ApiError::Timeout(timeout)),
        Ok(Err(join_error)) => Err(ApiError::Internal(format!("worker failed: {}", join_error))),
        Ok(Ok(result)) => result.map_err(ApiError::from),
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Number of features listed per model by default
pub const DEFAULT_TOP_FEATURES: usize = 5;

#[derive(Debug, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    pub backend: String,
    pub mae: f64,
    pub rmse: f64,
    pub train_rows: usize,
    pub test_rows: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_features: Vec<FeatureImportance>,
}

#[derive(Debug, Deserialize)]
pub struct ModelsQuery {
    pub top_n: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub version: String,
    pub trained_at: Option<DateTime<Utc>>,
    pub feature_count: usize,
    pub models: Vec<ModelSummary>,
}

async fn list_models(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ModelsQuery>,
) -> Json<ModelsResponse> {
    let top_n = query.top_n.unwrap_or(DEFAULT_TOP_FEATURES);
    let regressor = state.registry.regressor();
    let snapshot = state.registry.snapshot();
    Json(ModelsResponse {
        version: snapshot.version.clone(),
        trained_at: snapshot.trained_at,
        feature_count: snapshot.schema.len(),
        models: snapshot
            .models
            .values()
            .map(|m| ModelSummary {
                name: m.key.name(),
                backend: m.backend.clone(),
                mae: m.accuracy.mae,
                rmse: m.accuracy.rmse,
                train_rows: m.accuracy.train_rows,
                test_rows: m.accuracy.test_rows,
                top_features: m
                    .feature_importance(regressor, top_n)
                    .into_iter()
                    .map(|(feature, importance)| FeatureImportance {
                        feature,
                        importance,
                    })
                    .collect(),
            })
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub current_state: TimeSeriesRecord,
    #[serde(default)]
    pub history: Vec<TimeSeriesRecord>,
    #[serde(default)]
    pub horizons: Option<Vec<u32>>,
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictionOutcome>, ApiError> {
    let horizons = request.horizons.unwrap_or_else(|| state.horizons.clone());
    let forecaster = state.forecaster.clone();
    let outcome = run_blocking(state.request_timeout, move || {
        forecaster.predict(&request.current_state, &request.history, &horizons)
    })
    .await?;

    state.metrics.record_prediction(&outcome);
    state.logger.log_prediction(&outcome);
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub current_staff: StaffAllocation,
    #[serde(default)]
    pub predicted_demand: PredictedDemand,
    #[serde(default)]
    pub constraints: Option<AllocationConstraints>,
}

async fn optimize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<AllocationResult>, ApiError> {
    let start = Instant::now();
    let optimizer = Arc::clone(&state.optimizer);
    let result = run_blocking(state.request_timeout, move || {
        optimizer.optimize(
            &request.current_staff,
            &request.predicted_demand,
            request.constraints.as_ref(),
        )
    })
    .await?;

    state
        .metrics
        .record_optimization(&result, start.elapsed().as_secs_f64());
    state.logger.log_allocation(&result);
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    pub series: Vec<TimeSeriesRecord>,
    #[serde(default)]
    pub horizons: Option<Vec<u32>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SkippedSummary {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrainResponse {
    pub version: String,
    pub rows: usize,
    pub trained: Vec<ModelSummary>,
    pub skipped: Vec<SkippedSummary>,
    pub duration_ms: u64,
    pub persisted: bool,
}

impl TrainResponse {
    fn new(report: &TrainingReport, backend: &str, persisted: bool) -> Self {
        Self {
            version: report.version.clone(),
            rows: report.rows,
            trained: report
                .trained
                .iter()
                .map(|(key, accuracy)| ModelSummary {
                    name: key.name(),
                    backend: backend.to_string(),
                    mae: accuracy.mae,
                    rmse: accuracy.rmse,
                    train_rows: accuracy.train_rows,
                    test_rows: accuracy.test_rows,
                    top_features: Vec::new(),
                })
                .collect(),
            skipped: report
                .skipped
                .iter()
                .map(|s| SkippedSummary {
                    name: s.key.name(),
                    reason: s.reason.clone(),
                })
                .collect(),
            duration_ms: report.duration_ms,
            persisted,
        }
    }
}

async fn train(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainRequest>,
) -> Result<Json<TrainResponse>, ApiError> {
    let horizons = request.horizons.unwrap_or_else(|| state.horizons.clone());
    let registry = Arc::clone(&state.registry);
    let store = state.store.clone();

    // the fit alone runs under the deadline; nothing is persisted on timeout
    let fit_registry = Arc::clone(&registry);
    let (snapshot, report) = run_blocking(state.request_timeout, move || {
        fit_registry.fit_snapshot(&request.series, &horizons)
    })
    .await
    .map_err(|e| {
        error!(error = ?e, "Training request failed");
        e
    })?;

    // save then install as one unit that runs to completion
    let models = tokio::task::spawn_blocking(move || {
        if let Some(store) = &store {
            store.save(&snapshot)?;
        }
        let models = snapshot.len();
        registry.install(snapshot);
        Ok::<_, Error>(models)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("worker failed: {}", e)))?
    .map_err(|e| {
        error!(error = %e, "Failed to persist trained models");
        ApiError::from(e)
    })?;

    state
        .health_registry
        .report_models(&report.version, models)
        .await;
    state.metrics.record_training(&report);
    state.logger.log_training(&report);
    info!(version = %report.version, models, "Registry snapshot replaced");

    Ok(Json(TrainResponse::new(
        &report,
        state.registry.regressor().name(),
        state.store.is_some(),
    )))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/models", get(list_models))
        .route("/v1/predict", post(predict))
        .route("/v1/optimize", post(optimize))
        .route("/v1/train", post(train))
        .with_state(state)
}

/// Start the API server and stop when `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
