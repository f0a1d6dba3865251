//! NutriScan API Server
//!
//! HTTP scoring endpoint for the dish classifier, plus health, label and
//! nutrition lookups.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use classifier::{Lifecycle, ServiceContext, StartupError};
use metrics_exporter_prometheus::PrometheusHandle;
use nutrition_store::{NutritionRepository, RelevanceSearch, StoreError};
use serde::Serialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod rate_limit;
mod routes;
pub mod settings;
mod telemetry;

pub use settings::{LoggingConfig, NutritionConfig, ServerConfig, ServiceConfig};
pub use telemetry::{init_metrics, record_prediction};

/// Server errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Startup failed: {0}")]
    Startup(#[from] StartupError),

    #[error("Nutrition store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Metrics setup failed: {0}")]
    Metrics(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!("Request failed: {}", self);
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Loaded model, labels and preprocessing
    pub context: Arc<ServiceContext>,
    /// Nutrition lookup
    pub nutrition: Arc<dyn RelevanceSearch>,
    /// Cap on records per nutrition search
    pub max_results: usize,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
    /// Prometheus exporter, when installed
    pub metrics: Option<PrometheusHandle>,
    pub predictions_served: AtomicU64,
    pub predictions_failed: AtomicU64,
}

impl AppState {
    /// Create new application state
    pub fn new(
        context: Arc<ServiceContext>,
        nutrition: Arc<dyn RelevanceSearch>,
        max_results: usize,
    ) -> Self {
        Self {
            context,
            nutrition,
            max_results,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            metrics: None,
            predictions_served: AtomicU64::new(0),
            predictions_failed: AtomicU64::new(0),
        }
    }

    /// Attach the Prometheus handle rendered by `/metrics`
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub model: ModelStatus,
    pub metrics: ServiceMetrics,
}

/// Loaded model summary
#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub device: String,
    pub label_count: usize,
}

/// Request counters since start
#[derive(Debug, Serialize)]
pub struct ServiceMetrics {
    pub predictions_served: u64,
    pub predictions_failed: u64,
}

/// Label listing
#[derive(Debug, Serialize)]
pub struct LabelsResponse {
    pub labels: Vec<String>,
    pub count: usize,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>, server: &ServerConfig) -> Result<Router, ApiError> {
    let mut scoring = Router::new().route("/score", post(routes::score::score));
    if let Some(limiter) = rate_limit::governor_layer(&server.rate_limit)? {
        scoring = scoring.layer(limiter);
    }

    Ok(Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/labels", get(labels_handler))
        .route("/api/v1/nutrition", get(routes::nutrition::get_nutrition))
        .route("/metrics", get(metrics_handler))
        .merge(scoring)
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state))
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        model: ModelStatus {
            device: state.context.device().as_str().to_string(),
            label_count: state.context.labels().len(),
        },
        metrics: ServiceMetrics {
            predictions_served: state.predictions_served.load(Ordering::Relaxed),
            predictions_failed: state.predictions_failed.load(Ordering::Relaxed),
        },
    })
}

async fn labels_handler(State(state): State<Arc<AppState>>) -> Json<LabelsResponse> {
    let labels: Vec<String> = state.context.labels().iter().map(String::from).collect();
    Json(LabelsResponse {
        count: labels.len(),
        labels,
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> Result<(), ApiError> {
    let level = Level::from_str(&config.level)
        .map_err(|_| ApiError::Config(format!("unknown log level '{}'", config.level)))?;

    let result = if config.json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };

    result.map_err(|e| ApiError::Logging(e.to_string()))
}

/// Load the model and nutrition data, then serve until Ctrl-C
pub async fn run_server(settings: ServiceConfig) -> Result<(), ApiError> {
    let lifecycle = Lifecycle::new();
    let context = lifecycle.initialize(&settings.classifier()).await?;

    let nutrition = match &settings.nutrition.records_path {
        Some(path) => NutritionRepository::from_json_file(path).await?,
        None => NutritionRepository::new(),
    };

    let state = AppState::new(context, Arc::new(nutrition), settings.nutrition.max_results)
        .with_metrics(init_metrics()?);
    let app = create_router(Arc::new(state), &settings.server)?;

    info!("Starting API server on {}", settings.server.addr);

    let listener = tokio::net::TcpListener::bind(&settings.server.addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
