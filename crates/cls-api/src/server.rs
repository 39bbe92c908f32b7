//! Axum server and routes.

use axum::{
    extract::{DefaultBodyLimit, Path, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use cls_jobs::{Job, JobRegistry, JobResultsView, JobStatusView};
use cls_ml::Classifier;
use cls_trainer::{TrainingError, TrainingOrchestrator};
use cls_types::{
    ClassifyRequest, ClassifyResponse, DeleteJobResponse, ErrorResponse, HealthResponse,
    ModelInfo, RetrainRequest, RetrainResponse, SaveModelRequest, SaveModelResponse,
    ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub const API_KEY_HEADER: &str = "x-api-key";

pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub orchestrator: TrainingOrchestrator,
    /// `None` when no model could be loaded at startup.
    pub classifier: Option<Arc<Classifier>>,
    pub api_key: String,
    pub max_body_bytes: usize,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: self.label().to_string(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<TrainingError> for ApiError {
    fn from(e: TrainingError) -> Self {
        if e.is_validation() {
            ApiError::BadRequest(e.to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/v1/classify", post(handle_classify))
        .route("/api/v1/retrain", post(handle_retrain))
        .route("/api/v1/retrain/status/:job_id", get(handle_job_status))
        .route("/api/v1/retrain/results/:job_id", get(handle_job_results))
        .route("/api/v1/retrain/save/:job_id", post(handle_save_model))
        .route("/api/v1/retrain/jobs", get(handle_list_jobs))
        .route("/api/v1/retrain/jobs/:job_id", delete(handle_delete_job))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/v1/model/info", get(handle_model_info))
        .merge(protected)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(cors_layer(&state.allowed_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if provided != Some(state.api_key.as_str()) {
        return Err(ApiError::Unauthorized("invalid or missing API key".to_string()));
    }
    Ok(next.run(req).await)
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "text classification",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let model_loaded = state.classifier.is_some();
    Json(HealthResponse {
        status: (if model_loaded { "healthy" } else { "unhealthy" }).to_string(),
        model_loaded,
    })
}

async fn handle_model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfo> {
    Json(
        state
            .classifier
            .as_ref()
            .map(|c| c.info())
            .unwrap_or_default(),
    )
}

async fn handle_classify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let (title, content) = req.validate()?;
    let classifier = state
        .classifier
        .as_ref()
        .ok_or_else(|| ApiError::Internal("model not loaded".to_string()))?;
    let labels = classifier.predict(&title, &content, state.orchestrator.config().threshold);
    Ok(Json(ClassifyResponse { labels }))
}

async fn handle_retrain(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RetrainRequest>,
) -> Result<Json<RetrainResponse>, ApiError> {
    let model_type = req.validate()?;
    if req.model_path.is_some() {
        tracing::debug!(job_id = %req.job_id, "modelPath ignored; training starts from scratch");
    }

    let RetrainRequest {
        job_id,
        samples,
        hyperparameters,
        ..
    } = req;
    tracing::info!(
        job_id = %job_id,
        model_type = %model_type,
        samples = samples.len(),
        "retraining requested"
    );
    state.registry.create_job(&job_id, model_type);
    // Detached: the registry carries the outcome.
    let _handle = state.orchestrator.spawn_training(
        &job_id,
        model_type.as_str(),
        samples,
        hyperparameters,
    )?;

    Ok(Json(RetrainResponse {
        message: format!("Training job {job_id} started"),
        job_id,
        status: "running".to_string(),
    }))
}

async fn handle_job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusView>, ApiError> {
    state
        .registry
        .get_job_status(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id} not found")))
}

async fn handle_job_results(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResultsView>, ApiError> {
    if let Some(results) = state.registry.get_job_results(&job_id) {
        return Ok(Json(results));
    }
    match state.registry.get_job_status(&job_id) {
        Some(view) => Err(ApiError::BadRequest(format!(
            "job {job_id} is not completed (status: {})",
            view.status
        ))),
        None => Err(ApiError::NotFound(format!("job {job_id} not found"))),
    }
}

async fn handle_save_model(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Json(req): Json<SaveModelRequest>,
) -> Result<Json<SaveModelResponse>, ApiError> {
    if let Some(body_id) = req.job_id.as_deref().filter(|id| *id != job_id) {
        tracing::debug!(path = %job_id, body = %body_id, "save request job ids differ; using path");
    }
    let orchestrator = state.orchestrator.clone();
    let model_name = req.model_name;
    let id = job_id.clone();
    let model_path = tokio::task::spawn_blocking(move || orchestrator.save_artifact(&id, &model_name))
        .await
        .map_err(|e| ApiError::Internal(format!("save task failed: {e}")))??;

    Ok(Json(SaveModelResponse {
        success: true,
        model_path: model_path.display().to_string(),
        message: format!("Model from job {job_id} saved"),
    }))
}

async fn handle_list_jobs(State(state): State<Arc<AppState>>) -> Json<HashMap<String, Job>> {
    Json(state.registry.list_jobs())
}

async fn handle_delete_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<DeleteJobResponse>, ApiError> {
    if !state.registry.delete_job(&job_id) {
        return Err(ApiError::NotFound(format!("job {job_id} not found")));
    }
    Ok(Json(DeleteJobResponse {
        job_id,
        deleted: true,
    }))
}
