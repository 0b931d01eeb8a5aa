use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::engine::Thresholds;
use crate::classifier::ModelInfo;
use crate::labels::{self, LabelInfo};
use crate::models::{AnalysisResponse, Decision};
use crate::orchestrator::{AnalysisService, HealthReport, PhoneDatabaseInfo, SystemStats, TrainingOutcome};

const API_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const MAX_BATCH_SIZE: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnalysisService>,
    /// Boundary limit for `text`, in characters.
    pub max_text_length: usize,
}

impl AppState {
    pub fn new(service: Arc<AnalysisService>, max_text_length: usize) -> Self {
        Self {
            service,
            max_text_length,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
        .route("/analyze", post(analyze))
        .route("/analyze/batch", post(analyze_batch))
        .route("/stats", get(stats))
        .route("/admin/thresholds", get(get_thresholds).put(put_thresholds))
        .route("/admin/reset-stats", post(reset_stats))
        .route("/admin/training-data", post(training_data))
        .route("/admin/phone-database", get(phone_database))
        .route("/admin/model-info", get(model_info))
        .route("/admin/labels/{decision}", get(label_for))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ------------------------------------------------------------
// Errors
// ------------------------------------------------------------

/// JSON error body `{error, message}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            error: "ValidationError",
            message: message.into(),
        }
    }

    fn bad_request(error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.error, "message": self.message }));
        (self.status, body).into_response()
    }
}

// ------------------------------------------------------------
// Boundary validation
// ------------------------------------------------------------

fn validate_text(text: &str, max_chars: usize) -> Result<&str, ApiError> {
    let t = text.trim();
    if t.is_empty() {
        return Err(ApiError::validation("text cannot be empty or only whitespace"));
    }
    let n = t.chars().count();
    if n > max_chars {
        return Err(ApiError::validation(format!(
            "text has {n} characters, at most {max_chars} are allowed"
        )));
    }
    Ok(t)
}

fn validate_phone<'a>(field: &str, raw: &'a str) -> Result<&'a str, ApiError> {
    static SHAPE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[\d+\-\s()]{7,15}$").expect("phone shape regex"));

    if !SHAPE.is_match(raw) {
        return Err(ApiError::validation(format!("{field}: invalid phone number format")));
    }
    let digits = raw.chars().filter(char::is_ascii_digit).count();
    if !(7..=15).contains(&digits) {
        return Err(ApiError::validation(format!(
            "{field}: phone number must contain 7-15 digits"
        )));
    }
    Ok(raw)
}

// ------------------------------------------------------------
// Handlers
// ------------------------------------------------------------

#[derive(Serialize)]
struct HealthOut {
    status: &'static str,
    version: &'static str,
    models_loaded: bool,
    database_connected: bool,
    timestamp: chrono::DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    let h = state.service.health();
    Json(HealthOut {
        status: h.status,
        version: API_VERSION,
        models_loaded: h.models_loaded,
        database_connected: h.database_connected,
        timestamp: Utc::now(),
    })
}

async fn health_detailed(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.service.health())
}

#[derive(Debug, Deserialize)]
struct AnalyzeReq {
    text: String,
    #[serde(default)]
    sender_phone: Option<String>,
    /// Older clients send the sender under this name.
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    receiver_phone: Option<String>,
}

impl AnalyzeReq {
    /// Boundary checks shared by single and batch analysis.
    fn validated(&self, max_chars: usize) -> Result<(&str, &str, Option<&str>), ApiError> {
        let text = validate_text(&self.text, max_chars)?;
        let sender = self
            .sender_phone
            .as_deref()
            .or(self.phone_number.as_deref())
            .ok_or_else(|| ApiError::validation("sender_phone or phone_number is required"))?;
        let sender = validate_phone("sender_phone", sender)?;
        let receiver = self
            .receiver_phone
            .as_deref()
            .map(|r| validate_phone("receiver_phone", r))
            .transpose()?;
        Ok((text, sender, receiver))
    }
}

async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeReq>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let (text, sender, receiver) = body.validated(state.max_text_length)?;
    let resp = state.service.analyze(text, sender, receiver).await;
    Ok(Json(resp))
}

/// Up to [`MAX_BATCH_SIZE`] messages, answered in order. An item that fails
/// validation gets its own BLOCKED response; the rest of the batch proceeds.
async fn analyze_batch(
    State(state): State<AppState>,
    Json(items): Json<Vec<AnalyzeReq>>,
) -> Result<Json<Vec<AnalysisResponse>>, ApiError> {
    if items.is_empty() {
        return Err(ApiError::bad_request(
            "EmptyBatchError",
            "Batch request cannot be empty",
        ));
    }
    if items.len() > MAX_BATCH_SIZE {
        return Err(ApiError::bad_request(
            "BatchSizeError",
            format!(
                "Batch size {} exceeds maximum limit of {MAX_BATCH_SIZE} messages",
                items.len()
            ),
        ));
    }

    info!(items = items.len(), "batch analysis started");
    let mut results = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let resp = match item.validated(state.max_text_length) {
            Ok((text, sender, receiver)) => state.service.analyze(text, sender, receiver).await,
            Err(e) => {
                warn!(item = i, error = %e.message, "batch item rejected");
                state.service.reject(e.message)
            }
        };
        debug!(item = i, decision = resp.decision.as_str(), "batch item done");
        results.push(resp);
    }
    Ok(Json(results))
}

async fn stats(State(state): State<AppState>) -> Json<SystemStats> {
    let s = state.service.system_stats();
    debug!(total = s.total_requests, "stats requested");
    Json(s)
}

async fn get_thresholds(State(state): State<AppState>) -> Json<Thresholds> {
    Json(state.service.thresholds())
}

#[derive(Debug, Deserialize)]
struct ThresholdUpdate {
    #[serde(default, alias = "spam_confidence_threshold")]
    spam_threshold: Option<f32>,
    #[serde(default, alias = "high_risk_threshold")]
    risk_threshold: Option<f32>,
    #[serde(default)]
    strict_mode: Option<bool>,
}

#[derive(Serialize)]
struct ThresholdsOut {
    message: &'static str,
    updated_thresholds: Thresholds,
}

async fn put_thresholds(
    State(state): State<AppState>,
    Json(body): Json<ThresholdUpdate>,
) -> Result<Json<ThresholdsOut>, ApiError> {
    if !state
        .service
        .update_settings(body.spam_threshold, body.risk_threshold, body.strict_mode)
    {
        warn!(?body, "threshold update rejected");
        return Err(ApiError::bad_request(
            "ThresholdUpdateError",
            "thresholds must lie within [0, 1]",
        ));
    }
    Ok(Json(ThresholdsOut {
        message: "Thresholds updated successfully",
        updated_thresholds: state.service.thresholds(),
    }))
}

async fn reset_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.service.reset_statistics();
    Json(json!({ "message": "System statistics reset successfully" }))
}

#[derive(Debug, Deserialize)]
struct TrainingReq {
    text: String,
    phone_number: String,
    is_spam: bool,
    is_phone_flagged: bool,
}

async fn training_data(
    State(state): State<AppState>,
    Json(body): Json<TrainingReq>,
) -> Result<(StatusCode, Json<TrainingOutcome>), ApiError> {
    let text = validate_text(&body.text, state.max_text_length)?;
    let phone = validate_phone("phone_number", &body.phone_number)?;
    let out = state
        .service
        .add_training_example(text, phone, body.is_spam, body.is_phone_flagged);
    Ok((StatusCode::CREATED, Json(out)))
}

async fn phone_database(State(state): State<AppState>) -> Json<PhoneDatabaseInfo> {
    Json(state.service.phone_database())
}

async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(state.service.model_info())
}

async fn label_for(Path(decision): Path<String>) -> Result<Json<LabelInfo>, ApiError> {
    let d: Decision = decision
        .parse()
        .map_err(|e: String| ApiError::bad_request("UnknownDecision", e))?;
    Ok(Json(labels::label_info(d)))
}
