// HTTP request handlers
use crate::domain::report_config::{ReportConfig, Section};
use crate::domain::session::ConfigAction;
use crate::presentation::app_state::AppState;
use crate::presentation::envelope::{ApiError, ApiResponse};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

type ApiResult = std::result::Result<Response, ApiError>;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartRequest {
    pub session_id: Option<String>,
    pub report_type: String,
    pub file_id: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageRequest {
    pub text: String,
}

/// Either the id of a session whose configuration was completed, or an
/// inline configuration (optionally keyed by a session id for cancellation)
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportRequest {
    pub session_id: Option<String>,
    pub config: Option<ReportConfig>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_files(State(state): State<Arc<AppState>>) -> ApiResult {
    let files = state.channels.list_files().await?;
    Ok(ApiResponse::ok(files))
}

pub async fn list_channels(Path(file_id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    let channels = state.channels.list_channels(&file_id).await?;
    Ok(ApiResponse::ok(channels))
}

/// Start (or resume) a configuration dialogue
pub async fn start_config(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<StartRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let report_type: Section = request.report_type.parse()?;
    let session_id = request
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let response = state
        .dialogue
        .start_config(&session_id, report_type, &request.file_id)
        .await?;
    Ok(ApiResponse::created(response))
}

pub async fn get_session(Path(session_id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    let response = state.dialogue.get_session(&session_id).await?;
    Ok(ApiResponse::ok(response))
}

/// Apply one structured action: `{"action": "...", "value": ..., "expected_version": n}`
pub async fn apply_action(
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(mut body) = payload?;
    let expected_version = body
        .as_object_mut()
        .and_then(|fields| fields.remove("expected_version"))
        .filter(|v| !v.is_null())
        .map(serde_json::from_value::<u64>)
        .transpose()?;
    let action: ConfigAction = serde_json::from_value(body)?;

    let response = state
        .dialogue
        .apply_action(&session_id, action, expected_version)
        .await?;
    Ok(ApiResponse::ok(response))
}

/// Free-text turn of the dialogue
pub async fn send_message(
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<MessageRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let response = state
        .dialogue
        .apply_natural_language(&session_id, &request.text)
        .await?;
    Ok(ApiResponse::ok(response))
}

pub async fn complete_config(Path(session_id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    let config = state.dialogue.complete_config(&session_id).await?;
    Ok(ApiResponse::ok(config))
}

/// Cancel the dialogue and any report generation it started
pub async fn cancel_config(Path(session_id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    state.reports.cancel(&session_id);
    let response = state.dialogue.cancel(&session_id).await?;
    Ok(ApiResponse::ok(response))
}

pub async fn generate_report(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ReportRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let (key, config) = match (request.session_id, request.config) {
        (session_id, Some(config)) => (
            session_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            config,
        ),
        (Some(session_id), None) => {
            let config = state.dialogue.completed_config(&session_id)?;
            (session_id, config)
        }
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either session_id or config is required".to_string(),
            ))
        }
    };

    let report = state.reports.generate(&key, config).await?;
    Ok(ApiResponse::created(report))
}

pub async fn cancel_report(Path(session_id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult {
    if !state.reports.cancel(&session_id) {
        return Err(ApiError::NotFound(format!(
            "no report generation running for session {}",
            session_id
        )));
    }
    Ok(ApiResponse::ok(json!({ "session_id": session_id, "cancelled": true })))
}
