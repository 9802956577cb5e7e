// JSON envelope shared by every endpoint: `{data, meta}` or `{error, meta}`
use crate::error::ReportError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
    pub version: &'static str,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Response {
        Self::with_status(StatusCode::OK, data)
    }

    pub fn created(data: T) -> Response {
        Self::with_status(StatusCode::CREATED, data)
    }

    fn with_status(status: StatusCode, data: T) -> Response {
        let body = Self {
            data,
            meta: ResponseMeta::default(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_actions: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

/// Everything a handler can fail with
#[derive(Debug)]
pub enum ApiError {
    Report(ReportError),
    BadRequest(String),
    NotFound(String),
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Report(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

fn status_of(err: &ReportError) -> StatusCode {
    match err {
        ReportError::SessionNotFound { .. } | ReportError::FileNotFound { .. } => StatusCode::NOT_FOUND,
        ReportError::InvalidTransition { .. }
        | ReportError::ConcurrentModification { .. }
        | ReportError::Cancelled => StatusCode::CONFLICT,
        ReportError::IncompleteConfig { .. }
        | ReportError::ChannelNotFound { .. }
        | ReportError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ReportError::InvalidValue { .. }
        | ReportError::UnsupportedOperator { .. }
        | ReportError::UnsupportedStatistic { .. }
        | ReportError::InvalidData(_) => StatusCode::BAD_REQUEST,
        ReportError::Parser(_) | ReportError::Task(_) | ReportError::Io(_) | ReportError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::Report(err) => {
                let status = status_of(&err);
                if status.is_server_error() {
                    tracing::error!("Request failed: {}", err);
                }
                let valid_actions = match &err {
                    ReportError::InvalidTransition { valid_actions, .. } => Some(valid_actions.clone()),
                    _ => None,
                };
                (
                    status,
                    ErrorDetail {
                        code: err.code().to_string(),
                        message: err.user_message(),
                        valid_actions,
                    },
                )
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "BAD_REQUEST".to_string(),
                    message,
                    valid_actions: None,
                },
            ),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message,
                    valid_actions: None,
                },
            ),
        };
        let body = ApiErrorResponse {
            error,
            meta: ResponseMeta::default(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ok_response_shape() {
        let resp = ApiResponse::ok(serde_json::json!({"hello": "world"}));
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body(resp).await;
        assert_eq!(v["data"]["hello"], "world");
        assert!(v["meta"]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_invalid_transition_carries_valid_actions() {
        let err = ReportError::InvalidTransition {
            session_id: "s1".to_string(),
            state: "trigger_combo".to_string(),
            action: "set_threshold".to_string(),
            valid_actions: vec!["set_combination".to_string(), "cancel".to_string()],
        };
        let resp = ApiError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let v = body(resp).await;
        assert_eq!(v["error"]["code"], "INVALID_TRANSITION");
        assert_eq!(v["error"]["valid_actions"][0], "set_combination");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (
                ReportError::SessionNotFound {
                    session_id: "x".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                ReportError::IncompleteConfig {
                    session_id: "x".to_string(),
                    missing: vec!["sections".to_string()],
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ReportError::invalid_value("threshold", "nan"), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            let resp = ApiError::from(err).into_response();
            assert_eq!(resp.status(), status);
            assert!(body(resp).await["error"].get("valid_actions").is_none());
        }
    }
}
