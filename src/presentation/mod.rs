// Presentation layer - HTTP handlers and routing
pub mod app_state;
pub mod envelope;
pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    apply_action, cancel_config, cancel_report, complete_config, generate_report, get_session,
    health_check, list_channels, list_files, send_message, start_config,
};

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/files", get(list_files))
        .route("/files/:file_id/channels", get(list_channels))
        .route("/config/start", post(start_config))
        .route("/config/:session_id", get(get_session))
        .route("/config/:session_id/action", post(apply_action))
        .route("/config/:session_id/message", post(send_message))
        .route("/config/:session_id/complete", post(complete_config))
        .route("/config/:session_id/cancel", post(cancel_config))
        .route("/reports", post(generate_report))
        .route("/reports/:session_id", delete(cancel_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
