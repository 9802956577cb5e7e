//! HTTP surface tests: routes, envelopes and status mapping, driven in-process
//! through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use testbench_report::application::config_dialogue::ConfigDialogueController;
use testbench_report::application::nl_parser::KeywordParser;
use testbench_report::application::report_service::ReportService;
use testbench_report::application::session_store::SessionStore;
use testbench_report::infrastructure::json_report_writer::JsonReportWriter;
use testbench_report::infrastructure::memory_repository::InMemoryChannelRepository;
use testbench_report::presentation::app_state::AppState;
use testbench_report::presentation::create_app;

const RUN_1: &str = "Time,Ng,Temperature\n\
                     0,0,20\n\
                     1,9000,400\n\
                     2,14500,700\n\
                     3,15000,900\n\
                     4,15000,650\n";

struct TestApp {
    router: Router,
    _data: TempDir,
    reports: TempDir,
}

async fn test_app() -> TestApp {
    let data = tempfile::tempdir().unwrap();
    std::fs::write(data.path().join("run-1.csv"), RUN_1).unwrap();
    let reports = tempfile::tempdir().unwrap();

    let channels = Arc::new(InMemoryChannelRepository::load_dir(data.path()).await.unwrap());
    let store = Arc::new(SessionStore::new(Duration::from_secs(60)));
    let dialogue = ConfigDialogueController::new(
        store,
        channels.clone(),
        Arc::new(KeywordParser::new().unwrap()),
    );
    let reports_service = ReportService::new(
        channels.clone(),
        Arc::new(JsonReportWriter::new(reports.path().to_path_buf())),
    );
    let state = Arc::new(AppState {
        channels,
        dialogue,
        reports: reports_service,
    });

    TestApp {
        router: create_app(state),
        _data: data,
        reports,
    }
}

async fn send(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn post(app: &TestApp, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

#[tokio::test]
async fn test_healthz() {
    let app = test_app().await;
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_files_and_channels() {
    let app = test_app().await;
    let (status, body) = send(&app, Method::GET, "/files", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(["run-1"]));

    let (status, body) = send(&app, Method::GET, "/files/run-1/channels", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["name"], "Ng");
    assert_eq!(body["data"][1]["name"], "Temperature");
    assert!(body["meta"]["timestamp"].is_string());

    let (status, body) = send(&app, Method::GET, "/files/run-9/channels", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "FILE_NOT_FOUND");
}

#[tokio::test]
async fn test_steady_state_dialogue_to_report() {
    let app = test_app().await;

    let (status, body) = post(
        &app,
        "/config/start",
        json!({"session_id": "s1", "report_type": "steady_state", "file_id": "run-1"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["state"], "display_channels");

    let (status, _) = post(
        &app,
        "/config/s1/action",
        json!({"action": "select_channel", "value": "Temperature"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(&app, "/config/s1/message", json!({"text": "next"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "trigger_combo");
    assert_eq!(body["data"]["understood"], true);

    // Thresholds are not editable before a combination is chosen
    let (status, body) = post(
        &app,
        "/config/s1/action",
        json!({"action": "set_threshold", "value": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
    let valid: Vec<&str> = body["error"]["valid_actions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(valid.contains(&"set_combination"));

    let (status, body) = post(
        &app,
        "/config/s1/action",
        json!({"action": "set_combination", "value": "cond1_only"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "parameter_config");
    let version = body["data"]["version"].as_u64().unwrap();

    let (status, body) = post(
        &app,
        "/config/s1/action",
        json!({"action": "set_threshold", "value": 15000, "expected_version": version}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"]["partial_config"]["steady_state"]["condition1"]["threshold"],
        15000.0
    );

    let (status, body) = post(
        &app,
        "/config/s1/action",
        json!({"action": "next_step", "expected_version": version}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONCURRENT_MODIFICATION");

    let (status, body) = post(&app, "/config/s1/action", json!({"action": "next_step"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "confirmation");

    let (status, body) = post(&app, "/config/s1/complete", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["source_file_id"], "run-1");
    assert_eq!(body["data"]["sections"], json!(["steady_state"]));

    let (status, body) = post(&app, "/reports", json!({"session_id": "s1"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["data"]["result"]["steady_state"]["snapshots"].is_array());
    let location = body["data"]["artifact"]["location"].as_str().unwrap();
    assert!(location.starts_with(&app.reports.path().display().to_string()));
    assert!(std::path::Path::new(location).exists());
}

#[tokio::test]
async fn test_cancel_forgets_session() {
    let app = test_app().await;
    post(
        &app,
        "/config/start",
        json!({"session_id": "s2", "report_type": "status_eval", "file_id": "run-1"}),
    )
    .await;

    let (status, body) = post(&app, "/config/s2/complete", json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INCOMPLETE_CONFIG");
    assert!(body["error"]["message"].as_str().unwrap().contains("status_eval.items"));

    let (status, body) = post(&app, "/config/s2/cancel", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "cancelled");

    let (status, body) = send(&app, Method::GET, "/config/s2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_request_validation() {
    let app = test_app().await;

    let (status, body) = post(
        &app,
        "/config/start",
        json!({"session_id": "s3", "report_type": "weekly", "file_id": "run-1"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_VALUE");

    let (status, body) = post(&app, "/config/start", json!({"file_id": "run-1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = post(&app, "/reports", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = post(
        &app,
        "/reports",
        json!({"config": {"source_file_id": "run-1", "sections": ["steady_state"]}}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INCOMPLETE_CONFIG");

    let (status, body) = post(&app, "/reports", json!({"session_id": "never-completed"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");

    let (status, body) = send(&app, Method::DELETE, "/reports/s3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}
