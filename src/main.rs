// Main entry point - Dependency injection and server setup
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use testbench_report::application::config_dialogue::ConfigDialogueController;
use testbench_report::application::nl_parser::KeywordParser;
use testbench_report::application::report_service::ReportService;
use testbench_report::application::session_store::{spawn_cleanup, SessionStore};
use testbench_report::infrastructure::config::load_app_config;
use testbench_report::infrastructure::json_report_writer::JsonReportWriter;
use testbench_report::infrastructure::memory_repository::InMemoryChannelRepository;
use testbench_report::presentation::app_state::AppState;
use testbench_report::presentation::create_app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_app_config().context("loading configuration")?;

    // Create repository and writer (infrastructure layer)
    let channels = Arc::new(
        InMemoryChannelRepository::load_dir(&config.data.dir)
            .await
            .with_context(|| format!("loading data files from {}", config.data.dir.display()))?,
    );
    let writer = Arc::new(JsonReportWriter::new(config.reports.output_dir.clone()));
    let parser = Arc::new(KeywordParser::new()?);

    // Create services (application layer)
    let store = Arc::new(SessionStore::new(config.sessions.ttl()));
    let shutdown = CancellationToken::new();
    let cleanup = spawn_cleanup(store.clone(), config.sessions.cleanup_interval(), shutdown.clone());

    let dialogue = ConfigDialogueController::new(store, channels.clone(), parser);
    let reports = ReportService::new(channels.clone(), writer);

    // Create application state
    let state = Arc::new(AppState {
        channels,
        dialogue,
        reports,
    });

    // Build router (presentation layer)
    let router = create_app(state);

    // Start server
    let addr = config.server.socket_addr()?;
    tracing::info!("Starting testbench-report service on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    cleanup.await?;
    tracing::info!("Server stopped");

    Ok(())
}
