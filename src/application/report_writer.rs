// Sink for finished reports
use crate::domain::evaluation::ReportResult;
use crate::domain::report_config::ReportConfig;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a written report can be found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportArtifact {
    pub report_id: String,
    pub location: String,
    pub generated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ReportWriter: Send + Sync {
    async fn write(&self, report_id: &str, config: &ReportConfig, result: &ReportResult) -> Result<ReportArtifact>;
}
